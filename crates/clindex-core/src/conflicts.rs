//! Fact-conflict detection.
//!
//! Two families of checks run over a study's non-conflicting facts:
//!
//! - **structural**: a fact contradicts itself or a sibling, such as
//!   alternatives that differ from the main value, an age range with
//!   `min > max`, a significance level ≥ 0.1, power ≤ 0.7;
//! - **cross-document**: the same fact key carries different
//!   normalized values in two versions whose evidence anchors are
//!   linked by the anchor aligner. Without such a link the values are
//!   not comparable (the text may simply have moved).
//!
//! Facts extracted twice from the same version are extraction noise,
//! not conflicts; the highest-confidence one represents the version.
//! Critical conflicts each get one `resolve_conflict` task, created
//! idempotently.

use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::facts::parse_date_to_iso;
use crate::storage::Store;
use crate::types::{
    Conflict, ConflictItem, ConflictSeverity, ConflictStatus, ConflictType, Fact, FactStatus,
    StudyTask, TaskType,
};

/// Fact keys whose cross-document drift is critical.
const CRITICAL_KEYS: [&str; 4] = ["sample_size", "planned_n_total", "planned_n_per_arm", "N"];

/// The consistency checker.
#[derive(Debug, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    /// Create a detector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Run all checks for a study, persisting conflicts, items, fact
    /// status flips and follow-up tasks. Returns the new conflicts.
    pub fn check_study(&self, store: &dyn Store, study_id: Uuid) -> Result<Vec<Conflict>> {
        let facts: Vec<Fact> = store
            .facts_for_study(study_id)?
            .into_iter()
            .filter(|f| f.status != FactStatus::Conflicting)
            .collect();
        if facts.is_empty() {
            return Ok(Vec::new());
        }

        let mut conflicts = Vec::new();
        self.check_structural(store, study_id, &facts, &mut conflicts)?;
        self.check_cross_document(store, study_id, &facts, &mut conflicts)?;

        let critical: Vec<&Conflict> = conflicts
            .iter()
            .filter(|c| c.severity == ConflictSeverity::Critical)
            .collect();
        if !critical.is_empty() {
            create_resolve_tasks(store, study_id, &critical)?;
        }

        info!(
            study = %study_id,
            conflicts = conflicts.len(),
            critical = critical.len(),
            "consistency check finished"
        );
        Ok(conflicts)
    }

    fn check_structural(
        &self,
        store: &dyn Store,
        study_id: Uuid,
        facts: &[Fact],
        conflicts: &mut Vec<Conflict>,
    ) -> Result<()> {
        for fact in facts {
            // Alternatives recorded during extraction that contradict
            // the main value.
            if let Some(alternatives) = fact
                .meta
                .as_ref()
                .and_then(|m| m.get("alternatives"))
                .and_then(Value::as_array)
                .filter(|a| !a.is_empty())
            {
                let main = extract_main_value(&fact.value_json);
                let contradicts = alternatives.iter().any(|alt| {
                    let alt_value = alt.get("value").unwrap_or(alt);
                    !normalized_equal(&main, alt_value)
                });
                if contradicts {
                    let mut flipped = fact.clone();
                    flipped.status = FactStatus::Conflicting;
                    store.update_fact(flipped)?;

                    let conflict = push_conflict(
                        store,
                        conflicts,
                        study_id,
                        ConflictType::StructuralAlternatives,
                        ConflictSeverity::Medium,
                        format!("Alternative values disagree for {}", fact.fact_key),
                        format!(
                            "Fact {}:{} carries alternatives that differ from the main value {main}",
                            fact.fact_type, fact.fact_key
                        ),
                    )?;
                    store.insert_conflict_item(ConflictItem {
                        conflict_id: conflict,
                        left_anchor_id: None,
                        right_anchor_id: None,
                        left_fact_id: Some(fact.id),
                        right_fact_id: None,
                        evidence: json!({
                            "main_value": main,
                            "alternatives": alternatives,
                        }),
                    })?;
                }
            }

            // Age range sanity.
            if fact.fact_key == "age_min" || fact.fact_key == "age_range" {
                let (age_min, age_max, right_fact) = resolve_age_pair(fact, facts);
                if let (Some(min), Some(max)) = (age_min, age_max) {
                    if min > max {
                        let conflict = push_conflict(
                            store,
                            conflicts,
                            study_id,
                            ConflictType::StructuralRange,
                            ConflictSeverity::High,
                            "Invalid age range".to_string(),
                            format!("age_min ({min}) exceeds age_max ({max})"),
                        )?;
                        store.insert_conflict_item(ConflictItem {
                            conflict_id: conflict,
                            left_anchor_id: None,
                            right_anchor_id: None,
                            left_fact_id: Some(fact.id),
                            right_fact_id: right_fact,
                            evidence: json!({ "age_min": min, "age_max": max }),
                        })?;
                    }
                }
            }

            // Alpha and power bounds.
            if fact.fact_key == "alpha" {
                if let Some(alpha) = extract_numeric(&fact.value_json) {
                    if alpha >= 0.1 {
                        let conflict = push_conflict(
                            store,
                            conflicts,
                            study_id,
                            ConflictType::StructuralAlpha,
                            ConflictSeverity::Medium,
                            "Significance level out of bounds".to_string(),
                            format!("alpha ({alpha}) must be below 0.1"),
                        )?;
                        store.insert_conflict_item(ConflictItem {
                            conflict_id: conflict,
                            left_anchor_id: None,
                            right_anchor_id: None,
                            left_fact_id: Some(fact.id),
                            right_fact_id: None,
                            evidence: json!({ "alpha": alpha, "threshold": 0.1 }),
                        })?;
                    }
                }
            }
            if fact.fact_key == "power" {
                if let Some(power) = extract_numeric(&fact.value_json) {
                    if power <= 0.7 {
                        let conflict = push_conflict(
                            store,
                            conflicts,
                            study_id,
                            ConflictType::StructuralPower,
                            ConflictSeverity::Medium,
                            "Statistical power out of bounds".to_string(),
                            format!("power ({power}) must be above 0.7"),
                        )?;
                        store.insert_conflict_item(ConflictItem {
                            conflict_id: conflict,
                            left_anchor_id: None,
                            right_anchor_id: None,
                            left_fact_id: Some(fact.id),
                            right_fact_id: None,
                            evidence: json!({ "power": power, "threshold": 0.7 }),
                        })?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_cross_document(
        &self,
        store: &dyn Store,
        study_id: Uuid,
        facts: &[Fact],
        conflicts: &mut Vec<Conflict>,
    ) -> Result<()> {
        let mut by_key: HashMap<&str, Vec<&Fact>> = HashMap::new();
        for fact in facts {
            by_key.entry(fact.fact_key.as_str()).or_default().push(fact);
        }

        for (fact_key, group) in by_key {
            if group.len() < 2 {
                continue;
            }
            // One representative per version: the highest-confidence
            // fact. Same-version duplicates are extraction noise.
            let mut by_version: HashMap<Uuid, &Fact> = HashMap::new();
            for fact in group {
                let Some(version) = fact.created_from_doc_version_id else {
                    continue;
                };
                by_version
                    .entry(version)
                    .and_modify(|kept| {
                        if fact.confidence.unwrap_or(0.0) > kept.confidence.unwrap_or(0.0) {
                            *kept = fact;
                        }
                    })
                    .or_insert(fact);
            }
            let mut versions: Vec<Uuid> = by_version.keys().copied().collect();
            versions.sort();

            for (i, &left) in versions.iter().enumerate() {
                for &right in &versions[i + 1..] {
                    // Alignments are directed; honor whichever direction
                    // was actually persisted.
                    let (matches, version_a, version_b) = {
                        let forward = store.matches_between(left, right)?;
                        if forward.is_empty() {
                            let backward = store.matches_between(right, left)?;
                            if backward.is_empty() {
                                continue;
                            }
                            (backward, right, left)
                        } else {
                            (forward, left, right)
                        }
                    };
                    let fact_a = by_version[&version_a];
                    let fact_b = by_version[&version_b];
                    if fact_a.created_from_doc_version_id == fact_b.created_from_doc_version_id {
                        continue;
                    }
                    let value_a = normalize_value(&fact_a.value_json);
                    let value_b = normalize_value(&fact_b.value_json);
                    if value_a == value_b {
                        continue;
                    }

                    // Only linked evidence makes the values comparable.
                    let anchors_a: Vec<String> = store
                        .evidence_for_fact(fact_a.id)?
                        .into_iter()
                        .map(|e| e.anchor_ref)
                        .collect();
                    let anchors_b: std::collections::HashSet<String> = store
                        .evidence_for_fact(fact_b.id)?
                        .into_iter()
                        .map(|e| e.anchor_ref)
                        .collect();
                    let link = matches.iter().find(|m| {
                        anchors_a.contains(&m.from_anchor_id)
                            && anchors_b.contains(&m.to_anchor_id)
                    });
                    let Some(link) = link else { continue };

                    let severity = if CRITICAL_KEYS.contains(&fact_key) {
                        ConflictSeverity::Critical
                    } else {
                        ConflictSeverity::High
                    };
                    let conflict = push_conflict(
                        store,
                        conflicts,
                        study_id,
                        ConflictType::CrossDocumentValueChange,
                        severity,
                        format!("Value of {fact_key} changed between versions"),
                        format!(
                            "Fact {fact_key} differs between versions: {version_a} has {value_a}, {version_b} has {value_b}"
                        ),
                    )?;
                    store.insert_conflict_item(ConflictItem {
                        conflict_id: conflict,
                        left_anchor_id: Some(link.from_anchor_id.clone()),
                        right_anchor_id: Some(link.to_anchor_id.clone()),
                        left_fact_id: Some(fact_a.id),
                        right_fact_id: Some(fact_b.id),
                        evidence: json!({
                            "value_a": value_a,
                            "value_b": value_b,
                            "version_a": version_a.to_string(),
                            "version_b": version_b.to_string(),
                        }),
                    })?;
                }
            }
        }
        Ok(())
    }
}

fn push_conflict(
    store: &dyn Store,
    conflicts: &mut Vec<Conflict>,
    study_id: Uuid,
    conflict_type: ConflictType,
    severity: ConflictSeverity,
    title: String,
    description: String,
) -> Result<Uuid> {
    let conflict = Conflict {
        id: Uuid::new_v4(),
        study_id,
        conflict_type,
        severity,
        status: ConflictStatus::Open,
        title,
        description,
    };
    let id = conflict.id;
    store.insert_conflict(conflict.clone())?;
    conflicts.push(conflict);
    Ok(id)
}

/// One `resolve_conflict` task per critical conflict, skipping
/// conflicts that already have one.
fn create_resolve_tasks(
    store: &dyn Store,
    study_id: Uuid,
    critical: &[&Conflict],
) -> Result<()> {
    let existing: std::collections::HashSet<String> = store
        .tasks_for_study(study_id)?
        .into_iter()
        .filter(|t| t.task_type == TaskType::ResolveConflict)
        .filter_map(|t| {
            t.payload
                .get("conflict_id")
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .collect();

    for conflict in critical {
        let conflict_id = conflict.id.to_string();
        if existing.contains(&conflict_id) {
            continue;
        }
        store.insert_task(StudyTask {
            id: Uuid::new_v4(),
            study_id,
            task_type: TaskType::ResolveConflict,
            payload: json!({
                "conflict_id": conflict_id,
                "conflict_type": conflict.conflict_type.as_str(),
                "severity": conflict.severity.as_str(),
                "title": conflict.title,
            }),
        })?;
    }
    Ok(())
}

/// `{"value": x, ...}` unwraps to `x`; anything else is itself.
fn extract_main_value(value: &Value) -> Value {
    value.get("value").cloned().unwrap_or_else(|| value.clone())
}

fn extract_numeric(value: &Value) -> Option<f64> {
    let inner = extract_main_value(value);
    match inner {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Age bounds for a fact, pulling the opposite bound from sibling
/// facts when needed. Returns the sibling's id as the right-hand fact.
fn resolve_age_pair(fact: &Fact, facts: &[Fact]) -> (Option<f64>, Option<f64>, Option<Uuid>) {
    if fact.fact_key == "age_range" {
        let min = fact.value_json.get("min").and_then(|v| extract_numeric(v));
        let max = fact.value_json.get("max").and_then(|v| extract_numeric(v));
        return (min, max, None);
    }
    // fact_key == "age_min"
    let min = extract_numeric(&fact.value_json);
    let sibling = facts
        .iter()
        .find(|f| f.fact_key == "age_max" && f.id != fact.id);
    let max = sibling.and_then(|f| extract_numeric(&f.value_json));
    (min, max, sibling.map(|f| f.id))
}

/// Canonical string form used for cross-document equality: numbers
/// normalized, dates to ISO, lists sorted, everything else lowercased.
fn normalize_value(value: &Value) -> String {
    let inner = extract_main_value(value);
    match inner {
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, ' ' | '\u{a0}'))
                .collect();
            let digits_only = cleaned.replace(',', "");
            if !digits_only.is_empty() && digits_only.chars().all(|c| c.is_ascii_digit()) {
                return digits_only
                    .parse::<i64>()
                    .map_or_else(|_| digits_only.clone(), |n| n.to_string());
            }
            let float_candidate = cleaned.replace(',', ".");
            if float_candidate.parse::<f64>().is_ok()
                && float_candidate
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
            {
                if let Ok(f) = float_candidate.parse::<f64>() {
                    return f.to_string();
                }
            }
            if let Some(iso) = parse_date_to_iso(&s) {
                return iso;
            }
            s.trim().to_lowercase()
        }
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().map(ToString::to_string).collect();
            parts.sort();
            serde_json::to_string(&parts).unwrap_or_default()
        }
        Value::Null => String::new(),
        other => serde_json::to_string(&other).unwrap_or_default(),
    }
}

/// Equality after normalization, with a small tolerance when both sides
/// are numeric.
fn normalized_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (extract_numeric(a), extract_numeric(b)) {
        return (x - y).abs() <= 0.01;
    }
    normalize_value(a) == normalize_value(b)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, new_fact};
    use crate::text::text_hash;
    use crate::types::{
        Anchor, AnchorMatch, ContentType, EvidenceRole, FactEvidence, Language, Location,
        MatchMeta, MatchMethod, SourceZone,
    };

    fn anchor(version: Uuid, idx: usize, text: &str) -> Anchor {
        let hash = text_hash(text);
        Anchor {
            doc_version_id: version,
            anchor_id: format!("{version}:p:{idx}:{hash}"),
            section_path: "S".into(),
            content_type: ContentType::P,
            ordinal: 1,
            text_raw: text.into(),
            text_norm: text.into(),
            text_hash: hash,
            location: Location::Body {
                para_index: idx,
                style: "Normal".into(),
            },
            source_zone: SourceZone::Statistics,
            language: Language::En,
        }
    }

    #[test]
    fn test_alpha_and_power_bounds() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();
        store
            .upsert_fact(new_fact(
                study,
                "statistics",
                "alpha",
                serde_json::json!({"value": 0.15}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();
        store
            .upsert_fact(new_fact(
                study,
                "statistics",
                "power",
                serde_json::json!({"value": 0.6}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();

        let conflicts = ConflictDetector::new().check_study(&store, study).unwrap();
        let types: Vec<ConflictType> = conflicts.iter().map(|c| c.conflict_type).collect();
        assert!(types.contains(&ConflictType::StructuralAlpha));
        assert!(types.contains(&ConflictType::StructuralPower));
        assert!(conflicts.iter().all(|c| c.severity == ConflictSeverity::Medium));
    }

    #[test]
    fn test_valid_alpha_and_power_pass() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();
        store
            .upsert_fact(new_fact(
                study,
                "statistics",
                "alpha",
                serde_json::json!({"value": 0.05}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();
        store
            .upsert_fact(new_fact(
                study,
                "statistics",
                "power",
                serde_json::json!({"value": 0.8}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();
        let conflicts = ConflictDetector::new().check_study(&store, study).unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_inverted_age_range() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();
        store
            .upsert_fact(new_fact(
                study,
                "population",
                "age_min",
                serde_json::json!({"value": 65}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();
        store
            .upsert_fact(new_fact(
                study,
                "population",
                "age_max",
                serde_json::json!({"value": 18}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();

        let conflicts = ConflictDetector::new().check_study(&store, study).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::StructuralRange);
        assert_eq!(conflicts[0].severity, ConflictSeverity::High);
    }

    #[test]
    fn test_alternatives_flip_fact_to_conflicting() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();
        let mut fact = new_fact(
            study,
            "population",
            "planned_n_total",
            serde_json::json!({"value": 120}),
            None,
            FactStatus::Extracted,
            None,
            version,
        );
        fact.meta = Some(serde_json::json!({"alternatives": [{"value": 150}]}));
        store.upsert_fact(fact).unwrap();

        let conflicts = ConflictDetector::new().check_study(&store, study).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].conflict_type,
            ConflictType::StructuralAlternatives
        );

        let facts = store.facts_for_study(study).unwrap();
        assert_eq!(facts[0].status, FactStatus::Conflicting);
    }

    #[test]
    fn test_equal_alternatives_do_not_conflict() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();
        let mut fact = new_fact(
            study,
            "protocol_meta",
            "amendment_date",
            serde_json::json!({"value": "2021-03-05"}),
            None,
            FactStatus::Extracted,
            None,
            version,
        );
        // Same date, different spelling: not a conflict.
        fact.meta = Some(serde_json::json!({"alternatives": ["05.03.2021"]}));
        store.upsert_fact(fact).unwrap();

        let conflicts = ConflictDetector::new().check_study(&store, study).unwrap();
        assert!(conflicts.is_empty());
    }

    /// Builds two versions holding the same fact key with different
    /// values, evidence on anchors, and (optionally) an alignment edge
    /// between those anchors.
    fn cross_doc_fixture(store: &MemoryStore, study: Uuid, linked: bool) -> (Uuid, Uuid) {
        let doc = Uuid::new_v4();
        let v1 = Uuid::new_v4();
        let v2 = Uuid::new_v4();
        let a1 = anchor(v1, 1, "Total N = 120 participants");
        let a2 = anchor(v2, 1, "Total N = 150 participants");
        store.insert_anchors(vec![a1.clone(), a2.clone()]).unwrap();

        // Distinct fact_types so both rows coexist under the
        // per-(study, type, key) uniqueness rule.
        let f1 = store
            .upsert_fact(new_fact(
                study,
                "population_v1",
                "planned_n_total",
                serde_json::json!({"value": 120}),
                None,
                FactStatus::Extracted,
                Some(0.9),
                v1,
            ))
            .unwrap();
        let f2 = store
            .upsert_fact(new_fact(
                study,
                "population_v2",
                "planned_n_total",
                serde_json::json!({"value": 150}),
                None,
                FactStatus::Extracted,
                Some(0.9),
                v2,
            ))
            .unwrap();
        store
            .replace_evidence(
                f1.id,
                vec![FactEvidence {
                    fact_id: f1.id,
                    anchor_ref: a1.anchor_id.clone(),
                    role: EvidenceRole::Primary,
                }],
            )
            .unwrap();
        store
            .replace_evidence(
                f2.id,
                vec![FactEvidence {
                    fact_id: f2.id,
                    anchor_ref: a2.anchor_id.clone(),
                    role: EvidenceRole::Primary,
                }],
            )
            .unwrap();

        if linked {
            store
                .replace_matches(
                    v1,
                    v2,
                    vec![AnchorMatch {
                        document_id: doc,
                        from_doc_version_id: v1,
                        to_doc_version_id: v2,
                        from_anchor_id: a1.anchor_id,
                        to_anchor_id: a2.anchor_id,
                        score: 0.9,
                        method: MatchMethod::Fuzzy,
                        meta: MatchMeta::default(),
                    }],
                )
                .unwrap();
        }
        (v1, v2)
    }

    #[test]
    fn test_cross_document_change_is_critical_for_sample_size() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        cross_doc_fixture(&store, study, true);

        let conflicts = ConflictDetector::new().check_study(&store, study).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].conflict_type,
            ConflictType::CrossDocumentValueChange
        );
        assert_eq!(conflicts[0].severity, ConflictSeverity::Critical);

        // A critical conflict creates exactly one resolve task, and a
        // re-run does not duplicate it.
        let tasks = store.tasks_for_study(study).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_type, TaskType::ResolveConflict);
    }

    #[test]
    fn test_cross_document_requires_anchor_link() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        cross_doc_fixture(&store, study, false);
        let conflicts = ConflictDetector::new().check_study(&store, study).unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_same_version_facts_never_conflict() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();
        // Same key from the same version with different values is
        // extraction noise, not a cross-document conflict.
        store
            .upsert_fact(new_fact(
                study,
                "population_a",
                "planned_n_total",
                serde_json::json!({"value": 120}),
                None,
                FactStatus::Extracted,
                Some(0.9),
                version,
            ))
            .unwrap();
        store
            .upsert_fact(new_fact(
                study,
                "population_b",
                "planned_n_total",
                serde_json::json!({"value": 150}),
                None,
                FactStatus::Extracted,
                Some(0.5),
                version,
            ))
            .unwrap();

        let conflicts = ConflictDetector::new().check_study(&store, study).unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_normalize_value_rules() {
        assert_eq!(normalize_value(&serde_json::json!({"value": 64})), "64");
        assert_eq!(normalize_value(&serde_json::json!({"value": "64"})), "64");
        assert_eq!(normalize_value(&serde_json::json!({"value": "1 200"})), "1200");
        assert_eq!(
            normalize_value(&serde_json::json!({"value": "12.04.2010"})),
            "2010-04-12"
        );
        assert_eq!(
            normalize_value(&serde_json::json!({"value": "2010-04-12"})),
            "2010-04-12"
        );
        assert_eq!(normalize_value(&serde_json::json!({"value": "Open Label"})), "open label");
        // Lists compare order-independently.
        assert_eq!(
            normalize_value(&serde_json::json!({"value": ["b", "a"]})),
            normalize_value(&serde_json::json!({"value": ["a", "b"]}))
        );
    }
}
