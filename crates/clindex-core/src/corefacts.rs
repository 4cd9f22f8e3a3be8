//! Core study facts.
//!
//! Assembles a compact, citable snapshot of what a study is (title,
//! phase, design type, arms, sample size, primary-endpoint sections)
//! from rows the pipeline already persisted: the fact KB first, then
//! zone-filtered anchors, then headings. Every extracted field carries
//! its anchor citations so downstream consumers can show provenance.
//!
//! Snapshots are versioned per study; saving never overwrites an
//! earlier snapshot.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::Store;
use crate::types::{Anchor, ContentType, SourceZone, StudyCoreFacts};

static N_EQUALS_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bN\s*=\s*(\d{1,7}(?:[ ,]\d{3})*)\b").unwrap()
});

static TOTAL_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:total|планируемое\s+число|всего)\s+[^0-9]{0,25}(\d{1,7}(?:[ ,]\d{3})*)\b")
        .unwrap()
});

static ARM_BEFORE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:group|arm|treatment)\s+([A-Z0-9]+)\b").unwrap()
});

static ARM_AFTER_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b([A-Z0-9]+)\s+(?:group|arm)\b").unwrap()
});

static PHASE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:phase|фаза)\s+(IV|III|II|I|[1-4])\b").unwrap()
});

/// (pattern, canonical design label) pairs, checked in order.
static DESIGN_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\b(randomized|рандомизированн[а-я]+)\b", "randomized"),
        (r"(?i)\b(open[-\s]?label|открыт[а-я]+)\b", "open-label"),
        (r"(?i)\b(double[-\s]?blind|двойн[а-я]+)\b", "double-blind"),
        (r"(?i)\b(single[-\s]?blind|одинарн[а-я]+)\b", "single-blind"),
        (
            r"(?i)\b(placebo[-\s]?controlled|плацебо[-\s]?контролируем[а-я]+)\b",
            "placebo-controlled",
        ),
    ]
    .iter()
    .map(|(p, label)| {
        #[allow(clippy::unwrap_used)]
        (Regex::new(p).unwrap(), *label)
    })
    .collect()
});

/// Builds core-facts snapshots from persisted rows.
#[derive(Debug, Default)]
pub struct CoreFactsBuilder;

impl CoreFactsBuilder {
    /// Create a builder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Build the snapshot payload for a version.
    pub fn build(&self, store: &dyn Store, doc_version_id: Uuid) -> Result<Value> {
        let version = store.version(doc_version_id)?;
        let document = store.document(version.document_id)?;
        let study_id = document.study_id;
        let anchors = store.anchors_for_version(doc_version_id)?;

        let mut facts = json!({
            "study_title": null,
            "phase": null,
            "study_design_type": null,
            "population_short": null,
            "arms": [],
            "primary_endpoints": [],
            "sample_size": null,
            "duration": null,
            "citations": {},
        });

        facts["study_title"] = json!(document.title);
        facts["citations"]["study_title"] = json!([]);

        // 1. Sample size from the fact KB, falling back to a scan over
        // statistics-zone anchors.
        if let Some((value, citations)) = self.sample_size_from_kb(store, study_id)? {
            facts["sample_size"] = value;
            facts["citations"]["sample_size"] = json!(citations);
        } else if let Some((value, citation)) = sample_size_from_anchors(&anchors) {
            facts["sample_size"] = value;
            facts["citations"]["sample_size"] = json!([citation]);
        }

        // 2. Primary-endpoint sections from topic assignments.
        let assignments = store.assignments_for_version(doc_version_id)?;
        let endpoint_blocks: Vec<&str> = assignments
            .iter()
            .filter(|a| a.topic_key == "endpoints")
            .map(|a| a.heading_block_id.as_str())
            .collect();
        if !endpoint_blocks.is_empty() {
            let mut titles = Vec::new();
            let mut citations = Vec::new();
            for block_id in endpoint_blocks {
                // Block ids embed the heading anchor id.
                let Some(anchor_id) = block_id.strip_prefix("hb:") else {
                    continue;
                };
                if let Some(anchor) = anchors.iter().find(|a| a.anchor_id == anchor_id) {
                    titles.push(anchor.text_norm.clone());
                    citations.push(anchor.anchor_id.clone());
                }
            }
            facts["primary_endpoints"] = json!(titles.iter().take(5).collect::<Vec<_>>());
            facts["citations"]["primary_endpoints"] =
                json!(citations.iter().take(10).collect::<Vec<_>>());
        }

        // 3. Arms from IP-zone anchors.
        let (arms, arm_citations) = arms_from_anchors(&anchors);
        if !arms.is_empty() {
            facts["arms"] = json!(arms);
            facts["citations"]["arms"] = json!(arm_citations);
        }

        // 4. Phase and design type from headings.
        if let Some((phase, citation)) = phase_from_headers(&anchors) {
            facts["phase"] = json!(phase);
            facts["citations"]["phase"] = json!([citation]);
        }
        if let Some((design, citation)) = design_from_headers(&anchors) {
            facts["study_design_type"] = json!(design);
            facts["citations"]["study_design_type"] = json!([citation]);
        }

        info!(study = %study_id, version = %doc_version_id, "core facts built");
        Ok(facts)
    }

    /// Build and persist a snapshot for a version.
    pub fn build_and_save(
        &self,
        store: &dyn Store,
        doc_version_id: Uuid,
    ) -> Result<StudyCoreFacts> {
        let version = store.version(doc_version_id)?;
        let document = store.document(version.document_id)?;
        let facts = self.build(store, doc_version_id)?;
        store.save_core_facts(document.study_id, Some(doc_version_id), facts)
    }

    fn sample_size_from_kb(
        &self,
        store: &dyn Store,
        study_id: Uuid,
    ) -> Result<Option<(Value, Vec<String>)>> {
        let facts = store.facts_for_study(study_id)?;
        let Some(fact) = facts
            .iter()
            .find(|f| f.fact_type == "population" && f.fact_key == "planned_n_total")
        else {
            return Ok(None);
        };
        let value = &fact.value_json["value"];
        if value.is_null() {
            return Ok(None);
        }
        let unit = fact.unit.clone().unwrap_or_else(|| "participants".into());
        let citations: Vec<String> = store
            .evidence_for_fact(fact.id)?
            .into_iter()
            .map(|e| e.anchor_ref)
            .collect();
        Ok(Some((
            json!({ "value": value, "unit": unit }),
            citations,
        )))
    }
}

fn sample_size_from_anchors(anchors: &[Anchor]) -> Option<(Value, String)> {
    for anchor in anchors
        .iter()
        .filter(|a| a.source_zone == SourceZone::Statistics)
        .take(50)
    {
        let text = &anchor.text_norm;
        let Some(caps) = N_EQUALS_RE
            .captures(text)
            .or_else(|| TOTAL_RE.captures(text))
        else {
            continue;
        };
        let raw: String = caps[1]
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        if let Ok(n) = raw.parse::<i64>() {
            if (1..=1_000_000).contains(&n) {
                return Some((
                    json!({ "value": n, "unit": "participants" }),
                    anchor.anchor_id.clone(),
                ));
            }
        }
    }
    None
}

fn arms_from_anchors(anchors: &[Anchor]) -> (Vec<Value>, Vec<String>) {
    let mut arms: Vec<Value> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut citations: Vec<String> = Vec::new();

    for anchor in anchors
        .iter()
        .filter(|a| a.source_zone == SourceZone::Ip)
        .take(100)
    {
        for regex in [&*ARM_BEFORE_RE, &*ARM_AFTER_RE] {
            for caps in regex.captures_iter(&anchor.text_norm) {
                let name = caps[1].trim().to_uppercase();
                if name.is_empty() || names.contains(&name) {
                    continue;
                }
                names.push(name.clone());
                arms.push(json!({ "name": name, "dose": null, "regimen": null }));
                citations.push(anchor.anchor_id.clone());
            }
        }
    }
    arms.truncate(10);
    citations.truncate(20);
    (arms, citations)
}

fn phase_from_headers(anchors: &[Anchor]) -> Option<(String, String)> {
    for anchor in headers(anchors) {
        if let Some(caps) = PHASE_RE.captures(&anchor.text_norm) {
            let raw = caps[1].to_uppercase();
            let phase = match raw.as_str() {
                "1" => "I",
                "2" => "II",
                "3" => "III",
                "4" => "IV",
                other => other,
            };
            return Some((phase.to_string(), anchor.anchor_id.clone()));
        }
    }
    None
}

fn design_from_headers(anchors: &[Anchor]) -> Option<(String, String)> {
    for anchor in headers(anchors) {
        for (regex, label) in DESIGN_PATTERNS.iter() {
            if regex.is_match(&anchor.text_norm) {
                return Some(((*label).to_string(), anchor.anchor_id.clone()));
            }
        }
    }
    None
}

fn headers(anchors: &[Anchor]) -> impl Iterator<Item = &Anchor> {
    anchors
        .iter()
        .filter(|a| a.content_type == ContentType::Hdr)
        .take(100)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::IngestionPipeline;
    use crate::reader::{SourceDocument, SourceParagraph};
    use crate::storage::MemoryStore;
    use crate::types::{Document, DocumentType, DocumentVersion, Study};

    async fn ingested_fixture(paragraphs: Vec<SourceParagraph>) -> (MemoryStore, Uuid, Uuid) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocol.docx.json");
        std::fs::write(&path, "{}").unwrap();

        let store = MemoryStore::new();
        let study_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        let version_id = Uuid::new_v4();
        store
            .insert_study(Study {
                id: study_id,
                title: "A Phase III Study of Drug X".into(),
            })
            .unwrap();
        store
            .insert_document(Document {
                id: document_id,
                study_id,
                doc_type: DocumentType::Protocol,
                title: "Protocol X".into(),
            })
            .unwrap();
        store
            .insert_version(DocumentVersion {
                id: version_id,
                document_id,
                version_no: 1,
                source_file_uri: path.display().to_string(),
                ingestion_summary: None,
            })
            .unwrap();

        let doc = SourceDocument {
            paragraphs,
            tables: vec![],
            footnotes: Some(vec![]),
        };
        let config = Config::default();
        IngestionPipeline::new(&config, &store)
            .ingest(version_id, &doc, false)
            .await
            .unwrap();
        // The temp dir may be dropped now; ingestion already validated
        // the path.
        drop(dir);
        (store, study_id, version_id)
    }

    #[tokio::test]
    async fn test_snapshot_from_kb_and_headers() {
        let (store, study_id, version_id) = ingested_fixture(vec![
            SourceParagraph::new("A Randomized Double-Blind Phase III Study", "Heading 1"),
            SourceParagraph::new("Total N = 240 participants", "Normal"),
        ])
        .await;

        let snapshot = CoreFactsBuilder::new()
            .build_and_save(&store, version_id)
            .unwrap();
        assert_eq!(snapshot.facts_version, 1);
        assert_eq!(snapshot.facts["study_title"], "Protocol X");
        assert_eq!(snapshot.facts["phase"], "III");
        assert_eq!(snapshot.facts["study_design_type"], "randomized");
        assert_eq!(snapshot.facts["sample_size"]["value"], 240);
        // Sample size cites the fact's evidence anchor.
        assert_eq!(
            snapshot.facts["citations"]["sample_size"]
                .as_array()
                .unwrap()
                .len(),
            1
        );

        let latest = store.latest_core_facts(study_id).unwrap().unwrap();
        assert_eq!(latest.facts_version, 1);
    }

    #[tokio::test]
    async fn test_snapshot_versions_increment() {
        let (store, study_id, version_id) = ingested_fixture(vec![
            SourceParagraph::new("Background", "Heading 1"),
            SourceParagraph::new("Some text.", "Normal"),
        ])
        .await;

        let builder = CoreFactsBuilder::new();
        builder.build_and_save(&store, version_id).unwrap();
        let second = builder.build_and_save(&store, version_id).unwrap();
        assert_eq!(second.facts_version, 2);
        assert_eq!(
            store.latest_core_facts(study_id).unwrap().unwrap().facts_version,
            2
        );
    }

    #[tokio::test]
    async fn test_empty_fields_stay_null() {
        let (store, _study, version_id) = ingested_fixture(vec![
            SourceParagraph::new("Background", "Heading 1"),
            SourceParagraph::new("No quantitative statements here.", "Normal"),
        ])
        .await;

        let facts = CoreFactsBuilder::new().build(&store, version_id).unwrap();
        assert!(facts["phase"].is_null());
        assert!(facts["sample_size"].is_null());
        assert_eq!(facts["arms"], json!([]));
        assert_eq!(facts["primary_endpoints"], json!([]));
    }
}
