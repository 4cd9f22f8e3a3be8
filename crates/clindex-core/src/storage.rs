//! Persistence boundary.
//!
//! The pipeline writes through the [`Store`] trait so the actual
//! database is an external collaborator. [`MemoryStore`] is the
//! reference implementation used by the CLI and the test suite; it
//! enforces the same invariants a relational schema would:
//!
//! - `anchor_id` is globally unique (duplicates are a
//!   [`Error::ConstraintViolation`], indicating corrupt source ids);
//! - evidence rows must reference existing anchors;
//! - facts are unique per `(study_id, fact_type, fact_key)` and
//!   re-extraction updates in place;
//! - replacing an alignment or a fact's evidence leaves no stale rows.
//!
//! All operations are synchronous and coarse; the orchestrator owns
//! transaction boundaries by ordering its calls.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    Anchor, AnchorMatch, BlockTopicAssignment, Chunk, Conflict, ConflictItem, Document,
    DocumentVersion, Fact, FactEvidence, FactStatus, IngestionRun, Study, StudyCoreFacts,
    StudyTask,
};

/// The persistence contract consumed by the pipeline.
#[allow(clippy::missing_errors_doc)]
pub trait Store: Send + Sync {
    /// Register a study.
    fn insert_study(&self, study: Study) -> Result<()>;
    /// Register a document.
    fn insert_document(&self, document: Document) -> Result<()>;
    /// Register a document version.
    fn insert_version(&self, version: DocumentVersion) -> Result<()>;
    /// Fetch a document version.
    fn version(&self, version_id: Uuid) -> Result<DocumentVersion>;
    /// Fetch a document.
    fn document(&self, document_id: Uuid) -> Result<Document>;
    /// Attach the latest ingestion summary to a version.
    fn update_version_summary(&self, version_id: Uuid, summary: serde_json::Value) -> Result<()>;

    /// Delete all rows derived from a version: anchors, chunks,
    /// assignments, and the facts created from it together with their
    /// evidence.
    fn delete_version_data(&self, version_id: Uuid) -> Result<()>;

    /// Bulk-insert anchors. Fails on a duplicate `anchor_id`.
    fn insert_anchors(&self, anchors: Vec<Anchor>) -> Result<()>;
    /// All anchors of a version, in insertion (document) order.
    fn anchors_for_version(&self, version_id: Uuid) -> Result<Vec<Anchor>>;

    /// Bulk-insert chunks.
    fn insert_chunks(&self, chunks: Vec<Chunk>) -> Result<()>;
    /// All chunks of a version, in insertion order.
    fn chunks_for_version(&self, version_id: Uuid) -> Result<Vec<Chunk>>;

    /// Insert or update a fact keyed by `(study_id, fact_type,
    /// fact_key)`; returns the stored row (existing id preserved).
    fn upsert_fact(&self, fact: Fact) -> Result<Fact>;
    /// Update a fact in place (status flips from the conflict
    /// detector).
    fn update_fact(&self, fact: Fact) -> Result<()>;
    /// All facts of a study.
    fn facts_for_study(&self, study_id: Uuid) -> Result<Vec<Fact>>;
    /// Replace a fact's evidence atomically. Every referenced anchor
    /// must exist.
    fn replace_evidence(&self, fact_id: Uuid, evidence: Vec<FactEvidence>) -> Result<()>;
    /// Evidence rows of a fact.
    fn evidence_for_fact(&self, fact_id: Uuid) -> Result<Vec<FactEvidence>>;

    /// Replace the alignment for a (from, to) version pair.
    fn replace_matches(
        &self,
        from_version_id: Uuid,
        to_version_id: Uuid,
        matches: Vec<AnchorMatch>,
    ) -> Result<()>;
    /// Stored matches for a (from, to) version pair.
    fn matches_between(&self, from_version_id: Uuid, to_version_id: Uuid)
    -> Result<Vec<AnchorMatch>>;

    /// Insert or update a block-topic assignment keyed by
    /// `(doc_version_id, heading_block_id)`.
    fn upsert_assignment(&self, assignment: BlockTopicAssignment) -> Result<()>;
    /// Assignments of a version.
    fn assignments_for_version(&self, version_id: Uuid) -> Result<Vec<BlockTopicAssignment>>;

    /// Record a conflict.
    fn insert_conflict(&self, conflict: Conflict) -> Result<()>;
    /// Record a conflict item.
    fn insert_conflict_item(&self, item: ConflictItem) -> Result<()>;
    /// Conflicts of a study.
    fn conflicts_for_study(&self, study_id: Uuid) -> Result<Vec<Conflict>>;

    /// Record a follow-up task.
    fn insert_task(&self, task: StudyTask) -> Result<()>;
    /// Tasks of a study.
    fn tasks_for_study(&self, study_id: Uuid) -> Result<Vec<StudyTask>>;

    /// Open or update an ingestion-run record.
    fn save_run(&self, run: IngestionRun) -> Result<()>;
    /// Runs recorded for a version.
    fn runs_for_version(&self, version_id: Uuid) -> Result<Vec<IngestionRun>>;

    /// Save a core-facts snapshot; the snapshot version increments per
    /// study.
    fn save_core_facts(
        &self,
        study_id: Uuid,
        doc_version_id: Option<Uuid>,
        facts: serde_json::Value,
    ) -> Result<StudyCoreFacts>;
    /// Latest core-facts snapshot of a study.
    fn latest_core_facts(&self, study_id: Uuid) -> Result<Option<StudyCoreFacts>>;
}

#[derive(Default)]
struct Inner {
    studies: HashMap<Uuid, Study>,
    documents: HashMap<Uuid, Document>,
    versions: HashMap<Uuid, DocumentVersion>,
    anchors: Vec<Anchor>,
    anchor_ids: HashSet<String>,
    chunks: Vec<Chunk>,
    facts: HashMap<Uuid, Fact>,
    evidence: Vec<FactEvidence>,
    matches: Vec<AnchorMatch>,
    assignments: Vec<BlockTopicAssignment>,
    conflicts: Vec<Conflict>,
    conflict_items: Vec<ConflictItem>,
    tasks: Vec<StudyTask>,
    runs: Vec<IngestionRun>,
    core_facts: Vec<StudyCoreFacts>,
}

/// In-memory reference store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        #[allow(clippy::unwrap_used)]
        self.inner.lock().unwrap()
    }

    /// Conflict items recorded for a study's conflicts (test and CLI
    /// introspection).
    pub fn conflict_items_for_study(&self, study_id: Uuid) -> Result<Vec<ConflictItem>> {
        let inner = self.lock();
        let conflict_ids: HashSet<Uuid> = inner
            .conflicts
            .iter()
            .filter(|c| c.study_id == study_id)
            .map(|c| c.id)
            .collect();
        Ok(inner
            .conflict_items
            .iter()
            .filter(|i| conflict_ids.contains(&i.conflict_id))
            .cloned()
            .collect())
    }
}

impl Store for MemoryStore {
    fn insert_study(&self, study: Study) -> Result<()> {
        self.lock().studies.insert(study.id, study);
        Ok(())
    }

    fn insert_document(&self, document: Document) -> Result<()> {
        self.lock().documents.insert(document.id, document);
        Ok(())
    }

    fn insert_version(&self, version: DocumentVersion) -> Result<()> {
        self.lock().versions.insert(version.id, version);
        Ok(())
    }

    fn version(&self, version_id: Uuid) -> Result<DocumentVersion> {
        self.lock()
            .versions
            .get(&version_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("DocumentVersion {version_id}")))
    }

    fn document(&self, document_id: Uuid) -> Result<Document> {
        self.lock()
            .documents
            .get(&document_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Document {document_id}")))
    }

    fn update_version_summary(&self, version_id: Uuid, summary: serde_json::Value) -> Result<()> {
        let mut inner = self.lock();
        let version = inner
            .versions
            .get_mut(&version_id)
            .ok_or_else(|| Error::NotFound(format!("DocumentVersion {version_id}")))?;
        version.ingestion_summary = Some(summary);
        Ok(())
    }

    fn delete_version_data(&self, version_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        inner.anchors.retain(|a| a.doc_version_id != version_id);
        let surviving_ids: HashSet<String> =
            inner.anchors.iter().map(|a| a.anchor_id.clone()).collect();
        inner.anchor_ids = surviving_ids;
        inner.chunks.retain(|c| c.doc_version_id != version_id);
        inner.assignments.retain(|a| a.doc_version_id != version_id);

        let doomed_facts: Vec<Uuid> = inner
            .facts
            .values()
            .filter(|f| f.created_from_doc_version_id == Some(version_id))
            .map(|f| f.id)
            .collect();
        for fact_id in &doomed_facts {
            inner.facts.remove(fact_id);
        }
        let doomed: HashSet<Uuid> = doomed_facts.into_iter().collect();
        inner.evidence.retain(|e| !doomed.contains(&e.fact_id));
        Ok(())
    }

    fn insert_anchors(&self, anchors: Vec<Anchor>) -> Result<()> {
        let mut inner = self.lock();
        for anchor in &anchors {
            if inner.anchor_ids.contains(&anchor.anchor_id) {
                return Err(Error::ConstraintViolation(format!(
                    "duplicate anchor_id {}",
                    anchor.anchor_id
                )));
            }
        }
        for anchor in anchors {
            inner.anchor_ids.insert(anchor.anchor_id.clone());
            inner.anchors.push(anchor);
        }
        Ok(())
    }

    fn anchors_for_version(&self, version_id: Uuid) -> Result<Vec<Anchor>> {
        Ok(self
            .lock()
            .anchors
            .iter()
            .filter(|a| a.doc_version_id == version_id)
            .cloned()
            .collect())
    }

    fn insert_chunks(&self, chunks: Vec<Chunk>) -> Result<()> {
        self.lock().chunks.extend(chunks);
        Ok(())
    }

    fn chunks_for_version(&self, version_id: Uuid) -> Result<Vec<Chunk>> {
        Ok(self
            .lock()
            .chunks
            .iter()
            .filter(|c| c.doc_version_id == version_id)
            .cloned()
            .collect())
    }

    fn upsert_fact(&self, fact: Fact) -> Result<Fact> {
        let mut inner = self.lock();
        let existing_id = inner
            .facts
            .values()
            .find(|f| {
                f.study_id == fact.study_id
                    && f.fact_type == fact.fact_type
                    && f.fact_key == fact.fact_key
            })
            .map(|f| f.id);
        let stored = if let Some(id) = existing_id {
            let mut updated = fact;
            updated.id = id;
            inner.facts.insert(id, updated.clone());
            updated
        } else {
            inner.facts.insert(fact.id, fact.clone());
            fact
        };
        Ok(stored)
    }

    fn update_fact(&self, fact: Fact) -> Result<()> {
        let mut inner = self.lock();
        if !inner.facts.contains_key(&fact.id) {
            return Err(Error::NotFound(format!("Fact {}", fact.id)));
        }
        inner.facts.insert(fact.id, fact);
        Ok(())
    }

    fn facts_for_study(&self, study_id: Uuid) -> Result<Vec<Fact>> {
        let mut facts: Vec<Fact> = self
            .lock()
            .facts
            .values()
            .filter(|f| f.study_id == study_id)
            .cloned()
            .collect();
        facts.sort_by(|a, b| {
            (a.fact_type.as_str(), a.fact_key.as_str()).cmp(&(b.fact_type.as_str(), b.fact_key.as_str()))
        });
        Ok(facts)
    }

    fn replace_evidence(&self, fact_id: Uuid, evidence: Vec<FactEvidence>) -> Result<()> {
        let mut inner = self.lock();
        for row in &evidence {
            if !inner.anchor_ids.contains(&row.anchor_ref) {
                return Err(Error::ConstraintViolation(format!(
                    "evidence references unknown anchor {}",
                    row.anchor_ref
                )));
            }
        }
        inner.evidence.retain(|e| e.fact_id != fact_id);
        inner.evidence.extend(evidence);
        Ok(())
    }

    fn evidence_for_fact(&self, fact_id: Uuid) -> Result<Vec<FactEvidence>> {
        Ok(self
            .lock()
            .evidence
            .iter()
            .filter(|e| e.fact_id == fact_id)
            .cloned()
            .collect())
    }

    fn replace_matches(
        &self,
        from_version_id: Uuid,
        to_version_id: Uuid,
        matches: Vec<AnchorMatch>,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.matches.retain(|m| {
            !(m.from_doc_version_id == from_version_id && m.to_doc_version_id == to_version_id)
        });
        inner.matches.extend(matches);
        Ok(())
    }

    fn matches_between(
        &self,
        from_version_id: Uuid,
        to_version_id: Uuid,
    ) -> Result<Vec<AnchorMatch>> {
        Ok(self
            .lock()
            .matches
            .iter()
            .filter(|m| {
                m.from_doc_version_id == from_version_id && m.to_doc_version_id == to_version_id
            })
            .cloned()
            .collect())
    }

    fn upsert_assignment(&self, assignment: BlockTopicAssignment) -> Result<()> {
        let mut inner = self.lock();
        inner.assignments.retain(|a| {
            !(a.doc_version_id == assignment.doc_version_id
                && a.heading_block_id == assignment.heading_block_id)
        });
        inner.assignments.push(assignment);
        Ok(())
    }

    fn assignments_for_version(&self, version_id: Uuid) -> Result<Vec<BlockTopicAssignment>> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .filter(|a| a.doc_version_id == version_id)
            .cloned()
            .collect())
    }

    fn insert_conflict(&self, conflict: Conflict) -> Result<()> {
        self.lock().conflicts.push(conflict);
        Ok(())
    }

    fn insert_conflict_item(&self, item: ConflictItem) -> Result<()> {
        self.lock().conflict_items.push(item);
        Ok(())
    }

    fn conflicts_for_study(&self, study_id: Uuid) -> Result<Vec<Conflict>> {
        Ok(self
            .lock()
            .conflicts
            .iter()
            .filter(|c| c.study_id == study_id)
            .cloned()
            .collect())
    }

    fn insert_task(&self, task: StudyTask) -> Result<()> {
        self.lock().tasks.push(task);
        Ok(())
    }

    fn tasks_for_study(&self, study_id: Uuid) -> Result<Vec<StudyTask>> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|t| t.study_id == study_id)
            .cloned()
            .collect())
    }

    fn save_run(&self, run: IngestionRun) -> Result<()> {
        let mut inner = self.lock();
        if let Some(existing) = inner.runs.iter_mut().find(|r| r.run_id == run.run_id) {
            *existing = run;
        } else {
            inner.runs.push(run);
        }
        Ok(())
    }

    fn runs_for_version(&self, version_id: Uuid) -> Result<Vec<IngestionRun>> {
        Ok(self
            .lock()
            .runs
            .iter()
            .filter(|r| r.doc_version_id == version_id)
            .cloned()
            .collect())
    }

    fn save_core_facts(
        &self,
        study_id: Uuid,
        doc_version_id: Option<Uuid>,
        facts: serde_json::Value,
    ) -> Result<StudyCoreFacts> {
        let mut inner = self.lock();
        let next_version = inner
            .core_facts
            .iter()
            .filter(|c| c.study_id == study_id)
            .map(|c| c.facts_version)
            .max()
            .unwrap_or(0)
            + 1;
        let snapshot = StudyCoreFacts {
            study_id,
            doc_version_id,
            facts_version: next_version,
            facts,
        };
        inner.core_facts.push(snapshot.clone());
        Ok(snapshot)
    }

    fn latest_core_facts(&self, study_id: Uuid) -> Result<Option<StudyCoreFacts>> {
        Ok(self
            .lock()
            .core_facts
            .iter()
            .filter(|c| c.study_id == study_id)
            .max_by_key(|c| c.facts_version)
            .cloned())
    }
}

/// Build a fact row ready for upsert.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn new_fact(
    study_id: Uuid,
    fact_type: &str,
    fact_key: &str,
    value_json: serde_json::Value,
    unit: Option<String>,
    status: FactStatus,
    confidence: Option<f64>,
    doc_version_id: Uuid,
) -> Fact {
    Fact {
        id: Uuid::new_v4(),
        study_id,
        fact_type: fact_type.to_string(),
        fact_key: fact_key.to_string(),
        value_json,
        unit,
        status,
        confidence,
        created_from_doc_version_id: Some(doc_version_id),
        meta: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::text::text_hash;
    use crate::types::{ContentType, EvidenceRole, Language, Location, SourceZone};
    use serde_json::json;

    fn anchor(version_id: Uuid, idx: usize, text: &str) -> Anchor {
        let hash = text_hash(text);
        Anchor {
            doc_version_id: version_id,
            anchor_id: format!("{version_id}:p:{idx}:{hash}"),
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
            source_zone: SourceZone::Unknown,
            language: Language::En,
        }
    }

    #[test]
    fn test_duplicate_anchor_id_rejected() {
        let store = MemoryStore::new();
        let v = Uuid::new_v4();
        store.insert_anchors(vec![anchor(v, 1, "same")]).unwrap();
        let err = store.insert_anchors(vec![anchor(v, 1, "same")]).unwrap_err();
        assert_eq!(err.category(), "constraint_violation");
    }

    #[test]
    fn test_fact_upsert_is_keyed_per_study() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();

        let first = store
            .upsert_fact(new_fact(
                study,
                "population",
                "planned_n_total",
                json!({"value": 100}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();
        let second = store
            .upsert_fact(new_fact(
                study,
                "population",
                "planned_n_total",
                json!({"value": 120}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();

        // Same row updated in place.
        assert_eq!(first.id, second.id);
        let facts = store.facts_for_study(study).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value_json["value"], 120);
    }

    #[test]
    fn test_evidence_replacement_leaves_no_stale_rows() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();
        store
            .insert_anchors(vec![anchor(version, 1, "a"), anchor(version, 2, "b")])
            .unwrap();
        let anchors = store.anchors_for_version(version).unwrap();

        let fact = store
            .upsert_fact(new_fact(
                study,
                "t",
                "k",
                json!({"value": 1}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();

        store
            .replace_evidence(
                fact.id,
                vec![FactEvidence {
                    fact_id: fact.id,
                    anchor_ref: anchors[0].anchor_id.clone(),
                    role: EvidenceRole::Primary,
                }],
            )
            .unwrap();
        store
            .replace_evidence(
                fact.id,
                vec![FactEvidence {
                    fact_id: fact.id,
                    anchor_ref: anchors[1].anchor_id.clone(),
                    role: EvidenceRole::Primary,
                }],
            )
            .unwrap();

        let evidence = store.evidence_for_fact(fact.id).unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].anchor_ref, anchors[1].anchor_id);
    }

    #[test]
    fn test_evidence_must_reference_existing_anchor() {
        let store = MemoryStore::new();
        let err = store
            .replace_evidence(
                Uuid::new_v4(),
                vec![FactEvidence {
                    fact_id: Uuid::new_v4(),
                    anchor_ref: "ghost:p:1:deadbeef".into(),
                    role: EvidenceRole::Primary,
                }],
            )
            .unwrap_err();
        assert_eq!(err.category(), "constraint_violation");
    }

    #[test]
    fn test_delete_version_cascades() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let version = Uuid::new_v4();
        store.insert_anchors(vec![anchor(version, 1, "a")]).unwrap();
        let stored = store.anchors_for_version(version).unwrap();
        let fact = store
            .upsert_fact(new_fact(
                study,
                "t",
                "k",
                json!({"value": 1}),
                None,
                FactStatus::Extracted,
                None,
                version,
            ))
            .unwrap();
        store
            .replace_evidence(
                fact.id,
                vec![FactEvidence {
                    fact_id: fact.id,
                    anchor_ref: stored[0].anchor_id.clone(),
                    role: EvidenceRole::Primary,
                }],
            )
            .unwrap();

        store.delete_version_data(version).unwrap();
        assert!(store.anchors_for_version(version).unwrap().is_empty());
        assert!(store.facts_for_study(study).unwrap().is_empty());
        assert!(store.evidence_for_fact(fact.id).unwrap().is_empty());

        // Re-inserting the same anchors succeeds after cleanup.
        store.insert_anchors(vec![anchor(version, 1, "a")]).unwrap();
    }

    #[test]
    fn test_assignment_upsert_is_unique_per_block() {
        let store = MemoryStore::new();
        let version = Uuid::new_v4();
        for confidence in [0.6, 0.8] {
            store
                .upsert_assignment(BlockTopicAssignment {
                    doc_version_id: version,
                    heading_block_id: "hb:x".into(),
                    topic_key: "endpoints".into(),
                    confidence,
                    debug: json!({}),
                })
                .unwrap();
        }
        let assignments = store.assignments_for_version(version).unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].confidence, 0.8);
    }

    #[test]
    fn test_run_save_is_upsert_by_run_id() {
        let store = MemoryStore::new();
        let version = Uuid::new_v4();
        let mut run = IngestionRun {
            run_id: Uuid::new_v4(),
            doc_version_id: version,
            status: crate::types::RunStatus::Partial,
            started_at: chrono::Utc::now(),
            finished_at: None,
            warnings: vec![],
            errors: vec![],
            pipeline_config_hash: "h".into(),
            summary: None,
        };
        store.save_run(run.clone()).unwrap();
        run.status = crate::types::RunStatus::Ok;
        store.save_run(run).unwrap();
        let runs = store.runs_for_version(version).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, crate::types::RunStatus::Ok);
    }
}
