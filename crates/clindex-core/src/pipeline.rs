//! The ingestion orchestrator.
//!
//! Composes the whole pipeline for one document version: cleanup,
//! anchor extraction, SoA, chunking (with embeddings when available),
//! rules-based facts with the optional LLM double-check, heading blocks
//! and topic mapping, then metrics and the quality gate. The
//! orchestrator owns the transaction boundary; component calls never
//! commit on their own, and re-running with `force = true` is the only
//! supported update path.
//!
//! Every run gets an [`IngestionRun`] record and a stable-shape
//! [`IngestSummary`]; a fatal error still persists the summary-so-far
//! with status `failed` before propagating.

use serde::Serialize;
use serde_json::json;
use std::path::Path;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::blocks::build_heading_blocks;
use crate::chunker::NarrativeChunker;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::facts::{FactCandidate, FactExtractor};
use crate::llm::{ChatProvider, Embedder, with_retry};
use crate::metrics::{IngestionMetrics, MetricsCollector};
use crate::normalizer::ValueNormalizer;
use crate::parser::{DocxParser, DocxSummary};
use crate::reader::SourceDocument;
use crate::soa::{SoaExtractor, SoaResult};
use crate::storage::{Store, new_fact};
use crate::types::{
    Anchor, EvidenceRole, Fact, FactEvidence, FactStatus, IngestionRun, RunStatus, Topic,
    TopicZonePrior,
};

/// Stable-shape run summary. All fields are always present; empty
/// collections serialize as `[]`, absent objects as `null`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct IngestSummary {
    /// Anchors persisted (body + footnote + cell).
    pub anchors_created: usize,
    /// Whether an SoA table was found.
    pub soa_found: bool,
    /// SoA facts written (visits/procedures/matrix).
    pub soa_facts_written: usize,
    /// Chunks persisted.
    pub chunks_created: usize,
    /// Topic-mapping outcome: `ok`, `empty`, or `skipped`.
    pub mapping_status: String,
    /// Run warnings, in order of appearance.
    pub warnings: Vec<String>,
    /// Run errors (non-empty only for failed runs).
    pub errors: Vec<String>,
    /// Full metric tree.
    pub metrics: IngestionMetrics,
    /// Parser summary, when parsing ran.
    pub docx_summary: Option<DocxSummary>,
}

/// The orchestrator. Borrow one per ingestion batch; each call to
/// [`IngestionPipeline::ingest`] processes one version.
pub struct IngestionPipeline<'a> {
    config: &'a Config,
    store: &'a dyn Store,
    embedder: Option<&'a dyn Embedder>,
    chat: Option<&'a dyn ChatProvider>,
    topics: Vec<Topic>,
    zone_priors: Vec<TopicZonePrior>,
}

impl<'a> IngestionPipeline<'a> {
    /// Create a pipeline without LLM collaborators or a topic catalog.
    #[must_use]
    pub const fn new(config: &'a Config, store: &'a dyn Store) -> Self {
        Self {
            config,
            store,
            embedder: None,
            chat: None,
            topics: Vec::new(),
            zone_priors: Vec::new(),
        }
    }

    /// Attach an embedding provider.
    #[must_use]
    pub fn with_embedder(mut self, embedder: &'a dyn Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Attach a chat provider (enables the fact double-check).
    #[must_use]
    pub fn with_chat(mut self, chat: &'a dyn ChatProvider) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Attach the topic catalog and zone-prior overrides.
    #[must_use]
    pub fn with_topics(mut self, topics: Vec<Topic>, zone_priors: Vec<TopicZonePrior>) -> Self {
        self.topics = topics;
        self.zone_priors = zone_priors;
        self
    }

    /// Ingest one version from an already-decoded document model.
    ///
    /// The version's `source_file_uri` is still validated (existence and
    /// extension); `force` re-runs ingestion over a version that already
    /// has runs recorded.
    pub async fn ingest(
        &self,
        doc_version_id: Uuid,
        source: &SourceDocument,
        force: bool,
    ) -> Result<IngestionRun> {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest", run_id = %run_id, doc_version_id = %doc_version_id);
        let _guard = span.enter();

        let version = self.store.version(doc_version_id)?;
        let document = self.store.document(version.document_id)?;

        if !force && !self.store.runs_for_version(doc_version_id)?.is_empty() {
            return Err(Error::Other(format!(
                "version {doc_version_id} already ingested; re-run with force"
            )));
        }

        let mut run = IngestionRun {
            run_id,
            doc_version_id,
            status: RunStatus::Partial,
            started_at: chrono::Utc::now(),
            finished_at: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            pipeline_config_hash: self.config.pipeline_config_hash(),
            summary: None,
        };
        self.store.save_run(run.clone())?;

        let mut summary = IngestSummary::default();
        let outcome = self
            .run_steps(doc_version_id, document.study_id, document.doc_type, &version.source_file_uri, source, &mut summary)
            .await;

        match outcome {
            Ok(needs_review) => {
                run.status = if !summary.errors.is_empty() {
                    RunStatus::Failed
                } else if needs_review || !summary.warnings.is_empty() {
                    RunStatus::Partial
                } else {
                    RunStatus::Ok
                };
            }
            Err(err) => {
                error!(error = %err, "ingestion failed");
                summary.errors.push(err.to_string());
                run.status = RunStatus::Failed;
                run.warnings.clone_from(&summary.warnings);
                run.errors.clone_from(&summary.errors);
                run.finished_at = Some(chrono::Utc::now());
                run.summary = Some(serde_json::to_value(&summary)?);
                self.store.save_run(run)?;
                return Err(err);
            }
        }

        run.warnings.clone_from(&summary.warnings);
        run.errors.clone_from(&summary.errors);
        run.finished_at = Some(chrono::Utc::now());
        run.summary = Some(serde_json::to_value(&summary)?);
        self.store.save_run(run.clone())?;
        self.store
            .update_version_summary(doc_version_id, serde_json::to_value(&summary)?)?;

        info!(
            status = run.status.as_str(),
            anchors = summary.anchors_created,
            chunks = summary.chunks_created,
            soa = summary.soa_found,
            "ingestion finished"
        );
        Ok(run)
    }

    /// The step sequence. Returns whether the gate demands review.
    #[allow(clippy::too_many_lines)]
    async fn run_steps(
        &self,
        doc_version_id: Uuid,
        study_id: Uuid,
        doc_type: crate::types::DocumentType,
        source_file_uri: &str,
        source: &SourceDocument,
        summary: &mut IngestSummary,
    ) -> Result<bool> {
        let mut collector = MetricsCollector::new();
        let mut needs_review = false;

        // Source-file validation. A missing file is fatal; a format the
        // reader cannot have decoded downgrades the run.
        if !Path::new(source_file_uri).exists() {
            return Err(Error::FileMissing(source_file_uri.to_string()));
        }
        if !has_docx_shape(source_file_uri) {
            summary.warnings.push(format!(
                "Unsupported format: {source_file_uri} is not a DOCX-derived source"
            ));
            summary.mapping_status = "skipped".into();
            let (metrics, verdict) = collector.finalize(&self.config.gate);
            summary.metrics = metrics;
            summary.warnings.extend(verdict.warnings);
            return Ok(true);
        }

        // Cleanup: this version's derived rows go away before anything
        // is written.
        collector.start_timing("cleanup");
        self.store.delete_version_data(doc_version_id)?;
        collector.end_timing("cleanup");

        // Parse.
        collector.start_timing("parse");
        let parser = DocxParser::new(self.config)?;
        let parsed = parser.parse(source, doc_version_id, None);
        collector.end_timing("parse");
        summary.warnings.extend(parsed.warnings.clone());
        summary.docx_summary = Some(parsed.summary.clone());

        if parsed.anchors.is_empty() {
            summary
                .warnings
                .push("No anchors recovered; downstream steps skipped".to_string());
            summary.mapping_status = "skipped".into();
            let (metrics, verdict) = collector.finalize(&self.config.gate);
            summary.metrics = metrics;
            summary.warnings.extend(verdict.warnings);
            return Ok(true);
        }

        self.store.insert_anchors(parsed.anchors.clone())?;
        summary.anchors_created = parsed.anchors.len();
        let mut all_anchors = parsed.anchors;

        // SoA.
        collector.start_timing("soa");
        let soa_extractor = SoaExtractor::new(self.config)?;
        let soa = soa_extractor.extract(source, doc_version_id, &all_anchors);
        collector.end_timing("soa");
        if let Some((cell_anchors, soa_result)) = soa {
            summary.warnings.extend(soa_result.warnings.clone());
            self.store.insert_anchors(cell_anchors.clone())?;
            summary.anchors_created += cell_anchors.len();
            all_anchors.extend(cell_anchors);

            summary.soa_found = true;
            summary.soa_facts_written =
                self.persist_soa_facts(study_id, doc_version_id, &soa_result)?;
            if soa_result.confidence < self.config.soa.review_threshold {
                needs_review = true;
            }
            collector.set_soa(Some(&soa_result));
        } else {
            collector.set_soa(None);
            if doc_type == crate::types::DocumentType::Protocol {
                summary
                    .warnings
                    .push("No SoA table found in a protocol; manual check advised".to_string());
            }
        }

        // Chunks, with embeddings when a provider is attached.
        collector.start_timing("chunks");
        let chunker = NarrativeChunker::new(&self.config.chunker);
        let mut chunks = chunker.build(&all_anchors);
        if let Some(embedder) = self.embedder {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            match with_retry(&self.config.retry, "embed_chunks", || {
                embedder.embed_batch(&texts)
            })
            .await
            {
                Ok(vectors) => {
                    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
                        chunk.embedding = Some(vector);
                    }
                }
                Err(err) => {
                    summary.warnings.push(format!(
                        "Embedding unavailable, chunks persisted without vectors: {err}"
                    ));
                }
            }
        }
        self.store.insert_chunks(chunks.clone())?;
        summary.chunks_created = chunks.len();
        collector.end_timing("chunks");

        // Rules-based facts, double-checked when a chat provider is
        // attached.
        collector.start_timing("facts");
        let candidates = FactExtractor::new().extract(&all_anchors);
        let normalizer = ValueNormalizer::new(self.chat, &self.config.retry);
        let mut written_facts: Vec<Fact> = Vec::new();
        for candidate in candidates {
            let fact = self
                .persist_candidate(study_id, doc_version_id, &all_anchors, &normalizer, candidate, summary)
                .await?;
            written_facts.push(fact);
        }
        collector.end_timing("facts");

        // Heading blocks and topic mapping, with heading-cluster hints
        // feeding the cluster prior.
        collector.start_timing("topics");
        let blocks = build_heading_blocks(&all_anchors);
        let mapping_metrics = if self.topics.is_empty() {
            summary.mapping_status = "skipped".into();
            None
        } else {
            let mapper = crate::topics::TopicMapper::new(self.config, self.embedder);
            let mut catalog = self.topics.clone();
            let warm_up_warnings = mapper.warm_up_catalog(&mut catalog).await;
            summary.warnings.extend(warm_up_warnings);

            let heading_embeddings =
                crate::aligner::anchor_embeddings_from_chunks(&all_anchors, &chunks);
            let clusterer = crate::clustering::HeadingClusterer::new(&self.config.clustering);
            let clusters = clusterer.cluster(&all_anchors, &heading_embeddings);
            let cluster_hints = crate::clustering::topic_hints(&clusters, &catalog);

            let (assignments, mapping_metrics) = mapper
                .map_blocks(
                    self.store,
                    doc_version_id,
                    doc_type,
                    &catalog,
                    &self.zone_priors,
                    &blocks,
                    &all_anchors,
                    &cluster_hints,
                )
                .await?;
            summary.mapping_status = if assignments.is_empty() { "empty" } else { "ok" }.into();
            collector.collect_assignments(&assignments, &self.config.core_topics);
            Some(mapping_metrics)
        };
        collector.end_timing("topics");

        // Metrics and the gate.
        collector.collect_anchors(&all_anchors);
        collector.collect_chunks(&chunks);
        collector.collect_facts(&written_facts, &self.config.required_facts);
        let (metrics, verdict) = collector.finalize(&self.config.gate);
        summary.metrics = metrics;
        summary.warnings.extend(verdict.warnings);
        if let Some(mapping) = mapping_metrics {
            info!(
                mapped = mapping.mapped,
                unmapped = mapping.unmapped,
                rate = mapping.mapped_rate,
                "topic mapping coverage"
            );
        }
        Ok(needs_review || verdict.needs_review)
    }

    /// Write the three SoA facts with PRIMARY evidence on their cell
    /// anchors; matrix evidence is capped by configuration.
    fn persist_soa_facts(
        &self,
        study_id: Uuid,
        doc_version_id: Uuid,
        soa: &SoaResult,
    ) -> Result<usize> {
        let status = if soa.confidence >= self.config.soa.review_threshold {
            FactStatus::Extracted
        } else {
            FactStatus::NeedsReview
        };
        let mut written = 0usize;

        if !soa.visits.is_empty() {
            let fact = self.store.upsert_fact(new_fact(
                study_id,
                "soa",
                "visits",
                json!({ "visits": soa.visits }),
                None,
                status,
                Some(soa.confidence),
                doc_version_id,
            ))?;
            let evidence = soa
                .visits
                .iter()
                .map(|v| FactEvidence {
                    fact_id: fact.id,
                    anchor_ref: v.anchor_ref.clone(),
                    role: EvidenceRole::Primary,
                })
                .collect();
            self.store.replace_evidence(fact.id, evidence)?;
            written += 1;
        }

        if !soa.procedures.is_empty() {
            let fact = self.store.upsert_fact(new_fact(
                study_id,
                "soa",
                "procedures",
                json!({ "procedures": soa.procedures }),
                None,
                status,
                Some(soa.confidence),
                doc_version_id,
            ))?;
            let evidence = soa
                .procedures
                .iter()
                .map(|p| FactEvidence {
                    fact_id: fact.id,
                    anchor_ref: p.anchor_ref.clone(),
                    role: EvidenceRole::Primary,
                })
                .collect();
            self.store.replace_evidence(fact.id, evidence)?;
            written += 1;
        }

        if !soa.matrix.is_empty() {
            let fact = self.store.upsert_fact(new_fact(
                study_id,
                "soa",
                "matrix",
                json!({ "matrix": soa.matrix }),
                None,
                status,
                Some(soa.confidence),
                doc_version_id,
            ))?;
            let evidence = soa
                .matrix
                .iter()
                .take(self.config.soa.matrix_evidence_cap)
                .map(|m| FactEvidence {
                    fact_id: fact.id,
                    anchor_ref: m.anchor_ref.clone(),
                    role: EvidenceRole::Primary,
                })
                .collect();
            self.store.replace_evidence(fact.id, evidence)?;
            written += 1;
        }
        Ok(written)
    }

    /// Upsert one rule candidate, running the double-check when it
    /// applies, and replace its evidence.
    async fn persist_candidate(
        &self,
        study_id: Uuid,
        doc_version_id: Uuid,
        anchors: &[Anchor],
        normalizer: &ValueNormalizer<'_>,
        candidate: FactCandidate,
        summary: &mut IngestSummary,
    ) -> Result<Fact> {
        let fragment = candidate
            .primary_anchor_ids
            .first()
            .and_then(|id| anchors.iter().find(|a| &a.anchor_id == id))
            .map(|a| a.text_raw.clone())
            .unwrap_or_default();
        let outcome = normalizer.normalize(&candidate, &fragment).await;
        if let Some(warning) = outcome.warning {
            summary.warnings.push(warning);
        }

        let confidence = (outcome.llm_confidence > 0.0).then_some(outcome.llm_confidence);
        let fact = self.store.upsert_fact(new_fact(
            study_id,
            &candidate.fact_type,
            &candidate.fact_key,
            outcome.value_json,
            candidate.unit.clone(),
            outcome.status,
            confidence,
            doc_version_id,
        ))?;

        // Evidence anchors must belong to this version; dedupe keeps
        // first occurrence.
        let allowed: std::collections::HashSet<&str> =
            anchors.iter().map(|a| a.anchor_id.as_str()).collect();
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut evidence: Vec<FactEvidence> = Vec::new();
        for anchor_id in &candidate.primary_anchor_ids {
            if allowed.contains(anchor_id.as_str()) && seen.insert(anchor_id.as_str()) {
                evidence.push(FactEvidence {
                    fact_id: fact.id,
                    anchor_ref: anchor_id.clone(),
                    role: EvidenceRole::Primary,
                });
            }
        }
        for anchor_id in &candidate.supporting_anchor_ids {
            if allowed.contains(anchor_id.as_str()) && seen.insert(anchor_id.as_str()) {
                evidence.push(FactEvidence {
                    fact_id: fact.id,
                    anchor_ref: anchor_id.clone(),
                    role: EvidenceRole::Supporting,
                });
            }
        }
        self.store.replace_evidence(fact.id, evidence)?;
        Ok(fact)
    }
}

/// Whether the source uri names a DOCX container or a decoded DOCX
/// model (`.docx` / `.docx.json`).
fn has_docx_shape(uri: &str) -> bool {
    let lower = uri.to_lowercase();
    lower.ends_with(".docx") || lower.ends_with(".docx.json")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_docx_shape_check() {
        assert!(has_docx_shape("/tmp/protocol.docx"));
        assert!(has_docx_shape("/tmp/protocol.DOCX"));
        assert!(has_docx_shape("/tmp/protocol.docx.json"));
        assert!(!has_docx_shape("/tmp/protocol.pdf"));
        assert!(!has_docx_shape("/tmp/protocol.json"));
    }

    #[test]
    fn test_summary_serializes_with_all_fields() {
        let summary = IngestSummary::default();
        let json = serde_json::to_value(&summary).unwrap();
        for field in [
            "anchors_created",
            "soa_found",
            "soa_facts_written",
            "chunks_created",
            "mapping_status",
            "warnings",
            "errors",
            "metrics",
            "docx_summary",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert!(json["docx_summary"].is_null());
        assert_eq!(json["warnings"], serde_json::json!([]));
    }
}
