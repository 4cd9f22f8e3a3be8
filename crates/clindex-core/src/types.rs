//! Core data structures for the clindex ingestion pipeline.
//!
//! This module defines the entities shared across components: anchors and
//! their locations, chunks, heading blocks, facts with evidence, anchor
//! matches, topics and assignments, conflicts, and ingestion-run records.
//!
//! ## Serialization
//!
//! Every persisted or reported type implements `Serialize`/`Deserialize`.
//! String enums serialize to the exact wire values used by the rest of the
//! system (`p`/`li`/`hdr`/`cell`/`fn`/`tbl`, `ru`/`en`/`mixed`/`unknown`,
//! `extracted`/`validated`/`conflicting`/`needs_review`/`tbd`, and so on);
//! changing them is a breaking change for stored data.
//!
//! ## Identity
//!
//! Anchors are content-addressed: `anchor_id` is reconstructible from
//! `(doc_version_id, content_type, positional index, text_hash)` alone and
//! re-ingesting the same file produces byte-identical ids. In memory,
//! cross-entity references are carried as ids, never as pointers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Section-path sentinel for paragraphs before the first real heading.
pub const FRONTMATTER_SECTION: &str = "__FRONTMATTER__";

/// Section-path sentinel for documents with no headings at all.
pub const ROOT_SECTION: &str = "ROOT";

/// Section-path sentinel for footnote anchors.
pub const FOOTNOTES_SECTION: &str = "FOOTNOTES";

/// Content type of an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Real heading (style- or outline-detected).
    Hdr,
    /// Body paragraph.
    P,
    /// List item.
    Li,
    /// Table cell (SoA extraction).
    Cell,
    /// Footnote paragraph.
    Fn,
    /// Whole-table anchor (reserved).
    Tbl,
}

impl ContentType {
    /// Wire value used inside `anchor_id` strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hdr => "hdr",
            Self::P => "p",
            Self::Li => "li",
            Self::Cell => "cell",
            Self::Fn => "fn",
            Self::Tbl => "tbl",
        }
    }

    /// All variants, in a stable order (used for grouped matching).
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [Self::Hdr, Self::P, Self::Li, Self::Cell, Self::Fn, Self::Tbl]
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected language of a text unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Predominantly Cyrillic.
    Ru,
    /// Predominantly Latin.
    En,
    /// Substantial amounts of both scripts.
    Mixed,
    /// No letters, or too few to decide.
    #[default]
    Unknown,
}

impl Language {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ru => "ru",
            Self::En => "en",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }
}

/// Coarse semantic bucket assigned to a section, used as a prior by the
/// topic mapper and the aligner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceZone {
    /// Statistical methods, sample size, analysis populations.
    Statistics,
    /// Safety reporting, adverse events.
    Safety,
    /// Investigational product, dosing, storage.
    Ip,
    /// Inclusion/exclusion criteria.
    Eligibility,
    /// Study procedures and assessments.
    Procedures,
    /// Endpoints and outcome measures.
    Endpoints,
    /// Overall study design.
    Design,
    /// Study population description.
    Population,
    /// Objectives and hypotheses.
    Objectives,
    /// Ethics, consent, regulatory.
    Ethics,
    /// Administrative and signature matter.
    Administrative,
    /// Not classified.
    #[default]
    Unknown,
}

impl SourceZone {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Statistics => "statistics",
            Self::Safety => "safety",
            Self::Ip => "ip",
            Self::Eligibility => "eligibility",
            Self::Procedures => "procedures",
            Self::Endpoints => "endpoints",
            Self::Design => "design",
            Self::Population => "population",
            Self::Objectives => "objectives",
            Self::Ethics => "ethics",
            Self::Administrative => "administrative",
            Self::Unknown => "unknown",
        }
    }
}

/// Logical document kind inside a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Clinical trial protocol.
    #[default]
    Protocol,
    /// Statistical analysis plan.
    Sap,
    /// Clinical study report.
    Csr,
    /// Investigator's brochure.
    Ib,
    /// Informed consent form.
    Icf,
    /// Anything else.
    Other,
}

impl DocumentType {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Sap => "sap",
            Self::Csr => "csr",
            Self::Ib => "ib",
            Self::Icf => "icf",
            Self::Other => "other",
        }
    }
}

/// Lifecycle status of an extracted fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactStatus {
    /// Extracted by rules, not independently checked.
    Extracted,
    /// Rule result confirmed by the LLM double-check.
    Validated,
    /// Rule and LLM results disagree, or alternatives contradict.
    Conflicting,
    /// Marker recognized but value unparseable, or fact missing entirely.
    NeedsReview,
    /// Placeholder awaiting extraction.
    Tbd,
}

impl FactStatus {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::Validated => "validated",
            Self::Conflicting => "conflicting",
            Self::NeedsReview => "needs_review",
            Self::Tbd => "tbd",
        }
    }
}

/// Role of an evidence anchor relative to its fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceRole {
    /// The anchor the value was read from.
    Primary,
    /// Corroborating mention.
    Supporting,
}

/// How an anchor match was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Trailing hash segments of the two anchor ids are equal.
    ExactHash,
    /// Text/zone/path similarity without embeddings.
    Fuzzy,
    /// Embedding-weighted similarity.
    Hybrid,
}

impl MatchMethod {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExactHash => "exact_hash",
            Self::Fuzzy => "fuzzy",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Typed kind of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// `age_min` exceeds `age_max`.
    StructuralRange,
    /// Significance level out of accepted bounds.
    StructuralAlpha,
    /// Statistical power out of accepted bounds.
    StructuralPower,
    /// A fact's recorded alternatives contradict its main value.
    StructuralAlternatives,
    /// The same fact key carries different values in two aligned versions.
    CrossDocumentValueChange,
}

impl ConflictType {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StructuralRange => "structural_range",
            Self::StructuralAlpha => "structural_alpha",
            Self::StructuralPower => "structural_power",
            Self::StructuralAlternatives => "structural_alternatives",
            Self::CrossDocumentValueChange => "cross_document_value_change",
        }
    }
}

/// Severity of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    /// Cosmetic.
    Low,
    /// Worth review.
    Medium,
    /// Likely substantive error.
    High,
    /// Blocks downstream use until resolved.
    Critical,
}

impl ConflictSeverity {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Workflow status of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Newly detected.
    #[default]
    Open,
    /// Under investigation.
    Investigating,
    /// Resolved by a correction.
    Resolved,
    /// Acknowledged and accepted.
    AcceptedRisk,
    /// Detection suppressed as noise.
    Suppressed,
}

/// Final status of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Completed without warnings or review flags.
    Ok,
    /// Completed with warnings or needs_review.
    Partial,
    /// Aborted on a fatal error.
    Failed,
}

impl RunStatus {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// Structural location of an anchor inside the source document.
///
/// Body anchors are addressed by paragraph index, footnote anchors by
/// `(footnote, paragraph-within-footnote)` and cell anchors by
/// `(table, row, column)`. These indexes are the positional component of
/// the anchor identity and must stay stable across re-ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Location {
    /// Body paragraph.
    Body {
        /// 1-based index over all paragraphs in document order.
        para_index: usize,
        /// Paragraph style name as exposed by the reader.
        style: String,
    },
    /// Paragraph inside a footnote.
    Footnote {
        /// 0-based footnote index in the document's footnote collection.
        fn_index: usize,
        /// 1-based paragraph index within the footnote.
        fn_para_index: usize,
    },
    /// Table cell.
    Cell {
        /// 0-based table index in document order.
        table_index: usize,
        /// 0-based row index.
        row_idx: usize,
        /// 0-based column index.
        col_idx: usize,
        /// Whether the cell belongs to a header row or column.
        is_header: bool,
        /// Row/column header chain reached at this cell.
        header_path: Vec<String>,
    },
}

/// The unit of textual evidence: a persistent, content-addressed fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Owning document version.
    pub doc_version_id: Uuid,
    /// Globally unique content-addressed identifier; see the anchor-id
    /// grammar in the crate docs.
    pub anchor_id: String,
    /// Slash-joined heading titles, or one of the sentinels.
    pub section_path: String,
    /// Kind of fragment.
    pub content_type: ContentType,
    /// 1-based ordinal per `(section_path, content_type)`.
    pub ordinal: u32,
    /// Text exactly as read from the source.
    pub text_raw: String,
    /// Normalized text (trimmed, whitespace collapsed).
    pub text_norm: String,
    /// Lowercase hex SHA-256 of `text_norm`.
    pub text_hash: String,
    /// Structural location.
    pub location: Location,
    /// Zone classification of the containing section.
    pub source_zone: SourceZone,
    /// Script-based language detection over this anchor's own text.
    pub language: Language,
}

/// A bounded narrative grouping of contiguous body anchors, ready for
/// embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Owning document version.
    pub doc_version_id: Uuid,
    /// Stable id derived from the first member anchor.
    pub chunk_id: String,
    /// Ordered member anchor ids.
    pub anchor_ids: Vec<String>,
    /// Concatenated member text.
    pub text: String,
    /// Embedding vector, when an embedder was configured and succeeded.
    pub embedding: Option<Vec<f32>>,
    /// Mode of member zones.
    pub source_zone: SourceZone,
    /// Mode of member languages.
    pub language: Language,
    /// Rough token estimate (chars / 4).
    pub token_estimate: usize,
}

/// A heading anchor together with its contiguous descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingBlock {
    /// Stable id derived from the heading anchor id.
    pub heading_block_id: String,
    /// Owning document version.
    pub doc_version_id: Uuid,
    /// The heading anchor.
    pub heading_anchor_id: String,
    /// Normalized heading title.
    pub heading_text: String,
    /// Heading level of the block's heading.
    pub level: u8,
    /// Descendant anchor ids until the next heading of same-or-lower level.
    pub content_anchor_ids: Vec<String>,
    /// First ~300 chars of descendant text.
    pub text_preview: String,
    /// Zone of the heading anchor.
    pub source_zone: SourceZone,
    /// Language of the heading anchor.
    pub language: Language,
}

/// A study-scoped structured claim with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Internal id.
    pub id: Uuid,
    /// Owning study.
    pub study_id: Uuid,
    /// Category, e.g. `protocol_meta` or `population`.
    pub fact_type: String,
    /// Key within the category, unique per study together with
    /// `fact_type`.
    pub fact_key: String,
    /// Fact value; shape is fact-key-specific.
    pub value_json: serde_json::Value,
    /// Unit, when the value is dimensional.
    pub unit: Option<String>,
    /// Lifecycle status.
    pub status: FactStatus,
    /// Extraction confidence, when scored.
    pub confidence: Option<f64>,
    /// Version this fact was last (re-)extracted from.
    pub created_from_doc_version_id: Option<Uuid>,
    /// Optional metadata, e.g. `alternatives` considered during extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Typed relation from a fact to a supporting anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactEvidence {
    /// The fact this row supports.
    pub fact_id: Uuid,
    /// Anchor the evidence points at. Must resolve within the fact's
    /// source version.
    pub anchor_ref: String,
    /// Primary or supporting.
    pub role: EvidenceRole,
}

/// Similarity sub-scores recorded on an anchor match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MatchMeta {
    /// Fuzzy text similarity, when computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_sim: Option<f64>,
    /// Embedding cosine similarity, when both vectors existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emb_sim: Option<f64>,
    /// Zone agreement (0 or 1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_sim: Option<f64>,
    /// Section-path longest-common-prefix ratio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_sim: Option<f64>,
    /// Same-zone bonus applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_bonus: Option<f64>,
    /// Same-language bonus applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang_bonus: Option<f64>,
}

/// Directed alignment edge between anchors of two versions of one
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorMatch {
    /// The document both versions belong to.
    pub document_id: Uuid,
    /// Source version.
    pub from_doc_version_id: Uuid,
    /// Target version.
    pub to_doc_version_id: Uuid,
    /// Anchor in the source version.
    pub from_anchor_id: String,
    /// Anchor in the target version.
    pub to_anchor_id: String,
    /// Combined similarity in [0, 1].
    pub score: f64,
    /// How the match was established.
    pub method: MatchMethod,
    /// Similarity sub-scores.
    pub meta: MatchMeta,
}

/// Per-language matching material of a topic, optionally specialized per
/// document type by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TopicProfile {
    /// Russian heading aliases.
    #[serde(default)]
    pub aliases_ru: Vec<String>,
    /// English heading aliases.
    #[serde(default)]
    pub aliases_en: Vec<String>,
    /// Russian body keywords.
    #[serde(default)]
    pub keywords_ru: Vec<String>,
    /// English body keywords.
    #[serde(default)]
    pub keywords_en: Vec<String>,
    /// Russian exclusion patterns; a hit rejects the topic for a block.
    #[serde(default)]
    pub exclude_patterns_ru: Vec<String>,
    /// English exclusion patterns.
    #[serde(default)]
    pub exclude_patterns_en: Vec<String>,
    /// Zones where this topic is expected.
    #[serde(default)]
    pub source_zones: Vec<SourceZone>,
    /// Zones where this topic is implausible.
    #[serde(default)]
    pub dissimilar_zones: Vec<SourceZone>,
}

/// A workspace-scoped canonical subject heading blocks are mapped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Stable key, e.g. `endpoints` or `randomization`.
    pub topic_key: String,
    /// English title.
    pub title: String,
    /// Russian title, used as an alias/keyword fallback for RU blocks.
    pub title_ru: Option<String>,
    /// Document types this topic applies to; empty means all.
    #[serde(default)]
    pub doc_types: Vec<DocumentType>,
    /// Matching material.
    #[serde(default)]
    pub profile: TopicProfile,
    /// Catalog embedding of the topic description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Zone-weight override for a `(topic, doc_type, zone)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicZonePrior {
    /// Topic the override applies to.
    pub topic_key: String,
    /// Document type the override applies to.
    pub doc_type: DocumentType,
    /// Zone being weighted.
    pub zone: SourceZone,
    /// Prior weight in [0, 1].
    pub weight: f64,
}

/// Persisted binding of a heading block to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTopicAssignment {
    /// Owning document version.
    pub doc_version_id: Uuid,
    /// Block being assigned; unique per version together with the version.
    pub heading_block_id: String,
    /// Winning topic.
    pub topic_key: String,
    /// Final score of the winner.
    pub confidence: f64,
    /// Top candidates and their signal breakdowns.
    pub debug: serde_json::Value,
}

/// A detected inconsistency, study-scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Internal id.
    pub id: Uuid,
    /// Owning study.
    pub study_id: Uuid,
    /// Typed kind.
    pub conflict_type: ConflictType,
    /// Severity.
    pub severity: ConflictSeverity,
    /// Workflow status.
    pub status: ConflictStatus,
    /// Short human-readable title.
    pub title: String,
    /// Longer description with the conflicting values.
    pub description: String,
}

/// Left/right references plus evidence payload for a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictItem {
    /// Owning conflict.
    pub conflict_id: Uuid,
    /// Anchor on the left side, when resolved.
    pub left_anchor_id: Option<String>,
    /// Anchor on the right side, when resolved.
    pub right_anchor_id: Option<String>,
    /// Fact on the left side.
    pub left_fact_id: Option<Uuid>,
    /// Fact on the right side.
    pub right_fact_id: Option<Uuid>,
    /// Free-form evidence payload (values, versions, thresholds).
    pub evidence: serde_json::Value,
}

/// Kind of a system-created follow-up task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Resolve a critical conflict.
    ResolveConflict,
}

/// A system-created follow-up task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyTask {
    /// Internal id.
    pub id: Uuid,
    /// Owning study.
    pub study_id: Uuid,
    /// Task kind.
    pub task_type: TaskType,
    /// Task payload; for conflicts this carries the conflict id, type,
    /// severity and title.
    pub payload: serde_json::Value,
}

/// A study groups documents and owns facts and conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    /// Internal id.
    pub id: Uuid,
    /// Human-readable title.
    pub title: String,
}

/// A logical document inside a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Internal id.
    pub id: Uuid,
    /// Owning study.
    pub study_id: Uuid,
    /// Document kind.
    pub doc_type: DocumentType,
    /// Human-readable title.
    pub title: String,
}

/// One immutable version of a document, bound to exactly one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    /// Internal id; the `doc_version_id` of every derived row.
    pub id: Uuid,
    /// Owning document.
    pub document_id: Uuid,
    /// 1-based position in the version sequence.
    pub version_no: u32,
    /// URI or path of the source file.
    pub source_file_uri: String,
    /// Latest ingestion summary, when a run has completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_summary: Option<serde_json::Value>,
}

/// Versioned snapshot of a study's core facts (title, phase, design,
/// arms, sample size, endpoint citations), assembled from persisted
/// anchors, facts and topic assignments after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyCoreFacts {
    /// Owning study.
    pub study_id: Uuid,
    /// Version the snapshot was requested for.
    pub doc_version_id: Option<Uuid>,
    /// 1-based snapshot version; each save increments.
    pub facts_version: u32,
    /// The snapshot payload, with a `citations` map of anchor ids per
    /// fact.
    pub facts: serde_json::Value,
}

/// Record of one ingestion attempt for a document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRun {
    /// Run id; also the tracing correlation id.
    pub run_id: Uuid,
    /// Version being ingested.
    pub doc_version_id: Uuid,
    /// Final status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished, if it did.
    pub finished_at: Option<DateTime<Utc>>,
    /// Accumulated warnings, in order.
    pub warnings: Vec<String>,
    /// Accumulated errors, in order.
    pub errors: Vec<String>,
    /// Hash of the fact-rule and rulebook configuration the run used.
    pub pipeline_config_hash: String,
    /// Stable-shape summary, when the run got far enough to produce one.
    pub summary: Option<serde_json::Value>,
}
