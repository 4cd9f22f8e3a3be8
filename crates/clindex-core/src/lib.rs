//! # clindex-core
//!
//! Core functionality for clindex, an ingestion and knowledge-extraction
//! pipeline for structured clinical-trial documents (protocols,
//! statistical analysis plans, clinical study reports).
//!
//! The pipeline turns an already-decoded word-processing document into:
//!
//! - a stable, content-addressed graph of text fragments (**anchors**),
//! - a structured **Schedule of Activities** (visits × procedures matrix),
//! - bounded, embedding-ready narrative **chunks**,
//! - extracted **facts** with anchor-level provenance and an optional
//!   LLM double-check,
//! - **topic assignments** for heading blocks,
//! - cross-version **anchor alignment** for diff/impact analysis, and
//! - **conflict** records when facts contradict each other.
//!
//! ## Quick Start
//!
//! ```rust
//! use clindex_core::{Config, DocxParser, reader::SourceDocument, reader::SourceParagraph};
//! use uuid::Uuid;
//!
//! let doc = SourceDocument {
//!     paragraphs: vec![
//!         SourceParagraph::new("Schedule of Activities", "Heading 1"),
//!         SourceParagraph::new("Visits are described below.", "Normal"),
//!     ],
//!     tables: vec![],
//!     footnotes: Some(vec![]),
//! };
//!
//! let config = Config::default();
//! let parser = DocxParser::new(&config)?;
//! let result = parser.parse(&doc, Uuid::nil(), None);
//! assert_eq!(result.anchors.len(), 2);
//! # Ok::<(), clindex_core::Error>(())
//! ```
//!
//! ## Determinism
//!
//! Ingesting the same file twice produces byte-identical anchor ids and
//! equivalent derived rows; every scoring formula in this crate is fixed
//! by configuration, never tuned per document.

/// Cross-version anchor alignment
pub mod aligner;
/// Heading-block construction
pub mod blocks;
/// The built-in topic catalog
pub mod catalog;
/// Narrative chunking with a soft token budget
pub mod chunker;
/// Heading clustering and cluster-derived topic hints
pub mod clustering;
/// Pipeline configuration and the source-zone rulebook
pub mod config;
/// Structural and cross-document fact-conflict detection
pub mod conflicts;
/// Core study-facts snapshots
pub mod corefacts;
/// Error types and result aliases
pub mod error;
/// Rules-based fact extraction and date parsing
pub mod facts;
/// Heading detection (style/outline/numbering/visual)
pub mod heading;
/// Embedding/chat provider traits, retry combinator, cosine helpers
pub mod llm;
/// Ingestion metrics and the quality gate
pub mod metrics;
/// LLM value normalization (double-check) for complex fact values
pub mod normalizer;
/// DOCX anchor extraction
pub mod parser;
/// The ingestion orchestrator
pub mod pipeline;
/// The consumed source-document model
pub mod reader;
/// Schedule-of-Activities table detection and extraction
pub mod soa;
/// Persistence trait and the in-memory reference store
pub mod storage;
/// Text normalization, hashing, language detection, fuzzy similarity
pub mod text;
/// Heading-block topic mapping
pub mod topics;
/// Core data types and enums
pub mod types;
/// Source-zone classification
pub mod zone;

// Re-export commonly used types
pub use aligner::{AlignmentStats, AnchorAligner};
pub use blocks::build_heading_blocks;
pub use catalog::default_topic_catalog;
pub use chunker::NarrativeChunker;
pub use clustering::{HeadingCluster, HeadingClusterer, topic_hints};
pub use config::{Config, RetryConfig, ZoneRule};
pub use conflicts::ConflictDetector;
pub use corefacts::CoreFactsBuilder;
pub use error::{Error, Result};
pub use facts::{FactCandidate, FactExtractor, parse_date_to_iso};
pub use heading::{DocStats, HeadingDetector, HeadingHit, HeadingMode};
pub use llm::{ChatMessage, ChatProvider, Embedder, HashEmbedder, cosine_similarity, with_retry};
pub use metrics::{IngestionMetrics, MetricsCollector};
pub use normalizer::ValueNormalizer;
pub use parser::{DocxParser, DocxSummary, HeadingQuality, ParseResult};
pub use pipeline::{IngestSummary, IngestionPipeline};
pub use soa::{SoaExtractor, SoaResult};
pub use storage::{MemoryStore, Store};
pub use topics::{MappingMetrics, TopicMapper};
pub use types::*;
pub use zone::{ZoneClassification, ZoneClassifier};
