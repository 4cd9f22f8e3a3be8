//! Command-line interface definition for `clindex`.
//!
//! The CLI operates on decoded document models (`*.docx.json`, the JSON
//! interchange produced by an external DOCX reader) and runs the
//! pipeline against an in-memory store, printing results as text or
//! JSON. It is a driving harness for the library, not a long-running
//! service: persistence beyond one invocation belongs to an external
//! store.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Ingestion and knowledge extraction for clinical-trial documents.
#[derive(Debug, Parser)]
#[command(name = "clindex", version, about)]
pub struct Cli {
    /// Verbose diagnostics on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline configuration file (TOML). Defaults are used when
    /// omitted.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest one document version and print the run summary.
    Ingest(IngestArgs),
    /// Align the anchors of two versions of one document.
    Align(AlignArgs),
    /// Map heading blocks of a document to catalog topics.
    MapTopics(MapTopicsArgs),
    /// Ingest and align two versions, then detect fact conflicts.
    CheckConflicts(AlignArgs),
    /// Ingest a document and print its core study-facts snapshot.
    CoreFacts(IngestArgs),
}

/// Arguments for `ingest`.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Decoded document model (`*.docx.json`).
    pub file: PathBuf,

    /// Document type.
    #[arg(long, default_value = "protocol")]
    pub doc_type: String,

    /// Topic catalog (JSON array of topics); enables topic mapping.
    #[arg(long, value_name = "FILE")]
    pub topics: Option<PathBuf>,

    /// Use the deterministic lexical embedder (offline runs).
    #[arg(long)]
    pub hash_embedder: bool,
}

/// Arguments for `align` and `check-conflicts`.
#[derive(Debug, Args)]
pub struct AlignArgs {
    /// Decoded model of the earlier version.
    pub from: PathBuf,
    /// Decoded model of the later version.
    pub to: PathBuf,

    /// Use the deterministic lexical embedder (offline runs).
    #[arg(long)]
    pub hash_embedder: bool,
}

/// Arguments for `map-topics`.
#[derive(Debug, Args)]
pub struct MapTopicsArgs {
    /// Decoded document model (`*.docx.json`).
    pub file: PathBuf,

    /// Topic catalog (JSON array of topics). The built-in starter
    /// catalog is used when omitted.
    #[arg(long, value_name = "FILE")]
    pub topics: Option<PathBuf>,

    /// Document type.
    #[arg(long, default_value = "protocol")]
    pub doc_type: String,

    /// Use the deterministic lexical embedder (offline runs).
    #[arg(long)]
    pub hash_embedder: bool,
}
