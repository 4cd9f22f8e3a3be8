//! Command implementations.

mod align;
mod conflicts;
mod corefacts;
mod ingest;
mod topics;

use anyhow::{Context, Result, bail};
use std::path::Path;
use uuid::Uuid;

use clindex_core::reader::SourceDocument;
use clindex_core::{Config, Document, DocumentType, DocumentVersion, MemoryStore, Store, Study, Topic};

use crate::cli::{Cli, Command};

/// Route a parsed invocation to its command.
pub async fn dispatch(args: Cli) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    match args.command {
        Command::Ingest(cmd) => ingest::run(&config, cmd, args.format).await,
        Command::Align(cmd) => align::run(&config, cmd, args.format).await,
        Command::MapTopics(cmd) => topics::run(&config, cmd, args.format).await,
        Command::CheckConflicts(cmd) => conflicts::run(&config, cmd, args.format).await,
        Command::CoreFacts(cmd) => corefacts::run(&config, cmd, args.format).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

/// Parse the `--doc-type` flag using the wire values.
pub fn parse_doc_type(raw: &str) -> Result<DocumentType> {
    serde_json::from_value(serde_json::Value::String(raw.to_lowercase()))
        .with_context(|| format!("unknown document type '{raw}'"))
}

/// Load a topic catalog from a JSON array.
pub fn load_topics(path: &Path) -> Result<Vec<Topic>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading topic catalog {}", path.display()))?;
    let topics: Vec<Topic> =
        serde_json::from_str(&raw).with_context(|| "parsing topic catalog")?;
    if topics.is_empty() {
        bail!("topic catalog {} is empty", path.display());
    }
    Ok(topics)
}

/// A study/document/version scaffold around one model file.
pub struct Seeded {
    /// The version to ingest.
    pub version_id: Uuid,
    /// The owning document.
    pub document_id: Uuid,
    /// The owning study.
    pub study_id: Uuid,
    /// The decoded model.
    pub source: SourceDocument,
}

/// Create study/document/version rows for a model file and load it.
pub fn seed_version(
    store: &MemoryStore,
    file: &Path,
    doc_type: DocumentType,
    document_id: Option<Uuid>,
    version_no: u32,
) -> Result<Seeded> {
    let source = SourceDocument::load(file)
        .with_context(|| format!("loading document model {}", file.display()))?;

    let study_id = Uuid::new_v4();
    let document_id = document_id.unwrap_or_else(Uuid::new_v4);
    let version_id = Uuid::new_v4();

    store.insert_study(Study {
        id: study_id,
        title: file.display().to_string(),
    })?;
    store.insert_document(Document {
        id: document_id,
        study_id,
        doc_type,
        title: file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })?;
    store.insert_version(DocumentVersion {
        id: version_id,
        document_id,
        version_no,
        source_file_uri: file.display().to_string(),
        ingestion_summary: None,
    })?;

    Ok(Seeded {
        version_id,
        document_id,
        study_id,
        source,
    })
}

/// Seed a second version of an existing document and load its model.
pub fn seed_next_version(
    store: &MemoryStore,
    file: &Path,
    document_id: Uuid,
    version_no: u32,
) -> Result<(Uuid, SourceDocument)> {
    let source = SourceDocument::load(file)
        .with_context(|| format!("loading document model {}", file.display()))?;
    let version_id = Uuid::new_v4();
    store.insert_version(DocumentVersion {
        id: version_id,
        document_id,
        version_no,
        source_file_uri: file.display().to_string(),
        ingestion_summary: None,
    })?;
    Ok((version_id, source))
}
