//! `clindex ingest`

use anyhow::{Context, Result};

use clindex_core::{Config, HashEmbedder, IngestionPipeline, MemoryStore};

use crate::cli::{Format, IngestArgs};
use crate::commands::{load_topics, parse_doc_type, seed_version};

pub async fn run(config: &Config, args: IngestArgs, format: Format) -> Result<()> {
    let store = MemoryStore::new();
    let doc_type = parse_doc_type(&args.doc_type)?;
    let seeded = seed_version(&store, &args.file, doc_type, None, 1)?;

    let embedder = args
        .hash_embedder
        .then(|| HashEmbedder::new(HashEmbedder::DEFAULT_DIMENSIONS));
    let topics = args
        .topics
        .as_deref()
        .map(load_topics)
        .transpose()?
        .unwrap_or_default();

    let mut pipeline = IngestionPipeline::new(config, &store);
    if let Some(embedder) = embedder.as_ref() {
        pipeline = pipeline.with_embedder(embedder);
    }
    if !topics.is_empty() {
        pipeline = pipeline.with_topics(topics, Vec::new());
    }

    let run = pipeline
        .ingest(seeded.version_id, &seeded.source, false)
        .await
        .context("ingestion failed")?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Format::Text => {
            let summary = run.summary.as_ref();
            println!("run {} finished: {}", run.run_id, run.status.as_str());
            if let Some(summary) = summary {
                println!(
                    "  anchors: {}  chunks: {}  soa: {}  mapping: {}",
                    summary["anchors_created"],
                    summary["chunks_created"],
                    summary["soa_found"],
                    summary["mapping_status"].as_str().unwrap_or("-"),
                );
            }
            for warning in &run.warnings {
                println!("  warning: {warning}");
            }
            for error in &run.errors {
                println!("  error: {error}");
            }
        }
    }
    Ok(())
}
