//! `clindex map-topics`

use anyhow::{Context, Result};

use clindex_core::{
    Config, HashEmbedder, IngestionPipeline, MemoryStore, Store,
};

use crate::cli::{Format, MapTopicsArgs};
use crate::commands::{load_topics, parse_doc_type, seed_version};

pub async fn run(config: &Config, args: MapTopicsArgs, format: Format) -> Result<()> {
    let store = MemoryStore::new();
    let doc_type = parse_doc_type(&args.doc_type)?;
    let seeded = seed_version(&store, &args.file, doc_type, None, 1)?;
    let topics = match &args.topics {
        Some(path) => load_topics(path)?,
        None => clindex_core::default_topic_catalog(),
    };

    let embedder = args
        .hash_embedder
        .then(|| HashEmbedder::new(HashEmbedder::DEFAULT_DIMENSIONS));
    let mut pipeline = IngestionPipeline::new(config, &store).with_topics(topics, Vec::new());
    if let Some(embedder) = embedder.as_ref() {
        pipeline = pipeline.with_embedder(embedder);
    }

    pipeline
        .ingest(seeded.version_id, &seeded.source, false)
        .await
        .context("ingestion failed")?;

    let assignments = store.assignments_for_version(seeded.version_id)?;
    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&assignments)?);
        }
        Format::Text => {
            if assignments.is_empty() {
                println!("no blocks mapped");
            }
            for assignment in &assignments {
                println!(
                    "{} -> {} ({:.2})",
                    assignment.heading_block_id, assignment.topic_key, assignment.confidence
                );
            }
        }
    }
    Ok(())
}
