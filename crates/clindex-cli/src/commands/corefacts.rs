//! `clindex core-facts`

use anyhow::{Context, Result};

use clindex_core::{Config, CoreFactsBuilder, HashEmbedder, IngestionPipeline, MemoryStore};

use crate::cli::{Format, IngestArgs};
use crate::commands::{load_topics, parse_doc_type, seed_version};

pub async fn run(config: &Config, args: IngestArgs, format: Format) -> Result<()> {
    let store = MemoryStore::new();
    let doc_type = parse_doc_type(&args.doc_type)?;
    let seeded = seed_version(&store, &args.file, doc_type, None, 1)?;

    let embedder = args
        .hash_embedder
        .then(|| HashEmbedder::new(HashEmbedder::DEFAULT_DIMENSIONS));
    let topics = match &args.topics {
        Some(path) => load_topics(path)?,
        None => clindex_core::default_topic_catalog(),
    };

    let mut pipeline = IngestionPipeline::new(config, &store).with_topics(topics, Vec::new());
    if let Some(embedder) = embedder.as_ref() {
        pipeline = pipeline.with_embedder(embedder);
    }
    pipeline
        .ingest(seeded.version_id, &seeded.source, false)
        .await
        .context("ingestion failed")?;

    let snapshot = CoreFactsBuilder::new()
        .build_and_save(&store, seeded.version_id)
        .context("building core facts")?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Format::Text => {
            let facts = &snapshot.facts;
            println!("core facts v{} for {}", snapshot.facts_version, args.file.display());
            for field in ["study_title", "phase", "study_design_type", "sample_size"] {
                println!("  {field}: {}", facts[field]);
            }
            println!("  arms: {}", facts["arms"]);
            println!("  primary_endpoints: {}", facts["primary_endpoints"]);
        }
    }
    Ok(())
}
