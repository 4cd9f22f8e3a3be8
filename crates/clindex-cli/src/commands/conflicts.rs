//! `clindex check-conflicts`

use anyhow::{Context, Result};

use clindex_core::{
    AnchorAligner, Config, ConflictDetector, HashEmbedder, IngestionPipeline, MemoryStore,
};

use crate::cli::{AlignArgs, Format};
use crate::commands::{seed_next_version, seed_version};

pub async fn run(config: &Config, args: AlignArgs, format: Format) -> Result<()> {
    let store = MemoryStore::new();
    let seeded = seed_version(
        &store,
        &args.from,
        clindex_core::DocumentType::Protocol,
        None,
        1,
    )?;
    let (to_version, to_source) = seed_next_version(&store, &args.to, seeded.document_id, 2)?;

    let embedder = args
        .hash_embedder
        .then(|| HashEmbedder::new(HashEmbedder::DEFAULT_DIMENSIONS));
    let mut pipeline = IngestionPipeline::new(config, &store);
    if let Some(embedder) = embedder.as_ref() {
        pipeline = pipeline.with_embedder(embedder);
    }

    pipeline
        .ingest(seeded.version_id, &seeded.source, false)
        .await
        .context("ingesting the earlier version")?;
    pipeline
        .ingest(to_version, &to_source, false)
        .await
        .context("ingesting the later version")?;

    AnchorAligner::new(config).align(
        &store,
        seeded.document_id,
        seeded.version_id,
        to_version,
    )?;

    let conflicts = ConflictDetector::new()
        .check_study(&store, seeded.study_id)
        .context("consistency check failed")?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&conflicts)?);
        }
        Format::Text => {
            if conflicts.is_empty() {
                println!("no conflicts detected");
            }
            for conflict in &conflicts {
                println!(
                    "[{}] {}: {}",
                    conflict.severity.as_str(),
                    conflict.conflict_type.as_str(),
                    conflict.title
                );
                println!("  {}", conflict.description);
            }
        }
    }
    Ok(())
}
