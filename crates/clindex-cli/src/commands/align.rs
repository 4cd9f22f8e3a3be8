//! `clindex align`

use anyhow::{Context, Result};

use clindex_core::{AnchorAligner, Config, HashEmbedder, IngestionPipeline, MemoryStore, Store};

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

    let aligner = AnchorAligner::new(config);
    let stats = aligner.align(&store, seeded.document_id, seeded.version_id, to_version)?;

    match format {
        Format::Json => {
            let matches = store.matches_between(seeded.version_id, to_version)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "matched": stats.matched,
                    "changed": stats.changed,
                    "added": stats.added,
                    "removed": stats.removed,
                    "total_from": stats.total_from,
                    "total_to": stats.total_to,
                    "matches": matches,
                }))?
            );
        }
        Format::Text => {
            println!(
                "matched {}  changed {}  added {}  removed {}",
                stats.matched, stats.changed, stats.added, stats.removed
            );
            let matches = store.matches_between(seeded.version_id, to_version)?;
            for m in matches.iter().filter(|m| m.score < 1.0) {
                println!(
                    "  {} -> {} ({:.2}, {})",
                    m.from_anchor_id,
                    m.to_anchor_id,
                    m.score,
                    m.method.as_str()
                );
            }
        }
    }
    Ok(())
}
