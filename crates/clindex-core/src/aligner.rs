//! Cross-version anchor alignment.
//!
//! Matches the anchors of two versions of one document so facts,
//! comments and review state can follow the text across revisions.
//! Three phases, strictly within one content type:
//!
//! 1. **hash-exact**: anchors sharing the trailing content hash of
//!    their ids match at score 1.0 (unchanged text always wins first);
//! 2. **candidate scoring**: the remainder is scored with embedding,
//!    fuzzy text, zone and section-path signals, with a path-jump
//!    penalty and small zone/language bonuses;
//! 3. **greedy 1-to-1**: candidates are accepted in descending score
//!    order, skipping any pair with an already-consumed endpoint.
//!
//! Matches below the configured minimum are dropped. Persisting a new
//! alignment replaces any previous one for the same version pair.

use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::llm::cosine_similarity;
use crate::storage::Store;
use crate::text::{fuzzy_similarity, normalize_for_match};
use crate::types::{
    Anchor, AnchorMatch, Chunk, ContentType, Language, MatchMeta, MatchMethod,
};

/// Outcome statistics of one alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentStats {
    /// Accepted matches.
    pub matched: usize,
    /// Matches with score below 1.0 (text or context changed).
    pub changed: usize,
    /// Target-side anchors with no counterpart.
    pub added: usize,
    /// Source-side anchors with no counterpart.
    pub removed: usize,
    /// Source anchor count.
    pub total_from: usize,
    /// Target anchor count.
    pub total_to: usize,
}

/// The aligner service.
pub struct AnchorAligner {
    min_score: f64,
}

impl AnchorAligner {
    /// Build an aligner with the configured score floor.
    #[must_use]
    pub const fn new(config: &Config) -> Self {
        Self {
            min_score: config.aligner.min_score,
        }
    }

    /// Align two persisted versions and replace the stored matches for
    /// this (from, to) pair.
    pub fn align(
        &self,
        store: &dyn Store,
        document_id: Uuid,
        from_version_id: Uuid,
        to_version_id: Uuid,
    ) -> Result<AlignmentStats> {
        let anchors_a = store.anchors_for_version(from_version_id)?;
        let anchors_b = store.anchors_for_version(to_version_id)?;
        let chunks_a = store.chunks_for_version(from_version_id)?;
        let chunks_b = store.chunks_for_version(to_version_id)?;

        info!(
            from = %from_version_id,
            to = %to_version_id,
            anchors_from = anchors_a.len(),
            anchors_to = anchors_b.len(),
            "aligning anchors"
        );

        let embeddings_a = anchor_embeddings_from_chunks(&anchors_a, &chunks_a);
        let embeddings_b = anchor_embeddings_from_chunks(&anchors_b, &chunks_b);

        let mut matches: Vec<AnchorMatch> = Vec::new();
        for content_type in ContentType::all() {
            let group_a: Vec<&Anchor> = anchors_a
                .iter()
                .filter(|a| a.content_type == content_type)
                .collect();
            let group_b: Vec<&Anchor> = anchors_b
                .iter()
                .filter(|a| a.content_type == content_type)
                .collect();
            if group_a.is_empty() || group_b.is_empty() {
                continue;
            }
            self.match_group(
                &group_a,
                &group_b,
                &embeddings_a,
                &embeddings_b,
                document_id,
                from_version_id,
                to_version_id,
                &mut matches,
            );
        }

        let matched_to: std::collections::HashSet<&str> =
            matches.iter().map(|m| m.to_anchor_id.as_str()).collect();
        let stats = AlignmentStats {
            matched: matches.len(),
            changed: matches.iter().filter(|m| m.score < 1.0).count(),
            added: anchors_b.len() - matched_to.len(),
            removed: anchors_a.len() - matches.len(),
            total_from: anchors_a.len(),
            total_to: anchors_b.len(),
        };

        store.replace_matches(from_version_id, to_version_id, matches)?;
        info!(
            matched = stats.matched,
            changed = stats.changed,
            added = stats.added,
            removed = stats.removed,
            "alignment finished"
        );
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn match_group(
        &self,
        group_a: &[&Anchor],
        group_b: &[&Anchor],
        embeddings_a: &HashMap<String, Vec<f32>>,
        embeddings_b: &HashMap<String, Vec<f32>>,
        document_id: Uuid,
        from_version_id: Uuid,
        to_version_id: Uuid,
        matches: &mut Vec<AnchorMatch>,
    ) {
        let mut used_a: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut used_b: std::collections::HashSet<&str> = std::collections::HashSet::new();

        // Phase 1: exact content-hash matches.
        let mut hash_map_b: HashMap<&str, Vec<&Anchor>> = HashMap::new();
        for &b in group_b {
            hash_map_b.entry(extract_hash_part(&b.anchor_id)).or_default().push(b);
        }
        for a in group_a {
            let hash = extract_hash_part(&a.anchor_id);
            if let Some(bucket) = hash_map_b.get_mut(hash) {
                if !bucket.is_empty() {
                    let b = bucket.remove(0);
                    matches.push(AnchorMatch {
                        document_id,
                        from_doc_version_id: from_version_id,
                        to_doc_version_id: to_version_id,
                        from_anchor_id: a.anchor_id.clone(),
                        to_anchor_id: b.anchor_id.clone(),
                        score: 1.0,
                        method: MatchMethod::ExactHash,
                        meta: MatchMeta {
                            text_sim: Some(1.0),
                            path_sim: Some(1.0),
                            ..MatchMeta::default()
                        },
                    });
                    used_a.insert(a.anchor_id.as_str());
                    used_b.insert(b.anchor_id.as_str());
                }
            }
        }

        let remaining_a: Vec<&Anchor> = group_a
            .iter()
            .filter(|a| !used_a.contains(a.anchor_id.as_str()))
            .copied()
            .collect();
        let remaining_b: Vec<&Anchor> = group_b
            .iter()
            .filter(|b| !used_b.contains(b.anchor_id.as_str()))
            .copied()
            .collect();
        if remaining_a.is_empty() || remaining_b.is_empty() {
            return;
        }

        // Phase 2: score every cross pair.
        struct Candidate<'c> {
            a: &'c Anchor,
            b: &'c Anchor,
            score: f64,
            method: MatchMethod,
            meta: MatchMeta,
        }
        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        for &a in &remaining_a {
            for &b in &remaining_b {
                let (base, method, mut meta) = compute_score(
                    a,
                    b,
                    embeddings_a.get(&a.anchor_id),
                    embeddings_b.get(&b.anchor_id),
                );
                let zone_bonus = if a.source_zone == b.source_zone { 0.05 } else { 0.0 };
                let lang_bonus = if a.language == b.language && a.language != Language::Unknown
                {
                    0.05
                } else {
                    0.0
                };
                let score = (base + zone_bonus + lang_bonus).min(1.0);
                if score >= self.min_score {
                    meta.zone_bonus = Some(zone_bonus);
                    meta.lang_bonus = Some(lang_bonus);
                    candidates.push(Candidate {
                        a,
                        b,
                        score,
                        method,
                        meta,
                    });
                }
            }
        }

        // Phase 3: greedy 1-to-1 by descending score, deterministic
        // tie-break on anchor ids.
        candidates.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| x.a.anchor_id.cmp(&y.a.anchor_id))
                .then_with(|| x.b.anchor_id.cmp(&y.b.anchor_id))
        });
        for candidate in candidates {
            if used_a.contains(candidate.a.anchor_id.as_str())
                || used_b.contains(candidate.b.anchor_id.as_str())
            {
                continue;
            }
            used_a.insert(candidate.a.anchor_id.as_str());
            used_b.insert(candidate.b.anchor_id.as_str());
            matches.push(AnchorMatch {
                document_id,
                from_doc_version_id: from_version_id,
                to_doc_version_id: to_version_id,
                from_anchor_id: candidate.a.anchor_id.clone(),
                to_anchor_id: candidate.b.anchor_id.clone(),
                score: candidate.score,
                method: candidate.method,
                meta: candidate.meta,
            });
        }
    }
}

/// An anchor's embedding is the embedding of the first chunk containing
/// it, when that chunk has one.
#[must_use]
pub fn anchor_embeddings_from_chunks(
    anchors: &[Anchor],
    chunks: &[Chunk],
) -> HashMap<String, Vec<f32>> {
    let anchor_ids: std::collections::HashSet<&str> =
        anchors.iter().map(|a| a.anchor_id.as_str()).collect();
    let mut embeddings: HashMap<String, Vec<f32>> = HashMap::new();
    for chunk in chunks {
        let Some(vector) = &chunk.embedding else {
            continue;
        };
        for anchor_id in &chunk.anchor_ids {
            if anchor_ids.contains(anchor_id.as_str()) && !embeddings.contains_key(anchor_id) {
                embeddings.insert(anchor_id.clone(), vector.clone());
            }
        }
    }
    embeddings
}

/// Trailing content-hash segment of an anchor id, with any `:v<n>`
/// revision suffix stripped first.
#[must_use]
pub fn extract_hash_part(anchor_id: &str) -> &str {
    let base = match anchor_id.rsplit_once(":v") {
        Some((prefix, suffix)) if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => {
            prefix
        }
        _ => anchor_id,
    };
    base.rsplit(':').next().unwrap_or(base)
}

/// Similarity of one cross pair, before bonuses.
fn compute_score(
    a: &Anchor,
    b: &Anchor,
    embedding_a: Option<&Vec<f32>>,
    embedding_b: Option<&Vec<f32>>,
) -> (f64, MatchMethod, MatchMeta) {
    let text_a = normalize_for_match(&a.text_norm);
    let text_b = normalize_for_match(&b.text_norm);
    if text_a == text_b {
        return (
            1.0,
            MatchMethod::Fuzzy,
            MatchMeta {
                text_sim: Some(1.0),
                ..MatchMeta::default()
            },
        );
    }

    let fuzzy = fuzzy_similarity(&text_a, &text_b);
    let emb = match (embedding_a, embedding_b) {
        (Some(va), Some(vb)) => Some(cosine_similarity(va, vb)),
        _ => None,
    };

    let zone = if a.source_zone == b.source_zone { 1.0 } else { 0.0 };
    let path = path_similarity(&a.section_path, &b.section_path);

    let (combined, method) = if let Some(emb_score) = emb.filter(|&e| e > 0.0) {
        (
            0.65f64.mul_add(emb_score, 0.25f64.mul_add(fuzzy, 0.10 * 0.6f64.mul_add(zone, 0.4 * path))),
            MatchMethod::Hybrid,
        )
    } else {
        (
            0.60f64.mul_add(fuzzy, 0.40 * 0.5f64.mul_add(zone, 0.5 * path)),
            MatchMethod::Fuzzy,
        )
    };

    // Jumping sections costs up to 0.15.
    let combined = (combined - 0.15 * (1.0 - path)).max(0.0);

    let meta = MatchMeta {
        text_sim: Some(fuzzy),
        emb_sim: emb,
        zone_sim: Some(zone),
        path_sim: Some(path),
        zone_bonus: None,
        lang_bonus: None,
    };
    (combined, method, meta)
}

/// Longest-common-prefix ratio of two section paths, split on `/`.
fn path_similarity(path_a: &str, path_b: &str) -> f64 {
    let parts_a: Vec<&str> = path_a.split('/').collect();
    let parts_b: Vec<&str> = path_b.split('/').collect();
    let common = parts_a
        .iter()
        .zip(parts_b.iter())
        .take_while(|(x, y)| x == y)
        .count();
    let longest = parts_a.len().max(parts_b.len());
    if longest == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        common as f64 / longest as f64
    }
}
