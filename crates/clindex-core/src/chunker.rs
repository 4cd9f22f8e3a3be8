//! Narrative chunking.
//!
//! Groups contiguous body anchors (HDR/P/LI) of one section into
//! bounded-size chunks suitable for embedding. Cells and footnotes are
//! excluded: the SoA matrix and footnote apparatus are not narrative.
//!
//! The budget is soft: a chunk closes once it reaches the target token
//! estimate, and never grows past the hard maximum. A section boundary
//! always closes the current chunk, so a chunk never spans two sections.
//! Embeddings are attached later by the orchestrator; a chunk without a
//! vector is still valid and downstream scorers must tolerate it.

use std::collections::HashMap;

use crate::config::ChunkerConfig;
use crate::types::{Anchor, Chunk, ContentType, Language, SourceZone};

/// Rough token estimate used for budgeting: one token per four
/// characters, rounded up.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Groups body anchors into section-bounded chunks.
pub struct NarrativeChunker {
    target_tokens: usize,
    max_tokens: usize,
}

impl NarrativeChunker {
    /// Build a chunker with the configured budget.
    #[must_use]
    pub const fn new(config: &ChunkerConfig) -> Self {
        Self {
            target_tokens: config.target_tokens,
            max_tokens: config.max_tokens,
        }
    }

    /// Chunk the given anchors (document order expected).
    #[must_use]
    pub fn build(&self, anchors: &[Anchor]) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Vec<&Anchor> = Vec::new();
        let mut current_tokens = 0usize;
        let mut current_section: Option<&str> = None;

        for anchor in anchors {
            if matches!(anchor.content_type, ContentType::Cell | ContentType::Fn) {
                continue;
            }
            let tokens = estimate_tokens(&anchor.text_norm);
            let section_changed = current_section.is_some_and(|s| s != anchor.section_path);
            let over_max =
                !current.is_empty() && current_tokens + tokens > self.max_tokens;
            if section_changed || over_max {
                if let Some(chunk) = flush(&current, current_tokens) {
                    chunks.push(chunk);
                }
                current.clear();
                current_tokens = 0;
            }
            current_section = Some(anchor.section_path.as_str());
            current.push(anchor);
            current_tokens += tokens;
            if current_tokens >= self.target_tokens {
                if let Some(chunk) = flush(&current, current_tokens) {
                    chunks.push(chunk);
                }
                current.clear();
                current_tokens = 0;
            }
        }
        if let Some(chunk) = flush(&current, current_tokens) {
            chunks.push(chunk);
        }
        chunks
    }
}

fn flush(members: &[&Anchor], token_estimate: usize) -> Option<Chunk> {
    let first = members.first()?;
    let text = members
        .iter()
        .map(|a| a.text_norm.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Some(Chunk {
        doc_version_id: first.doc_version_id,
        chunk_id: format!("ch:{}", first.anchor_id),
        anchor_ids: members.iter().map(|a| a.anchor_id.clone()).collect(),
        text,
        embedding: None,
        source_zone: mode_zone(members),
        language: mode_language(members),
        token_estimate,
    })
}

/// Most frequent zone among members, first seen wins ties.
fn mode_zone(members: &[&Anchor]) -> SourceZone {
    let mut counts: HashMap<SourceZone, usize> = HashMap::new();
    for a in members {
        *counts.entry(a.source_zone).or_insert(0) += 1;
    }
    let mut best = SourceZone::Unknown;
    let mut best_count = 0usize;
    for a in members {
        let count = counts[&a.source_zone];
        if count > best_count {
            best = a.source_zone;
            best_count = count;
        }
    }
    best
}

fn mode_language(members: &[&Anchor]) -> Language {
    let mut counts: HashMap<Language, usize> = HashMap::new();
    for a in members {
        *counts.entry(a.language).or_insert(0) += 1;
    }
    let mut best = Language::Unknown;
    let mut best_count = 0usize;
    for a in members {
        let count = counts[&a.language];
        if count > best_count {
            best = a.language;
            best_count = count;
        }
    }
    best
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::text::{normalize_text, text_hash};
    use crate::types::Location;
    use uuid::Uuid;

    fn anchor(section: &str, text: &str, content_type: ContentType, idx: usize) -> Anchor {
        let text_norm = normalize_text(text);
        let hash = text_hash(&text_norm);
        Anchor {
            doc_version_id: Uuid::nil(),
            anchor_id: format!("{}:{}:{idx}:{hash}", Uuid::nil(), content_type.as_str()),
            section_path: section.to_string(),
            content_type,
            ordinal: 1,
            text_raw: text.to_string(),
            text_norm,
            text_hash: hash,
            location: Location::Body {
                para_index: idx,
                style: "Normal".into(),
            },
            source_zone: SourceZone::Unknown,
            language: Language::En,
        }
    }

    fn chunker() -> NarrativeChunker {
        NarrativeChunker::new(&ChunkerConfig {
            target_tokens: 20,
            max_tokens: 30,
        })
    }

    #[test]
    fn test_section_boundary_closes_chunk() {
        let anchors = vec![
            anchor("A", "short text", ContentType::P, 1),
            anchor("A", "more text", ContentType::P, 2),
            anchor("B", "other section", ContentType::P, 3),
        ];
        let chunks = chunker().build(&anchors);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].anchor_ids.len(), 2);
        assert_eq!(chunks[1].anchor_ids.len(), 1);
    }

    #[test]
    fn test_target_budget_splits() {
        // Each anchor is ~13 tokens; the target of 20 closes after two.
        let anchors: Vec<Anchor> = (1..=4)
            .map(|i| anchor("A", &"x".repeat(50), ContentType::P, i))
            .collect();
        let chunks = chunker().build(&anchors);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.anchor_ids.len() == 2));
    }

    #[test]
    fn test_single_anchor_over_max_still_chunks() {
        let anchors = vec![anchor("A", &"y".repeat(400), ContentType::P, 1)];
        let chunks = chunker().build(&anchors);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_estimate, 100);
    }

    #[test]
    fn test_cells_and_footnotes_excluded() {
        let anchors = vec![
            anchor("A", "body", ContentType::P, 1),
            anchor("FOOTNOTES", "a footnote", ContentType::Fn, 2),
            anchor("A", "a cell", ContentType::Cell, 3),
            anchor("A", "more body", ContentType::P, 4),
        ];
        let chunks = chunker().build(&anchors);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].anchor_ids.len(), 2);
    }

    #[test]
    fn test_chunk_members_ordered_and_text_joined() {
        let anchors = vec![
            anchor("A", "first", ContentType::Hdr, 1),
            anchor("A", "second", ContentType::P, 2),
        ];
        let chunks = chunker().build(&anchors);
        assert_eq!(chunks[0].text, "first\nsecond");
        assert_eq!(chunks[0].anchor_ids, vec![
            anchors[0].anchor_id.clone(),
            anchors[1].anchor_id.clone()
        ]);
        assert!(chunks[0].chunk_id.starts_with("ch:"));
        assert!(chunks[0].embedding.is_none());
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
