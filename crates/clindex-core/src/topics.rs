//! Heading-block topic mapping.
//!
//! Scores every heading block against the canonical topic catalog and
//! persists the winning assignment when it clears a dynamic confidence
//! threshold. Signals, in decreasing weight: embedding similarity (when
//! both vectors exist), alias/keyword matches on the heading and
//! preview, and the source-zone prior. A zone that contradicts the
//! topic multiplies the final score by 0.2; a zone that strongly
//! supports it lowers the acceptance threshold instead of inflating the
//! score.
//!
//! The mapper is deliberately order-sensitive: a block with weak
//! textual evidence inherits a small bonus when its predecessor mapped
//! to the same topic, which keeps long homogeneous runs (adverse-event
//! listings, statistical appendices) from fragmenting.

use serde_json::json;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::config::{Config, RetryConfig, TopicConfig};
use crate::error::Result;
use crate::llm::{Embedder, cosine_similarity, with_retry};
use crate::storage::Store;
use crate::text::{normalize_for_match, ratcliff_obershelp};
use crate::types::{
    Anchor, BlockTopicAssignment, DocumentType, HeadingBlock, Language, SourceZone, Topic,
    TopicZonePrior,
};

/// Coverage metrics of one mapping pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MappingMetrics {
    /// Heading blocks considered.
    pub blocks_total: usize,
    /// Assignments persisted.
    pub mapped: usize,
    /// Blocks left unmapped.
    pub unmapped: usize,
    /// Mapped blocks whose runner-up scored within 0.1 of the winner.
    pub ambiguous: usize,
    /// mapped / blocks_total.
    pub mapped_rate: f64,
    /// Block ids whose best candidate scored above zero but below the
    /// threshold.
    pub below_threshold: Vec<String>,
}

/// One topic's scored signals for a block.
#[derive(Debug, Clone)]
struct TopicScore {
    topic_key: String,
    final_score: f64,
    alias_score: f64,
    keyword_score: f64,
    zone_prior: f64,
    zone_penalty: f64,
    embedding_score: f64,
    neighbor_bonus: f64,
    cluster_prior: f64,
    has_strong_zone_match: bool,
}

/// The topic-mapping service.
pub struct TopicMapper<'a> {
    thresholds: TopicConfig,
    retry: &'a RetryConfig,
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> TopicMapper<'a> {
    /// Build a mapper; `embedder: None` disables the semantic signal.
    #[must_use]
    pub fn new(config: &'a Config, embedder: Option<&'a dyn Embedder>) -> Self {
        Self {
            thresholds: config.topics.clone(),
            retry: &config.retry,
            embedder,
        }
    }

    /// Embed catalog topics that are missing vectors. Failures leave
    /// the topic without a vector and return a warning per topic.
    pub async fn warm_up_catalog(&self, topics: &mut [Topic]) -> Vec<String> {
        let Some(embedder) = self.embedder else {
            return Vec::new();
        };
        let mut warnings = Vec::new();
        for topic in topics.iter_mut().filter(|t| t.embedding.is_none()) {
            let mut text = topic.title.clone();
            for alias in topic
                .profile
                .aliases_en
                .iter()
                .chain(topic.profile.aliases_ru.iter())
            {
                text.push_str(". ");
                text.push_str(alias);
            }
            match with_retry(self.retry, "embed_topic", || embedder.embed(&text)).await {
                Ok(vector) => topic.embedding = Some(vector),
                Err(err) => warnings.push(format!(
                    "Topic '{}' could not be embedded: {err}",
                    topic.topic_key
                )),
            }
        }
        warnings
    }

    /// Map all blocks of a version and upsert the resulting
    /// assignments.
    ///
    /// `cluster_hints` maps heading anchor ids to topic keys derived
    /// from heading clustering; agreement adds the cluster prior.
    #[allow(clippy::too_many_arguments)]
    pub async fn map_blocks(
        &self,
        store: &dyn Store,
        doc_version_id: Uuid,
        doc_type: DocumentType,
        topics: &[Topic],
        zone_priors: &[TopicZonePrior],
        blocks: &[HeadingBlock],
        anchors: &[Anchor],
        cluster_hints: &HashMap<String, String>,
    ) -> Result<(Vec<BlockTopicAssignment>, MappingMetrics)> {
        let applicable: Vec<&Topic> = topics
            .iter()
            .filter(|t| t.doc_types.is_empty() || t.doc_types.contains(&doc_type))
            .collect();
        let priors_by_topic = index_priors(zone_priors, doc_type);
        let anchors_by_id: HashMap<&str, &Anchor> =
            anchors.iter().map(|a| (a.anchor_id.as_str(), a)).collect();

        let mut assignments = Vec::new();
        let mut below_threshold = Vec::new();
        let mut ambiguous = 0usize;
        let mut previous_topic: Option<String> = None;

        for block in blocks {
            let block_vector = self.embed_block(block, &anchors_by_id).await;
            let cluster_hint = cluster_hints
                .get(&block.heading_anchor_id)
                .map(String::as_str);
            let mut scores: Vec<TopicScore> = applicable
                .iter()
                .filter_map(|topic| {
                    self.score_topic(
                        block,
                        topic,
                        &priors_by_topic,
                        block_vector.as_deref(),
                        previous_topic.as_deref(),
                        cluster_hint,
                    )
                })
                .collect();
            scores.sort_by(|x, y| {
                y.final_score
                    .partial_cmp(&x.final_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| x.topic_key.cmp(&y.topic_key))
            });

            let Some(best) = scores.first() else {
                previous_topic = None;
                continue;
            };
            for score in scores.iter().take(3) {
                debug!(
                    block = %block.heading_text,
                    topic = %score.topic_key,
                    final_score = score.final_score,
                    "topic candidate"
                );
            }

            let threshold = if best.has_strong_zone_match {
                self.thresholds.strong_zone_threshold
            } else {
                self.thresholds.confidence_threshold
            };

            if best.final_score >= threshold {
                if scores
                    .get(1)
                    .is_some_and(|second| best.final_score - second.final_score < 0.1)
                {
                    ambiguous += 1;
                }
                let assignment = BlockTopicAssignment {
                    doc_version_id,
                    heading_block_id: block.heading_block_id.clone(),
                    topic_key: best.topic_key.clone(),
                    confidence: best.final_score,
                    debug: debug_payload(&scores, threshold),
                };
                store.upsert_assignment(assignment.clone())?;
                previous_topic = Some(best.topic_key.clone());
                assignments.push(assignment);
            } else {
                if best.final_score > 0.0 {
                    below_threshold.push(block.heading_block_id.clone());
                }
                previous_topic = None;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let mapped_rate = if blocks.is_empty() {
            0.0
        } else {
            assignments.len() as f64 / blocks.len() as f64
        };
        let metrics = MappingMetrics {
            blocks_total: blocks.len(),
            mapped: assignments.len(),
            unmapped: blocks.len() - assignments.len(),
            ambiguous,
            mapped_rate,
            below_threshold,
        };
        Ok((assignments, metrics))
    }

    async fn embed_block(
        &self,
        block: &HeadingBlock,
        anchors_by_id: &HashMap<&str, &Anchor>,
    ) -> Option<Vec<f32>> {
        let embedder = self.embedder?;
        let lead = first_two_sentences(block, anchors_by_id);
        let text = if lead.is_empty() {
            block.heading_text.clone()
        } else {
            format!("{}. {lead}", block.heading_text)
        };
        match with_retry(self.retry, "embed_block", || embedder.embed(&text)).await {
            Ok(vector) => Some(vector),
            Err(_) => None,
        }
    }

    #[allow(clippy::similar_names)]
    fn score_topic(
        &self,
        block: &HeadingBlock,
        topic: &Topic,
        priors_by_topic: &HashMap<String, HashMap<SourceZone, f64>>,
        block_vector: Option<&[f32]>,
        previous_topic: Option<&str>,
        cluster_hint: Option<&str>,
    ) -> Option<TopicScore> {
        if excluded(&block.heading_text, topic, block.language) {
            return None;
        }

        let alias_score = alias_similarity(&block.heading_text, topic, block.language);
        let keyword_score = keyword_match(block, topic);

        // Zone prior, penalty and the strong-match flag.
        let mut zone_prior = 0.5f64;
        let mut zone_penalty = 1.0f64;
        let mut strong = false;
        let topic_zones = &topic.profile.source_zones;
        let dissimilar = &topic.profile.dissimilar_zones;
        let priors = priors_by_topic.get(&topic.topic_key);
        if let Some(weight) = priors.and_then(|p| p.get(&block.source_zone)) {
            zone_prior = *weight;
            if zone_prior >= 0.7 {
                strong = true;
            }
            if zone_prior < 0.2 {
                zone_penalty = 0.2;
            }
        } else if dissimilar.contains(&block.source_zone) {
            zone_prior = 0.2;
            zone_penalty = 0.2;
        } else if topic_zones.contains(&block.source_zone) {
            zone_prior = 0.8;
            strong = true;
        }
        // An explicitly allowed zone never contributes less than a
        // neutral prior, even when an override weighted it low-ish.
        let explicitly_allowed = topic_zones.contains(&block.source_zone)
            || priors
                .and_then(|p| p.get(&block.source_zone))
                .is_some_and(|w| *w >= 0.3);
        if explicitly_allowed && zone_prior < 0.5 {
            zone_prior = 0.5;
        }

        let cluster_prior = if cluster_hint == Some(topic.topic_key.as_str()) {
            0.3
        } else {
            0.0
        };

        let embedding_score = match (block_vector, &topic.embedding) {
            (Some(bv), Some(tv)) => cosine_similarity(bv, tv).max(0.0),
            _ => 0.0,
        };

        let neighbor_bonus = if previous_topic == Some(topic.topic_key.as_str())
            && alias_score < 0.4
            && keyword_score < 0.4
        {
            0.2
        } else {
            0.0
        };

        let text_signal = alias_score.max(keyword_score * 0.7);
        let base = if embedding_score > 0.0 {
            0.5f64.mul_add(embedding_score, 0.3f64.mul_add(text_signal, 0.2 * zone_prior))
        } else {
            let cluster_weight = if cluster_prior > 0.0 { 0.2 } else { 0.0 };
            let alias_weight: f64 = if cluster_weight == 0.0 { 0.5 } else { 0.4 };
            alias_weight.mul_add(
                text_signal,
                0.3f64.mul_add(zone_prior, cluster_weight * cluster_prior),
            )
        };

        let mut final_score = (base + neighbor_bonus).min(1.0);
        if alias_score > 0.7 {
            final_score = (final_score * 1.2).min(1.0);
        }
        final_score *= zone_penalty;

        Some(TopicScore {
            topic_key: topic.topic_key.clone(),
            final_score,
            alias_score,
            keyword_score,
            zone_prior,
            zone_penalty,
            embedding_score,
            neighbor_bonus,
            cluster_prior,
            has_strong_zone_match: strong,
        })
    }
}

fn index_priors(
    priors: &[TopicZonePrior],
    doc_type: DocumentType,
) -> HashMap<String, HashMap<SourceZone, f64>> {
    let mut map: HashMap<String, HashMap<SourceZone, f64>> = HashMap::new();
    for prior in priors.iter().filter(|p| p.doc_type == doc_type) {
        map.entry(prior.topic_key.clone())
            .or_default()
            .insert(prior.zone, prior.weight);
    }
    map
}

fn excluded(heading_text: &str, topic: &Topic, language: Language) -> bool {
    let heading_norm = normalize_for_match(heading_text);
    let mut patterns: Vec<&String> = Vec::new();
    if matches!(language, Language::Ru | Language::Mixed) {
        patterns.extend(&topic.profile.exclude_patterns_ru);
    }
    if matches!(language, Language::En | Language::Mixed | Language::Unknown) {
        patterns.extend(&topic.profile.exclude_patterns_en);
    }
    patterns
        .iter()
        .any(|p| heading_norm.contains(&normalize_for_match(p)))
}

/// Best alias similarity in the relevant language(s), with a Russian
/// title fallback when aliases alone stay below 0.7.
fn alias_similarity(heading_text: &str, topic: &Topic, language: Language) -> f64 {
    let heading_norm = normalize_for_match(heading_text);
    let mut aliases: Vec<&String> = Vec::new();
    if matches!(language, Language::Ru | Language::Mixed) {
        aliases.extend(&topic.profile.aliases_ru);
    }
    if matches!(language, Language::En | Language::Mixed | Language::Unknown) {
        aliases.extend(&topic.profile.aliases_en);
    }

    let mut best = 0.0f64;
    for alias in aliases {
        best = best.max(similarity(&heading_norm, &normalize_for_match(alias)));
    }
    if matches!(language, Language::Ru | Language::Mixed) && best < 0.7 {
        if let Some(title_ru) = &topic.title_ru {
            best = best.max(similarity(&heading_norm, &normalize_for_match(title_ru)));
        }
    }
    best
}

fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    ratcliff_obershelp(a, b).max(strsim::sorensen_dice(a, b))
}

/// Keyword coverage over heading + preview, capped at 0.8. Empty RU
/// keyword sets fall back to the significant words of the Russian
/// title.
fn keyword_match(block: &HeadingBlock, topic: &Topic) -> f64 {
    let mut keywords: Vec<String> = Vec::new();
    if matches!(block.language, Language::Ru | Language::Mixed) {
        keywords.extend(topic.profile.keywords_ru.iter().cloned());
    }
    if matches!(
        block.language,
        Language::En | Language::Mixed | Language::Unknown
    ) {
        keywords.extend(topic.profile.keywords_en.iter().cloned());
    }
    if keywords.is_empty() && matches!(block.language, Language::Ru | Language::Mixed) {
        if let Some(title_ru) = &topic.title_ru {
            keywords.extend(
                normalize_for_match(title_ru)
                    .split_whitespace()
                    .filter(|w| w.chars().count() > 3)
                    .map(ToString::to_string),
            );
        }
    }
    if keywords.is_empty() {
        return 0.0;
    }

    let haystack = normalize_for_match(&format!("{} {}", block.heading_text, block.text_preview));
    let matched = keywords
        .iter()
        .filter(|k| haystack.contains(&normalize_for_match(k)))
        .count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = matched as f64 / keywords.len() as f64;
    (ratio * 0.8).min(0.8)
}

/// First two sentences of the block body, read from the first few
/// member anchors.
fn first_two_sentences(block: &HeadingBlock, anchors_by_id: &HashMap<&str, &Anchor>) -> String {
    let text: String = block
        .content_anchor_ids
        .iter()
        .take(5)
        .filter_map(|id| anchors_by_id.get(id.as_str()))
        .map(|a| a.text_norm.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            sentences.push(current.trim().to_string());
            current.clear();
            if sentences.len() == 2 {
                break;
            }
        }
    }
    if sentences.len() < 2 && !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences.join(" ")
}

fn debug_payload(scores: &[TopicScore], threshold: f64) -> serde_json::Value {
    let top: Vec<serde_json::Value> = scores
        .iter()
        .take(3)
        .map(|s| {
            json!({
                "topic_key": s.topic_key,
                "final_score": s.final_score,
                "alias_score": s.alias_score,
                "keyword_score": s.keyword_score,
                "zone_prior": s.zone_prior,
                "zone_penalty": s.zone_penalty,
                "embedding_score": s.embedding_score,
                "neighbor_bonus": s.neighbor_bonus,
                "cluster_prior": s.cluster_prior,
                "has_strong_zone_match": s.has_strong_zone_match,
            })
        })
        .collect();
    json!({ "threshold": threshold, "top": top })
}
