//! Heading clustering.
//!
//! Groups a version's headings by lexical similarity (average-linkage
//! agglomerative clustering over the fuzzy distance), optionally merges
//! clusters whose mean embeddings nearly coincide, and derives
//! per-heading topic hints from the clusters. The hints feed the topic
//! mapper's cluster prior: a block whose heading sits in a cluster that
//! clearly matches one topic gets a small nudge toward it.
//!
//! Clusters smaller than the configured minimum are treated as noise
//! and dropped. Mixed-language clusters are split per language so RU
//! and EN headings never share a profile.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::ClusteringConfig;
use crate::llm::cosine_similarity;
use crate::text::{fuzzy_similarity, normalize_for_match};
use crate::types::{Anchor, ContentType, Language, Topic};

/// One member shown in a cluster's example list.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterExample {
    /// Section path of the heading.
    pub section_path: String,
    /// Raw heading text.
    pub heading_text: String,
    /// Heading anchor id.
    pub anchor_id: String,
}

/// A cluster of similar headings.
#[derive(Debug, Clone, Serialize)]
pub struct HeadingCluster {
    /// Sequential id within the version.
    pub cluster_id: usize,
    /// Language of the members.
    pub language: Language,
    /// Distinct member titles, up to 20.
    pub top_titles: Vec<String>,
    /// Up to 10 example members.
    pub examples: Vec<ClusterExample>,
    /// Member anchor ids.
    pub anchor_ids: Vec<String>,
    /// Member count.
    pub size: usize,
    /// Mean raw-title length.
    pub avg_title_chars: f64,
    /// Mean member embedding, when any member had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// The clustering service.
pub struct HeadingClusterer {
    distance_threshold: f64,
    min_size: usize,
    embedding_merge_threshold: f64,
}

impl HeadingClusterer {
    /// Build a clusterer from configuration.
    #[must_use]
    pub const fn new(config: &ClusteringConfig) -> Self {
        Self {
            distance_threshold: config.distance_threshold,
            min_size: config.min_size,
            embedding_merge_threshold: config.embedding_merge_threshold,
        }
    }

    /// Cluster the HDR anchors of a version.
    ///
    /// `embeddings` maps anchor ids to vectors (usually resolved through
    /// chunks); it may be empty, in which case the embedding merge is
    /// skipped.
    #[must_use]
    pub fn cluster(
        &self,
        anchors: &[Anchor],
        embeddings: &HashMap<String, Vec<f32>>,
    ) -> Vec<HeadingCluster> {
        let headings: Vec<&Anchor> = anchors
            .iter()
            .filter(|a| a.content_type == ContentType::Hdr)
            .collect();
        if headings.len() < 2 {
            return Vec::new();
        }

        let normalized: Vec<String> = headings
            .iter()
            .map(|a| normalize_for_match(&a.text_norm))
            .collect();

        // Average-linkage agglomerative clustering over fuzzy distance.
        let mut clusters: Vec<Vec<usize>> = (0..headings.len()).map(|i| vec![i]).collect();
        loop {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..clusters.len() {
                for j in (i + 1)..clusters.len() {
                    let distance = average_distance(&clusters[i], &clusters[j], &normalized);
                    if distance <= self.distance_threshold
                        && best.is_none_or(|(_, _, d)| distance < d)
                    {
                        best = Some((i, j, distance));
                    }
                }
            }
            let Some((i, j, _)) = best else { break };
            let merged = clusters.remove(j);
            clusters[i].extend(merged);
        }

        clusters.retain(|members| members.len() >= self.min_size);

        // Optional merge of clusters whose mean embeddings nearly
        // coincide.
        if !embeddings.is_empty() {
            let mut merged = true;
            while merged {
                merged = false;
                let means: Vec<Option<Vec<f32>>> = clusters
                    .iter()
                    .map(|members| mean_embedding(members, &headings, embeddings))
                    .collect();
                'outer: for i in 0..clusters.len() {
                    for j in (i + 1)..clusters.len() {
                        if let (Some(a), Some(b)) = (&means[i], &means[j]) {
                            if 1.0 - cosine_similarity(a, b) < self.embedding_merge_threshold {
                                let moved = clusters.remove(j);
                                clusters[i].extend(moved);
                                merged = true;
                                break 'outer;
                            }
                        }
                    }
                }
            }
        }

        // Split per language and materialize.
        let mut out: Vec<HeadingCluster> = Vec::new();
        for members in clusters {
            let mut by_language: HashMap<Language, Vec<usize>> = HashMap::new();
            for idx in members {
                by_language
                    .entry(headings[idx].language)
                    .or_default()
                    .push(idx);
            }
            let mut languages: Vec<Language> = by_language.keys().copied().collect();
            languages.sort_by_key(|l| l.as_str());
            for language in languages {
                let indices = &by_language[&language];
                if indices.len() < self.min_size {
                    continue;
                }
                out.push(materialize(
                    out.len(),
                    language,
                    indices,
                    &headings,
                    embeddings,
                ));
            }
        }
        out
    }
}

fn average_distance(a: &[usize], b: &[usize], normalized: &[String]) -> f64 {
    let mut total = 0.0f64;
    let mut count = 0usize;
    for &i in a {
        for &j in b {
            total += 1.0 - fuzzy_similarity(&normalized[i], &normalized[j]);
            count += 1;
        }
    }
    if count == 0 {
        1.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        {
            total / count as f64
        }
    }
}

fn mean_embedding(
    members: &[usize],
    headings: &[&Anchor],
    embeddings: &HashMap<String, Vec<f32>>,
) -> Option<Vec<f32>> {
    let vectors: Vec<&Vec<f32>> = members
        .iter()
        .filter_map(|&idx| embeddings.get(&headings[idx].anchor_id))
        .collect();
    let first = vectors.first()?;
    let dims = first.len();
    if vectors.iter().any(|v| v.len() != dims) {
        return None;
    }
    let mut mean = vec![0.0f32; dims];
    for vector in &vectors {
        for (slot, value) in mean.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let n = vectors.len() as f32;
    for slot in &mut mean {
        *slot /= n;
    }
    Some(mean)
}

fn materialize(
    cluster_id: usize,
    language: Language,
    indices: &[usize],
    headings: &[&Anchor],
    embeddings: &HashMap<String, Vec<f32>>,
) -> HeadingCluster {
    let mut top_titles: Vec<String> = Vec::new();
    let mut examples: Vec<ClusterExample> = Vec::new();
    let mut anchor_ids: Vec<String> = Vec::new();
    let mut total_chars = 0usize;
    for &idx in indices {
        let anchor = headings[idx];
        if !top_titles.contains(&anchor.text_raw) && top_titles.len() < 20 {
            top_titles.push(anchor.text_raw.clone());
        }
        if examples.len() < 10 {
            examples.push(ClusterExample {
                section_path: anchor.section_path.clone(),
                heading_text: anchor.text_raw.clone(),
                anchor_id: anchor.anchor_id.clone(),
            });
        }
        anchor_ids.push(anchor.anchor_id.clone());
        total_chars += anchor.text_raw.chars().count();
    }
    #[allow(clippy::cast_precision_loss)]
    let avg_title_chars = total_chars as f64 / indices.len() as f64;
    HeadingCluster {
        cluster_id,
        language,
        top_titles,
        size: indices.len(),
        avg_title_chars,
        embedding: mean_embedding(indices, headings, embeddings),
        examples,
        anchor_ids,
    }
}

/// Similarity above which a cluster is considered to agree with a
/// topic.
const HINT_THRESHOLD: f64 = 0.75;

/// Derive per-heading topic hints: for each cluster, find the topic
/// whose aliases best match the cluster's titles; when the agreement is
/// strong, every member heading inherits the topic as a hint.
#[must_use]
pub fn topic_hints(
    clusters: &[HeadingCluster],
    topics: &[Topic],
) -> HashMap<String, String> {
    let mut hints: HashMap<String, String> = HashMap::new();
    for cluster in clusters {
        let mut best: Option<(&str, f64)> = None;
        for topic in topics {
            let aliases: Vec<&String> = match cluster.language {
                Language::Ru => topic.profile.aliases_ru.iter().collect(),
                Language::En => topic.profile.aliases_en.iter().collect(),
                _ => topic
                    .profile
                    .aliases_ru
                    .iter()
                    .chain(topic.profile.aliases_en.iter())
                    .collect(),
            };
            let mut score = 0.0f64;
            for title in &cluster.top_titles {
                let title_norm = normalize_for_match(title);
                for alias in &aliases {
                    score = score.max(fuzzy_similarity(&title_norm, &normalize_for_match(alias)));
                }
            }
            if score >= HINT_THRESHOLD
                && best.is_none_or(|(_, s)| score > s)
            {
                best = Some((topic.topic_key.as_str(), score));
            }
        }
        if let Some((topic_key, _)) = best {
            for anchor_id in &cluster.anchor_ids {
                hints.insert(anchor_id.clone(), topic_key.to_string());
            }
        }
    }
    hints
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::text::text_hash;
    use crate::types::{Location, SourceZone, TopicProfile};
    use uuid::Uuid;

    fn hdr(text: &str, idx: usize, language: Language) -> Anchor {
        let hash = text_hash(text);
        Anchor {
            doc_version_id: Uuid::nil(),
            anchor_id: format!("{}:hdr:{idx}:{hash}", Uuid::nil()),
            section_path: text.to_string(),
            content_type: ContentType::Hdr,
            ordinal: 1,
            text_raw: text.to_string(),
            text_norm: text.to_string(),
            text_hash: hash,
            location: Location::Body {
                para_index: idx,
                style: "Heading 2".into(),
            },
            source_zone: SourceZone::Unknown,
            language,
        }
    }

    fn clusterer() -> HeadingClusterer {
        HeadingClusterer::new(&ClusteringConfig::default())
    }

    #[test]
    fn test_similar_headings_cluster_together() {
        // Repetitive per-cohort headings cluster; the outlier does not.
        let anchors = vec![
            hdr("Adverse Events Cohort A", 1, Language::En),
            hdr("Adverse Events Cohort B", 2, Language::En),
            hdr("Adverse Events Cohort C", 3, Language::En),
            hdr("Statistical Appendix", 4, Language::En),
        ];
        let clusters = clusterer().cluster(&anchors, &HashMap::new());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].size, 3);
        assert!(clusters[0]
            .top_titles
            .iter()
            .all(|t| t.starts_with("Adverse Events")));
    }

    #[test]
    fn test_small_clusters_are_noise() {
        let anchors = vec![
            hdr("Dosing Schedule", 1, Language::En),
            hdr("Dosing Schedule Details", 2, Language::En),
        ];
        // Two members < min_size 3: everything is noise.
        let clusters = clusterer().cluster(&anchors, &HashMap::new());
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_languages_never_share_a_cluster() {
        let anchors = vec![
            hdr("Нежелательные явления когорта А", 1, Language::Ru),
            hdr("Нежелательные явления когорта Б", 2, Language::Ru),
            hdr("Нежелательные явления когорта В", 3, Language::Ru),
            hdr("Adverse Events Cohort A", 4, Language::En),
            hdr("Adverse Events Cohort B", 5, Language::En),
            hdr("Adverse Events Cohort C", 6, Language::En),
        ];
        let clusters = clusterer().cluster(&anchors, &HashMap::new());
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().any(|c| c.language == Language::Ru));
        assert!(clusters.iter().any(|c| c.language == Language::En));
    }

    #[test]
    fn test_topic_hints_require_strong_agreement() {
        let anchors = vec![
            hdr("Adverse Events Cohort A", 1, Language::En),
            hdr("Adverse Events Cohort B", 2, Language::En),
            hdr("Adverse Events Cohort C", 3, Language::En),
        ];
        let clusters = clusterer().cluster(&anchors, &HashMap::new());

        let safety = Topic {
            topic_key: "safety".into(),
            title: "Safety".into(),
            title_ru: None,
            doc_types: vec![],
            profile: TopicProfile {
                aliases_en: vec!["Adverse Events Cohort".into()],
                ..TopicProfile::default()
            },
            embedding: None,
        };
        let unrelated = Topic {
            topic_key: "endpoints".into(),
            title: "Endpoints".into(),
            title_ru: None,
            doc_types: vec![],
            profile: TopicProfile {
                aliases_en: vec!["Study Endpoints".into()],
                ..TopicProfile::default()
            },
            embedding: None,
        };

        let hints = topic_hints(&clusters, &[unrelated, safety]);
        assert_eq!(hints.len(), 3);
        assert!(hints.values().all(|t| t == "safety"));
        assert!(hints.contains_key(&anchors[0].anchor_id));
    }

    #[test]
    fn test_deterministic_clustering() {
        let anchors = vec![
            hdr("Laboratory Assessments Week 1", 1, Language::En),
            hdr("Laboratory Assessments Week 2", 2, Language::En),
            hdr("Laboratory Assessments Week 4", 3, Language::En),
            hdr("Informed Consent", 4, Language::En),
        ];
        let a = clusterer().cluster(&anchors, &HashMap::new());
        let b = clusterer().cluster(&anchors, &HashMap::new());
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.anchor_ids, y.anchor_ids);
        }
    }
}
