//! Ingestion metrics and the quality gate.
//!
//! One [`MetricsCollector`] lives for the duration of an ingestion run.
//! The orchestrator feeds it the rows it just produced; `finalize`
//! evaluates the gate (required facts present, unknown-zone rate under
//! the configured ceilings) and returns the metric tree that goes into
//! the run summary, along with the gate verdict.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::GateConfig;
use crate::soa::SoaResult;
use crate::types::{
    Anchor, BlockTopicAssignment, Chunk, ContentType, Fact, FactStatus, SourceZone,
};

/// p50/p95 of a sample.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Percentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
}

/// Nearest-rank percentiles over an unsorted sample.
#[must_use]
pub fn compute_percentiles(values: &[f64]) -> Percentiles {
    if values.is_empty() {
        return Percentiles::default();
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = |q: f64| -> f64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
        let idx = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len()) - 1;
        sorted[idx]
    };
    Percentiles {
        p50: rank(0.50),
        p95: rank(0.95),
    }
}

/// Anchor-level metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnchorMetrics {
    /// Total anchors.
    pub total: usize,
    /// Counts by content-type wire value.
    pub by_content_type: BTreeMap<String, usize>,
    /// Counts by zone wire value.
    pub by_source_zone: BTreeMap<String, usize>,
    /// Counts by language wire value.
    pub by_language: BTreeMap<String, usize>,
    /// Share of anchors with an unknown zone.
    pub unknown_zone_rate: f64,
    /// Anchors whose normalized text is shorter than 10 chars.
    pub empty_or_short: usize,
    /// Normalized text-length percentiles.
    pub text_len: Percentiles,
    /// Most frequent unknown-zone headings (up to 10).
    pub top_unknown_headings: Vec<UnknownHeading>,
}

/// One unknown-zone heading aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct UnknownHeading {
    /// Heading text, truncated to 100 chars.
    pub heading: String,
    /// Occurrence count.
    pub count: usize,
}

/// Chunk-level metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkMetrics {
    /// Total chunks.
    pub total: usize,
    /// Counts by zone.
    pub by_source_zone: BTreeMap<String, usize>,
    /// Counts by language.
    pub by_language: BTreeMap<String, usize>,
    /// Token-estimate percentiles.
    pub token_estimate: Percentiles,
    /// Anchors-per-chunk percentiles.
    pub anchors_per_chunk: Percentiles,
}

/// Fact-level metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FactsMetrics {
    /// Facts written by this run.
    pub total: usize,
    /// Counts keyed by `fact_type/fact_key`.
    pub by_fact_key: BTreeMap<String, usize>,
    /// Counts keyed by status wire value.
    pub by_status: BTreeMap<String, usize>,
    /// Conflicting facts.
    pub conflicting_count: usize,
    /// Keys currently in needs_review.
    pub needs_review: Vec<String>,
    /// Required keys with no fact.
    pub missing_required: Vec<String>,
}

/// SoA metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SoaMetrics {
    /// Whether a schedule table was detected.
    pub found: bool,
    /// Winning table score.
    pub table_score: Option<f64>,
    /// Visit columns.
    pub visits_count: Option<usize>,
    /// Procedure rows.
    pub procedures_count: Option<usize>,
    /// Non-empty matrix cells.
    pub matrix_cells: Option<usize>,
}

/// Topic-coverage metrics over the configured core topics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SectionMapsMetrics {
    /// Core topics expected.
    pub expected: usize,
    /// Core topics actually assigned to some block.
    pub mapped: usize,
    /// mapped / expected.
    pub coverage_rate: f64,
    /// Core topics with no assignment.
    pub missing_core_keys: Vec<String>,
    /// Assignment counts per topic key.
    pub per_topic: BTreeMap<String, usize>,
}

/// Zone distribution summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceZoneMetrics {
    /// Counts by zone wire value.
    pub by_zone_counts: BTreeMap<String, usize>,
}

/// The full metric tree of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionMetrics {
    /// Anchor metrics.
    pub anchors: AnchorMetrics,
    /// Chunk metrics.
    pub chunks: ChunkMetrics,
    /// Fact metrics.
    pub facts: FactsMetrics,
    /// SoA metrics.
    pub soa: SoaMetrics,
    /// Topic-coverage metrics.
    pub section_maps: SectionMapsMetrics,
    /// Zone distribution.
    pub source_zones: SourceZoneMetrics,
    /// Per-step durations in milliseconds.
    pub timings_ms: BTreeMap<String, u64>,
}

/// Verdict of the quality gate.
#[derive(Debug, Clone)]
pub struct GateVerdict {
    /// Whether a human should look at this run.
    pub needs_review: bool,
    /// Gate warnings to append to the run.
    pub warnings: Vec<String>,
}

/// Accumulates metrics over one ingestion run.
pub struct MetricsCollector {
    metrics: IngestionMetrics,
    timers: BTreeMap<String, Instant>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metrics: IngestionMetrics::default(),
            timers: BTreeMap::new(),
        }
    }

    /// Start timing a step.
    pub fn start_timing(&mut self, step: &str) {
        self.timers.insert(step.to_string(), Instant::now());
    }

    /// Stop timing a step and record its duration.
    pub fn end_timing(&mut self, step: &str) {
        if let Some(started) = self.timers.remove(step) {
            #[allow(clippy::cast_possible_truncation)]
            let elapsed = started.elapsed().as_millis() as u64;
            self.metrics.timings_ms.insert(step.to_string(), elapsed);
        }
    }

    /// Aggregate anchor metrics.
    pub fn collect_anchors(&mut self, anchors: &[Anchor]) {
        let m = &mut self.metrics.anchors;
        m.total = anchors.len();
        let mut lengths: Vec<f64> = Vec::with_capacity(anchors.len());
        let mut unknown_headings: BTreeMap<String, usize> = BTreeMap::new();
        let mut unknown = 0usize;
        for anchor in anchors {
            *m.by_content_type
                .entry(anchor.content_type.as_str().to_string())
                .or_insert(0) += 1;
            *m.by_source_zone
                .entry(anchor.source_zone.as_str().to_string())
                .or_insert(0) += 1;
            *m.by_language
                .entry(anchor.language.as_str().to_string())
                .or_insert(0) += 1;
            let len = anchor.text_norm.chars().count();
            #[allow(clippy::cast_precision_loss)]
            lengths.push(len as f64);
            if len < 10 {
                m.empty_or_short += 1;
            }
            if anchor.source_zone == SourceZone::Unknown {
                unknown += 1;
                if anchor.content_type == ContentType::Hdr {
                    let heading: String = anchor.text_norm.chars().take(100).collect();
                    *unknown_headings.entry(heading).or_insert(0) += 1;
                }
            }
        }
        #[allow(clippy::cast_precision_loss)]
        if m.total > 0 {
            m.unknown_zone_rate = unknown as f64 / m.total as f64;
        }
        m.text_len = compute_percentiles(&lengths);

        let mut ranked: Vec<(String, usize)> = unknown_headings.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        m.top_unknown_headings = ranked
            .into_iter()
            .take(10)
            .map(|(heading, count)| UnknownHeading { heading, count })
            .collect();

        self.metrics.source_zones.by_zone_counts = self.metrics.anchors.by_source_zone.clone();
    }

    /// Aggregate chunk metrics.
    pub fn collect_chunks(&mut self, chunks: &[Chunk]) {
        let m = &mut self.metrics.chunks;
        m.total = chunks.len();
        let mut tokens = Vec::with_capacity(chunks.len());
        let mut members = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            *m.by_source_zone
                .entry(chunk.source_zone.as_str().to_string())
                .or_insert(0) += 1;
            *m.by_language
                .entry(chunk.language.as_str().to_string())
                .or_insert(0) += 1;
            #[allow(clippy::cast_precision_loss)]
            tokens.push(chunk.token_estimate as f64);
            #[allow(clippy::cast_precision_loss)]
            members.push(chunk.anchor_ids.len() as f64);
        }
        m.token_estimate = compute_percentiles(&tokens);
        m.anchors_per_chunk = compute_percentiles(&members);
    }

    /// Aggregate fact metrics and check the required list.
    pub fn collect_facts(&mut self, facts: &[Fact], required: &[String]) {
        let m = &mut self.metrics.facts;
        m.total = facts.len();
        for fact in facts {
            let key = format!("{}/{}", fact.fact_type, fact.fact_key);
            *m.by_fact_key.entry(key.clone()).or_insert(0) += 1;
            *m.by_status
                .entry(fact.status.as_str().to_string())
                .or_insert(0) += 1;
            match fact.status {
                FactStatus::Conflicting => m.conflicting_count += 1,
                FactStatus::NeedsReview => m.needs_review.push(key),
                _ => {}
            }
        }
        m.missing_required = required
            .iter()
            .filter(|key| !m.by_fact_key.contains_key(*key))
            .cloned()
            .collect();
    }

    /// Record SoA detection results.
    pub fn set_soa(&mut self, result: Option<&SoaResult>) {
        let m = &mut self.metrics.soa;
        match result {
            Some(soa) => {
                m.found = true;
                m.table_score = Some(soa.confidence);
                m.visits_count = Some(soa.visits.len());
                m.procedures_count = Some(soa.procedures.len());
                m.matrix_cells = Some(soa.matrix.len());
            }
            None => {
                m.found = false;
            }
        }
    }

    /// Aggregate topic coverage against the configured core topics.
    pub fn collect_assignments(
        &mut self,
        assignments: &[BlockTopicAssignment],
        core_topics: &[String],
    ) {
        let m = &mut self.metrics.section_maps;
        for assignment in assignments {
            *m.per_topic.entry(assignment.topic_key.clone()).or_insert(0) += 1;
        }
        m.expected = core_topics.len();
        m.missing_core_keys = core_topics
            .iter()
            .filter(|key| !m.per_topic.contains_key(*key))
            .cloned()
            .collect();
        m.mapped = m.expected - m.missing_core_keys.len();
        #[allow(clippy::cast_precision_loss)]
        if m.expected > 0 {
            m.coverage_rate = m.mapped as f64 / m.expected as f64;
        }
    }

    /// Evaluate the quality gate and hand back the metric tree.
    #[must_use]
    pub fn finalize(self, gate: &GateConfig) -> (IngestionMetrics, GateVerdict) {
        let mut warnings = Vec::new();
        let mut needs_review = false;

        if !self.metrics.facts.missing_required.is_empty() {
            needs_review = true;
            warnings.push(format!(
                "Required facts missing: {}",
                self.metrics.facts.missing_required.join(", ")
            ));
        }
        let rate = self.metrics.anchors.unknown_zone_rate;
        if rate > gate.unknown_zone_high_rate {
            warnings.push(format!(
                "Unknown-zone rate {:.0}% exceeds {:.0}%",
                rate * 100.0,
                gate.unknown_zone_high_rate * 100.0
            ));
        } else if rate > gate.unknown_zone_warn_rate {
            warnings.push(format!(
                "Unknown-zone rate {:.0}% exceeds {:.0}%",
                rate * 100.0,
                gate.unknown_zone_warn_rate * 100.0
            ));
        }

        (self.metrics, GateVerdict {
            needs_review,
            warnings,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::new_fact;
    use crate::text::text_hash;
    use crate::types::{Language, Location};
    use uuid::Uuid;

    fn anchor(zone: SourceZone, content_type: ContentType, text: &str, idx: usize) -> Anchor {
        let hash = text_hash(text);
        Anchor {
            doc_version_id: Uuid::nil(),
            anchor_id: format!("{}:{}:{idx}:{hash}", Uuid::nil(), content_type.as_str()),
            section_path: "S".into(),
            content_type,
            ordinal: 1,
            text_raw: text.into(),
            text_norm: text.into(),
            text_hash: hash,
            location: Location::Body {
                para_index: idx,
                style: "Normal".into(),
            },
            source_zone: zone,
            language: Language::En,
        }
    }

    #[test]
    fn test_percentiles() {
        let p = compute_percentiles(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(p.p50, 2.0);
        assert_eq!(p.p95, 4.0);
        let empty = compute_percentiles(&[]);
        assert_eq!(empty.p50, 0.0);
    }

    #[test]
    fn test_anchor_metrics_and_unknown_rate() {
        let mut collector = MetricsCollector::new();
        let anchors = vec![
            anchor(SourceZone::Statistics, ContentType::Hdr, "Statistical Methods", 1),
            anchor(SourceZone::Unknown, ContentType::Hdr, "Mystery Section", 2),
            anchor(SourceZone::Unknown, ContentType::P, "short", 3),
            anchor(SourceZone::Statistics, ContentType::P, "A paragraph with enough text.", 4),
        ];
        collector.collect_anchors(&anchors);
        let (metrics, verdict) = collector.finalize(&GateConfig::default());

        assert_eq!(metrics.anchors.total, 4);
        assert_eq!(metrics.anchors.by_content_type["hdr"], 2);
        assert_eq!(metrics.anchors.unknown_zone_rate, 0.5);
        assert_eq!(metrics.anchors.empty_or_short, 1);
        assert_eq!(metrics.anchors.top_unknown_headings.len(), 1);
        assert_eq!(metrics.anchors.top_unknown_headings[0].heading, "Mystery Section");

        // 50% unknown crosses the high-rate ceiling.
        assert!(verdict.warnings.iter().any(|w| w.contains("Unknown-zone rate")));
    }

    #[test]
    fn test_missing_required_facts_gate() {
        let mut collector = MetricsCollector::new();
        let facts = vec![new_fact(
            Uuid::nil(),
            "population",
            "planned_n_total",
            serde_json::json!({"value": 120}),
            None,
            FactStatus::Extracted,
            None,
            Uuid::nil(),
        )];
        let required = vec![
            "population/planned_n_total".to_string(),
            "protocol_meta/protocol_version".to_string(),
        ];
        collector.collect_facts(&facts, &required);
        let (metrics, verdict) = collector.finalize(&GateConfig::default());

        assert_eq!(metrics.facts.total, 1);
        assert_eq!(
            metrics.facts.missing_required,
            vec!["protocol_meta/protocol_version".to_string()]
        );
        assert!(verdict.needs_review);
        assert!(verdict.warnings[0].contains("Required facts missing"));
    }

    #[test]
    fn test_needs_review_keys_listed() {
        let mut collector = MetricsCollector::new();
        let facts = vec![new_fact(
            Uuid::nil(),
            "protocol_meta",
            "amendment_date",
            serde_json::json!({"value": null}),
            None,
            FactStatus::NeedsReview,
            None,
            Uuid::nil(),
        )];
        collector.collect_facts(&facts, &[]);
        let (metrics, verdict) = collector.finalize(&GateConfig::default());
        assert_eq!(metrics.facts.needs_review, vec!["protocol_meta/amendment_date"]);
        // needs_review facts alone do not trip the required gate.
        assert!(!verdict.needs_review);
    }

    #[test]
    fn test_core_topic_coverage() {
        let mut collector = MetricsCollector::new();
        let assignments = vec![BlockTopicAssignment {
            doc_version_id: Uuid::nil(),
            heading_block_id: "hb:1".into(),
            topic_key: "endpoints".into(),
            confidence: 0.8,
            debug: serde_json::json!({}),
        }];
        let core = vec!["endpoints".to_string(), "safety".to_string()];
        collector.collect_assignments(&assignments, &core);
        let (metrics, _) = collector.finalize(&GateConfig::default());
        assert_eq!(metrics.section_maps.expected, 2);
        assert_eq!(metrics.section_maps.mapped, 1);
        assert_eq!(metrics.section_maps.coverage_rate, 0.5);
        assert_eq!(metrics.section_maps.missing_core_keys, vec!["safety"]);
    }

    #[test]
    fn test_timings_recorded() {
        let mut collector = MetricsCollector::new();
        collector.start_timing("parse");
        collector.end_timing("parse");
        let (metrics, _) = collector.finalize(&GateConfig::default());
        assert!(metrics.timings_ms.contains_key("parse"));
    }
}
