//! Pipeline configuration.
//!
//! A single immutable [`Config`] is built once at startup (defaults or a
//! TOML file) and threaded through the pipeline by reference. It carries
//! the source-zone rulebook, fact-rule switches, chunker budget, SoA and
//! topic thresholds, and the retry policy for external calls.
//!
//! Changing the rulebook or the fact rules changes
//! [`Config::pipeline_config_hash`], which is recorded on every ingestion
//! run so results can be traced back to the exact configuration that
//! produced them.
//!
//! ```rust
//! use clindex_core::Config;
//!
//! let config = Config::default();
//! assert_eq!(config.pipeline_config_hash().len(), 64);
//! assert!(config.required_facts.contains(&"population/planned_n_total".to_string()));
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::text::text_hash;
use crate::types::SourceZone;

/// One weighted rule of the source-zone rulebook.
///
/// Patterns are case-insensitive regexes matched against the last
/// section-path segment and the nearest heading text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRule {
    /// Zone this rule votes for.
    pub zone: SourceZone,
    /// Russian patterns.
    #[serde(default)]
    pub patterns_ru: Vec<String>,
    /// English patterns.
    #[serde(default)]
    pub patterns_en: Vec<String>,
    /// Vote weight added per matching pattern.
    pub weight: f64,
}

/// Narrative chunker budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Soft target per chunk, in estimated tokens.
    #[serde(default = "default_chunk_target")]
    pub target_tokens: usize,
    /// Hard ceiling per chunk, in estimated tokens.
    #[serde(default = "default_chunk_max")]
    pub max_tokens: usize,
}

const fn default_chunk_target() -> usize {
    600
}
const fn default_chunk_max() -> usize {
    800
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_chunk_target(),
            max_tokens: default_chunk_max(),
        }
    }
}

/// SoA detection and persistence thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Minimum composite score for a table to qualify as the SoA.
    #[serde(default = "default_soa_threshold")]
    pub score_threshold: f64,
    /// Runner-up tables within this band of the winner trigger an
    /// ambiguity warning.
    #[serde(default = "default_soa_band")]
    pub ambiguity_band: f64,
    /// SoA facts from a table below this confidence are marked
    /// needs_review.
    #[serde(default = "default_soa_review")]
    pub review_threshold: f64,
    /// Cap on matrix evidence rows written per SoA fact.
    #[serde(default = "default_matrix_cap")]
    pub matrix_evidence_cap: usize,
}

const fn default_soa_threshold() -> f64 {
    0.5
}
const fn default_soa_band() -> f64 {
    0.05
}
const fn default_soa_review() -> f64 {
    0.7
}
const fn default_matrix_cap() -> usize {
    100
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_soa_threshold(),
            ambiguity_band: default_soa_band(),
            review_threshold: default_soa_review(),
            matrix_evidence_cap: default_matrix_cap(),
        }
    }
}

/// Topic-mapper thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Base confidence threshold for persisting an assignment.
    #[serde(default = "default_topic_threshold")]
    pub confidence_threshold: f64,
    /// Threshold used instead when the block's zone strongly matches the
    /// topic.
    #[serde(default = "default_topic_zone_threshold")]
    pub strong_zone_threshold: f64,
}

const fn default_topic_threshold() -> f64 {
    0.55
}
const fn default_topic_zone_threshold() -> f64 {
    0.45
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_topic_threshold(),
            strong_zone_threshold: default_topic_zone_threshold(),
        }
    }
}

/// Aligner thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// Matches below this score are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

const fn default_min_score() -> f64 {
    0.6
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
        }
    }
}

/// Heading-clustering knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Average-linkage distance ceiling for merging headings.
    #[serde(default = "default_cluster_distance")]
    pub distance_threshold: f64,
    /// Clusters below this size are noise.
    #[serde(default = "default_cluster_min_size")]
    pub min_size: usize,
    /// Cosine-distance ceiling for the embedding merge pass.
    #[serde(default = "default_cluster_merge")]
    pub embedding_merge_threshold: f64,
}

const fn default_cluster_distance() -> f64 {
    0.22
}
const fn default_cluster_min_size() -> usize {
    3
}
const fn default_cluster_merge() -> f64 {
    0.15
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_cluster_distance(),
            min_size: default_cluster_min_size(),
            embedding_merge_threshold: default_cluster_merge(),
        }
    }
}

/// Retry/timeout policy for LLM and embedding calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before giving up (first call included).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubles per
    /// attempt.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Ceiling on the backoff delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Per-call timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

const fn default_attempts() -> u32 {
    3
}
const fn default_base_delay() -> u64 {
    1_000
}
const fn default_max_delay() -> u64 {
    4_000
}
const fn default_timeout() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Quality-gate thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Unknown-zone rate above this adds a warning.
    #[serde(default = "default_unknown_warn")]
    pub unknown_zone_warn_rate: f64,
    /// Unknown-zone rate above this adds a stronger warning.
    #[serde(default = "default_unknown_high")]
    pub unknown_zone_high_rate: f64,
}

const fn default_unknown_warn() -> f64 {
    0.10
}
const fn default_unknown_high() -> f64 {
    0.25
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            unknown_zone_warn_rate: default_unknown_warn(),
            unknown_zone_high_rate: default_unknown_high(),
        }
    }
}

/// The immutable pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source-zone rulebook.
    pub zone_rules: Vec<ZoneRule>,
    /// Chunker budget.
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// SoA thresholds.
    #[serde(default)]
    pub soa: SoaConfig,
    /// Topic-mapper thresholds.
    #[serde(default)]
    pub topics: TopicConfig,
    /// Aligner thresholds.
    #[serde(default)]
    pub aligner: AlignerConfig,
    /// Heading-clustering knobs.
    #[serde(default)]
    pub clustering: ClusteringConfig,
    /// Retry/timeout policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Quality-gate thresholds.
    #[serde(default)]
    pub gate: GateConfig,
    /// `fact_type/fact_key` pairs that must be present after extraction;
    /// any missing one flips the run to needs_review.
    #[serde(default = "default_required_facts")]
    pub required_facts: Vec<String>,
    /// Topic keys counted towards section-map coverage.
    #[serde(default)]
    pub core_topics: Vec<String>,
}

fn default_required_facts() -> Vec<String> {
    vec![
        "protocol_meta/protocol_version".to_string(),
        "protocol_meta/amendment_date".to_string(),
        "population/planned_n_total".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zone_rules: default_zone_rules(),
            chunker: ChunkerConfig::default(),
            soa: SoaConfig::default(),
            topics: TopicConfig::default(),
            aligner: AlignerConfig::default(),
            clustering: ClusteringConfig::default(),
            retry: RetryConfig::default(),
            gate: GateConfig::default(),
            required_facts: default_required_facts(),
            core_topics: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunker.max_tokens < self.chunker.target_tokens {
            return Err(Error::Config(
                "chunker.max_tokens must be >= chunker.target_tokens".into(),
            ));
        }
        if self.zone_rules.is_empty() {
            return Err(Error::Config("zone_rules must not be empty".into()));
        }
        for rule in &self.zone_rules {
            if !(0.0..=1.0).contains(&rule.weight) {
                return Err(Error::Config(format!(
                    "zone rule weight out of range for {}",
                    rule.zone.as_str()
                )));
            }
        }
        Ok(())
    }

    /// SHA-256 over the canonical JSON dump of the behavior-relevant
    /// configuration. Recorded on every ingestion run.
    #[must_use]
    pub fn pipeline_config_hash(&self) -> String {
        // serde_json serializes struct fields in declaration order, which
        // makes the dump canonical for hashing.
        let dump = serde_json::to_string(self).unwrap_or_default();
        text_hash(&dump)
    }
}

/// The default rulebook shipped with the crate.
///
/// Patterns are substring-style regexes; Russian entries use stems so one
/// pattern covers the inflected forms.
#[allow(clippy::too_many_lines)]
fn default_zone_rules() -> Vec<ZoneRule> {
    fn rule(zone: SourceZone, ru: &[&str], en: &[&str], weight: f64) -> ZoneRule {
        ZoneRule {
            zone,
            patterns_ru: ru.iter().map(|s| (*s).to_string()).collect(),
            patterns_en: en.iter().map(|s| (*s).to_string()).collect(),
            weight,
        }
    }

    vec![
        rule(
            SourceZone::Statistics,
            &["статистич", "размер выборки", "мощность", "анализ данных", "популяци[ияю] анализа"],
            &["statistic", "sample size", "power", "interim analysis", "analysis population"],
            0.8,
        ),
        rule(
            SourceZone::Safety,
            &["безопасност", "нежелательн", "побочн", "серьезн[ыо]е явлени"],
            &["safety", "adverse event", "serious adverse", "tolerability", "pharmacovigilance"],
            0.8,
        ),
        rule(
            SourceZone::Ip,
            &["исследуем[ыо][йе] (препарат|продукт)", "дозирован", "лекарствен", "хранени[ея] препарата"],
            &["investigational (medicinal )?product", "study drug", "dosing", "dose modification", "drug supply"],
            0.8,
        ),
        rule(
            SourceZone::Eligibility,
            &["критери[ия] (включения|невключения|исключения)", "отбор пациентов"],
            &["inclusion criteria", "exclusion criteria", "eligibility"],
            0.9,
        ),
        rule(
            SourceZone::Procedures,
            &["процедур", "график (визитов|исследования)", "обследован", "план визитов"],
            &["procedure", "schedule of (activities|assessments|events)", "study visits", "assessments"],
            0.7,
        ),
        rule(
            SourceZone::Endpoints,
            &["конечн[ыа][ея] точк", "показатели эффективности", "исходы"],
            &["endpoint", "outcome measure", "efficacy (variable|assessment)"],
            0.8,
        ),
        rule(
            SourceZone::Design,
            &["дизайн", "схема исследования", "рандомизац", "ослеплени", "маскирован"],
            &["study design", "randomi[sz]ation", "blinding", "masking"],
            0.7,
        ),
        rule(
            SourceZone::Population,
            &["популяц", "число (пациентов|участников|субъектов)", "выборк"],
            &["study population", "number of (patients|participants|subjects)", "enrollment"],
            0.7,
        ),
        rule(
            SourceZone::Objectives,
            &["цел[ьи] исследования", "задач[иа] исследования", "гипотез"],
            &["objective", "hypothes[ie]s", "purpose of (the )?study"],
            0.7,
        ),
        rule(
            SourceZone::Ethics,
            &["этическ", "информированн[ое]+ согласи", "конфиденциальн"],
            &["ethic", "informed consent", "confidentiality", "institutional review"],
            0.7,
        ),
        rule(
            SourceZone::Administrative,
            &["подпис[ьи]", "титульн", "список сокращений", "администр"],
            &["signature", "title page", "abbreviation", "administrative", "sponsor information"],
            0.5,
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.soa.matrix_evidence_cap, 100);
        assert_eq!(config.topics.confidence_threshold, 0.55);
        assert_eq!(config.aligner.min_score, 0.6);
    }

    #[test]
    fn test_config_hash_is_stable_and_sensitive() {
        let a = Config::default();
        let b = Config::default();
        assert_eq!(a.pipeline_config_hash(), b.pipeline_config_hash());

        let mut c = Config::default();
        c.soa.matrix_evidence_cap = 50;
        assert_ne!(a.pipeline_config_hash(), c.pipeline_config_hash());
    }

    #[test]
    fn test_invalid_chunker_budget_rejected() {
        let mut config = Config::default();
        config.chunker.max_tokens = 100;
        config.chunker.target_tokens = 600;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.pipeline_config_hash(),
            back.pipeline_config_hash()
        );
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = Config::load(Path::new("/nonexistent/clindex.toml")).unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
