//! Source-zone classification.
//!
//! Maps a section path plus its nearest heading text onto a coarse
//! semantic zone (statistics, safety, eligibility, ...) using the
//! weighted-pattern rulebook from [`crate::config`]. Pure and
//! deterministic: the same inputs always classify the same way, and the
//! rulebook is configuration, not code.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::config::ZoneRule;
use crate::error::{Error, Result};
use crate::text::normalize_for_match;
use crate::types::{
    FOOTNOTES_SECTION, FRONTMATTER_SECTION, Language, ROOT_SECTION, SourceZone,
};

/// Classification outcome with its rationale.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneClassification {
    /// Winning zone, `unknown` when nothing matched.
    pub zone: SourceZone,
    /// Cumulative matched weight, capped at 1.
    pub confidence: f64,
    /// Patterns that matched, for debugging and summaries.
    pub rationale: Vec<String>,
}

impl ZoneClassification {
    fn unknown() -> Self {
        Self {
            zone: SourceZone::Unknown,
            confidence: 0.0,
            rationale: Vec::new(),
        }
    }
}

struct CompiledRule {
    zone: SourceZone,
    patterns_ru: Vec<(String, Regex)>,
    patterns_en: Vec<(String, Regex)>,
    weight: f64,
}

/// Rulebook-driven classifier, compiled once at startup.
pub struct ZoneClassifier {
    rules: Vec<CompiledRule>,
}

impl ZoneClassifier {
    /// Compile the rulebook. Invalid regexes are configuration errors.
    pub fn new(rules: &[ZoneRule]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            compiled.push(CompiledRule {
                zone: rule.zone,
                patterns_ru: compile_patterns(&rule.patterns_ru)?,
                patterns_en: compile_patterns(&rule.patterns_en)?,
                weight: rule.weight,
            });
        }
        Ok(Self { rules: compiled })
    }

    /// Classify a section.
    ///
    /// `language` narrows which pattern sets are consulted; `None` or
    /// `Mixed` consults both. The sentinel paths (frontmatter, root,
    /// footnotes) are always `unknown`.
    #[must_use]
    pub fn classify(
        &self,
        section_path: &str,
        heading_text: Option<&str>,
        language: Option<Language>,
    ) -> ZoneClassification {
        if matches!(
            section_path,
            FRONTMATTER_SECTION | ROOT_SECTION | FOOTNOTES_SECTION
        ) {
            return ZoneClassification::unknown();
        }

        let last_segment = section_path.rsplit('/').next().unwrap_or(section_path);
        let mut haystack = normalize_for_match(last_segment);
        if let Some(heading) = heading_text {
            let heading = normalize_for_match(heading);
            if heading != haystack {
                haystack.push(' ');
                haystack.push_str(&heading);
            }
        }

        let (use_ru, use_en) = match language {
            Some(Language::Ru) => (true, false),
            Some(Language::En) => (false, true),
            _ => (true, true),
        };

        let mut best: Option<(SourceZone, f64, Vec<String>)> = None;
        for rule in &self.rules {
            let mut score = 0.0f64;
            let mut matched = Vec::new();
            if use_ru {
                for (raw, regex) in &rule.patterns_ru {
                    if regex.is_match(&haystack) {
                        score += rule.weight;
                        matched.push(raw.clone());
                    }
                }
            }
            if use_en {
                for (raw, regex) in &rule.patterns_en {
                    if regex.is_match(&haystack) {
                        score += rule.weight;
                        matched.push(raw.clone());
                    }
                }
            }
            if score > 0.0 {
                let better = best.as_ref().is_none_or(|(_, s, _)| score > *s);
                if better {
                    best = Some((rule.zone, score, matched));
                }
            }
        }

        best.map_or_else(ZoneClassification::unknown, |(zone, score, rationale)| {
            ZoneClassification {
                zone,
                confidence: score.min(1.0),
                rationale,
            }
        })
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<(String, Regex)>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map(|re| (p.clone(), re))
                .map_err(|e| Error::Config(format!("invalid zone pattern '{p}': {e}")))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn classifier() -> ZoneClassifier {
        ZoneClassifier::new(&Config::default().zone_rules).unwrap()
    }

    #[test]
    fn test_statistics_heading_en() {
        let c = classifier();
        let result = c.classify(
            "Statistical Considerations/Sample Size",
            Some("Sample Size Determination"),
            Some(Language::En),
        );
        assert_eq!(result.zone, SourceZone::Statistics);
        assert!(result.confidence > 0.0);
        assert!(!result.rationale.is_empty());
    }

    #[test]
    fn test_eligibility_heading_ru() {
        let c = classifier();
        let result = c.classify(
            "Критерии включения",
            Some("Критерии включения"),
            Some(Language::Ru),
        );
        assert_eq!(result.zone, SourceZone::Eligibility);
    }

    #[test]
    fn test_sentinels_are_unknown() {
        let c = classifier();
        for path in [FRONTMATTER_SECTION, ROOT_SECTION, FOOTNOTES_SECTION] {
            let result = c.classify(path, None, None);
            assert_eq!(result.zone, SourceZone::Unknown);
            assert_eq!(result.confidence, 0.0);
        }
    }

    #[test]
    fn test_unmatched_heading_is_unknown() {
        let c = classifier();
        let result = c.classify("Some Unrelated Chapter", Some("Some Unrelated Chapter"), None);
        assert_eq!(result.zone, SourceZone::Unknown);
    }

    #[test]
    fn test_deterministic() {
        let c = classifier();
        let a = c.classify("Safety Reporting", Some("Adverse Events"), Some(Language::En));
        let b = c.classify("Safety Reporting", Some("Adverse Events"), Some(Language::En));
        assert_eq!(a.zone, b.zone);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.rationale, b.rationale);
    }

    #[test]
    fn test_language_narrows_patterns() {
        let c = classifier();
        // A Russian heading consulted with EN-only patterns stays unknown.
        let result = c.classify("Критерии включения", None, Some(Language::En));
        assert_eq!(result.zone, SourceZone::Unknown);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let rules = vec![ZoneRule {
            zone: SourceZone::Safety,
            patterns_ru: vec![],
            patterns_en: vec!["[unclosed".into()],
            weight: 0.5,
        }];
        assert!(matches!(
            ZoneClassifier::new(&rules),
            Err(Error::Config(_))
        ));
    }
}
