//! The built-in topic catalog.
//!
//! A workspace normally curates its own catalog; this module ships the
//! starter set covering the canonical protocol subjects (synopsis,
//! objectives, design, eligibility, schedule, dosing, safety,
//! endpoints, statistics) with bilingual aliases and keywords, so topic
//! mapping works before any curation has happened. Catalog embeddings
//! are not bundled; the mapper's warm-up fills them in when an
//! embedding provider is configured.

use crate::types::{SourceZone, Topic, TopicProfile};

#[allow(clippy::too_many_arguments)]
fn topic(
    key: &str,
    title: &str,
    title_ru: &str,
    aliases_en: &[&str],
    aliases_ru: &[&str],
    keywords_en: &[&str],
    keywords_ru: &[&str],
    source_zones: &[SourceZone],
    dissimilar_zones: &[SourceZone],
) -> Topic {
    let to_vec = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
    Topic {
        topic_key: key.to_string(),
        title: title.to_string(),
        title_ru: Some(title_ru.to_string()),
        doc_types: Vec::new(),
        profile: TopicProfile {
            aliases_en: to_vec(aliases_en),
            aliases_ru: to_vec(aliases_ru),
            keywords_en: to_vec(keywords_en),
            keywords_ru: to_vec(keywords_ru),
            exclude_patterns_en: Vec::new(),
            exclude_patterns_ru: Vec::new(),
            source_zones: source_zones.to_vec(),
            dissimilar_zones: dissimilar_zones.to_vec(),
        },
        embedding: None,
    }
}

/// The starter catalog.
#[allow(clippy::too_many_lines)]
#[must_use]
pub fn default_topic_catalog() -> Vec<Topic> {
    vec![
        topic(
            "synopsis",
            "Synopsis",
            "Синопсис",
            &["Synopsis", "Summary", "Protocol Summary"],
            &["Синопсис", "Резюме протокола"],
            &["overview", "brief"],
            &["обзор", "краткое"],
            &[SourceZone::Administrative],
            &[],
        ),
        topic(
            "objectives",
            "Objectives",
            "Цели исследования",
            &["Objectives", "Study Objectives", "Objectives and Endpoints"],
            &["Цели исследования", "Цели и задачи"],
            &["objective", "purpose", "rationale"],
            &["цель", "задача", "обоснование"],
            &[SourceZone::Objectives],
            &[SourceZone::Safety],
        ),
        topic(
            "study_design",
            "Study Design",
            "Дизайн исследования",
            &["Study Design", "Overall Design", "Trial Design"],
            &["Дизайн исследования", "Схема исследования"],
            &["randomized", "blind", "placebo", "parallel", "crossover"],
            &["рандомизированное", "слепое", "плацебо", "параллельное"],
            &[SourceZone::Design],
            &[],
        ),
        topic(
            "eligibility",
            "Eligibility Criteria",
            "Критерии отбора",
            &[
                "Eligibility Criteria",
                "Inclusion Criteria",
                "Exclusion Criteria",
                "Selection of Study Population",
            ],
            &["Критерии включения", "Критерии исключения", "Критерии отбора"],
            &["inclusion", "exclusion", "eligible"],
            &["включение", "исключение", "отбор"],
            &[SourceZone::Eligibility],
            &[SourceZone::Statistics],
        ),
        topic(
            "soa",
            "Schedule of Activities",
            "График процедур",
            &[
                "Schedule of Activities",
                "Schedule of Assessments",
                "Schedule of Events",
            ],
            &["График процедур", "График визитов", "План визитов"],
            &["visit", "schedule", "assessment"],
            &["визит", "график", "процедура"],
            &[SourceZone::Procedures],
            &[],
        ),
        topic(
            "dosing",
            "Treatments and Dosing",
            "Лечение и дозирование",
            &["Study Treatment", "Treatments Administered", "Dosing and Administration"],
            &["Исследуемое лечение", "Дозирование", "Режим дозирования"],
            &["dose", "dosing", "administration", "regimen"],
            &["доза", "дозирование", "введение", "режим"],
            &[SourceZone::Ip],
            &[SourceZone::Statistics],
        ),
        topic(
            "safety",
            "Safety and Adverse Events",
            "Безопасность",
            &[
                "Safety Assessments",
                "Adverse Event Reporting",
                "Adverse Events",
                "Safety Monitoring",
            ],
            &["Оценка безопасности", "Нежелательные явления", "Регистрация нежелательных явлений"],
            &["adverse", "serious", "toxicity", "safety"],
            &["нежелательное", "серьезное", "токсичность", "безопасность"],
            &[SourceZone::Safety],
            &[SourceZone::Statistics],
        ),
        topic(
            "endpoints",
            "Endpoints",
            "Конечные точки",
            &["Endpoints", "Study Endpoints", "Outcome Measures", "Efficacy Assessments"],
            &["Конечные точки", "Показатели эффективности", "Оценка эффективности"],
            &["endpoint", "outcome", "efficacy", "response"],
            &["конечная", "исход", "эффективность", "ответ"],
            &[SourceZone::Endpoints],
            &[SourceZone::Administrative],
        ),
        topic(
            "statistics",
            "Statistical Considerations",
            "Статистические методы",
            &[
                "Statistical Considerations",
                "Statistical Methods",
                "Statistical Analysis",
                "Sample Size Determination",
            ],
            &["Статистические методы", "Статистический анализ", "Размер выборки"],
            &["statistical", "sample size", "power", "analysis", "hypothesis"],
            &["статистический", "выборка", "мощность", "анализ", "гипотеза"],
            &[SourceZone::Statistics],
            &[SourceZone::Ethics],
        ),
        topic(
            "ethics",
            "Ethics and Consent",
            "Этические аспекты",
            &["Ethical Considerations", "Informed Consent", "Ethics"],
            &["Этические аспекты", "Информированное согласие"],
            &["consent", "ethics", "confidentiality", "irb"],
            &["согласие", "этика", "конфиденциальность"],
            &[SourceZone::Ethics],
            &[SourceZone::Statistics],
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_keys_unique_and_bilingual() {
        let catalog = default_topic_catalog();
        assert!(catalog.len() >= 10);

        let keys: HashSet<&str> = catalog.iter().map(|t| t.topic_key.as_str()).collect();
        assert_eq!(keys.len(), catalog.len());

        for topic in &catalog {
            assert!(!topic.profile.aliases_en.is_empty(), "{}", topic.topic_key);
            assert!(!topic.profile.aliases_ru.is_empty(), "{}", topic.topic_key);
            assert!(topic.title_ru.is_some());
            assert!(topic.embedding.is_none());
        }
    }

    #[test]
    fn test_catalog_zones_are_consistent() {
        for topic in default_topic_catalog() {
            for zone in &topic.profile.source_zones {
                assert!(
                    !topic.profile.dissimilar_zones.contains(zone),
                    "{} lists {} as both allowed and dissimilar",
                    topic.topic_key,
                    zone.as_str()
                );
            }
        }
    }

    #[test]
    fn test_catalog_maps_canonical_headings() {
        // Smoke check: the statistics topic owns its canonical heading.
        let catalog = default_topic_catalog();
        let statistics = catalog
            .iter()
            .find(|t| t.topic_key == "statistics")
            .unwrap();
        assert!(statistics
            .profile
            .aliases_en
            .iter()
            .any(|a| a == "Statistical Methods"));
        assert_eq!(statistics.profile.source_zones, vec![SourceZone::Statistics]);
    }
}
