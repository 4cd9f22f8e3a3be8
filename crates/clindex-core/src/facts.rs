//! Rules-based fact extraction.
//!
//! Scans a version's textual anchors with a fixed regex catalog and
//! produces fact candidates with anchor-level evidence. Rules are
//! bilingual (EN/RU) and the scan order is deterministic: headings
//! first, then paragraphs, list items and footnotes, each by ordinal;
//! the first matching anchor becomes PRIMARY evidence.
//!
//! A recognized marker whose value fails to parse still yields a
//! candidate, with a null value and status `needs_review`, keeping the
//! anchor as evidence so a reviewer can see what was found. A rule with
//! no marker at all yields a needs_review candidate with no evidence.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::types::{Anchor, ContentType, FactStatus};

/// A candidate fact produced by the rule catalog, before persistence
/// and before the optional LLM double-check.
#[derive(Debug, Clone)]
pub struct FactCandidate {
    /// Fact category.
    pub fact_type: String,
    /// Key within the category.
    pub fact_key: String,
    /// Proposed value.
    pub value_json: serde_json::Value,
    /// Unit, when dimensional.
    pub unit: Option<String>,
    /// Proposed status.
    pub status: FactStatus,
    /// PRIMARY evidence anchor ids, in order.
    pub primary_anchor_ids: Vec<String>,
    /// SUPPORTING evidence anchor ids, in order.
    pub supporting_anchor_ids: Vec<String>,
    /// The raw matched span, when a marker was recognized. Feeds the
    /// complexity check of the LLM normalizer.
    pub raw_span: Option<String>,
}

impl FactCandidate {
    fn needs_review(
        fact_type: &str,
        fact_key: &str,
        extra: serde_json::Value,
        unit: Option<&str>,
    ) -> Self {
        let mut value_json = json!({ "value": null });
        if let (Some(obj), Some(extra_obj)) = (value_json.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_obj {
                obj.insert(k.clone(), v.clone());
            }
        }
        Self {
            fact_type: fact_type.to_string(),
            fact_key: fact_key.to_string(),
            value_json,
            unit: unit.map(ToString::to_string),
            status: FactStatus::NeedsReview,
            primary_anchor_ids: Vec::new(),
            supporting_anchor_ids: Vec::new(),
            raw_span: None,
        }
    }

    /// The `fact_type/fact_key` pair, as reported in metrics.
    #[must_use]
    pub fn qualified_key(&self) -> String {
        format!("{}/{}", self.fact_type, self.fact_key)
    }
}

static PROTOCOL_VERSION_EN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bprotocol\s*(?:version|no\.?|number)\b\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9._/\-]{0,64})")
        .unwrap()
});

static PROTOCOL_VERSION_RU: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:версия|номер)\s+протокола\b\s*[:#]?\s*([A-Za-z0-9А-Яа-я][A-Za-z0-9А-Яа-я._/\-]{0,64})")
        .unwrap()
});

static AMENDMENT_DATE_EN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:amendment\s+date|date\s+of\s+amendment)\b\s*[:#]?\s*(.+)$").unwrap()
});

static AMENDMENT_DATE_RU: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:дата\s+(?:внесения\s+изменений|поправки|изменения)|дата\s+амендмента)\b\s*[:#]?\s*(.+)$")
        .unwrap()
});

static PLANNED_N_EN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:total\s*n|planned\s+enrollment|target\s+enrollment|enrollment)\b[^0-9]{0,25}(\d{1,7}(?:[ ,]\d{3})*)")
        .unwrap()
});

static PLANNED_N_RU: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:всего\s*n|общее\s+число|планируем(?:ое|ая)\s+число|планируем(?:ый|ая)\s+набор|планируется\s+включить)\b[^0-9]{0,35}(\d{1,7}(?:[ ,]\d{3})*)")
        .unwrap()
});

static BARE_N_EQUALS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bN\s*=\s*(\d{1,7}(?:[ ,]\d{3})*)\b").unwrap()
});

static ALPHA_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)(?:\balpha\b|\bα\b|significance\s+level|уровень\s+значимости)\s*(?:level)?\s*(?:of|=|:)?\s*(0[.,]\d{1,4})")
        .unwrap()
});

static POWER_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)(?:statistical\s+power|\bpower\b|статистическ[а-я]+\s+мощность|мощность)\s*(?:of|=|:)?\s*(0[.,]\d{1,4}|\d{1,3}\s*%)")
        .unwrap()
});

static RATIO_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b(\d{1,2}\s*[:/]\s*\d{1,2}(?:\s*[:/]\s*\d{1,2})?)\b").unwrap()
});

static RATIO_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)(randomi[sz](?:ed|ation)|allocation\s+ratio|рандомизаци|соотношени)").unwrap()
});

static AGE_RANGE_EN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:aged?|age)\s*(?:from)?\s*(\d{1,3})\s*(?:to|-|–|and)\s*(\d{1,3})\s*(?:years|лет)?")
        .unwrap()
});

static AGE_RANGE_RU: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bвозраст\w*\s*(?:от)?\s*(\d{1,3})\s*(?:до|-|–)\s*(\d{1,3})\s*(?:лет|года)?")
        .unwrap()
});

static AGE_MIN_ONLY: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)(?:\baged?\b|\bage\b|возраст\w*)\s*(?:≥|>=|of at least|не менее|старше)\s*(\d{1,3})")
        .unwrap()
});

/// The rules-based fact extractor.
#[derive(Debug, Default)]
pub struct FactExtractor;

impl FactExtractor {
    /// Create an extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Run the full catalog over a version's anchors.
    ///
    /// The three core rules always produce a candidate (needs_review
    /// when nothing matched); the statistics rules are opportunistic
    /// and only emit when a marker is found.
    #[must_use]
    pub fn extract(&self, anchors: &[Anchor]) -> Vec<FactCandidate> {
        let ordered = order_for_extraction(anchors);
        let mut candidates = vec![
            extract_protocol_version(&ordered),
            extract_amendment_date(&ordered),
            extract_planned_n_total(&ordered),
        ];
        candidates.extend(extract_alpha(&ordered));
        candidates.extend(extract_power(&ordered));
        candidates.extend(extract_randomization_ratio(&ordered));
        candidates.extend(extract_age_bounds(&ordered));
        candidates
    }
}

/// `statistics/alpha`: a significance level stated as a decimal.
fn extract_alpha(anchors: &[&Anchor]) -> Option<FactCandidate> {
    for anchor in anchors {
        let text = anchor_text(anchor);
        let Some(caps) = ALPHA_RE.captures(text) else {
            continue;
        };
        let raw = caps[1].replace(',', ".");
        let value: f64 = raw.parse().ok()?;
        return Some(FactCandidate {
            fact_type: "statistics".into(),
            fact_key: "alpha".into(),
            value_json: json!({ "value": value }),
            unit: None,
            status: FactStatus::Extracted,
            primary_anchor_ids: vec![anchor.anchor_id.clone()],
            supporting_anchor_ids: Vec::new(),
            raw_span: Some(raw),
        });
    }
    None
}

/// `statistics/power`: stated as a decimal or a percentage.
fn extract_power(anchors: &[&Anchor]) -> Option<FactCandidate> {
    for anchor in anchors {
        let text = anchor_text(anchor);
        let Some(caps) = POWER_RE.captures(text) else {
            continue;
        };
        let raw = caps[1].trim().to_string();
        let value = if let Some(percent) = raw.strip_suffix('%') {
            percent.trim().parse::<f64>().ok()? / 100.0
        } else {
            raw.replace(',', ".").parse::<f64>().ok()?
        };
        if !(0.0..=1.0).contains(&value) {
            continue;
        }
        return Some(FactCandidate {
            fact_type: "statistics".into(),
            fact_key: "power".into(),
            value_json: json!({ "value": value }),
            unit: None,
            status: FactStatus::Extracted,
            primary_anchor_ids: vec![anchor.anchor_id.clone()],
            supporting_anchor_ids: Vec::new(),
            raw_span: Some(raw),
        });
    }
    None
}

/// `design/randomization_ratio`: all distinct ratios mentioned near a
/// randomization marker. Several cohorts mean several ratios; the list
/// shape triggers the LLM double-check, which picks the canonical one.
fn extract_randomization_ratio(anchors: &[&Anchor]) -> Option<FactCandidate> {
    for anchor in anchors {
        let text = anchor_text(anchor);
        if !RATIO_MARKER_RE.is_match(text) {
            continue;
        }
        let mut ratios: Vec<String> = Vec::new();
        for caps in RATIO_RE.captures_iter(text) {
            let ratio: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
            if !ratios.contains(&ratio) {
                ratios.push(ratio);
            }
        }
        if ratios.is_empty() {
            continue;
        }
        let raw_span = ratios.join(", ");
        let value_json = if ratios.len() == 1 {
            json!({ "value": ratios[0] })
        } else {
            json!({ "value": ratios })
        };
        return Some(FactCandidate {
            fact_type: "design".into(),
            fact_key: "randomization_ratio".into(),
            value_json,
            unit: None,
            status: FactStatus::Extracted,
            primary_anchor_ids: vec![anchor.anchor_id.clone()],
            supporting_anchor_ids: Vec::new(),
            raw_span: Some(raw_span),
        });
    }
    None
}

/// `population/age_min` and `population/age_max` from an explicit age
/// range, or `age_min` alone from a lower bound.
fn extract_age_bounds(anchors: &[&Anchor]) -> Vec<FactCandidate> {
    let bound = |key: &str, value: i64, anchor: &Anchor, raw: &str| FactCandidate {
        fact_type: "population".into(),
        fact_key: key.into(),
        value_json: json!({ "value": value, "unit": "years" }),
        unit: Some("years".into()),
        status: FactStatus::Extracted,
        primary_anchor_ids: vec![anchor.anchor_id.clone()],
        supporting_anchor_ids: Vec::new(),
        raw_span: Some(raw.to_string()),
    };

    for anchor in anchors {
        let text = anchor_text(anchor);
        if let Some(caps) = AGE_RANGE_EN
            .captures(text)
            .or_else(|| AGE_RANGE_RU.captures(text))
        {
            let (Ok(min), Ok(max)) = (caps[1].parse::<i64>(), caps[2].parse::<i64>()) else {
                continue;
            };
            return vec![
                bound("age_min", min, anchor, &caps[0]),
                bound("age_max", max, anchor, &caps[0]),
            ];
        }
        if let Some(caps) = AGE_MIN_ONLY.captures(text) {
            if let Ok(min) = caps[1].parse::<i64>() {
                return vec![bound("age_min", min, anchor, &caps[0])];
            }
        }
    }
    Vec::new()
}

/// Textual anchors in scan order: HDR bucket first, then P, LI, FN,
/// each by ordinal.
fn order_for_extraction<'a>(anchors: &'a [Anchor]) -> Vec<&'a Anchor> {
    let mut ordered: Vec<&'a Anchor> = anchors
        .iter()
        .filter(|a| {
            matches!(
                a.content_type,
                ContentType::Hdr | ContentType::P | ContentType::Li | ContentType::Fn
            )
        })
        .collect();
    ordered.sort_by_key(|a| {
        let bucket = usize::from(a.content_type != ContentType::Hdr);
        let within = match a.content_type {
            ContentType::P | ContentType::Hdr => 0,
            ContentType::Li => 1,
            _ => 2,
        };
        (bucket, within, a.ordinal)
    });
    ordered
}

fn extract_protocol_version(anchors: &[&Anchor]) -> FactCandidate {
    for anchor in anchors {
        let text = anchor_text(anchor);
        if text.is_empty() {
            continue;
        }
        let captures = PROTOCOL_VERSION_EN
            .captures(text)
            .or_else(|| PROTOCOL_VERSION_RU.captures(text));
        if let Some(caps) = captures {
            let value = caps[1].trim().to_string();
            if value.is_empty() {
                break;
            }
            return FactCandidate {
                fact_type: "protocol_meta".into(),
                fact_key: "protocol_version".into(),
                value_json: json!({ "value": value }),
                unit: None,
                status: FactStatus::Extracted,
                primary_anchor_ids: vec![anchor.anchor_id.clone()],
                supporting_anchor_ids: Vec::new(),
                raw_span: Some(value),
            };
        }
    }
    FactCandidate::needs_review("protocol_meta", "protocol_version", json!({}), None)
}

fn extract_amendment_date(anchors: &[&Anchor]) -> FactCandidate {
    for anchor in anchors {
        let text = anchor_text(anchor).trim();
        if text.is_empty() {
            continue;
        }
        let captures = AMENDMENT_DATE_EN
            .captures(text)
            .or_else(|| AMENDMENT_DATE_RU.captures(text));
        let Some(caps) = captures else { continue };
        let raw = caps[1].trim().trim_matches([' ', '.', ';']).to_string();
        if let Some(iso) = parse_date_to_iso(&raw) {
            return FactCandidate {
                fact_type: "protocol_meta".into(),
                fact_key: "amendment_date".into(),
                value_json: json!({ "value": iso, "raw": raw }),
                unit: None,
                status: FactStatus::Extracted,
                primary_anchor_ids: vec![anchor.anchor_id.clone()],
                supporting_anchor_ids: Vec::new(),
                raw_span: Some(raw),
            };
        }
        // Marker recognized, date unparseable: keep the anchor, flag for
        // review.
        return FactCandidate {
            fact_type: "protocol_meta".into(),
            fact_key: "amendment_date".into(),
            value_json: json!({ "value": null, "raw": raw }),
            unit: None,
            status: FactStatus::NeedsReview,
            primary_anchor_ids: vec![anchor.anchor_id.clone()],
            supporting_anchor_ids: Vec::new(),
            raw_span: Some(raw),
        };
    }
    FactCandidate::needs_review(
        "protocol_meta",
        "amendment_date",
        json!({ "raw": null }),
        None,
    )
}

fn extract_planned_n_total(anchors: &[&Anchor]) -> FactCandidate {
    for anchor in anchors {
        let text = anchor_text(anchor);
        if text.is_empty() {
            continue;
        }
        let captures = PLANNED_N_EN
            .captures(text)
            .or_else(|| PLANNED_N_RU.captures(text))
            .or_else(|| BARE_N_EQUALS.captures(text));
        let Some(caps) = captures else { continue };
        let raw_num = caps[1].to_string();
        let Some(n) = parse_count(&raw_num) else {
            return FactCandidate {
                fact_type: "population".into(),
                fact_key: "planned_n_total".into(),
                value_json: json!({ "value": null, "unit": "participants" }),
                unit: Some("participants".into()),
                status: FactStatus::NeedsReview,
                primary_anchor_ids: vec![anchor.anchor_id.clone()],
                supporting_anchor_ids: Vec::new(),
                raw_span: Some(raw_num),
            };
        };
        return FactCandidate {
            fact_type: "population".into(),
            fact_key: "planned_n_total".into(),
            value_json: json!({ "value": n, "unit": "participants" }),
            unit: Some("participants".into()),
            status: FactStatus::Extracted,
            primary_anchor_ids: vec![anchor.anchor_id.clone()],
            supporting_anchor_ids: Vec::new(),
            raw_span: Some(raw_num),
        };
    }
    FactCandidate::needs_review(
        "population",
        "planned_n_total",
        json!({ "unit": "participants" }),
        Some("participants"),
    )
}

fn anchor_text(anchor: &Anchor) -> &str {
    if anchor.text_raw.is_empty() {
        &anchor.text_norm
    } else {
        &anchor.text_raw
    }
}

/// Parse a participant count: thousands separators stripped, result must
/// be a positive integer no larger than 1,000,000.
fn parse_count(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | ',' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: i64 = cleaned.parse().ok()?;
    (value > 0 && value <= 1_000_000).then_some(value)
}

static DATE_ISO: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap()
});
static DATE_DMY: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(\d{1,2})[./](\d{1,2})[./](\d{4})$").unwrap()
});
static DATE_WORDY: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(\d{1,2})\s+([A-Za-zА-Яа-яёЁ]+)\s+(\d{4})$").unwrap()
});

/// Parse a date in any accepted RU/EN format into ISO `YYYY-MM-DD`.
///
/// Accepted: `YYYY-MM-DD`, `DD.MM.YYYY`, `DD/MM/YYYY`, and
/// `D <Month> YYYY` with full or abbreviated month names in English or
/// Russian. Calendar-invalid dates return `None`.
#[must_use]
pub fn parse_date_to_iso(raw: &str) -> Option<String> {
    let s = crate::text::normalize_text(raw);
    let s = s.trim_matches([' ', ',', '.', ';']);
    if s.is_empty() {
        return None;
    }

    if let Some(caps) = DATE_ISO.captures(s) {
        return iso_from_ymd(&caps[1], &caps[2], &caps[3]);
    }
    if let Some(caps) = DATE_DMY.captures(s) {
        return iso_from_ymd(&caps[3], &caps[2], &caps[1]);
    }
    if let Some(caps) = DATE_WORDY.captures(s) {
        let month = month_to_int(&caps[2])?;
        return iso_from_parts(caps[3].parse().ok()?, month, caps[1].parse().ok()?);
    }
    None
}

fn iso_from_ymd(y: &str, m: &str, d: &str) -> Option<String> {
    iso_from_parts(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

fn iso_from_parts(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Month name (full or abbreviated, EN/RU) to 1..=12.
fn month_to_int(raw: &str) -> Option<u32> {
    let t = raw.trim().to_lowercase().replace('.', "");
    let month = match t.as_str() {
        "января" | "янв" | "january" | "jan" => 1,
        "февраля" | "фев" | "february" | "feb" => 2,
        "марта" | "мар" | "march" | "mar" => 3,
        "апреля" | "апр" | "april" | "apr" => 4,
        "мая" | "май" | "may" => 5,
        "июня" | "июн" | "june" | "jun" => 6,
        "июля" | "июл" | "july" | "jul" => 7,
        "августа" | "авг" | "august" | "aug" => 8,
        "сентября" | "сен" | "сент" | "september" | "sep" | "sept" => 9,
        "октября" | "окт" | "october" | "oct" => 10,
        "ноября" | "ноя" | "november" | "nov" => 11,
        "декабря" | "дек" | "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::text::{normalize_text, text_hash};
    use crate::types::{Language, Location, SourceZone};
    use uuid::Uuid;

    fn anchor(text: &str, content_type: ContentType, ordinal: u32) -> Anchor {
        let text_norm = normalize_text(text);
        let hash = text_hash(&text_norm);
        Anchor {
            doc_version_id: Uuid::nil(),
            anchor_id: format!("{}:{}:{ordinal}:{hash}", Uuid::nil(), content_type.as_str()),
            section_path: "Body".into(),
            content_type,
            ordinal,
            text_raw: text.to_string(),
            text_norm,
            text_hash: hash,
            location: Location::Body {
                para_index: ordinal as usize,
                style: "Normal".into(),
            },
            source_zone: SourceZone::Unknown,
            language: Language::Unknown,
        }
    }

    fn find<'a>(candidates: &'a [FactCandidate], key: &str) -> &'a FactCandidate {
        candidates
            .iter()
            .find(|c| c.qualified_key() == key)
            .unwrap()
    }

    #[test]
    fn test_planned_n_total_with_unit() {
        // "Total N = 120 participants" yields an extracted integer fact
        // with primary evidence on the matching paragraph.
        let anchors = vec![anchor("Total N = 120 participants", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        let c = find(&candidates, "population/planned_n_total");
        assert_eq!(c.status, FactStatus::Extracted);
        assert_eq!(c.value_json, serde_json::json!({"value": 120, "unit": "participants"}));
        assert_eq!(c.unit.as_deref(), Some("participants"));
        assert_eq!(c.primary_anchor_ids, vec![anchors[0].anchor_id.clone()]);
    }

    #[test]
    fn test_amendment_date_russian_dotted() {
        let anchors = vec![anchor(
            "Дата внесения изменений: 05.03.2021",
            ContentType::P,
            1,
        )];
        let candidates = FactExtractor::new().extract(&anchors);
        let c = find(&candidates, "protocol_meta/amendment_date");
        assert_eq!(c.status, FactStatus::Extracted);
        assert_eq!(c.value_json["value"], "2021-03-05");
        assert_eq!(c.value_json["raw"], "05.03.2021");
    }

    #[test]
    fn test_protocol_version_en_and_ru() {
        let anchors = vec![anchor("Protocol Version: 2.0", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        assert_eq!(
            find(&candidates, "protocol_meta/protocol_version").value_json["value"],
            "2.0"
        );

        let anchors = vec![anchor("Номер протокола: ABC-123", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        assert_eq!(
            find(&candidates, "protocol_meta/protocol_version").value_json["value"],
            "ABC-123"
        );
    }

    #[test]
    fn test_unparseable_date_is_needs_review_with_evidence() {
        let anchors = vec![anchor(
            "Amendment date: sometime next quarter",
            ContentType::P,
            1,
        )];
        let candidates = FactExtractor::new().extract(&anchors);
        let c = find(&candidates, "protocol_meta/amendment_date");
        assert_eq!(c.status, FactStatus::NeedsReview);
        assert!(c.value_json["value"].is_null());
        assert_eq!(c.value_json["raw"], "sometime next quarter");
        // The anchor stays attached even though parsing failed.
        assert_eq!(c.primary_anchor_ids.len(), 1);
    }

    #[test]
    fn test_missing_marker_needs_review_without_evidence() {
        let anchors = vec![anchor("Nothing relevant here.", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        for key in [
            "protocol_meta/protocol_version",
            "protocol_meta/amendment_date",
            "population/planned_n_total",
        ] {
            let c = find(&candidates, key);
            assert_eq!(c.status, FactStatus::NeedsReview);
            assert!(c.primary_anchor_ids.is_empty());
            assert!(c.value_json["value"].is_null());
        }
    }

    #[test]
    fn test_headings_scanned_before_paragraphs() {
        let anchors = vec![
            anchor("Planned enrollment is 400", ContentType::P, 1),
            anchor("Study Synopsis N = 250", ContentType::Hdr, 1),
        ];
        let candidates = FactExtractor::new().extract(&anchors);
        let c = find(&candidates, "population/planned_n_total");
        // The heading wins despite appearing later in the slice.
        assert_eq!(c.value_json["value"], 250);
    }

    #[test]
    fn test_count_bounds_and_separators() {
        assert_eq!(parse_count("1,200"), Some(1200));
        assert_eq!(parse_count("12 000"), Some(12_000));
        assert_eq!(parse_count("0"), None);
        assert_eq!(parse_count("2000001"), None);
        assert_eq!(parse_count("12a"), None);
    }

    #[test]
    fn test_date_parser_formats() {
        assert_eq!(parse_date_to_iso("2021-03-05").as_deref(), Some("2021-03-05"));
        assert_eq!(parse_date_to_iso("05.03.2021").as_deref(), Some("2021-03-05"));
        assert_eq!(parse_date_to_iso("05/03/2021").as_deref(), Some("2021-03-05"));
        assert_eq!(parse_date_to_iso("5 March 2021").as_deref(), Some("2021-03-05"));
        assert_eq!(parse_date_to_iso("5 Mar 2021").as_deref(), Some("2021-03-05"));
        assert_eq!(parse_date_to_iso("5 марта 2021").as_deref(), Some("2021-03-05"));
        assert_eq!(parse_date_to_iso("31 февраля 2021"), None);
        assert_eq!(parse_date_to_iso("2021-13-01"), None);
        assert_eq!(parse_date_to_iso("not a date"), None);
        assert_eq!(parse_date_to_iso(""), None);
    }

    #[test]
    fn test_thousands_separated_enrollment() {
        let anchors = vec![anchor("Planned enrollment: 1,200 subjects", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        let c = find(&candidates, "population/planned_n_total");
        assert_eq!(c.value_json["value"], 1200);
    }

    #[test]
    fn test_alpha_and_power_extraction() {
        let anchors = vec![
            anchor("A two-sided significance level of 0.05 will be applied.", ContentType::P, 1),
            anchor("The study has a statistical power of 80% for the primary endpoint.", ContentType::P, 2),
        ];
        let candidates = FactExtractor::new().extract(&anchors);
        assert_eq!(find(&candidates, "statistics/alpha").value_json["value"], 0.05);
        assert_eq!(find(&candidates, "statistics/power").value_json["value"], 0.8);
    }

    #[test]
    fn test_power_as_decimal() {
        let anchors = vec![anchor("power = 0.9", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        assert_eq!(find(&candidates, "statistics/power").value_json["value"], 0.9);
    }

    #[test]
    fn test_statistics_rules_are_opportunistic() {
        // No markers: the statistics/design rules emit nothing, unlike
        // the three core rules which emit needs_review placeholders.
        let anchors = vec![anchor("Nothing quantitative here.", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        assert_eq!(candidates.len(), 3);
        assert!(!candidates.iter().any(|c| c.fact_type == "statistics"));
    }

    #[test]
    fn test_single_randomization_ratio() {
        let anchors = vec![anchor(
            "Participants will be randomized in a 2:1 ratio to drug or placebo.",
            ContentType::P,
            1,
        )];
        let candidates = FactExtractor::new().extract(&anchors);
        let c = find(&candidates, "design/randomization_ratio");
        assert_eq!(c.value_json, serde_json::json!({"value": "2:1"}));
    }

    #[test]
    fn test_multiple_ratios_become_a_list() {
        let anchors = vec![anchor(
            "Randomization is 2:1 in cohort A and 1:1 in cohort B.",
            ContentType::P,
            1,
        )];
        let candidates = FactExtractor::new().extract(&anchors);
        let c = find(&candidates, "design/randomization_ratio");
        assert_eq!(c.value_json, serde_json::json!({"value": ["2:1", "1:1"]}));
        // A list value is what routes the fact into the LLM ratio pick.
        assert!(c.value_json["value"].is_array());
    }

    #[test]
    fn test_ratio_requires_marker() {
        // A bare "10:30" timestamp without a randomization marker is
        // not a ratio fact.
        let anchors = vec![anchor("Visits start at 10:30 sharp.", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        assert!(!candidates.iter().any(|c| c.fact_key == "randomization_ratio"));
    }

    #[test]
    fn test_age_range_en_and_ru() {
        let anchors = vec![anchor("Patients aged 18 to 65 years are eligible.", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        assert_eq!(find(&candidates, "population/age_min").value_json["value"], 18);
        assert_eq!(find(&candidates, "population/age_max").value_json["value"], 65);

        let anchors = vec![anchor("Пациенты в возрасте от 18 до 65 лет.", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        assert_eq!(find(&candidates, "population/age_min").value_json["value"], 18);
        assert_eq!(find(&candidates, "population/age_max").value_json["value"], 65);
    }

    #[test]
    fn test_age_lower_bound_only() {
        let anchors = vec![anchor("Adults aged ≥ 18 may participate.", ContentType::P, 1)];
        let candidates = FactExtractor::new().extract(&anchors);
        assert_eq!(find(&candidates, "population/age_min").value_json["value"], 18);
        assert!(!candidates.iter().any(|c| c.fact_key == "age_max"));
    }
}
