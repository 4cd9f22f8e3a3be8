//! LLM value normalization (double-check).
//!
//! Regex extraction is precise but literal. For complex values (long
//! spans, multiple numerals, compositions like "120 participants,
//! including 20 controls") a second, independent read is requested from
//! the chat provider and compared against the regex result:
//!
//! - agreement promotes the fact to `validated`,
//! - disagreement flips it to `conflicting`,
//! - an empty LLM answer keeps the regex value as plain `extracted` (the
//!   model failing to answer is not evidence of a conflict).
//!
//! When the regex produced a list (e.g. several randomization ratios)
//! and the model picked one element, the pick replaces the list.
//! Without a configured chat provider this module is a no-op pass.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::facts::{FactCandidate, parse_date_to_iso};
use crate::llm::{ChatMessage, ChatProvider, with_retry};
use crate::types::FactStatus;

/// Raw spans longer than this are considered complex.
const COMPLEX_SPAN_CHARS: usize = 50;
/// Fragment characters handed to the model.
const FRAGMENT_CHARS: usize = 500;
/// Recursion ceiling for object comparison.
const MAX_COMPARE_DEPTH: usize = 50;

static NUMERAL_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\d+").unwrap()
});

static COMPOSITION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:включая|including|среди|among|из них|of which)\b",
        r"(?i)\b(?:в том числе|plus|плюс)\b",
        r",\s*\d",
        r"\d+\s*,\s*\d+",
    ]
    .iter()
    .map(|p| {
        #[allow(clippy::unwrap_used)]
        Regex::new(p).unwrap()
    })
    .collect()
});

/// Outcome of the double-check for one candidate.
#[derive(Debug, Clone)]
pub struct NormalizationOutcome {
    /// Value to persist (regex value, or the LLM pick for ratio lists).
    pub value_json: Value,
    /// Status to persist.
    pub status: FactStatus,
    /// What the model answered, when it did.
    pub llm_value: Option<Value>,
    /// Whether the two reads agreed.
    pub matched: bool,
    /// Confidence attributed to a usable model answer.
    pub llm_confidence: f64,
    /// Warning for the run log, when the provider misbehaved.
    pub warning: Option<String>,
}

impl NormalizationOutcome {
    fn pass_through(candidate: &FactCandidate) -> Self {
        Self {
            value_json: candidate.value_json.clone(),
            status: candidate.status,
            llm_value: None,
            matched: false,
            llm_confidence: 0.0,
            warning: None,
        }
    }
}

/// The double-check service.
pub struct ValueNormalizer<'a> {
    chat: Option<&'a dyn ChatProvider>,
    retry: &'a RetryConfig,
}

impl<'a> ValueNormalizer<'a> {
    /// Create a normalizer; `chat: None` disables the double-check.
    #[must_use]
    pub const fn new(chat: Option<&'a dyn ChatProvider>, retry: &'a RetryConfig) -> Self {
        Self { chat, retry }
    }

    /// Decide whether a candidate's value warrants the double-check.
    #[must_use]
    pub fn is_complex_value(candidate: &FactCandidate) -> bool {
        let raw = candidate.raw_span.as_deref().unwrap_or("");
        if raw.chars().count() > COMPLEX_SPAN_CHARS {
            return true;
        }
        if NUMERAL_RE.find_iter(raw).count() >= 2 {
            return true;
        }
        if COMPOSITION_RES.iter().any(|re| re.is_match(raw)) {
            return true;
        }
        if let Some(obj) = candidate.value_json.as_object() {
            if obj.len() > 2 {
                return true;
            }
            for value in obj.values() {
                match value {
                    Value::Array(items) if items.len() > 1 => return true,
                    Value::Object(map) if map.len() > 1 => return true,
                    _ => {}
                }
            }
            if obj.get("value").is_some_and(Value::is_array) {
                return true;
            }
        }
        false
    }

    /// Run the double-check for one candidate against the text fragment
    /// its PRIMARY anchor came from.
    pub async fn normalize(
        &self,
        candidate: &FactCandidate,
        text_fragment: &str,
    ) -> NormalizationOutcome {
        let Some(chat) = self.chat else {
            return NormalizationOutcome::pass_through(candidate);
        };
        if !Self::is_complex_value(candidate) {
            debug!(
                fact = %candidate.qualified_key(),
                "value not complex, skipping LLM normalization"
            );
            return NormalizationOutcome::pass_through(candidate);
        }
        let fragment: String = text_fragment.chars().take(FRAGMENT_CHARS).collect();
        if fragment.trim().is_empty() {
            return NormalizationOutcome::pass_through(candidate);
        }

        let is_ratio_list = candidate
            .value_json
            .get("value")
            .is_some_and(Value::is_array);
        let messages = build_messages(candidate, &fragment, is_ratio_list);

        let response = with_retry(self.retry, "chat", || chat.chat(&messages, 0.0)).await;
        let content = match response {
            Ok(content) => content,
            Err(err) => {
                let warning = format!(
                    "LLM normalization failed for {}: {err}",
                    candidate.qualified_key()
                );
                warn!("{warning}");
                let mut outcome = NormalizationOutcome::pass_through(candidate);
                outcome.warning = Some(warning);
                return outcome;
            }
        };

        let Some(llm_value) = extract_json_object(&content) else {
            let warning = format!(
                "LLM returned unparseable JSON for {}",
                candidate.qualified_key()
            );
            warn!("{warning}");
            let mut outcome = NormalizationOutcome::pass_through(candidate);
            outcome.warning = Some(warning);
            return outcome;
        };

        let llm_empty = is_empty_llm_value(&llm_value);
        let matched = if is_ratio_list {
            ratio_list_match(&candidate.value_json, &llm_value)
                .unwrap_or_else(|| compare_values(&candidate.value_json, &llm_value))
        } else {
            compare_values(&candidate.value_json, &llm_value)
        };

        let llm_confidence = if llm_empty { 0.0 } else { 0.85 };
        let (value_json, status) = if matched {
            let value = if is_ratio_list && !llm_empty {
                // The model picked the canonical ratio out of the list.
                llm_value.clone()
            } else {
                candidate.value_json.clone()
            };
            (value, FactStatus::Validated)
        } else if llm_empty {
            (candidate.value_json.clone(), FactStatus::Extracted)
        } else {
            (candidate.value_json.clone(), FactStatus::Conflicting)
        };

        NormalizationOutcome {
            value_json,
            status,
            llm_value: Some(llm_value),
            matched,
            llm_confidence,
            warning: None,
        }
    }
}

fn build_messages(
    candidate: &FactCandidate,
    fragment: &str,
    is_ratio_list: bool,
) -> Vec<ChatMessage> {
    let fact_key = candidate.qualified_key();
    if is_ratio_list {
        let ratios = candidate.value_json["value"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        vec![
            ChatMessage::system(
                "You extract structured data from clinical trial protocols. \
                 The text mentions several randomization ratios for different cohorts. \
                 Pick the MAIN ratio (usually the first or the most frequently mentioned). \
                 Reply with a single JSON object with a 'value' field holding one ratio \
                 like \"X:Y\". No commentary.",
            ),
            ChatMessage::user(format!(
                "Ratios found in the text: {ratios}. Pick the main one.\nText: {fragment}\n\nReply with a JSON object only, e.g. {{\"value\": \"2:1\"}}"
            )),
        ]
    } else {
        vec![
            ChatMessage::system(
                "You extract structured data from clinical trial protocols. \
                 Extract a strict value for the requested field and reply with a single \
                 JSON object with a 'value' field. No commentary.",
            ),
            ChatMessage::user(format!(
                "Extract a strict value for the field '{fact_key}' from the text.\nText: {fragment}\n\nReply with a JSON object only, e.g. {{\"value\": ...}}"
            )),
        ]
    }
}

/// Strip markdown fences and parse the first balanced JSON object out of
/// a chat answer.
fn extract_json_object(content: &str) -> Option<Value> {
    let mut text = content.trim().to_string();
    if text.starts_with("```") {
        let parts: Vec<&str> = text.split("```").collect();
        if parts.len() >= 3 {
            let mut inner = parts[1].trim().to_string();
            if let Some((first_line, rest)) = inner.split_once('\n') {
                if first_line.trim().eq_ignore_ascii_case("json") {
                    inner = rest.trim().to_string();
                }
            }
            text = inner;
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// An LLM answer counts as empty when it carries no usable value.
fn is_empty_llm_value(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return value.is_null();
    };
    if obj.is_empty() {
        return true;
    }
    match obj.get("value") {
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        _ => false,
    }
}

/// Regex list vs LLM scalar: a match means the model picked one of the
/// list's elements (ratio separators normalized). `None` means the
/// shapes do not fit this rule.
fn ratio_list_match(regex_value: &Value, llm_value: &Value) -> Option<bool> {
    let ratios = regex_value.get("value")?.as_array()?;
    if ratios.is_empty() {
        return None;
    }
    let pick = llm_value.get("value")?.as_str()?;
    let pick_norm = pick.replace('/', ":").trim().to_string();
    Some(ratios.iter().filter_map(Value::as_str).any(|ratio| {
        ratio.replace('/', ":").trim() == pick_norm
    }))
}

/// Compare the regex and LLM reads per the double-check rules.
fn compare_values(regex_value: &Value, llm_value: &Value) -> bool {
    match (regex_value.get("value"), llm_value.get("value")) {
        (Some(regex_inner), Some(llm_inner)) => compare_inner(regex_inner, llm_inner, 0),
        _ => match (regex_value.as_object(), llm_value.as_object()) {
            (Some(_), Some(_)) => compare_inner(regex_value, llm_value, 0),
            _ => regex_value == llm_value,
        },
    }
}

#[allow(clippy::float_cmp)]
fn compare_inner(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_COMPARE_DEPTH {
        warn!("value comparison recursion depth exceeded");
        return false;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(ix), Some(iy)) = (x.as_i64(), y.as_i64()) {
                ix == iy
            } else {
                let fx = x.as_f64().unwrap_or(f64::NAN);
                let fy = y.as_f64().unwrap_or(f64::NAN);
                (fx - fy).abs() < 0.01
            }
        }
        (Value::String(x), Value::String(y)) => {
            let date_x = parse_date_to_iso(x);
            let date_y = parse_date_to_iso(y);
            match (date_x, date_y) {
                (Some(dx), Some(dy)) => dx == dy,
                (None, None) => {
                    crate::text::normalize_for_match(x) == crate::text::normalize_for_match(y)
                }
                // Only one side is a date: different kinds of value.
                _ => false,
            }
        }
        (Value::Object(x), Value::Object(y)) => {
            if x.len() != y.len() {
                return false;
            }
            x.iter().all(|(key, xv)| {
                y.get(key)
                    .is_some_and(|yv| compare_inner(xv, yv, depth + 1))
            })
        }
        (Value::Array(x), Value::Array(y)) => {
            if x.len() != y.len() {
                return false;
            }
            let all_scalar = |items: &[Value]| {
                items
                    .iter()
                    .all(|v| v.is_string() || v.is_number() || v.is_boolean())
            };
            if all_scalar(x) && all_scalar(y) {
                // Order-independent for scalar lists.
                let mut sx: Vec<String> = x.iter().map(ToString::to_string).collect();
                let mut sy: Vec<String> = y.iter().map(ToString::to_string).collect();
                sx.sort();
                sy.sort();
                sx == sy
            } else {
                x.iter()
                    .zip(y.iter())
                    .all(|(xv, yv)| compare_inner(xv, yv, depth + 1))
            }
        }
        _ => a == b,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedChat {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedChat {
        fn replying(reply: &str) -> Self {
            Self {
                replies: Mutex::new(vec![reply.to_string()]),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn chat(&self, _messages: &[ChatMessage], temperature: f32) -> Result<String> {
            assert_eq!(temperature, 0.0);
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| "{}".to_string()))
        }
    }

    fn candidate(value: Value, raw_span: &str) -> FactCandidate {
        FactCandidate {
            fact_type: "population".into(),
            fact_key: "planned_n_total".into(),
            value_json: value,
            unit: None,
            status: FactStatus::Extracted,
            primary_anchor_ids: vec!["a1".into()],
            supporting_anchor_ids: vec![],
            raw_span: Some(raw_span.to_string()),
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_complexity_predicate() {
        // Short simple value: not complex.
        assert!(!ValueNormalizer::is_complex_value(&candidate(
            json!({"value": 120}),
            "120"
        )));
        // Two numerals: complex.
        assert!(ValueNormalizer::is_complex_value(&candidate(
            json!({"value": 120}),
            "120 participants, 20 controls"
        )));
        // Composition marker: complex.
        assert!(ValueNormalizer::is_complex_value(&candidate(
            json!({"value": 120}),
            "120 including controls"
        )));
        // Long span: complex.
        assert!(ValueNormalizer::is_complex_value(&candidate(
            json!({"value": 120}),
            &"x".repeat(60)
        )));
        // List value: complex.
        assert!(ValueNormalizer::is_complex_value(&candidate(
            json!({"value": ["2:1", "1:1"]}),
            "2:1"
        )));
    }

    #[tokio::test]
    async fn test_no_provider_passes_through() {
        let retry = retry();
        let normalizer = ValueNormalizer::new(None, &retry);
        let c = candidate(json!({"value": 120}), "120 participants, 20 controls");
        let outcome = normalizer.normalize(&c, "fragment").await;
        assert_eq!(outcome.status, FactStatus::Extracted);
        assert_eq!(outcome.value_json, c.value_json);
        assert!(outcome.llm_value.is_none());
    }

    #[tokio::test]
    async fn test_agreement_validates() {
        let chat = ScriptedChat::replying(r#"{"value": 120}"#);
        let retry = retry();
        let normalizer = ValueNormalizer::new(Some(&chat), &retry);
        let c = candidate(json!({"value": 120}), "120 participants, including 20 controls");
        let outcome = normalizer
            .normalize(&c, "Total 120 participants, including 20 controls")
            .await;
        assert_eq!(outcome.status, FactStatus::Validated);
        assert!(outcome.matched);
        assert_eq!(outcome.llm_confidence, 0.85);
    }

    #[tokio::test]
    async fn test_disagreement_conflicts() {
        let chat = ScriptedChat::replying(r#"{"value": 140}"#);
        let retry = retry();
        let normalizer = ValueNormalizer::new(Some(&chat), &retry);
        let c = candidate(json!({"value": 120}), "120 participants, including 20 controls");
        let outcome = normalizer.normalize(&c, "fragment text").await;
        assert_eq!(outcome.status, FactStatus::Conflicting);
        // Regex value is kept even when conflicting.
        assert_eq!(outcome.value_json["value"], 120);
    }

    #[tokio::test]
    async fn test_empty_llm_value_keeps_extracted() {
        let chat = ScriptedChat::replying(r#"{"value": null}"#);
        let retry = retry();
        let normalizer = ValueNormalizer::new(Some(&chat), &retry);
        let c = candidate(json!({"value": 120}), "120 participants, including 20 controls");
        let outcome = normalizer.normalize(&c, "fragment").await;
        assert_eq!(outcome.status, FactStatus::Extracted);
        assert!(!outcome.matched);
        assert_eq!(outcome.llm_confidence, 0.0);
    }

    #[tokio::test]
    async fn test_ratio_list_pick_replaces_value() {
        let chat = ScriptedChat::replying("```json\n{\"value\": \"2:1\"}\n```");
        let retry = retry();
        let normalizer = ValueNormalizer::new(Some(&chat), &retry);
        let c = candidate(json!({"value": ["2:1", "1:1"]}), "2:1, 1:1");
        let outcome = normalizer.normalize(&c, "randomized 2:1 then 1:1").await;
        assert_eq!(outcome.status, FactStatus::Validated);
        assert_eq!(outcome.value_json, json!({"value": "2:1"}));
    }

    #[tokio::test]
    async fn test_ratio_list_slash_separator_still_matches() {
        let chat = ScriptedChat::replying(r#"{"value": "2/1"}"#);
        let retry = retry();
        let normalizer = ValueNormalizer::new(Some(&chat), &retry);
        let c = candidate(json!({"value": ["2:1", "1:1"]}), "2:1, 1:1");
        let outcome = normalizer.normalize(&c, "fragment").await;
        assert!(outcome.matched);
    }

    #[tokio::test]
    async fn test_provider_error_passes_through_with_warning() {
        struct Down;
        #[async_trait]
        impl ChatProvider for Down {
            async fn chat(&self, _m: &[ChatMessage], _t: f32) -> Result<String> {
                Err(crate::error::Error::LlmUnavailable("503".into()))
            }
        }
        let retry = retry();
        let normalizer = ValueNormalizer::new(Some(&Down), &retry);
        let c = candidate(json!({"value": 120}), "120 participants, including 20 controls");
        let outcome = normalizer.normalize(&c, "fragment").await;
        assert_eq!(outcome.status, FactStatus::Extracted);
        assert!(outcome.warning.unwrap().contains("LLM normalization failed"));
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(
            extract_json_object(r#"{"value": 1}"#),
            Some(json!({"value": 1}))
        );
        assert_eq!(
            extract_json_object("```json\n{\"value\": 1}\n```"),
            Some(json!({"value": 1}))
        );
        assert_eq!(
            extract_json_object("Here you go: {\"value\": 1} hope that helps"),
            Some(json!({"value": 1}))
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_compare_dates_and_strings() {
        assert!(compare_values(
            &json!({"value": "05.03.2021"}),
            &json!({"value": "2021-03-05"})
        ));
        assert!(!compare_values(
            &json!({"value": "05.03.2021"}),
            &json!({"value": "not a date"})
        ));
        assert!(compare_values(
            &json!({"value": "Open  Label"}),
            &json!({"value": "open label"})
        ));
    }

    #[test]
    fn test_compare_floats_with_tolerance() {
        assert!(compare_values(
            &json!({"value": 0.05}),
            &json!({"value": 0.051})
        ));
        assert!(!compare_values(
            &json!({"value": 0.05}),
            &json!({"value": 0.08})
        ));
    }

    #[test]
    fn test_compare_scalar_lists_order_independent() {
        assert!(compare_values(
            &json!({"value": ["a", "b"]}),
            &json!({"value": ["b", "a"]})
        ));
        assert!(!compare_values(
            &json!({"value": ["a", "b"]}),
            &json!({"value": ["a"]})
        ));
    }
}
