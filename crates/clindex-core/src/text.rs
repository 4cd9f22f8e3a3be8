//! Text normalization, hashing, language detection and fuzzy similarity.
//!
//! Everything downstream of the parser depends on these functions being
//! deterministic: anchor identity is the SHA-256 of the normalized text,
//! so the normalization rules here are part of the on-disk contract and
//! must not be tuned per document.
//!
//! ## Normalization rules
//!
//! - trim leading/trailing whitespace
//! - collapse every whitespace run to a single space
//! - digits and punctuation are preserved
//! - empty input stays empty
//!
//! ```rust
//! use clindex_core::text::{normalize_text, text_hash};
//!
//! assert_eq!(normalize_text("  Schedule   of\tActivities \n"), "Schedule of Activities");
//! assert_eq!(text_hash("").len(), 64);
//! ```

use sha2::{Digest, Sha256};

use crate::types::{Language, ROOT_SECTION};

/// Normalize text for stable hashing: trim and collapse whitespace runs.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() {
                pending_space = true;
            }
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}

/// Lowercase hex SHA-256 of the UTF-8 bytes of `text_norm`.
#[must_use]
pub fn text_hash(text_norm: &str) -> String {
    let digest = Sha256::digest(text_norm.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Script-ratio language detection.
///
/// Counts Cyrillic (C) and Latin (L) letters. With r = C/(C+L):
/// r ≥ 0.7 is RU, r ≤ 0.3 is EN, anything in between is MIXED only when
/// both scripts contribute at least 10 letters, otherwise UNKNOWN.
/// The thresholds are fixed; see the module docs.
#[must_use]
pub fn detect_language(text: &str) -> Language {
    let mut cyr = 0usize;
    let mut lat = 0usize;
    for ch in text.chars() {
        if is_cyrillic_letter(ch) {
            cyr += 1;
        } else if ch.is_ascii_alphabetic() {
            lat += 1;
        }
    }
    let total = cyr + lat;
    if total == 0 {
        return Language::Unknown;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = cyr as f64 / total as f64;
    if ratio >= 0.7 {
        Language::Ru
    } else if ratio <= 0.3 {
        Language::En
    } else if cyr >= 10 && lat >= 10 {
        Language::Mixed
    } else {
        Language::Unknown
    }
}

const fn is_cyrillic_letter(ch: char) -> bool {
    matches!(ch, 'А'..='я' | 'Ё' | 'ё')
}

/// Join heading titles into a section path: each part trimmed and
/// collapsed, empty parts dropped, empty result becomes `ROOT`.
#[must_use]
pub fn normalize_section_path(parts: &[String]) -> String {
    let normalized: Vec<String> = parts
        .iter()
        .map(|p| normalize_text(p))
        .filter(|p| !p.is_empty())
        .collect();
    if normalized.is_empty() {
        ROOT_SECTION.to_string()
    } else {
        normalized.join("/")
    }
}

/// Case-folded, whitespace-collapsed form used for alias and alignment
/// comparison. Not part of anchor identity.
#[must_use]
pub fn normalize_for_match(text: &str) -> String {
    normalize_text(&text.to_lowercase())
}

/// Drop everything but letters, digits and whitespace, then collapse.
///
/// Applied before fuzzy scoring so punctuation churn between versions does
/// not dominate the ratio.
#[must_use]
pub fn strip_non_alphanumeric(text: &str) -> String {
    let kept: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    normalize_text(&kept)
}

/// Ratcliff/Obershelp similarity ratio over characters, in [0, 1].
///
/// Equivalent to Python's `difflib.SequenceMatcher.ratio()` without the
/// autojunk heuristic: twice the number of matching characters (found by
/// recursive longest-common-substring) divided by the total length.
#[must_use]
pub fn ratcliff_obershelp(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let matched = matched_chars(&a, &b);
    #[allow(clippy::cast_precision_loss)]
    {
        2.0 * matched as f64 / (a.len() + b.len()) as f64
    }
}

/// Total matched characters: longest common substring, then recurse on
/// the pieces to its left and right.
fn matched_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut best_len = 0usize;
    let mut best_a = 0usize;
    let mut best_b = 0usize;
    let mut prev = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, &cb) in b.iter().enumerate() {
            if ca == cb {
                cur[j + 1] = prev[j] + 1;
                if cur[j + 1] > best_len {
                    best_len = cur[j + 1];
                    best_a = i + 1 - best_len;
                    best_b = j + 1 - best_len;
                }
            }
        }
        prev = cur;
    }
    if best_len == 0 {
        return 0;
    }
    best_len
        + matched_chars(&a[..best_a], &b[..best_b])
        + matched_chars(&a[best_a + best_len..], &b[best_b + best_len..])
}

/// Jaccard similarity over whitespace-separated tokens.
#[must_use]
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}

/// Combined fuzzy similarity used by the anchor aligner:
/// `0.6 · ratcliff + 0.4 · jaccard` after stripping non-alphanumerics.
/// Falls back to the plain ratio when either side has no tokens left.
#[must_use]
pub fn fuzzy_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a = strip_non_alphanumeric(a);
    let b = strip_non_alphanumeric(b);
    let ratio = ratcliff_obershelp(&a, &b);
    if a.split_whitespace().next().is_none() || b.split_whitespace().next().is_none() {
        return ratio;
    }
    let jaccard = token_jaccard(&a, &b);
    0.6f64.mul_add(ratio, 0.4 * jaccard)
}
