//! Heading detection.
//!
//! Classifies paragraphs as headings using four signals, in a fixed
//! order: named heading styles, word-processor outline metadata, leading
//! numbering patterns, and a visual fallback (bold + above-median font)
//! for documents whose authors never touched the style gallery.
//!
//! Only `style` and `outline` hits are *real* headings for the purpose of
//! building section paths. Numbering and visual hits are second-class:
//! the parser treats them as ordinary paragraphs until the first real
//! heading has been seen.
//!
//! The visual fallback is disabled by default and only enabled by the
//! parser when a first pass finds too few headings (see
//! [`crate::parser`]).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::reader::SourceParagraph;
use crate::text::normalize_text;

/// How a heading was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingMode {
    /// Named heading style ("Heading 2", «Заголовок 2»).
    Style,
    /// Outline level present on the paragraph.
    Outline,
    /// Leading section numbering ("4.2.1 Dosing").
    Numbering,
    /// Bold, larger-than-median font, short text.
    Visual,
}

impl HeadingMode {
    /// Wire value used in summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Outline => "outline",
            Self::Numbering => "numbering",
            Self::Visual => "visual",
        }
    }

    /// Whether this mode updates the heading stack.
    #[must_use]
    pub const fn is_real(self) -> bool {
        matches!(self, Self::Style | Self::Outline)
    }
}

/// Result of classifying one paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingHit {
    /// Whether the paragraph is a heading at all.
    pub is_heading: bool,
    /// Heading level (1-based), when detected.
    pub level: Option<u8>,
    /// Detection mode, when detected.
    pub mode: Option<HeadingMode>,
    /// Normalized paragraph text (leading numbering retained).
    pub normalized_title: String,
}

impl HeadingHit {
    fn none(title: String) -> Self {
        Self {
            is_heading: false,
            level: None,
            mode: None,
            normalized_title: title,
        }
    }

    fn hit(level: u8, mode: HeadingMode, title: String) -> Self {
        Self {
            is_heading: true,
            level: Some(level),
            mode: Some(mode),
            normalized_title: title,
        }
    }
}

/// Document-level statistics feeding the visual fallback.
#[derive(Debug, Clone, Default)]
pub struct DocStats {
    /// Median font size across non-empty paragraphs that report one.
    pub median_font_size: Option<f32>,
    /// Count of paragraphs with non-empty normalized text.
    pub paragraphs_with_text: usize,
}

impl DocStats {
    /// Compute stats over the whole paragraph sequence.
    #[must_use]
    pub fn compute(paragraphs: &[SourceParagraph]) -> Self {
        let mut sizes: Vec<f32> = Vec::new();
        let mut with_text = 0usize;
        for p in paragraphs {
            if normalize_text(&p.text).is_empty() {
                continue;
            }
            with_text += 1;
            if let Some(size) = p.font_size {
                sizes.push(size);
            }
        }
        sizes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if sizes.is_empty() {
            None
        } else {
            Some(sizes[sizes.len() / 2])
        };
        Self {
            median_font_size: median,
            paragraphs_with_text: with_text,
        }
    }
}

static NUMBERING_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\d+(\.\d+){0,5}\s+\S").unwrap()
});

/// Numbering candidates longer than this are sentence-like, not headings.
const NUMBERING_MAX_CHARS: usize = 120;
const NUMBERING_MAX_WORDS: usize = 12;

/// Paragraph heading classifier.
///
/// One instance per detection pass; the rejection counter records why
/// numbering candidates were turned down so the parse summary can report
/// `false_heading_filtered_count`.
#[derive(Debug)]
pub struct HeadingDetector {
    enable_visual_fallback: bool,
    doc_stats: DocStats,
    rejections: HashMap<String, usize>,
}

impl HeadingDetector {
    /// Create a detector; the visual fallback stays off unless requested.
    #[must_use]
    pub fn new(enable_visual_fallback: bool, doc_stats: DocStats) -> Self {
        Self {
            enable_visual_fallback,
            doc_stats,
            rejections: HashMap::new(),
        }
    }

    /// Rejection reasons accumulated so far, by reason key.
    #[must_use]
    pub const fn rejections(&self) -> &HashMap<String, usize> {
        &self.rejections
    }

    /// Drain the rejection counter.
    pub fn take_rejections(&mut self) -> HashMap<String, usize> {
        std::mem::take(&mut self.rejections)
    }

    /// Classify a paragraph.
    pub fn detect(&mut self, paragraph: &SourceParagraph) -> HeadingHit {
        let title = normalize_text(&paragraph.text);
        if title.is_empty() {
            return HeadingHit::none(title);
        }

        // (1) Style-based.
        if let Some(level) = style_heading_level(&paragraph.style) {
            return HeadingHit::hit(level, HeadingMode::Style, title);
        }

        // (2) Outline metadata (0-based in the document model).
        if let Some(outline) = paragraph.outline_level {
            let level = (outline + 1).clamp(1, 9);
            return HeadingHit::hit(level, HeadingMode::Outline, title);
        }

        // (3) Leading numbering.
        if NUMBERING_RE.is_match(&title) {
            if let Some(reason) = numbering_rejection(&title) {
                *self.rejections.entry(reason.to_string()).or_insert(0) += 1;
            } else {
                let dots = title
                    .split_whitespace()
                    .next()
                    .map_or(0, |tok| tok.matches('.').count());
                #[allow(clippy::cast_possible_truncation)]
                let level = ((dots + 1).min(6)) as u8;
                return HeadingHit::hit(level, HeadingMode::Numbering, title);
            }
        }

        // (4) Visual fallback.
        if self.enable_visual_fallback && self.looks_visual(paragraph, &title) {
            return HeadingHit::hit(1, HeadingMode::Visual, title);
        }

        HeadingHit::none(title)
    }

    fn looks_visual(&self, paragraph: &SourceParagraph, title: &str) -> bool {
        if !paragraph.bold {
            return false;
        }
        if title.split_whitespace().count() > NUMBERING_MAX_WORDS {
            return false;
        }
        match (paragraph.font_size, self.doc_stats.median_font_size) {
            (Some(size), Some(median)) => size >= median + 1.0,
            // No font metadata anywhere: bold + short is the best signal
            // we have.
            (None, None) => true,
            _ => false,
        }
    }
}

/// Parse a heading level out of a style name.
///
/// Accepts "Heading N" and the Russian word-processor equivalent
/// «Заголовок N» with N in 1..=9.
fn style_heading_level(style: &str) -> Option<u8> {
    let rest = style
        .strip_prefix("Heading")
        .or_else(|| style.strip_prefix("Заголовок"))?;
    let digits: String = rest.trim().chars().take_while(char::is_ascii_digit).collect();
    let level: u8 = digits.parse().ok()?;
    (1..=9).contains(&level).then_some(level)
}

/// Why a numbering candidate is not a heading, if it is not.
fn numbering_rejection(title: &str) -> Option<&'static str> {
    if title.len() > NUMBERING_MAX_CHARS {
        return Some("too_long");
    }
    if title.split_whitespace().count() > NUMBERING_MAX_WORDS {
        return Some("too_many_words");
    }
    if title.ends_with('.') || title.ends_with('!') || title.ends_with('?') || title.ends_with(';')
    {
        return Some("sentence_like");
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn detector() -> HeadingDetector {
        HeadingDetector::new(false, DocStats::default())
    }

    #[test]
    fn test_style_heading_detection() {
        let mut d = detector();
        let hit = d.detect(&SourceParagraph::new("Introduction", "Heading 1"));
        assert!(hit.is_heading);
        assert_eq!(hit.level, Some(1));
        assert_eq!(hit.mode, Some(HeadingMode::Style));
        assert_eq!(hit.normalized_title, "Introduction");

        let hit = d.detect(&SourceParagraph::new("Дизайн исследования", "Заголовок 2"));
        assert_eq!(hit.level, Some(2));
        assert_eq!(hit.mode, Some(HeadingMode::Style));
    }

    #[test]
    fn test_style_level_out_of_range_not_heading() {
        let mut d = detector();
        let hit = d.detect(&SourceParagraph::new("x", "Heading 12"));
        assert!(!hit.is_heading);
        let hit = d.detect(&SourceParagraph::new("x", "HeadingFoo"));
        assert!(!hit.is_heading);
    }

    #[test]
    fn test_outline_detection() {
        let mut d = detector();
        let mut p = SourceParagraph::new("Background", "Normal");
        p.outline_level = Some(1);
        let hit = d.detect(&p);
        assert!(hit.is_heading);
        assert_eq!(hit.level, Some(2));
        assert_eq!(hit.mode, Some(HeadingMode::Outline));
    }

    #[test]
    fn test_numbering_detection_and_level() {
        let mut d = detector();
        let hit = d.detect(&SourceParagraph::new("4.2.1 Dose modification", "Normal"));
        assert!(hit.is_heading);
        assert_eq!(hit.mode, Some(HeadingMode::Numbering));
        assert_eq!(hit.level, Some(3));

        let hit = d.detect(&SourceParagraph::new("7 Safety", "Normal"));
        assert_eq!(hit.level, Some(1));
    }

    #[test]
    fn test_numbering_rejects_sentences() {
        let mut d = detector();
        let hit = d.detect(&SourceParagraph::new(
            "12 patients discontinued treatment early.",
            "Normal",
        ));
        assert!(!hit.is_heading);
        assert_eq!(d.rejections().get("sentence_like"), Some(&1));

        let long = format!("3.1 {}", "word ".repeat(30));
        let hit = d.detect(&SourceParagraph::new(&long, "Normal"));
        assert!(!hit.is_heading);
        assert!(d.rejections().values().sum::<usize>() >= 2);
    }

    #[test]
    fn test_visual_fallback_gated() {
        let stats = DocStats {
            median_font_size: Some(11.0),
            paragraphs_with_text: 60,
        };
        let mut p = SourceParagraph::new("STUDY DESIGN", "Normal");
        p.bold = true;
        p.font_size = Some(14.0);

        // Disabled: no hit.
        let mut off = HeadingDetector::new(false, stats.clone());
        assert!(!off.detect(&p).is_heading);

        // Enabled: visual hit at level 1.
        let mut on = HeadingDetector::new(true, stats);
        let hit = on.detect(&p);
        assert!(hit.is_heading);
        assert_eq!(hit.mode, Some(HeadingMode::Visual));
        assert_eq!(hit.level, Some(1));
        assert!(!hit.mode.unwrap().is_real());
    }

    #[test]
    fn test_visual_requires_size_above_median() {
        let stats = DocStats {
            median_font_size: Some(11.0),
            paragraphs_with_text: 60,
        };
        let mut p = SourceParagraph::new("Not big enough", "Normal");
        p.bold = true;
        p.font_size = Some(11.0);
        let mut d = HeadingDetector::new(true, stats);
        assert!(!d.detect(&p).is_heading);
    }

    #[test]
    fn test_empty_paragraph_is_not_heading() {
        let mut d = detector();
        let hit = d.detect(&SourceParagraph::new("   \t ", "Heading 1"));
        assert!(!hit.is_heading);
        assert_eq!(hit.normalized_title, "");
    }

    #[test]
    fn test_doc_stats_median() {
        let mut paragraphs = vec![
            SourceParagraph::new("a", "Normal"),
            SourceParagraph::new("b", "Normal"),
            SourceParagraph::new("", "Normal"),
        ];
        paragraphs[0].font_size = Some(10.0);
        paragraphs[1].font_size = Some(12.0);
        let stats = DocStats::compute(&paragraphs);
        assert_eq!(stats.paragraphs_with_text, 2);
        assert_eq!(stats.median_font_size, Some(12.0));
    }
}
