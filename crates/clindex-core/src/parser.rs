//! DOCX anchor extraction.
//!
//! Walks the decoded document model and produces one content-addressed
//! [`Anchor`] per non-empty paragraph and footnote paragraph, together
//! with a structural summary (heading diagnostics, section list,
//! footnote counts) and any warnings encountered on the way.
//!
//! ## Identity
//!
//! Body anchor ids are `{doc_version_id}:{ctype}:{para_index}:{hash}`;
//! footnote anchor ids are
//! `{doc_version_id}:fn:{fn_index}:{fn_para_index}:{hash}`. The
//! paragraph index is global over the document (1-based, empty
//! paragraphs included), which keeps ids stable when text moves between
//! sections without being edited.
//!
//! ## Heading passes
//!
//! Detection runs once without the visual fallback. If the document
//! yields no headings at all, or more than 50 non-empty paragraphs with
//! fewer than 3 headings, detection is re-run with the visual fallback
//! enabled. Only style/outline headings ("real" headings) update the
//! heading stack or become HDR anchors; everything before the first real
//! heading lives in the `__FRONTMATTER__` section.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::heading::{DocStats, HeadingDetector, HeadingHit, HeadingMode};
use crate::reader::SourceDocument;
use crate::text::{detect_language, normalize_section_path, normalize_text, text_hash};
use crate::types::{
    Anchor, ContentType, FOOTNOTES_SECTION, FRONTMATTER_SECTION, Language, Location,
};
use crate::zone::ZoneClassifier;

/// Overall quality of heading detection for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingQuality {
    /// No headings detected at all.
    None,
    /// Two or fewer headings, or detection dominated by the visual
    /// fallback.
    Low,
    /// Enough real headings to trust the section structure.
    Ok,
}

/// Structural summary of one parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocxSummary {
    /// Total anchors produced (body + footnotes).
    pub anchors_count: usize,
    /// Anchor counts keyed by content-type wire value.
    pub counts_by_type: BTreeMap<String, usize>,
    /// Number of distinct section paths.
    pub num_sections: usize,
    /// Sorted distinct section paths.
    pub sections: Vec<String>,
    /// Real headings detected.
    pub heading_detected_count: usize,
    /// Real-heading counts keyed by level.
    pub heading_levels_histogram: BTreeMap<String, usize>,
    /// Heading hits keyed by detection mode (all modes, real or not).
    pub heading_detection_mode_counts: BTreeMap<String, usize>,
    /// Detection quality verdict.
    pub heading_quality: HeadingQuality,
    /// Numbering candidates rejected by the sentence-like heuristics.
    pub false_heading_filtered_count: usize,
    /// Non-empty paragraphs before the first real heading.
    pub frontmatter_paragraphs_count: usize,
    /// Footnotes seen in the reader's collection.
    pub footnotes_count: usize,
    /// FN anchors produced.
    pub footnotes_anchors_count: usize,
    /// Warnings raised during parsing.
    pub warnings: Vec<String>,
}

/// The result of extracting anchors from a document.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Anchors in document order (body first, then footnotes).
    pub anchors: Vec<Anchor>,
    /// Structural summary.
    pub summary: DocxSummary,
    /// Warnings, duplicated from the summary for the orchestrator.
    pub warnings: Vec<String>,
}

/// Anchor extractor over the decoded document model.
pub struct DocxParser {
    zone_classifier: ZoneClassifier,
}

impl DocxParser {
    /// Build a parser from the pipeline configuration (compiles the zone
    /// rulebook).
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            zone_classifier: ZoneClassifier::new(&config.zone_rules)?,
        })
    }

    /// Extract anchors from a document.
    ///
    /// `doc_language` is the document-level language declared upstream,
    /// used only to narrow the zone rulebook; per-anchor language is
    /// always detected from the anchor's own text.
    #[must_use]
    pub fn parse(
        &self,
        doc: &SourceDocument,
        doc_version_id: Uuid,
        doc_language: Option<Language>,
    ) -> ParseResult {
        let doc_stats = DocStats::compute(&doc.paragraphs);
        let paragraphs_with_text = doc_stats.paragraphs_with_text;

        // First pass: style/outline/numbering only.
        let mut detector = HeadingDetector::new(false, doc_stats.clone());
        let mut hits: Vec<HeadingHit> = doc
            .paragraphs
            .iter()
            .map(|p| detector.detect(p))
            .collect();
        let mut rejection_count: usize = detector.take_rejections().values().sum();
        let mut heading_count = hits.iter().filter(|h| h.is_heading).count();

        // Too few headings in a real document: retry with the visual
        // fallback enabled.
        if heading_count == 0 || (paragraphs_with_text > 50 && heading_count < 3) {
            let mut visual = HeadingDetector::new(true, doc_stats);
            hits = doc.paragraphs.iter().map(|p| visual.detect(p)).collect();
            rejection_count += visual.take_rejections().values().sum::<usize>();
            heading_count = hits.iter().filter(|h| h.is_heading).count();
            debug!(heading_count, "re-ran heading detection with visual fallback");
        }

        let zone_language = match doc_language {
            Some(lang @ (Language::Ru | Language::En)) => Some(lang),
            _ => None,
        };

        let mut heading_stack: Vec<(u8, String)> = Vec::new();
        let mut first_real_heading_found = false;
        let mut ordinal_counters: BTreeMap<(String, ContentType), u32> = BTreeMap::new();
        let mut anchors: Vec<Anchor> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        let mut heading_detected_count = 0usize;
        let mut heading_levels_histogram: BTreeMap<String, usize> = BTreeMap::new();
        let mut mode_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut frontmatter_paragraphs_count = 0usize;

        for (para_index, (paragraph, hit)) in
            doc.paragraphs.iter().zip(hits.iter()).enumerate().map(|(i, pair)| (i + 1, pair))
        {
            let text_raw = paragraph.text.clone();
            let text_norm = normalize_text(&text_raw);
            if text_norm.is_empty() {
                continue;
            }

            if let Some(mode) = hit.mode {
                *mode_counts.entry(mode.as_str().to_string()).or_insert(0) += 1;
            }

            let is_real_heading =
                hit.is_heading && hit.mode.is_some_and(HeadingMode::is_real);
            if is_real_heading && !first_real_heading_found {
                first_real_heading_found = true;
            }
            if !first_real_heading_found {
                frontmatter_paragraphs_count += 1;
            }

            let content_type = if is_real_heading {
                let level = hit.level.unwrap_or(1);
                heading_stack.retain(|(l, _)| *l < level);
                heading_stack.push((level, hit.normalized_title.clone()));

                heading_detected_count += 1;
                *heading_levels_histogram
                    .entry(level.to_string())
                    .or_insert(0) += 1;
                ContentType::Hdr
            } else if is_list_item(paragraph) {
                ContentType::Li
            } else {
                ContentType::P
            };

            let section_path = if first_real_heading_found {
                let titles: Vec<String> =
                    heading_stack.iter().map(|(_, t)| t.clone()).collect();
                normalize_section_path(&titles)
            } else {
                FRONTMATTER_SECTION.to_string()
            };

            let ordinal = {
                let counter = ordinal_counters
                    .entry((section_path.clone(), content_type))
                    .or_insert(0);
                *counter += 1;
                *counter
            };

            let hash = text_hash(&text_norm);
            let anchor_id =
                format!("{doc_version_id}:{}:{para_index}:{hash}", content_type.as_str());

            let nearest_heading = heading_stack.last().map(|(_, t)| t.as_str());
            let zone = self
                .zone_classifier
                .classify(&section_path, nearest_heading, zone_language);

            anchors.push(Anchor {
                doc_version_id,
                anchor_id,
                section_path,
                content_type,
                ordinal,
                language: detect_language(&text_norm),
                location: Location::Body {
                    para_index,
                    style: paragraph.style.clone(),
                },
                source_zone: zone.zone,
                text_raw,
                text_norm,
                text_hash: hash,
            });
        }

        // Footnotes after the body.
        let mut footnotes_count = 0usize;
        let mut footnotes_anchors_count = 0usize;
        match &doc.footnotes {
            None => {
                warnings.push(
                    "Footnotes unavailable: reader did not expose a footnote collection"
                        .to_string(),
                );
            }
            Some(footnotes) => {
                for (fn_idx, footnote) in footnotes.iter().enumerate() {
                    footnotes_count += 1;
                    for (fn_para_idx, text_raw) in
                        footnote.paragraphs.iter().enumerate().map(|(i, t)| (i + 1, t))
                    {
                        let text_norm = normalize_text(text_raw);
                        if text_norm.is_empty() {
                            continue;
                        }
                        let ordinal = {
                            let counter = ordinal_counters
                                .entry((FOOTNOTES_SECTION.to_string(), ContentType::Fn))
                                .or_insert(0);
                            *counter += 1;
                            *counter
                        };
                        let hash = text_hash(&text_norm);
                        let anchor_id =
                            format!("{doc_version_id}:fn:{fn_idx}:{fn_para_idx}:{hash}");
                        let zone = self.zone_classifier.classify(
                            FOOTNOTES_SECTION,
                            None,
                            zone_language,
                        );
                        anchors.push(Anchor {
                            doc_version_id,
                            anchor_id,
                            section_path: FOOTNOTES_SECTION.to_string(),
                            content_type: ContentType::Fn,
                            ordinal,
                            language: detect_language(&text_norm),
                            location: Location::Footnote {
                                fn_index: fn_idx,
                                fn_para_index: fn_para_idx,
                            },
                            source_zone: zone.zone,
                            text_raw: text_raw.clone(),
                            text_norm,
                            text_hash: hash,
                        });
                        footnotes_anchors_count += 1;
                    }
                }
            }
        }

        // Heading-quality verdict.
        let visual_hits = mode_counts.get("visual").copied().unwrap_or(0);
        let total_hits: usize = mode_counts.values().sum();
        let heading_quality = if heading_detected_count == 0 {
            warnings.push("No headings detected; section_path fallback to ROOT".to_string());
            HeadingQuality::None
        } else if heading_detected_count <= 2 {
            HeadingQuality::Low
        } else if visual_hits > 0 && total_hits > 0 && {
            #[allow(clippy::cast_precision_loss)]
            let share = visual_hits as f64 / total_hits as f64;
            share > 0.8
        } {
            warnings
                .push("Headings detected mostly via visual fallback; verify structure".to_string());
            HeadingQuality::Low
        } else {
            HeadingQuality::Ok
        };

        let mut counts_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for anchor in &anchors {
            *counts_by_type
                .entry(anchor.content_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        let mut sections: Vec<String> = anchors
            .iter()
            .map(|a| a.section_path.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        sections.sort();

        let summary = DocxSummary {
            anchors_count: anchors.len(),
            num_sections: sections.len(),
            sections,
            counts_by_type,
            heading_detected_count,
            heading_levels_histogram,
            heading_detection_mode_counts: mode_counts,
            heading_quality,
            false_heading_filtered_count: rejection_count,
            frontmatter_paragraphs_count,
            footnotes_count,
            footnotes_anchors_count,
            warnings: warnings.clone(),
        };

        ParseResult {
            anchors,
            summary,
            warnings,
        }
    }
}

/// A paragraph is a list item when its style says so or it carries
/// numbering properties.
fn is_list_item(paragraph: &crate::reader::SourceParagraph) -> bool {
    paragraph.style.starts_with("List") || paragraph.has_numbering
}
