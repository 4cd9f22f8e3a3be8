//! Schedule-of-Activities table detection and extraction.
//!
//! Every clinical protocol carries one table mapping visits (columns) to
//! procedures (rows) with mark cells ("X", "✓") at the intersections.
//! The extractor scores every table in the document on five signals,
//! picks the best candidate above a threshold, and emits the structured
//! schedule plus one CELL anchor per non-empty cell so every matrix entry
//! has textual evidence.
//!
//! Scores are composed with fixed weights:
//!
//! ```text
//! 0.35·visit_headers + 0.30·procedure_rows + 0.20·mark_density
//!   + 0.10·shape + 0.05·heading_hint
//! ```
//!
//! Ties within the ambiguity band resolve to the earliest table and are
//! reported as a warning, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::reader::{SourceDocument, SourceTable};
use crate::text::{detect_language, normalize_text, text_hash};
use crate::types::{Anchor, ContentType, Location, ROOT_SECTION};
use crate::zone::ZoneClassifier;

static VISIT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(
        r"(?i)(screening|baseline|randomi[sz]ation|week\s*-?\d+|day\s*-?\d+|visit\s*\d+|cycle\s*\d+|follow[- ]?up|end of (treatment|study)|скрининг|исходно|рандомизаци|неделя\s*\d+|день\s*-?\d+|визит\s*\d+|цикл\s*\d+|наблюдени)",
    )
    .unwrap()
});

static PROCEDURE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(
        r"(?i)(informed consent|vital signs?|vitals|ecg|electrocardiogram|laborator|h(a)?ematolog|blood|urin|physical exam|adverse event|concomitant|randomi[sz]ation|dosing|drug administration|pharmacokinetic|pregnancy test|согласи|жизненно важн|экг|лаборатор|кров|моч|физикальн|нежелательн|сопутств|рандомизаци|дозирован|беременност)",
    )
    .unwrap()
});

static MARK_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[xXхХ✓✔●•+]$").unwrap()
});

static SOA_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(
        r"(?i)(schedule of (activities|assessments|events)|\bsoa\b|график|расписани|план (визитов|процедур))",
    )
    .unwrap()
});

/// One visit column of the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaVisit {
    /// Sequential id, `V1`, `V2`, ...
    pub visit_id: String,
    /// Header label.
    pub label: String,
    /// CELL anchor of the header cell.
    pub anchor_ref: String,
}

/// One procedure row of the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaProcedure {
    /// Sequential id, `P1`, `P2`, ...
    pub proc_id: String,
    /// Row-header label.
    pub label: String,
    /// CELL anchor of the row-header cell.
    pub anchor_ref: String,
}

/// One non-empty matrix cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaMatrixEntry {
    /// Visit column.
    pub visit_id: String,
    /// Procedure row.
    pub proc_id: String,
    /// Cell value, normalized (usually a mark).
    pub value: String,
    /// CELL anchor of the body cell.
    pub anchor_ref: String,
}

/// Extracted schedule plus detection metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaResult {
    /// Index of the winning table in document order.
    pub table_index: usize,
    /// Section path containing the table.
    pub section_path: String,
    /// Composite detection score of the winner.
    pub confidence: f64,
    /// Visit columns in column order.
    pub visits: Vec<SoaVisit>,
    /// Procedure rows in row order.
    pub procedures: Vec<SoaProcedure>,
    /// Non-empty body cells.
    pub matrix: Vec<SoaMatrixEntry>,
    /// Detection warnings (ambiguity, skipped columns).
    pub warnings: Vec<String>,
}

/// Schedule-of-Activities extractor.
pub struct SoaExtractor {
    zone_classifier: ZoneClassifier,
    score_threshold: f64,
    ambiguity_band: f64,
}

struct TableContext<'a> {
    section_path: String,
    nearest_heading: Option<&'a str>,
}

impl SoaExtractor {
    /// Build an extractor from the pipeline configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            zone_classifier: ZoneClassifier::new(&config.zone_rules)?,
            score_threshold: config.soa.score_threshold,
            ambiguity_band: config.soa.ambiguity_band,
        })
    }

    /// Find the best SoA candidate and extract it.
    ///
    /// `body_anchors` are the anchors already produced by the parser for
    /// this version; they resolve each table's section path and nearest
    /// heading. Returns `None` when no table clears the score threshold.
    #[must_use]
    pub fn extract(
        &self,
        doc: &SourceDocument,
        doc_version_id: Uuid,
        body_anchors: &[Anchor],
    ) -> Option<(Vec<Anchor>, SoaResult)> {
        if doc.tables.is_empty() {
            return None;
        }

        let contexts: Vec<TableContext<'_>> = doc
            .tables
            .iter()
            .map(|t| table_context(t, body_anchors))
            .collect();

        let mut best: Option<(usize, f64)> = None;
        let mut scores: Vec<f64> = Vec::with_capacity(doc.tables.len());
        for (idx, table) in doc.tables.iter().enumerate() {
            let score = score_table(table, contexts[idx].nearest_heading);
            debug!(table_index = idx, score, "scored SoA candidate");
            scores.push(score);
            if score >= self.score_threshold
                && best.is_none_or(|(_, best_score)| score > best_score)
            {
                best = Some((idx, score));
            }
        }

        let (winner_idx, winner_score) = best?;
        let mut warnings = Vec::new();
        let ambiguous: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|&(i, &s)| {
                i != winner_idx
                    && s >= self.score_threshold
                    && (winner_score - s) <= self.ambiguity_band
            })
            .map(|(i, _)| i)
            .collect();
        if !ambiguous.is_empty() {
            warnings.push(format!(
                "Ambiguous SoA candidates: tables {ambiguous:?} score within {} of table {winner_idx}; picked the earliest",
                self.ambiguity_band
            ));
        }

        let context = &contexts[winner_idx];
        let (cell_anchors, result) = self.extract_table(
            &doc.tables[winner_idx],
            winner_idx,
            winner_score,
            context,
            doc_version_id,
            warnings,
        );
        Some((cell_anchors, result))
    }

    #[allow(clippy::too_many_lines)]
    fn extract_table(
        &self,
        table: &SourceTable,
        table_index: usize,
        score: f64,
        context: &TableContext<'_>,
        doc_version_id: Uuid,
        mut warnings: Vec<String>,
    ) -> (Vec<Anchor>, SoaResult) {
        let header_rows = detect_header_rows(table);
        let cols = table.col_count();
        let rows = table.rows.len();

        // Visit columns: join banded header labels per column. The
        // anchor_ref points at the deepest non-empty header cell so it
        // always resolves to an emitted CELL anchor.
        let mut visits: Vec<SoaVisit> = Vec::new();
        let mut visit_by_col: Vec<Option<usize>> = vec![None; cols];
        for col in 1..cols {
            let band: Vec<(usize, String)> = (0..header_rows)
                .map(|row| (row, normalize_text(table.cell_text(row, col))))
                .filter(|(_, t)| !t.is_empty())
                .collect();
            if band.is_empty() {
                warnings.push(format!("SoA column {col} has an empty header; skipped"));
                continue;
            }
            let label = band
                .iter()
                .map(|(_, t)| t.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            #[allow(clippy::unwrap_used)]
            let (anchor_row, anchor_text) = band.last().unwrap();
            let anchor_ref =
                cell_anchor_id(doc_version_id, table_index, *anchor_row, col, anchor_text);
            visit_by_col[col] = Some(visits.len());
            visits.push(SoaVisit {
                visit_id: format!("V{}", visits.len() + 1),
                label,
                anchor_ref,
            });
        }

        // Procedure rows.
        let mut procedures: Vec<SoaProcedure> = Vec::new();
        let mut proc_by_row: Vec<Option<usize>> = vec![None; rows];
        for row in header_rows..rows {
            let label = normalize_text(table.cell_text(row, 0));
            if label.is_empty() {
                continue;
            }
            let anchor_ref = cell_anchor_id(doc_version_id, table_index, row, 0, &label);
            proc_by_row[row] = Some(procedures.len());
            procedures.push(SoaProcedure {
                proc_id: format!("P{}", procedures.len() + 1),
                label,
                anchor_ref,
            });
        }

        // Matrix entries and cell anchors for every non-empty cell.
        let mut matrix: Vec<SoaMatrixEntry> = Vec::new();
        let mut cell_anchors: Vec<Anchor> = Vec::new();
        let mut ordinal: u32 = 0;
        for row in 0..rows {
            for col in 0..cols {
                let text_raw = table.cell_text(row, col);
                let text_norm = normalize_text(text_raw);
                if text_norm.is_empty() {
                    continue;
                }
                let is_header = row < header_rows || col == 0;
                let header_path = if is_header {
                    // Banded column headers chain the labels above them.
                    (0..row)
                        .filter(|_| col > 0)
                        .map(|r| normalize_text(table.cell_text(r, col)))
                        .filter(|t| !t.is_empty())
                        .collect()
                } else {
                    let mut path = Vec::with_capacity(2);
                    if let Some(p) = proc_by_row[row] {
                        path.push(procedures[p].label.clone());
                    }
                    if let Some(v) = visit_by_col[col] {
                        path.push(visits[v].label.clone());
                    }
                    path
                };

                ordinal += 1;
                let hash = text_hash(&text_norm);
                let anchor_id = cell_anchor_id(doc_version_id, table_index, row, col, &text_norm);
                let zone = self.zone_classifier.classify(
                    &context.section_path,
                    context.nearest_heading,
                    None,
                );
                cell_anchors.push(Anchor {
                    doc_version_id,
                    anchor_id: anchor_id.clone(),
                    section_path: context.section_path.clone(),
                    content_type: ContentType::Cell,
                    ordinal,
                    language: detect_language(&text_norm),
                    location: Location::Cell {
                        table_index,
                        row_idx: row,
                        col_idx: col,
                        is_header,
                        header_path,
                    },
                    source_zone: zone.zone,
                    text_raw: text_raw.to_string(),
                    text_norm: text_norm.clone(),
                    text_hash: hash,
                });

                if !is_header {
                    if let (Some(p), Some(v)) = (proc_by_row[row], visit_by_col[col]) {
                        matrix.push(SoaMatrixEntry {
                            visit_id: visits[v].visit_id.clone(),
                            proc_id: procedures[p].proc_id.clone(),
                            value: text_norm,
                            anchor_ref: anchor_id,
                        });
                    }
                }
            }
        }

        let result = SoaResult {
            table_index,
            section_path: context.section_path.clone(),
            confidence: score,
            visits,
            procedures,
            matrix,
            warnings,
        };
        (cell_anchors, result)
    }
}

fn cell_anchor_id(
    doc_version_id: Uuid,
    table_index: usize,
    row: usize,
    col: usize,
    text_norm: &str,
) -> String {
    format!(
        "{doc_version_id}:cell:{table_index}:{row}:{col}:{}",
        text_hash(text_norm)
    )
}

/// Resolve the section the table sits in from the anchors preceding it.
fn table_context<'a>(table: &SourceTable, body_anchors: &'a [Anchor]) -> TableContext<'a> {
    let Some(after) = table.after_paragraph else {
        return TableContext {
            section_path: ROOT_SECTION.to_string(),
            nearest_heading: None,
        };
    };
    let mut section_path = ROOT_SECTION.to_string();
    let mut nearest_heading: Option<&'a str> = None;
    for anchor in body_anchors {
        let Location::Body { para_index, .. } = &anchor.location else {
            continue;
        };
        if *para_index > after {
            break;
        }
        section_path.clone_from(&anchor.section_path);
        if anchor.content_type == ContentType::Hdr {
            nearest_heading = Some(anchor.text_norm.as_str());
        }
    }
    TableContext {
        section_path,
        nearest_heading,
    }
}

/// Header band: row 0 always; row 1 as well when it looks like a second
/// header row (no marks, at least one visit-like cell).
fn detect_header_rows(table: &SourceTable) -> usize {
    if table.rows.len() < 3 {
        return 1;
    }
    let cols = table.col_count();
    let mut visit_like = 0usize;
    let mut marks = 0usize;
    for col in 1..cols {
        let text = normalize_text(table.cell_text(1, col));
        if text.is_empty() {
            continue;
        }
        if MARK_RE.is_match(&text) {
            marks += 1;
        }
        if VISIT_RE.is_match(&text) {
            visit_like += 1;
        }
    }
    if marks == 0 && visit_like > 0 { 2 } else { 1 }
}

/// Composite detection score in [0, 1].
fn score_table(table: &SourceTable, nearest_heading: Option<&str>) -> f64 {
    let rows = table.rows.len();
    let cols = table.col_count();
    if rows < 2 || cols < 2 {
        return 0.0;
    }
    let header_rows = detect_header_rows(table);

    // Visit-like cells in the deepest header band row (corner excluded).
    let mut header_total = 0usize;
    let mut header_visit = 0usize;
    for col in 1..cols {
        let text = normalize_text(table.cell_text(header_rows - 1, col));
        if text.is_empty() {
            continue;
        }
        header_total += 1;
        if VISIT_RE.is_match(&text) {
            header_visit += 1;
        }
    }

    // Procedure-like row headers (first column, header band excluded).
    let mut row_total = 0usize;
    let mut row_proc = 0usize;
    for row in header_rows..rows {
        let text = normalize_text(table.cell_text(row, 0));
        if text.is_empty() {
            continue;
        }
        row_total += 1;
        if PROCEDURE_RE.is_match(&text) {
            row_proc += 1;
        }
    }

    // Mark density over non-empty body cells.
    let mut body_non_empty = 0usize;
    let mut body_marks = 0usize;
    for row in header_rows..rows {
        for col in 1..cols {
            let text = normalize_text(table.cell_text(row, col));
            if text.is_empty() {
                continue;
            }
            body_non_empty += 1;
            if MARK_RE.is_match(&text) {
                body_marks += 1;
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let visit_ratio = if header_total == 0 {
        0.0
    } else {
        header_visit as f64 / header_total as f64
    };
    #[allow(clippy::cast_precision_loss)]
    let proc_ratio = if row_total == 0 {
        0.0
    } else {
        row_proc as f64 / row_total as f64
    };
    #[allow(clippy::cast_precision_loss)]
    let mark_density = if body_non_empty == 0 {
        0.0
    } else {
        body_marks as f64 / body_non_empty as f64
    };
    let shape = if rows >= 3 && cols >= 3 { 1.0 } else { 0.0 };
    let heading_hint = nearest_heading
        .is_some_and(|h| SOA_HEADING_RE.is_match(h))
        .then_some(1.0)
        .unwrap_or(0.0);

    (0.35 * visit_ratio)
        + (0.30 * proc_ratio)
        + (0.20 * mark_density)
        + (0.10 * shape)
        + (0.05 * heading_hint)
}
