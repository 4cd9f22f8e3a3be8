//! The consumed source-document model.
//!
//! clindex does not read DOCX containers itself; a format-specific reader
//! (an external collaborator) decodes the file and hands the pipeline an
//! ordered document model: paragraphs with style and run metadata, tables
//! as cell grids, and footnotes with their own paragraphs. This module
//! defines that contract plus a JSON loader used by the CLI and by test
//! fixtures.
//!
//! Everything here is plain data. The parser in [`crate::parser`] is the
//! only consumer that interprets it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// One paragraph as exposed by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceParagraph {
    /// Concatenated run text.
    pub text: String,
    /// Style name, e.g. "Heading 1", "Normal", "List Bullet".
    #[serde(default = "default_style")]
    pub style: String,
    /// Word-processor outline level (0-based), when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_level: Option<u8>,
    /// Whether the paragraph carries numbering properties.
    #[serde(default)]
    pub has_numbering: bool,
    /// Whether the dominant run is bold (visual heading fallback input).
    #[serde(default)]
    pub bold: bool,
    /// Dominant run font size in points, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
}

fn default_style() -> String {
    "Normal".to_string()
}

impl SourceParagraph {
    /// Convenience constructor for fixtures: text + style, defaults
    /// elsewhere.
    #[must_use]
    pub fn new(text: &str, style: &str) -> Self {
        Self {
            text: text.to_string(),
            style: style.to_string(),
            outline_level: None,
            has_numbering: false,
            bold: false,
            font_size: None,
        }
    }
}

/// One table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCell {
    /// Cell text.
    pub text: String,
    /// Whether this cell is merged into the one above/left of it.
    #[serde(default)]
    pub merged: bool,
}

impl SourceCell {
    /// Convenience constructor for fixtures.
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            merged: false,
        }
    }
}

/// One table as a row-major cell grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    /// Rows of cells. Rows may be ragged; missing cells read as empty.
    pub rows: Vec<Vec<SourceCell>>,
    /// Index of the paragraph immediately preceding the table, used to
    /// resolve the table's section path and nearest heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_paragraph: Option<usize>,
}

impl SourceTable {
    /// Number of columns in the widest row.
    #[must_use]
    pub fn col_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell text at `(row, col)`, empty when absent.
    #[must_use]
    pub fn cell_text(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map_or("", |c| c.text.as_str())
    }
}

/// One footnote with its ordered paragraphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFootnote {
    /// Paragraph texts inside the footnote.
    pub paragraphs: Vec<String>,
}

/// The full decoded document handed to the pipeline.
///
/// `footnotes: None` means the reader could not expose the footnote
/// collection at all; the parser records a warning and continues.
/// `Some(vec![])` means the document simply has no footnotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Body paragraphs in document order.
    pub paragraphs: Vec<SourceParagraph>,
    /// Tables in document order.
    #[serde(default)]
    pub tables: Vec<SourceTable>,
    /// Footnote collection, when the reader exposes one.
    #[serde(default)]
    pub footnotes: Option<Vec<SourceFootnote>>,
}

impl SourceDocument {
    /// Load a document model from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileMissing(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let doc: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Parse(format!("invalid document model: {e}")))?;
        Ok(doc)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_defaults() {
        let json = r#"{"text": "Hello"}"#;
        let p: SourceParagraph = serde_json::from_str(json).unwrap();
        assert_eq!(p.style, "Normal");
        assert!(!p.has_numbering);
        assert!(p.outline_level.is_none());
    }

    #[test]
    fn test_table_ragged_rows() {
        let table = SourceTable {
            rows: vec![
                vec![SourceCell::new("a"), SourceCell::new("b"), SourceCell::new("c")],
                vec![SourceCell::new("d")],
            ],
            after_paragraph: None,
        };
        assert_eq!(table.col_count(), 3);
        assert_eq!(table.cell_text(1, 0), "d");
        assert_eq!(table.cell_text(1, 2), "");
        assert_eq!(table.cell_text(9, 9), "");
    }

    #[test]
    fn test_footnotes_none_vs_empty() {
        let none: SourceDocument = serde_json::from_str(r#"{"paragraphs": []}"#).unwrap();
        assert!(none.footnotes.is_none());

        let empty: SourceDocument =
            serde_json::from_str(r#"{"paragraphs": [], "footnotes": []}"#).unwrap();
        assert_eq!(empty.footnotes, Some(vec![]));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SourceDocument::load(Path::new("/no/such/file.json")).unwrap_err();
        assert_eq!(err.category(), "file_missing");
    }

    #[test]
    fn test_load_round_trip() {
        let doc = SourceDocument {
            paragraphs: vec![SourceParagraph::new("Intro", "Heading 1")],
            tables: vec![],
            footnotes: Some(vec![SourceFootnote {
                paragraphs: vec!["A footnote.".into()],
            }]),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        let loaded = SourceDocument::load(&path).unwrap();
        assert_eq!(loaded, doc);
    }
}
