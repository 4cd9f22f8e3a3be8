//! Heading-block construction.
//!
//! A heading block is a heading anchor plus its contiguous descendants:
//! every following body anchor until the next heading of the same or a
//! shallower level. Blocks are the unit the topic mapper scores.
//!
//! A heading's level is recovered from its section path depth (the
//! parser pushes a heading onto the stack before computing its path, so
//! the path always ends with the heading itself). Footnote and cell
//! anchors are never descendants.

use crate::types::{Anchor, ContentType, HeadingBlock};

/// Characters kept in a block's text preview.
const PREVIEW_CHARS: usize = 300;

/// Build heading blocks from a version's anchors (document order
/// expected).
#[must_use]
pub fn build_heading_blocks(anchors: &[Anchor]) -> Vec<HeadingBlock> {
    let body: Vec<&Anchor> = anchors
        .iter()
        .filter(|a| !matches!(a.content_type, ContentType::Cell | ContentType::Fn))
        .collect();

    let mut blocks: Vec<HeadingBlock> = Vec::new();
    for (idx, anchor) in body.iter().enumerate() {
        if anchor.content_type != ContentType::Hdr {
            continue;
        }
        let level = path_depth(&anchor.section_path);
        let mut content_anchor_ids: Vec<String> = Vec::new();
        let mut preview_source = String::new();
        for descendant in &body[idx + 1..] {
            if descendant.content_type == ContentType::Hdr
                && path_depth(&descendant.section_path) <= level
            {
                break;
            }
            content_anchor_ids.push(descendant.anchor_id.clone());
            if preview_source.chars().count() < PREVIEW_CHARS {
                if !preview_source.is_empty() {
                    preview_source.push(' ');
                }
                preview_source.push_str(&descendant.text_norm);
            }
        }

        blocks.push(HeadingBlock {
            heading_block_id: format!("hb:{}", anchor.anchor_id),
            doc_version_id: anchor.doc_version_id,
            heading_anchor_id: anchor.anchor_id.clone(),
            heading_text: anchor.text_norm.clone(),
            level,
            content_anchor_ids,
            text_preview: truncate_chars(&preview_source, PREVIEW_CHARS),
            source_zone: anchor.source_zone,
            language: anchor.language,
        });
    }
    blocks
}

#[allow(clippy::cast_possible_truncation)]
fn path_depth(section_path: &str) -> u8 {
    section_path.split('/').count().min(u8::MAX as usize) as u8
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::DocxParser;
    use crate::reader::{SourceDocument, SourceParagraph};
    use uuid::Uuid;

    fn blocks_for(paragraphs: Vec<SourceParagraph>) -> Vec<HeadingBlock> {
        let doc = SourceDocument {
            paragraphs,
            tables: vec![],
            footnotes: Some(vec![]),
        };
        let parser = DocxParser::new(&Config::default()).unwrap();
        let parsed = parser.parse(&doc, Uuid::nil(), None);
        build_heading_blocks(&parsed.anchors)
    }

    #[test]
    fn test_descendants_stop_at_same_level() {
        let blocks = blocks_for(vec![
            SourceParagraph::new("Methods", "Heading 1"),
            SourceParagraph::new("Design", "Heading 2"),
            SourceParagraph::new("Design body.", "Normal"),
            SourceParagraph::new("Population", "Heading 2"),
            SourceParagraph::new("Population body.", "Normal"),
            SourceParagraph::new("Results", "Heading 1"),
            SourceParagraph::new("Results body.", "Normal"),
        ]);

        assert_eq!(blocks.len(), 4);

        // "Methods" swallows everything until "Results".
        let methods = &blocks[0];
        assert_eq!(methods.heading_text, "Methods");
        assert_eq!(methods.level, 1);
        assert_eq!(methods.content_anchor_ids.len(), 4);

        // "Design" stops at the sibling "Population".
        let design = &blocks[1];
        assert_eq!(design.level, 2);
        assert_eq!(design.content_anchor_ids.len(), 1);

        let results = &blocks[3];
        assert_eq!(results.content_anchor_ids.len(), 1);
    }

    #[test]
    fn test_block_id_and_preview() {
        let long_text = "word ".repeat(100);
        let blocks = blocks_for(vec![
            SourceParagraph::new("Intro", "Heading 1"),
            SourceParagraph::new(&long_text, "Normal"),
        ]);
        let block = &blocks[0];
        assert!(block.heading_block_id.starts_with("hb:"));
        assert!(block.heading_block_id.contains(&block.heading_anchor_id));
        assert!(block.text_preview.chars().count() <= 300);
        assert!(block.text_preview.starts_with("word word"));
    }

    #[test]
    fn test_empty_block_has_no_descendants() {
        let blocks = blocks_for(vec![
            SourceParagraph::new("A", "Heading 1"),
            SourceParagraph::new("B", "Heading 1"),
        ]);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].content_anchor_ids.is_empty());
        assert_eq!(blocks[0].text_preview, "");
    }

    #[test]
    fn test_blocks_are_stable_across_reparse() {
        let paragraphs = vec![
            SourceParagraph::new("Safety", "Heading 1"),
            SourceParagraph::new("Adverse events are recorded.", "Normal"),
        ];
        let a = blocks_for(paragraphs.clone());
        let b = blocks_for(paragraphs);
        assert_eq!(a, b);
    }
}
