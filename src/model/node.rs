//! Block and inline nodes of the document tree.

use serde::{Deserialize, Serialize};

/// Block-level content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        content: Vec<Inline>,
    },
    Heading {
        #[serde(default)]
        id: Option<String>,
        level: u8,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        content: Vec<Inline>,
    },
    Image {
        #[serde(default)]
        id: Option<String>,
        /// Id of an [`ImageAsset`](super::ImageAsset).
        image: String,
        #[serde(default)]
        alt: String,
        #[serde(default)]
        class: Option<String>,
    },
    /// Structural wrapper (section, blockquote, epigraph, poem, ...).
    Container {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        blocks: Vec<Block>,
    },
    Table {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        rows: Vec<TableRow>,
    },
    /// Footnote body; referenced by `Inline::Link { note: true, .. }`.
    Footnote {
        id: String,
        #[serde(default)]
        blocks: Vec<Block>,
    },
    /// Vertical spacer between blocks.
    EmptyLine,
}

impl Block {
    /// Convenience constructor for a plain paragraph.
    pub fn paragraph(content: Vec<Inline>) -> Self {
        Block::Paragraph {
            id: None,
            class: None,
            content,
        }
    }

    /// Convenience constructor for a heading.
    pub fn heading(level: u8, content: Vec<Inline>) -> Self {
        Block::Heading {
            id: None,
            level,
            class: None,
            content,
        }
    }

    /// Anchor id of this block, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Block::Paragraph { id, .. }
            | Block::Heading { id, .. }
            | Block::Image { id, .. }
            | Block::Container { id, .. }
            | Block::Table { id, .. } => id.as_deref(),
            Block::Footnote { id, .. } => Some(id),
            Block::EmptyLine => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableCell {
    /// Header cell (`th`).
    pub header: bool,
    pub colspan: Option<u32>,
    pub rowspan: Option<u32>,
    pub class: Option<String>,
    pub content: Vec<Inline>,
}

/// Inline content of a paragraph, heading or cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    Text {
        text: String,
    },
    /// Span with a style class (`emphasis`, `strong`, `sup`, ...).
    Styled {
        class: String,
        #[serde(default)]
        children: Vec<Inline>,
    },
    Link {
        /// `#id` for internal targets, anything else is external.
        href: String,
        /// Footnote reference.
        #[serde(default)]
        note: bool,
        #[serde(default)]
        children: Vec<Inline>,
    },
    Image {
        image: String,
        #[serde(default)]
        alt: String,
    },
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text { text: text.into() }
    }

    pub fn styled(class: impl Into<String>, children: Vec<Inline>) -> Self {
        Inline::Styled {
            class: class.into(),
            children,
        }
    }

    pub fn link(href: impl Into<String>, children: Vec<Inline>) -> Self {
        Inline::Link {
            href: href.into(),
            note: false,
            children,
        }
    }

    /// Concatenated text of this run, images excluded.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Inline::Text { text } => out.push_str(text),
            Inline::Styled { children, .. } | Inline::Link { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
            Inline::Image { .. } => {}
        }
    }

    /// Whether this run contains an inline image anywhere below it.
    pub fn has_image(&self) -> bool {
        match self {
            Inline::Image { .. } => true,
            Inline::Styled { children, .. } | Inline::Link { children, .. } => {
                children.iter().any(Inline::has_image)
            }
            Inline::Text { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_flattens_children() {
        let run = Inline::styled(
            "emphasis",
            vec![
                Inline::text("a "),
                Inline::link("#n1", vec![Inline::text("b")]),
                Inline::Image {
                    image: "i".into(),
                    alt: String::new(),
                },
            ],
        );
        assert_eq!(run.plain_text(), "a b");
        assert!(run.has_image());
    }

    #[test]
    fn test_block_json_tags() {
        let block: Block = serde_json::from_str(r#"{"type": "empty_line"}"#).unwrap();
        assert_eq!(block, Block::EmptyLine);

        let block: Block =
            serde_json::from_str(r#"{"type": "heading", "level": 2, "id": "h"}"#).unwrap();
        assert_eq!(block.id(), Some("h"));
    }
}
