//! Block tree model: the destination-agnostic shape of a document's content.
//!
//! Every block is a [`BlockNode`]: a closed [`BlockKind`] carrying the
//! kind-specific inline content, plus an ordered list of children. Code that
//! inspects blocks matches on the kind exhaustively instead of probing fields.

use serde::{Deserialize, Serialize};

/// Inline styles of a text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
}

/// A styled span of text, optionally hyperlinked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub content: String,
    pub link: Option<String>,
    pub annotations: Annotations,
}

impl TextRun {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

pub type RichText = Vec<TextRun>;

/// Concatenated text of all runs.
pub fn plain_text(text: &[TextRun]) -> String {
    text.iter().map(|run| run.content.as_str()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph { text: RichText },
    Heading { level: u8, text: RichText },
    BulletedListItem { text: RichText },
    NumberedListItem { text: RichText },
    ToDo { text: RichText, checked: bool },
    Quote { text: RichText },
    Code { text: RichText, language: String },
    Divider,
    /// Children are exclusively [`BlockKind::TableRow`]s.
    Table { width: usize, has_column_header: bool },
    TableRow { cells: Vec<RichText> },
    Callout { text: RichText, icon: String, color: String },
    Image { url: String, caption: RichText },
    File { url: String, caption: RichText },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNode {
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BlockNode>,
}

impl BlockNode {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: BlockKind, children: Vec<BlockNode>) -> Self {
        Self { kind, children }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph {
            text: vec![TextRun::plain(text)],
        })
    }

    /// Short tag used in logs.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            BlockKind::Paragraph { .. } => "paragraph",
            BlockKind::Heading { .. } => "heading",
            BlockKind::BulletedListItem { .. } => "bulleted_list_item",
            BlockKind::NumberedListItem { .. } => "numbered_list_item",
            BlockKind::ToDo { .. } => "to_do",
            BlockKind::Quote { .. } => "quote",
            BlockKind::Code { .. } => "code",
            BlockKind::Divider => "divider",
            BlockKind::Table { .. } => "table",
            BlockKind::TableRow { .. } => "table_row",
            BlockKind::Callout { .. } => "callout",
            BlockKind::Image { .. } => "image",
            BlockKind::File { .. } => "file",
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self.kind, BlockKind::Table { .. })
    }

    /// Nesting depth of this block's subtree; a childless block has depth 1.
    pub fn depth(&self) -> usize {
        1 + max_depth(&self.children)
    }

    /// The same block with its children removed.
    pub fn without_children(&self) -> BlockNode {
        BlockNode::new(self.kind.clone())
    }

    /// Text runs owned by this block itself (not by its children).
    pub fn text_runs_mut(&mut self) -> Vec<&mut TextRun> {
        match &mut self.kind {
            BlockKind::Paragraph { text }
            | BlockKind::Heading { text, .. }
            | BlockKind::BulletedListItem { text }
            | BlockKind::NumberedListItem { text }
            | BlockKind::ToDo { text, .. }
            | BlockKind::Quote { text }
            | BlockKind::Code { text, .. }
            | BlockKind::Callout { text, .. } => text.iter_mut().collect(),
            BlockKind::Image { caption, .. } | BlockKind::File { caption, .. } => {
                caption.iter_mut().collect()
            }
            BlockKind::TableRow { cells } => cells.iter_mut().flatten().collect(),
            BlockKind::Divider | BlockKind::Table { .. } => Vec::new(),
        }
    }

    /// The paragraph's concatenated text, or `None` for any other kind.
    pub fn paragraph_text(&self) -> Option<String> {
        match &self.kind {
            BlockKind::Paragraph { text } => Some(plain_text(text)),
            _ => None,
        }
    }
}

/// Maximum nesting depth over a sibling list; empty lists have depth 0.
pub fn max_depth(blocks: &[BlockNode]) -> usize {
    blocks.iter().map(BlockNode::depth).max().unwrap_or(0)
}

/// Total number of blocks in a forest, children included.
pub fn count_blocks(blocks: &[BlockNode]) -> usize {
    blocks
        .iter()
        .map(|block| 1 + count_blocks(&block.children))
        .sum()
}
