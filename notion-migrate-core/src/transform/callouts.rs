//! Folds `:::kind … :::` paragraph fences into callout blocks.

use std::path::Path;

use tracing::warn;

use crate::blocks::{BlockKind, BlockNode, TextRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalloutStyle {
    pub icon: &'static str,
    pub color: &'static str,
}

pub fn callout_style(kind: &str) -> Option<CalloutStyle> {
    let (icon, color) = match kind {
        "info" => ("ℹ️", "blue_background"),
        "tip" => ("💡", "yellow_background"),
        "warning" => ("⚠️", "orange_background"),
        "success" => ("✅", "green_background"),
        _ => return None,
    };
    Some(CalloutStyle { icon, color })
}

const KINDS: [&str; 4] = ["info", "tip", "warning", "success"];

/// If `text` opens a callout, its style and the text following the kind.
///
/// The kind is matched as a prefix, so `:::infobox Title` opens an info
/// callout whose text is `box Title`.
fn opening(text: &str) -> Option<(CalloutStyle, String)> {
    let rest = text.trim().strip_prefix(":::")?;
    let kind = KINDS.into_iter().find(|kind| rest.starts_with(kind))?;
    let style = callout_style(kind)?;
    Some((style, rest[kind.len()..].trim().to_string()))
}

fn is_closing(text: &str) -> bool {
    text.trim() == ":::"
}

struct OpenCallout {
    style: CalloutStyle,
    text: String,
    children: Vec<BlockNode>,
}

impl OpenCallout {
    fn into_block(self) -> BlockNode {
        let text = if self.text.is_empty() {
            Vec::new()
        } else {
            vec![TextRun::plain(self.text)]
        };
        BlockNode::with_children(
            BlockKind::Callout {
                text,
                icon: self.style.icon.to_string(),
                color: self.style.color.to_string(),
            },
            self.children,
        )
    }
}

/// Fold top-level fence paragraphs into callouts. A callout still open at the
/// end of the document keeps every remaining block.
pub fn fold_callouts(blocks: Vec<BlockNode>, source_path: &Path) -> Vec<BlockNode> {
    let mut out = Vec::with_capacity(blocks.len());
    let mut current: Option<OpenCallout> = None;

    for block in blocks {
        let text = block.paragraph_text();
        if let Some((style, text)) = text.as_deref().and_then(opening) {
            if let Some(open) = current.take() {
                warn!(path = %source_path.display(), "Callout opened before the previous one was closed");
                out.push(open.into_block());
            }
            current = Some(OpenCallout {
                style,
                text,
                children: Vec::new(),
            });
            continue;
        }
        if text.as_deref().is_some_and(is_closing) {
            match current.take() {
                Some(open) => out.push(open.into_block()),
                None => warn!(path = %source_path.display(), "Dropping stray callout fence"),
            }
            continue;
        }
        match current.as_mut() {
            Some(open) => open.children.push(block),
            None => out.push(block),
        }
    }

    if let Some(open) = current {
        warn!(
            path = %source_path.display(),
            absorbed = open.children.len(),
            "Callout never closed, keeping the rest of the document inside it"
        );
        out.push(open.into_block());
    }
    out
}
