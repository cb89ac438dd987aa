//! Table normalization: every row of a table gets the same number of cells and
//! the table declares that width.

use std::path::Path;

use tracing::warn;

use crate::blocks::{BlockKind, BlockNode};

pub const TABLE_FALLBACK_TEXT: &str = "Table conversion failed - invalid format";

/// Normalize every table in `blocks`, at any depth. Returns how many tables
/// were truncated to `max_columns`.
pub fn normalize_tables(blocks: &mut Vec<BlockNode>, max_columns: usize, source_path: &Path) -> usize {
    let mut truncated = 0;
    for block in blocks.iter_mut() {
        if block.is_table() {
            match normalize_table(block, max_columns) {
                Some(was_truncated) => {
                    if was_truncated {
                        warn!(
                            path = %source_path.display(),
                            max_columns,
                            "Table wider than the column limit, truncating"
                        );
                        truncated += 1;
                    }
                }
                None => {
                    warn!(path = %source_path.display(), "Table has no cells, replacing it");
                    *block = BlockNode::paragraph(TABLE_FALLBACK_TEXT);
                }
            }
        } else {
            truncated += normalize_tables(&mut block.children, max_columns, source_path);
        }
    }
    truncated
}

/// `None` when the table has nothing to show; otherwise whether rows were cut.
fn normalize_table(table: &mut BlockNode, max_columns: usize) -> Option<bool> {
    table
        .children
        .retain(|row| matches!(row.kind, BlockKind::TableRow { .. }));

    let widest = table
        .children
        .iter()
        .map(|row| match &row.kind {
            BlockKind::TableRow { cells } => cells.len(),
            _ => 0,
        })
        .max()
        .unwrap_or(0);
    if widest == 0 {
        return None;
    }
    let width = widest.min(max_columns.max(1));

    for row in table.children.iter_mut() {
        if let BlockKind::TableRow { cells } = &mut row.kind {
            cells.truncate(width);
            cells.resize_with(width, Vec::new);
        }
    }
    if let BlockKind::Table { width: declared, .. } = &mut table.kind {
        *declared = width;
    }
    Some(widest > width)
}
