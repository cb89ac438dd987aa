//! # transform: one source document's text → a block tree ready to write
//!
//! [`Transformer::transform`] runs, in order:
//! 1. line cleanup (and callout fence isolation),
//! 2. mention folding,
//! 3. attachment rehoming through the [`AssetStore`],
//! 4. internal link resolution against the [`LocationMap`],
//! 5. markdown parsing through the [`MarkdownParser`],
//! 6. callout folding,
//! 7. table normalization,
//! 8. removal of hyperlinks the destination would reject.
//!
//! Only step 5 can fail. When it does, the document is replaced by a single
//! paragraph describing the failure.

pub mod attachments;
pub mod callouts;
pub mod cleanup;
pub mod links;
pub mod tables;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::blocks::BlockNode;
use crate::contract::{AssetStore, MarkdownParser};
use crate::error::MigrateError;
use crate::location::LocationMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Export directories holding attachments.
    #[serde(default = "default_asset_dirs")]
    pub asset_dirs: Vec<String>,
    /// Domain of the exporting site; links containing it are treated as internal.
    #[serde(default)]
    pub origin_domain: Option<String>,
    #[serde(default = "default_max_table_columns")]
    pub max_table_columns: usize,
}

pub fn default_asset_dirs() -> Vec<String> {
    vec!["uploads".to_string(), "public".to_string()]
}

fn default_max_table_columns() -> usize {
    100
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            asset_dirs: default_asset_dirs(),
            origin_domain: None,
            max_table_columns: default_max_table_columns(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformStats {
    pub links_resolved: usize,
    pub links_unresolved: usize,
    pub assets_rehomed: usize,
    pub assets_failed: usize,
    pub password_warnings: usize,
    pub tables_truncated: usize,
    pub links_stripped: usize,
    /// The parser failed and the stub paragraph was used instead.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub blocks: Vec<BlockNode>,
    pub stats: TransformStats,
}

pub struct Transformer {
    parser: Arc<dyn MarkdownParser>,
    assets: Arc<dyn AssetStore>,
    root: PathBuf,
    config: TransformConfig,
    asset_pattern: Regex,
}

impl Transformer {
    pub fn new(
        parser: Arc<dyn MarkdownParser>,
        assets: Arc<dyn AssetStore>,
        root: impl Into<PathBuf>,
        config: TransformConfig,
    ) -> Result<Self, MigrateError> {
        let asset_pattern = attachments::asset_reference_pattern(&config.asset_dirs)
            .map_err(|e| MigrateError::Config(format!("invalid asset directories: {e}")))?;
        Ok(Self {
            parser,
            assets,
            root: root.into(),
            config,
            asset_pattern,
        })
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub async fn transform(
        &self,
        raw: &str,
        source_path: &Path,
        map: &LocationMap,
    ) -> TransformOutput {
        let mut stats = TransformStats::default();

        let cleaned = cleanup::clean_lines(raw, source_path);
        stats.password_warnings = cleaned.password_warnings;
        let text = cleanup::isolate_callout_fences(&cleaned.text);
        let text = cleanup::fold_mentions(&text);

        let (text, assets) = attachments::rehome_attachments(
            &text,
            &self.asset_pattern,
            self.assets.as_ref(),
            source_path,
            &self.root,
        )
        .await;
        stats.assets_rehomed = assets.rehomed;
        stats.assets_failed = assets.failed;

        let (text, links) = links::resolve_links(
            &text,
            source_path,
            map,
            self.config.origin_domain.as_deref(),
            &self.config.asset_dirs,
        );
        stats.links_resolved = links.resolved;
        stats.links_unresolved = links.unresolved;

        let blocks = match self.parser.parse(&text) {
            Ok(blocks) => blocks,
            Err(source) => {
                let error = MigrateError::Transform {
                    path: source_path.to_path_buf(),
                    source,
                };
                error!(path = %source_path.display(), error = %error, "Falling back to a stub document");
                stats.fallback = true;
                return TransformOutput {
                    blocks: vec![fallback_block(&error)],
                    stats,
                };
            }
        };

        let mut blocks = callouts::fold_callouts(blocks, source_path);
        stats.tables_truncated =
            tables::normalize_tables(&mut blocks, self.config.max_table_columns, source_path);
        stats.links_stripped = links::strip_invalid_links(&mut blocks);

        debug!(path = %source_path.display(), blocks = blocks.len(), ?stats, "Transformed document");
        TransformOutput { blocks, stats }
    }
}

fn fallback_block(error: &MigrateError) -> BlockNode {
    let message = match error {
        MigrateError::Transform { source, .. } => source.0.clone(),
        other => other.to_string(),
    };
    BlockNode::paragraph(format!("Error converting content: {message}"))
}
