//! Attachment rehoming: references into the export's asset directories are
//! uploaded through an [`AssetStore`] and rewritten to the durable URL.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use regex::Regex;
use tracing::{debug, warn};

use crate::contract::{AssetRef, AssetStore};
use crate::error::{AssetError, MigrateError};

/// Builds the pattern matching `[alt](uploads/…)` and `![alt](./public/… "title")`
/// style references for the given asset directories.
pub fn asset_reference_pattern(asset_dirs: &[String]) -> Result<Regex, regex::Error> {
    let dirs = asset_dirs
        .iter()
        .map(|dir| regex::escape(dir.trim_matches('/')))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r#"(!?)\[([^\]]*)\]\(((?:\./|/)?(?:{dirs})/[^)\s]+)(?:\s+"([^"]*)")?\)"#
    ))
}

struct AssetReference {
    start: usize,
    end: usize,
    bang: String,
    alt: String,
    target: String,
    title: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentStats {
    pub rehomed: usize,
    pub failed: usize,
}

/// Where `reference` may live on disk: next to the document first, then in
/// each ancestor directory up to and including `root`.
pub fn candidate_paths(reference: &str, document: &Path, root: &Path) -> Vec<PathBuf> {
    let decoded = percent_decode_str(reference).decode_utf8_lossy();
    let relative = decoded
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string();

    let mut candidates = Vec::new();
    let mut dir = document.parent();
    while let Some(current) = dir {
        candidates.push(current.join(&relative));
        if current == root || !current.starts_with(root) {
            break;
        }
        dir = current.parent();
    }
    candidates
}

async fn locate(reference: &str, document: &Path, root: &Path) -> Result<AssetRef, AssetError> {
    let candidates = candidate_paths(reference, document, root);
    for candidate in &candidates {
        if let Ok(metadata) = tokio::fs::metadata(candidate).await {
            if metadata.is_file() {
                let relative_path = candidate
                    .strip_prefix(root)
                    .unwrap_or(candidate)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                return Ok(AssetRef {
                    local_path: candidate.clone(),
                    relative_path,
                });
            }
        }
    }
    Err(AssetError::Unreadable {
        path: candidates
            .into_iter()
            .next()
            .unwrap_or_else(|| PathBuf::from(reference)),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "asset not found"),
    })
}

/// Rewrite every asset reference in `text` whose file can be found and stored.
/// References that fail keep their original target.
pub async fn rehome_attachments(
    text: &str,
    pattern: &Regex,
    store: &dyn AssetStore,
    document: &Path,
    root: &Path,
) -> (String, AttachmentStats) {
    let mut stats = AttachmentStats::default();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    let references: Vec<AssetReference> = pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(AssetReference {
                start: whole.start(),
                end: whole.end(),
                bang: caps.get(1).map_or("", |m| m.as_str()).to_string(),
                alt: caps.get(2).map_or("", |m| m.as_str()).to_string(),
                target: caps.get(3).map_or("", |m| m.as_str()).to_string(),
                title: caps.get(4).map(|m| m.as_str().to_string()),
            })
        })
        .collect();

    for AssetReference {
        start,
        end,
        bang,
        alt,
        target: reference,
        title,
    } in references
    {
        let stored = match locate(&reference, document, root).await {
            Ok(asset) => store.upload_file(&asset).await,
            Err(e) => Err(e),
        };

        out.push_str(&text[last..start]);
        match stored {
            Ok(url) => {
                stats.rehomed += 1;
                debug!(reference = %reference, url = %url, "Rehomed attachment");
                out.push_str(&format!("{bang}[{alt}]({url}"));
                if let Some(title) = title {
                    out.push_str(&format!(" \"{title}\""));
                }
                out.push(')');
            }
            Err(source) => {
                stats.failed += 1;
                let error = MigrateError::Asset {
                    document: document.to_path_buf(),
                    source,
                };
                warn!(reference = %reference, error = %error, "Attachment left unresolved");
                out.push_str(&text[start..end]);
            }
        }
        last = end;
    }
    out.push_str(&text[last..]);
    (out, stats)
}
