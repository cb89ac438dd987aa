//! Internal link rewriting and final link validation.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, warn};
use url::Url;

use crate::blocks::{plain_text, BlockKind, BlockNode, TextRun};
use crate::location::LocationMap;

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"));

const ALLOWED_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub resolved: usize,
    pub unresolved: usize,
}

/// Whether `url` points at another document of the export.
pub fn is_internal_link(url: &str, origin_domain: Option<&str>) -> bool {
    if origin_domain.is_some_and(|domain| !domain.is_empty() && url.contains(domain)) {
        return true;
    }
    url.starts_with("./") || url.starts_with('/')
}

/// Turn an internal link target into a root-relative path comparable with the
/// keys of a [`LocationMap`]. Query strings and fragments are dropped.
pub fn normalize_link_path(url: &str, current_file: &Path, origin_domain: Option<&str>) -> String {
    if origin_domain.is_some_and(|domain| !domain.is_empty() && url.contains(domain)) {
        if let Ok(parsed) = Url::parse(url) {
            return normalize_segments(parsed.path());
        }
    }

    let target = url.split(['#', '?']).next().unwrap_or_default();
    if target.starts_with('/') {
        return normalize_segments(target);
    }

    let base = current_file
        .parent()
        .map(|dir| dir.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    normalize_segments(&format!("{base}/{target}"))
}

/// Lexically resolve `.` and `..` segments, keeping a leading `/`.
fn normalize_segments(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Whether `url` references a file under one of the export's asset
/// directories rather than a document.
pub fn is_asset_target(url: &str, asset_dirs: &[String]) -> bool {
    let target = url.strip_prefix("./").unwrap_or(url).trim_start_matches('/');
    asset_dirs.iter().any(|dir| {
        let dir = dir.trim_matches('/');
        !dir.is_empty()
            && target
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Rewrite every non-image internal link in `text` to the destination URL of
/// the document it points at. Links that cannot be resolved become literal
/// text naming the original target. Links into `asset_dirs` are attachments
/// and are left as they are.
pub fn resolve_links(
    text: &str,
    current_file: &Path,
    map: &LocationMap,
    origin_domain: Option<&str>,
    asset_dirs: &[String],
) -> (String, LinkStats) {
    let mut stats = LinkStats::default();
    let rewritten = MARKDOWN_LINK.replace_all(text, |caps: &Captures<'_>| {
        let whole = caps[0].to_string();
        if !caps[1].is_empty() {
            return whole;
        }
        let label = &caps[2];
        let url = caps[3].trim();
        if !is_internal_link(url, origin_domain) || is_asset_target(url, asset_dirs) {
            return whole;
        }

        let normalized = normalize_link_path(url, current_file, origin_domain);
        match map.find_by_link_path(&normalized) {
            Some(location) => {
                stats.resolved += 1;
                debug!(link = url, target = %location.url, "Resolved internal link");
                format!("[{label}]({})", location.url)
            }
            None => {
                stats.unresolved += 1;
                warn!(
                    link = url,
                    normalized = %normalized,
                    path = %current_file.display(),
                    "Internal link could not be resolved"
                );
                format!("{label} - {url} - link could not be rebuilt during the migration")
            }
        }
    });
    (rewritten.into_owned(), stats)
}

/// Whether the destination will accept `url` as a hyperlink.
pub fn is_valid_link(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| ALLOWED_SCHEMES.contains(&parsed.scheme()))
        .unwrap_or(false)
}

/// Drop hyperlinks that are not absolute http(s)/mailto URLs, keeping the text.
/// Media blocks with such a URL become a paragraph naming it. Returns how many
/// links were removed.
pub fn strip_invalid_links(blocks: &mut [BlockNode]) -> usize {
    let mut stripped = 0;
    for block in blocks.iter_mut() {
        if let BlockKind::Image { url, caption } | BlockKind::File { url, caption } = &block.kind {
            if !is_valid_link(url) {
                let caption = plain_text(caption);
                let text = if caption.is_empty() {
                    url.clone()
                } else {
                    format!("{caption} ({url})")
                };
                debug!(url = %url, "Replacing media block with an unusable URL");
                block.kind = BlockKind::Paragraph {
                    text: vec![TextRun::plain(text)],
                };
                stripped += 1;
            }
        }
        for run in block.text_runs_mut() {
            if run.link.as_deref().is_some_and(|link| !is_valid_link(link)) {
                debug!(link = ?run.link, "Removing invalid link");
                run.link = None;
                stripped += 1;
            }
        }
        stripped += strip_invalid_links(&mut block.children);
    }
    stripped
}
