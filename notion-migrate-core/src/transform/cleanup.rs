//! Text passes run before parsing: line cleanup, callout fence isolation and
//! mention folding.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

static CONTINUATION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\*\s*)?\\+\s*$").expect("valid regex"));
static TRIPLE_ASTERISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*\* ").expect("valid regex"));
static HIGHLIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"==([^=]+)==").expect("valid regex"));
static PASSWORD_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)(?:mot\s+de\s+passe|password)\s*[:=]\s*\S+").expect("valid regex"),
        Regex::new(r"(?i)(?:mdp|pwd)\s*[:=]\s*\S+").expect("valid regex"),
    ]
});
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\[([^\]]+)\]\(mention://[^)]*\)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedText {
    pub text: String,
    pub password_warnings: usize,
}

/// Whether `line` looks like it spells out a password value.
pub fn looks_like_password(line: &str) -> bool {
    PASSWORD_PATTERNS.iter().any(|pattern| pattern.is_match(line))
}

/// Drop backslash-only lines, turn a leading `*** ` into `* ** `, strip `==`
/// highlight markers and warn about lines that look like leaked passwords.
pub fn clean_lines(content: &str, source_path: &Path) -> CleanedText {
    let file = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut password_warnings = 0;

    let lines: Vec<String> = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !CONTINUATION_LINE.is_match(line))
        .map(|(number, line)| {
            if looks_like_password(line) {
                password_warnings += 1;
                warn!(
                    file = %file,
                    path = %source_path.display(),
                    line = number + 1,
                    "Possible password detected in document"
                );
            }
            let line = TRIPLE_ASTERISK.replace(line, "* ** ");
            HIGHLIGHT.replace_all(&line, "$1").into_owned()
        })
        .collect();

    CleanedText {
        text: lines.join("\n"),
        password_warnings,
    }
}

/// Put every `:::` fence line outside code blocks into a paragraph of its own,
/// so the parser never merges it with neighbouring text.
pub fn isolate_callout_fences(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_code = false;
    let mut fence_before = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_code = !in_code;
        }
        let is_fence = !in_code && trimmed.starts_with(":::");
        if is_fence {
            if out.last().is_some_and(|prev| !prev.trim().is_empty()) {
                out.push("");
            }
            out.push(trimmed);
            fence_before = true;
            continue;
        }
        if fence_before && !line.trim().is_empty() {
            out.push("");
        }
        fence_before = false;
        out.push(line);
    }
    out.join("\n")
}

/// `@[Name](mention://…)` → `**Name**`.
pub fn fold_mentions(text: &str) -> String {
    MENTION.replace_all(text, "**$1**").into_owned()
}
