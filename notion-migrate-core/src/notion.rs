//! HTTP implementation of [`DocumentApi`] against the Notion REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::blocks::{BlockKind, BlockNode, TextRun};
use crate::contract::{CreatedDocument, DocumentApi};
use crate::error::RemoteError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";
/// Longest `text.content` Notion accepts in one rich text object.
pub const MAX_TEXT_CHARS: usize = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const CODE_LANGUAGES: &[&str] = &[
    "abap", "arduino", "bash", "basic", "c", "clojure", "coffeescript", "c++", "c#", "css",
    "dart", "diff", "docker", "elixir", "elm", "erlang", "flow", "fortran", "f#", "gherkin",
    "glsl", "go", "graphql", "groovy", "haskell", "html", "java", "javascript", "json", "julia",
    "kotlin", "latex", "less", "lisp", "livescript", "lua", "makefile", "markdown", "markup",
    "matlab", "mermaid", "nix", "objective-c", "ocaml", "pascal", "perl", "php", "plain text",
    "powershell", "prolog", "protobuf", "python", "r", "reason", "ruby", "rust", "sass", "scala",
    "scheme", "scss", "shell", "sql", "swift", "typescript", "vb.net", "verilog", "vhdl",
    "visual basic", "webassembly", "xml", "yaml",
];

/// Map a fenced-code info string onto a language Notion knows.
pub fn code_language(info: &str) -> &'static str {
    let lower = info.trim().to_ascii_lowercase();
    let alias = match lower.as_str() {
        "js" | "jsx" | "node" => "javascript",
        "ts" | "tsx" => "typescript",
        "sh" | "zsh" | "console" => "shell",
        "py" => "python",
        "rb" => "ruby",
        "rs" => "rust",
        "yml" => "yaml",
        "md" => "markdown",
        "cpp" | "cc" | "hpp" => "c++",
        "cs" | "csharp" => "c#",
        "dockerfile" => "docker",
        "golang" => "go",
        "ps1" => "powershell",
        "proto" => "protobuf",
        "kt" => "kotlin",
        other => other,
    };
    CODE_LANGUAGES
        .iter()
        .find(|known| **known == alias)
        .copied()
        .unwrap_or("plain text")
}

fn rich_text(runs: &[TextRun]) -> Value {
    let mut out = Vec::new();
    for run in runs {
        let chars: Vec<char> = run.content.chars().collect();
        for chunk in chars.chunks(MAX_TEXT_CHARS) {
            let content: String = chunk.iter().collect();
            let link = run.link.as_ref().map(|url| json!({ "url": url }));
            out.push(json!({
                "type": "text",
                "text": { "content": content, "link": link },
                "annotations": {
                    "bold": run.annotations.bold,
                    "italic": run.annotations.italic,
                    "strikethrough": run.annotations.strikethrough,
                    "underline": false,
                    "code": run.annotations.code,
                    "color": "default",
                },
            }));
        }
    }
    Value::Array(out)
}

/// The Notion block object for `block`, children included.
pub fn to_notion_block(block: &BlockNode) -> Value {
    let (kind, mut body) = match &block.kind {
        BlockKind::Paragraph { text } => ("paragraph", json!({ "rich_text": rich_text(text) })),
        BlockKind::Heading { level, text } => {
            let kind = match level {
                0 | 1 => "heading_1",
                2 => "heading_2",
                _ => "heading_3",
            };
            (kind, json!({ "rich_text": rich_text(text) }))
        }
        BlockKind::BulletedListItem { text } => {
            ("bulleted_list_item", json!({ "rich_text": rich_text(text) }))
        }
        BlockKind::NumberedListItem { text } => {
            ("numbered_list_item", json!({ "rich_text": rich_text(text) }))
        }
        BlockKind::ToDo { text, checked } => (
            "to_do",
            json!({ "rich_text": rich_text(text), "checked": checked }),
        ),
        BlockKind::Quote { text } => ("quote", json!({ "rich_text": rich_text(text) })),
        BlockKind::Code { text, language } => (
            "code",
            json!({ "rich_text": rich_text(text), "language": code_language(language) }),
        ),
        BlockKind::Divider => ("divider", json!({})),
        BlockKind::Table {
            width,
            has_column_header,
        } => (
            "table",
            json!({
                "table_width": width,
                "has_column_header": has_column_header,
                "has_row_header": false,
            }),
        ),
        BlockKind::TableRow { cells } => {
            let cells: Vec<Value> = cells.iter().map(|cell| rich_text(cell)).collect();
            ("table_row", json!({ "cells": cells }))
        }
        BlockKind::Callout { text, icon, color } => (
            "callout",
            json!({
                "rich_text": rich_text(text),
                "icon": { "type": "emoji", "emoji": icon },
                "color": color,
            }),
        ),
        BlockKind::Image { url, caption } => (
            "image",
            json!({ "type": "external", "external": { "url": url }, "caption": rich_text(caption) }),
        ),
        BlockKind::File { url, caption } => (
            "file",
            json!({ "type": "external", "external": { "url": url }, "caption": rich_text(caption) }),
        ),
    };

    if !block.children.is_empty() {
        let children: Vec<Value> = block.children.iter().map(to_notion_block).collect();
        body["children"] = Value::Array(children);
    }

    let mut object = serde_json::Map::new();
    object.insert("object".into(), json!("block"));
    object.insert("type".into(), json!(kind));
    object.insert(kind.to_string(), body);
    Value::Object(object)
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockListResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotionClient {
    http: Client,
    base_url: String,
    token: String,
}

impl NotionClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, RemoteError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        info!(base_url = %base_url, "Initialized Notion client");
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, RemoteError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => (err.code, err.message),
                Err(_) => ("unknown".to_string(), body),
            };
            return Err(RemoteError::Status {
                status: status.as_u16(),
                code,
                message,
            });
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// Every child block of `block_id`, following pagination.
    pub async fn list_children(&self, block_id: &str) -> Result<Vec<Value>, RemoteError> {
        let url = format!("{}/blocks/{}/children", self.base_url, block_id);
        let mut children = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut request = self.http.get(&url).query(&[("page_size", "100")]);
            if let Some(cursor) = &cursor {
                request = request.query(&[("start_cursor", cursor.as_str())]);
            }
            let page: BlockListResponse = serde_json::from_value(self.send(request).await?)
                .map_err(|e| RemoteError::Decode(e.to_string()))?;
            children.extend(page.results);
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(children)
    }
}

#[async_trait]
impl DocumentApi for NotionClient {
    async fn create_page(
        &self,
        parent_id: &str,
        title: &str,
    ) -> Result<CreatedDocument, RemoteError> {
        let body = json!({
            "parent": { "page_id": parent_id },
            "properties": {
                "title": { "title": [{ "text": { "content": title } }] }
            },
        });
        let value = self
            .send(self.http.post(format!("{}/pages", self.base_url)).json(&body))
            .await?;
        let page: PageResponse =
            serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))?;
        let url = page
            .url
            .unwrap_or_else(|| format!("https://www.notion.so/{}", page.id.replace('-', "")));
        debug!(parent_id, title, id = %page.id, "Notion page created");
        Ok(CreatedDocument { id: page.id, url })
    }

    async fn append_children(
        &self,
        block_id: &str,
        blocks: Vec<BlockNode>,
    ) -> Result<Vec<String>, RemoteError> {
        let children: Vec<Value> = blocks.iter().map(to_notion_block).collect();
        let value = self
            .send(
                self.http
                    .patch(format!("{}/blocks/{}/children", self.base_url, block_id))
                    .json(&json!({ "children": children })),
            )
            .await?;
        let listed: BlockListResponse =
            serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))?;
        listed
            .results
            .iter()
            .map(|block| {
                block
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| RemoteError::Decode("appended block without id".into()))
            })
            .collect()
    }
}
