//! # contract: collaborator interfaces of the migration engine
//!
//! The engine talks to the outside world through three traits:
//! - [`DocumentApi`]: the remote document hierarchy (create pages, append blocks),
//! - [`AssetStore`]: turns a local attachment into a durable URL,
//! - [`MarkdownParser`]: turns cleaned markdown into a block tree.
//!
//! All are `Send + Sync` and object-safe. `DocumentApi` and `AssetStore` are
//! annotated for `mockall`, so tests (and downstream crates with the
//! `test-export-mocks` feature) get `MockDocumentApi` / `MockAssetStore`.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use std::path::PathBuf;

use crate::blocks::BlockNode;
use crate::error::{AssetError, ParseError, RemoteError};

/// A document created in the destination hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDocument {
    pub id: String,
    pub url: String,
}

/// Raw remote operations. Implementations perform exactly one request per call
/// and never retry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Create a page titled `title` under `parent_id`.
    async fn create_page(
        &self,
        parent_id: &str,
        title: &str,
    ) -> Result<CreatedDocument, RemoteError>;

    /// Append `blocks` (with whatever children they carry) under `block_id`,
    /// returning the ids of the created top-level blocks in order.
    async fn append_children(
        &self,
        block_id: &str,
        blocks: Vec<BlockNode>,
    ) -> Result<Vec<String>, RemoteError>;
}

/// A local attachment referenced from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// Absolute path of the file on disk.
    pub local_path: PathBuf,
    /// Path relative to the migration root, with `/` separators.
    pub relative_path: String,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Make the asset durably reachable and return its URL.
    async fn upload_file(&self, asset: &AssetRef) -> Result<String, AssetError>;
}

/// Markdown → block tree. Pure; may reject input.
pub trait MarkdownParser: Send + Sync {
    fn parse(&self, markdown: &str) -> Result<Vec<BlockNode>, ParseError>;
}
