//! Destination client: the three write operations the migration needs, each
//! routed through the [`Scheduler`] under the id of the document it writes to.
//!
//! Failures come back exactly as the [`DocumentApi`] reported them. Nothing here
//! retries; see [`crate::policy::FailurePolicy`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::blocks::{count_blocks, BlockNode};
use crate::contract::{CreatedDocument, DocumentApi};
use crate::error::RemoteError;
use crate::scheduler::Scheduler;

/// Largest sibling batch the destination accepts in one append.
pub const MAX_BATCH_BLOCKS: usize = 100;
/// Largest number of blocks, nested ones included, in one append request.
pub const MAX_BLOCKS_PER_CALL: usize = 1000;

pub struct DestinationClient<A> {
    api: Arc<A>,
    scheduler: Scheduler,
    batch_limit: usize,
    block_limit: usize,
}

impl<A> Clone for DestinationClient<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            scheduler: self.scheduler.clone(),
            batch_limit: self.batch_limit,
            block_limit: self.block_limit,
        }
    }
}

impl<A: DocumentApi> DestinationClient<A> {
    pub fn new(api: A, scheduler: Scheduler) -> Self {
        Self {
            api: Arc::new(api),
            scheduler,
            batch_limit: MAX_BATCH_BLOCKS,
            block_limit: MAX_BLOCKS_PER_CALL,
        }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    pub fn block_limit(&self) -> usize {
        self.block_limit
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Create the document standing for a source folder.
    pub async fn create_folder_document(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<CreatedDocument, RemoteError> {
        let created = self
            .scheduler
            .submit(parent_id, self.api.create_page(parent_id, name))
            .await?;
        info!(folder = name, parent_id, id = %created.id, "Created folder document");
        Ok(created)
    }

    /// Create an empty placeholder document for a source leaf file.
    pub async fn create_empty_document(
        &self,
        title: &str,
        parent_id: &str,
    ) -> Result<CreatedDocument, RemoteError> {
        let created = self
            .scheduler
            .submit(parent_id, self.api.create_page(parent_id, title))
            .await?;
        info!(title, parent_id, id = %created.id, "Created empty document");
        Ok(created)
    }

    /// Append one batch of sibling blocks under `document_id`.
    pub async fn append_blocks(
        &self,
        document_id: &str,
        blocks: Vec<BlockNode>,
    ) -> Result<Vec<String>, RemoteError> {
        if blocks.len() > self.batch_limit {
            return Err(RemoteError::BatchTooLarge {
                size: blocks.len(),
                limit: self.batch_limit,
            });
        }
        let total = count_blocks(&blocks);
        if total > self.block_limit {
            return Err(RemoteError::BatchTooLarge {
                size: total,
                limit: self.block_limit,
            });
        }
        let size = blocks.len();
        let ids = self
            .scheduler
            .submit(document_id, self.api.append_children(document_id, blocks))
            .await?;
        debug!(document_id, blocks = size, "Appended block batch");
        Ok(ids)
    }
}
