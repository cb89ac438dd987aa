//! Block materializer: writes an arbitrarily nested block tree through the
//! flat, size-bounded append calls of the [`DestinationClient`].
//!
//! One append may carry at most 100 sibling blocks, nested at most two levels
//! deep, and at most 1000 blocks in total. Deeper blocks are appended bare, and
//! their children are appended under the id the destination returns,
//! recursively. Tables travel with their first 100 rows; further rows are
//! appended to the table afterwards.

use std::path::Path;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::blocks::{count_blocks, max_depth, BlockNode};
use crate::client::DestinationClient;
use crate::contract::DocumentApi;
use crate::policy::{CallSite, FailurePolicy};

/// Deepest nesting the destination accepts inside one append call.
pub const MAX_INLINE_DEPTH: usize = 2;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Append calls that succeeded.
    pub calls: usize,
    /// Top-level blocks of successful calls.
    pub blocks_written: usize,
    pub failed_calls: usize,
    /// Children lists dropped because their parent block could not be created.
    pub skipped_subtrees: usize,
}

impl MaterializeReport {
    fn absorb(&mut self, other: MaterializeReport) {
        self.calls += other.calls;
        self.blocks_written += other.blocks_written;
        self.failed_calls += other.failed_calls;
        self.skipped_subtrees += other.skipped_subtrees;
    }
}

pub struct Materializer<'a, A> {
    client: &'a DestinationClient<A>,
    policy: &'a FailurePolicy,
}

impl<'a, A: DocumentApi> Materializer<'a, A> {
    pub fn new(client: &'a DestinationClient<A>, policy: &'a FailurePolicy) -> Self {
        Self { client, policy }
    }

    /// Write `blocks` under `document_id` in document order. Failed calls are
    /// logged and skipped; the rest of the tree is still written.
    pub async fn materialize(
        &self,
        blocks: Vec<BlockNode>,
        document_id: &str,
        source_path: Option<&Path>,
    ) -> MaterializeReport {
        debug!(
            document_id,
            top_level = blocks.len(),
            depth = max_depth(&blocks),
            "Materializing block tree"
        );
        self.write_level(blocks, document_id.to_string(), source_path)
            .await
    }

    fn needs_own_call(&self, block: &BlockNode) -> bool {
        !block.is_table()
            && (block.depth() > MAX_INLINE_DEPTH || block.children.len() > self.client.batch_limit())
    }

    fn is_oversized_table(&self, block: &BlockNode) -> bool {
        block.is_table() && block.children.len() > self.client.batch_limit()
    }

    fn write_level<'b>(
        &'b self,
        blocks: Vec<BlockNode>,
        parent_id: String,
        source_path: Option<&'b Path>,
    ) -> BoxFuture<'b, MaterializeReport> {
        async move {
            let mut report = MaterializeReport::default();
            let limit = self.client.batch_limit();
            let block_limit = self.client.block_limit();

            let mut pending: Vec<BlockNode> = Vec::new();
            let mut pending_blocks = 0;
            for mut block in blocks {
                let oversized_table = self.is_oversized_table(&block);
                if !oversized_table && !self.needs_own_call(&block) {
                    let size = count_blocks(std::slice::from_ref(&block));
                    if pending.len() == limit || pending_blocks + size > block_limit {
                        let batch = std::mem::take(&mut pending);
                        self.flush(&parent_id, batch, source_path, &mut report)
                            .await;
                        pending_blocks = 0;
                    }
                    pending.push(block);
                    pending_blocks += size;
                    continue;
                }

                if !pending.is_empty() {
                    let batch = std::mem::take(&mut pending);
                    self.flush(&parent_id, batch, source_path, &mut report)
                        .await;
                    pending_blocks = 0;
                }

                // A table goes out with as many rows as one call allows; the
                // remaining rows follow under its id. Any other block goes out bare.
                let rest = if oversized_table {
                    block.children.split_off(limit)
                } else {
                    std::mem::take(&mut block.children)
                };
                let kind = block.kind_name();
                let ids = self
                    .flush(&parent_id, vec![block], source_path, &mut report)
                    .await;
                match ids.and_then(|ids| ids.into_iter().next()) {
                    Some(block_id) => {
                        let nested = self.write_level(rest, block_id, source_path).await;
                        report.absorb(nested);
                    }
                    None => {
                        warn!(
                            parent_id = %parent_id,
                            kind,
                            children = rest.len(),
                            "Parent block not created, skipping its children"
                        );
                        report.skipped_subtrees += 1;
                    }
                }
            }

            if !pending.is_empty() {
                self.flush(&parent_id, pending, source_path, &mut report)
                    .await;
            }
            report
        }
        .boxed()
    }

    async fn flush(
        &self,
        parent_id: &str,
        batch: Vec<BlockNode>,
        source_path: Option<&Path>,
        report: &mut MaterializeReport,
    ) -> Option<Vec<String>> {
        let size = batch.len();
        let mut site = CallSite::new("append_blocks", parent_id);
        if let Some(path) = source_path {
            site = site.with_source(path);
        }
        let result = self
            .policy
            .or_skip(site, || self.client.append_blocks(parent_id, batch.clone()))
            .await;
        match &result {
            Some(_) => {
                report.calls += 1;
                report.blocks_written += size;
            }
            None => {
                if let Ok(json) = serde_json::to_string(&batch) {
                    debug!(parent_id, batch = %json, "Skipped batch content");
                }
                report.failed_calls += 1;
            }
        }
        result
    }
}
