//! One retry/skip policy shared by the tree walker and the materializer.
//!
//! Remote calls are retried while the remote provably did not apply them, with exponential
//! backoff, and then given up on. What "giving up" means for each class of
//! failure is decided by [`FailurePolicy::disposition`].

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{MigrateError, RemoteError};

/// What the run does after a failure has been logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Replace the failed content with a local stand-in and carry on.
    Recover,
    /// Skip this call or document and continue with the next sibling or subtree.
    Skip,
    /// Stop before walking.
    Halt,
}

/// Where a remote call happens, for logging.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub operation: &'static str,
    pub destination_id: &'a str,
    pub source_path: Option<&'a Path>,
}

impl<'a> CallSite<'a> {
    pub fn new(operation: &'static str, destination_id: &'a str) -> Self {
        Self {
            operation,
            destination_id,
            source_path: None,
        }
    }

    pub fn with_source(mut self, source_path: &'a Path) -> Self {
        self.source_path = Some(source_path);
        self
    }

    fn source_display(&self) -> String {
        self.source_path
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl FailurePolicy {
    /// A policy that never retries; every failure is final.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn disposition(&self, error: &MigrateError) -> Disposition {
        match error {
            MigrateError::Transform { .. } | MigrateError::Asset { .. } => Disposition::Recover,
            MigrateError::RemoteWrite { .. } | MigrateError::Io { .. } => Disposition::Skip,
            MigrateError::Config(_) => Disposition::Halt,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }

    /// Runs `call` until it succeeds, fails permanently or runs out of attempts.
    pub async fn retry<T, F, Fut>(&self, site: CallSite<'_>, mut call: F) -> Result<T, MigrateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = site.operation,
                        destination_id = site.destination_id,
                        source_path = %site.source_display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote call not applied, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(MigrateError::RemoteWrite {
                        operation: site.operation,
                        destination_id: site.destination_id.to_string(),
                        source: e,
                    })
                }
            }
        }
    }

    /// Like [`FailurePolicy::retry`], but logs a final failure and returns `None`
    /// so the caller can continue with the next call.
    pub async fn or_skip<T, F, Fut>(&self, site: CallSite<'_>, call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        match self.retry(site, call).await {
            Ok(value) => Some(value),
            Err(e) => {
                error!(
                    operation = site.operation,
                    destination_id = site.destination_id,
                    source_path = %site.source_display(),
                    disposition = ?self.disposition(&e),
                    error = %e,
                    "Remote call failed, skipping"
                );
                None
            }
        }
    }
}
