//! Two-phase migration of an export tree into the destination hierarchy.
//!
//! # Phases
//! 1. [`TreeWalker::create_placeholders`] creates one document per folder and one
//!    empty document per markdown file, recording each in the location map. A
//!    folder's document always exists before anything inside it is created.
//! 2. [`TreeWalker::fill_documents`] walks the tree again and writes every
//!    document's content. Every document now has an id, so links between
//!    documents can be resolved no matter where they point.
//!
//! Siblings are processed concurrently on the current task. Failures are logged
//! and skipped according to the [`FailurePolicy`]; only configuration problems
//! stop a run.
//!
//! # Navigation
//! - Main entrypoint: [`TreeWalker::migrate`]
//! - Supporting types: [`MigrationReport`], [`count_documents`].

use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::client::DestinationClient;
use crate::contract::DocumentApi;
use crate::error::MigrateError;
use crate::location::{Location, LocationMap, LocationMapBuilder};
use crate::materialize::Materializer;
use crate::policy::{CallSite, FailurePolicy};
use crate::transform::Transformer;

/// Window over which progress events report throughput.
const THROUGHPUT_PERIOD: Duration = Duration::from_secs(60);

/// Totals of one run, printed by the CLI at the end.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub folders_created: usize,
    pub documents_created: usize,
    pub creation_failures: usize,
    pub documents_filled: usize,
    pub documents_skipped: usize,
    pub append_calls: usize,
    pub append_failures: usize,
    pub transform_fallbacks: usize,
    pub links_resolved: usize,
    pub links_unresolved: usize,
    pub assets_rehomed: usize,
    pub assets_failed: usize,
    pub password_warnings: usize,
}

impl AddAssign for MigrationReport {
    fn add_assign(&mut self, other: Self) {
        self.folders_created += other.folders_created;
        self.documents_created += other.documents_created;
        self.creation_failures += other.creation_failures;
        self.documents_filled += other.documents_filled;
        self.documents_skipped += other.documents_skipped;
        self.append_calls += other.append_calls;
        self.append_failures += other.append_failures;
        self.transform_fallbacks += other.transform_fallbacks;
        self.links_resolved += other.links_resolved;
        self.links_unresolved += other.links_unresolved;
        self.assets_rehomed += other.assets_rehomed;
        self.assets_failed += other.assets_failed;
        self.password_warnings += other.password_warnings;
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "md")
}

fn is_asset_dir(name: &str, asset_dirs: &[String]) -> bool {
    asset_dirs.iter().any(|dir| dir.trim_matches('/') == name)
}

/// Number of markdown documents under `root`, asset directories excluded.
pub fn count_documents(root: &Path, asset_dirs: &[String]) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !is_asset_dir(&entry.file_name().to_string_lossy(), asset_dirs)
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry while counting documents");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_markdown(entry.path()))
        .count()
}

#[derive(Debug, Default)]
struct DirListing {
    folders: Vec<(String, PathBuf)>,
    documents: Vec<PathBuf>,
}

/// Folders (asset directories excluded) and markdown files directly in `dir`,
/// sorted by name.
async fn list_dir(dir: &Path, asset_dirs: &[String]) -> Result<DirListing, MigrateError> {
    let io_error = |source| MigrateError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut listing = DirListing::default();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type().await.map_err(io_error)?;
        if file_type.is_dir() {
            if is_asset_dir(&name, asset_dirs) {
                continue;
            }
            listing.folders.push((name, path));
        } else if file_type.is_file() && is_markdown(&path) {
            listing.documents.push(path);
        }
    }
    listing.folders.sort();
    listing.documents.sort();
    Ok(listing)
}

pub struct TreeWalker<A> {
    client: DestinationClient<A>,
    transformer: Transformer,
    policy: FailurePolicy,
    root: PathBuf,
}

impl<A: DocumentApi> TreeWalker<A> {
    pub fn new(
        client: DestinationClient<A>,
        transformer: Transformer,
        policy: FailurePolicy,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            transformer,
            policy,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn asset_dirs(&self) -> &[String] {
        &self.transformer.config().asset_dirs
    }

    /// Run both phases under `destination_id`.
    pub async fn migrate(&self, destination_id: &str) -> Result<MigrationReport, MigrateError> {
        if destination_id.trim().is_empty() {
            return Err(MigrateError::Config(
                "destination page id must not be empty".into(),
            ));
        }
        if !self.root.is_dir() {
            return Err(MigrateError::Config(format!(
                "migration root {} is not a directory",
                self.root.display()
            )));
        }

        let total = count_documents(&self.root, self.asset_dirs());
        info!(root = %self.root.display(), destination_id, total, "[MIGRATE] Starting migration");

        let (map, mut report) = self.create_placeholders(destination_id).await;
        info!(
            folders = report.folders_created,
            documents = report.documents_created,
            failures = report.creation_failures,
            "[MIGRATE] Phase 1 complete: placeholders created"
        );

        report += self.fill_documents(&map, total).await;
        info!(?report, "[MIGRATE] Migration complete");
        Ok(report)
    }

    /// Phase 1: create every destination document and record where it lives.
    pub async fn create_placeholders(&self, destination_id: &str) -> (LocationMap, MigrationReport) {
        let builder = LocationMapBuilder::new();
        let report = self
            .create_level(self.root.clone(), destination_id.to_string(), &builder)
            .await;
        (builder.freeze(), report)
    }

    fn create_level<'a>(
        &'a self,
        dir: PathBuf,
        parent_id: String,
        builder: &'a LocationMapBuilder,
    ) -> BoxFuture<'a, MigrationReport> {
        async move {
            let mut report = MigrationReport::default();
            let listing = match list_dir(&dir, self.asset_dirs()).await {
                Ok(listing) => listing,
                Err(e) => {
                    error!(
                        path = %dir.display(),
                        disposition = ?self.policy.disposition(&e),
                        error = %e,
                        "Failed to list directory, skipping it"
                    );
                    return report;
                }
            };

            let folder_files: Vec<PathBuf> = listing
                .folders
                .iter()
                .map(|(name, _)| dir.join(format!("{name}.md")))
                .collect();

            let mut work: Vec<BoxFuture<'a, MigrationReport>> = Vec::new();
            for (name, path) in listing.folders {
                let key = dir.join(format!("{name}.md"));
                work.push(self.create_folder(name, path, key, parent_id.clone(), builder));
            }
            for path in listing.documents {
                if folder_files.contains(&path) {
                    continue;
                }
                work.push(self.create_document(path, parent_id.clone(), builder));
            }

            for sibling in join_all(work).await {
                report += sibling;
            }
            report
        }
        .boxed()
    }

    fn create_folder<'a>(
        &'a self,
        name: String,
        path: PathBuf,
        key: PathBuf,
        parent_id: String,
        builder: &'a LocationMapBuilder,
    ) -> BoxFuture<'a, MigrationReport> {
        async move {
            let mut report = MigrationReport::default();
            let site = CallSite::new("create_folder_document", &parent_id).with_source(&path);
            let created = self
                .policy
                .retry(site, || self.client.create_folder_document(&name, &parent_id))
                .await;
            let children_parent = match created {
                Ok(doc) => {
                    report.folders_created += 1;
                    builder.insert(
                        key,
                        Location {
                            destination_id: doc.id.clone(),
                            title: name.clone(),
                            url: doc.url,
                        },
                    );
                    doc.id
                }
                Err(e) => {
                    report.creation_failures += 1;
                    error!(
                        folder = %name,
                        path = %path.display(),
                        parent_id = %parent_id,
                        disposition = ?self.policy.disposition(&e),
                        error = %e,
                        "Failed to create folder document, using its parent instead"
                    );
                    parent_id.clone()
                }
            };
            report += self.create_level(path, children_parent, builder).await;
            report
        }
        .boxed()
    }

    fn create_document<'a>(
        &'a self,
        path: PathBuf,
        parent_id: String,
        builder: &'a LocationMapBuilder,
    ) -> BoxFuture<'a, MigrationReport> {
        async move {
            let mut report = MigrationReport::default();
            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let site = CallSite::new("create_empty_document", &parent_id).with_source(&path);
            let created = self
                .policy
                .or_skip(site, || self.client.create_empty_document(&title, &parent_id))
                .await;
            match created {
                Some(doc) => {
                    report.documents_created += 1;
                    builder.insert(
                        path,
                        Location {
                            destination_id: doc.id,
                            title,
                            url: doc.url,
                        },
                    );
                }
                None => report.creation_failures += 1,
            }
            report
        }
        .boxed()
    }

    /// Phase 2: transform and write the content of every mapped document.
    pub async fn fill_documents(&self, map: &LocationMap, total: usize) -> MigrationReport {
        let processed = AtomicUsize::new(0);
        self.fill_level(self.root.clone(), map, &processed, total)
            .await
    }

    fn fill_level<'a>(
        &'a self,
        dir: PathBuf,
        map: &'a LocationMap,
        processed: &'a AtomicUsize,
        total: usize,
    ) -> BoxFuture<'a, MigrationReport> {
        async move {
            let mut report = MigrationReport::default();
            let listing = match list_dir(&dir, self.asset_dirs()).await {
                Ok(listing) => listing,
                Err(e) => {
                    error!(
                        path = %dir.display(),
                        disposition = ?self.policy.disposition(&e),
                        error = %e,
                        "Failed to list directory, skipping it"
                    );
                    return report;
                }
            };

            let mut work: Vec<BoxFuture<'a, MigrationReport>> = Vec::new();
            for path in listing.documents {
                work.push(self.fill_document(path, map, processed, total));
            }
            for (_, path) in listing.folders {
                work.push(self.fill_level(path, map, processed, total));
            }
            for sibling in join_all(work).await {
                report += sibling;
            }
            report
        }
        .boxed()
    }

    fn fill_document<'a>(
        &'a self,
        path: PathBuf,
        map: &'a LocationMap,
        processed: &'a AtomicUsize,
        total: usize,
    ) -> BoxFuture<'a, MigrationReport> {
        async move {
            let mut report = MigrationReport::default();
            let Some(location) = map.get(&path) else {
                warn!(path = %path.display(), "No destination document for file, skipping");
                report.documents_skipped += 1;
                self.progress(&path, processed, total);
                return report;
            };

            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(source) => {
                    let e = MigrateError::Io {
                        path: path.clone(),
                        source,
                    };
                    error!(
                        path = %path.display(),
                        destination_id = %location.destination_id,
                        disposition = ?self.policy.disposition(&e),
                        error = %e,
                        "Failed to read document, skipping"
                    );
                    report.documents_skipped += 1;
                    self.progress(&path, processed, total);
                    return report;
                }
            };

            let output = self.transformer.transform(&raw, &path, map).await;
            report.links_resolved += output.stats.links_resolved;
            report.links_unresolved += output.stats.links_unresolved;
            report.assets_rehomed += output.stats.assets_rehomed;
            report.assets_failed += output.stats.assets_failed;
            report.password_warnings += output.stats.password_warnings;
            if output.stats.fallback {
                report.transform_fallbacks += 1;
            }

            let written = Materializer::new(&self.client, &self.policy)
                .materialize(output.blocks, &location.destination_id, Some(&path))
                .await;
            report.append_calls += written.calls;
            report.append_failures += written.failed_calls;
            report.documents_filled += 1;

            self.progress(&path, processed, total);
            report
        }
        .boxed()
    }

    fn progress(&self, path: &Path, processed: &AtomicUsize, total: usize) {
        let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
        let percent = if total == 0 {
            100.0
        } else {
            done as f64 * 100.0 / total as f64
        };
        info!(
            path = %path.display(),
            processed = done,
            total,
            percent = %format!("{percent:.1}"),
            calls_per_sec = %format!("{:.2}", self.client.scheduler().throughput(THROUGHPUT_PERIOD)),
            "[MIGRATE] Document processed"
        );
    }
}
