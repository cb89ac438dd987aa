///
/// This module implements the CLI interface for notion-migrate: command parsing,
/// wiring the core engine to its HTTP collaborators, and user-visible output.
///
/// All migration logic (scheduling, transformation, materialization, the tree walk)
/// lives in the [`notion-migrate-core`] crate. This module is strictly CLI glue.
///
/// ## Subcommands
/// - `migrate`: run both phases of a migration from a YAML config
/// - `count`: print how many documents a migration of a directory would process
/// - `inspect`: print the children of a destination page as JSON
///
/// ## How To Use
/// - For command-line users: use the installed `notion-migrate` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`notion-migrate-core`]: ../../notion-migrate-core/
use crate::load_config::{apply_overrides, load_config, load_secrets, validate, Secrets};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use notion_migrate_core::assets::{AssetMode, DisabledAssetStore, OriginBucketStore, S3AssetStore};
use notion_migrate_core::client::DestinationClient;
use notion_migrate_core::config::MigrationConfig;
use notion_migrate_core::contract::AssetStore;
use notion_migrate_core::notion::NotionClient;
use notion_migrate_core::parse::CommonMarkParser;
use notion_migrate_core::scheduler::Scheduler;
use notion_migrate_core::synchronise::{count_documents, MigrationReport, TreeWalker};
use notion_migrate_core::transform::{default_asset_dirs, Transformer};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for notion-migrate: recreate a markdown export tree as Notion pages.
#[derive(Parser)]
#[clap(
    name = "notion-migrate",
    version,
    about = "Migrate an exported markdown document tree into Notion"
)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[clap(long, global = true)]
    pub log_json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate the export tree described by the given config file
    Migrate {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Export root, overriding the config and OUTLINE_EXPORT_PATH
        #[clap(long)]
        root: Option<PathBuf>,
        /// Destination page id, overriding the config and NOTION_DESTINATION_PAGE_ID
        #[clap(long)]
        destination: Option<String>,
    },
    /// Print the number of documents under an export root
    Count {
        #[clap(long)]
        root: PathBuf,
        /// Asset directory name to skip (repeatable; defaults to uploads and public)
        #[clap(long = "asset-dir")]
        asset_dirs: Vec<String>,
    },
    /// Print the child blocks of a destination page as JSON
    Inspect {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        page: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Migrate {
            config,
            root,
            destination,
        } => {
            let mut config = load_config(config)?;
            apply_overrides(&mut config, root, destination);
            validate(&config)?;
            config.trace_loaded();
            let secrets = load_secrets(config.assets.mode)?;

            tracing::info!(command = "migrate", "Starting migration");
            let report = migrate(&config, &secrets).await?;
            print_summary(&report);
            Ok(())
        }
        Commands::Count { root, asset_dirs } => {
            if !root.is_dir() {
                return Err(anyhow!("Export root {} is not a directory", root.display()));
            }
            let asset_dirs = if asset_dirs.is_empty() {
                default_asset_dirs()
            } else {
                asset_dirs
            };
            let total = count_documents(&root, &asset_dirs);
            tracing::info!(command = "count", root = %root.display(), total, "Counted documents");
            println!("{total}");
            Ok(())
        }
        Commands::Inspect { config, page } => {
            let config = load_config(config)?;
            let secrets = load_secrets(AssetMode::Disabled)?;
            let api = NotionClient::new(&config.destination.api_base_url, &secrets.notion_api_key)?;
            let children = api.list_children(&page).await?;
            tracing::info!(command = "inspect", page = %page, children = children.len(), "Fetched page children");
            println!("{}", serde_json::to_string_pretty(&children)?);
            Ok(())
        }
    }
}

fn build_asset_store(config: &MigrationConfig, secrets: &Secrets) -> Result<Arc<dyn AssetStore>> {
    let store: Arc<dyn AssetStore> = match config.assets.mode {
        AssetMode::Upload => {
            let credentials = secrets
                .s3
                .clone()
                .ok_or_else(|| anyhow!("S3 credentials are required in upload mode"))?;
            Arc::new(S3AssetStore::new(&config.assets, credentials)?)
        }
        AssetMode::Origin => {
            let base_url = config
                .assets
                .origin_base_url
                .as_deref()
                .ok_or_else(|| anyhow!("assets.origin_base_url is required in origin mode"))?;
            Arc::new(OriginBucketStore::new(base_url)?)
        }
        AssetMode::Disabled => Arc::new(DisabledAssetStore),
    };
    Ok(store)
}

async fn migrate(config: &MigrationConfig, secrets: &Secrets) -> Result<MigrationReport> {
    let api = NotionClient::new(&config.destination.api_base_url, &secrets.notion_api_key)?;
    let client = DestinationClient::new(api, Scheduler::new(config.scheduler.clone()));
    let transformer = Transformer::new(
        Arc::new(CommonMarkParser),
        build_asset_store(config, secrets)?,
        &config.source.root,
        config.transform_config(),
    )?;
    let walker = TreeWalker::new(
        client,
        transformer,
        config.retry.clone(),
        &config.source.root,
    );
    let report = walker.migrate(&config.destination.root_page_id).await?;
    Ok(report)
}

fn print_summary(report: &MigrationReport) {
    println!("Migration finished");
    println!("  folders created:      {}", report.folders_created);
    println!("  documents created:    {}", report.documents_created);
    println!("  creation failures:    {}", report.creation_failures);
    println!("  documents filled:     {}", report.documents_filled);
    println!("  documents skipped:    {}", report.documents_skipped);
    println!("  append calls:         {}", report.append_calls);
    println!("  append failures:      {}", report.append_failures);
    println!("  transform fallbacks:  {}", report.transform_fallbacks);
    println!(
        "  links resolved:       {} ({} unresolved)",
        report.links_resolved, report.links_unresolved
    );
    println!(
        "  assets rehomed:       {} ({} failed)",
        report.assets_rehomed, report.assets_failed
    );
    println!("  password warnings:    {}", report.password_warnings);
}
