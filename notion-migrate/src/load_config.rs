/// `load_config` module: loads the static YAML config, applies environment and
/// command-line overrides and reads secrets from the environment.
///
/// This module is the only place where untrusted YAML is parsed and mapped onto the
/// core crate's [`MigrationConfig`].
///
/// # Responsibilities
/// - Parse the YAML file into a [`MigrationConfig`] (every section has defaults)
/// - Apply `OUTLINE_EXPORT_PATH` / `NOTION_DESTINATION_PAGE_ID`, then `--root` / `--destination`
/// - Read `NOTION_API_KEY` and, for uploads, `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
/// - Refuse to start when anything required is missing
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary. They are
/// fatal: nothing is created in the destination before configuration is complete.
use anyhow::{anyhow, Result};
use notion_migrate_core::assets::{AssetMode, S3Credentials};
use notion_migrate_core::config::MigrationConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_API_KEY: &str = "NOTION_API_KEY";
pub const ENV_EXPORT_PATH: &str = "OUTLINE_EXPORT_PATH";
pub const ENV_DESTINATION: &str = "NOTION_DESTINATION_PAGE_ID";
pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Secrets never stored in the YAML file.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub notion_api_key: String,
    pub s3: Option<S3Credentials>,
}

/// Loads a YAML config file (no secrets) and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MigrationConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let mut config: MigrationConfig = if content.trim().is_empty() {
        MigrationConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            anyhow!("Failed to parse config YAML: {e}")
        })?
    };
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    if let Some(root) = non_empty_env(ENV_EXPORT_PATH) {
        info!(root = %root, "Export root taken from {ENV_EXPORT_PATH}");
        config.source.root = PathBuf::from(root);
    }
    if let Some(destination) = non_empty_env(ENV_DESTINATION) {
        info!(destination = %destination, "Destination taken from {ENV_DESTINATION}");
        config.destination.root_page_id = destination;
    }
    Ok(config)
}

/// Command-line flags win over both the file and the environment.
pub fn apply_overrides(
    config: &mut MigrationConfig,
    root: Option<PathBuf>,
    destination: Option<String>,
) {
    if let Some(root) = root {
        config.source.root = root;
    }
    if let Some(destination) = destination {
        config.destination.root_page_id = destination;
    }
}

/// Checks everything a run needs before anything is created remotely.
pub fn validate(config: &MigrationConfig) -> Result<()> {
    if config.source.root.as_os_str().is_empty() {
        return Err(anyhow!(
            "No export root configured: set source.root, {ENV_EXPORT_PATH} or --root"
        ));
    }
    if !config.source.root.is_dir() {
        return Err(anyhow!(
            "Export root {} is not a directory",
            config.source.root.display()
        ));
    }
    if config.destination.root_page_id.trim().is_empty() {
        return Err(anyhow!(
            "No destination page configured: set destination.root_page_id, {ENV_DESTINATION} or --destination"
        ));
    }
    if config.assets.mode == AssetMode::Origin && config.assets.origin_base_url.is_none() {
        return Err(anyhow!("assets.origin_base_url is required in origin mode"));
    }
    if config.assets.mode == AssetMode::Upload && config.assets.bucket.is_none() {
        return Err(anyhow!("assets.bucket is required in upload mode"));
    }
    Ok(())
}

/// Reads the secrets required by `mode` from the environment.
pub fn load_secrets(mode: AssetMode) -> Result<Secrets> {
    let notion_api_key = required_env(ENV_API_KEY)?;
    let s3 = match mode {
        AssetMode::Upload => Some(S3Credentials {
            access_key_id: required_env(ENV_AWS_ACCESS_KEY_ID)?,
            secret_access_key: required_env(ENV_AWS_SECRET_ACCESS_KEY)?,
        }),
        AssetMode::Origin | AssetMode::Disabled => None,
    };
    info!(
        api_key_set = !notion_api_key.is_empty(),
        s3_credentials = s3.is_some(),
        "Loaded secrets from environment"
    );
    Ok(Secrets { notion_api_key, s3 })
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required_env(name: &str) -> Result<String> {
    non_empty_env(name).ok_or_else(|| {
        error!(variable = name, "Required environment variable missing");
        anyhow!("{name} missing in environment")
    })
}
