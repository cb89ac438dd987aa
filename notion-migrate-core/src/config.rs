use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::assets::AssetsConfig;
use crate::notion::DEFAULT_API_BASE_URL;
use crate::policy::FailurePolicy;
use crate::scheduler::SchedulerConfig;
use crate::transform::{default_asset_dirs, TransformConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root of the markdown export.
    #[serde(default)]
    pub root: PathBuf,
    #[serde(default = "default_asset_dirs")]
    pub asset_dirs: Vec<String>,
    #[serde(default)]
    pub origin_domain: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            asset_dirs: default_asset_dirs(),
            origin_domain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Page under which the whole tree is recreated.
    #[serde(default)]
    pub root_page_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            root_page_id: String::new(),
            api_base_url: default_api_base_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSettings {
    #[serde(default = "default_max_table_columns")]
    pub max_table_columns: usize,
}

fn default_max_table_columns() -> usize {
    TransformConfig::default().max_table_columns
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            max_table_columns: default_max_table_columns(),
        }
    }
}

/// Everything a migration run needs apart from secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: FailurePolicy,
    #[serde(default)]
    pub transform: TransformSettings,
    #[serde(default)]
    pub assets: AssetsConfig,
}

impl MigrationConfig {
    pub fn transform_config(&self) -> TransformConfig {
        TransformConfig {
            asset_dirs: self.source.asset_dirs.clone(),
            origin_domain: self.source.origin_domain.clone(),
            max_table_columns: self.transform.max_table_columns,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            root = %self.source.root.display(),
            destination = %self.destination.root_page_id,
            max_in_flight = self.scheduler.max_in_flight,
            asset_mode = ?self.assets.mode,
            "Loaded MigrationConfig"
        );
        debug!(?self, "MigrationConfig loaded (full debug)");
    }
}
