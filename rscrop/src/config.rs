use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classify::suggestions::SuggestionPolicy;
use crate::collect::global_variables::{default_model_path, CONFIG_FILE_NAME, ENV_PREFIX};
use crate::collect::ndvi::SyntheticProfile;

/// Default lattice resolution for the distribution map
pub const DEFAULT_GRID_SIZE: usize = 30;

/// Runtime settings. Every field has a default, so an empty configuration
/// is valid and selects the synthetic data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub cache: CacheSettings,
    pub model: ModelSettings,
    pub dataset: DatasetSettings,
    pub limits: LimitSettings,
    pub synthetic: SyntheticProfile,
    pub suggestions: SuggestionPolicy,
}

/// Remote NDVI provider; disabled unless both `endpoint` and `api_key` are set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Per-attempt request timeout
    pub timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    /// Size of the tile worker pool
    pub max_connections: usize,
    pub tile_degrees: f64,
    pub max_tiles: usize,
    /// Scenes at or above this cloud cover are dropped
    pub max_cloud_percentage: f64,
    pub window_days: i64,
    pub series_length: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        ProviderSettings {
            endpoint: None,
            api_key: None,
            timeout_secs: 10,
            health_timeout_secs: 3,
            max_attempts: 3,
            base_backoff_ms: 300,
            max_connections: 4,
            tile_degrees: 0.25,
            max_tiles: 64,
            max_cloud_percentage: 20.0,
            window_days: 90,
            series_length: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Zero disables caching
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            capacity: 256,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub path: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            path: default_model_path(),
        }
    }
}

/// Administrative dataset location; the bundled Karnataka data when unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Largest accepted latitude or longitude span of explicit bounds
    pub max_span_degrees: f64,
    pub default_grid_size: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        LimitSettings {
            max_span_degrees: 5.0,
            default_grid_size: DEFAULT_GRID_SIZE,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Load `rscrop.{toml,json,yaml,...}` from the working directory if present,
/// then apply `RSCROP__SECTION__KEY` environment overrides.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(CONFIG_FILE_NAME).required(false))
        .add_source(environment())
        .build()?;
    builder.try_deserialize::<Settings>()
}

/// Load an explicit configuration file; environment overrides still apply
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::from(path).required(true))
        .add_source(environment())
        .build()?;
    builder.try_deserialize::<Settings>()
}
