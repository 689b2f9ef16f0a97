//! Process configuration (§6), layered TOML + environment the way the
//! pack's datalog engine config loads (`figment`, `MIXER_` prefix,
//! `__`-separated nesting).

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerConfig {
    pub listen_port: u16,

    /// Ordered persistent row-store instances; priority is fixed at load
    /// time (§3 custom > base > branch).
    pub row_stores: Vec<RowStoreInstanceConfig>,

    #[serde(default)]
    pub relational: RelationalConfig,

    pub overlay: OverlayConfig,

    #[serde(default)]
    pub remote_mixer_url: Option<String>,

    #[serde(default)]
    pub maps_client: MapsClientConfig,

    #[serde(default)]
    pub profile_endpoints: Vec<String>,

    #[serde(default)]
    pub flags: FeatureFlags,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowStoreInstanceConfig {
    pub project: String,
    pub instance: String,
    pub table: String,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub is_branch: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationalConfig {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub dataset: String,
    #[serde(default)]
    pub schema_mapping_dir: String,
    /// Connection string for the SQLite/relational-database mirror used in
    /// local/dev deployments in place of the full relational engine.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub instance: String,
    pub pointer_path: String,
    #[serde(default)]
    pub change_notification_topic: Option<String>,
    #[serde(default = "default_decode_concurrency")]
    pub decode_concurrency: usize,
}

fn default_decode_concurrency() -> usize {
    crate::store::DEFAULT_DECODE_CONCURRENCY
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapsClientConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub serve_core: bool,
    #[serde(default)]
    pub serve_recon: bool,
    #[serde(default)]
    pub use_search_index: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            serve_core: true,
            serve_recon: false,
            use_search_index: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl MixerConfig {
    /// Merge `config.toml`, then `config.local.toml` (git-ignored
    /// overrides), then `MIXER_`-prefixed environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("MIXER_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("MIXER_").split("__"))
            .extract()
    }
}
