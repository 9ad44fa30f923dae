//! Configuration module for the similarity index.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PM_` and use double underscores
//! to separate nested levels:
//! - `PM_CACHE__TTL_SECS=60` sets `cache.ttl_secs`
//! - `PM_EMBEDDING__PROVIDER=hashing` sets `embedding.provider`
//! - `PM_RANKING__TOP_N=3` sets `ranking.top_n`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace directory holding settings, catalog and index.
pub const WORKSPACE_DIR: &str = ".projmatch";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding the index snapshot
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Project catalog file
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Workspace root directory (where .projmatch is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub rebuild: RebuildConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// fastembed models, outputs concatenated
    FastEmbed,
    /// Offline feature hashing
    Hashing,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProviderKind,

    /// fastembed models to run; their outputs are concatenated
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Output width of the hashing provider
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Texts per provider call while building
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Model download cache (defaults to the user cache directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackendKind,

    /// Redis address (host:port)
    #[serde(default = "default_cache_address")]
    pub address: String,

    /// Result time-to-live in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Timeout for connecting and for each command
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RankingConfig {
    /// Maximum matches per query
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Neighbors fetched before title deduplication
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RebuildConfig {
    /// Write the snapshot after every successful rebuild
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Debounce interval in milliseconds (default: 500ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".projmatch/index")
}
fn default_catalog_path() -> PathBuf {
    PathBuf::from(".projmatch/projects.json")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::FastEmbed
}
fn default_models() -> Vec<String> {
    vec!["AllMiniLML6V2".to_string(), "BGESmallENV15".to_string()]
}
fn default_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}
fn default_batch_size() -> usize {
    crate::vector::DEFAULT_BATCH_SIZE
}
fn default_cache_backend() -> CacheBackendKind {
    CacheBackendKind::Memory
}
fn default_cache_address() -> String {
    "127.0.0.1:6379".to_string()
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_connect_timeout_ms() -> u64 {
    250
}
fn default_key_prefix() -> String {
    "similarity".to_string()
}
fn default_top_n() -> usize {
    crate::ranking::DEFAULT_TOP_N
}
fn default_candidate_pool() -> usize {
    8
}
fn default_debounce_ms() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            catalog_path: default_catalog_path(),
            workspace_root: None,
            debug: false,
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig::default(),
            ranking: RankingConfig::default(),
            rebuild: RebuildConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            models: default_models(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            cache_dir: None,
        }
    }
}

impl EmbeddingConfig {
    /// Model download directory, falling back to the user cache directory.
    pub fn model_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("projmatch")
                .join("models")
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_cache_backend(),
            address: default_cache_address(),
            ttl_secs: default_ttl_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            candidate_pool: default_candidate_pool(),
        }
    }
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self { persist: true }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Settings {
    fn figment(config_path: impl AsRef<Path>) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path.as_ref()))
            // Layer in environment variables with PM_ prefix
            // Use double underscore (__) to separate nested levels
            // Single underscore (_) remains as is within field names
            .merge(Env::prefixed("PM_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // Double underscore becomes dot
                    .into()
            }))
    }

    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .projmatch directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_DIR).join("settings.toml"));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    /// Find the workspace root by looking for .projmatch directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(WORKSPACE_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .projmatch is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(WORKSPACE_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found. Run 'projmatch init' first".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'projmatch init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Resolve a configured path against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn resolved_index_path(&self) -> PathBuf {
        self.resolve(&self.index_path)
    }

    pub fn resolved_catalog_path(&self) -> PathBuf {
        self.resolve(&self.catalog_path)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(WORKSPACE_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&config_path, Self::template())?;
        Ok(config_path)
    }

    fn template() -> &'static str {
        r#"# projmatch configuration file

# Version of the configuration schema
version = 1

# Snapshot directory and project catalog (relative to the workspace root)
index_path = ".projmatch/index"
catalog_path = ".projmatch/projects.json"

# Global debug mode
debug = false

[embedding]
# "fastembed" runs the models below and concatenates their outputs.
# "hashing" needs no download and is fully deterministic.
provider = "fastembed"
models = ["AllMiniLML6V2", "BGESmallENV15"]

# Output width of the hashing provider
dimension = 384

# Texts per embedding call while building the index
batch_size = 32

# Model download cache (defaults to the user cache directory)
# cache_dir = "/path/to/models"

[cache]
enabled = true

# "memory" keeps results in-process, "redis" uses the server at `address`
backend = "memory"
address = "127.0.0.1:6379"

# Results expire after this many seconds
ttl_secs = 3600

# Queries bypass the cache when the backend does not answer within this time
connect_timeout_ms = 250

key_prefix = "similarity"

[ranking]
# Matches returned per query
top_n = 2

# Neighbors fetched before duplicate titles are removed
candidate_pool = 8

[rebuild]
# Write the snapshot after every successful rebuild
persist = true

[watch]
# Debounce interval for catalog changes in milliseconds
debounce_ms = 500
"#
    }
}
