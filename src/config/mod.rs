//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod economy;
mod storage;

pub use economy::{
    ConversionConfig, DrawConfig, ForfeitPolicy, MasterKeyConfig, RevenueConfig, TierCacheConfig,
    DEFAULT_DAILY_CONVERSION_CAP, DEFAULT_FREE_TIER_SHARE_BPS, DEFAULT_POINTS_PER_KEY, DEFAULT_REVENUE_SHARE_BPS,
};
pub use storage::{SqliteConfig, StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "promoshare.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PROMOSHARE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PROMOSHARE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PROMOSHARE_LOG";

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Points-to-promokey conversion.
    pub conversion: ConversionConfig,
    /// Draw payout rules.
    pub draw: DrawConfig,
    /// Revenue share routed into jackpots.
    pub revenue: RevenueConfig,
    /// Tier lookup cache.
    pub tiers: TierCacheConfig,
    /// Master key pricing.
    pub master_key: MasterKeyConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `promoshare.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder =
            ConfigLib::builder().add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing: in-memory storage, defaults elsewhere.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                storage_type: StorageType::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
