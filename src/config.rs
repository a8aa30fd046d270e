use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reviewq::cache::BuildOptions;
use reviewq::priority::DEFAULT_PRIORITY;
use reviewq::scheduler::{Interleave, QueueMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub priority: PriorityConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    pub default_priority: u8,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            default_priority: DEFAULT_PRIORITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub debounce_ms: u64,
    pub phase2_delay_ms: u64,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            phase2_delay_ms: 1000,
            batch_size: 50,
            batch_pause_ms: 25,
        }
    }
}

impl CacheConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            phase2_delay: Duration::from_millis(self.phase2_delay_ms),
            batch_size: self.batch_size,
            batch_pause: Duration::from_millis(self.batch_pause_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Ordinary review units between two incremental items
    pub cards_per_item: u32,
    /// Show incremental items only, ignoring `cards_per_item`
    pub incremental_only: bool,
    pub randomness: f64,
    pub mode: QueueMode,
    pub cooldown_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cards_per_item: 3,
            incremental_only: false,
            randomness: 0.0,
            mode: QueueMode::Due,
            cooldown_secs: 300,
        }
    }
}

impl QueueConfig {
    pub fn interleave(&self) -> Interleave {
        if self.incremental_only {
            Interleave::IncrementalOnly
        } else {
            Interleave::Every(self.cards_per_item)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("reviewq"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            priority: PriorityConfig::default(),
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Default `env_logger` filter; `RUST_LOG` still wins when set.
    pub fn log_filter(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
