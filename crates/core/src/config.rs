//! Application Configuration
//!
//! Manages the noxherd settings:
//! - Player executable location (explicit or PATH discovery)
//! - Clone pool sizing
//! - Device-binding budgets

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Default install location of the Nox player, used when PATH discovery fails.
pub const DEFAULT_PLAYER_DIR: &str = r"C:\Program Files (x86)\Nox\bin";

/// Executable name of the player/controller process.
pub const PLAYER_EXE_NAME: &str = "Nox.exe";

/// Player executable and clone pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Explicit path to the player executable; PATH discovery when unset
    pub exe_path: Option<PathBuf>,
    /// Maximum number of concurrently running clones
    pub pool_capacity: u32,
    /// Budget for the device-binding wait, in seconds
    pub bind_timeout_secs: u64,
    /// Delay between device-registry polls, in milliseconds
    pub bind_poll_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            exe_path: None,
            pool_capacity: 4,
            bind_timeout_secs: 120,
            bind_poll_interval_ms: 500,
        }
    }
}

impl PlayerConfig {
    /// Budget for a single device-binding wait
    pub fn bind_timeout(&self) -> Duration {
        Duration::from_secs(self.bind_timeout_secs)
    }

    /// Delay between device-registry polls
    pub fn bind_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bind_poll_interval_ms)
    }

    /// Resolve the player executable path.
    ///
    /// Precedence: the explicit `exe_path` override, then a `Nox/bin`
    /// directory found on `PATH` (last match wins), then the default install
    /// location with a warning.
    pub fn player_exe(&self) -> PathBuf {
        if let Some(ref path) = self.exe_path {
            return path.clone();
        }

        if let Some(dir) = find_player_dir() {
            debug!("Found player directory on PATH: {:?}", dir);
            return dir.join(PLAYER_EXE_NAME);
        }

        let fallback = PathBuf::from(DEFAULT_PLAYER_DIR).join(PLAYER_EXE_NAME);
        warn!(
            "Unable to find Nox/bin on PATH, falling back to {:?}",
            fallback
        );
        fallback
    }
}

/// Scan `PATH` for a `Nox/bin` directory; the last matching entry wins.
fn find_player_dir() -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path).filter(|dir| is_player_bin(dir)).last()
}

fn is_player_bin(dir: &Path) -> bool {
    let mut components = dir.components().rev().map(|c| c.as_os_str());
    components.next() == Some(OsStr::new("bin")) && components.next() == Some(OsStr::new("Nox"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration version for migrations
    pub version: u32,
    /// Player and pool settings
    pub player: PlayerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            player: PlayerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "noxherd", "noxherd").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the default location, creating it on first run
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| crate::error::CoreError::Config("Cannot determine config path".into()))?;

        if config_file.exists() {
            debug!("Loading config from {:?}", config_file);
            Self::load_from(&config_file).await
        } else {
            info!("Config file not found, using defaults");
            let config = AppConfig::default();
            config.save_to(&config_file).await?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit path
    pub async fn load_from(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        let config_file = Self::config_file()
            .ok_or_else(|| crate::error::CoreError::Config("Cannot determine config path".into()))?;
        self.save_to(&config_file).await
    }

    /// Save configuration to an explicit path
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }
}
