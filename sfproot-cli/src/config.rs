//! Configuration file support for sfproot.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SFPROOT_*)
//! 3. Local config file (./sfproot.toml)
//! 4. Global config file (~/.config/sfproot/config.toml)
//!
//! An explicit `--config PATH` replaces both files.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sfproot::{BankLayout, BankRegion, Timings};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "sfproot.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default console baud rate.
    pub baud: Option<u32>,
}

/// Device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Model name shown in operator messages.
    pub model: Option<String>,
}

/// Unlock configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnlockConfig {
    /// Give up after this many patch cycles.
    pub max_cycles: Option<u32>,
}

/// One flash region, as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Flash offset.
    pub offset: u32,
    /// Region length.
    pub length: u32,
}

impl From<RegionConfig> for BankRegion {
    fn from(region: RegionConfig) -> Self {
        Self {
            offset: region.offset,
            length: region.length,
        }
    }
}

/// Flash layout overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// RAM address images are loaded to.
    pub ram_load_addr: Option<u32>,
    /// Region of image0.
    pub bank0: Option<RegionConfig>,
    /// Region of image1.
    pub bank1: Option<RegionConfig>,
}

/// Timing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Fail waits that see no progress after this many seconds.
    pub watchdog_secs: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Device settings.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Unlock settings.
    #[serde(default)]
    pub unlock: UnlockConfig,
    /// Flash layout.
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Timing settings.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sfproot").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Values set in `other` win.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.device.model.is_some() {
            self.device.model = other.device.model;
        }
        if other.unlock.max_cycles.is_some() {
            self.unlock.max_cycles = other.unlock.max_cycles;
        }
        if other.layout.ram_load_addr.is_some() {
            self.layout.ram_load_addr = other.layout.ram_load_addr;
        }
        if other.layout.bank0.is_some() {
            self.layout.bank0 = other.layout.bank0;
        }
        if other.layout.bank1.is_some() {
            self.layout.bank1 = other.layout.bank1;
        }
        if other.timing.watchdog_secs.is_some() {
            self.timing.watchdog_secs = other.timing.watchdog_secs;
        }
    }

    /// Flash layout with the configured overrides applied.
    pub fn to_layout(&self) -> BankLayout {
        let mut layout = BankLayout::default();
        if let Some(addr) = self.layout.ram_load_addr {
            layout.ram_load_addr = addr;
        }
        if let Some(region) = self.layout.bank0 {
            layout.bank0 = region.into();
        }
        if let Some(region) = self.layout.bank1 {
            layout.bank1 = region.into();
        }
        layout
    }

    /// Sequence timings with the configured bounds applied.
    ///
    /// `watchdog_secs` and `max_cycles` from the command line take
    /// precedence over the file.
    pub fn to_timings(&self, watchdog_secs: Option<u64>, max_cycles: Option<u32>) -> Timings {
        Timings {
            max_unlock_cycles: max_cycles.or(self.unlock.max_cycles),
            watchdog: watchdog_secs
                .or(self.timing.watchdog_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            ..Timings::default()
        }
    }
}
