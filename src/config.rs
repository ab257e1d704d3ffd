//! Configuration System using Figment
//!
//! Strongly-typed configuration for a synchronization session. Configuration is
//! loaded from:
//! 1. a TOML file (base configuration)
//! 2. Environment variables (prefixed with `DEVICE_SYNC_`)
//!
//! # Example
//! ```no_run
//! use device_sync::config::SyncConfig;
//!
//! let config = SyncConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), device_sync::error::SyncError>(())
//! ```
//!
//! A minimal file:
//!
//! ```toml
//! [application]
//! name = "rover controller"
//! log_level = "info"
//!
//! [protocol]
//! byte_order = "little"
//!
//! [[devices]]
//! name = "imu"
//! kind = "inertial_unit"
//! sampling_period = 32
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::device::NodeKind;
use crate::error::{AppResult, SyncError};
use crate::protocol::ByteOrder;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Wire protocol settings
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Devices attached at startup
    #[serde(default)]
    pub devices: Vec<DeviceDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Wire protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Byte order agreed with the engine
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Warn when a measurement is read from a device that is not sampling
    #[serde(default = "default_warn_on_disabled_read")]
    pub warn_on_disabled_read: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::default(),
            warn_on_disabled_read: default_warn_on_disabled_read(),
        }
    }
}

/// Device definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Unique device name
    pub name: String,
    /// Device kind
    pub kind: NodeKind,
    /// Sampling period requested at startup in milliseconds (0 = disabled)
    #[serde(default)]
    pub sampling_period: i32,
    /// Whether this device is attached
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_warn_on_disabled_read() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

impl SyncConfig {
    /// Load configuration from `config/device_sync.toml` and environment variables
    ///
    /// Environment variables can override configuration with prefix `DEVICE_SYNC_`.
    /// Example: `DEVICE_SYNC_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/device_sync.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DEVICE_SYNC_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(SyncError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if !names.insert(device.name.as_str()) {
                return Err(SyncError::Configuration(format!(
                    "Duplicate device name: {}",
                    device.name
                )));
            }
            if device.sampling_period < 0 {
                return Err(SyncError::Configuration(format!(
                    "Device '{}' has negative sampling_period {}",
                    device.name, device.sampling_period
                )));
            }
        }

        Ok(())
    }

    /// Get all enabled devices
    pub fn enabled_devices(&self) -> impl Iterator<Item = &DeviceDefinition> {
        self.devices.iter().filter(|device| device.enabled)
    }
}
