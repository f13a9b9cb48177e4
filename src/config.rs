//! Driver configuration
//!
//! The configuration is read once at startup from a TOML file and
//! validated into a [`PinAssignment`]. Only `adapter_enabled` can change
//! afterwards; the running driver keeps it in a watch channel and reads it
//! on every tick.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::gpio::{is_valid_pin, pin_bit};

/// Clock, latch and one data line.
pub const MIN_PINS: usize = 3;
/// Clock, latch and five data lines.
pub const MAX_PINS: usize = 7;
/// Pins needed before the adapter can be used: clock, latch and two data lines.
pub const ADAPTER_MIN_PINS: usize = MIN_PINS + 1;

const CONFIG_DIR: &str = ".config/snescon";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Fewer pins than clock, latch and one data line
    #[error("Expected at least {min} GPIO pins, found {found}")]
    TooFewPins { found: usize, min: usize },

    /// More than five data lines
    #[error("Expected at most {max} GPIO pins, found {found}")]
    TooManyPins { found: usize, max: usize },

    /// Adapter enabled with a single data line
    #[error("Expected at least {min} GPIO pins in order to use the adapter, found {found}")]
    AdapterNeedsPins { found: usize, min: usize },

    /// Pin outside [`VALID_PINS`](crate::gpio::VALID_PINS)
    #[error("GPIO {0} is not a valid pin")]
    InvalidPin(u8),

    /// Same pin used for two lines
    #[error("GPIO {0} is assigned more than once")]
    DuplicatePin(u8),

    #[error("Could not determine the home directory")]
    NoHomeDir,

    /// Reading or writing the config file failed
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Validated GPIO layout: clock, latch, then one to five data lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinAssignment {
    pins: Vec<u8>,
}

impl PinAssignment {
    pub fn new(pins: Vec<u8>) -> Result<Self, ConfigError> {
        if pins.len() < MIN_PINS {
            return Err(ConfigError::TooFewPins {
                found: pins.len(),
                min: MIN_PINS,
            });
        }
        if pins.len() > MAX_PINS {
            return Err(ConfigError::TooManyPins {
                found: pins.len(),
                max: MAX_PINS,
            });
        }

        let mut seen = HashSet::with_capacity(pins.len());
        for &pin in &pins {
            if !is_valid_pin(pin) {
                return Err(ConfigError::InvalidPin(pin));
            }
            if !seen.insert(pin) {
                return Err(ConfigError::DuplicatePin(pin));
            }
        }

        Ok(Self { pins })
    }

    pub fn pins(&self) -> &[u8] {
        &self.pins
    }

    pub fn clock(&self) -> u8 {
        self.pins[0]
    }

    pub fn latch(&self) -> u8 {
        self.pins[1]
    }

    pub fn data_pins(&self) -> &[u8] {
        &self.pins[2..]
    }

    pub fn clock_mask(&self) -> u32 {
        pin_bit(self.clock())
    }

    pub fn latch_mask(&self) -> u32 {
        pin_bit(self.latch())
    }

    pub fn data_masks(&self) -> Vec<u32> {
        self.data_pins().iter().map(|&pin| pin_bit(pin)).collect()
    }

    pub fn data_line_count(&self) -> usize {
        self.pins.len() - 2
    }

    /// Pad devices to register. With two or more data lines the adapter can
    /// be switched on at any time, so its four slots are always provided.
    pub fn slot_count(&self) -> usize {
        let lines = self.data_line_count();
        if lines >= 2 {
            lines.max(crate::controller::adapter_probe::ADAPTER_SLOTS)
        } else {
            lines
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// GPIO numbers: clock, latch, data line 1..5
    pub pin_assignment: Vec<u8>,
    /// Look for the four-player adapter on every tick
    pub adapter_enabled: bool,
    /// Name every pad device is registered under
    pub device_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            pin_assignment: vec![2, 3, 4, 7, 9, 10, 11],
            adapter_enabled: false,
            device_name: "SNES pad".to_string(),
        }
    }
}

impl DriverConfig {
    /// Startup validation. Nothing is created if this fails.
    pub fn validate(&self) -> Result<PinAssignment, ConfigError> {
        let count = self.pin_assignment.len();
        if (MIN_PINS..=MAX_PINS).contains(&count)
            && self.adapter_enabled
            && count < ADAPTER_MIN_PINS
        {
            return Err(ConfigError::AdapterNeedsPins {
                found: count,
                min: ADAPTER_MIN_PINS,
            });
        }
        PinAssignment::new(self.pin_assignment.clone())
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, self.to_toml()?)
            .await
            .map_err(io_err)
    }

    /// Loads `path`, writing the defaults there first if it does not exist.
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }
        Self::load(path).await
    }
}

/// `$HOME/.config/snescon/config.toml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    Ok(path)
}
