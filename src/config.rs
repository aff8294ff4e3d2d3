//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! ```toml
//! [database]
//! path = ""                    # empty: <config dir>/joycal/cal.db
//!
//! [device]
//! input_dir = "/dev/input"
//!
//! [joystick]
//! enabled = true
//! sysfs_char_dir = "/sys/dev/char"
//! input_dir = "/dev/input"
//! ```
//!
//! The config directory is `/etc` when running as root and the user's XDG
//! config directory otherwise.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{JoycalError, Result};

/// Application directory name under the config directory
pub const APP_DIR: &str = "joycal";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "joycal.toml";

/// Default database name
pub const DATABASE_FILE_NAME: &str = "cal.db";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub joystick: JoystickConfig,
}

/// Calibration database configuration
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: String,
}

/// Event device configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
}

/// joydev configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct JoystickConfig {
    #[serde(default = "default_joystick_enabled")]
    pub enabled: bool,

    #[serde(default = "default_sysfs_char_dir")]
    pub sysfs_char_dir: PathBuf,

    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
}

// Default value functions
fn default_input_dir() -> PathBuf { PathBuf::from("/dev/input") }
fn default_joystick_enabled() -> bool { true }
fn default_sysfs_char_dir() -> PathBuf { PathBuf::from("/sys/dev/char") }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
        }
    }
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            enabled: default_joystick_enabled(),
            sysfs_char_dir: default_sysfs_char_dir(),
            input_dir: default_input_dir(),
        }
    }
}

/// Directory holding the config file and the default database.
///
/// `/etc/joycal` for root, `$XDG_CONFIG_HOME/joycal` (or `~/.config/joycal`)
/// for everyone else.
pub fn config_dir() -> PathBuf {
    let base = if nix::unistd::geteuid().is_root() {
        PathBuf::from("/etc")
    } else {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    };
    base.join(APP_DIR)
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use joycal::config::Config;
    ///
    /// let config = Config::load("/etc/joycal/joycal.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`] for a file that exists.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        config_dir().join(CONFIG_FILE_NAME)
    }

    /// Database location, falling back to `<config dir>/joycal/cal.db`
    pub fn database_path(&self) -> PathBuf {
        if self.database.path.is_empty() {
            config_dir().join(DATABASE_FILE_NAME)
        } else {
            PathBuf::from(&self.database.path)
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if a directory setting is empty
    fn validate(&self) -> Result<()> {
        if self.device.input_dir.as_os_str().is_empty() {
            return Err(JoycalError::Config(toml::de::Error::custom(
                "device input_dir cannot be empty",
            )));
        }

        if self.joystick.enabled {
            if self.joystick.sysfs_char_dir.as_os_str().is_empty() {
                return Err(JoycalError::Config(toml::de::Error::custom(
                    "joystick sysfs_char_dir cannot be empty when enabled",
                )));
            }
            if self.joystick.input_dir.as_os_str().is_empty() {
                return Err(JoycalError::Config(toml::de::Error::custom(
                    "joystick input_dir cannot be empty when enabled",
                )));
            }
        }

        Ok(())
    }
}
