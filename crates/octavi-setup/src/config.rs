//! Configuration management for octavi-setup.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use octavi_setup_linux::{Escalation, Sysfs};

use crate::device::{parse_hex_id, DeviceProfile, UsbBackend, UsbId, DEFAULT_DEVICE_NAME};
use crate::error::{Error, Result};
use crate::installer::PackageManagerKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration directory name.
const CONFIG_DIR_NAME: &str = "octavi-setup";

/// Environment variable prefix.
const ENV_PREFIX: &str = "OCTAVI_SETUP_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `OCTAVI_SETUP_`, sections split by `__`)
/// 2. TOML config file at `~/.config/octavi-setup/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target device.
    pub device: DeviceConfig,
    /// udev rule configuration.
    pub rules: RulesConfig,
    /// Dependency installation.
    pub packages: PackagesConfig,
    /// Host system access.
    pub system: SystemConfig,
}

/// Target device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Human-readable device name, also used to filter kernel logs.
    pub name: String,
    /// USB vendor id, 4 hex digits.
    pub vendor_id: String,
    /// USB product id, 4 hex digits.
    pub product_id: String,
}

/// udev rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Directory holding udev rules.
    pub directory: PathBuf,
    /// Rule file name inside `directory`.
    pub file_name: String,
    /// Octal mode granted to the device.
    pub mode: String,
    /// Group granted to the device.
    pub group: String,
    /// Also emit a rule for the device's hidraw nodes.
    pub include_hidraw: bool,
    /// Reload and trigger udev after writing the rule.
    pub reload: bool,
}

/// Dependency installation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Package manager to use. Detected from `PATH` when unset.
    pub manager: Option<PackageManagerKind>,
    /// Packages to install. The manager's defaults are used when empty.
    pub names: Vec<String>,
}

/// Host system access configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// sysfs mount point.
    pub sysfs_root: PathBuf,
    /// Device node directory.
    pub dev_root: PathBuf,
    /// How privileged commands gain root.
    pub escalation: EscalationMethod,
    /// Where the USB device list comes from.
    pub usb_backend: UsbBackend,
}

/// How privileged commands gain root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationMethod {
    /// Prefix with `sudo`.
    #[default]
    Sudo,
    /// Run as-is; the tool must already run as root.
    None,
}

impl From<EscalationMethod> for Escalation {
    fn from(method: EscalationMethod) -> Self {
        match method {
            EscalationMethod::Sudo => Self::Sudo,
            EscalationMethod::None => Self::None,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            vendor_id: "04d8".to_string(),
            product_id: "e6d6".to_string(),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/etc/udev/rules.d"),
            file_name: "99-octavi.rules".to_string(),
            mode: "0666".to_string(),
            group: "plugdev".to_string(),
            include_hidraw: true,
            reload: true,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
            escalation: EscalationMethod::default(),
            usb_backend: UsbBackend::default(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `OCTAVI_SETUP_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        parse_hex_id(&self.device.vendor_id)
            .map_err(|_| Error::config(format!("device.vendor_id: {}", self.device.vendor_id)))?;
        parse_hex_id(&self.device.product_id).map_err(|_| {
            Error::config(format!("device.product_id: {}", self.device.product_id))
        })?;

        if self.device.name.trim().is_empty() {
            return Err(Error::config("device.name must not be empty"));
        }

        let mode_ok = (3..=4).contains(&self.rules.mode.len())
            && self.rules.mode.chars().all(|c| ('0'..='7').contains(&c));
        if !mode_ok {
            return Err(Error::config(format!(
                "rules.mode must be an octal mode like 0666, got '{}'",
                self.rules.mode
            )));
        }

        let group_ok = !self.rules.group.is_empty()
            && self
                .rules
                .group
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
        if !group_ok {
            return Err(Error::config(format!(
                "rules.group is not a valid group name: '{}'",
                self.rules.group
            )));
        }

        if !is_valid_rule_name(&self.rules.file_name) {
            return Err(Error::config(format!(
                "rules.file_name must be a plain file name ending in .rules, got '{}'",
                self.rules.file_name
            )));
        }

        if self.packages.names.iter().any(|n| n.trim().is_empty()) {
            return Err(Error::config("packages.names must not contain empty names"));
        }

        if self.system.usb_backend == UsbBackend::Libusb
            && !octavi_setup_linux::libusb_available()
        {
            return Err(Error::config(
                "system.usb_backend = \"libusb\" requires building with the libusb feature",
            ));
        }

        Ok(())
    }

    /// The configured device.
    ///
    /// # Errors
    ///
    /// Returns an error if the ids are not valid hex.
    pub fn device_profile(&self) -> Result<DeviceProfile> {
        Ok(DeviceProfile {
            name: self.device.name.clone(),
            id: UsbId::new(
                parse_hex_id(&self.device.vendor_id)?,
                parse_hex_id(&self.device.product_id)?,
            ),
        })
    }

    /// Full path of the rule file.
    #[must_use]
    pub fn rule_path(&self) -> PathBuf {
        self.rules.directory.join(&self.rules.file_name)
    }

    /// sysfs view for the configured roots.
    #[must_use]
    pub fn sysfs(&self) -> Sysfs {
        Sysfs::new(&self.system.sysfs_root, &self.system.dev_root)
    }
}

/// Check that a name is a plain `*.rules` file name.
#[must_use]
pub fn is_valid_rule_name(name: &str) -> bool {
    name.len() > ".rules".len()
        && name.ends_with(".rules")
        && !name.contains('/')
        && !name.starts_with('.')
}
