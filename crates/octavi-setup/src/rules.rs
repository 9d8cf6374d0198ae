//! udev rule management.
//!
//! The rule file content is a pure function of the configuration, so applying
//! it twice leaves the same bytes on disk. An unchanged file is not rewritten.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use octavi_setup_linux::{CommandRunner, SystemCommand};

use crate::config::{is_valid_rule_name, Config};
use crate::device::DeviceProfile;
use crate::error::{Error, Result};

/// Substring identifying rule files that belong to the device.
const RULE_NAME_MARKER: &str = "octavi";

/// The permission grant written for a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTemplate {
    /// Device the rule matches.
    pub device: DeviceProfile,
    /// Octal mode, e.g. `0666`.
    pub mode: String,
    /// Owning group, e.g. `plugdev`.
    pub group: String,
    /// Also match the device's hidraw nodes.
    pub include_hidraw: bool,
}

impl RuleTemplate {
    /// Build the template from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured device ids are invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            device: config.device_profile()?,
            mode: config.rules.mode.clone(),
            group: config.rules.group.clone(),
            include_hidraw: config.rules.include_hidraw,
        })
    }

    /// Render the rule file.
    #[must_use]
    pub fn render(&self) -> String {
        let vendor = self.device.id.vendor_hex();
        let product = self.device.id.product_hex();
        let mut out = format!(
            "# {name} ({id}) access rules, managed by octavi-setup.\n\
             # Changes to this file are overwritten on the next setup run.\n\
             SUBSYSTEM==\"usb\", ATTR{{idVendor}}==\"{vendor}\", ATTR{{idProduct}}==\"{product}\", MODE=\"{mode}\", GROUP=\"{group}\"\n",
            name = self.device.name,
            id = self.device.id,
            mode = self.mode,
            group = self.group,
        );
        if self.include_hidraw {
            out.push_str(&format!(
                "KERNEL==\"hidraw*\", SUBSYSTEM==\"hidraw\", ATTRS{{idVendor}}==\"{vendor}\", ATTRS{{idProduct}}==\"{product}\", MODE=\"{mode}\", GROUP=\"{group}\"\n",
                mode = self.mode,
                group = self.group,
            ));
        }
        out
    }
}

/// How the rule file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleChange {
    /// The file did not exist.
    Created,
    /// The file existed with different content.
    Updated,
    /// The file already had the expected content.
    Unchanged,
}

impl fmt::Display for RuleChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Result of applying the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    /// Rule file path.
    pub path: PathBuf,
    /// What happened to the file.
    pub change: RuleChange,
    /// Whether udev was reloaded and triggered.
    pub reloaded: bool,
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rule file {} {}", self.path.display(), self.change)?;
        if self.reloaded {
            writeln!(f, "udev rules reloaded and triggered")?;
        } else {
            writeln!(
                f,
                "udev not reloaded; run `octavi-setup rules reload` and `rules trigger`, or replug the device"
            )?;
        }
        Ok(())
    }
}

/// Writes, lists and reloads udev rules.
pub struct RuleConfigurator<'a> {
    runner: &'a dyn CommandRunner,
    directory: PathBuf,
    file_name: String,
    template: RuleTemplate,
    reload: bool,
}

impl fmt::Debug for RuleConfigurator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleConfigurator")
            .field("directory", &self.directory)
            .field("file_name", &self.file_name)
            .field("template", &self.template)
            .field("reload", &self.reload)
            .finish_non_exhaustive()
    }
}

impl<'a> RuleConfigurator<'a> {
    /// Create a configurator.
    #[must_use]
    pub fn new(
        runner: &'a dyn CommandRunner,
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
        template: RuleTemplate,
        reload: bool,
    ) -> Self {
        Self {
            runner,
            directory: directory.into(),
            file_name: file_name.into(),
            template,
            reload,
        }
    }

    /// Create a configurator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured device ids are invalid.
    pub fn from_config(runner: &'a dyn CommandRunner, config: &Config) -> Result<Self> {
        Ok(Self::new(
            runner,
            &config.rules.directory,
            &config.rules.file_name,
            RuleTemplate::from_config(config)?,
            config.rules.reload,
        ))
    }

    /// Path of the managed rule file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// The rule content this configurator writes.
    #[must_use]
    pub fn rendered(&self) -> String {
        self.template.render()
    }

    /// Write the rule file if needed, then reload and trigger udev.
    ///
    /// Reloading happens even when the file was unchanged, so a run that
    /// previously wrote the file but failed to reload is completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules directory is missing, the file cannot be
    /// read or written, or udev cannot be reloaded.
    pub fn apply(&self) -> Result<RuleOutcome> {
        if !self.directory.is_dir() {
            return Err(Error::RulesDirMissing {
                path: self.directory.clone(),
            });
        }

        let path = self.path();
        let content = self.rendered();

        let change = match fs::read_to_string(&path) {
            Ok(existing) if existing == content => RuleChange::Unchanged,
            Ok(_) => RuleChange::Updated,
            Err(e) if e.kind() == ErrorKind::NotFound => RuleChange::Created,
            Err(e) => return Err(e.into()),
        };

        if change == RuleChange::Unchanged {
            debug!(path = %path.display(), "Rule file already up to date");
        } else {
            self.write(&path, &content)?;
            info!(path = %path.display(), %change, "Wrote udev rule");
        }

        if self.reload {
            self.reload_rules()?;
            self.trigger()?;
        }

        Ok(RuleOutcome {
            path,
            change,
            reloaded: self.reload,
        })
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        match fs::write(path, content) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                debug!(path = %path.display(), "Direct write denied, writing through tee");
                let command = SystemCommand::new("tee")
                    .arg(path.to_string_lossy())
                    .stdin(content)
                    .elevated();
                self.runner
                    .run(&command)?
                    .into_result(&command)
                    .map_err(|e| {
                        if e.is_permission_denied() {
                            Error::permission_missing(
                                format!("write access to {}", self.directory.display()),
                                "Run octavi-setup with sudo, or set system.escalation = \"sudo\".",
                            )
                        } else {
                            Error::RuleWrite {
                                path: path.to_path_buf(),
                                message: e.to_string(),
                            }
                        }
                    })?;
                Ok(())
            }
            Err(e) => Err(Error::RuleWrite {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Tell udev to reload its rules.
    ///
    /// # Errors
    ///
    /// Returns an error if `udevadm` fails.
    pub fn reload_rules(&self) -> Result<()> {
        self.run_udevadm(&["control", "--reload-rules"])
    }

    /// Replay device events so the reloaded rules apply to attached devices.
    ///
    /// # Errors
    ///
    /// Returns an error if `udevadm` fails.
    pub fn trigger(&self) -> Result<()> {
        self.run_udevadm(&["trigger"])
    }

    fn run_udevadm(&self, args: &[&str]) -> Result<()> {
        let command = SystemCommand::new("udevadm")
            .args(args.iter().copied())
            .elevated();
        self.runner.run(&command)?.into_result(&command)?;
        Ok(())
    }

    /// List rule files belonging to the device, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules directory is missing or unreadable.
    pub fn list(&self) -> Result<Vec<String>> {
        list_device_rules(&self.directory)
    }

    /// Read a rule file from the rules directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a plain rule file name or the file
    /// cannot be read.
    pub fn show(&self, name: &str) -> Result<String> {
        if !is_valid_rule_name(name) {
            return Err(Error::InvalidRuleName {
                name: name.to_string(),
            });
        }
        Ok(fs::read_to_string(self.directory.join(name))?)
    }
}

/// List `*octavi*` rule files in a directory, case-insensitive, sorted.
///
/// # Errors
///
/// Returns an error if the directory is missing or unreadable.
pub fn list_device_rules(directory: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::RulesDirMissing {
                path: directory.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.to_lowercase().contains(RULE_NAME_MARKER))
        .collect();
    names.sort();
    Ok(names)
}
