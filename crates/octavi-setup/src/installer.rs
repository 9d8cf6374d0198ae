//! Dependency installation through the host package manager.
//!
//! Each package is queried first; packages already present are reported as
//! [`PackageStatus::AlreadyInstalled`] and count as success. Missing packages
//! are installed one at a time so a failure names the package that caused it.
//! There is no retry and no rollback.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use octavi_setup_linux::{CommandRunner, SystemCommand};

use crate::config::PackagesConfig;

/// Supported package managers, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    /// Debian, Ubuntu and derivatives.
    Apt,
    /// Fedora, RHEL and derivatives.
    Dnf,
    /// Arch Linux and derivatives.
    Pacman,
    /// openSUSE.
    Zypper,
}

impl PackageManagerKind {
    /// All managers in detection order.
    pub const ALL: [Self; 4] = [Self::Apt, Self::Dnf, Self::Pacman, Self::Zypper];

    /// The binary whose presence identifies this manager.
    #[must_use]
    pub fn binary(self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
        }
    }

    /// Command that exits 0 iff the package is installed.
    #[must_use]
    pub fn query_command(self, package: &str) -> SystemCommand {
        match self {
            Self::Apt => SystemCommand::new("dpkg-query")
                .args(["-W", "-f=${Status}", package]),
            Self::Dnf | Self::Zypper => SystemCommand::new("rpm").args(["-q", package]),
            Self::Pacman => SystemCommand::new("pacman").args(["-Q", package]),
        }
    }

    /// Command that installs the package without prompting.
    #[must_use]
    pub fn install_command(self, package: &str) -> SystemCommand {
        let cmd = match self {
            Self::Apt => SystemCommand::new("apt-get").args(["install", "-y", package]),
            Self::Dnf => SystemCommand::new("dnf").args(["install", "-y", package]),
            Self::Pacman => {
                SystemCommand::new("pacman").args(["-S", "--noconfirm", "--needed", package])
            }
            Self::Zypper => {
                SystemCommand::new("zypper").args(["--non-interactive", "install", package])
            }
        };
        cmd.elevated()
    }

    /// Packages providing libusb, hidapi (hidraw) and udev for this manager.
    #[must_use]
    pub fn default_packages(self) -> Vec<String> {
        let names: &[&str] = match self {
            Self::Apt => &["libusb-1.0-0", "libhidapi-hidraw0", "udev"],
            Self::Dnf => &["libusb1", "hidapi", "systemd-udev"],
            Self::Pacman => &["libusb", "hidapi", "systemd"],
            Self::Zypper => &["libusb-1_0-0", "libhidapi-hidraw0", "udev"],
        };
        names.iter().map(ToString::to_string).collect()
    }

    /// Find the first manager available on the host.
    #[must_use]
    pub fn detect(runner: &dyn CommandRunner) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| runner.program_exists(kind.binary()))
    }

    /// Interpret query output. `dpkg-query` exits 0 for removed packages
    /// whose config files remain, so its status line is checked too.
    fn is_installed(self, output: &octavi_setup_linux::CommandOutput) -> bool {
        match self {
            Self::Apt => output.success() && output.stdout.contains("install ok installed"),
            _ => output.success(),
        }
    }
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apt => write!(f, "apt"),
            Self::Dnf => write!(f, "dnf"),
            Self::Pacman => write!(f, "pacman"),
            Self::Zypper => write!(f, "zypper"),
        }
    }
}

/// What happened to one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PackageStatus {
    /// Present before the run.
    AlreadyInstalled,
    /// Installed by this run.
    Installed,
    /// Could not be installed.
    Failed {
        /// Why.
        reason: String,
    },
}

impl PackageStatus {
    /// Check if the package ended up installed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Outcome for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageOutcome {
    /// Package name.
    pub name: String,
    /// What happened.
    #[serde(flatten)]
    pub status: PackageStatus,
}

/// Result of an installer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// The manager used, if one was found.
    pub manager: Option<PackageManagerKind>,
    /// Per-package outcomes, in the requested order.
    pub outcomes: Vec<PackageOutcome>,
}

impl InstallReport {
    /// Check if a manager was found and every package is installed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.manager.is_some() && self.outcomes.iter().all(|o| o.status.is_success())
    }

    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.outcomes.iter().filter(|o| !o.status.is_success())
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.manager {
            Some(manager) => writeln!(f, "Package manager: {manager}")?,
            None => writeln!(f, "Package manager: none found")?,
        }
        for outcome in &self.outcomes {
            match &outcome.status {
                PackageStatus::AlreadyInstalled => {
                    writeln!(f, "  [ok]     {} (already installed)", outcome.name)?;
                }
                PackageStatus::Installed => writeln!(f, "  [ok]     {} (installed)", outcome.name)?,
                PackageStatus::Failed { reason } => {
                    writeln!(f, "  [failed] {}: {reason}", outcome.name)?;
                }
            }
        }
        Ok(())
    }
}

/// Installs the configured packages.
pub struct Installer<'a> {
    runner: &'a dyn CommandRunner,
    manager: Option<PackageManagerKind>,
    packages: Vec<String>,
}

impl fmt::Debug for Installer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("manager", &self.manager)
            .field("packages", &self.packages)
            .finish_non_exhaustive()
    }
}

impl<'a> Installer<'a> {
    /// Create an installer for the given manager and packages.
    #[must_use]
    pub fn new(
        runner: &'a dyn CommandRunner,
        manager: Option<PackageManagerKind>,
        packages: Vec<String>,
    ) -> Self {
        Self {
            runner,
            manager,
            packages,
        }
    }

    /// Create an installer from configuration, detecting the manager and
    /// falling back to its default packages when none are configured.
    #[must_use]
    pub fn from_config(runner: &'a dyn CommandRunner, config: &PackagesConfig) -> Self {
        let manager = config
            .manager
            .or_else(|| PackageManagerKind::detect(runner));
        let packages = if config.names.is_empty() {
            manager
                .map(PackageManagerKind::default_packages)
                .unwrap_or_default()
        } else {
            config.names.clone()
        };
        debug!(?manager, ?packages, "Installer configured");
        Self::new(runner, manager, packages)
    }

    /// The manager in use.
    #[must_use]
    pub fn manager(&self) -> Option<PackageManagerKind> {
        self.manager
    }

    /// The packages to ensure.
    #[must_use]
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Ensure every package is installed.
    #[must_use]
    pub fn run(&self) -> InstallReport {
        let outcomes = self
            .packages
            .iter()
            .map(|name| PackageOutcome {
                name: name.clone(),
                status: self.ensure(name),
            })
            .collect();
        InstallReport {
            manager: self.manager,
            outcomes,
        }
    }

    fn ensure(&self, package: &str) -> PackageStatus {
        let Some(manager) = self.manager else {
            return PackageStatus::Failed {
                reason: "no supported package manager found".to_string(),
            };
        };

        match self.runner.run(&manager.query_command(package)) {
            Ok(output) if manager.is_installed(&output) => {
                debug!(package, "Package already installed");
                return PackageStatus::AlreadyInstalled;
            }
            Ok(_) => {}
            Err(e) => warn!(package, error = %e, "Package query failed, trying install"),
        }

        let command = manager.install_command(package);
        match self.runner.run(&command).map(|out| out.into_result(&command)) {
            Ok(Ok(_)) => {
                info!(package, %manager, "Installed package");
                PackageStatus::Installed
            }
            Ok(Err(e)) | Err(e) => {
                warn!(package, error = %e, "Package install failed");
                PackageStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
