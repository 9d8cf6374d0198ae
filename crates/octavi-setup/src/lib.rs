//! `octavi-setup` - Prepare a Linux host for the Octavi IFR1
//!
//! This library provides the three setup steps (dependency installation,
//! udev permission rules, device diagnostics) and the troubleshooting
//! operations built on the same pieces: hidraw listing, device node fixes,
//! group membership and kernel log filtering.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod groups;
pub mod hidraw;
pub mod installer;
pub mod kernel_log;
pub mod logging;
pub mod rules;
pub mod setup;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use device::{DeviceProfile, DeviceSource, HostDevices, UsbId, OCTAVI_IFR1};
pub use diagnostics::{DiagnosticChecker, DiagnosticReport};
pub use error::{Error, Result};
pub use installer::{InstallReport, Installer, PackageManagerKind};
pub use logging::init_logging;
pub use rules::{RuleConfigurator, RuleOutcome, RuleTemplate};
pub use setup::{run_setup, SetupOptions, SetupReport};
