//! Linux system plumbing for octavi-setup.
//!
//! This crate wraps the parts of the host the setup tool touches: running
//! external commands (optionally through `sudo`), sysfs USB and hidraw
//! enumeration, device node ownership, and user lookup.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod command;
pub mod error;
#[cfg(feature = "libusb")]
pub mod libusb;
pub mod nodes;
pub mod sysfs;
pub mod user;

pub use command::{
    find_program, CommandOutput, CommandRunner, Escalation, HostRunner, Privilege, SystemCommand,
};
pub use error::{Result, SystemError};
pub use nodes::{
    hidraw_order, is_accessible, is_accessible_to, list_hidraw_nodes, NodePermissions,
};
pub use sysfs::{parse_hid_path, HidrawEntry, Sysfs, UsbDeviceEntry, BUS_USB};
pub use user::{current_user, is_root};

/// Get the platform name.
#[must_use]
pub fn platform_name() -> &'static str {
    "Linux"
}

/// Platform name with the running kernel release, e.g. `Linux 6.1.0-18-amd64`.
#[must_use]
pub fn platform_description() -> String {
    match std::fs::read_to_string("/proc/sys/kernel/osrelease") {
        Ok(release) if !release.trim().is_empty() => {
            format!("{} {}", platform_name(), release.trim())
        }
        _ => platform_name().to_string(),
    }
}

/// Check if libusb enumeration was compiled in.
#[must_use]
pub fn libusb_available() -> bool {
    cfg!(feature = "libusb")
}
