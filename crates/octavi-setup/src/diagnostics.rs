//! Device detection and access diagnostics.
//!
//! The checker looks for the device in the USB device list, then for its
//! hidraw nodes, then at whether the current user can open those nodes.
//! The first problem found decides the hint.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use octavi_setup_linux::{NodePermissions, UsbDeviceEntry};

use crate::device::{DeviceProfile, DeviceSource};
use crate::error::Result;

/// Access state of one of the device's hidraw nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HidrawStatus {
    /// Node path.
    pub node: PathBuf,
    /// Ownership and mode, when the node could be stat'ed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<NodePermissions>,
    /// Whether the current user can read and write it.
    pub accessible: bool,
}

/// Result of a diagnostic run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    /// Whether a matching USB device is attached.
    pub found: bool,
    /// One-line summary.
    pub message: String,
    /// What to do about the first problem found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Matching USB devices.
    pub devices: Vec<UsbDeviceEntry>,
    /// The device's hidraw nodes.
    pub hidraw: Vec<HidrawStatus>,
}

impl DiagnosticReport {
    /// Check if the device is attached and usable without root.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.found && self.hint.is_none()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for device in &self.devices {
            write!(
                f,
                "  usb {} {:04x}:{:04x}",
                device.bus_path, device.vendor_id, device.product_id
            )?;
            if let Some(product) = &device.product {
                write!(f, " {product}")?;
            }
            writeln!(f)?;
        }
        for node in &self.hidraw {
            let mode = node
                .permissions
                .as_ref()
                .map_or_else(|| "?".to_string(), NodePermissions::symbolic_mode);
            writeln!(
                f,
                "  {} {} {}",
                node.node.display(),
                mode,
                if node.accessible {
                    "accessible"
                } else {
                    "not accessible"
                }
            )?;
        }
        if let Some(hint) = &self.hint {
            writeln!(f, "Hint: {hint}")?;
        }
        Ok(())
    }
}

/// Checks whether the device is present and usable.
pub struct DiagnosticChecker<'a> {
    source: &'a dyn DeviceSource,
    device: DeviceProfile,
}

impl fmt::Debug for DiagnosticChecker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticChecker")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl<'a> DiagnosticChecker<'a> {
    /// Create a checker for the given device.
    #[must_use]
    pub fn new(source: &'a dyn DeviceSource, device: DeviceProfile) -> Self {
        Self { source, device }
    }

    /// Run the checks.
    ///
    /// # Errors
    ///
    /// Returns an error only if the USB device list cannot be read. Problems
    /// with hidraw enumeration are logged and reported through the hint.
    pub fn check(&self) -> Result<DiagnosticReport> {
        let devices: Vec<UsbDeviceEntry> = self
            .source
            .usb_devices()?
            .into_iter()
            .filter(|d| self.device.matches_usb(d))
            .collect();

        if devices.is_empty() {
            debug!(id = %self.device.id, "Device not in USB device list");
            return Ok(DiagnosticReport {
                found: false,
                message: format!("{} ({}) not found", self.device.name, self.device.id),
                hint: Some(
                    "Check the USB cable, replug the device or try another port, \
                     and confirm it shows up in `lsusb`."
                        .to_string(),
                ),
                devices,
                hidraw: Vec::new(),
            });
        }

        let hidraw = match self.source.hidraw_devices() {
            Ok(nodes) => nodes
                .into_iter()
                .filter(|n| self.device.matches_hidraw(n))
                .map(|n| self.node_status(n.dev_path))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Could not enumerate hidraw nodes");
                Vec::new()
            }
        };

        let message = format!(
            "{} ({}) found: {} USB device(s), {} hidraw node(s)",
            self.device.name,
            self.device.id,
            devices.len(),
            hidraw.len()
        );
        let hint = self.hint_for(&hidraw);

        Ok(DiagnosticReport {
            found: true,
            message,
            hint,
            devices,
            hidraw,
        })
    }

    fn node_status(&self, node: PathBuf) -> HidrawStatus {
        let permissions = match self.source.node_permissions(&node) {
            Ok(perms) => Some(perms),
            Err(e) => {
                debug!(node = %node.display(), error = %e, "Could not stat node");
                None
            }
        };
        let accessible = self.source.is_accessible(&node);
        HidrawStatus {
            node,
            permissions,
            accessible,
        }
    }

    fn hint_for(&self, hidraw: &[HidrawStatus]) -> Option<String> {
        if hidraw.is_empty() {
            return Some(
                "The device has no hidraw node. Check that the usbhid driver is loaded \
                 (`lsmod | grep usbhid`) and look at `octavi-setup logs`."
                    .to_string(),
            );
        }
        let blocked: Vec<String> = hidraw
            .iter()
            .filter(|n| !n.accessible)
            .map(|n| n.node.display().to_string())
            .collect();
        if blocked.is_empty() {
            return None;
        }
        Some(format!(
            "{} not readable and writable by the current user. Run `octavi-setup rules create`, \
             then replug the device, or run `octavi-setup find --fix` for a temporary fix.",
            blocked.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDevices;

    fn profile() -> DeviceProfile {
        DeviceProfile::octavi_ifr1()
    }

    #[test]
    fn test_absent_device_is_not_found() {
        let source = FakeDevices::default().with_usb("1-1", 0x046d, 0xc52b);
        let report = DiagnosticChecker::new(&source, profile()).check().unwrap();

        assert!(!report.found);
        assert!(!report.is_healthy());
        assert_eq!(report.message, "Octavi IFR1 (04d8:e6d6) not found");
        assert!(report.hint.as_deref().unwrap().contains("lsusb"));
        assert!(report.devices.is_empty());
    }

    #[test]
    fn test_absent_device_is_deterministic() {
        let source = FakeDevices::default();
        let checker = DiagnosticChecker::new(&source, profile());
        let first = checker.check().unwrap();
        let second = checker.check().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_healthy_device() {
        let source = FakeDevices::default()
            .with_usb("1-4", 0x04d8, 0xe6d6)
            .with_hidraw("hidraw0", 0x04d8, 0xe6d6, 0o666)
            .with_hidraw("hidraw1", 0x046d, 0xc52b, 0o600);
        let report = DiagnosticChecker::new(&source, profile()).check().unwrap();

        assert!(report.found);
        assert!(report.is_healthy());
        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.hidraw.len(), 1);
        assert_eq!(report.hidraw[0].node, PathBuf::from("/dev/hidraw0"));
        assert!(report.to_string().contains("crw-rw-rw-"));
    }

    #[test]
    fn test_inaccessible_hidraw_gives_rule_hint() {
        let source = FakeDevices::default()
            .with_usb("1-4", 0x04d8, 0xe6d6)
            .with_hidraw("hidraw3", 0x04d8, 0xe6d6, 0o600);
        let report = DiagnosticChecker::new(&source, profile()).check().unwrap();

        assert!(report.found);
        assert!(!report.is_healthy());
        let hint = report.hint.unwrap();
        assert!(hint.contains("/dev/hidraw3"));
        assert!(hint.contains("rules create"));
    }

    #[test]
    fn test_missing_hidraw_gives_driver_hint() {
        let source = FakeDevices::default().with_usb("1-4", 0x04d8, 0xe6d6);
        let report = DiagnosticChecker::new(&source, profile()).check().unwrap();

        assert!(report.found);
        assert!(report.hint.unwrap().contains("usbhid"));
    }

    #[test]
    fn test_report_json() {
        let source = FakeDevices::default();
        let report = DiagnosticChecker::new(&source, profile()).check().unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["found"], false);
        assert!(json["hint"].is_string());
    }
}
