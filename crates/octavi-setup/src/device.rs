//! Device identity and device enumeration.
//!
//! The Octavi IFR1 is identified only by its USB vendor/product pair. The
//! [`DeviceSource`] trait abstracts how the host is queried for devices so the
//! checks built on top of it can run against a fake system.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use octavi_setup_linux::{HidrawEntry, NodePermissions, Sysfs, UsbDeviceEntry};

use crate::error::{Error, Result};

/// Default device name.
pub const DEFAULT_DEVICE_NAME: &str = "Octavi IFR1";

/// USB ids of the Octavi IFR1 (Microchip vendor id).
pub const OCTAVI_IFR1: UsbId = UsbId::new(0x04d8, 0xe6d6);

/// A USB vendor/product id pair.
///
/// Displays as `vvvv:pppp` in lowercase hex, the form `lsusb` prints and
/// udev matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UsbId {
    /// Vendor id.
    pub vendor: u16,
    /// Product id.
    pub product: u16,
}

impl UsbId {
    /// Create an id pair.
    #[must_use]
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }

    /// Vendor id as 4 lowercase hex digits.
    #[must_use]
    pub fn vendor_hex(&self) -> String {
        format!("{:04x}", self.vendor)
    }

    /// Product id as 4 lowercase hex digits.
    #[must_use]
    pub fn product_hex(&self) -> String {
        format!("{:04x}", self.product)
    }

    /// Check if the given ids match this pair.
    #[must_use]
    pub fn matches(&self, vendor: u16, product: u16) -> bool {
        self.vendor == vendor && self.product == product
    }
}

/// Parse a single 4-digit hex id, case-insensitive.
///
/// # Errors
///
/// Returns [`Error::InvalidUsbId`] unless the value is exactly 4 hex digits.
pub fn parse_hex_id(value: &str) -> Result<u16> {
    let trimmed = value.trim();
    if trimmed.len() != 4 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidUsbId {
            value: value.to_string(),
        });
    }
    u16::from_str_radix(trimmed, 16).map_err(|_| Error::InvalidUsbId {
        value: value.to_string(),
    })
}

impl FromStr for UsbId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (vendor, product) = s.split_once(':').ok_or_else(|| Error::InvalidUsbId {
            value: s.to_string(),
        })?;
        Ok(Self::new(parse_hex_id(vendor)?, parse_hex_id(product)?))
    }
}

impl TryFrom<String> for UsbId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UsbId> for String {
    fn from(id: UsbId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.product)
    }
}

/// The device the tool sets up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    /// Human-readable device name.
    pub name: String,
    /// USB ids.
    pub id: UsbId,
}

impl DeviceProfile {
    /// Profile for the Octavi IFR1.
    #[must_use]
    pub fn octavi_ifr1() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            id: OCTAVI_IFR1,
        }
    }

    /// Check if a USB device is this device.
    #[must_use]
    pub fn matches_usb(&self, device: &UsbDeviceEntry) -> bool {
        self.id.matches(device.vendor_id, device.product_id)
    }

    /// Check if a hidraw node belongs to this device.
    #[must_use]
    pub fn matches_hidraw(&self, node: &HidrawEntry) -> bool {
        node.is_usb_device(self.id.vendor, self.id.product)
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::octavi_ifr1()
    }
}

/// Where the USB device list comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsbBackend {
    /// Read `/sys/bus/usb/devices`.
    #[default]
    Sysfs,
    /// Ask libusb (requires the `libusb` feature).
    Libusb,
}

impl fmt::Display for UsbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sysfs => write!(f, "sysfs"),
            Self::Libusb => write!(f, "libusb"),
        }
    }
}

/// Source of device information on the host.
pub trait DeviceSource {
    /// All USB devices currently attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the device list cannot be read.
    fn usb_devices(&self) -> Result<Vec<UsbDeviceEntry>>;

    /// All hidraw nodes with known HID parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the hidraw class cannot be read.
    fn hidraw_devices(&self) -> Result<Vec<HidrawEntry>>;

    /// All `hidraw*` node paths, identified or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the dev directory cannot be read.
    fn hidraw_nodes(&self) -> Result<Vec<std::path::PathBuf>>;

    /// Ownership and mode of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be stat'ed.
    fn node_permissions(&self, path: &Path) -> Result<NodePermissions>;

    /// Whether the current user can read and write the node.
    fn is_accessible(&self, path: &Path) -> bool;
}

/// [`DeviceSource`] backed by the running system.
#[derive(Debug, Clone)]
pub struct HostDevices {
    sysfs: Sysfs,
    backend: UsbBackend,
}

impl HostDevices {
    /// Create a source over the given sysfs view.
    #[must_use]
    pub fn new(sysfs: Sysfs, backend: UsbBackend) -> Self {
        Self { sysfs, backend }
    }
}

impl DeviceSource for HostDevices {
    fn usb_devices(&self) -> Result<Vec<UsbDeviceEntry>> {
        match self.backend {
            UsbBackend::Sysfs => Ok(self.sysfs.usb_devices()?),
            #[cfg(feature = "libusb")]
            UsbBackend::Libusb => Ok(octavi_setup_linux::libusb::usb_devices()?),
            #[cfg(not(feature = "libusb"))]
            UsbBackend::Libusb => Err(Error::config(
                "the libusb backend is not compiled in; rebuild with --features libusb",
            )),
        }
    }

    fn hidraw_devices(&self) -> Result<Vec<HidrawEntry>> {
        Ok(self.sysfs.hidraw_devices()?)
    }

    fn hidraw_nodes(&self) -> Result<Vec<std::path::PathBuf>> {
        Ok(octavi_setup_linux::list_hidraw_nodes(self.sysfs.dev_root())?)
    }

    fn node_permissions(&self, path: &Path) -> Result<NodePermissions> {
        Ok(NodePermissions::inspect(path)?)
    }

    fn is_accessible(&self, path: &Path) -> bool {
        octavi_setup_linux::is_accessible(path)
    }
}
