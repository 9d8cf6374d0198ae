//! USB and hidraw enumeration through sysfs.
//!
//! USB devices are read from `<root>/bus/usb/devices/*/idVendor` and
//! `idProduct`. Interfaces and hubs without those attributes are skipped.
//!
//! hidraw nodes are found under `<root>/class/hidraw`. Each entry is a link
//! into the device tree whose path contains the HID device name, formatted
//! as `BBBB:VVVV:PPPP.NNNN` (bus, vendor, product, instance), for example
//! `.../0003:04D8:E6D6.0001/hidraw/hidraw0`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Result, SystemError};
use crate::nodes::hidraw_order;

/// HID bus number for USB devices.
pub const BUS_USB: u16 = 0x0003;

/// A USB device visible on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbDeviceEntry {
    /// Bus path (e.g. `1-4.2`) or `bus-address` for libusb.
    pub bus_path: String,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// Manufacturer string, when the kernel exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Product string, when the kernel exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

/// A hidraw node resolved to the ids of its HID parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HidrawEntry {
    /// Kernel name, e.g. `hidraw0`.
    pub name: String,
    /// Device node path, e.g. `/dev/hidraw0`.
    pub dev_path: PathBuf,
    /// HID bus number (3 for USB).
    pub bus: u16,
    /// Vendor id.
    pub vendor_id: u16,
    /// Product id.
    pub product_id: u16,
}

impl HidrawEntry {
    /// Check if this node belongs to the given USB device.
    #[must_use]
    pub fn is_usb_device(&self, vendor_id: u16, product_id: u16) -> bool {
        self.bus == BUS_USB && self.vendor_id == vendor_id && self.product_id == product_id
    }
}

/// A sysfs tree plus the matching `/dev` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sysfs {
    root: PathBuf,
    dev_root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Self::new("/sys", "/dev")
    }
}

impl Sysfs {
    /// Create a view over the given sysfs and dev roots.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dev_root: dev_root.into(),
        }
    }

    /// The sysfs root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The device node root.
    #[must_use]
    pub fn dev_root(&self) -> &Path {
        &self.dev_root
    }

    /// List USB devices, sorted by bus path.
    ///
    /// A missing `bus/usb/devices` directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn usb_devices(&self) -> Result<Vec<UsbDeviceEntry>> {
        let dir = self.root.join("bus/usb/devices");
        let Some(entries) = read_dir_if_exists(&dir)? else {
            debug!(path = %dir.display(), "No USB devices directory");
            return Ok(Vec::new());
        };

        let mut devices = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let (Some(vendor_id), Some(product_id)) = (
                read_hex_attr(&path.join("idVendor")),
                read_hex_attr(&path.join("idProduct")),
            ) else {
                continue;
            };
            devices.push(UsbDeviceEntry {
                bus_path: entry.file_name().to_string_lossy().into_owned(),
                vendor_id,
                product_id,
                manufacturer: read_string_attr(&path.join("manufacturer")),
                product: read_string_attr(&path.join("product")),
            });
        }
        devices.sort_by(|a, b| a.bus_path.cmp(&b.bus_path));
        trace!(count = devices.len(), "Enumerated USB devices");
        Ok(devices)
    }

    /// List hidraw nodes whose HID parent could be identified, sorted by name.
    ///
    /// A missing `class/hidraw` directory (no hidraw driver loaded) yields an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn hidraw_devices(&self) -> Result<Vec<HidrawEntry>> {
        let dir = self.root.join("class/hidraw");
        let Some(entries) = read_dir_if_exists(&dir)? else {
            debug!(path = %dir.display(), "No hidraw class directory");
            return Ok(Vec::new());
        };

        let mut nodes = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let resolved = match fs::canonicalize(entry.path()) {
                Ok(path) => path,
                Err(e) => {
                    debug!(node = %name, error = %e, "Could not resolve hidraw link");
                    continue;
                }
            };
            let Some((bus, vendor_id, product_id)) = parse_hid_path(&resolved.to_string_lossy())
            else {
                trace!(node = %name, path = %resolved.display(), "No HID id in device path");
                continue;
            };
            nodes.push(HidrawEntry {
                dev_path: self.dev_root.join(&name),
                name,
                bus,
                vendor_id,
                product_id,
            });
        }
        nodes.sort_by(|a, b| hidraw_order(&a.dev_path, &b.dev_path));
        Ok(nodes)
    }
}

/// Extract `(bus, vendor, product)` from a HID device path.
///
/// Uses the last HID device component in the path, so nested devices
/// resolve to the innermost one.
///
/// # Panics
///
/// Panics if the built-in pattern fails to compile.
#[must_use]
pub fn parse_hid_path(path: &str) -> Option<(u16, u16, u16)> {
    static HID_NAME: OnceLock<Regex> = OnceLock::new();
    let re = HID_NAME.get_or_init(|| {
        Regex::new(r"([0-9A-Fa-f]{4}):([0-9A-Fa-f]{4}):([0-9A-Fa-f]{4})\.[0-9A-Fa-f]+")
            .expect("Invalid HID path pattern")
    });
    let caps = re.captures_iter(path).last()?;
    let field = |i: usize| u16::from_str_radix(&caps[i], 16).ok();
    Some((field(1)?, field(2)?, field(3)?))
}

fn read_dir_if_exists(dir: &Path) -> Result<Option<fs::ReadDir>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SystemError::read(dir, e)),
    }
}

fn read_string_attr(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_hex_attr(path: &Path) -> Option<u16> {
    read_string_attr(path).and_then(|s| u16::from_str_radix(&s, 16).ok())
}
