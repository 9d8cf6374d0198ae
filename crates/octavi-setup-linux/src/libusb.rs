//! USB enumeration through libusb.

use tracing::{debug, warn};

use crate::error::Result;
use crate::sysfs::UsbDeviceEntry;

/// List USB devices through libusb, sorted by bus path.
///
/// String descriptors are not read since that needs the device opened.
///
/// # Errors
///
/// Returns an error if libusb cannot list devices.
pub fn usb_devices() -> Result<Vec<UsbDeviceEntry>> {
    let devices = rusb::devices()?;

    let mut entries = Vec::new();
    for device in devices.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(e) => {
                warn!(
                    bus = device.bus_number(),
                    address = device.address(),
                    "Failed to read device descriptor: {}",
                    e
                );
                continue;
            }
        };
        entries.push(UsbDeviceEntry {
            bus_path: format!("{:03}-{:03}", device.bus_number(), device.address()),
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            manufacturer: None,
            product: None,
        });
    }
    entries.sort_by(|a, b| a.bus_path.cmp(&b.bus_path));
    debug!("Enumerated {} devices through libusb", entries.len());
    Ok(entries)
}
