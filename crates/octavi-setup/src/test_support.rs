//! Fakes shared by unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use octavi_setup_linux::{
    hidraw_order, CommandOutput, CommandRunner, HidrawEntry, NodePermissions, SystemCommand,
    UsbDeviceEntry,
};

use crate::device::DeviceSource;
use crate::error::Result;

/// Runner that answers from a table keyed by the command line.
///
/// Unscripted commands exit 1 with "not scripted" on stderr.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    programs: HashSet<String>,
    calls: RefCell<Vec<SystemCommand>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, output: CommandOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }

    pub fn with_programs<const N: usize>(mut self, programs: [&str; N]) -> Self {
        self.programs.extend(programs.iter().map(ToString::to_string));
        self
    }

    pub fn calls(&self) -> Vec<SystemCommand> {
        self.calls.borrow().clone()
    }

    pub fn call_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToString::to_string).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &SystemCommand) -> octavi_setup_linux::Result<CommandOutput> {
        self.calls.borrow_mut().push(command.clone());
        Ok(self
            .responses
            .get(&command.to_string())
            .cloned()
            .unwrap_or_else(|| CommandOutput::failed(1, "not scripted")))
    }

    fn program_exists(&self, program: &str) -> bool {
        self.programs.contains(program)
    }
}

/// In-memory device source.
#[derive(Debug, Default)]
pub struct FakeDevices {
    pub usb: Vec<UsbDeviceEntry>,
    pub hidraw: Vec<HidrawEntry>,
    pub extra_nodes: Vec<PathBuf>,
    pub modes: HashMap<PathBuf, u32>,
}

impl FakeDevices {
    pub fn with_usb(mut self, bus_path: &str, vendor_id: u16, product_id: u16) -> Self {
        self.usb.push(UsbDeviceEntry {
            bus_path: bus_path.to_string(),
            vendor_id,
            product_id,
            manufacturer: None,
            product: None,
        });
        self
    }

    pub fn with_hidraw(mut self, name: &str, vendor_id: u16, product_id: u16, mode: u32) -> Self {
        let dev_path = PathBuf::from("/dev").join(name);
        self.modes.insert(dev_path.clone(), mode);
        self.hidraw.push(HidrawEntry {
            name: name.to_string(),
            dev_path,
            bus: octavi_setup_linux::BUS_USB,
            vendor_id,
            product_id,
        });
        self
    }
}

impl DeviceSource for FakeDevices {
    fn usb_devices(&self) -> Result<Vec<UsbDeviceEntry>> {
        Ok(self.usb.clone())
    }

    fn hidraw_devices(&self) -> Result<Vec<HidrawEntry>> {
        Ok(self.hidraw.clone())
    }

    fn hidraw_nodes(&self) -> Result<Vec<PathBuf>> {
        let mut nodes: Vec<PathBuf> = self.hidraw.iter().map(|h| h.dev_path.clone()).collect();
        nodes.extend(self.extra_nodes.iter().cloned());
        nodes.sort_by(|a, b| hidraw_order(a, b));
        Ok(nodes)
    }

    fn node_permissions(&self, path: &Path) -> Result<NodePermissions> {
        Ok(NodePermissions {
            path: path.to_path_buf(),
            mode: self.modes.get(path).copied().unwrap_or(0o600),
            owner: "root".to_string(),
            group: "root".to_string(),
            uid: 0,
            gid: 0,
            char_device: true,
        })
    }

    fn is_accessible(&self, path: &Path) -> bool {
        self.modes.get(path).is_some_and(|mode| mode & 0o006 == 0o006)
    }
}
