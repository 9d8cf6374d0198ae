//! End-to-end setup runs against a fake host.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use octavi_setup::installer::PackageManagerKind;
use octavi_setup::rules::RuleChange;
use octavi_setup::{run_setup, Config, DeviceSource, SetupOptions};
use octavi_setup_linux::{
    CommandOutput, CommandRunner, HidrawEntry, NodePermissions, SystemCommand, UsbDeviceEntry,
    BUS_USB,
};

/// Records commands; `dpkg-query` answers from `installed`, everything else
/// succeeds.
#[derive(Default)]
struct FakeHost {
    installed: Vec<&'static str>,
    calls: RefCell<Vec<String>>,
}

impl CommandRunner for FakeHost {
    fn run(&self, command: &SystemCommand) -> octavi_setup_linux::Result<CommandOutput> {
        self.calls.borrow_mut().push(command.to_string());
        if command.program() == "dpkg-query" {
            let package = command.arguments().last().map_or("", String::as_str);
            return Ok(if self.installed.iter().any(|p| *p == package) {
                CommandOutput::ok("install ok installed")
            } else {
                CommandOutput::failed(
                    1,
                    format!("dpkg-query: no packages found matching {package}"),
                )
            });
        }
        Ok(CommandOutput::ok(""))
    }

    fn program_exists(&self, program: &str) -> bool {
        program == "apt-get"
    }
}

struct Attached {
    present: bool,
}

impl DeviceSource for Attached {
    fn usb_devices(&self) -> octavi_setup::Result<Vec<UsbDeviceEntry>> {
        Ok(if self.present {
            vec![UsbDeviceEntry {
                bus_path: "3-2".to_string(),
                vendor_id: 0x04d8,
                product_id: 0xe6d6,
                manufacturer: Some("Octavi".to_string()),
                product: Some("IFR1".to_string()),
            }]
        } else {
            Vec::new()
        })
    }

    fn hidraw_devices(&self) -> octavi_setup::Result<Vec<HidrawEntry>> {
        Ok(if self.present {
            vec![HidrawEntry {
                name: "hidraw4".to_string(),
                dev_path: PathBuf::from("/dev/hidraw4"),
                bus: BUS_USB,
                vendor_id: 0x04d8,
                product_id: 0xe6d6,
            }]
        } else {
            Vec::new()
        })
    }

    fn hidraw_nodes(&self) -> octavi_setup::Result<Vec<PathBuf>> {
        Ok(self
            .hidraw_devices()?
            .into_iter()
            .map(|h| h.dev_path)
            .collect())
    }

    fn node_permissions(&self, path: &Path) -> octavi_setup::Result<NodePermissions> {
        Ok(NodePermissions {
            path: path.to_path_buf(),
            mode: 0o666,
            owner: "root".to_string(),
            group: "plugdev".to_string(),
            uid: 0,
            gid: 46,
            char_device: true,
        })
    }

    fn is_accessible(&self, _path: &Path) -> bool {
        true
    }
}

fn config_for(rules_dir: &Path) -> Config {
    let mut config = Config::default();
    config.rules.directory = rules_dir.to_path_buf();
    config.packages.manager = Some(PackageManagerKind::Apt);
    config.packages.names = vec!["libusb-1.0-0".to_string(), "udev".to_string()];
    config
}

#[test]
fn setup_twice_leaves_identical_rule_file() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(tmp.path());
    let host = FakeHost::default();
    let devices = Attached { present: true };

    let first = run_setup(&config, &host, &devices, SetupOptions::default());
    assert!(first.success(), "{first}");
    let rule_path = tmp.path().join("99-octavi.rules");
    let written = fs::read_to_string(&rule_path).unwrap();
    assert!(written.contains(r#"ATTR{idVendor}=="04d8""#));
    assert!(written.contains(r#"ATTR{idProduct}=="e6d6""#));

    let second = run_setup(&config, &host, &devices, SetupOptions::default());
    assert!(second.success(), "{second}");
    assert_eq!(fs::read_to_string(&rule_path).unwrap(), written);

    let details = second.steps[1].details.as_ref().unwrap();
    assert_eq!(
        details["change"],
        serde_json::to_value(RuleChange::Unchanged).unwrap()
    );
}

#[test]
fn installed_packages_count_as_success() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(tmp.path());
    let host = FakeHost {
        installed: vec!["libusb-1.0-0", "udev"],
        ..FakeHost::default()
    };

    let report = run_setup(
        &config,
        &host,
        &Attached { present: true },
        SetupOptions {
            skip_install: false,
            skip_rules: true,
        },
    );

    assert!(report.success(), "{report}");
    assert!(report.steps[0].message.contains("already installed"));
    let calls = host.calls.borrow();
    assert!(calls.iter().all(|c| !c.starts_with("apt-get")));
}

#[test]
fn missing_device_fails_with_not_found() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(tmp.path());
    let host = FakeHost::default();

    let report = run_setup(
        &config,
        &host,
        &Attached { present: false },
        SetupOptions::default(),
    );

    assert!(!report.success());
    assert!(report.steps[0].success);
    assert!(report.steps[1].success);
    assert!(!report.steps[2].success);
    assert!(report.steps[2]
        .message
        .contains("Octavi IFR1 (04d8:e6d6) not found"));
}

#[test]
fn missing_rules_directory_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(&tmp.path().join("does-not-exist"));
    let host = FakeHost::default();

    let report = run_setup(
        &config,
        &host,
        &Attached { present: true },
        SetupOptions::default(),
    );

    assert!(!report.success());
    assert!(report.steps[1].message.contains("does not exist"));
    assert!(report.steps[2].success);
}
