//! hidraw node listing and permission fixes.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use octavi_setup_linux::{hidraw_order, CommandRunner, NodePermissions, SystemCommand};

use crate::device::{DeviceProfile, DeviceSource};
use crate::error::Result;

/// Permissions of every `/dev/hidraw*` node, like `ls -l /dev/hidraw*`.
///
/// Nodes that vanish between listing and stat are skipped.
///
/// # Errors
///
/// Returns an error if the dev directory cannot be read.
pub fn list_permissions(source: &dyn DeviceSource) -> Result<Vec<NodePermissions>> {
    let mut out = Vec::new();
    for node in source.hidraw_nodes()? {
        match source.node_permissions(&node) {
            Ok(perms) => out.push(perms),
            Err(e) => warn!(node = %node.display(), error = %e, "Skipping node"),
        }
    }
    Ok(out)
}

/// Render a permission listing.
#[must_use]
pub fn format_permissions(nodes: &[NodePermissions]) -> String {
    if nodes.is_empty() {
        return "No hidraw devices found.\n".to_string();
    }
    let mut out = String::from("hidraw device permissions:\n");
    for node in nodes {
        out.push_str(&format!(
            "  {} {:<8} {:<8} {}\n",
            node.symbolic_mode(),
            node.owner,
            node.group,
            node.path.display()
        ));
    }
    out
}

/// Outcome for one device node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFix {
    /// Node path.
    pub node: PathBuf,
    /// Whether a fix was attempted.
    pub attempted: bool,
    /// Error message when the fix failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Device nodes found, and what was done to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindReport {
    /// Device name.
    pub device: String,
    /// Per-node results, sorted by node.
    pub nodes: Vec<NodeFix>,
    /// Mode applied with `--fix`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl FindReport {
    /// Check if at least one node was found and no fix failed.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.iter().all(|n| n.error.is_none())
    }
}

impl fmt::Display for FindReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nodes.is_empty() {
            return writeln!(f, "No {} devices found.", self.device);
        }
        writeln!(f, "Found {} device(s):", self.device)?;
        for node in &self.nodes {
            writeln!(f, "  {}", node.node.display())?;
            match (&self.mode, node.attempted, &node.error) {
                (Some(mode), true, None) => writeln!(f, "    applied chmod {mode}")?,
                (Some(mode), true, Some(err)) => {
                    writeln!(f, "    failed to apply chmod {mode}: {err}")?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Find the device's hidraw nodes and, when `fix_mode` is set, chmod them.
///
/// A chmod only lasts until the device is replugged; the udev rule is the
/// lasting fix.
///
/// # Errors
///
/// Returns an error if the hidraw class cannot be read.
pub fn find_device_nodes(
    source: &dyn DeviceSource,
    runner: &dyn CommandRunner,
    device: &DeviceProfile,
    fix_mode: Option<&str>,
) -> Result<FindReport> {
    let mut nodes: Vec<PathBuf> = source
        .hidraw_devices()?
        .into_iter()
        .filter(|n| device.matches_hidraw(n))
        .map(|n| n.dev_path)
        .collect();
    nodes.sort_by(|a, b| hidraw_order(a, b));

    let nodes = nodes
        .into_iter()
        .map(|node| match fix_mode {
            None => NodeFix {
                node,
                attempted: false,
                error: None,
            },
            Some(mode) => {
                let command = SystemCommand::new("chmod")
                    .args([mode.to_string(), node.display().to_string()])
                    .elevated();
                let error = match runner.run(&command).and_then(|o| o.into_result(&command)) {
                    Ok(_) => {
                        info!(node = %node.display(), mode, "Changed node mode");
                        None
                    }
                    Err(e) => {
                        warn!(node = %node.display(), error = %e, "chmod failed");
                        Some(e.to_string())
                    }
                };
                NodeFix {
                    node,
                    attempted: true,
                    error,
                }
            }
        })
        .collect();

    Ok(FindReport {
        device: device.name.clone(),
        nodes,
        mode: fix_mode.map(ToString::to_string),
    })
}
