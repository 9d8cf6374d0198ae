//! Device node ownership and access checks.

use std::cmp::Ordering;
use std::ffi::CString;
use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use nix::unistd::{access, getgrouplist, AccessFlags, Gid, User};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SystemError};
use crate::user;

/// Ownership and mode of a device node, as `ls -l` would show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePermissions {
    /// Node path.
    pub path: PathBuf,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    /// Owner name, or numeric uid.
    pub owner: String,
    /// Group name, or numeric gid.
    pub group: String,
    /// Owner uid.
    pub uid: u32,
    /// Group gid.
    pub gid: u32,
    /// Whether the node is a character device.
    pub char_device: bool,
}

impl NodePermissions {
    /// Read the permissions of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be stat'ed.
    pub fn inspect(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|e| SystemError::read(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            mode: meta.mode() & 0o7777,
            owner: user::user_name(meta.uid()),
            group: user::group_name(meta.gid()),
            uid: meta.uid(),
            gid: meta.gid(),
            char_device: meta.file_type().is_char_device(),
        })
    }

    /// Octal mode, e.g. `0666`.
    #[must_use]
    pub fn octal_mode(&self) -> String {
        format!("{:04o}", self.mode)
    }

    /// Symbolic mode, e.g. `crw-rw-rw-`.
    #[must_use]
    pub fn symbolic_mode(&self) -> String {
        let mut out = String::with_capacity(10);
        out.push(if self.char_device { 'c' } else { '-' });
        for shift in [6, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }

    /// Check if everyone may read and write the node.
    #[must_use]
    pub fn world_read_write(&self) -> bool {
        self.mode & 0o006 == 0o006
    }

    /// Check if a user with the given uid and groups may read and write the
    /// node. Only the first matching class (owner, group, other) applies,
    /// as in the kernel's permission check.
    #[must_use]
    pub fn grants_read_write(&self, uid: u32, gids: &[u32]) -> bool {
        if uid == 0 {
            true
        } else if uid == self.uid {
            self.mode & 0o600 == 0o600
        } else if gids.contains(&self.gid) {
            self.mode & 0o060 == 0o060
        } else {
            self.world_read_write()
        }
    }
}

/// Check if the user the setup is for can open the node for reading and
/// writing.
///
/// Under `sudo` that is the invoking user, whose access is computed from the
/// node's owner, group and mode. Otherwise `access(2)` decides.
#[must_use]
pub fn is_accessible(path: &Path) -> bool {
    let Some(target) = access_target() else {
        return access(path, AccessFlags::R_OK | AccessFlags::W_OK).is_ok();
    };
    match is_accessible_to(path, &target) {
        Ok(accessible) => accessible,
        Err(e) => {
            debug!(node = %path.display(), user = %target, error = %e, "Access check failed");
            false
        }
    }
}

/// Non-root user to check access for when running as root.
fn access_target() -> Option<String> {
    if !user::is_root() {
        return None;
    }
    user::current_user().ok().filter(|name| name != "root")
}

/// Check if the named user can open the node for reading and writing,
/// counting their supplementary groups.
///
/// # Errors
///
/// Returns an error if the user is unknown or the node cannot be stat'ed.
pub fn is_accessible_to(path: &Path, user_name: &str) -> Result<bool> {
    let user = User::from_name(user_name)?.ok_or(SystemError::UnknownUser)?;
    let node = NodePermissions::inspect(path)?;
    let name = CString::new(user_name).map_err(|_| SystemError::UnknownUser)?;
    let gids: Vec<u32> = getgrouplist(&name, user.gid)?
        .into_iter()
        .map(Gid::as_raw)
        .collect();
    Ok(node.grants_read_write(user.uid.as_raw(), &gids))
}

/// Order hidraw node paths by their number, so `hidraw2` sorts before
/// `hidraw10`. Names without a number sort first, by name.
#[must_use]
pub fn hidraw_order(a: &Path, b: &Path) -> Ordering {
    let key = |path: &Path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let index = name
            .strip_prefix("hidraw")
            .and_then(|n| n.parse::<u32>().ok());
        (index, name)
    };
    key(a).cmp(&key(b))
}

/// List `hidraw*` nodes in a dev directory, sorted by node number.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_hidraw_nodes(dev_root: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dev_root).map_err(|e| SystemError::read(dev_root, e))?;
    let mut nodes: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("hidraw"))
        .map(|entry| entry.path())
        .collect();
    nodes.sort_by(|a, b| hidraw_order(a, b));
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn perms(mode: u32) -> NodePermissions {
        NodePermissions {
            path: PathBuf::from("/dev/hidraw0"),
            mode,
            owner: "root".to_string(),
            group: "plugdev".to_string(),
            uid: 0,
            gid: 46,
            char_device: true,
        }
    }

    #[test]
    fn test_symbolic_mode() {
        assert_eq!(perms(0o666).symbolic_mode(), "crw-rw-rw-");
        assert_eq!(perms(0o600).symbolic_mode(), "crw-------");
        assert_eq!(perms(0o755).symbolic_mode(), "crwxr-xr-x");
    }

    #[test]
    fn test_octal_mode() {
        assert_eq!(perms(0o660).octal_mode(), "0660");
    }

    #[test]
    fn test_world_read_write() {
        assert!(perms(0o666).world_read_write());
        assert!(!perms(0o660).world_read_write());
    }

    #[test]
    fn test_owner_class_decides_for_owner() {
        // Owner without rw is denied even when others have it.
        let mut node = perms(0o066);
        node.uid = 1000;
        assert!(!node.grants_read_write(1000, &[46]));
        assert!(node.grants_read_write(1001, &[]));
    }

    #[test]
    fn test_root_only_node_denies_other_users() {
        let node = perms(0o600);
        assert!(node.grants_read_write(0, &[]));
        assert!(!node.grants_read_write(1000, &[1000, 27]));
    }

    #[test]
    fn test_group_grant_needs_membership() {
        let node = perms(0o660);
        assert!(node.grants_read_write(1000, &[1000, 46]));
        assert!(!node.grants_read_write(1000, &[1000]));
        assert!(perms(0o666).grants_read_write(1000, &[1000]));
    }

    #[test]
    fn test_is_accessible_to_other_user() {
        let Ok(Some(nobody)) = User::from_name("nobody") else {
            return;
        };
        if nobody.uid == nix::unistd::Uid::current() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let closed = tmp.path().join("hidraw0");
        let open = tmp.path().join("hidraw1");
        for (path, mode) in [(&closed, 0o600), (&open, 0o666)] {
            fs::write(path, "").unwrap();
            fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
        }

        assert!(!is_accessible_to(&closed, "nobody").unwrap());
        assert!(is_accessible_to(&open, "nobody").unwrap());
    }

    #[test]
    fn test_is_accessible_to_unknown_user() {
        let tmp = TempDir::new().unwrap();
        let result = is_accessible_to(tmp.path(), "no-such-user-octavi");
        assert!(matches!(result, Err(SystemError::UnknownUser)));
    }

    #[test]
    fn test_hidraw_order_is_numeric() {
        let mut nodes: Vec<PathBuf> = ["hidraw10", "hidraw2", "hidraw", "hidraw0"]
            .iter()
            .map(|n| Path::new("/dev").join(n))
            .collect();
        nodes.sort_by(|a, b| hidraw_order(a, b));
        let names: Vec<_> = nodes
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["hidraw", "hidraw0", "hidraw2", "hidraw10"]);
    }

    #[test]
    fn test_inspect_regular_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hidraw0");
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let node = NodePermissions::inspect(&path).unwrap();
        assert_eq!(node.mode, 0o640);
        assert!(!node.char_device);
        assert!(node.symbolic_mode().starts_with('-'));
    }

    #[test]
    fn test_inspect_missing_node() {
        let result = NodePermissions::inspect(Path::new("/nonexistent/hidraw9"));
        assert!(matches!(result, Err(SystemError::Read { .. })));
    }

    #[test]
    fn test_list_hidraw_nodes() {
        let tmp = TempDir::new().unwrap();
        for name in ["hidraw10", "hidraw1", "hidraw0", "tty0", "null"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        let nodes = list_hidraw_nodes(tmp.path()).unwrap();
        assert_eq!(
            nodes,
            vec![
                tmp.path().join("hidraw0"),
                tmp.path().join("hidraw1"),
                tmp.path().join("hidraw10")
            ]
        );
    }

    #[test]
    fn test_is_accessible() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hidraw0");
        fs::write(&path, "").unwrap();
        assert!(is_accessible(&path));
        assert!(!is_accessible(&tmp.path().join("missing")));
    }
}
