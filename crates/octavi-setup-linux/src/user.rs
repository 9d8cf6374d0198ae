//! Current user and root detection.

use nix::unistd::{Group, Uid, User};

use crate::error::{Result, SystemError};

/// Check if the process runs with an effective uid of 0.
#[must_use]
pub fn is_root() -> bool {
    Uid::effective().is_root()
}

/// Name of the user the setup is being done for.
///
/// When invoked through `sudo` this is the user who ran `sudo`, not root,
/// so that group membership lands on the right account.
///
/// # Errors
///
/// Returns an error if no user name can be determined.
pub fn current_user() -> Result<String> {
    resolve_user(
        is_root(),
        std::env::var("SUDO_USER").ok(),
        std::env::var("USER").ok(),
    )
}

fn resolve_user(root: bool, sudo_user: Option<String>, user: Option<String>) -> Result<String> {
    let non_empty = |name: Option<String>| name.filter(|n| !n.trim().is_empty());

    if root {
        if let Some(name) = non_empty(sudo_user).filter(|n| n != "root") {
            return Ok(name);
        }
    }
    if let Some(name) = non_empty(user) {
        return Ok(name);
    }
    User::from_uid(Uid::current())?
        .map(|u| u.name)
        .ok_or(SystemError::UnknownUser)
}

/// Look up a user name by uid, falling back to the numeric id.
#[must_use]
pub fn user_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

/// Look up a group name by gid, falling back to the numeric id.
#[must_use]
pub fn group_name(gid: u32) -> String {
    match Group::from_gid(nix::unistd::Gid::from_raw(gid)) {
        Ok(Some(group)) => group.name,
        _ => gid.to_string(),
    }
}
