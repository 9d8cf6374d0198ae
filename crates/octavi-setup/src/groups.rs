//! Group membership for device access.
//!
//! The rule grants the device to a group (`plugdev` by default). The user
//! needs to be in that group, and some distributions don't ship it at all.

use std::fmt;

use serde::Serialize;
use tracing::info;

use octavi_setup_linux::{CommandRunner, SystemCommand};

use crate::error::Result;

/// Result of ensuring membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    /// User checked.
    pub user: String,
    /// Group checked.
    pub group: String,
    /// The group had to be created.
    pub group_created: bool,
    /// The user had to be added.
    pub user_added: bool,
}

impl fmt::Display for GroupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group_created {
            writeln!(f, "Created group {}.", self.group)?;
        }
        if self.user_added {
            writeln!(f, "Added user {} to group {}.", self.user, self.group)?;
            writeln!(f, "Log out and back in for the change to take effect.")
        } else {
            writeln!(f, "User {} is already in the {} group.", self.user, self.group)
        }
    }
}

/// Checks and fixes group membership.
pub struct GroupManager<'a> {
    runner: &'a dyn CommandRunner,
    group: String,
}

impl fmt::Debug for GroupManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupManager")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl<'a> GroupManager<'a> {
    /// Create a manager for the given group.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, group: impl Into<String>) -> Self {
        Self {
            runner,
            group: group.into(),
        }
    }

    /// Check if the group exists in the group database.
    ///
    /// # Errors
    ///
    /// Returns an error if `getent` cannot be run.
    pub fn group_exists(&self) -> Result<bool> {
        let output = self
            .runner
            .run(&SystemCommand::new("getent").args(["group", self.group.as_str()]))?;
        Ok(output.success())
    }

    /// Check if the user belongs to the group.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` fails, e.g. for an unknown user.
    pub fn is_member(&self, user: &str) -> Result<bool> {
        let command = SystemCommand::new("id").args(["-nG", user]);
        let output = self.runner.run(&command)?.into_result(&command)?;
        Ok(output.stdout.split_whitespace().any(|g| g == self.group))
    }

    /// Create the group if missing and add the user if not a member.
    ///
    /// # Errors
    ///
    /// Returns an error if any lookup or modification fails.
    pub fn ensure(&self, user: &str) -> Result<GroupOutcome> {
        let group_created = if self.group_exists()? {
            false
        } else {
            let command = SystemCommand::new("groupadd").arg(&self.group).elevated();
            self.runner.run(&command)?.into_result(&command)?;
            info!(group = %self.group, "Created group");
            true
        };

        let user_added = if self.is_member(user)? {
            false
        } else {
            let command = SystemCommand::new("usermod")
                .args(["-a", "-G", self.group.as_str(), user])
                .elevated();
            self.runner.run(&command)?.into_result(&command)?;
            info!(user, group = %self.group, "Added user to group");
            true
        };

        Ok(GroupOutcome {
            user: user.to_string(),
            group: self.group.clone(),
            group_created,
            user_added,
        })
    }
}
