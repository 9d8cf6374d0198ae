//! Error types for octavi-setup.
//!
//! This module defines all error types used throughout the octavi-setup crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

use octavi_setup_linux::SystemError;

/// The main error type for octavi-setup operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Device Errors ===
    /// A USB vendor or product id could not be parsed.
    #[error("invalid USB id '{value}': expected 4 hex digits")]
    InvalidUsbId {
        /// The rejected value.
        value: String,
    },

    // === Rule Errors ===
    /// The udev rules directory does not exist.
    #[error("udev rules directory {path} does not exist")]
    RulesDirMissing {
        /// The expected directory.
        path: PathBuf,
    },

    /// A rule file name was rejected.
    #[error("invalid rule file name '{name}'")]
    InvalidRuleName {
        /// The rejected name.
        name: String,
    },

    /// Writing the rule file failed.
    #[error("failed to write rule file {path}: {message}")]
    RuleWrite {
        /// Path of the rule file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    // === Platform Errors ===
    /// Required platform permission is missing.
    #[error("missing permission: {permission}. {instructions}")]
    PermissionMissing {
        /// Name of the required permission.
        permission: String,
        /// Instructions for granting the permission.
        instructions: String,
    },

    /// A host system operation failed.
    #[error(transparent)]
    System(#[from] SystemError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for octavi-setup operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a permission missing error with instructions.
    #[must_use]
    pub fn permission_missing(
        permission: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self::PermissionMissing {
            permission: permission.into(),
            instructions: instructions.into(),
        }
    }

    /// Check if this error is a permission issue.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::PermissionMissing { .. } => true,
            Self::System(err) => err.is_permission_denied(),
            Self::Io(err) => err.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("bad mode");
        assert_eq!(err.to_string(), "invalid configuration: bad mode");

        let err = Error::internal("oops");
        assert_eq!(err.to_string(), "internal error: oops");
    }

    #[test]
    fn test_invalid_usb_id_display() {
        let err = Error::InvalidUsbId {
            value: "zz".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("zz"));
        assert!(msg.contains("4 hex digits"));
    }

    #[test]
    fn test_permission_error_display() {
        let err = Error::permission_missing(
            "write access to /etc/udev/rules.d",
            "Re-run with sudo or enable escalation in the config",
        );
        let msg = err.to_string();
        assert!(msg.contains("/etc/udev/rules.d"));
        assert!(msg.contains("sudo"));
        assert!(err.is_permission_error());
    }

    #[test]
    fn test_is_permission_error_for_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(Error::from(io_err).is_permission_error());

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(!Error::from(io_err).is_permission_error());
    }

    #[test]
    fn test_system_error_is_transparent() {
        let err: Error = SystemError::UnknownUser.into();
        assert_eq!(err.to_string(), "could not determine the current user");
    }

    #[test]
    fn test_rules_dir_missing_display() {
        let err = Error::RulesDirMissing {
            path: PathBuf::from("/etc/udev/rules.d"),
        };
        assert!(err.to_string().contains("/etc/udev/rules.d"));
    }

    #[test]
    fn test_rule_write_display() {
        let err = Error::RuleWrite {
            path: PathBuf::from("/etc/udev/rules.d/99-octavi.rules"),
            message: "read-only file system".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("99-octavi.rules"));
        assert!(msg.contains("read-only"));
    }
}
