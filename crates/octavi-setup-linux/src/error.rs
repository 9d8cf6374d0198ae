//! Error types for Linux system operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while talking to the host system.
#[derive(Debug, Error)]
pub enum SystemError {
    /// An external program could not be started.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An external program ran but exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// A sysfs or device file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that couldn't be read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The invoking user could not be determined.
    #[error("could not determine the current user")]
    UnknownUser,

    /// A user or group database lookup failed.
    #[error("user database lookup failed: {0}")]
    Lookup(#[from] nix::errno::Errno),

    /// libusb enumeration failed.
    #[cfg(feature = "libusb")]
    #[error("libusb error: {0}")]
    Usb(#[from] rusb::Error),
}

/// Result type for system operations.
pub type Result<T> = std::result::Result<T, SystemError>;

impl SystemError {
    /// Create a read error for the given path.
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Check if this error was caused by missing permissions.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Spawn { source, .. } | Self::Read { source, .. } => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            Self::CommandFailed { stderr, .. } => {
                let stderr = stderr.to_lowercase();
                stderr.contains("permission denied") || stderr.contains("incorrect password")
            }
            _ => false,
        }
    }
}
