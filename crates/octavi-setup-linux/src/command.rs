//! External command execution.
//!
//! Everything the setup tool does to the host beyond reading sysfs goes
//! through a [`CommandRunner`]: package queries, `udevadm`, `getent`,
//! `usermod`, `dmesg` and friends. Commands that need root are marked
//! [`Privilege::Elevated`] and are prefixed with `sudo` by the [`HostRunner`]
//! unless the process already runs as root.

use std::fmt;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, trace};

use crate::error::{Result, SystemError};
use crate::user;

/// Privilege level a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privilege {
    /// Run as the invoking user.
    #[default]
    User,
    /// Run as root.
    Elevated,
}

/// How elevated commands gain root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escalation {
    /// Prefix elevated commands with `sudo`.
    #[default]
    Sudo,
    /// Run elevated commands as-is and let them fail without root.
    None,
}

/// A command line to run on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemCommand {
    program: String,
    args: Vec<String>,
    privilege: Privilege,
    stdin: Option<Vec<u8>>,
}

impl SystemCommand {
    /// Create a command for the given program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privilege: Privilege::User,
            stdin: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Mark the command as requiring root.
    #[must_use]
    pub fn elevated(mut self) -> Self {
        self.privilege = Privilege::Elevated;
        self
    }

    /// Feed the given bytes to the command's standard input.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// The program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments, without the program name.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The privilege level.
    #[must_use]
    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// Check if the command must run as root.
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.privilege == Privilege::Elevated
    }

    /// Standard input, if any.
    #[must_use]
    pub fn input(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }
}

impl fmt::Display for SystemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub status: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Check if the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Convert a non-zero exit into a [`SystemError::CommandFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the command did not succeed.
    pub fn into_result(self, command: &SystemCommand) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let status = match self.status {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(SystemError::CommandFailed {
            command: command.to_string(),
            status,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs commands against the host.
pub trait CommandRunner {
    /// Run the command to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; callers decide with
    /// [`CommandOutput::success`] or [`CommandOutput::into_result`].
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started.
    fn run(&self, command: &SystemCommand) -> Result<CommandOutput>;

    /// Check if a program is available on `PATH`.
    fn program_exists(&self, program: &str) -> bool;
}

/// [`CommandRunner`] backed by `std::process`.
#[derive(Debug, Clone)]
pub struct HostRunner {
    escalation: Escalation,
    is_root: bool,
}

impl HostRunner {
    /// Create a runner using the given escalation method.
    #[must_use]
    pub fn new(escalation: Escalation) -> Self {
        Self {
            escalation,
            is_root: user::is_root(),
        }
    }

    /// Check if elevated commands will be wrapped in `sudo`.
    #[must_use]
    pub fn uses_sudo(&self) -> bool {
        !self.is_root && self.escalation == Escalation::Sudo
    }

    fn build(&self, command: &SystemCommand) -> Command {
        let mut cmd = if command.is_elevated() && self.uses_sudo() {
            let mut sudo = Command::new("sudo");
            sudo.arg("--").arg(command.program());
            sudo
        } else {
            Command::new(command.program())
        };
        cmd.args(command.arguments());
        cmd.stdin(if command.input().is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

impl Default for HostRunner {
    fn default() -> Self {
        Self::new(Escalation::default())
    }
}

impl CommandRunner for HostRunner {
    fn run(&self, command: &SystemCommand) -> Result<CommandOutput> {
        debug!(command = %command, elevated = command.is_elevated(), "Running command");

        let spawn_err = |source| SystemError::Spawn {
            program: command.program().to_string(),
            source,
        };

        let mut child = self.build(command).spawn().map_err(spawn_err)?;

        if let Some(input) = command.input() {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input).map_err(spawn_err)?;
            }
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(status = ?result.status, "Command finished");
        Ok(result)
    }

    fn program_exists(&self, program: &str) -> bool {
        find_program(program).is_some()
    }
}

/// Locate an executable on `PATH`.
#[must_use]
pub fn find_program(program: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
