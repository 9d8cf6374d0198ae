//! Command-line interface for octavi-setup.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, FindArgs, GroupArgs, RulesCommand, SetupArgs};

use crate::logging::Verbosity;

/// octavi-setup - Prepare Linux for the Octavi IFR1
///
/// Installs the USB/HID libraries, writes a udev rule so the device can be
/// used without root, and checks that it is detected. With no command, runs
/// the full setup.
#[derive(Debug, Parser)]
#[command(name = "octavi-setup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to execute (default: setup)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install dependencies, configure permissions and check the device
    Setup(SetupArgs),

    /// Install required system packages
    Install,

    /// Manage udev rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Check that the device is detected and accessible
    Diagnose,

    /// Show permissions of all hidraw nodes
    Hidraw,

    /// Find the device's hidraw nodes
    Find(FindArgs),

    /// Ensure the user is in the device group
    Group(GroupArgs),

    /// Show kernel messages about hidraw and the device
    Logs,

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }

    /// The command to run, defaulting to a full setup.
    #[must_use]
    pub fn command_or_default(self) -> Command {
        self.command
            .unwrap_or_else(|| Command::Setup(SetupArgs::default()))
    }
}
