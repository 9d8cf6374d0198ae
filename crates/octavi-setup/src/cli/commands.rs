//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::setup::SetupOptions;

/// Full setup arguments.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct SetupArgs {
    /// Skip dependency installation
    #[arg(long)]
    pub skip_install: bool,

    /// Skip writing the udev rule
    #[arg(long)]
    pub skip_rules: bool,
}

impl From<SetupArgs> for SetupOptions {
    fn from(args: SetupArgs) -> Self {
        Self {
            skip_install: args.skip_install,
            skip_rules: args.skip_rules,
        }
    }
}

/// udev rule commands.
#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// Write the device rule and reload udev
    Create,

    /// List the device's rule files
    List,

    /// Print a rule file
    Show {
        /// Rule file name, e.g. 99-octavi.rules
        name: String,
    },

    /// Reload udev rules
    Reload,

    /// Re-apply rules to attached devices
    Trigger,
}

/// Device node search arguments.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct FindArgs {
    /// chmod the device's nodes to the configured mode (until replug)
    #[arg(long)]
    pub fix: bool,
}

/// Group membership arguments.
#[derive(Debug, Clone, Default, Args)]
pub struct GroupArgs {
    /// User to check (defaults to the invoking user)
    #[arg(short, long)]
    pub user: Option<String>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration (with --json for machine output)
    Show,

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
