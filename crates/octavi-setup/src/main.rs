//! `octavi-setup` - CLI for preparing Linux for the Octavi IFR1
//!
//! With no command this runs the full setup: install dependencies, write the
//! udev rule, and check the device. Exits 0 when everything succeeded.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fmt::Display;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use octavi_setup::cli::{Cli, Command, ConfigCommand, FindArgs, GroupArgs, RulesCommand};
use octavi_setup::groups::GroupManager;
use octavi_setup::{hidraw, kernel_log, setup};
use octavi_setup::{init_logging, Config, HostDevices, RuleConfigurator};
use octavi_setup_linux as platform;
use platform::HostRunner;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbosity());

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Print a result as JSON or as text.
fn emit<T: Serialize + Display>(json: bool, value: &T) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{value}");
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let json = cli.json;
    let config_path = cli.config.clone();
    let command = cli.command_or_default();

    // These must work when the configuration itself is broken.
    match &command {
        Command::Config(ConfigCommand::Path) => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
            return Ok(true);
        }
        Command::Config(ConfigCommand::Validate { file }) => {
            return Ok(handle_validate(file.clone().or(config_path)));
        }
        _ => {}
    }

    let config = Config::load_from(config_path).context("loading configuration")?;
    let runner = HostRunner::new(config.system.escalation.into());
    let devices = HostDevices::new(config.sysfs(), config.system.usb_backend);

    match command {
        Command::Setup(args) => {
            if !json {
                println!("octavi-setup on {}", platform::platform_description());
            }
            let report = setup::run_setup(&config, &runner, &devices, args.into());
            emit(json, &report)?;
            Ok(report.success())
        }
        Command::Install => {
            let (_, report) = setup::install_step(&runner, &config);
            emit(json, &report)?;
            Ok(report.success())
        }
        Command::Rules(cmd) => handle_rules(&config, &runner, cmd, json),
        Command::Diagnose => {
            let report = setup::diagnose_step(&devices, &config)?;
            emit(json, &report)?;
            Ok(report.is_healthy())
        }
        Command::Hidraw => {
            let nodes = hidraw::list_permissions(&devices)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                print!("{}", hidraw::format_permissions(&nodes));
            }
            Ok(true)
        }
        Command::Find(FindArgs { fix }) => {
            let mode = fix.then_some(config.rules.mode.as_str());
            let report =
                hidraw::find_device_nodes(&devices, &runner, &config.device_profile()?, mode)?;
            emit(json, &report)?;
            Ok(report.success())
        }
        Command::Group(GroupArgs { user }) => {
            let user = match user {
                Some(user) => user,
                None => platform::current_user()?,
            };
            let outcome = GroupManager::new(&runner, &config.rules.group).ensure(&user)?;
            emit(json, &outcome)?;
            Ok(true)
        }
        Command::Logs => {
            let lines = kernel_log::read_kernel_log(&runner, &config.device.name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&lines)?);
            } else if lines.is_empty() {
                println!("No kernel messages about hidraw or {}.", config.device.name);
            } else {
                for line in &lines {
                    println!("{line}");
                }
            }
            Ok(true)
        }
        Command::Config(ConfigCommand::Show) => {
            handle_config_show(&config, json)?;
            Ok(true)
        }
        Command::Config(ConfigCommand::Path | ConfigCommand::Validate { .. }) => Ok(true),
    }
}

fn handle_rules(
    config: &Config,
    runner: &HostRunner,
    cmd: RulesCommand,
    json: bool,
) -> anyhow::Result<bool> {
    let rules = RuleConfigurator::from_config(runner, config)?;
    match cmd {
        RulesCommand::Create => {
            let outcome = rules.apply()?;
            emit(json, &outcome)?;
        }
        RulesCommand::List => {
            let names = rules.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else if names.is_empty() {
                println!(
                    "No device rule files in {}.",
                    config.rules.directory.display()
                );
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
        RulesCommand::Show { name } => {
            let content = rules.show(&name)?;
            if json {
                let value = serde_json::json!({ "name": name, "content": content });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{content}");
            }
        }
        RulesCommand::Reload => {
            rules.reload_rules()?;
            println!("udev rules reloaded.");
        }
        RulesCommand::Trigger => {
            rules.trigger()?;
            println!("udev rules triggered.");
        }
    }
    Ok(true)
}

fn handle_validate(file: Option<std::path::PathBuf>) -> bool {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    if !path.exists() {
        println!("File not found; defaults and environment variables apply.");
    }
    match Config::load_from(Some(path)) {
        Ok(_) => {
            println!("Configuration is valid.");
            true
        }
        Err(e) => {
            println!("Configuration error: {e}");
            false
        }
    }
}

fn handle_config_show(config: &Config, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("[Device]");
    println!("  Name:               {}", config.device.name);
    println!("  Vendor id:          {}", config.device.vendor_id);
    println!("  Product id:         {}", config.device.product_id);
    println!();
    println!("[Rules]");
    println!("  Rule file:          {}", config.rule_path().display());
    println!("  Mode:               {}", config.rules.mode);
    println!("  Group:              {}", config.rules.group);
    println!("  hidraw rule:        {}", config.rules.include_hidraw);
    println!("  Reload udev:        {}", config.rules.reload);
    println!();
    println!("[Packages]");
    match config.packages.manager {
        Some(manager) => println!("  Manager:            {manager}"),
        None => println!("  Manager:            (detect)"),
    }
    if config.packages.names.is_empty() {
        println!("  Packages:           (manager defaults)");
    } else {
        println!("  Packages:           {}", config.packages.names.join(", "));
    }
    println!();
    println!("[System]");
    println!("  sysfs root:         {}", config.system.sysfs_root.display());
    println!("  dev root:           {}", config.system.dev_root.display());
    println!("  Escalation:         {:?}", config.system.escalation);
    println!("  USB backend:        {}", config.system.usb_backend);
    println!("  libusb compiled in: {}", platform::libusb_available());
    Ok(())
}

