//! Full setup run: install dependencies, write the udev rule, diagnose.
//!
//! The steps share no state and each runs even if an earlier one failed, so
//! the user sees every problem in one pass.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

use octavi_setup_linux::CommandRunner;

use crate::config::Config;
use crate::device::DeviceSource;
use crate::diagnostics::{DiagnosticChecker, DiagnosticReport};
use crate::error::{Error, Result};
use crate::installer::{InstallReport, Installer};
use crate::rules::{RuleConfigurator, RuleOutcome};

/// Appended to failures caused by missing privileges.
const PRIVILEGE_HINT: &str = "Re-run with sudo, or set system.escalation = \"sudo\".";

/// A setup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Dependency installation.
    Install,
    /// udev rule configuration.
    Rules,
    /// Device diagnostics.
    Diagnose,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "Install dependencies"),
            Self::Rules => write!(f, "Configure device permissions"),
            Self::Diagnose => write!(f, "Check device"),
        }
    }
}

/// Outcome of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// Which step.
    pub step: Step,
    /// Whether it succeeded. Skipped steps count as successful.
    pub success: bool,
    /// Whether it was skipped.
    pub skipped: bool,
    /// Human-readable report.
    pub message: String,
    /// Structured report, when the step produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StepResult {
    fn skipped(step: Step) -> Self {
        Self {
            step,
            success: true,
            skipped: true,
            message: "skipped".to_string(),
            details: None,
        }
    }

    fn from_report<T: Serialize + fmt::Display>(step: Step, success: bool, report: &T) -> Self {
        let details = match serde_json::to_value(report) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(step = ?step, error = %e, "Could not serialize step report");
                None
            }
        };
        Self {
            step,
            success,
            skipped: false,
            message: report.to_string(),
            details,
        }
    }

    fn failed(step: Step, err: &Error) -> Self {
        let mut message = err.to_string();
        // PermissionMissing carries its own instructions.
        if err.is_permission_error() && !matches!(err, Error::PermissionMissing { .. }) {
            message.push('\n');
            message.push_str(PRIVILEGE_HINT);
        }
        Self {
            step,
            success: false,
            skipped: false,
            message,
            details: None,
        }
    }
}

/// Results of a full run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupReport {
    /// One result per step, in run order.
    pub steps: Vec<StepResult>,
}

impl SetupReport {
    /// Check if every step succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }
}

impl fmt::Display for SetupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, result) in self.steps.iter().enumerate() {
            let status = match (result.skipped, result.success) {
                (true, _) => "SKIP",
                (false, true) => "OK",
                (false, false) => "FAIL",
            };
            writeln!(f, "[{}/{}] {} ... {status}", i + 1, self.steps.len(), result.step)?;
            for line in result.message.lines() {
                writeln!(f, "    {line}")?;
            }
        }
        if self.success() {
            writeln!(f, "Setup complete.")
        } else {
            writeln!(f, "Setup finished with errors.")
        }
    }
}

/// Which steps to skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupOptions {
    /// Skip dependency installation.
    pub skip_install: bool,
    /// Skip rule configuration.
    pub skip_rules: bool,
}

/// Run the install step.
#[must_use]
pub fn install_step(runner: &dyn CommandRunner, config: &Config) -> (StepResult, InstallReport) {
    let report = Installer::from_config(runner, &config.packages).run();
    let result = StepResult::from_report(Step::Install, report.success(), &report);
    (result, report)
}

/// Run the rules step.
///
/// # Errors
///
/// Returns an error if the rule cannot be written or udev reloaded.
pub fn rules_step(runner: &dyn CommandRunner, config: &Config) -> Result<RuleOutcome> {
    RuleConfigurator::from_config(runner, config)?.apply()
}

/// Run the diagnostics step.
///
/// # Errors
///
/// Returns an error if the device list cannot be read.
pub fn diagnose_step(source: &dyn DeviceSource, config: &Config) -> Result<DiagnosticReport> {
    DiagnosticChecker::new(source, config.device_profile()?).check()
}

/// Run all steps in order.
#[must_use]
pub fn run_setup(
    config: &Config,
    runner: &dyn CommandRunner,
    source: &dyn DeviceSource,
    options: SetupOptions,
) -> SetupReport {
    let mut steps = Vec::with_capacity(3);

    steps.push(if options.skip_install {
        StepResult::skipped(Step::Install)
    } else {
        install_step(runner, config).0
    });

    steps.push(if options.skip_rules {
        StepResult::skipped(Step::Rules)
    } else {
        match rules_step(runner, config) {
            Ok(outcome) => StepResult::from_report(Step::Rules, true, &outcome),
            Err(e) => StepResult::failed(Step::Rules, &e),
        }
    });

    steps.push(match diagnose_step(source, config) {
        Ok(report) => StepResult::from_report(Step::Diagnose, report.is_healthy(), &report),
        Err(e) => StepResult::failed(Step::Diagnose, &e),
    });

    for result in &steps {
        if result.success {
            info!(step = ?result.step, skipped = result.skipped, "Step finished");
        } else {
            error!(step = ?result.step, "Step failed");
        }
    }

    SetupReport { steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::PackageManagerKind;
    use crate::test_support::{FakeDevices, ScriptedRunner};
    use octavi_setup_linux::CommandOutput;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.rules.directory = dir.path().to_path_buf();
        config.packages.manager = Some(PackageManagerKind::Apt);
        config.packages.names = vec!["udev".to_string()];
        config
    }

    fn healthy_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .respond(
                "dpkg-query -W -f=${Status} udev",
                CommandOutput::ok("install ok installed"),
            )
            .respond("udevadm control --reload-rules", CommandOutput::ok(""))
            .respond("udevadm trigger", CommandOutput::ok(""))
    }

    fn healthy_devices() -> FakeDevices {
        FakeDevices::default()
            .with_usb("1-4", 0x04d8, 0xe6d6)
            .with_hidraw("hidraw0", 0x04d8, 0xe6d6, 0o666)
    }

    #[test]
    fn test_all_steps_succeed() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let report = run_setup(
            &config,
            &healthy_runner(),
            &healthy_devices(),
            SetupOptions::default(),
        );

        assert!(report.success(), "{report}");
        assert_eq!(report.steps.len(), 3);
        assert!(report.to_string().contains("Setup complete."));
        assert!(tmp.path().join("99-octavi.rules").exists());
    }

    #[test]
    fn test_failures_do_not_stop_later_steps() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        // Nothing scripted: install fails, udevadm fails.
        let runner = ScriptedRunner::new();
        let report = run_setup(&config, &runner, &healthy_devices(), SetupOptions::default());

        assert!(!report.success());
        assert!(!report.steps[0].success);
        assert!(!report.steps[1].success);
        assert!(report.steps[2].success);
        assert!(report.to_string().contains("FAIL"));
    }

    #[test]
    fn test_denied_reload_suggests_sudo() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let runner = healthy_runner().respond(
            "udevadm control --reload-rules",
            CommandOutput::failed(1, "Failed to send reload request: Permission denied"),
        );
        let report = run_setup(&config, &runner, &healthy_devices(), SetupOptions::default());

        assert!(!report.steps[1].success);
        assert!(report.steps[1].message.ends_with(PRIVILEGE_HINT));
        assert!(report.steps[0].success);
    }

    #[test]
    fn test_other_failures_get_no_hint() {
        let result = StepResult::failed(
            Step::Rules,
            &Error::RulesDirMissing {
                path: std::path::PathBuf::from("/etc/udev/rules.d"),
            },
        );
        assert!(!result.message.contains(PRIVILEGE_HINT));

        let denied = Error::permission_missing("write access", "Use sudo.");
        let result = StepResult::failed(Step::Rules, &denied);
        assert_eq!(result.message.matches("sudo").count(), 1);
    }

    #[test]
    fn test_absent_device_fails_setup() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let report = run_setup(
            &config,
            &healthy_runner(),
            &FakeDevices::default(),
            SetupOptions::default(),
        );

        assert!(!report.success());
        assert!(report.steps[2].message.contains("not found"));
    }

    #[test]
    fn test_skipped_steps() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let runner = ScriptedRunner::new();
        let report = run_setup(
            &config,
            &runner,
            &healthy_devices(),
            SetupOptions {
                skip_install: true,
                skip_rules: true,
            },
        );

        assert!(report.success());
        assert!(report.steps[0].skipped);
        assert!(report.steps[1].skipped);
        assert!(runner.calls().is_empty());
        assert!(!tmp.path().join("99-octavi.rules").exists());
    }

    #[test]
    fn test_unserializable_report_keeps_message() {
        // Tuple map keys have no JSON form.
        #[derive(Serialize)]
        struct Tally(std::collections::BTreeMap<(u8, u8), u8>);

        impl fmt::Display for Tally {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} entries", self.0.len())
            }
        }

        let report = Tally([((1, 2), 3)].into_iter().collect());
        let result = StepResult::from_report(Step::Diagnose, true, &report);
        assert_eq!(result.message, "1 entries");
        assert!(result.details.is_none());
    }

    #[test]
    fn test_report_json_has_details() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let report = run_setup(
            &config,
            &healthy_runner(),
            &healthy_devices(),
            SetupOptions::default(),
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][0]["step"], "install");
        assert_eq!(json["steps"][1]["details"]["change"], "created");
        assert_eq!(json["steps"][2]["details"]["found"], true);
    }
}
