//! Kernel log filtering.
//!
//! `dmesg` shows whether the kernel saw the device and which hidraw node it
//! got. Only lines mentioning hidraw or the device are kept; lines naming the
//! device itself are marked.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use octavi_setup_linux::{CommandRunner, SystemCommand};

use crate::error::{Error, Result};

/// One kept log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    /// The line as printed by `dmesg`.
    pub text: String,
    /// Whether the line names the device.
    pub highlighted: bool,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.highlighted { '>' } else { ' ' };
        write!(f, "{marker} {}", self.text)
    }
}

/// Line filter built from the device name.
#[derive(Debug, Clone)]
pub struct LogFilter {
    keep: Regex,
    highlight: Regex,
}

impl LogFilter {
    /// Build a filter for the given device name.
    ///
    /// Lines are kept when they mention `hidraw` or the first word of the
    /// name (e.g. `octavi`), and highlighted when they contain the full name.
    /// Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern cannot be built.
    pub fn for_device(device_name: &str) -> Result<Self> {
        let name = device_name.trim();
        let first_word = name.split_whitespace().next().unwrap_or(name);

        let keep = if first_word.is_empty() {
            "hidraw".to_string()
        } else {
            format!("hidraw|{}", regex::escape(first_word))
        };
        let highlight = if name.is_empty() {
            // Matches nothing.
            r"[^\s\S]".to_string()
        } else {
            name.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        };

        let build = |pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::internal(format!("log filter pattern: {e}")))
        };
        Ok(Self {
            keep: build(&keep)?,
            highlight: build(&highlight)?,
        })
    }

    /// Filter raw `dmesg` output.
    #[must_use]
    pub fn filter(&self, raw: &str) -> Vec<LogLine> {
        raw.lines()
            .filter(|line| self.keep.is_match(line))
            .map(|line| LogLine {
                text: line.to_string(),
                highlighted: self.highlight.is_match(line),
            })
            .collect()
    }
}

/// Read and filter the kernel log.
///
/// `dmesg` runs elevated since many distributions restrict it.
///
/// # Errors
///
/// Returns an error if `dmesg` fails.
pub fn read_kernel_log(runner: &dyn CommandRunner, device_name: &str) -> Result<Vec<LogLine>> {
    let filter = LogFilter::for_device(device_name)?;
    let command = SystemCommand::new("dmesg").elevated();
    let output = runner.run(&command)?.into_result(&command)?;
    Ok(filter.filter(&output.stdout))
}
