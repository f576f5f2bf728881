//! Build events and progress reporting.
//!
//! This module defines the stable JSON schema for machine-readable build output.
//! These events are emitted when using `--message-format=json`.
//!
//! # Event Types
//!
//! - `build-started`: The plan is about to run
//! - `step-started`: A step began
//! - `step-finished`: A step ended (succeeded, failed or skipped)
//! - `verification`: A variant's smoke test ran
//! - `build-finished`: Build completed (success or failure)
//! - `diagnostic`: A free-form message
//!
//! # Stability
//!
//! The JSON schema is versioned and should remain backwards compatible.
//! New fields may be added, but existing fields should not be removed or renamed.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::builder::plan::{BuildStep, StepKind};

/// How build progress is presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageFormat {
    /// Progress bar and status lines on stderr
    #[default]
    Human,
    /// One JSON event per line on stdout
    Json,
}

/// Final state of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum StepOutcome {
    Succeeded,
    Failed {
        /// `None` when the process was killed by a signal or never started
        exit_status: Option<i32>,
    },
    Skipped,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }
}

/// A build event emitted during the build process.
///
/// Each event is serialized as a single JSON object per line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    #[serde(rename = "build-started")]
    BuildStarted {
        /// Package identifier (e.g., "graph-tool 2.18_4")
        package_id: String,
        variants: Vec<String>,
        steps: usize,
    },

    #[serde(rename = "step-started")]
    StepStarted {
        index: usize,
        kind: StepKind,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        variant: Option<String>,
    },

    #[serde(rename = "step-finished")]
    StepFinished {
        index: usize,
        label: String,
        outcome: StepOutcome,
        duration_ms: u64,
    },

    #[serde(rename = "verification")]
    Verification {
        variant: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_status: Option<i32>,
    },

    /// Build completed (success or failure).
    #[serde(rename = "build-finished")]
    BuildFinished {
        success: bool,
        /// Total build duration in milliseconds
        duration_ms: u64,
        steps_run: usize,
    },

    /// A generic diagnostic message.
    #[serde(rename = "diagnostic")]
    Diagnostic {
        /// Severity level ("error", "warning", "note", "help")
        level: String,
        message: String,
    },
}

impl BuildEvent {
    pub fn started(package_id: impl Into<String>, variants: Vec<String>, steps: usize) -> Self {
        BuildEvent::BuildStarted {
            package_id: package_id.into(),
            variants,
            steps,
        }
    }

    pub fn step_started(step: &BuildStep) -> Self {
        BuildEvent::StepStarted {
            index: step.index,
            kind: step.kind,
            label: step.label.clone(),
            variant: step.variant.clone(),
        }
    }

    pub fn step_finished(step: &BuildStep, outcome: StepOutcome, elapsed: Duration) -> Self {
        BuildEvent::StepFinished {
            index: step.index,
            label: step.label.clone(),
            outcome,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn finished(success: bool, duration_ms: u64, steps_run: usize) -> Self {
        BuildEvent::BuildFinished {
            success,
            duration_ms,
            steps_run,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        BuildEvent::Diagnostic {
            level: "error".to_string(),
            message: message.into(),
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Presents build progress in the selected format.
///
/// Safe to share between variant workers.
#[derive(Debug)]
pub struct Reporter {
    format: MessageFormat,
    bar: Option<ProgressBar>,
    verbose: bool,
    quiet: bool,
}

impl Reporter {
    pub fn new(format: MessageFormat) -> Self {
        Reporter {
            format,
            bar: None,
            verbose: false,
            quiet: false,
        }
    }

    /// A reporter that prints nothing.
    pub fn silent() -> Self {
        Reporter {
            format: MessageFormat::Human,
            bar: Some(ProgressBar::hidden()),
            verbose: false,
            quiet: true,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    /// Begin a build of `total` steps.
    pub fn begin(&mut self, package_id: &str, variants: Vec<String>, total: usize) {
        match self.format {
            MessageFormat::Json => self.emit(&BuildEvent::started(package_id, variants, total)),
            MessageFormat::Human if self.quiet => {}
            MessageFormat::Human => {
                eprintln!("    Building {} ({})", package_id, variants.join(", "));
                if self.bar.is_none() && !self.verbose && total > 1 {
                    let bar = ProgressBar::new(total as u64);
                    if let Ok(style) = ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    {
                        bar.set_style(style.progress_chars("#>-"));
                    }
                    self.bar = Some(bar);
                }
            }
        }
    }

    pub fn step_started(&self, step: &BuildStep) {
        match self.format {
            MessageFormat::Json => self.emit(&BuildEvent::step_started(step)),
            MessageFormat::Human => match self.bar {
                Some(ref bar) => bar.set_message(step.label.clone()),
                None => eprintln!("{:>12} {}", step.kind.verb(), step.label),
            },
        }
    }

    pub fn step_finished(&self, step: &BuildStep, outcome: StepOutcome, elapsed: Duration) {
        match self.format {
            MessageFormat::Json => self.emit(&BuildEvent::step_finished(step, outcome, elapsed)),
            MessageFormat::Human => {
                if let Some(ref bar) = self.bar {
                    bar.inc(1);
                }
            }
        }
    }

    pub fn verification(&self, variant: &str, success: bool, exit_status: Option<i32>) {
        match self.format {
            MessageFormat::Json => self.emit(&BuildEvent::Verification {
                variant: variant.to_string(),
                success,
                exit_status,
            }),
            MessageFormat::Human => {
                let status = if success { "ok" } else { "FAILED" };
                self.println(format!("     Testing {} ... {}", variant, status));
            }
        }
    }

    pub fn finish(&self, success: bool, elapsed: Duration, steps_run: usize) {
        match self.format {
            MessageFormat::Json => self.emit(&BuildEvent::finished(
                success,
                elapsed.as_millis() as u64,
                steps_run,
            )),
            MessageFormat::Human => {
                if let Some(ref bar) = self.bar {
                    bar.finish_and_clear();
                }
                if success && !self.quiet {
                    eprintln!(
                        "    Finished {} step(s) in {:.2}s",
                        steps_run,
                        elapsed.as_secs_f64()
                    );
                }
            }
        }
    }

    fn println(&self, line: String) {
        if self.quiet {
            return;
        }
        match self.bar {
            Some(ref bar) => bar.suspend(|| eprintln!("{}", line)),
            None => eprintln!("{}", line),
        }
    }

    fn emit(&self, event: &BuildEvent) {
        println!("{}", event.to_json());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_serialization() {
        let event = BuildEvent::finished(true, 2340, 7);
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"build-finished\""));
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"duration_ms\":2340"));
        assert!(json.contains("\"steps_run\":7"));
    }

    #[test]
    fn test_step_outcome_serialization() {
        let event = BuildEvent::StepFinished {
            index: 2,
            label: "configure [python3]".to_string(),
            outcome: StepOutcome::Failed {
                exit_status: Some(77),
            },
            duration_ms: 12,
        };
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"step-finished\""));
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"exit_status\":77"));
    }

    #[test]
    fn test_signal_outcome_has_null_exit() {
        let json = serde_json::to_string(&StepOutcome::Failed { exit_status: None }).unwrap();
        assert_eq!(json, "{\"status\":\"failed\",\"exit_status\":null}");
    }

    #[test]
    fn test_verification_serialization() {
        let event = BuildEvent::Verification {
            variant: "python".to_string(),
            success: true,
            exit_status: None,
        };
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"verification\""));
        assert!(!json.contains("exit_status"));
    }
}
