//! Build executor with progress reporting.
//!
//! Steps run strictly in ordinal order. Shared steps run first; variants
//! then run one after another, or side by side when parallel variants are
//! enabled. The first failing step stops the build: every step that did
//! not get to run is recorded as skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;

use crate::builder::command::CommandSpec;
use crate::builder::events::{Reporter, StepOutcome};
use crate::builder::plan::{BuildPlan, BuildStep, StepAction, StepKind};
use crate::core::errors::{BuildError, BuildResult};
use crate::util::fs::{copy_tree, ensure_dir, remove_dir_all_if_exists, replace_in_file};
use crate::util::process::tail_lines;

/// Lines of captured output kept in a failure diagnostic.
const DIAGNOSTIC_LINES: usize = 20;

/// Captured result of one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Tail of the captured output, preferring stderr.
    pub fn diagnostic(&self) -> String {
        let stderr = tail_lines(&self.stderr, DIAGNOSTIC_LINES);
        if stderr.trim().is_empty() {
            tail_lines(&self.stdout, DIAGNOSTIC_LINES)
        } else {
            stderr
        }
    }
}

/// Runs external processes on behalf of the executor.
///
/// An `Err` means the process could not be started at all.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        let output = cmd.to_process().exec()?;
        Ok(CommandOutput {
            exit_status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub kind: StepKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

impl StepRecord {
    fn new(step: &BuildStep, outcome: StepOutcome, elapsed: Duration) -> Self {
        StepRecord {
            index: step.index,
            kind: step.kind,
            label: step.label.clone(),
            variant: step.variant.clone(),
            outcome,
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Result of executing a plan.
#[derive(Debug)]
pub struct BuildReport {
    /// One record per planned step, in ordinal order
    pub records: Vec<StepRecord>,
    pub elapsed: Duration,
    failure: Option<BuildError>,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&BuildError> {
        self.failure.as_ref()
    }

    /// Number of steps that actually ran.
    pub fn steps_run(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome != StepOutcome::Skipped)
            .count()
    }

    pub fn record(&self, index: usize) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.index == index)
    }

    pub fn into_result(self) -> BuildResult<BuildReport> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Failure of a single step.
struct StepFailure {
    exit_status: Option<i32>,
    diagnostic: String,
}

impl StepFailure {
    fn into_error(self, step: &BuildStep) -> BuildError {
        BuildError::StepExecutionFailed {
            step: step.label.clone(),
            index: step.index,
            exit_status: self.exit_status,
            diagnostic: self.diagnostic,
        }
    }
}

/// Executes build plans.
pub struct BuildExecutor<'a> {
    runner: &'a dyn CommandRunner,
    reporter: &'a Reporter,
    parallel: bool,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, reporter: &'a Reporter) -> Self {
        BuildExecutor {
            runner,
            reporter,
            parallel: false,
        }
    }

    /// Run variants concurrently after the shared steps.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Execute every step of the plan.
    pub fn execute(&self, plan: &BuildPlan) -> BuildReport {
        let start = Instant::now();
        let cancel = AtomicBool::new(false);

        let (mut records, mut failure) = self.run_sequence(&plan.shared, &cancel);

        let variant_results: Vec<(Vec<StepRecord>, Option<BuildError>)> =
            if self.parallel && plan.variants.len() > 1 {
                plan.variants
                    .par_iter()
                    .map(|v| self.run_sequence(&v.steps, &cancel))
                    .collect()
            } else {
                plan.variants
                    .iter()
                    .map(|v| self.run_sequence(&v.steps, &cancel))
                    .collect()
            };

        for (variant_records, variant_failure) in variant_results {
            records.extend(variant_records);
            failure = match (failure, variant_failure) {
                (Some(a), Some(b)) => Some(earliest(a, b)),
                (a, b) => a.or(b),
            };
        }
        records.sort_by_key(|r| r.index);

        BuildReport {
            records,
            elapsed: start.elapsed(),
            failure,
        }
    }

    fn run_sequence(
        &self,
        steps: &[BuildStep],
        cancel: &AtomicBool,
    ) -> (Vec<StepRecord>, Option<BuildError>) {
        let mut records = Vec::with_capacity(steps.len());
        let mut failure = None;

        for step in steps {
            if failure.is_some() || cancel.load(Ordering::SeqCst) {
                records.push(StepRecord::new(step, StepOutcome::Skipped, Duration::ZERO));
                continue;
            }

            self.reporter.step_started(step);
            let started = Instant::now();
            let result = self.run_step(step);
            let elapsed = started.elapsed();

            let outcome = match result {
                Ok(()) => StepOutcome::Succeeded,
                Err(ref f) => StepOutcome::Failed {
                    exit_status: f.exit_status,
                },
            };
            self.reporter.step_finished(step, outcome, elapsed);
            records.push(StepRecord::new(step, outcome, elapsed));

            if let Err(f) = result {
                tracing::debug!("step {} `{}` failed", step.index, step.label);
                cancel.store(true, Ordering::SeqCst);
                failure = Some(f.into_error(step));
            }
        }

        (records, failure)
    }

    fn run_step(&self, step: &BuildStep) -> std::result::Result<(), StepFailure> {
        let internal = |e: anyhow::Error| StepFailure {
            exit_status: None,
            diagnostic: format!("{:#}", e),
        };

        match step.action {
            StepAction::Run(ref cmd) => {
                ensure_dir(&cmd.cwd).map_err(internal)?;
                tracing::debug!("running `{}` in {}", cmd.display(), cmd.cwd.display());
                let output = self.runner.run(cmd).map_err(internal)?;
                if output.success() {
                    Ok(())
                } else {
                    Err(StepFailure {
                        exit_status: output.exit_status,
                        diagnostic: output.diagnostic(),
                    })
                }
            }
            StepAction::Stage { ref from, ref to } => {
                remove_dir_all_if_exists(to).map_err(internal)?;
                let files = copy_tree(from, to).map_err(internal)?;
                tracing::debug!("staged {} file(s) into {}", files, to.display());
                Ok(())
            }
            StepAction::Edit {
                ref file,
                ref from,
                ref to,
            } => {
                let count = replace_in_file(file, from, to).map_err(internal)?;
                tracing::debug!("replaced {} occurrence(s) in {}", count, file.display());
                Ok(())
            }
        }
    }
}

/// Of two step failures, the one with the lower ordinal.
fn earliest(a: BuildError, b: BuildError) -> BuildError {
    let index = |e: &BuildError| match e {
        BuildError::StepExecutionFailed { index, .. } => *index,
        _ => usize::MAX,
    };
    if index(&b) < index(&a) {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::builder::plan::{BuildLayout, VariantPlan};
    use crate::test_support::assertions::assert_kind;
    use crate::test_support::{CommandPattern, MockRunner};

    fn run_step(index: usize, program: &str, cwd: &Path, variant: Option<&str>) -> BuildStep {
        BuildStep {
            index,
            kind: StepKind::Compile,
            label: format!("{} #{}", program, index),
            variant: variant.map(String::from),
            action: StepAction::Run(CommandSpec::new(program, cwd)),
        }
    }

    fn variant(name: &str, steps: Vec<BuildStep>, root: &Path) -> VariantPlan {
        VariantPlan {
            name: name.to_string(),
            prefix: root.join("prefix").join(name),
            source_dir: root.join(name),
            env: BTreeMap::new(),
            steps,
            test: None,
        }
    }

    fn plan(shared: Vec<BuildStep>, variants: Vec<VariantPlan>, root: &Path) -> BuildPlan {
        BuildPlan {
            package: "hello".to_string(),
            pkg_version: "1.0".to_string(),
            layout: BuildLayout::new(root.join("work"), root.join("install")),
            shared,
            variants,
        }
    }

    #[test]
    fn test_failure_skips_remaining_steps() {
        let tmp = TempDir::new().unwrap();
        let cwd = tmp.path().join("src");
        let plan = plan(
            vec![
                run_step(1, "true", &cwd, None),
                run_step(2, "false", &cwd, None),
                run_step(3, "true", &cwd, None),
                run_step(4, "true", &cwd, None),
            ],
            vec![],
            tmp.path(),
        );

        let runner = MockRunner::new().fail_on(
            CommandPattern::StartsWith("false".to_string()),
            1,
            "configure: error: boost not found",
        );
        let reporter = Reporter::silent();
        let report = BuildExecutor::new(&runner, &reporter).execute(&plan);

        assert!(!report.success());
        assert_eq!(report.steps_run(), 2);
        assert_eq!(report.record(1).unwrap().outcome, StepOutcome::Succeeded);
        assert_eq!(
            report.record(2).unwrap().outcome,
            StepOutcome::Failed {
                exit_status: Some(1)
            }
        );
        assert_eq!(report.record(3).unwrap().outcome, StepOutcome::Skipped);
        assert_eq!(report.record(4).unwrap().outcome, StepOutcome::Skipped);
        assert_eq!(runner.calls().len(), 2);
        assert!(cwd.is_dir());

        match report.into_result().unwrap_err() {
            BuildError::StepExecutionFailed {
                index,
                exit_status,
                diagnostic,
                ..
            } => {
                assert_eq!(index, 2);
                assert_eq!(exit_status, Some(1));
                assert!(diagnostic.contains("boost not found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_spawn_failure_has_no_exit_status() {
        let tmp = TempDir::new().unwrap();
        let plan = plan(
            vec![run_step(1, "./configure", tmp.path(), None)],
            vec![],
            tmp.path(),
        );
        let runner = MockRunner::new().unspawnable(CommandPattern::Contains("configure".to_string()));
        let reporter = Reporter::silent();
        let report = BuildExecutor::new(&runner, &reporter).execute(&plan);

        assert_eq!(
            report.record(1).unwrap().outcome,
            StepOutcome::Failed { exit_status: None }
        );
    }

    #[test]
    fn test_killed_step_fails_without_exit_code() {
        let tmp = TempDir::new().unwrap();
        let plan = plan(
            vec![
                run_step(1, "./configure", tmp.path(), None),
                run_step(2, "make", tmp.path(), None),
            ],
            vec![],
            tmp.path(),
        );
        let runner = MockRunner::new().kill_on(CommandPattern::Exact("./configure".to_string()));
        let reporter = Reporter::silent();
        let report = BuildExecutor::new(&runner, &reporter).execute(&plan);

        assert_eq!(report.record(2).unwrap().outcome, StepOutcome::Skipped);
        let err = assert_kind(report.into_result(), "step-execution-failed");
        match err {
            BuildError::StepExecutionFailed {
                index, exit_status, ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(exit_status, None);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parallel_variants() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let plan = plan(
            vec![run_step(1, "tar", root, None)],
            vec![
                variant("a", vec![run_step(2, "make", root, Some("a")), run_step(3, "make", root, Some("a"))], root),
                variant("b", vec![run_step(4, "make", root, Some("b")), run_step(5, "make", root, Some("b"))], root),
                variant("c", vec![run_step(6, "make", root, Some("c")), run_step(7, "make", root, Some("c"))], root),
            ],
            root,
        );

        let runner = MockRunner::new();
        let reporter = Reporter::silent();
        let report = BuildExecutor::new(&runner, &reporter)
            .parallel(true)
            .execute(&plan);

        assert!(report.success());
        assert_eq!(report.steps_run(), 7);
        let indices: Vec<usize> = report.records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(runner.calls().len(), 7);
    }

    fn failed_index(report: BuildReport) -> usize {
        match report.into_result().unwrap_err() {
            BuildError::StepExecutionFailed { index, .. } => index,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parallel_variant_failure_skips_rest_of_variant() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let plan = plan(
            vec![run_step(1, "tar", root, None)],
            vec![
                variant(
                    "a",
                    vec![
                        run_step(2, "make", root, Some("a")),
                        run_step(3, "boom", root, Some("a")),
                        run_step(4, "make", root, Some("a")),
                    ],
                    root,
                ),
                variant(
                    "b",
                    vec![run_step(5, "make", root, Some("b")), run_step(6, "make", root, Some("b"))],
                    root,
                ),
            ],
            root,
        );

        let runner = MockRunner::new().fail_on(CommandPattern::Exact("boom".to_string()), 3, "boom");
        let reporter = Reporter::silent();
        let report = BuildExecutor::new(&runner, &reporter)
            .parallel(true)
            .execute(&plan);

        assert_eq!(
            report.record(3).unwrap().outcome,
            StepOutcome::Failed { exit_status: Some(3) }
        );
        assert_eq!(report.record(4).unwrap().outcome, StepOutcome::Skipped);
        assert_eq!(failed_index(report), 3);
    }

    #[test]
    fn test_parallel_failures_report_lowest_index() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let plan = plan(
            vec![],
            vec![
                variant(
                    "a",
                    vec![run_step(1, "fail-a", root, Some("a")), run_step(2, "make", root, Some("a"))],
                    root,
                ),
                variant(
                    "b",
                    vec![run_step(3, "fail-b", root, Some("b")), run_step(4, "make", root, Some("b"))],
                    root,
                ),
            ],
            root,
        );

        let runner = MockRunner::new().fail_on(CommandPattern::StartsWith("fail-".to_string()), 1, "");
        let reporter = Reporter::silent();
        let report = BuildExecutor::new(&runner, &reporter)
            .parallel(true)
            .execute(&plan);

        // Either variant may be cancelled before it starts; whatever failed,
        // the lowest failing ordinal is reported.
        let lowest = report
            .records
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Failed { .. }))
            .map(|r| r.index)
            .min()
            .unwrap();
        assert_eq!(report.record(2).unwrap().outcome, StepOutcome::Skipped);
        assert_eq!(report.record(4).unwrap().outcome, StepOutcome::Skipped);
        assert_eq!(failed_index(report), lowest);
    }

    #[test]
    fn test_earliest_prefers_lower_ordinal() {
        let failure = |index: usize| BuildError::StepExecutionFailed {
            step: format!("make #{}", index),
            index,
            exit_status: Some(1),
            diagnostic: String::new(),
        };
        let pick = |a, b| match earliest(a, b) {
            BuildError::StepExecutionFailed { index, .. } => index,
            other => panic!("unexpected error: {:?}", other),
        };
        assert_eq!(pick(failure(7), failure(3)), 3);
        assert_eq!(pick(failure(3), failure(7)), 3);
    }

    #[test]
    fn test_shared_failure_skips_every_variant() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let plan = plan(
            vec![run_step(1, "patch", root, None)],
            vec![
                variant("a", vec![run_step(2, "make", root, Some("a"))], root),
                variant("b", vec![run_step(3, "make", root, Some("b"))], root),
            ],
            root,
        );

        let runner = MockRunner::new().fail_on(CommandPattern::StartsWith("patch".to_string()), 2, "");
        let reporter = Reporter::silent();
        let report = BuildExecutor::new(&runner, &reporter)
            .parallel(true)
            .execute(&plan);

        assert_eq!(report.steps_run(), 1);
        assert_eq!(report.record(2).unwrap().outcome, StepOutcome::Skipped);
        assert_eq!(report.record(3).unwrap().outcome, StepOutcome::Skipped);
    }

    #[test]
    fn test_stage_and_edit_run_in_process() {
        let tmp = TempDir::new().unwrap();
        let shared = tmp.path().join("src");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("configure"), "ax_python_lib=boost_python\n").unwrap();
        let staged = tmp.path().join("variants/python3/src");

        let steps = vec![
            BuildStep {
                index: 1,
                kind: StepKind::Stage,
                label: "stage [python3]".to_string(),
                variant: Some("python3".to_string()),
                action: StepAction::Stage {
                    from: shared.clone(),
                    to: staged.clone(),
                },
            },
            BuildStep {
                index: 2,
                kind: StepKind::Edit,
                label: "edit configure [python3]".to_string(),
                variant: Some("python3".to_string()),
                action: StepAction::Edit {
                    file: staged.join("configure"),
                    from: "boost_python".to_string(),
                    to: "boost_python3".to_string(),
                },
            },
        ];
        let plan = plan(vec![], vec![variant("python3", steps, tmp.path())], tmp.path());

        let runner = MockRunner::new();
        let reporter = Reporter::silent();
        let report = BuildExecutor::new(&runner, &reporter).execute(&plan);

        assert!(report.success());
        assert!(runner.calls().is_empty());
        assert_eq!(
            std::fs::read_to_string(staged.join("configure")).unwrap(),
            "ax_python_lib=boost_python3\n"
        );
        // The shared tree is untouched.
        assert_eq!(
            std::fs::read_to_string(shared.join("configure")).unwrap(),
            "ax_python_lib=boost_python\n"
        );
    }

    #[test]
    fn test_edit_without_match_fails() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Makefile"), "all:\n").unwrap();
        let step = BuildStep {
            index: 1,
            kind: StepKind::Edit,
            label: "edit Makefile".to_string(),
            variant: None,
            action: StepAction::Edit {
                file: tmp.path().join("Makefile"),
                from: "-lboost_python".to_string(),
                to: "-lboost_python3".to_string(),
            },
        };
        let plan = plan(vec![step], vec![], tmp.path());

        let runner = MockRunner::new();
        let reporter = Reporter::silent();
        let err = BuildExecutor::new(&runner, &reporter)
            .execute(&plan)
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind(), "step-execution-failed");
    }
}
