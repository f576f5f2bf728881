//! Post-install smoke tests.
//!
//! Each built variant is exercised once: the recipe's test files are written
//! into a fresh temporary directory and the test command runs there with the
//! variant's environment and `PREFIX` pointing at its install prefix.

use serde::Serialize;

use crate::builder::command::CommandSpec;
use crate::builder::events::Reporter;
use crate::builder::executor::CommandRunner;
use crate::builder::plan::{BuildPlan, VariantPlan};
use crate::core::errors::{BuildError, BuildResult};
use crate::util::fs::{is_contained_relative, write_string};

/// Result of one variant's smoke test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResult {
    pub variant: String,
    pub command: String,
    pub exit_status: Option<i32>,
}

/// Reject test file names that would escape the scratch directory.
fn check_file_name(variant: &str, name: &str) -> BuildResult<()> {
    if !is_contained_relative(name) {
        return Err(BuildError::malformed(
            format!("test.files.{}", name),
            format!("test file for variant `{}` must be a relative path", variant),
        ));
    }
    Ok(())
}

/// Run the smoke test of one variant.
///
/// Returns `Ok(None)` when the recipe has no test.
pub fn verify_variant(
    runner: &dyn CommandRunner,
    variant: &VariantPlan,
) -> BuildResult<Option<VerifyResult>> {
    let Some(ref test) = variant.test else {
        return Ok(None);
    };

    let scratch = tempfile::Builder::new()
        .prefix(&format!("cellar-test-{}-", variant.name))
        .tempdir()
        .map_err(|e| BuildError::io("failed to create test directory", e))?;

    for (name, contents) in &test.files {
        check_file_name(&variant.name, name)?;
        write_string(&scratch.path().join(name), contents)
            .map_err(|e| BuildError::io(format!("failed to write test file `{}`", name), e))?;
    }

    let cmd = CommandSpec::from_argv(&test.run, scratch.path())
        .ok_or_else(|| BuildError::malformed("test.run", "empty command"))?
        .envs(&variant.env)
        .envs(&test.env)
        .env("PREFIX", variant.prefix.display().to_string());
    let command = cmd.display();

    tracing::debug!("testing variant `{}` with `{}`", variant.name, command);

    let fail = |exit_status: Option<i32>, diagnostic: String| BuildError::VerificationFailed {
        variant: variant.name.clone(),
        command: command.clone(),
        exit_status,
        diagnostic,
    };

    match runner.run(&cmd) {
        Ok(output) if output.success() => Ok(Some(VerifyResult {
            variant: variant.name.clone(),
            command: command.clone(),
            exit_status: output.exit_status,
        })),
        Ok(output) => Err(fail(output.exit_status, output.diagnostic())),
        Err(e) => Err(fail(None, format!("{:#}", e))),
    }
}

/// Run the smoke test of every variant in the plan, stopping at the first
/// failure.
pub fn verify(
    runner: &dyn CommandRunner,
    plan: &BuildPlan,
    reporter: &Reporter,
) -> BuildResult<Vec<VerifyResult>> {
    let mut results = Vec::new();
    for variant in &plan.variants {
        match verify_variant(runner, variant) {
            Ok(Some(result)) => {
                reporter.verification(&variant.name, true, result.exit_status);
                results.push(result);
            }
            Ok(None) => {}
            Err(err) => {
                if let BuildError::VerificationFailed { exit_status, .. } = &err {
                    reporter.verification(&variant.name, false, *exit_status);
                }
                return Err(err);
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::builder::plan::VerifySpec;
    use crate::test_support::{CommandPattern, MockRunner};

    fn variant(run: &[&str], files: &[(&str, &str)]) -> VariantPlan {
        let mut env = BTreeMap::new();
        env.insert(
            "PYTHONPATH".to_string(),
            "/opt/cellar/graph-tool/2.18_4/python/lib/python2.7/site-packages".to_string(),
        );
        VariantPlan {
            name: "python".to_string(),
            prefix: PathBuf::from("/opt/cellar/graph-tool/2.18_4/python"),
            source_dir: PathBuf::from("/work/variants/python/src"),
            env,
            steps: Vec::new(),
            test: Some(VerifySpec {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                run: run.iter().map(|s| s.to_string()).collect(),
                env: BTreeMap::new(),
            }),
        }
    }

    #[test]
    fn test_passing_smoke_test() {
        let runner = MockRunner::new();
        let result = verify_variant(&runner, &variant(&["python", "test.py"], &[("test.py", "import graph_tool\n")]))
            .unwrap()
            .unwrap();
        assert_eq!(result.command, "python test.py");
        assert_eq!(runner.calls(), vec!["python test.py"]);
    }

    #[test]
    fn test_failing_smoke_test() {
        let runner = MockRunner::new().fail_on(
            CommandPattern::StartsWith("python".to_string()),
            1,
            "ImportError: No module named graph_tool",
        );
        let err = verify_variant(&runner, &variant(&["python", "test.py"], &[])).unwrap_err();
        match err {
            BuildError::VerificationFailed {
                variant,
                exit_status,
                diagnostic,
                ..
            } => {
                assert_eq!(variant, "python");
                assert_eq!(exit_status, Some(1));
                assert!(diagnostic.contains("ImportError"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_spawn_failure_is_verification_failure() {
        let runner = MockRunner::new().unspawnable(CommandPattern::Any);
        let err = verify_variant(&runner, &variant(&["python3", "test.py"], &[])).unwrap_err();
        assert_eq!(err.kind(), "verification-failed");
    }

    #[test]
    fn test_escaping_file_name_rejected() {
        let runner = MockRunner::new();
        let err = verify_variant(&runner, &variant(&["true"], &[("../evil.py", "")])).unwrap_err();
        assert_eq!(err.kind(), "malformed-recipe");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_no_test_is_skipped() {
        let mut v = variant(&["true"], &[]);
        v.test = None;
        assert!(verify_variant(&MockRunner::new(), &v).unwrap().is_none());
    }
}
