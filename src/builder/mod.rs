//! Build planning and execution.
//!
//! A [`BuildPlan`] is laid out from a resolved configuration and the
//! verified source artifacts, then run step by step by the
//! [`BuildExecutor`].

pub mod command;
pub mod events;
pub mod executor;
pub mod plan;

pub use command::CommandSpec;
pub use events::{BuildEvent, MessageFormat, Reporter, StepOutcome};
pub use executor::{BuildExecutor, BuildReport, CommandOutput, CommandRunner, StepRecord, SystemRunner};
pub use plan::{BuildLayout, BuildPlan, BuildStep, StepAction, StepKind, VariantPlan, VerifySpec};
