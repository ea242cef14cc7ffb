//! Run evaluation for workflows.

mod executor;
mod runner;

pub use executor::Executor;
pub use runner::{
    AttemptRecord, DryRunRunner, PodDisposal, RunStatus, StepContext, StepOutcome, StepRun,
    StepRunner, StepState, WorkflowRun,
};
