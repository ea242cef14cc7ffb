//! Run and step metrics.
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! whether a recorder is installed. Without one every call is a no-op.
//!
//! ## Metrics
//!
//! ### Counters
//! - `podflow_runs_total` - Evaluated workflow runs by workflow and status
//! - `podflow_step_attempts_total` - Step attempts by step and outcome
//! - `podflow_pod_disposals_total` - Pod disposals by action
//!
//! ### Histograms
//! - `podflow_run_duration_seconds` - Wall time of a run evaluation
//! - `podflow_step_duration_seconds` - Wall time of a step, all attempts included

use metrics::{counter, histogram};
use std::time::Duration;

use crate::engine::PodDisposal;

/// Record a finished run.
pub fn record_run(workflow: &str, status: &str) {
    counter!(
        "podflow_runs_total",
        "workflow" => workflow.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record run duration.
pub fn record_run_duration(duration: Duration, workflow: &str) {
    histogram!(
        "podflow_run_duration_seconds",
        "workflow" => workflow.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record one step attempt.
pub fn record_step_attempt(step: &str, outcome: &str) {
    counter!(
        "podflow_step_attempts_total",
        "step" => step.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record step duration.
pub fn record_step_duration(duration: Duration, step: &str) {
    histogram!(
        "podflow_step_duration_seconds",
        "step" => step.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a pod disposal.
pub fn record_pod_disposal(disposal: PodDisposal) {
    let action = match disposal {
        PodDisposal::Deleted => "deleted",
        PodDisposal::Retained => "retained",
    };
    counter!("podflow_pod_disposals_total", "action" => action).increment(1);
}
