//! Step runner trait and run records.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::render::{pod_name_of, pod_namespace_of, Pod};
use crate::workflow::Step;

/// Everything a runner needs to execute one attempt of a step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: String,
    pub workflow_name: String,
    /// Scheduled firing this run belongs to
    pub logical_date: DateTime<Utc>,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    /// Manifest to submit for this attempt
    pub pod: Pod,
}

impl StepContext {
    pub fn pod_name(&self) -> &str {
        pod_name_of(&self.pod)
    }
}

/// What a finished container reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub exit_code: i32,
    pub logs: String,
}

impl StepOutcome {
    pub fn success(logs: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            logs: logs.into(),
        }
    }

    pub fn failure(exit_code: i32, logs: impl Into<String>) -> Self {
        Self {
            exit_code,
            logs: logs.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// What happened to a pod once its attempt finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodDisposal {
    Deleted,
    Retained,
}

/// Executes step pods on behalf of the evaluator.
///
/// `run` returning `Err` models a scheduling failure (the pod never ran);
/// `Ok` with a non-zero exit code models a failed container.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, step: &Step, ctx: &StepContext) -> Result<StepOutcome>;

    /// Apply the disposal decision for the pod of `ctx`.
    async fn dispose(&self, _step: &Step, _ctx: &StepContext, _disposal: PodDisposal) -> Result<()> {
        Ok(())
    }
}

/// Step state within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Queued,
    Running,
    UpForRetry,
    Success,
    Failed,
    /// Never started because an upstream step did not succeed
    UpstreamFailed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Success | StepState::Failed | StepState::UpstreamFailed
        )
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::UpForRetry => write!(f, "up_for_retry"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::UpstreamFailed => write!(f, "upstream_failed"),
        }
    }
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One attempt of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub pod_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub disposal: PodDisposal,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }
}

/// Per-step record within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub step_id: String,
    pub state: StepState,
    pub attempts: Vec<AttemptRecord>,
    /// Captured container logs, one entry per attempt (empty when log retrieval is off)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRun {
    pub(crate) fn queued(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            state: StepState::Queued,
            attempts: Vec::new(),
            logs: Vec::new(),
            error: None,
        }
    }

    /// Disposal of the last attempt's pod.
    pub fn disposal(&self) -> Option<PodDisposal> {
        self.attempts.last().map(|a| a.disposal)
    }
}

/// Record of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_name: String,
    pub logical_date: DateTime<Utc>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Steps in the order they were evaluated
    pub steps: Vec<StepRun>,
}

impl WorkflowRun {
    pub fn step(&self, id: &str) -> Option<&StepRun> {
        self.steps.iter().find(|s| s.step_id == id)
    }

    /// Total attempts across all steps.
    pub fn attempt_count(&self) -> usize {
        self.steps.iter().map(|s| s.attempts.len()).sum()
    }
}

/// Runner that pretends every pod ran.
///
/// Steps listed with [`DryRunRunner::failing`] always exit 1; steps listed
/// with [`DryRunRunner::flaky`] exit 1 for their first N attempts.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    failing: HashSet<String>,
    flaky: HashMap<String, u32>,
    calls: Mutex<HashMap<String, u32>>,
    disposals: Mutex<Vec<(String, PodDisposal)>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every attempt of `step_id` fail.
    pub fn failing(mut self, step_id: impl Into<String>) -> Self {
        self.failing.insert(step_id.into());
        self
    }

    /// Make the first `failures` attempts of `step_id` fail.
    pub fn flaky(mut self, step_id: impl Into<String>, failures: u32) -> Self {
        self.flaky.insert(step_id.into(), failures);
        self
    }

    /// Number of attempts `step_id` has been run.
    pub async fn calls(&self, step_id: &str) -> u32 {
        self.calls.lock().await.get(step_id).copied().unwrap_or(0)
    }

    /// `(pod name, disposal)` in the order disposals happened.
    pub async fn disposals(&self) -> Vec<(String, PodDisposal)> {
        self.disposals.lock().await.clone()
    }
}

#[async_trait]
impl StepRunner for DryRunRunner {
    async fn run(&self, step: &Step, ctx: &StepContext) -> Result<StepOutcome> {
        let call = {
            let mut calls = self.calls.lock().await;
            let count = calls.entry(step.id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        info!(
            step = %step.id,
            pod = %ctx.pod_name(),
            namespace = %pod_namespace_of(&ctx.pod),
            image = %step.image,
            attempt = ctx.attempt,
            "Dry run: would create pod"
        );

        let command = step.command.join(" ");
        let fails = self.failing.contains(&step.id)
            || self.flaky.get(&step.id).is_some_and(|n| call <= *n);

        if fails {
            Ok(StepOutcome::failure(
                1,
                format!("[dry-run] {} exited with code 1 (simulated)", command),
            ))
        } else {
            Ok(StepOutcome::success(format!(
                "[dry-run] {} completed",
                command
            )))
        }
    }

    async fn dispose(&self, step: &Step, ctx: &StepContext, disposal: PodDisposal) -> Result<()> {
        info!(
            step = %step.id,
            pod = %ctx.pod_name(),
            disposal = ?disposal,
            "Dry run: pod disposal"
        );
        self.disposals
            .lock()
            .await
            .push((ctx.pod_name().to_string(), disposal));
        Ok(())
    }
}
