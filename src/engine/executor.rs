//! Run evaluator.
//!
//! Walks a workflow the way the orchestrator does for one scheduled firing:
//! steps in dependency order, a flat retry count per step, dependency-not-met
//! propagation and per-attempt pod disposal. The actual pod work is handed to
//! a [`StepRunner`].

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn, Span};

use super::runner::{
    AttemptRecord, PodDisposal, RunStatus, StepContext, StepOutcome, StepRun, StepRunner,
    StepState, WorkflowRun,
};
use crate::error::{Error, Result};
use crate::metrics;
use crate::render::{pod_name, render_pod, RenderOptions};
use crate::workflow::{Step, StepGraph, WorkflowDefinition};

/// Workflow run evaluator.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    render_options: RenderOptions,
    retry_delay_override: Option<Duration>,
}

impl Executor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendering settings for step pods (default namespace).
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options;
        self
    }

    /// Replace the definition's retry delay, e.g. with zero for dry runs.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_override = Some(delay);
        self
    }

    fn retry_delay(&self, workflow: &WorkflowDefinition) -> Duration {
        self.retry_delay_override
            .unwrap_or_else(|| Duration::from_secs(workflow.default_args.retry_delay_seconds))
    }

    /// Evaluate one run of `workflow` for the firing at `logical_date`.
    ///
    /// Step failures do not make this return `Err`; they are recorded in the
    /// returned run. `Err` means the workflow could not be evaluated at all.
    #[instrument(
        name = "workflow.run",
        skip(self, workflow, logical_date, runner),
        fields(
            workflow = %workflow.name,
            logical_date = %logical_date,
            run_id = tracing::field::Empty,
        )
    )]
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        logical_date: DateTime<Utc>,
        runner: &dyn StepRunner,
    ) -> Result<WorkflowRun> {
        let order = StepGraph::from_definition(workflow).execution_order()?;
        let run_id = uuid::Uuid::new_v4().to_string();
        Span::current().record("run_id", run_id.as_str());

        let started = Instant::now();
        let mut run = WorkflowRun {
            id: run_id,
            workflow_name: workflow.name.clone(),
            logical_date,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            steps: order.iter().map(|id| StepRun::queued(id)).collect(),
        };

        info!(steps = order.len(), "Starting workflow run");

        for (index, step_id) in order.iter().enumerate() {
            let step = workflow.get_step(step_id).ok_or_else(|| {
                Error::Workflow(format!("Edge references unknown step '{}'", step_id))
            })?;

            let blocked_by: Vec<&str> = workflow
                .upstream_of(step_id)
                .into_iter()
                .filter(|up| {
                    run.step(up)
                        .map(|s| s.state != StepState::Success)
                        .unwrap_or(true)
                })
                .collect();

            if !blocked_by.is_empty() {
                warn!(
                    step = %step_id,
                    blocked_by = ?blocked_by,
                    "Upstream did not succeed; step will not run"
                );
                let record = &mut run.steps[index];
                record.state = StepState::UpstreamFailed;
                record.error = Some(format!(
                    "Upstream step(s) did not succeed: {}",
                    blocked_by.join(", ")
                ));
                continue;
            }

            let step_started = Instant::now();
            let result = self
                .run_step(workflow, step, &run.id, logical_date, runner, &mut run.steps[index])
                .await;
            metrics::record_step_duration(step_started.elapsed(), step_id);
            result?;
        }

        run.status = if run.steps.iter().all(|s| s.state == StepState::Success) {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        run.finished_at = Some(Utc::now());

        metrics::record_run(&workflow.name, &run.status.to_string());
        metrics::record_run_duration(started.elapsed(), &workflow.name);

        match run.status {
            RunStatus::Success => info!(attempts = run.attempt_count(), "Workflow run succeeded"),
            _ => error!(attempts = run.attempt_count(), "Workflow run failed"),
        }

        Ok(run)
    }

    async fn run_step(
        &self,
        workflow: &WorkflowDefinition,
        step: &Step,
        run_id: &str,
        logical_date: DateTime<Utc>,
        runner: &dyn StepRunner,
        record: &mut StepRun,
    ) -> Result<()> {
        let max_attempts = workflow.effective_retries(step).saturating_add(1);
        let delay = self.retry_delay(workflow);
        let mut attempt = 1u32;

        loop {
            let mut pod = render_pod(workflow, step, run_id, &self.render_options)?;
            let attempt_id = uuid::Uuid::new_v4().simple().to_string();
            pod.metadata.name = Some(pod_name(step, &attempt_id));

            let ctx = StepContext {
                run_id: run_id.to_string(),
                workflow_name: workflow.name.clone(),
                logical_date,
                attempt,
                max_attempts,
                pod,
            };

            record.state = StepState::Running;
            debug!(step = %step.id, attempt, max_attempts, pod = %ctx.pod_name(), "Running step");

            let started_at = Utc::now();
            let result = runner.run(step, &ctx).await;
            let finished_at = Utc::now();

            let (exit_code, failure) = match result {
                Ok(StepOutcome { exit_code, logs }) => {
                    if step.get_logs && !logs.is_empty() {
                        record.logs.push(logs);
                    }
                    let failure = (exit_code != 0)
                        .then(|| format!("Container exited with code {}", exit_code));
                    (Some(exit_code), failure)
                }
                Err(e) => (None, Some(format!("Pod could not be scheduled: {}", e))),
            };
            let succeeded = failure.is_none();

            metrics::record_step_attempt(&step.id, if succeeded { "success" } else { "failed" });

            let disposal = if step.on_finish.deletes(succeeded) {
                PodDisposal::Deleted
            } else {
                PodDisposal::Retained
            };
            if let Err(e) = runner.dispose(step, &ctx, disposal).await {
                warn!(step = %step.id, pod = %ctx.pod_name(), "Pod disposal failed: {}", e);
            }
            metrics::record_pod_disposal(disposal);

            record.attempts.push(AttemptRecord {
                attempt,
                pod_name: ctx.pod_name().to_string(),
                started_at,
                finished_at,
                exit_code,
                error: failure.clone(),
                disposal,
            });

            match failure {
                None => {
                    info!(step = %step.id, attempt, "Step succeeded");
                    record.state = StepState::Success;
                    record.error = None;
                    return Ok(());
                }
                Some(message) if attempt >= max_attempts => {
                    error!(step = %step.id, attempt, "Step failed: {}", message);
                    record.state = StepState::Failed;
                    record.error = Some(message);
                    return Ok(());
                }
                Some(message) => {
                    warn!(
                        "Step '{}' attempt {}/{} failed: {}. Retrying in {}s",
                        step.id,
                        attempt,
                        max_attempts,
                        message,
                        delay.as_secs()
                    );
                    record.state = StepState::UpForRetry;
                    record.error = Some(message);
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
