//! Workflow type definitions.
//!
//! A workflow is a static declaration of containerized steps plus the
//! ordering edges between them. The external orchestrator owns scheduling
//! and execution; these types only describe what to run and in what order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A complete workflow definition.
///
/// # Example YAML
///
/// ```yaml
/// name: nightly-report
/// schedule: "0 6,18 * * *"
/// start_date:
///   days_ago: 1
/// catchup: false
///
/// steps:
///   - id: extract
///     name: extract-worker
///     namespace: batch
///     image: report:v1
///     command: [python, -m, jobs.extract]
///
///   - id: load
///     name: load-worker
///     namespace: batch
///     image: report:v1
///     command: [python, -m, jobs.load]
///
/// edges:
///   - upstream: extract
///     downstream: load
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow name (used as identifier)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Five-field cron expression
    pub schedule: String,

    /// Timezone the schedule is evaluated in (default: UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Reference time the schedule starts from
    #[serde(default)]
    pub start_date: StartDate,

    /// Whether firings missed before activation are backfilled
    #[serde(default)]
    pub catchup: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Parameters applied to every step unless overridden
    #[serde(default)]
    pub default_args: DefaultArgs,

    pub steps: Vec<Step>,

    /// Ordering constraints between steps
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// When the schedule starts counting firings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartDate {
    /// UTC midnight of the activation day minus `days_ago` days
    Relative { days_ago: u32 },
    /// Fixed instant
    Absolute(DateTime<Utc>),
}

impl Default for StartDate {
    fn default() -> Self {
        StartDate::Relative { days_ago: 0 }
    }
}

/// Defaults shared by all steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultArgs {
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Retries after the first failed attempt
    #[serde(default)]
    pub retries: u32,

    /// Flat delay between attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,

    /// Whether a step waits for its own previous run to succeed
    #[serde(default)]
    pub depends_on_past: bool,
}

impl Default for DefaultArgs {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            retries: 0,
            retry_delay_seconds: default_retry_delay(),
            depends_on_past: false,
        }
    }
}

fn default_owner() -> String {
    "airflow".to_string()
}

fn default_retry_delay() -> u64 {
    300 // 5 minutes
}

/// A containerized unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique step ID within this workflow
    pub id: String,

    /// Display name, also the pod name prefix
    pub name: String,

    /// Target namespace (falls back to the configured default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub image: String,

    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,

    /// Entrypoint and arguments
    pub command: Vec<String>,

    #[serde(default)]
    pub config_mounts: Vec<ConfigMount>,

    #[serde(default)]
    pub env_from: Vec<SecretSource>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Stream container logs back to the orchestrator
    #[serde(default = "default_true")]
    pub get_logs: bool,

    /// What happens to the pod once the step is finished
    #[serde(default)]
    pub on_finish: OnFinishAction,

    /// Overrides `default_args.retries` for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Extra pod labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Image pull policy, spelled the way Kubernetes spells it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl ImagePullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagePullPolicy::Always => "Always",
            ImagePullPolicy::IfNotPresent => "IfNotPresent",
            ImagePullPolicy::Never => "Never",
        }
    }
}

/// A configuration file projected from a ConfigMap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMount {
    /// ConfigMap name
    pub config_map: String,

    /// Pod volume name (default: `<config_map>-vol`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    /// Absolute path inside the container
    pub mount_path: String,

    /// Key within the ConfigMap to project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,

    #[serde(default = "default_true")]
    pub read_only: bool,
}

impl ConfigMount {
    /// Volume name used in the pod spec.
    pub fn volume_name(&self) -> String {
        self.volume
            .clone()
            .unwrap_or_else(|| format!("{}-vol", self.config_map))
    }
}

/// A secret whose keys become environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSource {
    /// Secret name
    pub secret: String,

    /// Tolerate a missing secret at pod start
    #[serde(default)]
    pub optional: bool,
}

/// Container resource requests and limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,

    #[serde(default)]
    pub limits: ResourceList,
}

/// Memory and CPU quantities, as Kubernetes quantity strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
}

impl ResourceList {
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.cpu.is_none()
    }

    /// `(resource name, quantity)` pairs that are set.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut entries = Vec::new();
        if let Some(cpu) = &self.cpu {
            entries.push(("cpu", cpu.as_str()));
        }
        if let Some(memory) = &self.memory {
            entries.push(("memory", memory.as_str()));
        }
        entries
    }
}

/// Pod disposal policy once a step is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFinishAction {
    /// Delete the pod whatever the outcome
    #[default]
    DeletePod,
    /// Delete the pod only if the step succeeded
    DeleteSucceededPod,
    /// Keep the pod for inspection
    KeepPod,
}

impl OnFinishAction {
    /// Whether a pod that finished with `succeeded` is deleted.
    pub fn deletes(&self, succeeded: bool) -> bool {
        match self {
            OnFinishAction::DeletePod => true,
            OnFinishAction::DeleteSucceededPod => succeeded,
            OnFinishAction::KeepPod => false,
        }
    }
}

/// Ordering constraint: `downstream` starts only after `upstream` succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub upstream: String,
    pub downstream: String,
}

impl Edge {
    pub fn new(upstream: impl Into<String>, downstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            downstream: downstream.into(),
        }
    }
}

impl WorkflowDefinition {
    /// Get a step by ID.
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// IDs of steps that must succeed before `id` may start.
    pub fn upstream_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.downstream == id)
            .map(|e| e.upstream.as_str())
            .collect()
    }

    /// IDs of steps gated on `id`.
    pub fn downstream_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.upstream == id)
            .map(|e| e.downstream.as_str())
            .collect()
    }

    /// Retry count for a step after applying defaults.
    pub fn effective_retries(&self, step: &Step) -> u32 {
        step.retries.unwrap_or(self.default_args.retries)
    }

    /// Get steps in topological order (respecting edges).
    ///
    /// Steps without constraints keep their declaration order. Cycles are
    /// reported by the validator; here they just stop the walk.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut result = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut temp_visited = std::collections::HashSet::new();

        for step in &self.steps {
            if !visited.contains(step.id.as_str()) {
                self.visit_step(&step.id, &mut visited, &mut temp_visited, &mut result);
            }
        }

        result
    }

    fn visit_step<'a>(
        &'a self,
        step_id: &'a str,
        visited: &mut std::collections::HashSet<&'a str>,
        temp: &mut std::collections::HashSet<&'a str>,
        result: &mut Vec<&'a str>,
    ) {
        if temp.contains(step_id) || visited.contains(step_id) {
            return;
        }

        temp.insert(step_id);

        for edge in self.edges.iter().filter(|e| e.downstream == step_id) {
            if self.get_step(&edge.upstream).is_some() {
                self.visit_step(&edge.upstream, visited, temp, result);
            }
        }

        temp.remove(step_id);
        visited.insert(step_id);
        result.push(step_id);
    }

    /// Distinct ConfigMap names referenced by any step.
    pub fn config_maps(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .steps
            .iter()
            .flat_map(|s| s.config_mounts.iter().map(|m| m.config_map.as_str()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Distinct secret names referenced by any step.
    pub fn secrets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .steps
            .iter()
            .flat_map(|s| s.env_from.iter().map(|e| e.secret.as_str()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
