//! Workflow YAML parser.

use std::path::Path;

use tracing::debug;

use super::types::WorkflowDefinition;
use crate::error::{Error, Result};

/// Parse a workflow from a YAML string.
pub fn parse_workflow(yaml: &str) -> Result<WorkflowDefinition> {
    if yaml.trim().is_empty() {
        return Err(Error::Parse("Empty workflow definition".to_string()));
    }

    let workflow: WorkflowDefinition = serde_yaml::from_str(yaml).map_err(|e| {
        let msg = e.to_string();
        if let Some(field) = extract_missing_field(&msg) {
            Error::Parse(format!("Missing required field: {}", field))
        } else {
            Error::Parse(format!("Invalid YAML: {}", msg))
        }
    })?;
    Ok(workflow)
}

/// Parse a workflow from a file path.
pub fn parse_workflow_file(path: &Path) -> Result<WorkflowDefinition> {
    debug!(path = %path.display(), "Reading workflow definition");
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content)
}

fn extract_missing_field(error_message: &str) -> Option<&str> {
    let marker = "missing field `";
    let start = error_message.find(marker)? + marker.len();
    let rest = &error_message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ImagePullPolicy, OnFinishAction, StartDate};

    #[test]
    fn test_parse_simple_workflow() {
        let yaml = r#"
name: test-workflow
description: A test workflow
schedule: "0 * * * *"

steps:
  - id: step1
    name: step-one
    image: busybox:1.36
    command: [echo, hello]

  - id: step2
    name: step-two
    image: busybox:1.36
    command: [echo, world]

edges:
  - upstream: step1
    downstream: step2
"#;

        let workflow = parse_workflow(yaml).unwrap();
        assert_eq!(workflow.name, "test-workflow");
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.upstream_of("step2"), vec!["step1"]);
        assert_eq!(workflow.downstream_of("step1"), vec!["step2"]);
    }

    #[test]
    fn test_parse_defaults() {
        let yaml = r#"
name: defaults
schedule: "0 * * * *"
steps:
  - id: only
    name: only
    image: busybox
    command: [echo, ok]
"#;

        let workflow = parse_workflow(yaml).unwrap();
        let step = &workflow.steps[0];
        assert!(!workflow.catchup);
        assert_eq!(workflow.start_date, StartDate::Relative { days_ago: 0 });
        assert_eq!(workflow.default_args.owner, "airflow");
        assert_eq!(workflow.default_args.retries, 0);
        assert_eq!(step.image_pull_policy, ImagePullPolicy::IfNotPresent);
        assert_eq!(step.on_finish, OnFinishAction::DeletePod);
        assert!(step.get_logs);
        assert!(step.namespace.is_none());
    }

    #[test]
    fn test_parse_full_step() {
        let yaml = r#"
name: full
schedule: "0 6,18 * * *"
start_date:
  days_ago: 1
default_args:
  owner: data-team
  retries: 2
steps:
  - id: job
    name: job-worker
    namespace: batch
    image: app:v2
    image_pull_policy: Never
    command: [python, -m, app.job]
    config_mounts:
      - config_map: app-config
        volume: config-vol
        mount_path: /app/configs/app_config.yaml
        sub_path: app_config.yaml
    env_from:
      - secret: db-secret
    resources:
      requests: {memory: 500Mi, cpu: 500m}
      limits: {memory: 1Gi, cpu: 1000m}
    get_logs: false
    on_finish: keep_pod
    retries: 0
"#;

        let workflow = parse_workflow(yaml).unwrap();
        let step = &workflow.steps[0];
        assert_eq!(workflow.start_date, StartDate::Relative { days_ago: 1 });
        assert_eq!(step.image_pull_policy, ImagePullPolicy::Never);
        assert_eq!(step.config_mounts[0].volume_name(), "config-vol");
        assert!(step.config_mounts[0].read_only);
        assert_eq!(step.env_from[0].secret, "db-secret");
        assert_eq!(step.resources.limits.memory.as_deref(), Some("1Gi"));
        assert_eq!(step.on_finish, OnFinishAction::KeepPod);
        assert!(!step.get_logs);
        assert_eq!(workflow.effective_retries(step), 0);
    }

    #[test]
    fn test_parse_absolute_start_date() {
        let yaml = r#"
name: absolute
schedule: "0 0 * * *"
start_date: "2026-01-01T00:00:00Z"
steps:
  - id: a
    name: a
    image: busybox
    command: [echo, ok]
"#;

        let workflow = parse_workflow(yaml).unwrap();
        match workflow.start_date {
            StartDate::Absolute(dt) => assert_eq!(dt.to_rfc3339(), "2026-01-01T00:00:00+00:00"),
            other => panic!("Expected absolute start date, got {:?}", other),
        }
    }

    #[test]
    fn test_topological_order() {
        let yaml = r#"
name: test
schedule: "0 * * * *"
steps:
  - id: c
    name: c
    image: busybox
    command: [echo, ok]
  - id: a
    name: a
    image: busybox
    command: [echo, ok]
  - id: b
    name: b
    image: busybox
    command: [echo, ok]
edges:
  - {upstream: a, downstream: b}
  - {upstream: a, downstream: c}
  - {upstream: b, downstream: c}
"#;

        let workflow = parse_workflow(yaml).unwrap();
        assert_eq!(workflow.topological_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_empty_workflow() {
        let result = parse_workflow("   ");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .to_lowercase()
            .contains("empty workflow"));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_workflow("name: [broken");
        assert!(result
            .unwrap_err()
            .to_string()
            .to_lowercase()
            .contains("invalid yaml"));
    }

    #[test]
    fn test_parse_missing_required_field_schedule() {
        let yaml = r#"
name: no-schedule
steps: []
"#;
        let err = parse_workflow(yaml).unwrap_err();
        assert!(err.to_string().contains("Missing required field: schedule"));
    }

    #[test]
    fn test_parse_unknown_disposal_policy() {
        let yaml = r#"
name: bad
schedule: "0 * * * *"
steps:
  - id: a
    name: a
    image: busybox
    command: [echo, ok]
    on_finish: shred_pod
"#;
        assert!(parse_workflow(yaml).is_err());
    }

    #[test]
    fn test_parse_workflow_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.yaml");
        std::fs::write(
            &path,
            "name: from-file\nschedule: \"0 * * * *\"\nsteps: []\n",
        )
        .unwrap();

        let workflow = parse_workflow_file(&path).unwrap();
        assert_eq!(workflow.name, "from-file");

        let missing = parse_workflow_file(&dir.path().join("missing.yaml"));
        assert_eq!(missing.unwrap_err().code(), "IO_ERROR");
    }
}
