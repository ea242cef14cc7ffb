//! Workflow definition, parsing, validation and scheduling.
//!
//! Workflows are defined in YAML and consist of:
//! - A cron schedule with a start date and catch-up flag
//! - Steps: the containers to run
//! - Edges: which steps must succeed before others start

mod dag;
mod parser;
pub mod quantity;
pub mod schedule;
mod schema;
mod types;
mod validator;

pub use dag::StepGraph;
pub use parser::{parse_workflow, parse_workflow_file};
pub use quantity::Quantity;
pub use schedule::{resolve_start_date, CronSchedule, SchedulePlan};
pub use schema::{
    validate_workflow_yaml, workflow_schema, SchemaViolation, WorkflowSchemaValidator,
};
pub use types::*;
pub use validator::{is_dns_label, validate_workflow, MAX_POD_NAME_PREFIX};

use std::path::Path;

use crate::error::{Error, Result};

/// Schema-check, parse and validate a YAML workflow.
///
/// The schema runs first so a misspelled field is reported as unknown
/// rather than as a missing required one.
pub fn load_workflow(yaml: &str) -> Result<WorkflowDefinition> {
    if yaml.trim().is_empty() {
        return Err(Error::Parse("Empty workflow definition".to_string()));
    }
    validate_workflow_yaml(yaml)?;
    let workflow = parse_workflow(yaml)?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// [`load_workflow`] for a file on disk.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)?;
    load_workflow(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_misspelled_field_as_unknown() {
        let yaml = r#"
name: typo
schedul: "0 6 * * *"
steps:
  - id: a
    name: a
    image: busybox
    command: [echo, ok]
"#;
        let err = load_workflow(yaml).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(!err.to_string().contains("Missing required field"));
    }

    #[test]
    fn test_load_empty_definition() {
        let err = load_workflow("  \n").unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
        assert!(err.to_string().contains("Empty workflow definition"));
    }

    #[test]
    fn test_load_valid_definition() {
        let yaml = r#"
name: ok
schedule: "0 6 * * *"
steps:
  - id: a
    name: a
    image: busybox
    command: [echo, ok]
"#;
        assert_eq!(load_workflow(yaml).unwrap().steps.len(), 1);
    }
}
