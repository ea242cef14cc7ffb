//! Workflow JSON Schema.
//!
//! Structural checks run before typed parsing so that typos in field
//! names are reported instead of silently defaulted.

use jsonschema::Validator;
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// JSON Schema for workflow definitions.
pub fn workflow_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["name", "schedule", "steps"],
        "properties": {
            "name": {
                "type": "string",
                "minLength": 1,
                "maxLength": 250,
                "pattern": "^[A-Za-z0-9_-]+$",
                "description": "Workflow name (alphanumeric, hyphens, underscores)"
            },
            "description": {
                "type": "string",
                "maxLength": 1024
            },
            "schedule": {
                "type": "string",
                "minLength": 1,
                "description": "Five-field cron expression"
            },
            "timezone": {
                "type": "string",
                "description": "IANA timezone or UTC offset"
            },
            "start_date": {
                "oneOf": [
                    {
                        "type": "object",
                        "required": ["days_ago"],
                        "properties": {
                            "days_ago": {"type": "integer", "minimum": 0}
                        },
                        "additionalProperties": false
                    },
                    {
                        "type": "string",
                        "format": "date-time"
                    }
                ]
            },
            "catchup": {"type": "boolean"},
            "tags": {
                "type": "array",
                "items": {"type": "string"}
            },
            "default_args": {"$ref": "#/$defs/default_args"},
            "steps": {
                "type": "array",
                "minItems": 1,
                "items": {"$ref": "#/$defs/step"}
            },
            "edges": {
                "type": "array",
                "items": {"$ref": "#/$defs/edge"}
            }
        },
        "additionalProperties": false,
        "$defs": {
            "default_args": {
                "type": "object",
                "properties": {
                    "owner": {"type": "string"},
                    "retries": {"type": "integer", "minimum": 0, "maximum": 100},
                    "retry_delay_seconds": {"type": "integer", "minimum": 0},
                    "depends_on_past": {"type": "boolean"}
                },
                "additionalProperties": false
            },
            "step": {
                "type": "object",
                "required": ["id", "name", "image", "command"],
                "properties": {
                    "id": {
                        "type": "string",
                        "pattern": "^[A-Za-z_][A-Za-z0-9_.-]*$"
                    },
                    "name": {"type": "string"},
                    "namespace": {"type": "string"},
                    "image": {"type": "string", "minLength": 1},
                    "image_pull_policy": {
                        "type": "string",
                        "enum": ["Always", "IfNotPresent", "Never"]
                    },
                    "command": {
                        "type": "array",
                        "minItems": 1,
                        "items": {"type": "string"}
                    },
                    "config_mounts": {
                        "type": "array",
                        "items": {"$ref": "#/$defs/config_mount"}
                    },
                    "env_from": {
                        "type": "array",
                        "items": {"$ref": "#/$defs/secret_source"}
                    },
                    "resources": {
                        "type": "object",
                        "properties": {
                            "requests": {"$ref": "#/$defs/resource_list"},
                            "limits": {"$ref": "#/$defs/resource_list"}
                        },
                        "additionalProperties": false
                    },
                    "get_logs": {"type": "boolean"},
                    "on_finish": {
                        "type": "string",
                        "enum": ["delete_pod", "delete_succeeded_pod", "keep_pod"]
                    },
                    "retries": {"type": "integer", "minimum": 0, "maximum": 100},
                    "labels": {
                        "type": "object",
                        "additionalProperties": {"type": "string"}
                    }
                },
                "additionalProperties": false
            },
            "config_mount": {
                "type": "object",
                "required": ["config_map", "mount_path"],
                "properties": {
                    "config_map": {"type": "string", "minLength": 1},
                    "volume": {"type": "string"},
                    "mount_path": {"type": "string", "minLength": 1},
                    "sub_path": {"type": "string"},
                    "read_only": {"type": "boolean"}
                },
                "additionalProperties": false
            },
            "secret_source": {
                "type": "object",
                "required": ["secret"],
                "properties": {
                    "secret": {"type": "string", "minLength": 1},
                    "optional": {"type": "boolean"}
                },
                "additionalProperties": false
            },
            "resource_list": {
                "type": "object",
                "properties": {
                    "memory": {"type": "string"},
                    "cpu": {"type": "string"}
                },
                "additionalProperties": false
            },
            "edge": {
                "type": "object",
                "required": ["upstream", "downstream"],
                "properties": {
                    "upstream": {"type": "string"},
                    "downstream": {"type": "string"}
                },
                "additionalProperties": false
            }
        }
    })
}

/// Compiled workflow schema.
pub struct WorkflowSchemaValidator {
    validator: Validator,
}

impl WorkflowSchemaValidator {
    /// Compile the workflow schema.
    pub fn new() -> Result<Self> {
        let schema = workflow_schema();
        let validator = Validator::new(&schema)
            .map_err(|e| Error::Validation(format!("Invalid workflow schema: {}", e)))?;
        Ok(Self { validator })
    }

    /// Validate a parsed YAML/JSON workflow document.
    pub fn validate(&self, workflow: &Value) -> Result<()> {
        if let Err(error) = self.validator.validate(workflow) {
            return Err(Error::Validation(format!(
                "Workflow validation failed: {} at {}",
                error, error.instance_path
            )));
        }
        Ok(())
    }

    /// Every schema violation, not just the first.
    pub fn validate_detailed(&self, workflow: &Value) -> Vec<SchemaViolation> {
        self.validator
            .iter_errors(workflow)
            .map(|error| SchemaViolation {
                path: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect()
    }
}

/// A schema violation with path information.
#[derive(Debug, Clone)]
pub struct SchemaViolation {
    /// JSON pointer to the invalid element.
    pub path: String,
    pub message: String,
}

/// Validate a workflow YAML string against the schema.
pub fn validate_workflow_yaml(yaml: &str) -> Result<Value> {
    let workflow: Value = serde_yaml::from_str(yaml)
        .map_err(|e| Error::Parse(format!("Invalid YAML: {}", e)))?;

    WorkflowSchemaValidator::new()?.validate(&workflow)?;

    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Value {
        json!({
            "name": "test-workflow",
            "schedule": "0 6,18 * * *",
            "steps": [
                {
                    "id": "step1",
                    "name": "step-one",
                    "image": "busybox",
                    "command": ["echo", "hi"]
                }
            ]
        })
    }

    #[test]
    fn test_valid_minimal_workflow() {
        let validator = WorkflowSchemaValidator::new().unwrap();
        assert!(validator.validate(&minimal()).is_ok());
    }

    #[test]
    fn test_missing_schedule() {
        let mut workflow = minimal();
        workflow.as_object_mut().unwrap().remove("schedule");

        let validator = WorkflowSchemaValidator::new().unwrap();
        assert!(validator.validate(&workflow).is_err());
    }

    #[test]
    fn test_empty_steps() {
        let mut workflow = minimal();
        workflow["steps"] = json!([]);

        let validator = WorkflowSchemaValidator::new().unwrap();
        assert!(validator.validate(&workflow).is_err());
    }

    #[test]
    fn test_misspelled_step_field_rejected() {
        let mut workflow = minimal();
        workflow["steps"][0]["on_finsh"] = json!("keep_pod");

        let validator = WorkflowSchemaValidator::new().unwrap();
        let err = validator.validate(&workflow).unwrap_err();
        assert!(err.to_string().contains("/steps/0"));
    }

    #[test]
    fn test_invalid_enum_values() {
        let mut workflow = minimal();
        workflow["steps"][0]["image_pull_policy"] = json!("Sometimes");
        let validator = WorkflowSchemaValidator::new().unwrap();
        assert!(validator.validate(&workflow).is_err());

        let mut workflow = minimal();
        workflow["steps"][0]["on_finish"] = json!("shred_pod");
        assert!(validator.validate(&workflow).is_err());
    }

    #[test]
    fn test_start_date_forms() {
        let validator = WorkflowSchemaValidator::new().unwrap();

        let mut workflow = minimal();
        workflow["start_date"] = json!({"days_ago": 1});
        assert!(validator.validate(&workflow).is_ok());

        workflow["start_date"] = json!({"days_ago": -1});
        assert!(validator.validate(&workflow).is_err());
    }

    #[test]
    fn test_validate_detailed_collects_all() {
        let mut workflow = minimal();
        workflow["catchup"] = json!("no");
        workflow["steps"][0]["get_logs"] = json!("yes");

        let validator = WorkflowSchemaValidator::new().unwrap();
        let violations = validator.validate_detailed(&workflow);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.path == "/catchup"));
    }

    #[test]
    fn test_validate_yaml_string() {
        let yaml = r#"
name: yaml-workflow
schedule: "0 * * * *"
steps:
  - id: step1
    name: step-one
    image: busybox
    command: [echo, hi]
edges: []
"#;
        assert!(validate_workflow_yaml(yaml).is_ok());

        let bad = "name: invalid\nschedule: \"0 * * * *\"\nsteps: \"not an array\"\n";
        assert!(validate_workflow_yaml(bad).is_err());
    }
}
