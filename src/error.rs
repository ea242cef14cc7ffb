//! Error types for podflow.
//!
//! Every variant carries a stable code so callers (and scripts wrapping the
//! CLI) can branch on the kind of failure without parsing messages.

use thiserror::Error;

/// Result type alias for podflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// podflow error types.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Step error: {0}")]
    Step(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Workflow(_) => "WORKFLOW_ERROR",
            Error::Step(_) => "STEP_ERROR",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::Schedule(_) => "SCHEDULE_ERROR",
            Error::Render(_) => "RENDER_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Only runner-side failures are transient; a bad definition stays bad.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Execution(_) | Error::Io(_))
    }

    /// Convert to a JSON error envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}
