//! Workflow templates.
//!
//! Templates are ready-made workflow definitions. The built-in set ships in
//! the binary; a custom directory can add more or shadow a built-in by name.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::workflow::{load_workflow, WorkflowDefinition};

/// A workflow template.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    /// Template name (the workflow name)
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Where the template came from: `builtin` or a file path
    pub source: String,

    /// The workflow YAML content
    pub content: String,
}

impl Template {
    /// Parse and validate the template's workflow.
    pub fn load(&self) -> Result<WorkflowDefinition> {
        load_workflow(&self.content)
            .map_err(|e| Error::Config(format!("Template '{}' is invalid: {}", self.name, e)))
    }
}

const BUILTIN_TEMPLATES: &[&str] = &[include_str!("../../workflows/flight_full_pipeline.yaml")];

/// Template registry for managing available templates.
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
    custom_dir: Option<PathBuf>,
}

impl TemplateRegistry {
    /// Create a new registry with built-in templates.
    pub fn new() -> Self {
        let mut registry = Self {
            templates: HashMap::new(),
            custom_dir: None,
        };

        registry.register_builtin_templates();

        registry
    }

    /// Create registry with custom template directory.
    pub fn with_custom_dir(custom_dir: impl AsRef<Path>) -> Result<Self> {
        let mut registry = Self::new();
        registry.custom_dir = Some(custom_dir.as_ref().to_path_buf());
        registry.load_custom_templates()?;
        Ok(registry)
    }

    fn register_builtin_templates(&mut self) {
        for content in BUILTIN_TEMPLATES {
            match template_from_yaml(content, "builtin") {
                Ok(template) => {
                    self.templates.insert(template.name.clone(), template);
                }
                Err(e) => warn!("Skipping invalid built-in template: {}", e),
            }
        }
    }

    /// Load templates from custom directory.
    fn load_custom_templates(&mut self) -> Result<()> {
        let dir = match &self.custom_dir {
            Some(d) => d,
            None => return Ok(()),
        };

        if !dir.exists() {
            return Ok(());
        }

        for entry in std::fs::read_dir(dir)
            .map_err(|e| Error::Config(format!("Failed to read templates dir: {}", e)))?
        {
            let entry = entry.map_err(|e| Error::Config(format!("Failed to read entry: {}", e)))?;
            let path = entry.path();

            if path.extension().map(|e| e == "yaml" || e == "yml").unwrap_or(false) {
                match Self::load_template_file(&path) {
                    Ok(template) => {
                        debug!(name = %template.name, path = %path.display(), "Loaded template");
                        self.templates.insert(template.name.clone(), template);
                    }
                    Err(e) => warn!(path = %path.display(), "Skipping template: {}", e),
                }
            }
        }

        Ok(())
    }

    fn load_template_file(path: &Path) -> Result<Template> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read template file: {}", e)))?;
        template_from_yaml(&content, &path.display().to_string())
    }

    /// List all available templates.
    pub fn list(&self) -> Vec<&Template> {
        let mut templates: Vec<_> = self.templates.values().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    /// Get a template by name.
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Parse and validate the named template.
    pub fn load(&self, name: &str) -> Result<WorkflowDefinition> {
        self.get(name)
            .ok_or_else(|| Error::Config(format!("Template not found: {}", name)))?
            .load()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn template_from_yaml(content: &str, source: &str) -> Result<Template> {
    let workflow = load_workflow(content)?;
    Ok(Template {
        name: workflow.name,
        description: workflow.description,
        source: source.to_string(),
        content: content.to_string(),
    })
}
