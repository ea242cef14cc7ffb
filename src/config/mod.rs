//! Configuration management.
//!
//! podflow configuration can come from:
//! - Environment variables (PODFLOW_*)
//! - Config file (~/.config/podflow/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::render::RenderOptions;

/// podflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Rendering defaults
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where workflow files are looked up by name
    #[serde(default)]
    pub workflows: WorkflowsConfig,
}

/// Defaults applied to steps that leave them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Namespace for steps without one
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level or filter directive, e.g. `debug` or `podflow=trace`
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowsConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    pub fn load() -> Self {
        let mut config = Self::default();

        let path = Self::config_dir().join("config.toml");
        if let Ok(partial) = Self::load_partial_from_path(&path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("podflow"))
            .unwrap_or_else(|| PathBuf::from(".podflow"))
    }

    /// Rendering options derived from this configuration.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            default_namespace: self.defaults.namespace.clone(),
        }
    }

    /// Look `name` up in the configured workflows directory.
    ///
    /// Tries `<dir>/<name>`, then `<name>.yaml` and `<name>.yml`.
    pub fn find_workflow(&self, name: &str) -> Option<PathBuf> {
        let dir = self.workflows.dir.as_ref()?;
        [
            dir.join(name),
            dir.join(format!("{}.yaml", name)),
            dir.join(format!("{}.yml", name)),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(namespace) = var("PODFLOW_DEFAULT_NAMESPACE") {
            self.defaults.namespace = namespace;
        }
        if let Some(level) = var("PODFLOW_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        if let Some(dir) = var("PODFLOW_WORKFLOWS_DIR") {
            self.workflows.dir = Some(PathBuf::from(dir));
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(defaults) = partial.defaults {
            self.defaults = defaults;
        }
        if let Some(logging) = partial.logging {
            self.logging = logging;
        }
        if let Some(workflows) = partial.workflows {
            self.workflows = workflows;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    defaults: Option<DefaultsConfig>,
    logging: Option<LoggingConfig>,
    workflows: Option<WorkflowsConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.defaults.namespace, "default");
        assert!(config.logging.level.is_none());
        assert_eq!(config.render_options().default_namespace, "default");
    }

    #[test]
    fn test_partial_file_keeps_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let mut config = Config::default();
        config.apply_partial(Config::load_partial_from_path(&path).unwrap());

        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.defaults.namespace, "default");
    }

    #[test]
    fn test_invalid_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "defaults = [").unwrap();

        assert!(Config::load_partial_from_path(&path).is_err());
        assert!(Config::load_partial_from_path(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PODFLOW_DEFAULT_NAMESPACE", "bigdata"),
            ("PODFLOW_LOG_LEVEL", "trace"),
            ("PODFLOW_WORKFLOWS_DIR", "/srv/workflows"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.defaults.namespace, "bigdata");
        assert_eq!(config.logging.level.as_deref(), Some("trace"));
        assert_eq!(
            config.workflows.dir.as_deref(),
            Some(Path::new("/srv/workflows"))
        );
    }

    #[test]
    fn test_find_workflow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nightly.yaml"), "name: nightly").unwrap();

        let config = Config {
            workflows: WorkflowsConfig {
                dir: Some(dir.path().to_path_buf()),
            },
            ..Config::default()
        };

        assert_eq!(
            config.find_workflow("nightly"),
            Some(dir.path().join("nightly.yaml"))
        );
        assert!(config.find_workflow("missing").is_none());
        assert!(Config::default().find_workflow("nightly").is_none());
    }
}
