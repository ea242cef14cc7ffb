//! Workflow validation.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex_lite::Regex;

use super::quantity::Quantity;
use super::schedule::CronSchedule;
use super::types::{Step, WorkflowDefinition};
use crate::error::{Error, Result};

/// Pod names are `<step name>-<8 hex chars>` and must fit a DNS-1123 label.
pub const MAX_POD_NAME_PREFIX: usize = 63 - 9;

fn dns_label_regex() -> &'static Regex {
    static DNS_LABEL_REGEX: OnceLock<Regex> = OnceLock::new();
    DNS_LABEL_REGEX
        .get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"))
}

/// Whether `value` is a valid DNS-1123 label.
pub fn is_dns_label(value: &str) -> bool {
    value.len() <= 63 && dns_label_regex().is_match(value)
}

/// Validate a workflow definition.
///
/// Checks for:
/// - Required fields (name, steps)
/// - Unique step IDs
/// - Valid edges (endpoints exist, no self edges, no duplicates)
/// - No circular dependencies
/// - Pod-facing names and resource quantities
/// - A parseable schedule
pub fn validate_workflow(workflow: &WorkflowDefinition) -> Result<()> {
    if workflow.name.is_empty() {
        return Err(Error::Validation("Workflow name is required".into()));
    }

    if !workflow
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Validation(
            "Workflow name must contain only alphanumeric characters, hyphens, and underscores"
                .into(),
        ));
    }

    if workflow.steps.is_empty() {
        return Err(Error::Validation(
            "Workflow must have at least one step".into(),
        ));
    }

    let mut ids = HashSet::new();
    for step in &workflow.steps {
        if step.id.is_empty() {
            return Err(Error::Validation("Step ID cannot be empty".into()));
        }
        if !ids.insert(step.id.as_str()) {
            return Err(Error::Validation(format!("Duplicate step ID: {}", step.id)));
        }
    }

    let mut seen_edges = HashSet::new();
    for edge in &workflow.edges {
        for endpoint in [&edge.upstream, &edge.downstream] {
            if !ids.contains(endpoint.as_str()) {
                return Err(Error::Validation(format!(
                    "Edge '{}' -> '{}' references non-existent step '{}'",
                    edge.upstream, edge.downstream, endpoint
                )));
            }
        }
        if edge.upstream == edge.downstream {
            return Err(Error::Validation(format!(
                "Step '{}' cannot depend on itself",
                edge.upstream
            )));
        }
        if !seen_edges.insert(edge) {
            return Err(Error::Validation(format!(
                "Duplicate edge '{}' -> '{}'",
                edge.upstream, edge.downstream
            )));
        }
    }

    if has_cycle(workflow) {
        return Err(Error::Validation(
            "Workflow has circular dependencies".into(),
        ));
    }

    for step in &workflow.steps {
        validate_step(step)?;
    }

    CronSchedule::for_workflow(workflow)
        .map_err(|e| Error::Validation(format!("Invalid schedule: {}", e)))?;

    Ok(())
}

fn validate_step(step: &Step) -> Result<()> {
    if !is_dns_label(&step.name) || step.name.len() > MAX_POD_NAME_PREFIX {
        return Err(Error::Validation(format!(
            "Step '{}' has invalid name '{}': must be a lowercase DNS label of at most {} characters",
            step.id, step.name, MAX_POD_NAME_PREFIX
        )));
    }

    if let Some(namespace) = &step.namespace {
        if !is_dns_label(namespace) {
            return Err(Error::Validation(format!(
                "Step '{}' has invalid namespace '{}'",
                step.id, namespace
            )));
        }
    }

    if step.image.trim().is_empty() {
        return Err(Error::Validation(format!(
            "Step '{}' has empty image",
            step.id
        )));
    }

    if step.command.is_empty() {
        return Err(Error::Validation(format!(
            "Step '{}' has empty command",
            step.id
        )));
    }

    let mut mount_paths = HashSet::new();
    for mount in &step.config_mounts {
        if mount.config_map.is_empty() {
            return Err(Error::Validation(format!(
                "Step '{}' has a config mount without a config map",
                step.id
            )));
        }
        if !is_dns_label(&mount.volume_name()) {
            return Err(Error::Validation(format!(
                "Step '{}' has invalid volume name '{}'",
                step.id,
                mount.volume_name()
            )));
        }
        if !mount.mount_path.starts_with('/') {
            return Err(Error::Validation(format!(
                "Step '{}' mount path '{}' must be absolute",
                step.id, mount.mount_path
            )));
        }
        if !mount_paths.insert(mount.mount_path.as_str()) {
            return Err(Error::Validation(format!(
                "Step '{}' mounts '{}' more than once",
                step.id, mount.mount_path
            )));
        }
    }

    for source in &step.env_from {
        if source.secret.is_empty() {
            return Err(Error::Validation(format!(
                "Step '{}' has an env source without a secret name",
                step.id
            )));
        }
    }

    validate_resources(step)
}

fn validate_resources(step: &Step) -> Result<()> {
    let parse = |kind: &str, resource: &str, raw: &str| {
        Quantity::parse(raw).map_err(|e| {
            Error::Validation(format!(
                "Step '{}' {} {}: {}",
                step.id, kind, resource, e
            ))
        })
    };

    let mut requests = HashMap::new();
    for (resource, raw) in step.resources.requests.entries() {
        requests.insert(resource, parse("request", resource, raw)?);
    }

    for (resource, raw) in step.resources.limits.entries() {
        let limit = parse("limit", resource, raw)?;
        if let Some(request) = requests.get(resource) {
            if *request > limit {
                return Err(Error::Validation(format!(
                    "Step '{}' requests {} {} which exceeds its limit of {}",
                    step.id, request, resource, limit
                )));
            }
        }
    }

    Ok(())
}

fn has_cycle(workflow: &WorkflowDefinition) -> bool {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    fn dfs<'a>(
        step_id: &'a str,
        deps: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
    ) -> bool {
        visited.insert(step_id);
        rec_stack.insert(step_id);

        if let Some(neighbors) = deps.get(step_id) {
            for &neighbor in neighbors {
                if !visited.contains(neighbor) {
                    if dfs(neighbor, deps, visited, rec_stack) {
                        return true;
                    }
                } else if rec_stack.contains(neighbor) {
                    return true;
                }
            }
        }

        rec_stack.remove(step_id);
        false
    }

    let mut deps: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &workflow.edges {
        deps.entry(edge.downstream.as_str())
            .or_default()
            .push(edge.upstream.as_str());
    }

    for step in &workflow.steps {
        if !visited.contains(step.id.as_str())
            && dfs(&step.id, &deps, &mut visited, &mut rec_stack)
        {
            return true;
        }
    }

    false
}
