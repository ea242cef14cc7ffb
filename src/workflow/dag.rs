//! Step dependency graph.
//!
//! Built from a definition's edges; answers ordering questions the
//! run evaluator and the CLI need.

use std::collections::{HashMap, HashSet};

use super::types::WorkflowDefinition;
use crate::error::{Error, Result};

/// A DAG of steps.
#[derive(Debug, Clone)]
pub struct StepGraph {
    /// Step IDs in declaration order
    steps: Vec<String>,
    /// Map of step ID to the steps it waits for
    upstream: HashMap<String, Vec<String>>,
}

impl StepGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            upstream: HashMap::new(),
        }
    }

    /// Build the graph of a workflow definition.
    pub fn from_definition(workflow: &WorkflowDefinition) -> Self {
        let mut graph = Self::new();
        for step in &workflow.steps {
            graph.add_step(&step.id);
        }
        for edge in &workflow.edges {
            graph.add_edge(&edge.upstream, &edge.downstream);
        }
        graph
    }

    /// Add a step with no dependencies.
    pub fn add_step(&mut self, id: &str) {
        if !self.upstream.contains_key(id) {
            self.steps.push(id.to_string());
            self.upstream.insert(id.to_string(), Vec::new());
        }
    }

    /// Add an ordering edge, registering unknown endpoints.
    pub fn add_edge(&mut self, upstream: &str, downstream: &str) {
        self.add_step(upstream);
        self.add_step(downstream);
        if let Some(deps) = self.upstream.get_mut(downstream) {
            if !deps.iter().any(|d| d == upstream) {
                deps.push(upstream.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.upstream.values().map(|v| v.len()).sum()
    }

    /// Steps `id` waits for.
    pub fn upstream(&self, id: &str) -> Vec<&str> {
        self.upstream
            .get(id)
            .map(|deps| deps.iter().map(|d| d.as_str()).collect())
            .unwrap_or_default()
    }

    /// Steps that wait for `id`, in declaration order.
    pub fn downstream(&self, id: &str) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| self.upstream[s.as_str()].iter().any(|d| d == id))
            .map(|s| s.as_str())
            .collect()
    }

    /// Steps with no upstream.
    pub fn roots(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| self.upstream[s.as_str()].is_empty())
            .map(|s| s.as_str())
            .collect()
    }

    /// Steps with no downstream.
    pub fn leaves(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| self.downstream(s).is_empty())
            .map(|s| s.as_str())
            .collect()
    }

    /// Whether `ancestor` must finish before `id` can start, directly or transitively.
    pub fn depends_on(&self, id: &str, ancestor: &str) -> bool {
        let mut stack = self.upstream(id);
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.upstream(current));
            }
        }
        false
    }

    /// Get execution order (topological sort).
    ///
    /// Kahn's algorithm; among ready steps the one declared first runs first.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        let mut remaining: HashMap<&str, usize> = self
            .steps
            .iter()
            .map(|s| (s.as_str(), self.upstream[s.as_str()].len()))
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());

        while order.len() < self.steps.len() {
            let next = self
                .steps
                .iter()
                .find(|s| remaining.get(s.as_str()) == Some(&0))
                .ok_or_else(|| {
                    let stuck: Vec<&str> = self
                        .steps
                        .iter()
                        .map(|s| s.as_str())
                        .filter(|s| remaining.contains_key(s))
                        .collect();
                    Error::Validation(format!(
                        "Circular dependency detected involving steps: {}",
                        stuck.join(", ")
                    ))
                })?;

            remaining.remove(next.as_str());
            for dependent in self.downstream(next) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                }
            }
            order.push(next.clone());
        }

        Ok(order)
    }

    /// Generate a simple text representation, roots first.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        let mut visited = HashSet::new();

        for root in self.roots() {
            self.format_step(root, 0, &mut visited, &mut lines);
        }

        lines.join("\n")
    }

    fn format_step(
        &self,
        step: &str,
        depth: usize,
        visited: &mut HashSet<String>,
        lines: &mut Vec<String>,
    ) {
        let indent = "  ".repeat(depth);
        let marker = if depth == 0 { "" } else { "└─ " };

        if visited.contains(step) {
            lines.push(format!("{}{}{}  (already shown)", indent, marker, step));
            return;
        }

        visited.insert(step.to_string());
        lines.push(format!("{}{}{}", indent, marker, step));

        for dependent in self.downstream(step) {
            self.format_step(dependent, depth + 1, visited, lines);
        }
    }
}

impl Default for StepGraph {
    fn default() -> Self {
        Self::new()
    }
}
