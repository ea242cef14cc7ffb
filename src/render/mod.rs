//! Step → Kubernetes Pod manifests.
//!
//! Produces the pods an orchestrator would submit for one run of a
//! workflow, as typed core/v1 objects. Nothing here talks to a cluster.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvFromSource, KeyToPath, PodSpec, ResourceRequirements,
    SecretEnvSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

pub use k8s_openapi::api::core::v1::Pod;

use crate::error::{Error, Result};
use crate::workflow::{is_dns_label, ResourceList, Step, StepGraph, WorkflowDefinition};

/// Name of the single container in every step pod.
pub const CONTAINER_NAME: &str = "base";

pub const LABEL_WORKFLOW: &str = "podflow.io/workflow";
pub const LABEL_STEP: &str = "podflow.io/step";
pub const LABEL_RUN_ID: &str = "podflow.io/run-id";

pub const ANNOTATION_OWNER: &str = "podflow.io/owner";
pub const ANNOTATION_ON_FINISH: &str = "podflow.io/on-finish";
pub const ANNOTATION_GET_LOGS: &str = "podflow.io/get-logs";
pub const ANNOTATION_TAGS: &str = "podflow.io/tags";

/// Rendering settings that do not come from the definition.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Namespace for steps that do not name one
    pub default_namespace: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            default_namespace: "default".to_string(),
        }
    }
}

/// Pod name for a step in a given run: `<step name>-<8 chars of run id>`.
pub fn pod_name(step: &Step, run_id: &str) -> String {
    let suffix: String = run_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(8)
        .collect();

    if suffix.is_empty() {
        step.name.clone()
    } else {
        format!("{}-{}", step.name, suffix)
    }
}

/// Namespace a step's pod lands in.
pub fn step_namespace<'a>(step: &'a Step, options: &'a RenderOptions) -> &'a str {
    step.namespace
        .as_deref()
        .unwrap_or(options.default_namespace.as_str())
}

/// Render the pod for one step.
pub fn render_pod(
    workflow: &WorkflowDefinition,
    step: &Step,
    run_id: &str,
    options: &RenderOptions,
) -> Result<Pod> {
    let namespace = step_namespace(step, options);
    if !is_dns_label(namespace) {
        return Err(Error::Render(format!(
            "Step '{}' resolves to invalid namespace '{}'",
            step.id, namespace
        )));
    }

    let mut labels = step.labels.clone();
    labels.insert(LABEL_WORKFLOW.to_string(), workflow.name.clone());
    labels.insert(LABEL_STEP.to_string(), step.id.clone());
    labels.insert(LABEL_RUN_ID.to_string(), run_id.to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(
        ANNOTATION_OWNER.to_string(),
        workflow.default_args.owner.clone(),
    );
    annotations.insert(
        ANNOTATION_ON_FINISH.to_string(),
        on_finish_label(step).to_string(),
    );
    annotations.insert(ANNOTATION_GET_LOGS.to_string(), step.get_logs.to_string());
    if !workflow.tags.is_empty() {
        annotations.insert(ANNOTATION_TAGS.to_string(), workflow.tags.join(","));
    }

    let env_from: Vec<EnvFromSource> = step
        .env_from
        .iter()
        .map(|source| EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: source.secret.clone(),
                optional: source.optional.then_some(true),
            }),
            ..Default::default()
        })
        .collect();

    let volume_mounts: Vec<VolumeMount> = step
        .config_mounts
        .iter()
        .map(|mount| VolumeMount {
            name: mount.volume_name(),
            mount_path: mount.mount_path.clone(),
            sub_path: mount.sub_path.clone(),
            read_only: Some(mount.read_only),
            ..Default::default()
        })
        .collect();

    let requests = resource_map(&step.resources.requests);
    let limits = resource_map(&step.resources.limits);
    let resources = (requests.is_some() || limits.is_some()).then(|| ResourceRequirements {
        requests,
        limits,
        ..Default::default()
    });

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(step.image.clone()),
        image_pull_policy: Some(step.image_pull_policy.as_str().to_string()),
        command: Some(step.command.clone()),
        env_from: non_empty(env_from),
        volume_mounts: non_empty(volume_mounts),
        resources,
        ..Default::default()
    };

    let pod = Pod {
        metadata: ObjectMeta {
            name: Some(pod_name(step, run_id)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![container],
            volumes: non_empty(step_volumes(step)?),
            ..Default::default()
        }),
        ..Default::default()
    };

    debug!(
        workflow = %workflow.name,
        step = %step.id,
        pod = %pod_name_of(&pod),
        namespace = %namespace,
        "Rendered pod manifest"
    );

    Ok(pod)
}

/// Name of a rendered pod (empty if unset).
pub fn pod_name_of(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

/// Namespace of a rendered pod (empty if unset).
pub fn pod_namespace_of(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or_default()
}

/// Render every step of a workflow, in execution order.
pub fn render_workflow(
    workflow: &WorkflowDefinition,
    run_id: &str,
    options: &RenderOptions,
) -> Result<Vec<Pod>> {
    let order = StepGraph::from_definition(workflow).execution_order()?;

    order
        .iter()
        .map(|id| {
            let step = workflow
                .get_step(id)
                .ok_or_else(|| Error::Render(format!("Edge references unknown step '{}'", id)))?;
            render_pod(workflow, step, run_id, options)
        })
        .collect()
}

/// Serialize manifests as a multi-document YAML stream.
pub fn to_yaml_documents(pods: &[Pod]) -> Result<String> {
    let mut out = String::new();
    for pod in pods {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(pod)?);
    }
    Ok(out)
}

/// Serialize manifests as a Kubernetes `List`.
pub fn to_json_list(pods: &[Pod]) -> Result<String> {
    let list = serde_json::json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": pods,
    });
    Ok(serde_json::to_string_pretty(&list)?)
}

fn on_finish_label(step: &Step) -> &'static str {
    use crate::workflow::OnFinishAction;
    match step.on_finish {
        OnFinishAction::DeletePod => "delete_pod",
        OnFinishAction::DeleteSucceededPod => "delete_succeeded_pod",
        OnFinishAction::KeepPod => "keep_pod",
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn resource_map(list: &ResourceList) -> Option<BTreeMap<String, Quantity>> {
    let map: BTreeMap<String, Quantity> = list
        .entries()
        .into_iter()
        .map(|(name, value)| (name.to_string(), Quantity(value.to_string())))
        .collect();
    (!map.is_empty()).then_some(map)
}

fn step_volumes(step: &Step) -> Result<Vec<Volume>> {
    // (volume name, config map, items)
    let mut sources: Vec<(String, &str, Vec<KeyToPath>)> = Vec::new();

    for mount in &step.config_mounts {
        let name = mount.volume_name();
        let item = mount.sub_path.as_ref().map(|key| KeyToPath {
            key: key.clone(),
            path: key.clone(),
            ..Default::default()
        });

        match sources.iter_mut().find(|(existing, _, _)| *existing == name) {
            Some((_, config_map, items)) => {
                if *config_map != mount.config_map {
                    return Err(Error::Render(format!(
                        "Step '{}' uses volume '{}' for both '{}' and '{}'",
                        step.id, name, config_map, mount.config_map
                    )));
                }
                if let Some(item) = item {
                    if !items.contains(&item) {
                        items.push(item);
                    }
                }
            }
            None => sources.push((name, mount.config_map.as_str(), item.into_iter().collect())),
        }
    }

    Ok(sources
        .into_iter()
        .map(|(name, config_map, items)| Volume {
            name,
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.to_string(),
                items: non_empty(items),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::parse_workflow;

    const RUN_ID: &str = "3f2a9c1e-7b4d-4e8a-9f00-123456789abc";

    fn workflow() -> WorkflowDefinition {
        parse_workflow(
            r#"
name: render-test
schedule: "0 6,18 * * *"
tags: [production, bigdata]
steps:
  - id: load
    name: load-worker
    image: app:v1
    command: [python, -m, app.load]
  - id: fetch
    name: fetch-worker
    namespace: batch
    image: app:v1
    image_pull_policy: Never
    command: [python, -m, app.fetch]
    config_mounts:
      - config_map: app-config
        volume: config-vol
        mount_path: /app/configs/app_config.yaml
        sub_path: app_config.yaml
      - config_map: app-config
        volume: config-vol
        mount_path: /app/configs/logging.yaml
        sub_path: logging.yaml
    env_from:
      - secret: db-secret
    resources:
      requests: {memory: 500Mi, cpu: 500m}
      limits: {memory: 1Gi, cpu: 1000m}
    on_finish: keep_pod
edges:
  - {upstream: fetch, downstream: load}
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_pod_name_uses_run_id_prefix() {
        let wf = workflow();
        assert_eq!(pod_name(&wf.steps[1], RUN_ID), "fetch-worker-3f2a9c1e");
        assert_eq!(pod_name(&wf.steps[1], ""), "fetch-worker");
    }

    fn spec(pod: &Pod) -> &PodSpec {
        pod.spec.as_ref().unwrap()
    }

    #[test]
    fn test_render_pod_fields() {
        let wf = workflow();
        let pod = render_pod(&wf, &wf.steps[1], RUN_ID, &RenderOptions::default()).unwrap();

        let labels = pod.metadata.labels.as_ref().unwrap();
        let annotations = pod.metadata.annotations.as_ref().unwrap();
        assert_eq!(pod_namespace_of(&pod), "batch");
        assert_eq!(pod_name_of(&pod), "fetch-worker-3f2a9c1e");
        assert_eq!(labels[LABEL_STEP], "fetch");
        assert_eq!(labels[LABEL_WORKFLOW], "render-test");
        assert_eq!(annotations[ANNOTATION_ON_FINISH], "keep_pod");
        assert_eq!(annotations[ANNOTATION_TAGS], "production,bigdata");
        assert_eq!(spec(&pod).restart_policy.as_deref(), Some("Never"));

        let container = &spec(&pod).containers[0];
        assert_eq!(container.name, CONTAINER_NAME);
        assert_eq!(container.image_pull_policy.as_deref(), Some("Never"));
        assert_eq!(
            container.command.as_deref().unwrap(),
            ["python", "-m", "app.fetch"]
        );
        let env_from = container.env_from.as_ref().unwrap();
        assert_eq!(env_from[0].secret_ref.as_ref().unwrap().name, "db-secret");

        let resources = container.resources.as_ref().unwrap();
        assert_eq!(
            resources.requests.as_ref().unwrap()["memory"],
            Quantity("500Mi".to_string())
        );
        assert_eq!(
            resources.limits.as_ref().unwrap()["cpu"],
            Quantity("1000m".to_string())
        );

        let mounts = container.volume_mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 2);
        assert!(mounts.iter().all(|m| m.read_only == Some(true)));

        let volumes = spec(&pod).volumes.as_ref().unwrap();
        assert_eq!(volumes.len(), 1);
        let source = volumes[0].config_map.as_ref().unwrap();
        assert_eq!(source.name, "app-config");
        assert_eq!(source.items.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_default_namespace_applies() {
        let wf = workflow();
        let options = RenderOptions {
            default_namespace: "jobs".to_string(),
        };
        let pod = render_pod(&wf, &wf.steps[0], RUN_ID, &options).unwrap();
        assert_eq!(pod_namespace_of(&pod), "jobs");
        assert!(spec(&pod).volumes.is_none());
        assert!(spec(&pod).containers[0].resources.is_none());
        assert!(spec(&pod).containers[0].env_from.is_none());

        let bad = RenderOptions {
            default_namespace: "Not Valid".to_string(),
        };
        assert!(render_pod(&wf, &wf.steps[0], RUN_ID, &bad).is_err());
    }

    #[test]
    fn test_conflicting_volume_names() {
        let mut wf = workflow();
        wf.steps[1].config_mounts[1].config_map = "other-config".to_string();
        let err = render_pod(&wf, &wf.steps[1], RUN_ID, &RenderOptions::default()).unwrap_err();
        assert_eq!(err.code(), "RENDER_ERROR");
    }

    #[test]
    fn test_render_workflow_in_execution_order() {
        let wf = workflow();
        let pods = render_workflow(&wf, RUN_ID, &RenderOptions::default()).unwrap();
        let names: Vec<_> = pods
            .iter()
            .map(|p| p.metadata.labels.as_ref().unwrap()[LABEL_STEP].as_str())
            .collect();
        assert_eq!(names, vec!["fetch", "load"]);
    }

    #[test]
    fn test_yaml_uses_kubernetes_field_names() {
        let wf = workflow();
        let pods = render_workflow(&wf, RUN_ID, &RenderOptions::default()).unwrap();
        let yaml = to_yaml_documents(&pods).unwrap();

        assert_eq!(yaml.matches("---\n").count(), 2);
        assert!(yaml.contains("apiVersion: v1"));
        assert!(yaml.contains("kind: Pod"));
        assert!(yaml.contains("memory: 500Mi"));
        assert!(yaml.contains("imagePullPolicy: Never"));
        assert!(yaml.contains("mountPath: /app/configs/app_config.yaml"));
        assert!(yaml.contains("subPath: app_config.yaml"));
        assert!(yaml.contains("readOnly: true"));
        assert!(yaml.contains("secretRef:"));
        assert!(yaml.contains("restartPolicy: Never"));

        let json = to_json_list(&pods).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["kind"], "List");
        assert_eq!(parsed["items"].as_array().unwrap().len(), 2);
    }
}
