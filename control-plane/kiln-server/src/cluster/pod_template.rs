use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, Pod,
    PodSpec, ResourceRequirements as K8sResources, SecurityContext, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::ServerConfig;
use crate::model::{
    ResourceEnvelope, Runner, RunnerState, SshDetails, WorkspaceSpec,
    current_preset,
};

pub const MANAGED_BY: &str = "kiln";

pub const RUNNER_ID_ANNOTATION: &str = "kiln.io/runner-id";
pub const RUNNER_NAME_ANNOTATION: &str = "kiln.io/runner-name";
pub const RUNNER_STATUS_ANNOTATION: &str = "kiln.io/status";
pub const RUNNER_CREATED_ANNOTATION: &str = "kiln.io/created-at";
pub const RUNNER_FINALIZER: &str = "kiln.io/runner-finalizer";

/// Selector used by the list operation: managed-by AND component.
pub const RUNNER_LABEL_SELECTOR: &str =
    "app.kubernetes.io/managed-by=kiln,app.kubernetes.io/component=runner";

pub const MAIN_CONTAINER: &str = "runner";
pub const SIDECAR_CONTAINER: &str = "s3fs-sidecar";

/// The workspace bucket is always mounted here, in both containers.
pub const WORKSPACE_MOUNT_PATH: &str = "/workspace/dataset";

/// User env keys forwarded to the mount sidecar.
const AWS_PASSTHROUGH: [&str; 3] = [
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
];

pub fn pod_name(runner_id: &str) -> String {
    format!("kiln-runner-{runner_id}")
}

/// Everything needed to render one runner pod.
#[derive(Clone, Debug)]
pub struct PodCreationRequest {
    pub pod_name: String,
    pub namespace: String,
    pub runner_id: String,
    pub runner_name: String,
    pub image: String,
    pub s3fs_image: String,
    pub cpu_request: String,
    pub memory_request: String,
    pub ssh_port: i32,
    pub env: HashMap<String, String>,
    pub workspace: Option<WorkspaceSpec>,
}

#[derive(Clone, Debug)]
pub struct PodDeletionRequest {
    pub pod_name: String,
    pub namespace: String,
    pub runner_id: String,
}

impl PodCreationRequest {
    pub fn build(runner: &Runner, config: &ServerConfig) -> Self {
        let preset = current_preset();
        Self {
            pod_name: pod_name(&runner.id),
            namespace: config.namespace.clone(),
            runner_id: runner.id.clone(),
            runner_name: runner.name.clone(),
            image: config.runner_image.clone(),
            s3fs_image: config.s3fs_image.clone(),
            cpu_request: preset.cpu.to_string(),
            memory_request: preset.memory.to_string(),
            ssh_port: config.ssh_port,
            env: runner.env.clone(),
            workspace: runner.workspace.clone(),
        }
    }

    /// Renders the two-container runner pod: the privileged s3fs mount
    /// sidecar and the main runner container, sharing an emptyDir workspace
    /// volume with bidirectional mount propagation.
    pub fn to_pod(&self) -> Pod {
        let mut main_env = vec![
            env_var("RUNNER_ID", &self.runner_id),
            env_var("RUNNER_NAME", &self.runner_name),
        ];
        let mut user_env: Vec<_> = self.env.iter().collect();
        user_env.sort();
        for (key, value) in &user_env {
            main_env.push(env_var(key, value));
        }

        let mut sidecar_env = vec![
            env_var("RUNNER_ID", &self.runner_id),
            env_var("RUNNER_NAME", &self.runner_name),
        ];
        for (key, value) in &user_env {
            if AWS_PASSTHROUGH.contains(&key.as_str()) {
                sidecar_env.push(env_var(key, value));
            }
        }
        if let Some(ws) = self.workspace.as_ref().filter(|w| !w.bucket.is_empty())
        {
            sidecar_env.push(env_var("S3_BUCKET", &ws.bucket));
            if !ws.endpoint.is_empty() {
                sidecar_env.push(env_var("S3_ENDPOINT", &ws.endpoint));
            }
            if !ws.prefix.is_empty() {
                sidecar_env.push(env_var("S3_PREFIX", &ws.prefix));
            }
            if !ws.region.is_empty() {
                sidecar_env.push(env_var("AWS_DEFAULT_REGION", &ws.region));
            }
            sidecar_env.push(env_var("MOUNT_PATH", WORKSPACE_MOUNT_PATH));
            if ws.read_only {
                sidecar_env.push(env_var("MOUNT_OPTIONS", "ro"));
            }
        }

        let workspace_mount = VolumeMount {
            name: "workspace".to_string(),
            mount_path: WORKSPACE_MOUNT_PATH.to_string(),
            mount_propagation: Some("Bidirectional".to_string()),
            ..Default::default()
        };

        let sidecar = Container {
            name: SIDECAR_CONTAINER.to_string(),
            image: Some(self.s3fs_image.clone()),
            resources: Some(K8sResources {
                requests: Some(quantities([("cpu", "50m"), ("memory", "64Mi")])),
                limits: Some(quantities([("cpu", "100m"), ("memory", "128Mi")])),
                ..Default::default()
            }),
            env: Some(sidecar_env),
            volume_mounts: Some(vec![workspace_mount.clone()]),
            security_context: Some(SecurityContext {
                privileged: Some(true),
                capabilities: Some(Capabilities {
                    add: Some(vec!["SYS_ADMIN".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let main = Container {
            name: MAIN_CONTAINER.to_string(),
            image: Some(self.image.clone()),
            ports: Some(vec![ContainerPort {
                container_port: self.ssh_port,
                name: Some("ssh".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            resources: Some(K8sResources {
                requests: Some(quantities([
                    ("cpu", self.cpu_request.as_str()),
                    ("memory", self.memory_request.as_str()),
                ])),
                limits: Some(quantities([
                    ("cpu", self.cpu_request.as_str()),
                    ("memory", self.memory_request.as_str()),
                ])),
                ..Default::default()
            }),
            env: Some(main_env),
            volume_mounts: Some(vec![workspace_mount]),
            command: Some(vec!["/usr/local/bin/entrypoint.sh".to_string()]),
            args: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            security_context: Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        Pod {
            metadata: ObjectMeta {
                name: Some(self.pod_name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([
                    ("app".to_string(), "kiln-runner".to_string()),
                    (
                        "app.kubernetes.io/managed-by".to_string(),
                        MANAGED_BY.to_string(),
                    ),
                    (
                        "app.kubernetes.io/component".to_string(),
                        "runner".to_string(),
                    ),
                    (
                        "app.kubernetes.io/name".to_string(),
                        "kiln-runner".to_string(),
                    ),
                    (
                        "app.kubernetes.io/instance".to_string(),
                        self.runner_id.clone(),
                    ),
                    ("type".to_string(), "runner".to_string()),
                    ("runner-id".to_string(), self.runner_id.clone()),
                ])),
                annotations: Some(BTreeMap::from([
                    (RUNNER_ID_ANNOTATION.to_string(), self.runner_id.clone()),
                    (
                        RUNNER_NAME_ANNOTATION.to_string(),
                        self.runner_name.clone(),
                    ),
                    (
                        RUNNER_STATUS_ANNOTATION.to_string(),
                        "creating".to_string(),
                    ),
                    (
                        RUNNER_CREATED_ANNOTATION.to_string(),
                        Utc::now().to_rfc3339(),
                    ),
                ])),
                finalizers: Some(vec![RUNNER_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: Some(PodSpec {
                restart_policy: Some("Always".to_string()),
                share_process_namespace: Some(true),
                termination_grace_period_seconds: Some(3),
                volumes: Some(vec![Volume {
                    name: "workspace".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }]),
                containers: vec![sidecar, main],
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl PodDeletionRequest {
    pub fn build(runner_id: &str, config: &ServerConfig) -> Self {
        Self {
            pod_name: pod_name(runner_id),
            namespace: config.namespace.clone(),
            runner_id: runner_id.to_string(),
        }
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn quantities<const N: usize>(
    entries: [(&str, &str); N],
) -> BTreeMap<String, Quantity> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect()
}

/// Maps a pod snapshot to a runner state. Pure function of the pod's phase
/// and conditions; the status annotation is never consulted.
pub fn map_pod_state(pod: &Pod) -> RunnerState {
    let status = pod.status.as_ref();
    let phase = status.and_then(|s| s.phase.as_deref()).unwrap_or("");
    match phase {
        "Pending" => RunnerState::Creating,
        "Running" => {
            let ready = status
                .and_then(|s| s.conditions.as_ref())
                .map(|conds| {
                    conds
                        .iter()
                        .any(|c| c.type_ == "Ready" && c.status == "True")
                })
                .unwrap_or(false);
            if ready {
                RunnerState::Running
            } else {
                RunnerState::Creating
            }
        }
        "Succeeded" => RunnerState::Stopped,
        "Failed" => RunnerState::Error,
        _ => RunnerState::Error,
    }
}

/// Projects a pod snapshot back to a runner value, the inverse of `to_pod`.
pub fn pod_to_runner(pod: &Pod) -> Runner {
    let annotations = pod.metadata.annotations.as_ref();
    let labels = pod.metadata.labels.as_ref();

    let id = annotations
        .and_then(|a| a.get(RUNNER_ID_ANNOTATION))
        .or_else(|| labels.and_then(|l| l.get("runner-id")))
        .cloned()
        .unwrap_or_default();
    let name = annotations
        .and_then(|a| a.get(RUNNER_NAME_ANNOTATION))
        .cloned()
        .unwrap_or_else(|| id.clone());

    let created_at = annotations
        .and_then(|a| a.get(RUNNER_CREATED_ANNOTATION))
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        .map(|t| t.timestamp())
        .or_else(|| {
            pod.metadata.creation_timestamp.as_ref().map(|t| t.0.timestamp())
        })
        .unwrap_or_default();
    let updated_at = pod
        .status
        .as_ref()
        .and_then(|s| s.start_time.as_ref())
        .map(|t| t.0.timestamp())
        .unwrap_or(created_at);

    let ip_address = pod
        .status
        .as_ref()
        .and_then(|s| s.pod_ip.clone())
        .unwrap_or_default();

    let main = pod
        .spec
        .as_ref()
        .and_then(|s| s.containers.iter().find(|c| c.name == MAIN_CONTAINER));

    let resources = main
        .and_then(|c| c.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .map(|requests| ResourceEnvelope {
            cpu_millicores: requests.get("cpu").map(cpu_millis).unwrap_or(0),
            memory_mb: requests.get("memory").map(memory_mib).unwrap_or(0),
            storage_gb: requests
                .get("ephemeral-storage")
                .map(storage_gib)
                .unwrap_or(0),
        })
        .unwrap_or_default();

    let env = main
        .and_then(|c| c.env.as_ref())
        .map(|vars| {
            vars.iter()
                .map(|v| (v.name.clone(), v.value.clone().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();

    let ssh_port = main
        .and_then(|c| c.ports.as_ref())
        .and_then(|ports| {
            ports.iter().find(|p| p.name.as_deref() == Some("ssh"))
        })
        .map(|p| p.container_port)
        .unwrap_or(22);
    let ssh = Some(SshDetails {
        host: if ip_address.is_empty() {
            "localhost".to_string()
        } else {
            ip_address.clone()
        },
        port: ssh_port,
        username: "runner".to_string(),
        public_key: String::new(),
    });

    Runner {
        id,
        name,
        state: map_pod_state(pod),
        resources,
        created_at,
        updated_at,
        ssh,
        ip_address,
        env,
        workspace: None,
    }
}

/// "2000m" → 2000, "2" → 2000.
fn cpu_millis(q: &Quantity) -> i32 {
    let raw = q.0.as_str();
    if let Some(millis) = raw.strip_suffix('m') {
        millis.parse().unwrap_or(0)
    } else {
        raw.parse::<f64>().map(|cores| (cores * 1000.0) as i32).unwrap_or(0)
    }
}

fn memory_mib(q: &Quantity) -> i32 {
    (quantity_bytes(q) / (1024 * 1024)) as i32
}

fn storage_gib(q: &Quantity) -> i32 {
    (quantity_bytes(q) / (1024 * 1024 * 1024)) as i32
}

/// Resolves the binary and decimal suffixes the presets and kubelet emit.
fn quantity_bytes(q: &Quantity) -> i64 {
    let raw = q.0.as_str();
    let suffixes: [(&str, i64); 8] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];
    for (suffix, scale) in suffixes {
        if let Some(value) = raw.strip_suffix(suffix) {
            return value.parse::<i64>().map(|v| v * scale).unwrap_or(0);
        }
    }
    raw.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(
        env: HashMap<String, String>,
        workspace: Option<WorkspaceSpec>,
    ) -> PodCreationRequest {
        let runner = Runner {
            id: "runner-7".into(),
            name: "bench".into(),
            state: RunnerState::Creating,
            resources: current_preset().envelope(),
            created_at: 0,
            updated_at: 0,
            ssh: None,
            ip_address: String::new(),
            env,
            workspace,
        };
        PodCreationRequest::build(&runner, &ServerConfig::default())
    }

    fn env_value(container: &Container, name: &str) -> Option<String> {
        container
            .env
            .as_ref()?
            .iter()
            .find(|v| v.name == name)?
            .value
            .clone()
    }

    #[test]
    fn pod_name_concatenates_prefix_and_id() {
        assert_eq!(pod_name("runner-7"), "kiln-runner-runner-7");
    }

    #[test]
    fn rendered_pod_carries_labels_annotations_and_finalizer() {
        let pod = request(HashMap::new(), None).to_pod();
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels["app.kubernetes.io/managed-by"], "kiln");
        assert_eq!(labels["app.kubernetes.io/component"], "runner");
        assert_eq!(labels["app.kubernetes.io/instance"], "runner-7");
        assert_eq!(labels["runner-id"], "runner-7");
        assert_eq!(labels["type"], "runner");

        let annotations = pod.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations[RUNNER_ID_ANNOTATION], "runner-7");
        assert_eq!(annotations[RUNNER_NAME_ANNOTATION], "bench");
        assert_eq!(annotations[RUNNER_STATUS_ANNOTATION], "creating");
        assert!(
            chrono::DateTime::parse_from_rfc3339(
                &annotations[RUNNER_CREATED_ANNOTATION]
            )
            .is_ok()
        );

        assert_eq!(
            pod.metadata.finalizers.as_deref(),
            Some(&[RUNNER_FINALIZER.to_string()][..])
        );
    }

    #[test]
    fn rendered_pod_spec_shares_workspace_between_both_containers() {
        let pod = request(HashMap::new(), None).to_pod();
        let spec = pod.spec.unwrap();
        assert_eq!(spec.share_process_namespace, Some(true));
        assert_eq!(spec.termination_grace_period_seconds, Some(3));
        assert_eq!(spec.restart_policy.as_deref(), Some("Always"));
        assert_eq!(spec.containers.len(), 2);
        assert_eq!(spec.containers[0].name, SIDECAR_CONTAINER);
        assert_eq!(spec.containers[1].name, MAIN_CONTAINER);
        for container in &spec.containers {
            let mounts = container.volume_mounts.as_ref().unwrap();
            assert_eq!(mounts[0].mount_path, WORKSPACE_MOUNT_PATH);
            assert_eq!(
                mounts[0].mount_propagation.as_deref(),
                Some("Bidirectional")
            );
        }
    }

    #[test]
    fn main_container_gets_identity_and_user_env() {
        let env = HashMap::from([
            ("K".to_string(), "v".to_string()),
            ("AWS_ACCESS_KEY_ID".to_string(), "ak".to_string()),
        ]);
        let pod = request(env, None).to_pod();
        let spec = pod.spec.unwrap();
        let main = &spec.containers[1];

        assert_eq!(env_value(main, "RUNNER_ID").as_deref(), Some("runner-7"));
        assert_eq!(env_value(main, "RUNNER_NAME").as_deref(), Some("bench"));
        assert_eq!(env_value(main, "K").as_deref(), Some("v"));
        assert_eq!(main.command.as_ref().unwrap()[0], "/usr/local/bin/entrypoint.sh");
        assert_eq!(
            main.args.as_deref(),
            Some(&["sleep".to_string(), "infinity".to_string()][..])
        );
        assert_eq!(
            main.security_context.as_ref().unwrap().privileged,
            Some(true)
        );
        let port = &main.ports.as_ref().unwrap()[0];
        assert_eq!(port.container_port, 22);
        assert_eq!(port.name.as_deref(), Some("ssh"));
    }

    #[test]
    fn sidecar_gets_aws_passthrough_but_not_other_user_env() {
        let env = HashMap::from([
            ("K".to_string(), "v".to_string()),
            ("AWS_ACCESS_KEY_ID".to_string(), "ak".to_string()),
            ("AWS_SECRET_ACCESS_KEY".to_string(), "sk".to_string()),
        ]);
        let pod = request(env, None).to_pod();
        let spec = pod.spec.unwrap();
        let sidecar = &spec.containers[0];

        assert_eq!(env_value(sidecar, "AWS_ACCESS_KEY_ID").as_deref(), Some("ak"));
        assert_eq!(
            env_value(sidecar, "AWS_SECRET_ACCESS_KEY").as_deref(),
            Some("sk")
        );
        assert_eq!(env_value(sidecar, "K"), None);

        let sc = sidecar.security_context.as_ref().unwrap();
        assert_eq!(sc.privileged, Some(true));
        assert_eq!(
            sc.capabilities.as_ref().unwrap().add.as_deref(),
            Some(&["SYS_ADMIN".to_string()][..])
        );
    }

    #[test]
    fn workspace_descriptor_configures_sidecar_mount_env() {
        let ws = WorkspaceSpec {
            bucket: "datasets".into(),
            endpoint: "http://minio:9000".into(),
            prefix: "team-a/".into(),
            region: "eu-west-1".into(),
            read_only: true,
        };
        let pod = request(HashMap::new(), Some(ws)).to_pod();
        let spec = pod.spec.unwrap();
        let sidecar = &spec.containers[0];

        assert_eq!(env_value(sidecar, "S3_BUCKET").as_deref(), Some("datasets"));
        assert_eq!(
            env_value(sidecar, "S3_ENDPOINT").as_deref(),
            Some("http://minio:9000")
        );
        assert_eq!(env_value(sidecar, "S3_PREFIX").as_deref(), Some("team-a/"));
        assert_eq!(
            env_value(sidecar, "AWS_DEFAULT_REGION").as_deref(),
            Some("eu-west-1")
        );
        assert_eq!(
            env_value(sidecar, "MOUNT_PATH").as_deref(),
            Some(WORKSPACE_MOUNT_PATH)
        );
        assert_eq!(env_value(sidecar, "MOUNT_OPTIONS").as_deref(), Some("ro"));
    }

    #[test]
    fn writable_workspace_omits_mount_options() {
        let ws = WorkspaceSpec {
            bucket: "datasets".into(),
            ..Default::default()
        };
        let pod = request(HashMap::new(), Some(ws)).to_pod();
        let spec = pod.spec.unwrap();
        let sidecar = &spec.containers[0];
        assert_eq!(env_value(sidecar, "MOUNT_OPTIONS"), None);
        assert_eq!(env_value(sidecar, "S3_ENDPOINT"), None);
    }

    fn pod_with_status(status: serde_json::Value) -> Pod {
        serde_json::from_value(json!({
            "metadata": {},
            "status": status,
        }))
        .unwrap()
    }

    #[test]
    fn pending_pod_maps_to_creating() {
        let pod = pod_with_status(json!({ "phase": "Pending" }));
        assert_eq!(map_pod_state(&pod), RunnerState::Creating);
    }

    #[test]
    fn running_pod_without_ready_condition_maps_to_creating() {
        let pod = pod_with_status(json!({
            "phase": "Running",
            "conditions": [{ "type": "Ready", "status": "False" }]
        }));
        assert_eq!(map_pod_state(&pod), RunnerState::Creating);
    }

    #[test]
    fn running_and_ready_pod_maps_to_running() {
        let pod = pod_with_status(json!({
            "phase": "Running",
            "conditions": [
                { "type": "PodScheduled", "status": "True" },
                { "type": "Ready", "status": "True" }
            ]
        }));
        assert_eq!(map_pod_state(&pod), RunnerState::Running);
    }

    #[test]
    fn terminal_phases_map_to_terminal_states() {
        let succeeded = pod_with_status(json!({ "phase": "Succeeded" }));
        assert_eq!(map_pod_state(&succeeded), RunnerState::Stopped);
        let failed = pod_with_status(json!({ "phase": "Failed" }));
        assert_eq!(map_pod_state(&failed), RunnerState::Error);
        let unknown = pod_with_status(json!({ "phase": "Unknown" }));
        assert_eq!(map_pod_state(&unknown), RunnerState::Error);
        let empty = pod_with_status(json!({}));
        assert_eq!(map_pod_state(&empty), RunnerState::Error);
    }

    #[test]
    fn projection_recovers_identity_env_and_resources_from_rendered_pod() {
        let env = HashMap::from([("K".to_string(), "v".to_string())]);
        let mut pod = request(env, None).to_pod();
        pod.status = serde_json::from_value(json!({
            "phase": "Running",
            "podIP": "10.1.2.3",
            "conditions": [{ "type": "Ready", "status": "True" }]
        }))
        .unwrap();

        let runner = pod_to_runner(&pod);
        assert_eq!(runner.id, "runner-7");
        assert_eq!(runner.name, "bench");
        assert_eq!(runner.state, RunnerState::Running);
        assert_eq!(runner.ip_address, "10.1.2.3");
        assert_eq!(runner.env.get("K").map(String::as_str), Some("v"));
        assert_eq!(runner.env.get("RUNNER_ID").map(String::as_str), Some("runner-7"));
        assert_eq!(runner.resources.cpu_millicores, 2000);
        assert_eq!(runner.resources.memory_mb, 2048);
        assert!(runner.created_at > 0);

        let ssh = runner.ssh.unwrap();
        assert_eq!(ssh.host, "10.1.2.3");
        assert_eq!(ssh.port, 22);
        assert_eq!(ssh.username, "runner");
    }

    #[test]
    fn projection_falls_back_to_labels_when_annotations_missing() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {
                "labels": { "runner-id": "runner-9" },
                "creationTimestamp": "2024-05-01T12:00:00Z"
            },
            "status": { "phase": "Pending" }
        }))
        .unwrap();
        let runner = pod_to_runner(&pod);
        assert_eq!(runner.id, "runner-9");
        assert_eq!(runner.name, "runner-9");
        assert_eq!(runner.state, RunnerState::Creating);
        assert!(runner.created_at > 0);
    }

    #[test]
    fn quantity_parsing_covers_preset_and_kubelet_forms() {
        assert_eq!(cpu_millis(&Quantity("2000m".into())), 2000);
        assert_eq!(cpu_millis(&Quantity("2".into())), 2000);
        assert_eq!(cpu_millis(&Quantity("50m".into())), 50);
        assert_eq!(memory_mib(&Quantity("2Gi".into())), 2048);
        assert_eq!(memory_mib(&Quantity("64Mi".into())), 64);
        assert_eq!(memory_mib(&Quantity("128M".into())), 122);
        assert_eq!(storage_gib(&Quantity("40Gi".into())), 40);
        assert_eq!(quantity_bytes(&Quantity("1024".into())), 1024);
        assert_eq!(quantity_bytes(&Quantity("1Ki".into())), 1024);
        assert_eq!(quantity_bytes(&Quantity("garbage".into())), 0);
    }
}
