pub mod activity;
pub mod reaper;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::cluster::RunnerCluster;
use crate::cluster::pod_template::{
    RUNNER_ID_ANNOTATION, map_pod_state, pod_name, pod_to_runner,
};
use crate::model::{
    CreateRunnerRequest, ExecuteCommandRequest, ListOptions, Runner,
    RunnerError, RunnerState, SshDetails, current_preset,
};
use activity::ActivityTracker;

const DEFAULT_LIST_LIMIT: i32 = 50;

/// How long ExecuteCommand waits for an auto-provisioned runner to become
/// ready, polling once a second.
const PROVISION_TIMEOUT: Duration = Duration::from_secs(120);
const PROVISION_POLL: Duration = Duration::from_secs(1);

/// The service-facing facade over the cluster gateway. Stateless apart from
/// the activity tracker it shares with the reaper; the cluster is the source
/// of truth for every read.
pub struct RunnerService {
    cluster: Arc<RunnerCluster>,
    activity: Arc<ActivityTracker>,
}

/// The slice of the service the reaper depends on.
#[async_trait]
pub trait RunnerLifecycle: Send + Sync {
    async fn get_runner(&self, runner_id: &str) -> Result<Runner, RunnerError>;
    async fn delete_runner(&self, runner_id: &str) -> Result<(), RunnerError>;
}

impl RunnerService {
    pub fn new(
        cluster: Arc<RunnerCluster>,
        activity: Arc<ActivityTracker>,
    ) -> Self {
        Self { cluster, activity }
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.activity
    }

    /// Allocates the next free identifier, renders and submits the pod, then
    /// re-fetches it so the caller sees cluster-assigned fields.
    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create_runner(
        &self,
        req: CreateRunnerRequest,
    ) -> Result<Runner, RunnerError> {
        let pods = self.cluster.list_runner_pods().await?;
        let id = allocate_runner_id(pods.iter().filter_map(runner_id_of));
        let name = if req.name.is_empty() { id.clone() } else { req.name };
        let now = Utc::now().timestamp();

        let runner = Runner {
            id: id.clone(),
            name,
            state: RunnerState::Creating,
            resources: current_preset().envelope(),
            created_at: now,
            updated_at: now,
            ssh: Some(SshDetails {
                // placeholder until the pod has an IP
                host: "localhost".to_string(),
                port: self.cluster.config().ssh_port,
                username: "runner".to_string(),
                public_key: String::new(),
            }),
            ip_address: String::new(),
            env: req.env,
            workspace: req.workspace,
        };

        self.cluster.create_runner_pod(&runner).await?;
        info!(runner_id = %id, "created runner");

        let pod = self.cluster.get_runner_pod(&id).await?;
        Ok(pod_to_runner(&pod))
    }

    /// Two-phase teardown: the finalizer comes off first, then the pod
    /// deletion is requested. A pod that disappeared between the two steps
    /// still counts as a successful delete.
    #[instrument(skip(self))]
    pub async fn delete_runner(
        &self,
        runner_id: &str,
    ) -> Result<(), RunnerError> {
        let pod = self.cluster.get_runner_pod(runner_id).await?;
        let pod_name = pod
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| pod_name(runner_id));

        self.cluster.remove_runner_finalizer(&pod_name).await?;
        self.cluster.delete_runner_pod(runner_id).await?;
        self.activity.remove(runner_id);
        info!(runner_id, "runner deletion initiated");
        Ok(())
    }

    /// Deletes every runner visible to the list operation; returns how many
    /// deletions were initiated. Runners that vanish mid-flight are skipped.
    #[instrument(skip(self))]
    pub async fn delete_all_runners(&self) -> Result<usize, RunnerError> {
        let pods = self.cluster.list_runner_pods().await?;
        let mut deleted = 0;
        for id in pods.iter().filter_map(runner_id_of) {
            match self.delete_runner(&id).await {
                Ok(()) => deleted += 1,
                Err(RunnerError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    /// Lists runners projected from the current pod snapshot, with an
    /// optional state filter and offset/limit pagination. The returned total
    /// is counted before pagination.
    #[instrument(skip(self))]
    pub async fn list_runners(
        &self,
        opts: ListOptions,
    ) -> Result<(Vec<Runner>, i32), RunnerError> {
        let pods = self.cluster.list_runner_pods().await?;
        let mut runners: Vec<Runner> =
            pods.iter().map(pod_to_runner).collect();
        if let Some(state) = opts.state {
            runners.retain(|r| r.state == state);
        }
        let total = runners.len() as i32;
        let page = paginate(runners, opts.limit, opts.offset);
        Ok((page, total))
    }

    #[instrument(skip(self))]
    pub async fn get_runner(
        &self,
        runner_id: &str,
    ) -> Result<Runner, RunnerError> {
        let pod = self.cluster.get_runner_pod(runner_id).await?;
        Ok(pod_to_runner(&pod))
    }

    /// Streams a command through the cluster gateway. The runner must derive
    /// to Running from the live pod snapshot; anything else fails the
    /// precondition. Exec start is what marks a runner as active.
    #[instrument(skip(self, req, stdout_tx, stderr_tx), fields(runner_id = %req.runner_id))]
    pub async fn execute_command_stream(
        &self,
        req: ExecuteCommandRequest,
        stdout_tx: mpsc::Sender<Vec<u8>>,
        stderr_tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<i32, RunnerError> {
        let pod = self.cluster.get_runner_pod(&req.runner_id).await?;
        let state = map_pod_state(&pod);
        if state != RunnerState::Running {
            return Err(RunnerError::NotRunning(format!(
                "{} is {}",
                req.runner_id,
                state.as_str()
            )));
        }

        self.activity.touch(&req.runner_id);
        self.cluster
            .exec_command_stream(
                &req.runner_id,
                &req.command,
                &req.shell,
                &req.working_dir,
                stdout_tx,
                stderr_tx,
            )
            .await
    }

    /// Runs a command on the first Running runner, provisioning one when
    /// none is available. The readiness wait shares the caller's task, so
    /// cancelling the stream cancels the wait and the exec alike. The
    /// command timeout bounds only the exec, not the readiness wait.
    #[instrument(skip(self, req, stdout_tx, stderr_tx))]
    pub async fn execute_anywhere(
        &self,
        req: ExecuteCommandRequest,
        exec_timeout: Duration,
        stdout_tx: mpsc::Sender<Vec<u8>>,
        stderr_tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<i32, RunnerError> {
        let (running, _) = self
            .list_runners(ListOptions {
                state: Some(RunnerState::Running),
                limit: 10,
                offset: 0,
            })
            .await?;

        let runner_id = match running.first() {
            Some(runner) => runner.id.clone(),
            None => {
                let created = self
                    .create_runner(CreateRunnerRequest {
                        name: format!(
                            "auto-runner-{}",
                            Utc::now().timestamp()
                        ),
                        env: req.env.clone(),
                        workspace: req.workspace.clone(),
                    })
                    .await?;
                info!(runner_id = %created.id, "auto-provisioned runner");
                self.wait_until_running(&created.id).await?;
                created.id
            }
        };

        let req = ExecuteCommandRequest { runner_id, ..req };
        match tokio::time::timeout(
            exec_timeout,
            self.execute_command_stream(req, stdout_tx, stderr_tx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RunnerError::CommandExecution(format!(
                "command timed out after {}s",
                exec_timeout.as_secs()
            ))),
        }
    }

    async fn wait_until_running(
        &self,
        runner_id: &str,
    ) -> Result<(), RunnerError> {
        let wait = async {
            let mut poll = tokio::time::interval(PROVISION_POLL);
            poll.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );
            loop {
                poll.tick().await;
                let runner = self.get_runner(runner_id).await?;
                match runner.state {
                    RunnerState::Running => return Ok(()),
                    state if state.is_terminal() => {
                        return Err(RunnerError::CommandExecution(format!(
                            "runner failed to start: state={}",
                            state.as_str()
                        )));
                    }
                    _ => {}
                }
            }
        };
        match tokio::time::timeout(PROVISION_TIMEOUT, wait).await {
            Ok(result) => result,
            Err(_) => Err(RunnerError::CommandExecution(
                "timed out waiting for runner to become ready".into(),
            )),
        }
    }
}

#[async_trait]
impl RunnerLifecycle for RunnerService {
    async fn get_runner(&self, runner_id: &str) -> Result<Runner, RunnerError> {
        RunnerService::get_runner(self, runner_id).await
    }

    async fn delete_runner(
        &self,
        runner_id: &str,
    ) -> Result<(), RunnerError> {
        RunnerService::delete_runner(self, runner_id).await
    }
}

/// The runner identifier a pod carries, from the annotation with the label
/// as fallback.
fn runner_id_of(pod: &Pod) -> Option<String> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(RUNNER_ID_ANNOTATION))
        .or_else(|| {
            pod.metadata.labels.as_ref().and_then(|l| l.get("runner-id"))
        })
        .cloned()
}

/// Picks `runner-(max+1)` over the numeric siblings currently visible.
/// Identifiers that do not match `runner-<integer>` do not participate.
fn allocate_runner_id(existing: impl Iterator<Item = String>) -> String {
    let max = existing
        .filter_map(|id| {
            id.strip_prefix("runner-")
                .and_then(|n| n.parse::<u64>().ok())
        })
        .max()
        .unwrap_or(0);
    format!("runner-{}", max + 1)
}

fn paginate(runners: Vec<Runner>, limit: i32, offset: i32) -> Vec<Runner> {
    let limit = if limit == 0 { DEFAULT_LIST_LIMIT } else { limit } as usize;
    let offset = offset as usize;
    if offset >= runners.len() {
        return Vec::new();
    }
    runners.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn allocation_starts_at_one() {
        assert_eq!(allocate_runner_id(std::iter::empty()), "runner-1");
    }

    #[test]
    fn allocation_picks_max_plus_one() {
        let ids = ["runner-1", "runner-3", "runner-2"]
            .into_iter()
            .map(String::from);
        assert_eq!(allocate_runner_id(ids), "runner-4");
    }

    #[test]
    fn allocation_ignores_non_numeric_siblings() {
        let ids = ["runner-custom", "oddball", "runner-2", "runner-x1"]
            .into_iter()
            .map(String::from);
        assert_eq!(allocate_runner_id(ids), "runner-3");
    }

    fn runner(id: &str) -> Runner {
        Runner {
            id: id.to_string(),
            name: id.to_string(),
            state: RunnerState::Running,
            resources: Default::default(),
            created_at: 0,
            updated_at: 0,
            ssh: None,
            ip_address: String::new(),
            env: HashMap::new(),
            workspace: None,
        }
    }

    #[test]
    fn paginate_offset_past_end_is_empty() {
        let page = paginate(vec![runner("runner-1")], 10, 5);
        assert!(page.is_empty());
    }

    #[test]
    fn paginate_zero_limit_defaults_to_fifty() {
        let runners: Vec<Runner> =
            (1..=60).map(|i| runner(&format!("runner-{i}"))).collect();
        let page = paginate(runners, 0, 0);
        assert_eq!(page.len(), 50);
        assert_eq!(page[0].id, "runner-1");
    }

    #[test]
    fn paginate_applies_offset_then_limit() {
        let runners: Vec<Runner> =
            (1..=10).map(|i| runner(&format!("runner-{i}"))).collect();
        let page = paginate(runners, 3, 4);
        assert_eq!(
            page.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["runner-5", "runner-6", "runner-7"]
        );
    }

    #[test]
    fn runner_id_of_prefers_annotation_over_label() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {
                "annotations": { "kiln.io/runner-id": "runner-5" },
                "labels": { "runner-id": "runner-9" }
            }
        }))
        .unwrap();
        assert_eq!(runner_id_of(&pod).as_deref(), Some("runner-5"));

        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "labels": { "runner-id": "runner-9" } }
        }))
        .unwrap();
        assert_eq!(runner_id_of(&pod).as_deref(), Some("runner-9"));

        let pod: Pod =
            serde_json::from_value(json!({ "metadata": {} })).unwrap();
        assert_eq!(runner_id_of(&pod), None);
    }
}
