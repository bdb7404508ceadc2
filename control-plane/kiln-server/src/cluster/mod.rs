pub mod pod_template;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::Client;
use kube::api::{
    Api, AttachParams, DeleteParams, ListParams, Patch, PatchParams,
    PostParams,
};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::config::ServerConfig;
use crate::model::{Runner, RunnerError};
use pod_template::{
    MAIN_CONTAINER, PodCreationRequest, PodDeletionRequest,
    RUNNER_FINALIZER, RUNNER_LABEL_SELECTOR, pod_name,
};

/// Adapts the cluster's pod API to runner-shaped operations.
pub struct RunnerCluster {
    client: Client,
    config: ServerConfig,
}

impl RunnerCluster {
    pub fn new(client: Client, config: ServerConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// Submits the rendered runner pod. A name collision from a racing
    /// create surfaces as the resource-conflict kind.
    #[instrument(skip(self, runner), fields(runner_id = %runner.id))]
    pub async fn create_runner_pod(
        &self,
        runner: &Runner,
    ) -> Result<(), RunnerError> {
        let req = PodCreationRequest::build(runner, &self.config);
        let pod = req.to_pod();
        self.pods()
            .create(&PostParams::default(), &pod)
            .await
            .map_err(|e| match e {
                kube::Error::Api(ae) if ae.code == 409 => {
                    RunnerError::Conflict(format!(
                        "pod {} already exists",
                        req.pod_name
                    ))
                }
                other => cluster_api(other),
            })?;
        debug!(pod = %req.pod_name, "created runner pod");
        Ok(())
    }

    /// Best-effort pod deletion; a pod that is already gone counts as
    /// success so reaper and user deletes can race safely.
    #[instrument(skip(self))]
    pub async fn delete_runner_pod(
        &self,
        runner_id: &str,
    ) -> Result<(), RunnerError> {
        let req = PodDeletionRequest::build(runner_id, &self.config);
        match self.pods().delete(&req.pod_name, &DeleteParams::default()).await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(pod = %req.pod_name, "pod already gone on delete");
                Ok(())
            }
            Err(e) => Err(cluster_api(e)),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_runner_pod(
        &self,
        runner_id: &str,
    ) -> Result<Pod, RunnerError> {
        let name = pod_name(runner_id);
        match self.pods().get(&name).await {
            Ok(pod) => Ok(pod),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(RunnerError::NotFound(runner_id.to_string()))
            }
            Err(e) => Err(cluster_api(e)),
        }
    }

    /// Snapshot of every pod carrying the runner label set in the target
    /// namespace.
    #[instrument(skip(self))]
    pub async fn list_runner_pods(&self) -> Result<Vec<Pod>, RunnerError> {
        let lp = ListParams::default().labels(RUNNER_LABEL_SELECTOR);
        let list = self.pods().list(&lp).await.map_err(cluster_api)?;
        Ok(list.items)
    }

    #[instrument(skip(self))]
    pub async fn add_runner_finalizer(
        &self,
        pod_name: &str,
    ) -> Result<(), RunnerError> {
        let pod = self.pods().get(pod_name).await.map_err(cluster_api)?;
        let mut finalizers = pod.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == RUNNER_FINALIZER) {
            return Ok(());
        }
        finalizers.push(RUNNER_FINALIZER.to_string());
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.pods()
            .patch(pod_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(cluster_api)?;
        Ok(())
    }

    /// Gate for two-phase deletion: deletion only completes once the
    /// finalizer is gone.
    #[instrument(skip(self))]
    pub async fn remove_runner_finalizer(
        &self,
        pod_name: &str,
    ) -> Result<(), RunnerError> {
        let pod = self.pods().get(pod_name).await.map_err(cluster_api)?;
        let finalizers: Vec<String> = pod
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != RUNNER_FINALIZER)
            .collect();
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.pods()
            .patch(pod_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(cluster_api)?;
        Ok(())
    }

    /// Runs a command in the runner's main container over the exec
    /// subresource, pumping stdout and stderr chunks into the given
    /// channels. The channels are closed here, by dropping their sole
    /// senders; callers must not hold clones.
    #[instrument(skip(self, stdout_tx, stderr_tx))]
    pub async fn exec_command_stream(
        &self,
        runner_id: &str,
        command: &str,
        shell: &str,
        working_dir: &str,
        stdout_tx: mpsc::Sender<Vec<u8>>,
        stderr_tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<i32, RunnerError> {
        let name = pod_name(runner_id);
        let argv = build_exec_command(shell, working_dir, command);
        let ap = AttachParams::default()
            .container(MAIN_CONTAINER)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = self
            .pods()
            .exec(&name, argv, &ap)
            .await
            .map_err(|e| RunnerError::CommandExecution(e.to_string()))?;

        let stdout = attached.stdout().ok_or_else(|| {
            RunnerError::CommandExecution("exec stdout unavailable".into())
        })?;
        let stderr = attached.stderr().ok_or_else(|| {
            RunnerError::CommandExecution("exec stderr unavailable".into())
        })?;
        let status = attached.take_status().ok_or_else(|| {
            RunnerError::CommandExecution("exec status unavailable".into())
        })?;

        let stdout_task = tokio::spawn(pump_stream(stdout, stdout_tx, "stdout"));
        let stderr_task = tokio::spawn(pump_stream(stderr, stderr_tx, "stderr"));

        let status = status.await;
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        if let Err(e) = attached.join().await {
            warn!(error = %e, "exec connection closed uncleanly");
        }

        exit_code_from_status(status)
    }
}

fn cluster_api(e: kube::Error) -> RunnerError {
    RunnerError::ClusterApi(e.to_string())
}

/// The command line handed to the exec subresource. A non-empty working
/// directory becomes a `cd` prefix since exec has no cwd parameter.
fn build_exec_command(
    shell: &str,
    working_dir: &str,
    command: &str,
) -> Vec<String> {
    let shell = if shell.is_empty() { "/bin/sh" } else { shell };
    let line = if working_dir.is_empty() {
        command.to_string()
    } else {
        format!("cd {working_dir} && {command}")
    };
    vec![shell.to_string(), "-c".to_string(), line]
}

/// Copies exec output chunks into the channel. Each chunk is copied out of
/// the read buffer before enqueueing; the buffer is reused between reads.
/// Sends are non-blocking: a full buffer drops the chunk so a stalled
/// consumer cannot wedge the exec reader.
async fn pump_stream<R>(
    mut reader: R,
    tx: mpsc::Sender<Vec<u8>>,
    stream_name: &'static str,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = buf[..n].to_vec();
                match tx.try_send(chunk) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(stream = stream_name, dropped = n, "output buffer full, dropping chunk");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Err(e) => {
                warn!(stream = stream_name, error = %e, "error reading exec output");
                break;
            }
        }
    }
}

/// Resolves the exec status frame into the command's exit code.
fn exit_code_from_status(status: Option<Status>) -> Result<i32, RunnerError> {
    let Some(status) = status else {
        return Err(RunnerError::CommandExecution(
            "exec finished without a status".into(),
        ));
    };
    if status.status.as_deref() == Some("Success") {
        return Ok(0);
    }
    if status.reason.as_deref() == Some("NonZeroExitCode") {
        if let Some(code) = status
            .details
            .as_ref()
            .and_then(|d| d.causes.as_ref())
            .and_then(|causes| {
                causes
                    .iter()
                    .find(|c| c.reason.as_deref() == Some("ExitCode"))
            })
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.parse::<i32>().ok())
        {
            return Ok(code);
        }
    }
    Err(RunnerError::CommandExecution(
        status
            .message
            .unwrap_or_else(|| "exec failed without detail".into()),
    ))
}
