use std::collections::HashMap;

use thiserror::Error;

/// Domain error kinds. The gRPC layer maps each kind to a status code in one
/// place (`grpc::map_service_error`).
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("runner not found: {0}")]
    NotFound(String),

    #[error("runner is not running: {0}")]
    NotRunning(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cluster API error: {0}")]
    ClusterApi(String),

    #[error("command execution failed: {0}")]
    CommandExecution(String),

    #[error("resource conflict: {0}")]
    Conflict(String),
}

/// Lifecycle state of a runner. Always derived from the live pod snapshot,
/// never from cached annotations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    Unspecified,
    Creating,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl RunnerState {
    /// Stopped and Error are terminal; the reaper must not re-delete pods in
    /// these states.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunnerState::Stopped | RunnerState::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunnerState::Unspecified => "unspecified",
            RunnerState::Creating => "creating",
            RunnerState::Running => "running",
            RunnerState::Stopping => "stopping",
            RunnerState::Stopped => "stopped",
            RunnerState::Error => "error",
        }
    }
}

/// Resource envelope of a runner, in the units the pod spec quantises to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceEnvelope {
    pub cpu_millicores: i32,
    pub memory_mb: i32,
    pub storage_gb: i32,
}

/// A runner preset: the Kubernetes quantity strings used for rendering plus
/// the numeric values used in domain objects.
#[derive(Clone, Copy, Debug)]
pub struct RunnerPreset {
    pub cpu: &'static str,
    pub memory: &'static str,
    pub storage: &'static str,
    pub cpu_millicores: i32,
    pub memory_mb: i32,
    pub storage_gb: i32,
}

/// Small preset: 2c2g40g.
pub const PRESET_SMALL: RunnerPreset = RunnerPreset {
    cpu: "2000m",
    memory: "2Gi",
    storage: "40Gi",
    cpu_millicores: 2000,
    memory_mb: 2048,
    storage_gb: 40,
};

/// Medium preset: 4c4g40g (not yet selectable).
pub const PRESET_MEDIUM: RunnerPreset = RunnerPreset {
    cpu: "4000m",
    memory: "4Gi",
    storage: "40Gi",
    cpu_millicores: 4000,
    memory_mb: 4096,
    storage_gb: 40,
};

/// Large preset: 8c8g40g (not yet selectable).
pub const PRESET_LARGE: RunnerPreset = RunnerPreset {
    cpu: "8000m",
    memory: "8Gi",
    storage: "40Gi",
    cpu_millicores: 8000,
    memory_mb: 8192,
    storage_gb: 40,
};

/// The preset applied to every runner today.
pub fn current_preset() -> RunnerPreset {
    PRESET_SMALL
}

impl RunnerPreset {
    pub fn envelope(&self) -> ResourceEnvelope {
        ResourceEnvelope {
            cpu_millicores: self.cpu_millicores,
            memory_mb: self.memory_mb,
            storage_gb: self.storage_gb,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SshDetails {
    pub host: String,
    pub port: i32,
    pub username: String,
    pub public_key: String,
}

/// Object-store workspace mounted into the runner by the sidecar.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkspaceSpec {
    pub bucket: String,
    pub endpoint: String,
    pub prefix: String,
    pub region: String,
    pub read_only: bool,
}

/// The logical sandbox backed by one cluster pod.
#[derive(Clone, Debug)]
pub struct Runner {
    pub id: String,
    pub name: String,
    pub state: RunnerState,
    pub resources: ResourceEnvelope,
    /// Epoch seconds.
    pub created_at: i64,
    pub updated_at: i64,
    pub ssh: Option<SshDetails>,
    pub ip_address: String,
    pub env: HashMap<String, String>,
    pub workspace: Option<WorkspaceSpec>,
}

/// Domain request to create a runner.
#[derive(Clone, Debug, Default)]
pub struct CreateRunnerRequest {
    pub name: String,
    pub env: HashMap<String, String>,
    pub workspace: Option<WorkspaceSpec>,
}

/// Domain request to run a command inside a runner.
#[derive(Clone, Debug, Default)]
pub struct ExecuteCommandRequest {
    pub runner_id: String,
    pub command: String,
    pub shell: String,
    pub timeout_secs: i32,
    pub working_dir: String,
    pub env: HashMap<String, String>,
    pub workspace: Option<WorkspaceSpec>,
}

/// Options for listing runners.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListOptions {
    pub state: Option<RunnerState>,
    pub limit: i32,
    pub offset: i32,
}

// Conversions between domain and proto types. Both enums are closed sets that
// can evolve independently, so the bridging is an explicit match in each
// direction rather than an ordinal cast.

pub fn state_to_proto(state: RunnerState) -> kiln_grpc::RunnerStatus {
    use kiln_grpc::RunnerStatus as S;
    match state {
        RunnerState::Unspecified => S::Unspecified,
        RunnerState::Creating => S::Creating,
        RunnerState::Running => S::Running,
        RunnerState::Stopping => S::Stopping,
        RunnerState::Stopped => S::Stopped,
        RunnerState::Error => S::Error,
    }
}

pub fn state_from_proto(status: kiln_grpc::RunnerStatus) -> RunnerState {
    use kiln_grpc::RunnerStatus as S;
    match status {
        S::Unspecified => RunnerState::Unspecified,
        S::Creating => RunnerState::Creating,
        S::Running => RunnerState::Running,
        S::Stopping => RunnerState::Stopping,
        S::Stopped => RunnerState::Stopped,
        S::Error => RunnerState::Error,
    }
}

impl Runner {
    pub fn into_proto(self) -> kiln_grpc::Runner {
        kiln_grpc::Runner {
            id: self.id,
            name: self.name,
            status: state_to_proto(self.state) as i32,
            resources: Some(kiln_grpc::ResourceRequirements {
                cpu_millicores: self.resources.cpu_millicores,
                memory_mb: self.resources.memory_mb,
                storage_gb: self.resources.storage_gb,
            }),
            created_at: self.created_at,
            updated_at: self.updated_at,
            ssh: self.ssh.map(|ssh| kiln_grpc::SshDetails {
                host: ssh.host,
                port: ssh.port,
                username: ssh.username,
                public_key: ssh.public_key,
            }),
            ip_address: self.ip_address,
            env: self.env,
            workspace: self.workspace.map(workspace_to_proto),
        }
    }
}

pub fn workspace_to_proto(ws: WorkspaceSpec) -> kiln_grpc::WorkspaceConfig {
    kiln_grpc::WorkspaceConfig {
        bucket: ws.bucket,
        endpoint: ws.endpoint,
        prefix: ws.prefix,
        region: ws.region,
        read_only: ws.read_only,
    }
}

pub fn workspace_from_proto(ws: kiln_grpc::WorkspaceConfig) -> WorkspaceSpec {
    WorkspaceSpec {
        bucket: ws.bucket,
        endpoint: ws.endpoint,
        prefix: ws.prefix,
        region: ws.region,
        read_only: ws.read_only,
    }
}

impl CreateRunnerRequest {
    pub fn from_proto(req: kiln_grpc::CreateRunnerRequest) -> Self {
        Self {
            name: req.name,
            env: req.env,
            workspace: req.workspace.map(workspace_from_proto),
        }
    }
}

impl ExecuteCommandRequest {
    pub fn from_proto(req: kiln_grpc::ExecuteCommandRequest) -> Self {
        Self {
            runner_id: req.runner_id,
            command: req.command,
            shell: req.shell,
            timeout_secs: req.timeout,
            working_dir: req.working_dir,
            env: req.env,
            workspace: req.workspace.map(workspace_from_proto),
        }
    }
}
