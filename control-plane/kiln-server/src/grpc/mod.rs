pub mod execute;
pub mod runner;
mod stream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tonic::Status;
use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tracing::{error, info};

use crate::model::RunnerError;
use crate::service::RunnerService;
use execute::ExecuteSvc;
use kiln_grpc::proto::runner::execute_service_server::ExecuteServiceServer;
use kiln_grpc::proto::runner::runner_service_server::RunnerServiceServer;
use runner::RunnerSvc;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run_grpc_server(
    addr: SocketAddr,
    service: Arc<RunnerService>,
) -> anyhow::Result<()> {
    info!("kiln gRPC listening on {}", addr);

    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(kiln_grpc::FILE_DESCRIPTOR_SET)
        .build_v1()
        .ok();

    let runner_svc = RunnerSvc::new(service.clone());
    let execute_svc = ExecuteSvc::new(service);

    let mut builder = Server::builder()
        .add_service(RunnerServiceServer::new(runner_svc))
        .add_service(ExecuteServiceServer::new(execute_svc));

    if let Some(reflection) = reflection {
        builder = builder.add_service(reflection);
    }

    builder.serve(addr).await?;
    Ok(())
}

/// The one place domain error kinds become transport status codes.
pub(crate) fn map_service_error(err: RunnerError) -> Status {
    match &err {
        RunnerError::NotFound(_) => Status::not_found(err.to_string()),
        RunnerError::NotRunning(_) => {
            Status::failed_precondition(err.to_string())
        }
        RunnerError::InvalidRequest(_) => {
            Status::invalid_argument(err.to_string())
        }
        RunnerError::Conflict(_) => Status::already_exists(err.to_string()),
        RunnerError::ClusterApi(_) => {
            error!(error = %err, "cluster API error");
            Status::internal(err.to_string())
        }
        RunnerError::CommandExecution(_) => {
            error!(error = %err, "command execution error");
            Status::internal(err.to_string())
        }
    }
}

pub(crate) fn validate_create_runner_request(
    req: &kiln_grpc::CreateRunnerRequest,
) -> Result<(), Status> {
    // Name is optional; resources are always the preset.
    if req.name.len() > 100 {
        return Err(Status::invalid_argument(
            "name must be at most 100 characters",
        ));
    }
    Ok(())
}

pub(crate) fn validate_execute_command_request(
    req: &kiln_grpc::ExecuteCommandRequest,
    require_runner_id: bool,
) -> Result<(), Status> {
    if require_runner_id && req.runner_id.is_empty() {
        return Err(Status::invalid_argument("runner_id is required"));
    }
    if req.command.is_empty() {
        return Err(Status::invalid_argument("command is required"));
    }
    if req.timeout < 0 {
        return Err(Status::invalid_argument("timeout must be non-negative"));
    }
    Ok(())
}

pub(crate) fn effective_timeout(timeout_secs: i32) -> Duration {
    if timeout_secs == 0 {
        DEFAULT_COMMAND_TIMEOUT
    } else {
        Duration::from_secs(timeout_secs as u64)
    }
}
