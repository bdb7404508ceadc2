use std::sync::Arc;

use async_trait::async_trait;
use kiln_grpc::proto::runner::*;
use tonic::{Request, Response, Status};
use tracing::instrument;

use super::stream::{CommandStream, run_command_stream};
use super::{
    effective_timeout, map_service_error, validate_create_runner_request,
    validate_execute_command_request,
};
use crate::model;
use crate::model::{ListOptions, RunnerError, RunnerState, state_from_proto};
use crate::service::RunnerService;

pub struct RunnerSvc {
    service: Arc<RunnerService>,
}

impl RunnerSvc {
    pub fn new(service: Arc<RunnerService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl runner_service_server::RunnerService for RunnerSvc {
    #[instrument(level = "debug", skip(self, request))]
    async fn create_runner(
        &self,
        request: Request<CreateRunnerRequest>,
    ) -> Result<Response<CreateRunnerResponse>, Status> {
        let req = request.into_inner();
        validate_create_runner_request(&req)?;

        let runner = self
            .service
            .create_runner(model::CreateRunnerRequest::from_proto(req))
            .await
            .map_err(map_service_error)?;

        Ok(Response::new(CreateRunnerResponse {
            runner: Some(runner.into_proto()),
        }))
    }

    #[instrument(level = "debug", skip(self, request))]
    async fn delete_runner(
        &self,
        request: Request<DeleteRunnerRequest>,
    ) -> Result<Response<DeleteRunnerResponse>, Status> {
        let req = request.into_inner();

        if req.all {
            let deleted = self
                .service
                .delete_all_runners()
                .await
                .map_err(map_service_error)?;
            return Ok(Response::new(DeleteRunnerResponse {
                message: format!("{deleted} runners deletion initiated"),
            }));
        }

        if req.runner_id.is_empty() {
            return Err(Status::invalid_argument("runner_id is required"));
        }
        self.service
            .delete_runner(&req.runner_id)
            .await
            .map_err(map_service_error)?;

        Ok(Response::new(DeleteRunnerResponse {
            message: format!("runner {} deletion initiated", req.runner_id),
        }))
    }

    #[instrument(level = "debug", skip(self, request))]
    async fn list_runners(
        &self,
        request: Request<ListRunnersRequest>,
    ) -> Result<Response<ListRunnersResponse>, Status> {
        let req = request.into_inner();
        if req.limit < 0 || req.offset < 0 {
            return Err(Status::invalid_argument(
                "limit and offset must be non-negative",
            ));
        }

        let status = RunnerStatus::try_from(req.status)
            .unwrap_or(RunnerStatus::Unspecified);
        let state = match state_from_proto(status) {
            RunnerState::Unspecified => None,
            state => Some(state),
        };

        let (runners, total) = self
            .service
            .list_runners(ListOptions {
                state,
                limit: req.limit,
                offset: req.offset,
            })
            .await
            .map_err(map_service_error)?;

        Ok(Response::new(ListRunnersResponse {
            runners: runners.into_iter().map(|r| r.into_proto()).collect(),
            total,
        }))
    }

    #[instrument(level = "debug", skip(self, request))]
    async fn get_runner(
        &self,
        request: Request<GetRunnerRequest>,
    ) -> Result<Response<GetRunnerResponse>, Status> {
        let req = request.into_inner();
        if req.runner_id.is_empty() {
            return Err(Status::invalid_argument("runner_id is required"));
        }

        let runner = self
            .service
            .get_runner(&req.runner_id)
            .await
            .map_err(map_service_error)?;

        Ok(Response::new(GetRunnerResponse {
            runner: Some(runner.into_proto()),
        }))
    }

    type ExecuteCommandStreamStream = CommandStream;

    #[instrument(level = "debug", skip(self, request))]
    async fn execute_command_stream(
        &self,
        request: Request<ExecuteCommandRequest>,
    ) -> Result<Response<Self::ExecuteCommandStreamStream>, Status> {
        let req = request.into_inner();
        validate_execute_command_request(&req, true)?;

        let timeout = effective_timeout(req.timeout);
        let service = self.service.clone();
        let domain = model::ExecuteCommandRequest::from_proto(req);

        let stream = run_command_stream(move |stdout_tx, stderr_tx| {
            async move {
                match tokio::time::timeout(
                    timeout,
                    service.execute_command_stream(domain, stdout_tx, stderr_tx),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RunnerError::CommandExecution(format!(
                        "command timed out after {}s",
                        timeout.as_secs()
                    ))),
                }
            }
        });

        Ok(Response::new(stream))
    }
}
