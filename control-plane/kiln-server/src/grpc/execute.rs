use std::sync::Arc;

use async_trait::async_trait;
use kiln_grpc::proto::runner::*;
use tonic::{Request, Response, Status};
use tracing::instrument;

use super::stream::{CommandStream, run_command_stream};
use super::{effective_timeout, validate_execute_command_request};
use crate::model;
use crate::service::RunnerService;

/// The convenience surface: run a command without naming a runner. The
/// service picks the first Running runner or provisions one and waits for it.
pub struct ExecuteSvc {
    service: Arc<RunnerService>,
}

impl ExecuteSvc {
    pub fn new(service: Arc<RunnerService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl execute_service_server::ExecuteService for ExecuteSvc {
    type ExecuteCommandStream = CommandStream;

    #[instrument(level = "debug", skip(self, request))]
    async fn execute_command(
        &self,
        request: Request<ExecuteCommandRequest>,
    ) -> Result<Response<Self::ExecuteCommandStream>, Status> {
        let req = request.into_inner();
        validate_execute_command_request(&req, false)?;

        let timeout = effective_timeout(req.timeout);
        let service = self.service.clone();
        let domain = model::ExecuteCommandRequest::from_proto(req);

        let stream = run_command_stream(move |stdout_tx, stderr_tx| {
            async move {
                service
                    .execute_anywhere(domain, timeout, stdout_tx, stderr_tx)
                    .await
            }
        });

        Ok(Response::new(stream))
    }
}
