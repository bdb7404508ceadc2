use tonic::transport::Channel;

use crate::proto::runner::*;

#[derive(Clone)]
pub struct RunnerClient {
    client: runner_service_client::RunnerServiceClient<Channel>,
}

impl RunnerClient {
    pub async fn connect(
        endpoint: String,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client =
            runner_service_client::RunnerServiceClient::connect(endpoint)
                .await?;
        Ok(Self { client })
    }

    pub async fn create_runner(
        &mut self,
        req: CreateRunnerRequest,
    ) -> Result<CreateRunnerResponse, tonic::Status> {
        let response = self.client.create_runner(tonic::Request::new(req)).await?;
        Ok(response.into_inner())
    }

    pub async fn delete_runner(
        &mut self,
        runner_id: String,
    ) -> Result<DeleteRunnerResponse, tonic::Status> {
        let request = tonic::Request::new(DeleteRunnerRequest {
            runner_id,
            all: false,
        });
        let response = self.client.delete_runner(request).await?;
        Ok(response.into_inner())
    }

    pub async fn delete_all_runners(
        &mut self,
    ) -> Result<DeleteRunnerResponse, tonic::Status> {
        let request = tonic::Request::new(DeleteRunnerRequest {
            runner_id: String::new(),
            all: true,
        });
        let response = self.client.delete_runner(request).await?;
        Ok(response.into_inner())
    }

    pub async fn list_runners(
        &mut self,
        req: ListRunnersRequest,
    ) -> Result<ListRunnersResponse, tonic::Status> {
        let response = self.client.list_runners(tonic::Request::new(req)).await?;
        Ok(response.into_inner())
    }

    pub async fn get_runner(
        &mut self,
        runner_id: String,
    ) -> Result<GetRunnerResponse, tonic::Status> {
        let request = tonic::Request::new(GetRunnerRequest { runner_id });
        let response = self.client.get_runner(request).await?;
        Ok(response.into_inner())
    }

    /// Stream stdout/stderr frames followed by a terminal exit frame.
    pub async fn execute_command_stream(
        &mut self,
        req: ExecuteCommandRequest,
    ) -> Result<tonic::Streaming<ExecuteCommandStreamResponse>, tonic::Status>
    {
        let response = self
            .client
            .execute_command_stream(tonic::Request::new(req))
            .await?;
        Ok(response.into_inner())
    }
}
