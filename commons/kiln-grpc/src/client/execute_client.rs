use tonic::transport::Channel;

use crate::proto::runner::*;

#[derive(Clone)]
pub struct ExecuteClient {
    client: execute_service_client::ExecuteServiceClient<Channel>,
}

impl ExecuteClient {
    pub async fn connect(
        endpoint: String,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client =
            execute_service_client::ExecuteServiceClient::connect(endpoint)
                .await?;
        Ok(Self { client })
    }

    /// Run a command on whichever runner is available, provisioning one when
    /// none is running.
    pub async fn execute_command(
        &mut self,
        req: ExecuteCommandRequest,
    ) -> Result<tonic::Streaming<ExecuteCommandStreamResponse>, tonic::Status>
    {
        let response =
            self.client.execute_command(tonic::Request::new(req)).await?;
        Ok(response.into_inner())
    }
}
