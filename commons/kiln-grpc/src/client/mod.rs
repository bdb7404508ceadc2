pub mod execute_client;
pub mod runner_client;

pub use execute_client::ExecuteClient;
pub use runner_client::RunnerClient;
