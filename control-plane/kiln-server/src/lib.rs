pub mod cluster;
pub mod config;
pub mod grpc;
pub mod model;
pub mod service;

use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

pub fn init_tracing(default_env: &str) {
    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy()
        .add_directive(
            default_env
                .parse()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        );

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
