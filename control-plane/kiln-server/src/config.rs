use envconfig::Envconfig;

/// Default runner image. Skaffold-style builds tag images dynamically, so
/// deployments override this through RUNNER_IMAGE.
pub const DEFAULT_RUNNER_IMAGE: &str = "ghcr.io/kiln-sh/kiln-runner:latest";

/// Default object-store mount sidecar image, overridable through S3FS_IMAGE.
pub const DEFAULT_S3FS_IMAGE: &str = "ghcr.io/kiln-sh/kiln-runner-s3fs:latest";

#[derive(Envconfig, Clone, Debug)]
pub struct ServerConfig {
    /// Namespace the runner pods live in.
    #[envconfig(from = "NAMESPACE", default = "default")]
    pub namespace: String,

    #[envconfig(from = "RUNNER_IMAGE", default = "ghcr.io/kiln-sh/kiln-runner:latest")]
    pub runner_image: String,

    #[envconfig(from = "S3FS_IMAGE", default = "ghcr.io/kiln-sh/kiln-runner-s3fs:latest")]
    pub s3fs_image: String,

    /// Port the runner container exposes for sshd.
    #[envconfig(from = "SSH_PORT", default = "22")]
    pub ssh_port: i32,

    #[envconfig(from = "GRPC_PORT", default = "9090")]
    pub grpc_port: u16,

    /// Reaper scan period in seconds.
    #[envconfig(from = "REAPER_INTERVAL_SECS", default = "60")]
    pub reaper_interval_secs: u64,

    /// Runners idle longer than this many seconds are reaped.
    #[envconfig(from = "REAPER_INACTIVE_SECS", default = "300")]
    pub reaper_inactive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            runner_image: DEFAULT_RUNNER_IMAGE.into(),
            s3fs_image: DEFAULT_S3FS_IMAGE.into(),
            ssh_port: 22,
            grpc_port: 9090,
            reaper_interval_secs: 60,
            reaper_inactive_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_small_preset_namespace_and_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.namespace, "default");
        assert_eq!(cfg.ssh_port, 22);
        assert_eq!(cfg.runner_image, DEFAULT_RUNNER_IMAGE);
        assert_eq!(cfg.s3fs_image, DEFAULT_S3FS_IMAGE);
    }
}
