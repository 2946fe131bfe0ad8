use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Agent listening host
    #[arg(long, env = "REGISTRY_AGENT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Agent listening port
    #[arg(short, long, env = "REGISTRY_AGENT_PORT", default_value_t = 8980)]
    pub port: u16,

    /// Base URL of the registry's own HTTP API
    #[arg(
        long,
        env = "REGISTRY_AGENT_API_URL",
        default_value = "http://127.0.0.1:5000"
    )]
    pub registry_api_url: String,

    /// Name of the registry's mutable container
    #[arg(long, env = "REGISTRY_AGENT_CONTAINER", default_value = "registry")]
    pub container_name: String,

    /// Name of the read-only standby container used during removal
    #[arg(
        long,
        env = "REGISTRY_AGENT_RO_CONTAINER",
        default_value = "registry-ro"
    )]
    pub ro_container_name: String,

    /// Registry config path as seen inside the containers
    #[arg(
        long,
        env = "REGISTRY_AGENT_REGISTRY_CONFIG",
        default_value = "/etc/docker/registry/config.yml"
    )]
    pub registry_config_path: String,

    /// Host path where the registry's storage volume is mounted
    #[arg(
        long,
        env = "REGISTRY_AGENT_MOUNT_ROOT",
        default_value = "/var/lib/registry"
    )]
    pub registry_mount_root: String,

    /// Directory for the agent's own status store
    #[arg(
        long,
        env = "REGISTRY_AGENT_STORAGE_DIR",
        default_value = "/var/lib/registry-cleaner-agent/status"
    )]
    pub storage_dir: String,

    /// Cron spec (with seconds column) for the index job; empty disables scheduling
    #[arg(long, env = "REGISTRY_AGENT_INDEX_SCHEDULE", default_value = "0 0 3 * * *")]
    pub index_schedule: String,

    /// Cron spec (with seconds column) for the removal job; empty disables scheduling
    #[arg(
        long,
        env = "REGISTRY_AGENT_REMOVAL_SCHEDULE",
        default_value = "0 0 4 * * 0"
    )]
    pub removal_schedule: String,

    /// Seconds to wait for an in-flight collection during shutdown
    #[arg(long, env = "REGISTRY_AGENT_SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}
