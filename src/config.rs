#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub registry_api_url: String,
    pub container_name: String,
    pub ro_container_name: String,
    pub registry_config_path: String,
    pub registry_mount_root: String,
    pub storage_dir: String,
    pub index_schedule: String,
    pub removal_schedule: String,
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Scheduling is opt-in: both cron specs must be supplied.
    pub fn schedule_enabled(&self) -> bool {
        !self.index_schedule.is_empty() && !self.removal_schedule.is_empty()
    }
}
