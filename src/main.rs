use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;

use registry_cleaner_agent::api;
use registry_cleaner_agent::config::Config;
use registry_cleaner_agent::gc::{GarbageCollector, GcCoordinator};
use registry_cleaner_agent::ledger::StatusLedger;
use registry_cleaner_agent::ledger::store::SledStore;
use registry_cleaner_agent::registry::RegistryClient;
use registry_cleaner_agent::storage::BlobSizeReader;
use registry_cleaner_agent::utils::cli::Args;
use registry_cleaner_agent::utils::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = validate_config(&args).await;

    let store = Arc::new(SledStore::open(&config.storage_dir)?);
    let ledger = Arc::new(StatusLedger::initialize(store)?);

    let collector = GarbageCollector::new(
        &config.container_name,
        &config.ro_container_name,
        &config.registry_config_path,
    );
    // A crash mid-swap can leave the standby container serving traffic.
    if let Err(err) = collector.reconcile_containers().await {
        tracing::warn!(error = %err, "container reconciliation at startup failed");
    }

    let blob_sizes = Arc::new(BlobSizeReader::new(&config.registry_mount_root));
    let coordinator = GcCoordinator::new(collector, ledger.clone(), blob_sizes);
    if config.schedule_enabled() {
        coordinator.enable_schedule(&config.index_schedule, &config.removal_schedule)?;
        tracing::info!(
            index = %config.index_schedule,
            removal = %config.removal_schedule,
            "garbage collection scheduled"
        );
    }

    let registry = Arc::new(RegistryClient::new(&config.registry_api_url));
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    let state = Arc::new(AppState {
        coordinator: coordinator.clone(),
        ledger,
        registry,
        config: Arc::new(config),
    });
    let app = api::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.shutdown(shutdown_timeout).await;
    tracing::info!("agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down...");
}

async fn validate_config(args: &Args) -> Config {
    let mut validation_errors = Vec::new();

    let mount_root = Path::new(&args.registry_mount_root);
    match tokio::fs::metadata(mount_root).await {
        Ok(meta) => {
            if !meta.is_dir() {
                validation_errors.push(format!(
                    "REGISTRY_AGENT_MOUNT_ROOT `{}` exists but is not a directory",
                    args.registry_mount_root,
                ));
            }
        }
        Err(_) => validation_errors.push(format!(
            "REGISTRY_AGENT_MOUNT_ROOT `{}` does not exist",
            args.registry_mount_root,
        )),
    }

    let storage_dir = Path::new(&args.storage_dir);
    if let Some(parent) = storage_dir.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            validation_errors.push(format!(
                "the directory for the status store `{}` does not exist",
                parent.display(),
            ));
        }
    }

    let schedule_enabled = !args.index_schedule.is_empty() && !args.removal_schedule.is_empty();
    if schedule_enabled {
        for (name, spec) in [
            ("REGISTRY_AGENT_INDEX_SCHEDULE", &args.index_schedule),
            ("REGISTRY_AGENT_REMOVAL_SCHEDULE", &args.removal_schedule),
        ] {
            if let Err(err) = cron::Schedule::from_str(spec) {
                validation_errors.push(format!("{name} `{spec}` is not a valid cron spec: {err}"));
            }
        }
    }

    if !validation_errors.is_empty() {
        eprintln!("{}", validation_errors.join("\n"));
        std::process::exit(1);
    }

    Config {
        host: args.host.clone(),
        port: args.port,
        registry_api_url: args.registry_api_url.clone(),
        container_name: args.container_name.clone(),
        ro_container_name: args.ro_container_name.clone(),
        registry_config_path: args.registry_config_path.clone(),
        registry_mount_root: args.registry_mount_root.clone(),
        storage_dir: args.storage_dir.clone(),
        index_schedule: args.index_schedule.clone(),
        removal_schedule: args.removal_schedule.clone(),
        shutdown_timeout_secs: args.shutdown_timeout_secs,
    }
}
