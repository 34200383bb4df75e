use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{EnvFilter, filter, layer::SubscriberExt, util::SubscriberInitExt};
use uptime_watch::{
    actors::{cycle::CycleContext, scheduler::SchedulerHandle},
    alerts::Dispatcher,
    config::{Config, StorageConfig, read_config_file},
    probes::ProbeSet,
    storage::{MaintenanceGate, MemoryStore, MonitorStore},
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_ansi(false);

    // RUST_LOG replaces the built-in targets when set
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        tracing_subscriber::registry()
            .with(fmt)
            .with(env_filter)
            .init();
        return;
    }

    let filter = filter::Targets::new().with_targets(vec![
        ("uptime_watch", LevelFilter::DEBUG),
        ("sqlx", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry().with(fmt).with(filter).init();
}

/// The store doubles as the maintenance gate
struct Backend {
    store: Arc<dyn MonitorStore>,
    gate: Arc<dyn MaintenanceGate>,
}

impl Backend {
    fn new<T: MonitorStore + MaintenanceGate + 'static>(inner: T) -> Self {
        let inner = Arc::new(inner);
        Self {
            store: inner.clone(),
            gate: inner,
        }
    }
}

async fn open_backend(storage: Option<&StorageConfig>) -> anyhow::Result<Backend> {
    match storage.cloned().unwrap_or_default() {
        StorageConfig::None => {
            warn!("using in-memory storage, nothing survives a restart");
            Ok(Backend::new(MemoryStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = uptime_watch::storage::sqlite::SqliteStore::new(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Backend::new(store))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requested but the storage-sqlite feature is disabled")
        }
    }
}

/// Upsert the configured monitors and channel targets
async fn seed(store: &dyn MonitorStore, config: &Config) -> anyhow::Result<()> {
    for monitor in &config.monitors {
        store
            .upsert_monitor(monitor)
            .await
            .with_context(|| format!("failed to store monitor {}", monitor.name))?;
    }
    for window in &config.maintenance {
        store.save_maintenance_window(window).await?;
    }
    for subscription in &config.push_subscriptions {
        store.save_push_subscription(subscription).await?;
    }
    for token in &config.relay_tokens {
        store.save_relay_token(token).await?;
    }

    info!(
        "seeded {} monitors, {} maintenance windows, {} push subscriptions, {} relay tokens",
        config.monitors.len(),
        config.maintenance.len(),
        config.push_subscriptions.len(),
        config.relay_tokens.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let Backend { store, gate } = open_backend(config.storage.as_ref()).await?;
    seed(&*store, &config).await?;

    let dispatcher = Dispatcher::from_config(store.clone(), &config.channels, &config.alerts)?;
    info!("notification channels: {:?}", dispatcher.channel_names());

    let context = CycleContext::new(
        store.clone(),
        gate,
        ProbeSet::new()?,
        dispatcher,
        config.defaults,
    );
    let scheduler = SchedulerHandle::spawn(context, config.scheduler);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }

    info!("shutting down");
    scheduler.shutdown().await;
    store.close().await?;

    Ok(())
}
