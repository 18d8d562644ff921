use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleet_monitor::{
    actors::{MonitorContext, PollScheduler, SchedulerHandle, SchedulerSettings},
    cache::SnapshotStore,
    collectors::{DockerCollector, FleetCollector, SystemCommandRunner},
    config::{Config, Notifier, read_config_file},
    notify::{self, EmailDispatcher},
    registry::{CompositeRegistry, ContainerDiscovery, FileRegistry, StaticRegistry},
    storage::{self, StorageBackend, memory::MemoryBackend},
    util::get_config_path,
};
use tokio::signal;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $MONITOR_CONFIG or ./monitor.json)
    #[arg(short, long)]
    file: Option<String>,

    /// Maximum log level
    #[arg(long, default_value = "trace")]
    log_level: LevelFilter,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Send a test email through the SMTP notifier and exit
    #[arg(long)]
    test_email: bool,
}

fn init(level: LevelFilter) {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_monitor", level),
        ("fleet_hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let path = args.file.clone().unwrap_or_else(get_config_path);
    let config = match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{e:#}, continuing with defaults");
            Config::default()
        }
    };

    if args.test_email {
        return send_test_email(&config.notifiers()).await;
    }

    let context = build_context(&config).await;

    if args.once {
        let report = PollScheduler::load(context).await.run_cycle().await;
        info!(
            "{} target(s), {} issue(s), {} alert(s)",
            report.targets, report.issues, report.alerts
        );
        return Ok(());
    }

    let interval = config.poll_interval();
    info!("polling every {interval:?}");
    let scheduler = PollScheduler::start(context, interval).await;

    #[cfg(feature = "api")]
    if let Some(api) = config.api.clone() {
        let state = fleet_monitor::api::ApiState::new(scheduler.clone());
        if let Err(e) = fleet_monitor::api::spawn_api_server(api, state).await {
            error!("failed to start API server: {e:#}");
        }
    }

    wait_for_shutdown().await;
    stop(&scheduler).await;

    Ok(())
}

async fn build_context(config: &Config) -> MonitorContext {
    let runner = Arc::new(SystemCommandRunner);

    let mut registry =
        CompositeRegistry::new().with(Arc::new(StaticRegistry::new(config.targets.clone())));
    if let Some(targets_file) = &config.targets_file {
        debug!("reading targets from {}", targets_file.display());
        registry = registry.with(Arc::new(FileRegistry::new(targets_file)));
    }
    if config.containers.enabled {
        debug!("container discovery enabled");
        let docker = DockerCollector::new(runner.clone(), config.containers.clone());
        registry = registry.with(Arc::new(ContainerDiscovery::new(docker)));
    }

    let storage: Arc<dyn StorageBackend> = match storage::from_config(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("failed to open storage, state will not survive a restart: {e}");
            Arc::new(MemoryBackend::new())
        }
    };
    debug!("using {} storage", storage.name());

    MonitorContext {
        registry: Arc::new(registry),
        collector: Arc::new(FleetCollector::from_config(runner, config)),
        dispatcher: notify::from_config(&config.notifiers()),
        storage,
        store: Arc::new(SnapshotStore::default()),
        settings: SchedulerSettings::from_config(config),
    }
}

async fn send_test_email(notifiers: &[Notifier]) -> anyhow::Result<()> {
    let email = notifiers
        .iter()
        .find_map(|notifier| match notifier {
            Notifier::Email(email) => Some(email),
            _ => None,
        })
        .context("no email notifier configured (set SMTP_HOST, SMTP_USER, SMTP_PASS and ALERT_EMAIL_TO)")?;

    EmailDispatcher::new(email)?.send_test().await?;
    info!("test email sent to {}", email.to);
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

async fn stop(scheduler: &SchedulerHandle) {
    info!("stopping scheduler");
    if let Err(e) = scheduler.stop().await {
        error!("failed to stop scheduler: {e:#}");
    }
}
