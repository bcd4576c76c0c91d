//! # Queue Agent
//!
//! Headless host for the offline sale queue.
//!
//! ## Task Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          queue-agent                                    │
//! │                                                                         │
//! │  ┌──────────────┐   set_online    ┌──────────────────────────────────┐  │
//! │  │ probe loop   │ ──────────────► │                                  │  │
//! │  │ GET /health  │                 │  QueueCoordinator (till-sync)    │  │
//! │  └──────────────┘                 │                                  │  │
//! │  ┌──────────────┐ prune_confirmed │  SQLite store     HTTP submitter │  │
//! │  │ prune loop   │ ──────────────► │                                  │  │
//! │  │ hourly       │                 └───────────────┬──────────────────┘  │
//! │  └──────────────┘                                 │                     │
//! │                                                   ▼                     │
//! │                                   TracingEmitter (logs state changes)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;

use directories::ProjectDirs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use till_core::PendingSale;
use till_db::{Database, DbConfig};
use till_sync::{
    CoordinatorOptions, HttpSaleSubmitter, QueueConfig, QueueCoordinator, QueueCounts,
    QueueEventEmitter, QueueHandle, QueueSnapshot,
};

pub use error::{AgentError, AgentResult};

/// How often confirmed sales past retention are pruned.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Runs the agent until `shutdown` resolves.
pub async fn run(shutdown: impl Future<Output = ()>) -> AgentResult<()> {
    info!("Starting queue agent");

    let config = load_config()?;
    info!(
        device_id = %config.device_id(),
        backend = %config.backend.base_url,
        "Configuration loaded"
    );

    let db_path = get_database_path()?;
    info!(?db_path, "Database path determined");
    let db = Database::new(DbConfig::new(db_path)).await?;
    info!("Database connected and migrations applied");

    let submitter = Arc::new(HttpSaleSubmitter::from_config(&config)?);
    let queue = QueueCoordinator::builder()
        .store(Arc::new(db.queue()))
        .submitter(submitter.clone())
        .emitter(Arc::new(TracingEmitter::default()))
        .options(CoordinatorOptions::from(&config))
        .spawn()
        .await?;

    let probe = {
        let queue = queue.clone();
        let submitter = submitter.clone();
        tokio::spawn(probe_loop(
            queue,
            config.probe_interval(),
            config.queue.start_online,
            move || {
                let submitter = submitter.clone();
                async move { submitter.probe().await }
            },
        ))
    };
    let prune = tokio::spawn(prune_loop(
        queue.clone(),
        PRUNE_INTERVAL,
        config.confirmed_retention(),
    ));

    shutdown.await;
    info!("Shutdown requested");

    probe.abort();
    prune.abort();
    queue.shutdown().await?;
    db.close().await;

    info!("Queue agent stopped");
    Ok(())
}

/// Loads the config and writes it back on first run so the generated
/// device id survives restarts.
fn load_config() -> AgentResult<QueueConfig> {
    load_config_from(QueueConfig::default_config_path(), |key| {
        std::env::var(key).ok()
    })
}

/// Only file and default values are persisted; environment overrides
/// apply to the running agent alone.
fn load_config_from(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> AgentResult<QueueConfig> {
    let file = QueueConfig::load_file(path.clone())?;

    if let Some(path) = path {
        if !path.exists() {
            if let Err(e) = file.save(Some(path)) {
                warn!(error = %e, "Could not persist initial config");
            }
        }
    }

    Ok(file.with_overrides(env)?)
}

/// Polls backend reachability and reports every change to the queue.
pub async fn probe_loop<F, Fut>(
    queue: QueueHandle,
    interval: Duration,
    mut online: bool,
    mut probe: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let reachable = probe().await;
        if reachable == online {
            continue;
        }

        if reachable {
            info!("Backend reachable");
        } else {
            warn!("Backend unreachable, holding sales locally");
        }
        if queue.set_online(reachable).await.is_err() {
            break;
        }
        online = reachable;
    }
}

/// Prunes confirmed sales older than `retention` every `interval`.
pub async fn prune_loop(queue: QueueHandle, interval: Duration, retention: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match queue.prune_confirmed(retention).await {
            Ok(_) => {}
            Err(till_sync::QueueError::ShuttingDown) => break,
            Err(e) => warn!(error = %e, "Failed to prune confirmed sales"),
        }
    }
}

// =============================================================================
// Tracing Emitter
// =============================================================================

/// Logs queue changes instead of pushing them to a UI.
#[derive(Default)]
pub struct TracingEmitter {
    last: Mutex<Option<QueueCounts>>,
}

impl QueueEventEmitter for TracingEmitter {
    fn emit_snapshot(&self, snapshot: &QueueSnapshot) {
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if last.as_ref() == Some(&snapshot.counts) {
            return;
        }

        let c = &snapshot.counts;
        info!(
            queued = c.queued,
            retrying = c.retrying,
            failed = c.failed,
            in_flight = c.in_flight,
            recently_confirmed = c.recently_confirmed,
            online = snapshot.online,
            "Queue changed"
        );
        *last = Some(snapshot.counts.clone());
    }

    fn emit_failure(&self, sale: &PendingSale) {
        warn!(
            sale_id = %sale.id,
            attempts = sale.attempts,
            error = sale.last_error.as_deref().unwrap_or("unknown"),
            "Sale needs attention"
        );
    }
}

// =============================================================================
// Setup Helpers
// =============================================================================

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=till_sync=trace` - Show trace for the queue engine only
/// - Default: `info,till=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,till=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Determines the database file path based on the platform.
///
/// ## Platform-Specific Paths
/// - **macOS**: `~/Library/Application Support/com.till.pos/queue.db`
/// - **Windows**: `%APPDATA%\till\pos\data\queue.db`
/// - **Linux**: `~/.local/share/pos/queue.db`
///
/// Set `TILL_DB_PATH` to use a custom path.
pub fn get_database_path() -> AgentResult<PathBuf> {
    if let Ok(path) = std::env::var("TILL_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let proj_dirs = ProjectDirs::from("com", "till", "pos").ok_or(AgentError::NoDataDir)?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;

    Ok(data_dir.join("queue.db"))
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
