//! # Queue Coordinator
//!
//! Single actor task that owns every queue mutation.
//!
//! ## Actor Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  QueueHandle (Clone) ──Command──► ┌──────────────────────────┐          │
//! │   enqueue / retry / purge         │     QueueCoordinator     │          │
//! │   set_online / prune              │                          │          │
//! │                                   │  select! {               │          │
//! │  attempt tasks ──AttemptOutcome─► │    commands,             │──► store │
//! │   (one per in-flight id)          │    outcomes,             │          │
//! │                                   │    scheduler.next_due()  │          │
//! │  RetryScheduler ──due id────────► │  }                       │          │
//! │                                   └────────────┬─────────────┘          │
//! │                                                │                        │
//! │                                                ▼                        │
//! │                     watch::Sender<QueueSnapshot> + QueueEventEmitter    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sale Lifecycle
//! ```text
//!   enqueue ──► QUEUED ──attempt──┬── ok ─────────────────► SUBMITTED
//!                 ▲               ├── transient, < max ───► RETRYING ──timer──┐
//!                 │               └── permanent / max ────► FAILED            │
//!                 ├───────────────────────────── retry(id) ───┘               │
//!                 └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The coordinator is the store's only writer. An attempt's result is
//! applied only if the store still holds the sale in QUEUED when the result
//! arrives, so results for purged sales are dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use till_core::validation::{validate_sale_id, validate_sale_payload};
use till_core::{
    new_sale_id, Confirmation, PendingSale, RetryPolicy, SalePatch, SalePayload, SaleStatus,
};
use till_db::LocalQueueStore;

use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::events::{NoOpEmitter, QueueEventEmitter, QueueSnapshot};
use crate::scheduler::{RetryPlan, RetryScheduler};
use crate::submitter::{SaleSubmitter, SubmitError};

// =============================================================================
// Options
// =============================================================================

/// Runtime settings for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub policy: RetryPolicy,

    /// Upper bound on a single `submit` call.
    pub submit_timeout: Duration,

    /// Dispatch attempts right after start.
    pub start_online: bool,

    /// Confirmed sales carried in each snapshot.
    pub confirmed_view_limit: u32,

    /// Capacity of the command channel.
    pub command_buffer: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        CoordinatorOptions {
            policy: RetryPolicy::default(),
            submit_timeout: Duration::from_secs(10),
            start_online: true,
            confirmed_view_limit: 50,
            command_buffer: 64,
        }
    }
}

impl From<&QueueConfig> for CoordinatorOptions {
    fn from(config: &QueueConfig) -> Self {
        CoordinatorOptions {
            policy: config.retry_policy(),
            submit_timeout: config.submit_timeout(),
            start_online: config.queue.start_online,
            confirmed_view_limit: config.queue.confirmed_view_limit,
            command_buffer: config.queue.command_buffer,
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

enum Command {
    Enqueue {
        id: Option<String>,
        payload: SalePayload,
        reply: oneshot::Sender<QueueResult<PendingSale>>,
    },
    Retry {
        id: String,
        reply: oneshot::Sender<QueueResult<()>>,
    },
    PurgeOne {
        id: String,
        reply: oneshot::Sender<QueueResult<bool>>,
    },
    PurgeAll {
        reply: oneshot::Sender<QueueResult<u64>>,
    },
    SetOnline {
        online: bool,
        reply: oneshot::Sender<()>,
    },
    PruneConfirmed {
        older_than: chrono::Duration,
        reply: oneshot::Sender<QueueResult<u64>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Result of one submission attempt, reported back to the actor.
struct AttemptOutcome {
    id: String,
    result: Result<Confirmation, SubmitError>,
}

// =============================================================================
// Queue Handle
// =============================================================================

/// Cloneable front door to a running coordinator.
///
/// Every method returns once the coordinator has applied and persisted
/// the command and published the resulting snapshot.
#[derive(Clone)]
pub struct QueueHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<QueueSnapshot>,
}

impl QueueHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> QueueResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| QueueError::ShuttingDown)?;
        rx.await.map_err(|_| QueueError::ShuttingDown)
    }

    /// Validates and queues a new sale under a generated id.
    pub async fn enqueue(&self, payload: SalePayload) -> QueueResult<PendingSale> {
        self.request(|reply| Command::Enqueue {
            id: None,
            payload,
            reply,
        })
        .await?
    }

    /// Validates and queues a new sale under a caller-chosen id.
    pub async fn enqueue_with_id(
        &self,
        id: impl Into<String>,
        payload: SalePayload,
    ) -> QueueResult<PendingSale> {
        let id = id.into();
        self.request(|reply| Command::Enqueue {
            id: Some(id),
            payload,
            reply,
        })
        .await?
    }

    /// Moves a FAILED sale back to QUEUED and attempts it.
    pub async fn retry(&self, id: impl Into<String>) -> QueueResult<()> {
        let id = id.into();
        self.request(|reply| Command::Retry { id, reply }).await?
    }

    /// Removes one sale in any state. Returns whether it existed.
    pub async fn purge_one(&self, id: impl Into<String>) -> QueueResult<bool> {
        let id = id.into();
        self.request(|reply| Command::PurgeOne { id, reply }).await?
    }

    /// Removes every active sale. Returns how many were removed.
    pub async fn purge_all(&self) -> QueueResult<u64> {
        self.request(|reply| Command::PurgeAll { reply }).await?
    }

    pub async fn set_online(&self, online: bool) -> QueueResult<()> {
        self.request(|reply| Command::SetOnline { online, reply }).await
    }

    /// Deletes confirmed sales older than `older_than`.
    pub async fn prune_confirmed(&self, older_than: Duration) -> QueueResult<u64> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|_| QueueError::InvalidConfig("Retention period out of range".into()))?;
        self.request(|reply| Command::PruneConfirmed { older_than, reply })
            .await?
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshots.clone()
    }

    /// Stops the coordinator. In-flight attempts are abandoned; their
    /// sales stay QUEUED and are picked up again on the next start.
    pub async fn shutdown(&self) -> QueueResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles and spawns a [`QueueCoordinator`].
///
/// ## Usage
/// ```rust,ignore
/// let queue = QueueCoordinator::builder()
///     .store(Arc::new(db.queue()))
///     .submitter(Arc::new(HttpSaleSubmitter::from_config(&config)?))
///     .options(CoordinatorOptions::from(&config))
///     .spawn()
///     .await?;
///
/// let sale = queue.enqueue(payload).await?;
/// ```
pub struct QueueCoordinatorBuilder {
    store: Option<Arc<dyn LocalQueueStore>>,
    submitter: Option<Arc<dyn SaleSubmitter>>,
    emitter: Arc<dyn QueueEventEmitter>,
    clock: Arc<dyn Clock>,
    options: CoordinatorOptions,
}

impl QueueCoordinatorBuilder {
    pub fn store(mut self, store: Arc<dyn LocalQueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn submitter(mut self, submitter: Arc<dyn SaleSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn emitter(mut self, emitter: Arc<dyn QueueEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Recovers persisted state, publishes the first snapshot and starts
    /// the actor task.
    pub async fn spawn(self) -> QueueResult<QueueHandle> {
        let store = self
            .store
            .ok_or_else(|| QueueError::InvalidConfig("Queue store is required".into()))?;
        let submitter = self
            .submitter
            .ok_or_else(|| QueueError::InvalidConfig("Sale submitter is required".into()))?;
        self.options
            .policy
            .validate()
            .map_err(|e| QueueError::InvalidConfig(e.to_string()))?;
        if self.options.submit_timeout.is_zero() {
            return Err(QueueError::InvalidConfig(
                "Submit timeout must be greater than zero".into(),
            ));
        }

        let (command_tx, command_rx) = mpsc::channel(self.options.command_buffer.max(1));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(QueueSnapshot::default());

        let mut coordinator = QueueCoordinator {
            store,
            submitter,
            emitter: self.emitter,
            clock: self.clock,
            scheduler: RetryScheduler::new(self.options.policy.clone()),
            online: self.options.start_online,
            options: self.options,
            in_flight: HashSet::new(),
            commands: command_rx,
            outcome_tx,
            outcomes: outcome_rx,
            snapshot_tx,
        };

        coordinator.recover().await?;
        coordinator.publish().await;

        tokio::spawn(coordinator.run());

        Ok(QueueHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        })
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Owns the queue: the only task that writes to the store.
pub struct QueueCoordinator {
    store: Arc<dyn LocalQueueStore>,
    submitter: Arc<dyn SaleSubmitter>,
    emitter: Arc<dyn QueueEventEmitter>,
    clock: Arc<dyn Clock>,
    scheduler: RetryScheduler,
    options: CoordinatorOptions,
    online: bool,

    /// Ids with an attempt task running.
    in_flight: HashSet<String>,

    commands: mpsc::Receiver<Command>,
    outcome_tx: mpsc::UnboundedSender<AttemptOutcome>,
    outcomes: mpsc::UnboundedReceiver<AttemptOutcome>,
    snapshot_tx: watch::Sender<QueueSnapshot>,
}

impl QueueCoordinator {
    pub fn builder() -> QueueCoordinatorBuilder {
        QueueCoordinatorBuilder {
            store: None,
            submitter: None,
            emitter: Arc::new(NoOpEmitter),
            clock: Arc::new(SystemClock),
            options: CoordinatorOptions::default(),
        }
    }

    async fn run(mut self) {
        info!(online = self.online, "Queue coordinator started");

        let mut shutdown_reply = None;
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown { reply }) => {
                            shutdown_reply = Some(reply);
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                        // Every handle dropped
                        None => break,
                    }
                }

                Some(outcome) = self.outcomes.recv() => {
                    let id = outcome.id.clone();
                    if let Err(e) = self.handle_outcome(outcome).await {
                        error!(sale_id = %id, error = %e, "Failed to record attempt result");
                        self.revisit(&id);
                    }
                    self.publish().await;
                }

                Some(id) = self.scheduler.next_due(), if !self.scheduler.is_empty() => {
                    if let Err(e) = self.handle_retry_due(&id).await {
                        error!(sale_id = %id, error = %e, "Failed to requeue sale");
                        self.revisit(&id);
                    }
                    self.publish().await;
                }
            }
        }

        self.scheduler.cancel_all();
        info!(in_flight = self.in_flight.len(), "Queue coordinator stopped");

        // Close the command channel before acknowledging
        drop(self);
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    /// Applies a command, publishes the resulting snapshot, then replies.
    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue { id, payload, reply } => {
                let result = self.enqueue(id, payload).await;
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::Retry { id, reply } => {
                let result = self.retry(&id).await;
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::PurgeOne { id, reply } => {
                let result = self.purge_one(&id).await;
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::PurgeAll { reply } => {
                let result = self.purge_all().await;
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::SetOnline { online, reply } => {
                self.set_online(online).await;
                self.publish().await;
                let _ = reply.send(());
            }
            Command::PruneConfirmed { older_than, reply } => {
                let result = self.prune_confirmed(older_than).await;
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn enqueue(&mut self, id: Option<String>, payload: SalePayload) -> QueueResult<PendingSale> {
        let id = id.unwrap_or_else(new_sale_id);
        validate_sale_id(&id)?;
        validate_sale_payload(&payload)?;

        // A purged id may still have an attempt outstanding
        if self.in_flight.contains(&id) {
            return Err(QueueError::DuplicateId(id));
        }

        let sale = PendingSale::new(id, payload, self.clock.now());
        self.store.append(&sale).await?;
        info!(
            sale_id = %sale.id,
            lines = sale.payload.lines.len(),
            total_cents = sale.payload.totals.total_cents,
            "Sale queued"
        );

        self.dispatch_logged(&sale.id).await;
        Ok(sale)
    }

    async fn retry(&mut self, id: &str) -> QueueResult<()> {
        let sale = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::SaleNotFound(id.to_string()))?;

        if sale.status != SaleStatus::Failed {
            return Err(QueueError::NotRetryable {
                id: id.to_string(),
                status: sale.status,
            });
        }

        self.store
            .update(
                id,
                &SalePatch::new()
                    .status(SaleStatus::Queued)
                    .clear_error()
                    .clear_next_attempt(),
            )
            .await?;
        info!(sale_id = %id, attempts = sale.attempts, "Manual retry requested");

        self.dispatch_logged(id).await;
        Ok(())
    }

    async fn purge_one(&mut self, id: &str) -> QueueResult<bool> {
        self.scheduler.cancel(id);
        let removed = self.store.remove(id).await?;
        if removed {
            info!(sale_id = %id, in_flight = self.in_flight.contains(id), "Sale purged");
        }
        Ok(removed)
    }

    async fn purge_all(&mut self) -> QueueResult<u64> {
        self.scheduler.cancel_all();
        let removed = self.store.clear().await?;
        info!(removed, "Queue purged");
        Ok(removed)
    }

    async fn prune_confirmed(&mut self, older_than: chrono::Duration) -> QueueResult<u64> {
        let cutoff = self.clock.now() - older_than;
        let pruned = self.store.prune_confirmed(cutoff).await?;
        if pruned > 0 {
            info!(pruned, %cutoff, "Pruned confirmed sales");
        }
        Ok(pruned)
    }

    async fn set_online(&mut self, online: bool) {
        if self.online != online {
            info!(online, "Connectivity changed");
            self.online = online;
        }
        if online {
            if let Err(e) = self.dispatch_ready().await {
                error!(error = %e, "Failed to dispatch queued sales");
            }
        }
    }

    // =========================================================================
    // Attempts
    // =========================================================================

    /// Dispatches every QUEUED sale without an attempt in flight. A sale
    /// that cannot be dispatched is revisited without holding up the rest.
    async fn dispatch_ready(&mut self) -> QueueResult<()> {
        let ready: Vec<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|s| s.status == SaleStatus::Queued && !self.in_flight.contains(&s.id))
            .map(|s| s.id)
            .collect();

        for id in ready {
            self.dispatch_logged(&id).await;
        }
        Ok(())
    }

    async fn dispatch_logged(&mut self, id: &str) {
        if let Err(e) = self.dispatch(id).await {
            error!(sale_id = %id, error = %e, "Failed to dispatch sale");
            self.revisit(id);
        }
    }

    /// Arms a timer for a sale whose last store write failed, so it is
    /// looked at again instead of sitting QUEUED with nothing pending.
    fn revisit(&mut self, id: &str) {
        let delay = self.scheduler.policy().base_delay;
        warn!(sale_id = %id, ?delay, "Sale will be revisited");
        self.scheduler.schedule(id, delay);
    }

    /// Starts one attempt for `id` if it is QUEUED, idle and we are online.
    async fn dispatch(&mut self, id: &str) -> QueueResult<()> {
        if !self.online || self.in_flight.contains(id) {
            return Ok(());
        }

        let attempts = match self.store.get(id).await? {
            Some(sale) if sale.status == SaleStatus::Queued => sale.attempts + 1,
            _ => return Ok(()),
        };

        let sale = self
            .store
            .update(
                id,
                &SalePatch::new()
                    .attempts(attempts)
                    .attempted_at(self.clock.now()),
            )
            .await?;
        self.in_flight.insert(sale.id.clone());
        debug!(sale_id = %id, attempts, "Submitting sale");

        let submitter = Arc::clone(&self.submitter);
        let outcomes = self.outcome_tx.clone();
        let timeout = self.options.submit_timeout;
        let id = sale.id.clone();

        tokio::spawn(async move {
            // Inner task so a panicking submitter still reports an outcome
            let attempt = tokio::spawn(async move {
                match tokio::time::timeout(timeout, submitter.submit(&sale)).await {
                    Ok(result) => result,
                    Err(_) => Err(SubmitError::Transient(format!(
                        "Submission timed out after {:?}",
                        timeout
                    ))),
                }
            });

            let result = match attempt.await {
                Ok(result) => result,
                Err(e) => Err(SubmitError::Transient(format!("Submission task failed: {e}"))),
            };

            let _ = outcomes.send(AttemptOutcome { id, result });
        });

        Ok(())
    }

    async fn handle_outcome(&mut self, outcome: AttemptOutcome) -> QueueResult<()> {
        let AttemptOutcome { id, result } = outcome;
        self.in_flight.remove(&id);

        let sale = match self.store.get(&id).await? {
            Some(sale) if sale.status == SaleStatus::Queued => sale,
            _ => {
                debug!(sale_id = %id, "Discarding result for purged sale");
                return Ok(());
            }
        };

        let err = match result {
            Ok(confirmation) => {
                let confirmed = self.store.complete(&id, &confirmation).await?;
                info!(
                    sale_id = %id,
                    sale_number = %confirmed.confirmation.sale_number,
                    attempts = sale.attempts,
                    "Sale submitted"
                );
                return Ok(());
            }
            Err(err) => err,
        };

        match self.scheduler.plan(sale.attempts, err.kind()) {
            RetryPlan::Retry { delay } => {
                let next_attempt_at = self.clock.now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                self.store
                    .update(
                        &id,
                        &SalePatch::new()
                            .status(SaleStatus::Retrying)
                            .error(err.kind(), err.message())
                            .next_attempt_at(next_attempt_at),
                    )
                    .await?;
                self.scheduler.schedule(&id, delay);
                warn!(
                    sale_id = %id,
                    attempts = sale.attempts,
                    ?delay,
                    error = %err,
                    "Submission failed, retry scheduled"
                );
            }
            RetryPlan::GiveUp(reason) => {
                let failed = self
                    .store
                    .update(
                        &id,
                        &SalePatch::new()
                            .status(SaleStatus::Failed)
                            .error(err.kind(), err.message()),
                    )
                    .await?;
                warn!(
                    sale_id = %id,
                    attempts = failed.attempts,
                    ?reason,
                    error = %err,
                    "Sale failed"
                );
                self.emitter.emit_failure(&failed);
            }
        }

        Ok(())
    }

    async fn handle_retry_due(&mut self, id: &str) -> QueueResult<()> {
        let Some(sale) = self.store.get(id).await? else {
            return Ok(());
        };

        match sale.status {
            SaleStatus::Retrying => {
                self.store
                    .update(
                        id,
                        &SalePatch::new()
                            .status(SaleStatus::Queued)
                            .clear_next_attempt(),
                    )
                    .await?;
                debug!(sale_id = %id, "Retry due");
            }
            // Left QUEUED by a failed write
            SaleStatus::Queued => debug!(sale_id = %id, "Revisiting queued sale"),
            SaleStatus::Failed | SaleStatus::Submitted => return Ok(()),
        }

        self.dispatch(id).await
    }

    // =========================================================================
    // Startup and Snapshots
    // =========================================================================

    /// Re-arms timers and dispatches work left over from a previous run.
    async fn recover(&mut self) -> QueueResult<()> {
        let now = self.clock.now();
        let sales = self.store.list().await?;

        let mut rearmed = 0;
        let mut queued = Vec::new();
        for sale in &sales {
            match sale.status {
                SaleStatus::Retrying => {
                    let delay = sale
                        .next_attempt_at
                        .and_then(|at| (at - now).to_std().ok())
                        .unwrap_or(Duration::ZERO);
                    self.scheduler.schedule(&sale.id, delay);
                    rearmed += 1;
                }
                SaleStatus::Queued => queued.push(sale.id.clone()),
                SaleStatus::Failed | SaleStatus::Submitted => {}
            }
        }

        info!(
            pending = sales.len(),
            queued = queued.len(),
            rearmed,
            "Recovered offline queue"
        );

        for id in queued {
            self.dispatch_logged(&id).await;
        }
        Ok(())
    }

    /// Publishes a fresh snapshot if anything visible changed.
    async fn publish(&mut self) {
        let pending = match self.store.list().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to read queue for snapshot");
                return;
            }
        };
        let confirmed = match self.store.confirmed(self.options.confirmed_view_limit).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(error = %e, "Failed to read confirmed sales for snapshot");
                return;
            }
        };

        let snapshot = QueueSnapshot::new(
            pending,
            confirmed,
            self.in_flight.iter().cloned().collect(),
            self.online,
        );

        let changed = self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });

        if changed {
            debug!(
                queued = snapshot.counts.queued,
                retrying = snapshot.counts.retrying,
                failed = snapshot.counts.failed,
                in_flight = snapshot.counts.in_flight,
                "Queue snapshot published"
            );
            self.emitter.emit_snapshot(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = QueueConfig::default();
        config.retry.max_attempts = 3;
        config.backend.submit_timeout_secs = 4;
        config.queue.start_online = false;

        let options = CoordinatorOptions::from(&config);
        assert_eq!(options.policy.max_attempts, 3);
        assert_eq!(options.submit_timeout, Duration::from_secs(4));
        assert!(!options.start_online);
        assert_eq!(options.confirmed_view_limit, 50);
    }

    #[tokio::test]
    async fn test_spawn_requires_store_and_submitter() {
        let err = QueueCoordinator::builder().spawn().await.err();
        assert!(matches!(err, Some(QueueError::InvalidConfig(_))));
    }
}
