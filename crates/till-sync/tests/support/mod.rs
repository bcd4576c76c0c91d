//! Shared fakes for coordinator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use till_core::{
    Confirmation, ConfirmedSale, PendingSale, SaleLine, SalePatch, SalePayload, SaleTotals,
};
use till_db::{DbError, DbResult, LocalQueueStore, MemoryQueueStore};
use till_sync::{QueueEventEmitter, QueueHandle, QueueSnapshot, SaleSubmitter, SubmitError};

/// What the fake backend does with one attempt.
#[derive(Clone)]
pub enum Step {
    Confirm,
    Transient,
    Permanent,
    /// Waits for the notify, then confirms.
    Hold(Arc<Notify>),
    /// Sleeps, then confirms.
    Sleep(Duration),
    Panic,
}

/// Submitter that plays a per-sale script, then confirms.
#[derive(Default)]
pub struct ScriptedSubmitter {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    active: Mutex<HashMap<String, u32>>,
    max_concurrent: AtomicU32,
    numbers: AtomicU32,
}

struct ActiveGuard<'a> {
    submitter: &'a ScriptedSubmitter,
    id: String,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.submitter.active.lock().unwrap();
        if let Some(n) = active.get_mut(&self.id) {
            *n -= 1;
        }
    }
}

impl ScriptedSubmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, id: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), steps.into_iter().collect());
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, id: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call_id, _)| call_id == id)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Highest number of simultaneous attempts seen for any single id.
    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SaleSubmitter for ScriptedSubmitter {
    async fn submit(&self, sale: &PendingSale) -> Result<Confirmation, SubmitError> {
        self.calls
            .lock()
            .unwrap()
            .push((sale.id.clone(), Instant::now()));

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&sale.id)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Confirm);

        let concurrent = {
            let mut active = self.active.lock().unwrap();
            let n = active.entry(sale.id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.max_concurrent.fetch_max(concurrent, Ordering::SeqCst);
        let _guard = ActiveGuard {
            submitter: self,
            id: sale.id.clone(),
        };

        match step {
            Step::Confirm => {}
            Step::Transient => return Err(SubmitError::Transient("connection reset".into())),
            Step::Permanent => {
                return Err(SubmitError::Permanent("duplicate sale number (HTTP 409)".into()))
            }
            Step::Hold(notify) => notify.notified().await,
            Step::Sleep(duration) => tokio::time::sleep(duration).await,
            Step::Panic => panic!("submitter blew up"),
        }

        let n = self.numbers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Confirmation {
            sale_number: format!("S-{:06}", n),
            confirmed_at: Utc::now(),
        })
    }
}

/// Emitter that keeps everything it is given.
#[derive(Default)]
pub struct RecordingEmitter {
    pub snapshots: Mutex<Vec<QueueSnapshot>>,
    pub failures: Mutex<Vec<PendingSale>>,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.id.clone())
            .collect()
    }
}

impl QueueEventEmitter for RecordingEmitter {
    fn emit_snapshot(&self, snapshot: &QueueSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn emit_failure(&self, sale: &PendingSale) {
        self.failures.lock().unwrap().push(sale.clone());
    }
}

/// Valid two-line sale with the given tax.
pub fn payload(tax_cents: i64) -> SalePayload {
    SalePayload {
        customer: None,
        lines: vec![
            SaleLine {
                sku: "CHG-USB-C".into(),
                name: "USB-C charger".into(),
                quantity: 2,
                unit_price_cents: 1999,
                discount_cents: 0,
            },
            SaleLine {
                sku: "CBL-1M".into(),
                name: "Cable 1m".into(),
                quantity: 1,
                unit_price_cents: 899,
                discount_cents: 100,
            },
        ],
        totals: SaleTotals {
            subtotal_cents: 4797,
            discount_cents: 0,
            tax_cents,
            total_cents: 4797 + tax_cents,
        },
        note: None,
    }
}

/// Waits until a snapshot satisfies `pred` and returns it.
pub async fn wait_until(
    queue: &QueueHandle,
    pred: impl FnMut(&QueueSnapshot) -> bool,
) -> QueueSnapshot {
    let mut rx = queue.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(120), rx.wait_for(pred))
        .await
        .expect("timed out waiting for queue state")
        .expect("coordinator stopped");
    snapshot.clone()
}

/// Store that fails one chosen `update`, then behaves.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryQueueStore,
    fail_when: Mutex<Option<Box<dyn Fn(&str, &SalePatch) -> bool + Send>>>,
    failed_writes: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fails the next update matching `pred`.
    pub fn fail_next_update(&self, pred: impl Fn(&str, &SalePatch) -> bool + Send + 'static) {
        *self.fail_when.lock().unwrap() = Some(Box::new(pred));
    }

    pub fn failed_writes(&self) -> u32 {
        self.failed_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalQueueStore for FlakyStore {
    async fn append(&self, sale: &PendingSale) -> DbResult<()> {
        self.inner.append(sale).await
    }

    async fn update(&self, id: &str, patch: &SalePatch) -> DbResult<PendingSale> {
        let fail = {
            let mut fail_when = self.fail_when.lock().unwrap();
            match fail_when.as_ref() {
                Some(pred) if pred(id, patch) => {
                    *fail_when = None;
                    true
                }
                _ => false,
            }
        };
        if fail {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(DbError::QueryFailed("disk I/O error".into()));
        }
        self.inner.update(id, patch).await
    }

    async fn remove(&self, id: &str) -> DbResult<bool> {
        self.inner.remove(id).await
    }

    async fn clear(&self) -> DbResult<u64> {
        self.inner.clear().await
    }

    async fn get(&self, id: &str) -> DbResult<Option<PendingSale>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> DbResult<Vec<PendingSale>> {
        self.inner.list().await
    }

    async fn complete(&self, id: &str, confirmation: &Confirmation) -> DbResult<ConfirmedSale> {
        self.inner.complete(id, confirmation).await
    }

    async fn confirmed(&self, limit: u32) -> DbResult<Vec<ConfirmedSale>> {
        self.inner.confirmed(limit).await
    }

    async fn prune_confirmed(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        self.inner.prune_confirmed(cutoff).await
    }
}
