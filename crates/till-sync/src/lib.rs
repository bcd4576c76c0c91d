//! # till-sync: Offline Sale Queue Engine
//!
//! Keeps sales rung up while the backend is unreachable and delivers them
//! once it is back, exactly once per sale id.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Offline Queue Architecture                         │
//! │                                                                         │
//! │   POS checkout / UI                                                     │
//! │        │  enqueue, retry, purge_one, purge_all, set_online              │
//! │        ▼                                                                │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 QueueCoordinator (actor task)                    │  │
//! │  │                                                                  │  │
//! │  │  Only writer of the store. One attempt in flight per sale id.   │  │
//! │  └───────┬──────────────────────┬──────────────────────┬────────────┘  │
//! │          ▼                      ▼                      ▼               │
//! │  ┌────────────────┐  ┌──────────────────┐  ┌────────────────────────┐  │
//! │  │ LocalQueueStore│  │  RetryScheduler  │  │ SaleSubmitter          │  │
//! │  │ (till-db)      │  │                  │  │                        │  │
//! │  │ SQLite / memory│  │ DelayQueue timers│  │ HttpSaleSubmitter      │  │
//! │  │ durable writes │  │ exp. backoff +   │  │ POST /api/pos/sales    │  │
//! │  │                │  │ jitter           │  │ Idempotency-Key        │  │
//! │  └────────────────┘  └──────────────────┘  └────────────────────────┘  │
//! │                                                                         │
//! │  OUTPUTS:                                                               │
//! │  • watch::Receiver<QueueSnapshot> for the queue view                    │
//! │  • QueueEventEmitter for host integrations (failure notices)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`]: TOML + environment configuration
//! - [`coordinator`]: the actor and its [`QueueHandle`]
//! - [`scheduler`]: retry planning and per-sale timers
//! - [`submitter`]: the backend seam and its error taxonomy
//! - [`http`]: reqwest implementation of the submitter
//! - [`events`]: snapshots and the event emitter trait
//! - [`clock`]: wall-clock source for persisted timestamps
//! - [`error`]: queue error types

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod http;
pub mod scheduler;
pub mod submitter;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::QueueConfig;
pub use coordinator::{CoordinatorOptions, QueueCoordinator, QueueCoordinatorBuilder, QueueHandle};
pub use error::{QueueError, QueueResult};
pub use events::{NoOpEmitter, QueueCounts, QueueEventEmitter, QueueSnapshot};
pub use http::HttpSaleSubmitter;
pub use scheduler::{RetryPlan, RetryScheduler};
pub use submitter::{SaleSubmitter, SubmitError};
