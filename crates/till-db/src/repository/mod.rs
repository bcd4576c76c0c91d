//! # Repository Module
//!
//! SQL-backed store implementations.
//!
//! - [`pending_sale::SqliteQueueStore`] - durable [`crate::LocalQueueStore`]

pub mod pending_sale;
