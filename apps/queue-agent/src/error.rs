//! Agent startup and shutdown errors.

use thiserror::Error;
use till_db::DbError;
use till_sync::QueueError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Could not determine app data directory")]
    NoDataDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

pub type AgentResult<T> = Result<T, AgentError>;
