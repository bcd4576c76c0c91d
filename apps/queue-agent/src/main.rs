//! # Queue Agent Entry Point
//!
//! Runs the offline sale queue without a UI: sales already captured in the
//! local database are delivered to the backend as soon as it is reachable.
//!
//! ## Startup Sequence
//! 1. Initialize tracing (logging)
//! 2. Load configuration (file, then environment)
//! 3. Determine database path (app data directory)
//! 4. Connect to database & run migrations
//! 5. Spawn the queue coordinator
//! 6. Run probe and prune loops until Ctrl-C

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    queue_agent::init_tracing();

    match queue_agent::run(queue_agent::shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Queue agent failed");
            ExitCode::FAILURE
        }
    }
}
