//! # discord-archiver
//!
//! Crash-resumable archiving of Discord channels and threads.
//!
//! A run has two halves:
//!
//! 1. **Discovery** merges cached channel ids, explicitly configured threads
//!    and the text channels (plus archived threads) of configured categories
//!    into one ordered, deduplicated channel list, and writes every id back to
//!    the channel cache.
//! 2. **Export** drives DiscordChatExporter once per channel. Output is JSON
//!    split into numbered partition files. A channel with existing partitions
//!    resumes after the last durable one instead of starting over, and the
//!    resumed partitions are renumbered into the output directory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use discord_archiver::{CliExporter, Config, DiscordClient, Session};
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file(Path::new("config.json"))?;
//!     config.ensure_directories()?;
//!
//!     let client = Arc::new(DiscordClient::new(&config.token, &config.platform)?);
//!     let exporter = Arc::new(CliExporter::from_config(&config)?);
//!     let shutdown = CancellationToken::new();
//!
//!     let session = Session::new(config, client, exporter, shutdown);
//!     let summary = session.run_once().await?;
//!     println!("{} channels processed", summary.reports.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Channel id cache file
pub mod cache;
/// Resume checkpoints
pub mod checkpoint;
/// Configuration types
pub mod config;
/// Channel discovery
pub mod discovery;
/// Error types
pub mod error;
/// External exporter integration
pub mod exporter;
/// Tracing subscriber setup
pub mod logging;
/// Per-channel export pipeline
pub mod orchestrator;
/// Partition file naming and parsing
pub mod partition;
/// Chat platform client
pub mod platform;
/// Resumed partition reconciliation
pub mod reconcile;
/// Retry logic with exponential backoff
pub mod retry;
/// Run lifecycle and scheduling
pub mod session;
/// Core types
pub mod types;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod testing;

// Re-export commonly used types
pub use cache::ChannelIdCache;
pub use checkpoint::ResumeCheckpoint;
pub use config::Config;
pub use error::{Error, ExportError, PlatformError, Result};
pub use exporter::{CliExporter, ExportRequest, ExportStatus, Exporter};
pub use orchestrator::ExportOrchestrator;
pub use platform::{DiscordClient, PlatformClient};
pub use session::Session;
pub use types::{
    Channel, ChannelId, ChannelKind, ChannelReport, ExportOutcome, MessageId, RunSummary,
};

/// Cancel `shutdown` once a termination signal arrives.
///
/// Cancellation is cooperative: the orchestrator stops before the next
/// channel and an exporter that is already running is waited on.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use discord_archiver::cancel_on_signal;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let shutdown = CancellationToken::new();
///     tokio::spawn(cancel_on_signal(shutdown.clone()));
///
///     shutdown.cancelled().await;
/// }
/// ```
pub async fn cancel_on_signal(shutdown: tokio_util::sync::CancellationToken) {
    wait_for_signal().await;
    tracing::warn!("shutdown requested, finishing the current channel");
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
