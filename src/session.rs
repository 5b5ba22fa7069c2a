//! Top-level run lifecycle
//!
//! A run connects to the platform, discovers channels in a background task
//! that reports back exactly once, and hands the result to the export
//! orchestrator. [`Session::run_scheduled`] repeats runs on a fixed interval
//! and retries failed runs after a delay.

use crate::cache::ChannelIdCache;
use crate::config::Config;
use crate::discovery::discover;
use crate::error::{Error, Result};
use crate::exporter::Exporter;
use crate::orchestrator::ExportOrchestrator;
use crate::platform::PlatformClient;
use crate::types::{Channel, RunSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Wires configuration, platform client, and exporter into complete runs
pub struct Session {
    config: Arc<Config>,
    client: Arc<dyn PlatformClient>,
    exporter: Arc<dyn Exporter>,
    shutdown: CancellationToken,
}

impl Session {
    /// Create a new session
    pub fn new(
        config: Config,
        client: Arc<dyn PlatformClient>,
        exporter: Arc<dyn Exporter>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            exporter,
            shutdown,
        }
    }

    /// Wait for the platform session and discover channels
    pub async fn discover_channels(&self) -> Result<Vec<Channel>> {
        connect(
            Arc::clone(&self.client),
            Arc::clone(&self.config),
            &self.shutdown,
        )
        .await
    }

    /// Discover and export once
    pub async fn run_once(&self) -> Result<RunSummary> {
        let channels = self.discover_channels().await?;
        info!(channels = channels.len(), "discovery complete");

        let orchestrator = ExportOrchestrator::new(
            &self.config,
            Arc::clone(&self.exporter),
            self.shutdown.clone(),
        );
        Ok(orchestrator.run(&channels).await)
    }

    /// Run until shutdown, repeating on `schedule.repeat_interval`
    ///
    /// Without a repeat interval this is a single run whose error is
    /// returned. With one, a failed run is retried after
    /// `schedule.retry_delay` and the loop only ends on shutdown.
    pub async fn run_scheduled(&self) -> Result<()> {
        let schedule = &self.config.schedule;

        loop {
            let wait = match self.run_once().await {
                Ok(summary) if summary.interrupted => return Ok(()),
                Ok(_) => match schedule.repeat_interval {
                    Some(interval) => {
                        info!(next_run_in = ?interval, "run complete, waiting for next cycle");
                        interval
                    }
                    None => return Ok(()),
                },
                Err(Error::ShuttingDown) => return Ok(()),
                Err(e) => match schedule.repeat_interval {
                    Some(_) => {
                        error!(error = %e, retry_in = ?schedule.retry_delay, "run failed, retrying");
                        schedule.retry_delay
                    }
                    None => return Err(e),
                },
            };

            if !self.sleep_unless_shutdown(wait).await {
                info!("shutdown requested, not starting another run");
                return Ok(());
            }
        }
    }

    /// Sleep for `duration`; false if shutdown was requested first
    async fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Wait for the platform session and discover channels on a separate task
///
/// The task delivers its result exactly once through a one-shot channel.
/// Waiting for the platform is bounded by `platform.ready_timeout`; discovery
/// itself is not. Shutdown abandons the wait; the cache is only ever
/// replaced atomically, so an abandoned discovery cannot corrupt it.
pub async fn connect(
    client: Arc<dyn PlatformClient>,
    config: Arc<Config>,
    shutdown: &CancellationToken,
) -> Result<Vec<Channel>> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let result = connect_and_discover(client.as_ref(), &config).await;
        // The receiver is gone only if the caller stopped waiting
        let _ = tx.send(result);
    });

    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(Error::ShuttingDown),
        result = rx => result.unwrap_or_else(|_| {
            Err(Error::Other("discovery task ended without reporting".to_string()))
        }),
    }
}

async fn connect_and_discover(client: &dyn PlatformClient, config: &Config) -> Result<Vec<Channel>> {
    let ready_timeout = config.platform.ready_timeout;
    let user = tokio::time::timeout(ready_timeout, client.wait_until_ready())
        .await
        .map_err(|_| {
            Error::NotReady(format!(
                "{} session not ready after {:?}",
                client.name(),
                ready_timeout
            ))
        })??;
    info!(user = %user, platform = client.name(), "logged in");

    if config.threads.is_empty() && config.categories.is_empty() {
        warn!("no threads or categories configured, only cached channels will be exported");
    }

    let cache = ChannelIdCache::new(&config.paths.cache_path);
    discover(client, config, &cache).await
}
