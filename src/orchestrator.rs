//! Sequential export of discovered channels
//!
//! Each channel goes through the same steps: a freshness check against the
//! newest partition on disk, clearing the scratch directory, locating a
//! resume checkpoint, running the exporter, and reconciling resumed output.
//! Channels are exported one at a time; a failure is recorded in the run
//! summary and the batch moves on to the next channel.

use crate::checkpoint::{ResumeCheckpoint, latest_message_id, locate};
use crate::config::Config;
use crate::error::ExportError;
use crate::exporter::{ExportRequest, Exporter};
use crate::reconcile::reconcile;
use crate::types::{Channel, ChannelReport, ExportOutcome, RunSummary, format_elapsed};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs the per-channel export pipeline over a batch of channels
pub struct ExportOrchestrator {
    exporter: Arc<dyn Exporter>,
    output_dir: PathBuf,
    scratch_dir: PathBuf,
    media_marker: String,
    shutdown: CancellationToken,
}

impl ExportOrchestrator {
    /// Create an orchestrator using the configured directories
    pub fn new(config: &Config, exporter: Arc<dyn Exporter>, shutdown: CancellationToken) -> Self {
        Self {
            exporter,
            output_dir: config.paths.output_dir.clone(),
            scratch_dir: config.paths.scratch_dir.clone(),
            media_marker: config.exporter.media_marker.clone(),
            shutdown,
        }
    }

    /// Export every channel in order
    ///
    /// Shutdown is checked before each channel; an export already running is
    /// allowed to finish. Remaining channels are left for the next run.
    pub async fn run(&self, channels: &[Channel]) -> RunSummary {
        let started = Instant::now();
        let total = channels.len();
        let mut summary = RunSummary::default();

        info!(
            channels = total,
            exporter = self.exporter.name(),
            "starting export batch"
        );

        for (index, channel) in channels.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                warn!(
                    remaining = total - index,
                    "shutdown requested, stopping before next channel"
                );
                summary.interrupted = true;
                break;
            }

            let position = index + 1;
            info!(
                "--- [{}/{}] Starting export for {} ({}) ---",
                position,
                total,
                channel.display_path(),
                channel.id
            );

            let channel_started = Instant::now();
            let (outcome, files_reconciled) = self.export_channel(channel).await;
            let elapsed = channel_started.elapsed();

            info!(
                channel_id = %channel.id,
                outcome = %outcome,
                "--- [{}/{}] Finished {} in {} (total elapsed {}) ---",
                position,
                total,
                channel.display_path(),
                format_elapsed(elapsed),
                format_elapsed(started.elapsed())
            );

            summary.reports.push(ChannelReport {
                channel_id: channel.id,
                display: channel.display_path(),
                outcome,
                elapsed,
                files_reconciled,
            });
        }

        summary.elapsed = started.elapsed();
        log_summary(&summary, total);
        summary
    }

    /// Run the export pipeline for one channel
    ///
    /// Returns the outcome and the number of partitions reconciled into the
    /// output directory.
    pub async fn export_channel(&self, channel: &Channel) -> (ExportOutcome, usize) {
        if self.is_up_to_date(channel).await {
            info!(
                channel_id = %channel.id,
                "channel is up to date, skipping export"
            );
            return (ExportOutcome::Skipped, 0);
        }

        if let Err(e) = clear_directory(&self.scratch_dir).await {
            error!(
                channel_id = %channel.id,
                scratch_dir = ?self.scratch_dir,
                error = %e,
                "failed to clear scratch directory"
            );
            return (ExportOutcome::Failed, 0);
        }

        let checkpoint = locate(channel.id, &self.output_dir).await;
        let request = match &checkpoint {
            Some(checkpoint) => match self.prepare_resume(channel, checkpoint).await {
                Ok(request) => request,
                Err(e) => {
                    error!(
                        channel_id = %channel.id,
                        error = %e,
                        "failed to remove tail partition, not resuming"
                    );
                    return (ExportOutcome::Failed, 0);
                }
            },
            None => {
                info!(channel_id = %channel.id, "starting fresh export");
                ExportRequest::fresh(channel.id, &self.output_dir)
            }
        };

        let status = match self.exporter.run(&request).await {
            Ok(status) => status,
            Err(e) => {
                error!(channel_id = %channel.id, error = %e, "failed to run exporter");
                return (ExportOutcome::Failed, 0);
            }
        };

        if !status.success() {
            let e = ExportError::ExporterFailed {
                channel_id: channel.id,
                code: status.code,
            };
            warn!(channel_id = %channel.id, error = %e, "export failed, output left for the next run");
            return (ExportOutcome::Failed, 0);
        }

        let Some(checkpoint) = checkpoint else {
            return (ExportOutcome::Fresh, 0);
        };

        match reconcile(
            channel.id,
            &self.scratch_dir,
            &self.output_dir,
            checkpoint.next_part_index,
            &self.media_marker,
        )
        .await
        {
            Ok(moved) => (ExportOutcome::Resumed, moved),
            Err(e) => {
                error!(channel_id = %channel.id, error = %e, "failed to reconcile resumed export");
                (ExportOutcome::Failed, 0)
            }
        }
    }

    /// The platform's last message id matches the newest one on disk
    async fn is_up_to_date(&self, channel: &Channel) -> bool {
        let Some(known) = channel.last_message_id else {
            return false;
        };
        latest_message_id(channel.id, &self.output_dir).await == Some(known)
    }

    /// Delete the tail partition and build a resume request into scratch
    async fn prepare_resume(
        &self,
        channel: &Channel,
        checkpoint: &ResumeCheckpoint,
    ) -> std::io::Result<ExportRequest> {
        for path in &checkpoint.files_to_delete {
            match fs::remove_file(path).await {
                Ok(()) => info!(channel_id = %channel.id, ?path, "removed tail partition"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        info!(
            channel_id = %channel.id,
            after = %checkpoint.last_confirmed_message_id,
            next_part = checkpoint.next_part_index,
            "resuming export"
        );

        Ok(ExportRequest::resume(
            channel.id,
            &self.scratch_dir,
            checkpoint.last_confirmed_message_id,
        ))
    }
}

/// Remove everything inside `dir`, creating it if missing
///
/// The directory itself is kept.
async fn clear_directory(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir).await?;

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

fn log_summary(summary: &RunSummary, total: usize) {
    info!("=== Export summary ===");
    info!(
        processed = summary.reports.len(),
        total,
        fresh = summary.count(ExportOutcome::Fresh),
        resumed = summary.count(ExportOutcome::Resumed),
        skipped = summary.count(ExportOutcome::Skipped),
        failed = summary.count(ExportOutcome::Failed),
        interrupted = summary.interrupted,
        "Processed {} of {} channels in {}",
        summary.reports.len(),
        total,
        format_elapsed(summary.elapsed)
    );
    for report in summary
        .reports
        .iter()
        .filter(|r| r.outcome == ExportOutcome::Failed)
    {
        warn!(channel_id = %report.channel_id, "failed: {}", report.display);
    }
}
