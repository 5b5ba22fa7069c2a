//! Traits and types for exporter invocations

use crate::types::{ChannelId, MessageId};
use async_trait::async_trait;
use std::path::PathBuf;

/// One exporter invocation for a single channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Channel or thread to export
    pub channel_id: ChannelId,
    /// Directory the exporter writes partitions into
    pub output_dir: PathBuf,
    /// Only export messages after this id (resume cursor)
    pub after: Option<MessageId>,
}

impl ExportRequest {
    /// Full export into `output_dir`
    pub fn fresh(channel_id: ChannelId, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            channel_id,
            output_dir: output_dir.into(),
            after: None,
        }
    }

    /// Export of everything after `after` into `output_dir`
    pub fn resume(channel_id: ChannelId, output_dir: impl Into<PathBuf>, after: MessageId) -> Self {
        Self {
            channel_id,
            output_dir: output_dir.into(),
            after: Some(after),
        }
    }

    /// Whether this request continues from a checkpoint
    pub fn is_resume(&self) -> bool {
        self.after.is_some()
    }
}

/// How an exporter invocation ended
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportStatus {
    /// Process exit code, `None` if terminated by a signal
    pub code: Option<i32>,
}

impl ExportStatus {
    /// Zero exit code
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Trait for running a channel export
///
/// Implementations block until the export has finished and report its exit
/// status. A non-zero status is not an `Err`; errors are reserved for
/// failing to run the exporter at all.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Run one export to completion
    async fn run(&self, request: &ExportRequest) -> crate::Result<ExportStatus>;

    /// Name of this exporter implementation
    fn name(&self) -> &'static str;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_zero_exit_is_success() {
        assert!(ExportStatus { code: Some(0) }.success());
        assert!(!ExportStatus { code: Some(1) }.success());
        assert!(!ExportStatus { code: None }.success());
    }

    #[test]
    fn resume_requests_carry_cursor() {
        let fresh = ExportRequest::fresh(ChannelId(1), "out");
        let resume = ExportRequest::resume(ChannelId(1), "out/tmp", MessageId(99));

        assert!(!fresh.is_resume());
        assert!(resume.is_resume());
        assert_eq!(resume.after, Some(MessageId(99)));
    }
}
