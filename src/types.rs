//! Core types for discord-archiver

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Platform-assigned identifier of a channel, thread or category
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// Create a new ChannelId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChannelId> for u64 {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl PartialEq<u64> for ChannelId {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Identifier of a single message
///
/// Message ids share the channel id space and grow with time, so the
/// exporter accepts one as an `--after` cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// What kind of platform object a [`Channel`] is
///
/// Every discovery branch matches on this exhaustively. `Other` covers
/// private/DM channels, voice channels and anything the platform adds later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Grouping container whose direct children are channels
    Category,
    /// Ordinary text channel
    TextChannel,
    /// Forum channel (messages live in its threads)
    ForumChannel,
    /// Thread inside a text or forum channel
    Thread,
    /// Anything else
    Other,
}

impl ChannelKind {
    /// Whether archived threads can be listed under this kind
    pub fn has_threads(&self) -> bool {
        matches!(self, ChannelKind::TextChannel | ChannelKind::ForumChannel)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelKind::Category => "category",
            ChannelKind::TextChannel => "text channel",
            ChannelKind::ForumChannel => "forum channel",
            ChannelKind::Thread => "thread",
            ChannelKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Immutable snapshot of a channel as fetched from the platform
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier
    pub id: ChannelId,
    /// Channel kind
    pub kind: ChannelKind,
    /// Channel name (empty for private channels)
    pub name: String,
    /// Guild the channel belongs to
    pub guild_id: Option<u64>,
    /// Parent category (channels) or parent channel (threads)
    pub parent_id: Option<ChannelId>,
    /// Human-readable path of the parent, used for display only
    pub parent_path: Option<String>,
    /// Last message id known to the platform at fetch time
    pub last_message_id: Option<MessageId>,
}

impl Channel {
    /// Create a bare channel snapshot with no parent information
    pub fn new(id: impl Into<ChannelId>, kind: ChannelKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            guild_id: None,
            parent_id: None,
            parent_path: None,
            last_message_id: None,
        }
    }

    /// Human-readable location, e.g. `Archive / general / Some thread`
    pub fn display_path(&self) -> String {
        let name = if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        };

        match &self.parent_path {
            Some(parent) if !parent.is_empty() => format!("{} / {}", parent, name),
            _ => name,
        }
    }
}

/// Result of running the export pipeline for one channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportOutcome {
    /// Exported from scratch directly into the output directory
    Fresh,
    /// Resumed from a checkpoint and reconciled
    Resumed,
    /// Already up to date, no exporter started
    Skipped,
    /// Exporter failed or could not be started
    Failed,
}

impl std::fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExportOutcome::Fresh => "fresh",
            ExportOutcome::Resumed => "resumed",
            ExportOutcome::Skipped => "skipped",
            ExportOutcome::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-channel report produced by the orchestrator
#[derive(Clone, Debug)]
pub struct ChannelReport {
    /// Channel that was processed
    pub channel_id: ChannelId,
    /// Display path at the time of discovery
    pub display: String,
    /// What happened
    pub outcome: ExportOutcome,
    /// Wall-clock time spent on this channel
    pub elapsed: Duration,
    /// Partition files moved from scratch into the output directory
    pub files_reconciled: usize,
}

/// Summary of one batch run
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// One report per processed channel, in processing order
    pub reports: Vec<ChannelReport>,
    /// Total wall-clock time of the batch
    pub elapsed: Duration,
    /// Whether the batch stopped early because shutdown was requested
    pub interrupted: bool,
}

impl RunSummary {
    /// Number of channels with the given outcome
    pub fn count(&self, outcome: ExportOutcome) -> usize {
        self.reports.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Whether every processed channel finished without failure
    pub fn all_succeeded(&self) -> bool {
        self.count(ExportOutcome::Failed) == 0
    }
}

/// Format a duration as `H:MM:SS`, truncating sub-second precision
pub fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
