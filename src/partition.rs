//! Partition file naming and body access
//!
//! The exporter names partition files
//! `<base>[<channel_id>]( [part <N>])?<suffix>.json`. The base is opaque;
//! a name without the part clause is part 1. The scratch directory and the
//! output directory share this grammar.

use crate::error::{ExportError, Result};
use crate::types::{ChannelId, MessageId};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::debug;

static PARTITION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^(?P<base>.*)\[(?P<id>\d+)\](?: \[part (?P<part>\d+)\])?(?P<suffix>.*)\.json$")
        .expect("partition name pattern is valid")
});

/// Parsed partition file name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionName {
    /// Everything before `[<channel_id>]`
    pub base: String,
    /// Channel the partition belongs to
    pub channel_id: ChannelId,
    /// Explicit part number, `None` when the name has no part clause
    pub part: Option<u32>,
    /// Anything between the id/part clause and `.json`
    pub suffix: String,
}

impl PartitionName {
    /// Parse a file name, returning `None` unless it belongs to `channel_id`
    pub fn parse(file_name: &str, channel_id: ChannelId) -> Option<Self> {
        let caps = PARTITION_NAME.captures(file_name)?;
        let id: u64 = caps.name("id")?.as_str().parse().ok()?;
        if id != channel_id.get() {
            return None;
        }

        let part = match caps.name("part") {
            Some(m) => match m.as_str().parse::<u32>() {
                Ok(0) | Err(_) => return None,
                Ok(n) => Some(n),
            },
            None => None,
        };

        Some(Self {
            base: caps.name("base").map(|m| m.as_str().to_string())?,
            channel_id,
            part,
            suffix: caps
                .name("suffix")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }

    /// Canonical output name `<base>[<channel_id>] [part <n>].json`
    pub fn canonical(base: &str, channel_id: ChannelId, part: u32) -> Self {
        Self {
            base: base.to_string(),
            channel_id,
            part: Some(part),
            suffix: String::new(),
        }
    }

    /// Part number, 1 when the name has no part clause
    pub fn number(&self) -> u32 {
        self.part.unwrap_or(1)
    }

    /// Rendered file name
    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for PartitionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.base, self.channel_id)?;
        if let Some(part) = self.part {
            write!(f, " [part {}]", part)?;
        }
        write!(f, "{}.json", self.suffix)
    }
}

/// A partition file found on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionFile {
    /// Full path
    pub path: PathBuf,
    /// Parsed name
    pub name: PartitionName,
}

impl PartitionFile {
    /// Part number
    pub fn part(&self) -> u32 {
        self.name.number()
    }
}

/// List a channel's partitions in `dir`, ascending by part number
///
/// A missing directory has no partitions. Ordering is by parsed part number;
/// the file name only breaks ties between equal numbers.
pub async fn list_partitions(dir: &Path, channel_id: ChannelId) -> Result<Vec<PartitionFile>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut partitions = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(name) = PartitionName::parse(file_name, channel_id) {
            partitions.push(PartitionFile {
                path: entry.path(),
                name,
            });
        }
    }

    partitions.sort_by(|a, b| {
        a.part()
            .cmp(&b.part())
            .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
    });

    debug!(?dir, channel_id = %channel_id, count = partitions.len(), "listed partitions");
    Ok(partitions)
}

#[derive(Deserialize)]
struct PartitionBody {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: RawMessageId,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMessageId {
    Number(u64),
    Text(String),
}

/// Identifier of the last message record in a partition body
pub async fn last_message_id(path: &Path) -> Result<MessageId> {
    let unreadable = |reason: String| ExportError::PartitionUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = fs::read(path).await.map_err(|e| unreadable(e.to_string()))?;
    let body: PartitionBody =
        serde_json::from_slice(&bytes).map_err(|e| unreadable(e.to_string()))?;

    let last = body.messages.last().ok_or_else(|| ExportError::NoMessages {
        path: path.to_path_buf(),
    })?;

    let id = match &last.id {
        RawMessageId::Number(n) => *n,
        RawMessageId::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| unreadable(format!("invalid message id {:?}", s)))?,
    };
    Ok(MessageId(id))
}
