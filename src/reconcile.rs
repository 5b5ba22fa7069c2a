//! Moving resumed partitions from scratch into the output directory
//!
//! A resumed export writes its partitions into the scratch directory starting
//! at part 1. Reconciliation renumbers them to continue the channel's existing
//! sequence, rewrites absolute media references to be relative to the media
//! marker, and moves them into the output directory.

use crate::error::{ExportError, Result};
use crate::partition::{PartitionFile, PartitionName, list_partitions};
use crate::types::ChannelId;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Rewrite every string containing `marker` to start at its last occurrence
///
/// `"/abs/output/media/x.png"` becomes `"media/x.png"` for marker `"media/"`,
/// and so does `"/media/usb/output/media/x.png"`.
/// Strings that already start with the marker are left alone, so applying
/// this twice changes nothing the second time. Returns the number of strings
/// rewritten.
pub fn normalize_media_paths(value: &mut Value, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }

    match value {
        Value::String(s) => match s.rfind(marker) {
            Some(index) if index > 0 => {
                *s = s[index..].to_string();
                1
            }
            _ => 0,
        },
        Value::Array(items) => items
            .iter_mut()
            .map(|item| normalize_media_paths(item, marker))
            .sum(),
        Value::Object(map) => map
            .values_mut()
            .map(|item| normalize_media_paths(item, marker))
            .sum(),
        _ => 0,
    }
}

/// Move a channel's scratch partitions into `output_dir` numbered from `start_index`
///
/// Scratch partitions are taken in part order. A partition that fails to
/// read, parse, or move is logged and left in scratch, and does not consume
/// an index. Returns the number of partitions moved.
pub async fn reconcile(
    channel_id: ChannelId,
    scratch_dir: &Path,
    output_dir: &Path,
    start_index: u32,
    media_marker: &str,
) -> Result<usize> {
    let partitions = list_partitions(scratch_dir, channel_id).await?;
    if partitions.is_empty() {
        warn!(channel_id = %channel_id, ?scratch_dir, "no partitions to reconcile");
        return Ok(0);
    }

    let mut next_index = start_index;
    let mut moved = 0;

    for partition in &partitions {
        let dest = output_dir.join(
            PartitionName::canonical(&partition.name.base, channel_id, next_index).file_name(),
        );

        match move_partition(partition, &dest, media_marker).await {
            Ok(rewritten) => {
                debug!(
                    channel_id = %channel_id,
                    from = ?partition.path,
                    to = ?dest,
                    media_paths = rewritten,
                    "partition reconciled"
                );
                next_index += 1;
                moved += 1;
            }
            Err(e) => {
                warn!(
                    channel_id = %channel_id,
                    path = ?partition.path,
                    error = %e,
                    "failed to reconcile partition, leaving it in scratch"
                );
            }
        }
    }

    info!(
        channel_id = %channel_id,
        moved,
        total = partitions.len(),
        first_part = start_index,
        "reconciled resumed partitions"
    );
    Ok(moved)
}

/// Rewrite one partition into `dest` and remove the scratch copy
///
/// The body is written to a temporary sibling of `dest` and renamed, so the
/// output directory never holds a half-written partition.
async fn move_partition(partition: &PartitionFile, dest: &Path, media_marker: &str) -> Result<usize> {
    let bytes = fs::read(&partition.path)
        .await
        .map_err(|e| unreadable(&partition.path, e.to_string()))?;
    let mut body: Value =
        serde_json::from_slice(&bytes).map_err(|e| unreadable(&partition.path, e.to_string()))?;

    let rewritten = normalize_media_paths(&mut body, media_marker);
    let serialized = serde_json::to_vec_pretty(&body)?;

    let temp = temp_path_for(dest);
    let move_failed = |reason: String| ExportError::MoveFailed {
        source_path: partition.path.clone(),
        dest_path: dest.to_path_buf(),
        reason,
    };

    fs::write(&temp, &serialized)
        .await
        .map_err(|e| move_failed(e.to_string()))?;
    if let Err(e) = fs::rename(&temp, dest).await {
        let _ = fs::remove_file(&temp).await;
        return Err(move_failed(e.to_string()).into());
    }

    if let Err(e) = fs::remove_file(&partition.path).await {
        // The output copy is complete; a leftover scratch file is cleared before the next export
        warn!(path = ?partition.path, error = %e, "failed to remove reconciled scratch partition");
    }

    Ok(rewritten)
}

fn unreadable(path: &Path, reason: String) -> ExportError {
    ExportError::PartitionUnreadable {
        path: path.to_path_buf(),
        reason,
    }
}

fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    dest.with_file_name(name)
}
