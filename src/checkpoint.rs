//! Resume checkpoints derived from a channel's partitions on disk
//!
//! The exporter writes partitions sequentially, so only the highest-numbered
//! file (the tail) can be torn by a crash. Everything up to the
//! second-highest file (the anchor) is treated as durable. Resuming deletes
//! the tail and re-exports everything after the anchor's last message.

use crate::partition::{last_message_id, list_partitions};
use crate::types::{ChannelId, MessageId};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where an interrupted or previous export can continue from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeCheckpoint {
    /// Last message id of the anchor partition
    pub last_confirmed_message_id: MessageId,
    /// Part number the first re-exported partition takes (the tail's number)
    pub next_part_index: u32,
    /// Partitions to remove before re-exporting (the tail)
    pub files_to_delete: Vec<PathBuf>,
}

/// Determine whether `channel_id` can resume from its partitions in `output_dir`
///
/// Fewer than two partitions, or an anchor whose body can't be read or has
/// no messages, means a fresh export.
pub async fn locate(channel_id: ChannelId, output_dir: &Path) -> Option<ResumeCheckpoint> {
    let partitions = match list_partitions(output_dir, channel_id).await {
        Ok(partitions) => partitions,
        Err(e) => {
            warn!(channel_id = %channel_id, error = %e, "failed to list partitions, exporting fresh");
            return None;
        }
    };

    let [.., anchor, tail] = partitions.as_slice() else {
        debug!(
            channel_id = %channel_id,
            count = partitions.len(),
            "not enough partitions to resume"
        );
        return None;
    };

    let last_confirmed_message_id = match last_message_id(&anchor.path).await {
        Ok(id) => id,
        Err(e) => {
            warn!(
                channel_id = %channel_id,
                anchor = ?anchor.path,
                error = %e,
                "anchor partition unusable, exporting fresh"
            );
            return None;
        }
    };

    debug!(
        channel_id = %channel_id,
        anchor = anchor.part(),
        tail = tail.part(),
        last_confirmed = %last_confirmed_message_id,
        "resume checkpoint located"
    );

    Some(ResumeCheckpoint {
        last_confirmed_message_id,
        next_part_index: tail.part(),
        files_to_delete: vec![tail.path.clone()],
    })
}

/// Last message id in the highest-numbered partition, used for freshness checks
///
/// Any failure reads as "unknown" so the channel gets exported.
pub async fn latest_message_id(channel_id: ChannelId, output_dir: &Path) -> Option<MessageId> {
    let partitions = list_partitions(output_dir, channel_id).await.ok()?;
    let latest = partitions.last()?;

    match last_message_id(&latest.path).await {
        Ok(id) => Some(id),
        Err(e) => {
            debug!(channel_id = %channel_id, path = ?latest.path, error = %e, "latest partition unreadable");
            None
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_partition;
    use tempfile::tempdir;

    const ID: ChannelId = ChannelId(42);

    #[tokio::test]
    async fn no_partitions_means_fresh() {
        let temp = tempdir().unwrap();
        assert_eq!(locate(ID, temp.path()).await, None);
        assert_eq!(latest_message_id(ID, temp.path()).await, None);
    }

    #[tokio::test]
    async fn single_partition_is_never_resumed() {
        let temp = tempdir().unwrap();
        write_partition(temp.path(), "g - c [42].json", &[1, 2, 3]);

        assert_eq!(locate(ID, temp.path()).await, None);
        assert_eq!(latest_message_id(ID, temp.path()).await, Some(MessageId(3)));
    }

    #[tokio::test]
    async fn resumes_after_anchor_and_replaces_tail() {
        let temp = tempdir().unwrap();
        write_partition(temp.path(), "g - c [42] [part 1].json", &[1, 2]);
        write_partition(temp.path(), "g - c [42] [part 2].json", &[3, 4]);
        let tail = write_partition(temp.path(), "g - c [42] [part 3].json", &[5]);

        let checkpoint = locate(ID, temp.path()).await.unwrap();

        assert_eq!(checkpoint.last_confirmed_message_id, MessageId(4));
        assert_eq!(checkpoint.next_part_index, 3);
        assert_eq!(checkpoint.files_to_delete, vec![tail]);
    }

    #[tokio::test]
    async fn unnumbered_first_partition_counts_as_part_one() {
        let temp = tempdir().unwrap();
        write_partition(temp.path(), "g - c [42].json", &[7, 8]);
        write_partition(temp.path(), "g - c [42] [part 2].json", &[9]);

        let checkpoint = locate(ID, temp.path()).await.unwrap();

        assert_eq!(checkpoint.last_confirmed_message_id, MessageId(8));
        assert_eq!(checkpoint.next_part_index, 2);
    }

    #[tokio::test]
    async fn numeric_ordering_picks_correct_anchor() {
        let temp = tempdir().unwrap();
        write_partition(temp.path(), "c [42] [part 9].json", &[90]);
        write_partition(temp.path(), "c [42] [part 10].json", &[100]);
        write_partition(temp.path(), "c [42] [part 2].json", &[20]);

        let checkpoint = locate(ID, temp.path()).await.unwrap();

        assert_eq!(checkpoint.last_confirmed_message_id, MessageId(90));
        assert_eq!(checkpoint.next_part_index, 10);
        assert_eq!(latest_message_id(ID, temp.path()).await, Some(MessageId(100)));
    }

    #[tokio::test]
    async fn unusable_anchor_means_fresh() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("c [42] [part 1].json"), r#"{"messages": []}"#).unwrap();
        write_partition(temp.path(), "c [42] [part 2].json", &[5]);
        assert_eq!(locate(ID, temp.path()).await, None);

        std::fs::write(temp.path().join("c [42] [part 1].json"), "{\"messages\": [").unwrap();
        assert_eq!(locate(ID, temp.path()).await, None);
    }

    #[tokio::test]
    async fn torn_tail_does_not_block_resume() {
        let temp = tempdir().unwrap();
        write_partition(temp.path(), "c [42] [part 1].json", &[1, 2]);
        std::fs::write(temp.path().join("c [42] [part 2].json"), "{\"messages\": [{\"id\"").unwrap();

        let checkpoint = locate(ID, temp.path()).await.unwrap();

        assert_eq!(checkpoint.last_confirmed_message_id, MessageId(2));
        assert_eq!(latest_message_id(ID, temp.path()).await, None);
    }

    #[tokio::test]
    async fn other_channels_are_ignored() {
        let temp = tempdir().unwrap();
        write_partition(temp.path(), "c [43] [part 1].json", &[1]);
        write_partition(temp.path(), "c [43] [part 2].json", &[2]);
        write_partition(temp.path(), "c [42] [part 1].json", &[3]);

        assert_eq!(locate(ID, temp.path()).await, None);
    }
}
