//! Persisted channel id cache
//!
//! The cache is a newline-delimited list of decimal channel ids. It seeds
//! discovery and accumulates every id discovered by a run. Discovery is its
//! only writer.
//!
//! Write-back always unions the stored ids with the newly discovered ones,
//! so the cache never shrinks across runs unless the file is removed by hand.
//! Every write goes to a sibling temporary file that is then renamed over the
//! cache, so a crash mid-write leaves the previous contents intact.

use crate::error::Result;
use crate::types::ChannelId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Handle to the channel id cache file
#[derive(Clone, Debug)]
pub struct ChannelIdCache {
    path: PathBuf,
}

impl ChannelIdCache {
    /// Create a cache handle for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load cached ids in file order with duplicates removed
    ///
    /// A missing file is an empty cache. Lines that are not integers are
    /// reported and skipped.
    pub async fn load(&self) -> Result<Vec<ChannelId>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = ?self.path, "channel cache is empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let ids = parse_ids(&content);
        debug!(path = ?self.path, count = ids.len(), "loaded channel cache");
        Ok(ids)
    }

    /// Overwrite the cache with exactly `ids`
    pub async fn save(&self, ids: &[ChannelId]) -> Result<()> {
        let mut content = String::with_capacity(ids.len() * 20);
        for id in ids {
            content.push_str(&id.to_string());
            content.push('\n');
        }

        let tmp_path = temp_path_for(&self.path);
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&tmp_path, content.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            fs::remove_file(&tmp_path).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    /// Union the stored ids with `discovered` and write the result back
    ///
    /// Stored ids keep their position; new ids are appended in the order given.
    /// Returns the full set that was written.
    pub async fn merge_and_save(&self, discovered: &[ChannelId]) -> Result<Vec<ChannelId>> {
        let mut merged = self.load().await?;
        let mut seen: HashSet<ChannelId> = merged.iter().copied().collect();

        for id in discovered {
            if seen.insert(*id) {
                merged.push(*id);
            }
        }

        self.save(&merged).await?;
        info!(path = ?self.path, count = merged.len(), "saved channel cache");
        Ok(merged)
    }
}

fn parse_ids(content: &str) -> Vec<ChannelId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<ChannelId>() {
            Ok(id) => {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            Err(_) => {
                warn!(line = line_no + 1, value = line, "ignoring invalid channel cache entry");
            }
        }
    }

    ids
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_is_empty_cache() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("channel_cache.txt"));

        assert!(cache.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_skips_blank_and_invalid_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("cache.txt");
        std::fs::write(&path, "10\n\n20\nnope\n10\n 30 \n").unwrap();

        let ids = ChannelIdCache::new(&path).load().await.unwrap();

        assert_eq!(ids, vec![ChannelId(10), ChannelId(20), ChannelId(30)]);
    }

    #[tokio::test]
    async fn save_writes_newline_delimited_ids() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("cache.txt");
        let cache = ChannelIdCache::new(&path);

        cache.save(&[ChannelId(1), ChannelId(2)]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2\n");
        assert!(!temp_path_for(&path).exists(), "temp file must be renamed away");
    }

    #[tokio::test]
    async fn merge_never_drops_previous_ids() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        cache.save(&[ChannelId(1), ChannelId(2)]).await.unwrap();

        let merged = cache
            .merge_and_save(&[ChannelId(3), ChannelId(2)])
            .await
            .unwrap();

        assert_eq!(merged, vec![ChannelId(1), ChannelId(2), ChannelId(3)]);
        assert_eq!(cache.load().await.unwrap(), merged);
    }

    #[tokio::test]
    async fn merge_into_missing_cache_creates_it() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("nested/cache.txt"));

        let merged = cache.merge_and_save(&[ChannelId(5)]).await.unwrap();

        assert_eq!(merged, vec![ChannelId(5)]);
        assert_eq!(cache.load().await.unwrap(), vec![ChannelId(5)]);
    }

    #[test]
    fn temp_path_is_a_sibling() {
        let tmp = temp_path_for(Path::new("/data/channel_cache.txt"));
        assert_eq!(tmp, PathBuf::from("/data/channel_cache.txt.tmp"));
    }
}
