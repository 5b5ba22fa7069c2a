//! Channel discovery
//!
//! Merges three sources into one deduplicated, ordered channel list:
//!
//! 1. ids from the [`ChannelIdCache`]
//! 2. threads listed explicitly in the config
//! 3. text channels of configured categories, plus every archived thread of
//!    their text and forum channels
//!
//! The first occurrence of an id wins and later sources never revisit it.
//! Lost access, deleted objects and misconfigured ids are logged and skipped;
//! no fetch error escapes [`discover`]. Only reading or writing the cache
//! file can fail the call.

use crate::cache::ChannelIdCache;
use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::platform::PlatformClient;
use crate::types::{Channel, ChannelId, ChannelKind};
use std::collections::HashSet;
use tracing::{info, warn};

/// Ordered channel collection with id-based deduplication
#[derive(Debug, Default)]
struct Discovered {
    channels: Vec<Channel>,
    seen: HashSet<ChannelId>,
}

impl Discovered {
    fn contains(&self, id: ChannelId) -> bool {
        self.seen.contains(&id)
    }

    fn push(&mut self, channel: Channel) -> bool {
        if self.seen.insert(channel.id) {
            self.channels.push(channel);
            true
        } else {
            false
        }
    }
}

/// Discover every channel to export and update the cache
///
/// Returns channels in source-precedence order. The cache is rewritten with
/// the union of its previous contents and every id discovered here.
pub async fn discover(
    client: &dyn PlatformClient,
    config: &Config,
    cache: &ChannelIdCache,
) -> Result<Vec<Channel>> {
    let mut found = Discovered::default();

    add_cached(client, cache, &mut found).await?;
    add_configured_threads(client, config, &mut found).await;
    add_categories(client, config, &mut found).await;

    let ids: Vec<ChannelId> = found.channels.iter().map(|c| c.id).collect();
    cache.merge_and_save(&ids).await?;

    info!(count = found.channels.len(), "discovery complete");
    Ok(found.channels)
}

async fn add_cached(
    client: &dyn PlatformClient,
    cache: &ChannelIdCache,
    found: &mut Discovered,
) -> Result<()> {
    for id in cache.load().await? {
        if found.contains(id) {
            continue;
        }

        let channel = match client.fetch_channel(id).await {
            Ok(channel) => channel,
            Err(e) => {
                log_skip(id, "cached channel", &e);
                continue;
            }
        };

        match channel.kind {
            ChannelKind::Thread => {
                info!(channel_id = %id, path = %channel.display_path(), "added cached thread");
            }
            ChannelKind::TextChannel | ChannelKind::ForumChannel => {
                info!(channel_id = %id, path = %channel.display_path(), kind = %channel.kind, "added cached channel");
            }
            ChannelKind::Category | ChannelKind::Other => {
                warn!(channel_id = %id, kind = %channel.kind, "cached id is not a channel or thread, skipping");
                continue;
            }
        }
        found.push(channel);
    }
    Ok(())
}

async fn add_configured_threads(
    client: &dyn PlatformClient,
    config: &Config,
    found: &mut Discovered,
) {
    for entry in &config.threads {
        let Some(id) = entry.parse() else {
            warn!(entry = %entry, "invalid thread id in config");
            continue;
        };
        if found.contains(id) {
            continue;
        }

        let thread = match client.fetch_channel(id).await {
            Ok(thread) => thread,
            Err(e) => {
                log_skip(id, "thread", &e);
                continue;
            }
        };

        match thread.kind {
            ChannelKind::Thread => {
                info!(channel_id = %id, path = %thread.display_path(), "added thread");
                found.push(thread);
            }
            ChannelKind::Category
            | ChannelKind::TextChannel
            | ChannelKind::ForumChannel
            | ChannelKind::Other => {
                warn!(channel_id = %id, kind = %thread.kind, "configured id is not a thread");
            }
        }
    }
}

async fn add_categories(client: &dyn PlatformClient, config: &Config, found: &mut Discovered) {
    let excluded = config.excluded_ids();

    for entry in &config.categories {
        let Some(id) = entry.parse() else {
            warn!(entry = %entry, "invalid category id in config");
            continue;
        };

        let category = match client.fetch_channel(id).await {
            Ok(category) => category,
            Err(e) => {
                log_skip(id, "category", &e);
                continue;
            }
        };

        match category.kind {
            ChannelKind::Category => {
                if let Err(e) = add_category(client, &category, &excluded, found).await {
                    warn!(channel_id = %id, name = %category.name, error = %e, "stopped traversing category");
                }
            }
            ChannelKind::TextChannel | ChannelKind::ForumChannel | ChannelKind::Thread => {
                warn!(channel_id = %id, name = %category.display_path(), kind = %category.kind, "configured id is not a category");
            }
            ChannelKind::Other => {
                warn!(channel_id = %id, "configured id is not a category");
            }
        }
    }
}

/// Traverse one category; an error aborts this category only
async fn add_category(
    client: &dyn PlatformClient,
    category: &Channel,
    excluded: &HashSet<ChannelId>,
    found: &mut Discovered,
) -> std::result::Result<(), PlatformError> {
    for channel in client.category_children(category).await? {
        if excluded.contains(&channel.id) {
            info!(channel_id = %channel.id, path = %channel.display_path(), "skipped excluded channel");
            continue;
        }
        if found.contains(channel.id) {
            continue;
        }

        match channel.kind {
            ChannelKind::TextChannel => {
                info!(channel_id = %channel.id, path = %channel.display_path(), "added channel");
                found.push(channel.clone());
            }
            ChannelKind::ForumChannel => {}
            ChannelKind::Category | ChannelKind::Thread | ChannelKind::Other => continue,
        }

        if channel.kind.has_threads() {
            add_archived_threads(client, &channel, found).await?;
        }
    }
    Ok(())
}

async fn add_archived_threads(
    client: &dyn PlatformClient,
    channel: &Channel,
    found: &mut Discovered,
) -> std::result::Result<(), PlatformError> {
    let threads = match client.archived_threads(channel).await {
        Ok(threads) => threads,
        Err(e) if e.is_access_error() => {
            log_skip(channel.id, "archived threads of", &e);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for thread in threads {
        let id = thread.id;
        let path = thread.display_path();
        if found.push(thread) {
            info!(channel_id = %id, path = %path, parent = %channel.display_path(), "found archived thread");
        }
    }
    Ok(())
}

fn log_skip(id: ChannelId, what: &str, error: &PlatformError) {
    if error.is_access_error() {
        warn!(channel_id = %id, error = %error, "no access to {} {}, skipping", what, id);
    } else {
        warn!(channel_id = %id, error = %error, "failed to fetch {} {}, skipping", what, id);
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigId;
    use crate::testing::FakePlatform;
    use tempfile::tempdir;

    fn config_with(
        threads: &[u64],
        categories: &[u64],
        excluded: &[u64],
    ) -> Config {
        let ids = |v: &[u64]| -> Vec<ConfigId> { v.iter().map(|&id| ConfigId::from(id)).collect() };
        Config {
            token: "t".to_string(),
            threads: ids(threads),
            categories: ids(categories),
            excluded_channels: ids(excluded),
            ..Default::default()
        }
    }

    fn ids(channels: &[Channel]) -> Vec<u64> {
        channels.iter().map(|c| c.id.get()).collect()
    }

    #[tokio::test]
    async fn single_category_with_one_text_channel() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        let platform = FakePlatform::new()
            .with_category(100, "Cat", &[(101, ChannelKind::TextChannel, "general")]);

        let channels = discover(&platform, &config_with(&[], &[100], &[]), &cache)
            .await
            .unwrap();

        assert_eq!(ids(&channels), vec![101]);
        assert_eq!(cache.load().await.unwrap(), vec![ChannelId(101)]);
    }

    #[tokio::test]
    async fn sources_are_merged_in_precedence_order_without_duplicates() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        cache.save(&[ChannelId(101), ChannelId(300)]).await.unwrap();

        let platform = FakePlatform::new()
            .with_category(
                100,
                "Cat",
                &[
                    (101, ChannelKind::TextChannel, "general"),
                    (102, ChannelKind::TextChannel, "random"),
                ],
            )
            .with_thread(300, 101, "pinned thread")
            .with_archived_threads(101, &[300, 301])
            .with_archived_threads(102, &[302]);

        let channels = discover(&platform, &config_with(&[300, 301], &[100], &[]), &cache)
            .await
            .unwrap();

        assert_eq!(ids(&channels), vec![101, 300, 301, 102, 302]);
        let unique: HashSet<_> = channels.iter().map(|c| c.id).collect();
        assert_eq!(unique.len(), channels.len());
    }

    #[tokio::test]
    async fn inaccessible_cached_ids_are_skipped_but_kept_in_cache() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        cache.save(&[ChannelId(1), ChannelId(2)]).await.unwrap();

        let platform = FakePlatform::new()
            .with_channel(Channel::new(1u64, ChannelKind::TextChannel, "alive"))
            .with_forbidden(2);

        let channels = discover(&platform, &config_with(&[], &[], &[]), &cache)
            .await
            .unwrap();

        assert_eq!(ids(&channels), vec![1]);
        let stored = cache.load().await.unwrap();
        assert!(stored.contains(&ChannelId(1)));
        assert!(stored.contains(&ChannelId(2)), "cache never forgets ids");
    }

    #[tokio::test]
    async fn configured_non_thread_is_discarded() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        let platform =
            FakePlatform::new().with_channel(Channel::new(5u64, ChannelKind::TextChannel, "chan"));

        let channels = discover(&platform, &config_with(&[5], &[], &[]), &cache)
            .await
            .unwrap();

        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn invalid_and_missing_config_ids_are_skipped() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        let platform = FakePlatform::new().with_thread(7, 1, "t");
        let mut config = config_with(&[404, 7], &[], &[]);
        config.threads.insert(0, ConfigId::Text("abc".into()));

        let channels = discover(&platform, &config, &cache).await.unwrap();

        assert_eq!(ids(&channels), vec![7]);
    }

    #[tokio::test]
    async fn non_category_config_entry_is_skipped() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        let platform =
            FakePlatform::new().with_channel(Channel::new(9u64, ChannelKind::TextChannel, "oops"));

        let channels = discover(&platform, &config_with(&[], &[9], &[]), &cache)
            .await
            .unwrap();

        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn excluded_channels_and_their_threads_are_skipped() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        let platform = FakePlatform::new()
            .with_category(
                100,
                "Cat",
                &[
                    (101, ChannelKind::TextChannel, "keep"),
                    (102, ChannelKind::TextChannel, "drop"),
                ],
            )
            .with_archived_threads(102, &[500]);

        let channels = discover(&platform, &config_with(&[], &[100], &[102]), &cache)
            .await
            .unwrap();

        assert_eq!(ids(&channels), vec![101]);
    }

    #[tokio::test]
    async fn forum_contributes_threads_but_not_itself() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        let platform = FakePlatform::new()
            .with_category(
                100,
                "Cat",
                &[
                    (110, ChannelKind::ForumChannel, "forum"),
                    (120, ChannelKind::Other, "voice"),
                ],
            )
            .with_archived_threads(110, &[111, 112]);

        let channels = discover(&platform, &config_with(&[], &[100], &[]), &cache)
            .await
            .unwrap();

        assert_eq!(ids(&channels), vec![111, 112]);
        assert!(channels.iter().all(|c| c.kind == ChannelKind::Thread));
    }

    #[tokio::test]
    async fn failing_category_does_not_abort_other_categories() {
        let temp = tempdir().unwrap();
        let cache = ChannelIdCache::new(temp.path().join("cache.txt"));
        let platform = FakePlatform::new()
            .with_category(100, "Broken", &[(101, ChannelKind::TextChannel, "a")])
            .with_category(200, "Fine", &[(201, ChannelKind::TextChannel, "b")])
            .with_failing_threads(101);

        let channels = discover(&platform, &config_with(&[], &[100, 200], &[]), &cache)
            .await
            .unwrap();

        assert_eq!(ids(&channels), vec![101, 201]);
    }
}
