//! Discord REST implementation of [`PlatformClient`]

use super::traits::PlatformClient;
use crate::config::{PlatformConfig, RetryConfig};
use crate::error::{Error, PlatformError, Result};
use crate::retry::with_retry;
use crate::types::{Channel, ChannelId, ChannelKind, MessageId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;

/// Page size for archived thread listing (platform maximum)
const ARCHIVED_THREADS_PAGE_SIZE: u32 = 100;

/// Longest response body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Upper bound on a server-requested rate limit wait
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// REST client for the Discord API
///
/// Parent channels and categories are memoized after the first lookup so
/// display paths cost one extra request per parent, not per child.
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: Url,
    authorization: String,
    retry: RetryConfig,
    known: Mutex<HashMap<ChannelId, Channel>>,
}

impl DiscordClient {
    /// Create a client for the given token
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `api_base` is not a valid URL or the
    /// HTTP client cannot be built.
    pub fn new(token: &str, config: &PlatformConfig) -> Result<Self> {
        let mut api_base = Url::parse(&config.api_base)
            .map_err(|e| Error::config("platform.api_base", format!("invalid URL: {}", e)))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!(
                "DiscordBot (https://github.com/discord-archiver, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        let authorization = if config.bot_token {
            format!("Bot {}", token)
        } else {
            token.to_string()
        };

        Ok(Self {
            http,
            api_base,
            authorization,
            retry: config.retry.clone(),
            known: Mutex::new(HashMap::new()),
        })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, PlatformError> {
        self.api_base
            .join(path)
            .map_err(|e| PlatformError::Decode(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        subject: Option<ChannelId>,
    ) -> std::result::Result<T, PlatformError> {
        with_retry(&self.retry, || self.get_once(url.clone(), subject)).await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: Url,
        subject: Option<ChannelId>,
    ) -> std::result::Result<T, PlatformError> {
        trace!(%url, "GET");
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            return serde_json::from_slice(&body).map_err(|e| PlatformError::Decode(e.to_string()));
        }

        let header_retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let body = response.text().await.unwrap_or_default();

        Err(classify_status(
            status.as_u16(),
            &body,
            header_retry_after,
            subject,
        ))
    }

    /// Bare channel snapshot, served from the memo when possible
    async fn lookup(&self, id: ChannelId) -> std::result::Result<Channel, PlatformError> {
        if let Some(channel) = self.known.lock().await.get(&id) {
            return Ok(channel.clone());
        }

        let raw: RawChannel = self
            .get_json(self.endpoint(&format!("channels/{}", id))?, Some(id))
            .await?;
        let channel = raw.into_channel(None);
        self.remember(&channel).await;
        Ok(channel)
    }

    async fn remember(&self, channel: &Channel) {
        let mut bare = channel.clone();
        bare.parent_path = None;
        self.known.lock().await.insert(bare.id, bare);
    }

    /// Display path of a channel's parent chain (category, or channel + category)
    async fn parent_path(&self, parent_id: Option<ChannelId>) -> Option<String> {
        let parent = match self.lookup(parent_id?).await {
            Ok(parent) => parent,
            Err(e) => {
                debug!(parent_id = ?parent_id, error = %e, "could not resolve parent name");
                return None;
            }
        };

        match parent.kind {
            ChannelKind::Category => Some(parent.name),
            ChannelKind::TextChannel
            | ChannelKind::ForumChannel
            | ChannelKind::Thread
            | ChannelKind::Other => {
                let grandparent = match parent.parent_id {
                    Some(id) => self.lookup(id).await.ok(),
                    None => None,
                };
                Some(match grandparent {
                    Some(category) => format!("{} / {}", category.name, parent.name),
                    None => parent.name,
                })
            }
        }
    }
}

#[async_trait]
impl PlatformClient for DiscordClient {
    async fn wait_until_ready(&self) -> std::result::Result<String, PlatformError> {
        let user: RawUser = self.get_json(self.endpoint("users/@me")?, None).await?;
        Ok(user.display_name())
    }

    async fn fetch_channel(&self, id: ChannelId) -> std::result::Result<Channel, PlatformError> {
        let raw: RawChannel = self
            .get_json(self.endpoint(&format!("channels/{}", id))?, Some(id))
            .await?;
        let mut channel = raw.into_channel(None);
        self.remember(&channel).await;

        channel.parent_path = self.parent_path(channel.parent_id).await;
        Ok(channel)
    }

    async fn category_children(
        &self,
        category: &Channel,
    ) -> std::result::Result<Vec<Channel>, PlatformError> {
        let guild_id = category.guild_id.ok_or_else(|| {
            PlatformError::Decode(format!("category {} has no guild", category.id))
        })?;

        let raw: Vec<RawChannel> = self
            .get_json(
                self.endpoint(&format!("guilds/{}/channels", guild_id))?,
                Some(category.id),
            )
            .await?;

        let mut children: Vec<RawChannel> = raw
            .into_iter()
            .filter(|c| c.parent_id == Some(category.id.get()))
            .collect();
        children.sort_by_key(|c| (c.position.unwrap_or(i64::MAX), c.id));

        let mut channels = Vec::with_capacity(children.len());
        for raw in children {
            let channel = raw.into_channel(Some(category.name.clone()));
            self.remember(&channel).await;
            channels.push(channel);
        }
        Ok(channels)
    }

    async fn archived_threads(
        &self,
        channel: &Channel,
    ) -> std::result::Result<Vec<Channel>, PlatformError> {
        let parent_path = channel.display_path();
        let mut threads = Vec::new();
        let mut before: Option<DateTime<Utc>> = None;

        loop {
            let mut url =
                self.endpoint(&format!("channels/{}/threads/archived/public", channel.id))?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &ARCHIVED_THREADS_PAGE_SIZE.to_string());
                if let Some(before) = before {
                    query.append_pair("before", &before.to_rfc3339());
                }
            }

            let page: ArchivedThreadsPage = self.get_json(url, Some(channel.id)).await?;
            let next_cursor = page
                .threads
                .last()
                .and_then(|t| t.thread_metadata.as_ref())
                .and_then(|m| m.archive_timestamp);
            let count = page.threads.len();

            threads.extend(
                page.threads
                    .into_iter()
                    .map(|raw| raw.into_channel(Some(parent_path.clone()))),
            );
            debug!(channel_id = %channel.id, page_size = count, total = threads.len(), "listed archived threads");

            match (page.has_more, next_cursor) {
                (true, Some(cursor)) if before != Some(cursor) => before = Some(cursor),
                _ => break,
            }
        }

        Ok(threads)
    }

    fn name(&self) -> &'static str {
        "discord-rest"
    }
}

fn classify_status(
    status: u16,
    body: &str,
    header_retry_after: Option<f64>,
    subject: Option<ChannelId>,
) -> PlatformError {
    match (status, subject) {
        (401, _) => PlatformError::Unauthorized,
        (403, Some(id)) => PlatformError::Forbidden { id },
        (404, Some(id)) => PlatformError::NotFound { id },
        (429, _) => {
            let secs = serde_json::from_str::<RateLimitBody>(body)
                .ok()
                .map(|b| b.retry_after)
                .or(header_retry_after)
                .unwrap_or(1.0);
            let retry_after = Duration::try_from_secs_f64(secs.max(0.0))
                .unwrap_or(MAX_RETRY_AFTER)
                .min(MAX_RETRY_AFTER);
            PlatformError::RateLimited { retry_after }
        }
        _ => {
            let mut body = body.to_string();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            PlatformError::Status { status, body }
        }
    }
}

/// Discord channel type codes
fn kind_from_code(code: u8) -> ChannelKind {
    match code {
        0 | 5 => ChannelKind::TextChannel,
        4 => ChannelKind::Category,
        10..=12 => ChannelKind::Thread,
        15 | 16 => ChannelKind::ForumChannel,
        _ => ChannelKind::Other,
    }
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(with = "snowflake")]
    id: u64,
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

impl RawUser {
    fn display_name(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" && !d.is_empty() => format!("{}#{} ({})", self.username, d, self.id),
            _ => format!("{} ({})", self.username, self.id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    #[serde(with = "snowflake")]
    id: u64,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, with = "snowflake::option")]
    guild_id: Option<u64>,
    #[serde(default, with = "snowflake::option")]
    parent_id: Option<u64>,
    #[serde(default, with = "snowflake::option")]
    last_message_id: Option<u64>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    thread_metadata: Option<RawThreadMetadata>,
}

impl RawChannel {
    fn into_channel(self, parent_path: Option<String>) -> Channel {
        Channel {
            id: ChannelId(self.id),
            kind: kind_from_code(self.kind),
            name: self.name.unwrap_or_default(),
            guild_id: self.guild_id,
            parent_id: self.parent_id.map(ChannelId),
            parent_path,
            last_message_id: self.last_message_id.map(MessageId),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawThreadMetadata {
    #[serde(default)]
    archive_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ArchivedThreadsPage {
    #[serde(default)]
    threads: Vec<RawChannel>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Snowflakes arrive as decimal strings; numbers are accepted too
mod snowflake {
    use serde::{Deserialize, Deserializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    fn from_repr<E: Error>(repr: Repr) -> Result<u64, E> {
        match repr {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s
                .parse()
                .map_err(|_| E::custom(format!("invalid snowflake {:?}", s))),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        from_repr(Repr::deserialize(deserializer)?)
    }

    pub mod option {
        use super::{Repr, from_repr};
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<Repr>::deserialize(deserializer)? {
                Some(repr) => from_repr(repr).map(Some),
                None => Ok(None),
            }
        }
    }
}
