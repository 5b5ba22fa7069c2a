//! Trait for the chat platform client

use crate::error::PlatformError;
use crate::types::{Channel, ChannelId};
use async_trait::async_trait;

/// Read-only view of the chat platform used by discovery
///
/// Implementations never mutate platform state. Access failures are reported
/// as [`PlatformError::Forbidden`] / [`PlatformError::NotFound`] so callers can
/// skip the id instead of aborting.
///
/// # Examples
///
/// ```no_run
/// use discord_archiver::config::PlatformConfig;
/// use discord_archiver::platform::{DiscordClient, PlatformClient};
/// use discord_archiver::types::ChannelId;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = DiscordClient::new("token", &PlatformConfig::default())?;
/// let me = client.wait_until_ready().await?;
/// let channel = client.fetch_channel(ChannelId(1234)).await?;
/// println!("{} can see {}", me, channel.display_path());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Authenticate and return a display name for the logged-in account
    async fn wait_until_ready(&self) -> Result<String, PlatformError>;

    /// Fetch a single channel, thread or category by id
    async fn fetch_channel(&self, id: ChannelId) -> Result<Channel, PlatformError>;

    /// Direct children of a category, in display order
    async fn category_children(&self, category: &Channel) -> Result<Vec<Channel>, PlatformError>;

    /// Every archived thread of a text or forum channel (all pages)
    async fn archived_threads(&self, channel: &Channel) -> Result<Vec<Channel>, PlatformError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
