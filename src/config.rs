//! Configuration types for discord-archiver

use crate::error::{Error, Result};
use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// A channel id as written in the config file
///
/// Ids are accepted both as JSON numbers and as decimal strings, since
/// snowflakes overflow JavaScript numbers and are usually quoted. Entries
/// that do not parse are reported and skipped by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigId {
    /// Numeric id
    Number(u64),
    /// Quoted id (may be malformed)
    Text(String),
}

impl ConfigId {
    /// Parse into a channel id, `None` if the entry is not an integer
    pub fn parse(&self) -> Option<ChannelId> {
        match self {
            ConfigId::Number(n) => Some(ChannelId(*n)),
            ConfigId::Text(s) => s.parse().ok(),
        }
    }
}

impl std::fmt::Display for ConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigId::Number(n) => write!(f, "{}", n),
            ConfigId::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<u64> for ConfigId {
    fn from(id: u64) -> Self {
        ConfigId::Number(id)
    }
}

/// Filesystem locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Canonical output directory for partition files (default: "output")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Scratch directory the exporter writes into when resuming (default: "output/tmp")
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Shared media directory handed to the exporter (default: "output/media")
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// Channel id cache file (default: "channel_cache.txt")
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            scratch_dir: default_scratch_dir(),
            media_dir: default_media_dir(),
            cache_path: default_cache_path(),
        }
    }
}

/// External exporter settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Path to the exporter executable (default: "dce/DiscordChatExporter.Cli")
    ///
    /// When the path does not exist, `DiscordChatExporter.Cli` is looked up on PATH.
    #[serde(default = "default_exporter_path")]
    pub path: PathBuf,

    /// Messages per partition file (default: 1000)
    #[serde(default = "default_partition_length")]
    pub partition_length: u32,

    /// Substring marking the start of the media-relative part of a path (default: "media/")
    #[serde(default = "default_media_marker")]
    pub media_marker: String,

    /// Extra arguments appended to every invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            path: default_exporter_path(),
            partition_length: default_partition_length(),
            media_marker: default_media_marker(),
            extra_args: Vec::new(),
        }
    }
}

/// Retry configuration for transient platform failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Chat platform connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// REST API base URL (default: "https://discord.com/api/v10")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// How long to wait for the connection to become ready (default: 30 seconds)
    #[serde(default = "default_ready_timeout", with = "duration_serde")]
    pub ready_timeout: Duration,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Send the token as a bot token (`Bot <token>`) rather than verbatim (default: true)
    #[serde(default = "default_true")]
    pub bot_token: bool,

    /// Retry policy for rate limits and transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            ready_timeout: default_ready_timeout(),
            request_timeout: default_request_timeout(),
            bot_token: true,
            retry: RetryConfig::default(),
        }
    }
}

/// Outer repeat schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Delay between whole-batch repetitions (None = run once)
    #[serde(default, with = "optional_duration_serde")]
    pub repeat_interval: Option<Duration>,

    /// Delay before retrying after a fatal discovery failure (default: 60 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            repeat_interval: None,
            retry_delay: default_retry_delay(),
        }
    }
}

/// Main configuration
///
/// Only `token` is required. The id lists drive discovery; the nested
/// sections all have working defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bot or user token used for both the platform client and the exporter
    pub token: String,

    /// Threads to always include
    #[serde(default)]
    pub threads: Vec<ConfigId>,

    /// Categories whose channels and archived threads are traversed
    #[serde(default)]
    pub categories: Vec<ConfigId>,

    /// Channels skipped during category traversal
    #[serde(default)]
    pub excluded_channels: Vec<ConfigId>,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Exporter settings
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Platform connection settings
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Repeat schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load and validate a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON config document
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content).map_err(|e| Error::Config {
            message: format!("invalid config: {}", e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that have no usable default
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::config("token", "token must not be empty"));
        }
        if self.exporter.partition_length == 0 {
            return Err(Error::config(
                "exporter.partition_length",
                "partition length must be at least 1",
            ));
        }
        if self.exporter.media_marker.is_empty() {
            return Err(Error::config(
                "exporter.media_marker",
                "media marker must not be empty",
            ));
        }

        // Scratch is emptied before every export
        let scratch = lexical_absolute(&self.paths.scratch_dir);
        for (name, dir) in [
            ("paths.output_dir", &self.paths.output_dir),
            ("paths.media_dir", &self.paths.media_dir),
        ] {
            if lexical_absolute(dir).starts_with(&scratch) {
                return Err(Error::config(
                    "paths.scratch_dir",
                    format!(
                        "scratch directory {} must not be or contain {} ({})",
                        self.paths.scratch_dir.display(),
                        name,
                        dir.display()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Create the output, scratch and media directories
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.paths.output_dir,
            &self.paths.scratch_dir,
            &self.paths.media_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Excluded channel ids, reporting entries that are not integers
    pub fn excluded_ids(&self) -> HashSet<ChannelId> {
        self.excluded_channels
            .iter()
            .filter_map(|entry| {
                let id = entry.parse();
                if id.is_none() {
                    warn!(entry = %entry, "invalid excluded channel id in config");
                }
                id
            })
            .collect()
    }
}

/// Absolute form of `path` without `.` components, without touching the filesystem
fn lexical_absolute(path: &Path) -> PathBuf {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("output/tmp")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("output/media")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("channel_cache.txt")
}

fn default_exporter_path() -> PathBuf {
    PathBuf::from("dce/DiscordChatExporter.Cli")
}

fn default_partition_length() -> u32 {
    1000
}

fn default_media_marker() -> String {
    "media/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
