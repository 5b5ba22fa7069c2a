//! CLI-based exporter using the external DiscordChatExporter binary

use super::traits::{ExportRequest, ExportStatus, Exporter};
use crate::config::Config;
use crate::types::ChannelId;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Binary name searched for in PATH when the configured path is unusable
const EXPORTER_BINARY: &str = "DiscordChatExporter.Cli";

/// Exporter that runs DiscordChatExporter's CLI as a child process
///
/// Output is JSON partitioned every `partition_length` messages, with media
/// downloaded into a shared, deduplicated media directory. The child's
/// stdout and stderr are streamed into the log line by line while it runs,
/// and the child is killed if the export future is dropped.
///
/// # Examples
///
/// ```no_run
/// use discord_archiver::exporter::{CliExporter, ExportRequest, Exporter};
/// use discord_archiver::ChannelId;
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let exporter = CliExporter::new(PathBuf::from("dce/DiscordChatExporter.Cli"), "token");
/// let status = exporter
///     .run(&ExportRequest::fresh(ChannelId(123), "output"))
///     .await?;
/// println!("exporter succeeded: {}", status.success());
/// # Ok(())
/// # }
/// ```
pub struct CliExporter {
    binary_path: PathBuf,
    token: String,
    partition_length: u32,
    media_dir: PathBuf,
    extra_args: Vec<String>,
}

impl CliExporter {
    /// Create an exporter with an explicit binary path and default options
    pub fn new(binary_path: PathBuf, token: impl Into<String>) -> Self {
        Self {
            binary_path,
            token: token.into(),
            partition_length: 1000,
            media_dir: PathBuf::from("output/media"),
            extra_args: Vec::new(),
        }
    }

    /// Create an exporter from configuration
    ///
    /// Uses the configured binary path when it resolves to an executable,
    /// otherwise searches PATH for `DiscordChatExporter.Cli`.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let binary_path = which::which(&config.exporter.path)
            .or_else(|_| which::which(EXPORTER_BINARY))
            .map_err(|e| {
                crate::Error::ExternalTool(format!(
                    "exporter not found at {} or in PATH: {}",
                    config.exporter.path.display(),
                    e
                ))
            })?;

        debug!(binary = ?binary_path, "using exporter binary");

        Ok(Self {
            binary_path,
            token: config.token.clone(),
            partition_length: config.exporter.partition_length,
            media_dir: config.paths.media_dir.clone(),
            extra_args: config.exporter.extra_args.clone(),
        })
    }

    /// Set the number of messages per partition file
    pub fn with_partition_length(mut self, partition_length: u32) -> Self {
        self.partition_length = partition_length;
        self
    }

    /// Set the shared media directory
    pub fn with_media_dir(mut self, media_dir: impl Into<PathBuf>) -> Self {
        self.media_dir = media_dir.into();
        self
    }

    /// Append extra arguments to every invocation
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Command-line arguments for one export
    pub fn build_args(&self, request: &ExportRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "export".into(),
            "--output".into(),
            request.output_dir.clone().into(),
            "--media".into(),
            "--reuse-media".into(),
            "--media-dir".into(),
            self.media_dir.clone().into(),
            "--markdown".into(),
            "False".into(),
            "--format".into(),
            "Json".into(),
            "--partition".into(),
            self.partition_length.to_string().into(),
            "--channel".into(),
            request.channel_id.to_string().into(),
            "--token".into(),
            self.token.clone().into(),
        ];

        if let Some(after) = request.after {
            args.push("--after".into());
            args.push(after.to_string().into());
        }

        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// Arguments as they are logged, with the token masked
    fn redacted_args(&self, request: &ExportRequest) -> String {
        self.build_args(request)
            .iter()
            .map(|arg| {
                if arg.to_str() == Some(self.token.as_str()) {
                    "***".to_string()
                } else {
                    arg.to_string_lossy().into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Exporter for CliExporter {
    async fn run(&self, request: &ExportRequest) -> crate::Result<ExportStatus> {
        debug!(
            binary = ?self.binary_path,
            args = %self.redacted_args(request),
            "starting exporter"
        );

        let mut child = Command::new(&self.binary_path)
            .args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                crate::Error::ExternalTool(format!(
                    "Failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both pipes are drained while waiting so neither can fill up and stall the child
        let (status, (), ()) = tokio::join!(
            child.wait(),
            forward_lines(stdout, request.channel_id, OutputStream::Stdout),
            forward_lines(stderr, request.channel_id, OutputStream::Stderr),
        );

        let status = status.map_err(|e| {
            crate::Error::ExternalTool(format!("Failed to wait for exporter: {}", e))
        })?;

        Ok(ExportStatus {
            code: status.code(),
        })
    }

    fn name(&self) -> &'static str {
        "cli-dce"
    }
}

#[derive(Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Log each line the exporter writes as it arrives
async fn forward_lines<R>(reader: Option<R>, channel_id: ChannelId, stream: OutputStream)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                match stream {
                    OutputStream::Stdout => {
                        info!(target: "exporter", channel_id = %channel_id, "{}", line)
                    }
                    OutputStream::Stderr => {
                        warn!(target: "exporter", channel_id = %channel_id, "{}", line)
                    }
                }
            }
            Err(e) => {
                debug!(channel_id = %channel_id, error = %e, "exporter output stream closed");
                break;
            }
        }
    }
}
