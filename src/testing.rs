//! Shared test helpers: an in-memory platform, a scripted exporter and partition fixtures.

use crate::error::PlatformError;
use crate::exporter::{ExportRequest, ExportStatus, Exporter};
use crate::platform::PlatformClient;
use crate::types::{Channel, ChannelId, ChannelKind, MessageId};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// In-memory [`PlatformClient`] built with chained `with_*` calls
#[derive(Default)]
pub(crate) struct FakePlatform {
    channels: HashMap<ChannelId, Channel>,
    children: HashMap<ChannelId, Vec<ChannelId>>,
    threads: HashMap<ChannelId, Vec<ChannelId>>,
    forbidden: HashSet<ChannelId>,
    failing_threads: HashSet<ChannelId>,
    ready_delay: Option<Duration>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.insert(channel.id, channel);
        self
    }

    pub(crate) fn with_category(
        mut self,
        id: u64,
        name: &str,
        children: &[(u64, ChannelKind, &str)],
    ) -> Self {
        let mut category = Channel::new(id, ChannelKind::Category, name);
        category.guild_id = Some(1);
        self.channels.insert(category.id, category);

        let mut child_ids = Vec::new();
        for (child_id, kind, child_name) in children {
            let mut child = Channel::new(*child_id, *kind, *child_name);
            child.guild_id = Some(1);
            child.parent_id = Some(ChannelId(id));
            child.parent_path = Some(name.to_string());
            child_ids.push(child.id);
            self.channels.insert(child.id, child);
        }
        self.children.insert(ChannelId(id), child_ids);
        self
    }

    pub(crate) fn with_thread(mut self, id: u64, parent: u64, name: &str) -> Self {
        let mut thread = Channel::new(id, ChannelKind::Thread, name);
        thread.parent_id = Some(ChannelId(parent));
        self.channels.insert(thread.id, thread);
        self
    }

    pub(crate) fn with_archived_threads(mut self, parent: u64, ids: &[u64]) -> Self {
        for &id in ids {
            if !self.channels.contains_key(&ChannelId(id)) {
                self = self.with_thread(id, parent, &format!("thread-{}", id));
            }
            self.threads
                .entry(ChannelId(parent))
                .or_default()
                .push(ChannelId(id));
        }
        self
    }

    pub(crate) fn with_forbidden(mut self, id: u64) -> Self {
        self.forbidden.insert(ChannelId(id));
        self
    }

    pub(crate) fn with_failing_threads(mut self, parent: u64) -> Self {
        self.failing_threads.insert(ChannelId(parent));
        self
    }

    pub(crate) fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = Some(delay);
        self
    }

    fn get(&self, id: ChannelId) -> Result<Channel, PlatformError> {
        if self.forbidden.contains(&id) {
            return Err(PlatformError::Forbidden { id });
        }
        self.channels
            .get(&id)
            .cloned()
            .ok_or(PlatformError::NotFound { id })
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn wait_until_ready(&self) -> Result<String, PlatformError> {
        if let Some(delay) = self.ready_delay {
            tokio::time::sleep(delay).await;
        }
        Ok("fake-user".to_string())
    }

    async fn fetch_channel(&self, id: ChannelId) -> Result<Channel, PlatformError> {
        self.get(id)
    }

    async fn category_children(&self, category: &Channel) -> Result<Vec<Channel>, PlatformError> {
        self.children
            .get(&category.id)
            .map(|ids| ids.iter().filter_map(|id| self.get(*id).ok()).collect())
            .ok_or(PlatformError::NotFound { id: category.id })
    }

    async fn archived_threads(&self, channel: &Channel) -> Result<Vec<Channel>, PlatformError> {
        if self.failing_threads.contains(&channel.id) {
            return Err(PlatformError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(self
            .threads
            .get(&channel.id)
            .map(|ids| ids.iter().filter_map(|id| self.get(*id).ok()).collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// In-process [`Exporter`] that records requests and writes partitions into the request's output dir
pub(crate) struct ScriptedExporter {
    parts: Vec<Vec<u64>>,
    code: Option<i32>,
    requests: Mutex<Vec<ExportRequest>>,
    pub(crate) cancel_after_run: Option<CancellationToken>,
}

impl ScriptedExporter {
    pub(crate) fn new(parts: &[&[u64]], code: i32) -> Self {
        Self {
            parts: parts.iter().map(|p| p.to_vec()).collect(),
            code: Some(code),
            requests: Mutex::new(Vec::new()),
            cancel_after_run: None,
        }
    }

    pub(crate) fn requests(&self) -> Vec<ExportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exporter for ScriptedExporter {
    async fn run(&self, request: &ExportRequest) -> crate::Result<ExportStatus> {
        self.requests.lock().unwrap().push(request.clone());
        for (index, ids) in self.parts.iter().enumerate() {
            let name = if index == 0 {
                format!("G - Cat - chan [{}].json", request.channel_id)
            } else {
                format!("G - Cat - chan [{}] [part {}].json", request.channel_id, index + 1)
            };
            write_partition(&request.output_dir, &name, ids);
        }
        if let Some(token) = &self.cancel_after_run {
            token.cancel();
        }
        Ok(ExportStatus { code: self.code })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Write an exporter-style partition body whose messages carry `message_ids`
pub(crate) fn write_partition(dir: &Path, file_name: &str, message_ids: &[u64]) -> PathBuf {
    let messages: Vec<_> = message_ids
        .iter()
        .map(|id| {
            json!({
                "id": id.to_string(),
                "content": format!("message {}", id),
                "attachments": [
                    {"url": format!("/home/user/export/media/{}.png", id)}
                ]
            })
        })
        .collect();
    let body = json!({
        "guild": {"id": "1", "name": "Guild"},
        "channel": {"id": "2", "name": "general"},
        "messages": messages,
        "messageCount": message_ids.len(),
    });

    let path = dir.join(file_name);
    std::fs::write(&path, serde_json::to_vec_pretty(&body).unwrap()).unwrap();
    path
}

/// Channel snapshot used by orchestrator tests
pub(crate) fn text_channel(id: u64, last_message_id: Option<u64>) -> Channel {
    let mut channel = Channel::new(id, ChannelKind::TextChannel, format!("channel-{}", id));
    channel.parent_path = Some("Cat".to_string());
    channel.last_message_id = last_message_id.map(MessageId);
    channel
}

/// Write an executable `/bin/sh` script with the given body
#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(format!("fake-exporter-{}.sh", rand::random::<u32>()));
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Fake exporter that writes one partition per entry of `parts` and exits with `exit_code`
///
/// Partitions are named like the real exporter names them, the first one
/// without a part clause. Every invocation appends
/// `<channel> <after|none> <output>` to the returned log file.
#[cfg(unix)]
pub(crate) fn write_fake_exporter(dir: &Path, parts: &[&[u64]], exit_code: i32) -> (PathBuf, PathBuf) {
    let log = dir.join("invocations.log");
    let mut body = format!(
        r#"out=""; channel=""; after=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --channel) channel="$2"; shift 2 ;;
    --after) after="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "$channel ${{after:-none}} $out" >> "{log}"
echo "Exporting channel $channel"
echo "media download warning" 1>&2
"#,
        log = log.display()
    );

    for (index, ids) in parts.iter().enumerate() {
        let messages: Vec<String> = ids
            .iter()
            .map(|id| {
                format!(
                    r#"{{"id":"{id}","content":"m{id}","attachments":[{{"url":"/tmp/run/output/tmp/media/{id}.png"}}]}}"#
                )
            })
            .collect();
        let json = format!(r#"{{"messages":[{}]}}"#, messages.join(","));
        let clause = if index == 0 {
            String::new()
        } else {
            format!(" [part {}]", index + 1)
        };
        body.push_str(&format!(
            "printf '%s' '{json}' > \"$out/Guild - Cat - chan [$channel]{clause}.json\"\n"
        ));
    }
    body.push_str(&format!("exit {}\n", exit_code));

    (write_script(dir, &body), log)
}

/// Lines appended to a fake exporter's invocation log
pub(crate) fn read_invocations(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
