//! JSON-line client for mpv's `--input-ipc-server` socket.
//!
//! Every exchange opens a fresh connection: one command line out, at most one reply line
//! back. Asynchronous `event` lines mpv interleaves are skipped.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kiosk_core::player::PlayerError;
use log::{debug, trace};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct IpcTimings {
    /// How long a command keeps retrying while the socket is not there yet.
    pub command_deadline: Duration,
    /// How long to wait for the reply line once the command is written.
    pub reply_timeout: Duration,
    /// Retry budget for property queries.
    pub query_deadline: Duration,
    pub retry_backoff: Duration,
}

impl Default for IpcTimings {
    fn default() -> Self {
        Self {
            command_deadline: Duration::from_secs(2),
            reply_timeout: Duration::from_millis(200),
            query_deadline: Duration::from_millis(500),
            retry_backoff: Duration::from_millis(50),
        }
    }
}

pub struct MpvIpc {
    socket_path: PathBuf,
    timings: IpcTimings,
}

impl MpvIpc {
    pub fn new(socket_path: impl Into<PathBuf>, timings: IpcTimings) -> Self {
        Self { socket_path: socket_path.into(), timings }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn connect(&self, deadline: Instant) -> Result<UnixStream, PlayerError> {
        loop {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused) => {
                    if Instant::now() + self.timings.retry_backoff > deadline {
                        return Err(PlayerError::ChannelUnavailable);
                    }
                    tokio::time::sleep(self.timings.retry_backoff).await;
                }
                Err(e) => return Err(PlayerError::Io(e)),
            }
        }
    }

    /// Sends `command` and returns the reply line, or `None` when nothing came back in time.
    async fn exchange(&self, command: &Value, deadline: Duration) -> Result<Option<Value>, PlayerError> {
        let stream = self.connect(Instant::now() + deadline).await?;
        let (read, mut write) = stream.into_split();

        let mut line = json!({ "command": command }).to_string();
        trace!("mpv <- {}", line);
        line.push('\n');
        write.write_all(line.as_bytes()).await?;

        let mut lines = BufReader::new(read).lines();
        let reply_deadline = Instant::now() + self.timings.reply_timeout;
        loop {
            let next = match tokio::time::timeout_at(reply_deadline, lines.next_line()).await {
                Ok(next) => next,
                Err(_) => return Ok(None),
            };
            let text = match next {
                Ok(Some(text)) => text,
                Ok(None) => return Ok(None),
                Err(e) => {
                    debug!("mpv reply read failed: {}", e);
                    return Ok(None);
                }
            };
            trace!("mpv -> {}", text);
            let Ok(value) = serde_json::from_str::<Value>(&text) else { continue; };
            if value.get("event").is_some() {
                continue;
            }
            return Ok(Some(value));
        }
    }

    /// Fire-and-forget command. A missing reply counts as success; an explicit mpv error
    /// becomes [`PlayerError::Protocol`].
    pub async fn command(&self, command: Value) -> Result<(), PlayerError> {
        match self.exchange(&command, self.timings.command_deadline).await? {
            None => {
                debug!("No reply to mpv command {}", command);
                Ok(())
            }
            Some(reply) => check_reply(&reply),
        }
    }

    /// Reads a boolean property. Any failure reads as `None`.
    pub async fn get_bool_property(&self, name: &str) -> Option<bool> {
        let command = json!(["get_property", name]);
        match self.exchange(&command, self.timings.query_deadline).await {
            Ok(Some(reply)) if check_reply(&reply).is_ok() => reply.get("data").and_then(Value::as_bool),
            Ok(_) => None,
            Err(e) => {
                debug!("mpv property {} unavailable: {}", name, e);
                None
            }
        }
    }
}

fn check_reply(reply: &Value) -> Result<(), PlayerError> {
    match reply.get("error").and_then(Value::as_str) {
        None | Some("success") => Ok(()),
        Some(error) => Err(PlayerError::Protocol(error.to_string())),
    }
}
