//! Local worker process speaking one JSON object per line.
//!
//! The worker is half-duplex and stateful: each request line is answered by
//! exactly one response line. [`WorkerPort`] holds both pipe ends behind one
//! mutex so a write and its matching read always happen together.
//!
//! ```text
//! → {"messages":[...],"max_new_tokens":256,"temperature":0.6}
//! ← {"content":"..."}            or   {"error":"..."}
//! → {"cmd":"shutdown"}           (on drop)
//! ```

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::client::RoleplayProvider;
use crate::error::LlmError;
use crate::prompt::{ROLEPLAY_SYSTEM, build_messages};
use crate::repair::normalize_reply;
use crate::types::{ChatTurn, RoleplayPayload, RoleplayReply};

/// Line asking the worker to exit.
pub const SHUTDOWN_LINE: &str = r#"{"cmd":"shutdown"}"#;

// ---------------------------------------------------------------------------
// WorkerPort
// ---------------------------------------------------------------------------

/// Synchronous request/response port over a line-oriented channel.
///
/// At most one exchange is in flight; concurrent callers queue on the lock.
pub struct WorkerPort<W, R> {
    io: Mutex<(W, R)>,
}

impl<W: Write, R: BufRead> WorkerPort<W, R> {
    /// Wrap a writer and the reader carrying its answers.
    #[must_use]
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            io: Mutex::new((writer, reader)),
        }
    }

    /// Write `line` and block until one line comes back.
    ///
    /// The trailing newline is stripped from the answer.
    ///
    /// # Errors
    /// Returns an I/O error, or `LlmError::Worker` if the channel closed.
    pub fn exchange(&self, line: &str) -> Result<String, LlmError> {
        let mut guard = self.io.lock();
        let (writer, reader) = &mut *guard;

        writeln!(writer, "{line}")?;
        writer.flush()?;

        let mut answer = String::new();
        if reader.read_line(&mut answer)? == 0 {
            return Err(LlmError::Worker("worker closed its output".into()));
        }
        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Write `line` without waiting for an answer, unless an exchange holds
    /// the port. Returns whether the line was written.
    ///
    /// # Errors
    /// Returns an I/O error if the write fails.
    pub fn try_notify(&self, line: &str) -> Result<bool, LlmError> {
        let Some(mut guard) = self.io.try_lock() else {
            return Ok(false);
        };
        writeln!(guard.0, "{line}")?;
        guard.0.flush()?;
        Ok(true)
    }
}

/// Interpret one response line.
///
/// A blank line counts as `{}`. `content` is repaired like any other reply;
/// `error`, or a line with neither field, is a worker error.
///
/// # Errors
/// Returns `LlmError::Worker` when the worker reports or implies failure.
pub fn parse_worker_reply(line: &str) -> Result<RoleplayReply, LlmError> {
    let line = if line.trim().is_empty() { "{}" } else { line };
    let value: Value = serde_json::from_str(line)
        .map_err(|e| LlmError::Worker(format!("unreadable reply '{line}': {e}")))?;

    if let Some(content) = value.get("content").and_then(Value::as_str) {
        return Ok(RoleplayReply::from_value(normalize_reply(content)));
    }
    if let Some(error) = value.get("error") {
        let message = error.as_str().map_or_else(|| error.to_string(), str::to_string);
        return Err(LlmError::Worker(message));
    }
    Err(LlmError::Worker(format!("reply has no content: '{line}'")))
}

// ---------------------------------------------------------------------------
// LocalWorkerProvider
// ---------------------------------------------------------------------------

type BoxedPort = WorkerPort<Box<dyn Write + Send>, Box<dyn BufRead + Send>>;

/// Generation settings for the local worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// `max_new_tokens` sent with each request.
    pub max_new_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Trailing history messages sent with each request.
    pub history_max_messages: usize,
    /// System instruction.
    pub system_prompt: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.6,
            history_max_messages: 6,
            system_prompt: ROLEPLAY_SYSTEM.to_string(),
        }
    }
}

/// Roleplay provider backed by a persistent local worker.
pub struct LocalWorkerProvider {
    port: Arc<BoxedPort>,
    child: Option<Mutex<Child>>,
    options: WorkerOptions,
}

impl LocalWorkerProvider {
    /// Launch `program` with `args` and talk to it over its stdio.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started.
    pub fn spawn(program: &str, args: &[String], options: WorkerOptions) -> Result<Self, LlmError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LlmError::Worker("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LlmError::Worker("worker stdout unavailable".into()))?;

        info!(program, pid = child.id(), "Local worker started");
        let mut provider = Self::from_streams(Box::new(stdin), Box::new(BufReader::new(stdout)), options);
        provider.child = Some(Mutex::new(child));
        Ok(provider)
    }

    /// Use already-connected streams instead of a child process.
    #[must_use]
    pub fn from_streams(
        writer: Box<dyn Write + Send>,
        reader: Box<dyn BufRead + Send>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            port: Arc::new(WorkerPort::new(writer, reader)),
            child: None,
            options,
        }
    }

    /// Request line for one roleplay call.
    ///
    /// # Errors
    /// Returns `LlmError::ParseError` if the payload cannot be serialized.
    pub fn request_line(
        &self,
        payload: &RoleplayPayload,
        history: &[ChatTurn],
    ) -> Result<String, LlmError> {
        let messages = build_messages(
            &self.options.system_prompt,
            history,
            self.options.history_max_messages,
            payload,
        )?;
        Ok(json!({
            "messages": messages,
            "max_new_tokens": self.options.max_new_tokens,
            "temperature": self.options.temperature,
        })
        .to_string())
    }
}

#[async_trait]
impl RoleplayProvider for LocalWorkerProvider {
    async fn roleplay(
        &self,
        payload: &RoleplayPayload,
        history: &[ChatTurn],
    ) -> Result<RoleplayReply, LlmError> {
        let line = self.request_line(payload, history)?;
        let port = Arc::clone(&self.port);

        let answer = tokio::task::spawn_blocking(move || port.exchange(&line))
            .await
            .map_err(|e| LlmError::Worker(format!("exchange task failed: {e}")))??;
        debug!(bytes = answer.len(), "Local worker replied");

        parse_worker_reply(&answer)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

impl Drop for LocalWorkerProvider {
    fn drop(&mut self) {
        let Some(child) = self.child.take() else {
            return;
        };
        let mut child = child.into_inner();
        // A stuck exchange keeps the port locked; the kill below unblocks it.
        match self.port.try_notify(SHUTDOWN_LINE) {
            Ok(true) => {}
            Ok(false) => debug!("Worker busy, skipping shutdown line"),
            Err(e) => debug!(error = %e, "Worker shutdown line not delivered"),
        }
        if let Err(e) = child.kill() {
            debug!(error = %e, "Worker already exited");
        }
        if let Err(e) = child.wait() {
            warn!(error = %e, "Failed to reap local worker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn payload() -> RoleplayPayload {
        RoleplayPayload {
            npc: "Iris".into(),
            location: "library".into(),
            npc_emotion: "calm".into(),
            player_utterance: "hello".into(),
            facts: json!({}),
            facts_missing: Vec::new(),
        }
    }

    #[test]
    fn exchange_writes_then_reads_one_line() {
        let port = WorkerPort::new(Vec::new(), Cursor::new(b"first\nsecond\n".to_vec()));
        assert_eq!(port.exchange("a").expect("a"), "first");
        assert_eq!(port.exchange("b").expect("b"), "second");
        assert!(matches!(port.exchange("c"), Err(LlmError::Worker(_))));

        let (written, _) = port.io.into_inner();
        assert_eq!(String::from_utf8(written).expect("utf8"), "a\nb\nc\n");
    }

    #[test]
    fn concurrent_exchanges_never_interleave() {
        let replies: String = (0..32).map(|i| format!("reply-{i}\n")).collect();
        let port = Arc::new(WorkerPort::new(Vec::new(), Cursor::new(replies.into_bytes())));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let port = Arc::clone(&port);
                std::thread::spawn(move || {
                    (0..8)
                        .map(|i| port.exchange(&format!("req-{t}-{i}")).expect("exchange"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut answers: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread"))
            .collect();
        answers.sort();
        answers.dedup();
        assert_eq!(answers.len(), 32);

        let port = Arc::into_inner(port).expect("sole owner");
        let (written, _) = port.io.into_inner();
        let written = String::from_utf8(written).expect("utf8");
        assert_eq!(written.lines().count(), 32);
        assert!(written.lines().all(|l| l.starts_with("req-")));
    }

    #[test]
    fn try_notify_skips_a_busy_port() {
        let port = WorkerPort::new(Vec::new(), Cursor::new(Vec::new()));
        {
            let _held = port.io.lock();
            assert!(!port.try_notify(SHUTDOWN_LINE).expect("no write attempted"));
        }
        assert!(port.try_notify(SHUTDOWN_LINE).expect("write"));

        let (written, _) = port.io.into_inner();
        assert_eq!(String::from_utf8(written).expect("utf8"), format!("{SHUTDOWN_LINE}\n"));
    }

    #[test]
    fn worker_reply_shapes() {
        let ok = parse_worker_reply(r#"{"content":"{\"roleplay\":\"Quiet, please.\"}"}"#)
            .expect("content");
        assert_eq!(ok.roleplay(), Some("Quiet, please."));

        let prose = parse_worker_reply(r#"{"content":"Just prose."}"#).expect("prose");
        assert_eq!(prose.roleplay(), Some("Just prose."));

        assert!(matches!(
            parse_worker_reply(r#"{"error":"CUDA out of memory"}"#),
            Err(LlmError::Worker(m)) if m == "CUDA out of memory"
        ));
        assert!(matches!(parse_worker_reply(""), Err(LlmError::Worker(_))));
        assert!(matches!(parse_worker_reply("garbage"), Err(LlmError::Worker(_))));
    }

    #[tokio::test]
    async fn provider_over_streams() {
        let reader = Cursor::new(b"{\"content\":\"Welcome to the stacks.\"}\n".to_vec());
        let provider = LocalWorkerProvider::from_streams(
            Box::new(std::io::sink()),
            Box::new(reader),
            WorkerOptions::default(),
        );

        let line = provider.request_line(&payload(), &[]).expect("line");
        let request: Value = serde_json::from_str(&line).expect("json line");
        assert_eq!(request["max_new_tokens"], 256);
        assert_eq!(request["messages"][0]["role"], "system");
        assert!(!line.contains('\n'));

        let reply = provider.roleplay(&payload(), &[]).await.expect("reply");
        assert_eq!(reply.roleplay(), Some("Welcome to the stacks."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_worker_round_trip() {
        let script = r#"while read line; do echo '{"content":"Mind the gears."}'; done"#;
        let provider = LocalWorkerProvider::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            WorkerOptions::default(),
        )
        .expect("spawn sh");

        let reply = provider.roleplay(&payload(), &[]).await.expect("reply");
        assert_eq!(reply.roleplay(), Some("Mind the gears."));
        drop(provider);
    }

    #[cfg(unix)]
    #[test]
    fn drop_kills_a_worker_stuck_mid_exchange() {
        let provider = LocalWorkerProvider::spawn(
            "sh",
            &["-c".to_string(), "exec sleep 30".to_string()],
            WorkerOptions::default(),
        )
        .expect("spawn sh");

        let port = Arc::clone(&provider.port);
        let stuck = std::thread::spawn(move || port.exchange("{}"));
        while provider.port.io.try_lock().is_some() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        drop(provider);
        assert!(stuck.join().expect("exchange thread").is_err());
    }
}
