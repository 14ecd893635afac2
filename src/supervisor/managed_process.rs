//! Supervised Process - direct process spawning with stdio capture
//!
//! The supervisor owns the server process through this handle:
//! - Line-by-line stdout/stderr capture forwarded to the host console sink
//! - stdin command injection
//! - Log level parsing from the server's log prefix
//! - Exit tracking through a watch channel, forced termination on request

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use super::state_machine::{ProcessState, StateMachine};
use crate::error::{ManagerError, Result};
use crate::host::ConsoleSink;

/// Maximum number of console lines kept per process.
const DEFAULT_LOG_BUFFER: usize = 5_000;

/// How long the waiter lets readers and the sink catch up after exit.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Impostor logs through Serilog: `[12:34:56 INF] message`.
pub const IMPOSTOR_LOG_PATTERN: &str = r"^\[\d{2}:\d{2}:\d{2} (?P<level>VRB|DBG|INF|WRN|ERR|FTL)\]";

// ─── Log Types ───────────────────────────────────────────────

/// A single line of console output from the supervised process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleLine {
    /// Sequential per-process ID
    pub id: u64,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    pub source: LogSource,
    pub content: String,
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
    /// Lifecycle messages from the supervisor itself
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

/// Exit status once the process is gone. `code` is `None` when the process
/// was terminated by a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

// ─── Log Buffer ──────────────────────────────────────────────

/// Ring buffer that stores recent console lines with sequential IDs.
struct LogBuffer {
    lines: VecDeque<ConsoleLine>,
    next_id: u64,
    max_size: usize,
}

impl LogBuffer {
    fn with_capacity(max_size: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_size.min(1024)),
            next_id: 0,
            max_size,
        }
    }

    fn push(&mut self, source: LogSource, content: String, level: LogLevel) -> ConsoleLine {
        let line = ConsoleLine {
            id: self.next_id,
            timestamp: current_timestamp(),
            source,
            content,
            level,
        };
        self.next_id += 1;

        if self.lines.len() >= self.max_size {
            self.lines.pop_front();
        }
        self.lines.push_back(line.clone());
        line
    }

    fn get_since(&self, since_id: u64) -> Vec<ConsoleLine> {
        self.lines.iter().filter(|l| l.id > since_id).cloned().collect()
    }

    fn get_recent(&self, count: usize) -> Vec<ConsoleLine> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(skip).cloned().collect()
    }
}

/// Fan-out for one captured line: ring buffer, live subscribers and the
/// host sink. Never waits on the sink.
#[derive(Clone)]
struct LinePipeline {
    buffer: Arc<Mutex<LogBuffer>>,
    live: broadcast::Sender<ConsoleLine>,
    forward: Option<mpsc::UnboundedSender<ConsoleLine>>,
}

impl LinePipeline {
    async fn publish(&self, source: LogSource, content: String, level: LogLevel) {
        let line = self.buffer.lock().await.push(source, content, level);
        let _ = self.live.send(line.clone());
        if let Some(forward) = &self.forward {
            let _ = forward.send(line);
        }
    }
}

// ─── Supervised Process ──────────────────────────────────────

type KillReply = oneshot::Sender<std::io::Result<()>>;

/// Handle to the running server. Dropping it does not kill the process.
pub struct SupervisedProcess {
    server_id: String,
    pid: u32,
    stdin_tx: Option<mpsc::Sender<String>>,
    pipeline: LinePipeline,
    state: Arc<std::sync::Mutex<StateMachine>>,
    /// Set as soon as the child is reaped.
    status_rx: watch::Receiver<Option<ExitInfo>>,
    /// Set once the console output has been drained as well.
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    kill_tx: std::sync::Mutex<Option<oneshot::Sender<KillReply>>>,
}

impl std::fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("server_id", &self.server_id)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl SupervisedProcess {
    /// Spawn `program` with no arguments in `working_dir`.
    ///
    /// With `embed_console`, stdin/stdout/stderr are piped: output lines are
    /// buffered and forwarded to `sink` as they arrive (strict order per
    /// stream, no ordering between streams), and stdin accepts commands.
    pub async fn spawn(
        server_id: &str,
        program: &Path,
        working_dir: &Path,
        embed_console: bool,
        sink: Option<Arc<dyn ConsoleSink>>,
        log_pattern: Option<Arc<Regex>>,
    ) -> Result<Self> {
        let mut cmd = TokioCommand::new(program);
        cmd.current_dir(working_dir).kill_on_drop(false);
        if embed_console {
            cmd.stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped());
        }
        crate::utils::apply_creation_flags(&mut cmd, embed_console);

        let mut child = cmd.spawn().map_err(|e| ManagerError::Spawn {
            program: program.to_path_buf(),
            message: e.to_string(),
        })?;

        let Some(pid) = child.id() else {
            let _ = child.start_kill();
            return Err(ManagerError::Spawn {
                program: program.to_path_buf(),
                message: "process exited before its PID could be read".to_string(),
            });
        };

        let (live_tx, _) = broadcast::channel::<ConsoleLine>(1024);
        let (status_tx, status_rx) = watch::channel::<Option<ExitInfo>>(None);
        let (exit_tx, exit_rx) = watch::channel::<Option<ExitInfo>>(None);
        let (kill_tx, kill_rx) = oneshot::channel::<KillReply>();

        let mut machine = StateMachine::new();
        let _ = machine.transition(ProcessState::Running);
        let state = Arc::new(std::sync::Mutex::new(machine));

        // ── host sink forwarder ──────────────────────────────
        let (forward, forwarder) = match (embed_console, sink) {
            (true, Some(sink)) => {
                let (tx, mut rx) = mpsc::unbounded_channel::<ConsoleLine>();
                let id = server_id.to_string();
                let handle = tokio::spawn(async move {
                    while let Some(line) = rx.recv().await {
                        sink.push_line(&id, &line);
                    }
                });
                (Some(tx), Some(handle))
            }
            _ => (None, None),
        };

        let pipeline = LinePipeline {
            buffer: Arc::new(Mutex::new(LogBuffer::with_capacity(DEFAULT_LOG_BUFFER))),
            live: live_tx,
            forward,
        };

        // ── stdout / stderr readers ──────────────────────────
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, LogSource::Stdout, pipeline.clone(), log_pattern.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, LogSource::Stderr, pipeline.clone(), log_pattern.clone()));
        }

        // ── stdin writer ─────────────────────────────────────
        let stdin_tx = child.stdin.take().map(|mut stdin| {
            let (tx, mut rx) = mpsc::channel::<String>(256);
            tokio::spawn(async move {
                while let Some(cmd) = rx.recv().await {
                    let data = if cmd.ends_with('\n') { cmd } else { format!("{}\n", cmd) };
                    if stdin.write_all(data.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
                        break;
                    }
                }
            });
            tx
        });

        pipeline
            .publish(LogSource::System, format!("Process started with PID {}", pid), LogLevel::Info)
            .await;

        // ── process waiter ───────────────────────────────────
        {
            let pipeline = pipeline.clone();
            let state = state.clone();
            let mut kill_rx = kill_rx;
            tokio::spawn(async move {
                let status = tokio::select! {
                    status = child.wait() => status,
                    Ok(reply) = &mut kill_rx => {
                        let _ = reply.send(child.start_kill());
                        child.wait().await
                    }
                };

                let (exit, message) = match status {
                    Ok(status) => (ExitInfo { code: status.code() }, format!("Process exited with {}", status)),
                    Err(e) => (ExitInfo::default(), format!("Failed to wait for process: {}", e)),
                };
                tracing::info!("[pid {}] {}", pid, message);

                {
                    let mut machine = state.lock().unwrap_or_else(|e| e.into_inner());
                    let _ = machine.transition(ProcessState::Exited);
                }
                let _ = status_tx.send(Some(exit));

                let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
                    for reader in readers {
                        let _ = reader.await;
                    }
                })
                .await;
                pipeline.publish(LogSource::System, message, LogLevel::Info).await;
                drop(pipeline);
                if let Some(forwarder) = forwarder {
                    let _ = tokio::time::timeout(DRAIN_TIMEOUT, forwarder).await;
                }
                let _ = exit_tx.send(Some(exit));
            });
        }

        Ok(Self {
            server_id: server_id.to_string(),
            pid,
            stdin_tx,
            // the forwarder stops once the readers and the waiter are done
            pipeline: LinePipeline { forward: None, ..pipeline },
            state,
            status_rx,
            exit_rx,
            kill_tx: std::sync::Mutex::new(Some(kill_tx)),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn state(&self) -> ProcessState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn is_running(&self) -> bool {
        self.status_rx.borrow().is_none()
    }

    /// Exit status, once the process has exited. Trailing console lines may
    /// still be in flight; use [`wait`](Self::wait) to also drain them.
    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.status_rx.borrow()
    }

    /// Wait until the process exits and its console output is delivered.
    pub async fn wait(&self) -> ExitInfo {
        wait_published(self.exit_rx.clone()).await
    }

    /// Wait until the process has been reaped, without waiting for output.
    pub(crate) async fn wait_exited(&self) -> ExitInfo {
        wait_published(self.status_rx.clone()).await
    }

    /// Send one line to the process's stdin (console embedding only).
    pub async fn send_command(&self, command: &str) -> Result<()> {
        let tx = self
            .stdin_tx
            .as_ref()
            .ok_or_else(|| ManagerError::Io("stdin is not redirected for this process".to_string()))?;
        tx.send(command.to_string())
            .await
            .map_err(|e| ManagerError::Io(format!("stdin channel closed: {}", e)))
    }

    pub async fn output_since(&self, since_id: u64) -> Vec<ConsoleLine> {
        self.pipeline.buffer.lock().await.get_since(since_id)
    }

    pub async fn recent_output(&self, count: usize) -> Vec<ConsoleLine> {
        self.pipeline.buffer.lock().await.get_recent(count)
    }

    /// Subscribe to lines captured from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleLine> {
        self.pipeline.live.subscribe()
    }

    /// Running → Stopping. No-op in any other state.
    pub(crate) fn begin_stop(&self) {
        let mut machine = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if machine.state == ProcessState::Running {
            let _ = machine.transition(ProcessState::Stopping);
        }
    }

    /// Forcefully terminate the process and wait for it to be reaped.
    pub async fn force_kill(&self) -> Result<ExitInfo> {
        let kill_tx = self.kill_tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        if let Some(kill_tx) = kill_tx {
            let (reply_tx, reply_rx) = oneshot::channel();
            // a closed channel means the waiter already reaped the child
            if kill_tx.send(reply_tx).is_ok() {
                if let Ok(Err(e)) = reply_rx.await {
                    if let Some(exit) = self.exit_info() {
                        return Ok(exit);
                    }
                    return Err(ManagerError::Terminate {
                        pid: self.pid,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(self.wait().await)
    }
}

async fn wait_published(mut rx: watch::Receiver<Option<ExitInfo>>) -> ExitInfo {
    let exit = match rx.wait_for(Option::is_some).await {
        Ok(value) => *value,
        Err(_) => None,
    };
    exit.unwrap_or_default()
}

/// Reads until EOF. Lines that are not valid UTF-8 (the server writes in
/// the console code page) are decoded lossily rather than ending the read,
/// since a closed pipe would break the server's next write.
fn spawn_reader<R>(stream: R, source: LogSource, pipeline: LinePipeline, pattern: Option<Arc<Regex>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("{:?} reader stopped: {}", source, e);
                    break;
                }
            }
            let line = String::from_utf8_lossy(trim_line_ending(&raw)).into_owned();
            let level = parse_log_level(&line, pattern.as_deref());
            // stderr lines default to at least Warn
            let level = match (source, level) {
                (LogSource::Stderr, LogLevel::Info) => LogLevel::Warn,
                (_, level) => level,
            };
            tracing::debug!(target: "server_console", "{:?}: {}", source, line);
            pipeline.publish(source, line, level).await;
        }
    })
}

// ─── Helpers ─────────────────────────────────────────────────

fn trim_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Parse the log level from a server log line using an optional regex with a
/// named `level` group. Without a pattern (or without a match) → Info.
pub fn parse_log_level(line: &str, pattern: Option<&Regex>) -> LogLevel {
    let Some(level) = pattern.and_then(|re| re.captures(line)).and_then(|caps| caps.name("level")) else {
        return LogLevel::Info;
    };
    match level.as_str().to_uppercase().as_str() {
        "ERR" | "ERROR" | "FTL" | "FATAL" => LogLevel::Error,
        "WRN" | "WARN" | "WARNING" => LogLevel::Warn,
        "DBG" | "DEBUG" | "VRB" | "TRACE" => LogLevel::Debug,
        _ => LogLevel::Info,
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ─── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_push_and_query() {
        let mut buffer = LogBuffer::with_capacity(DEFAULT_LOG_BUFFER);
        buffer.push(LogSource::Stdout, "line 0".into(), LogLevel::Info);
        buffer.push(LogSource::Stdout, "line 1".into(), LogLevel::Info);
        buffer.push(LogSource::Stderr, "err 0".into(), LogLevel::Error);

        assert_eq!(buffer.get_since(0).len(), 2);
        assert_eq!(buffer.get_recent(2).len(), 2);
        assert_eq!(buffer.get_recent(2)[1].content, "err 0");
        assert_eq!(buffer.get_recent(100).len(), 3);
    }

    #[test]
    fn log_buffer_evicts_oldest() {
        let mut buffer = LogBuffer::with_capacity(10);
        for i in 0..25 {
            buffer.push(LogSource::Stdout, format!("line {}", i), LogLevel::Info);
        }
        assert_eq!(buffer.lines.len(), 10);
        assert_eq!(buffer.lines.front().map(|l| l.id), Some(15));
    }

    #[test]
    fn line_endings_are_trimmed() {
        assert_eq!(trim_line_ending(b"ready\r\n"), b"ready");
        assert_eq!(trim_line_ending(b"ready\n"), b"ready");
        assert_eq!(trim_line_ending(b"partial"), b"partial");
        assert_eq!(trim_line_ending(b"\n"), b"");
    }

    #[tokio::test]
    async fn reader_survives_invalid_utf8() {
        let (tx, _) = broadcast::channel(16);
        let pipeline = LinePipeline {
            buffer: Arc::new(Mutex::new(LogBuffer::with_capacity(16))),
            live: tx,
            forward: None,
        };
        let input: &[u8] = b"caf\xe9\r\n\xff\nafter\nno newline";

        spawn_reader(input, LogSource::Stdout, pipeline.clone(), None).await.unwrap();

        let lines: Vec<String> = pipeline.buffer.lock().await.get_recent(10).into_iter().map(|l| l.content).collect();
        assert_eq!(lines, vec!["caf\u{fffd}", "\u{fffd}", "after", "no newline"]);
    }

    #[test]
    fn impostor_log_levels() {
        let re = Regex::new(IMPOSTOR_LOG_PATTERN).unwrap();
        assert_eq!(parse_log_level("[12:00:00 INF] Matchmaker is listening on 0.0.0.0:22023", Some(&re)), LogLevel::Info);
        assert_eq!(parse_log_level("[12:00:00 WRN] Client sent invalid packet", Some(&re)), LogLevel::Warn);
        assert_eq!(parse_log_level("[12:00:00 ERR] Exception caught in client data handler", Some(&re)), LogLevel::Error);
        assert_eq!(parse_log_level("[12:00:00 FTL] Host terminated unexpectedly", Some(&re)), LogLevel::Error);
        assert_eq!(parse_log_level("[12:00:00 DBG] Loading plugins", Some(&re)), LogLevel::Debug);
        assert_eq!(parse_log_level("   at Impostor.Server.Program.Main()", Some(&re)), LogLevel::Info);
        assert_eq!(parse_log_level("[12:00:00 ERR] x", None), LogLevel::Info);
    }
}
