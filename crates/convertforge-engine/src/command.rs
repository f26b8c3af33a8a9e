//! Supervised execution of external tools under a deadline.
//!
//! [`ToolCommand`] spawns one program, captures a bounded tail of its output,
//! and races process exit against the deadline. Whichever happens first
//! decides the [`ProcessOutcome`]; the loser is ignored. On timeout the whole
//! process group receives SIGTERM, then SIGKILL after the grace period. After
//! a normal exit the group is killed outright, so helpers forked by the tool
//! never outlive the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ConversionError, Result};
use crate::formats::ConversionJob;
use crate::settings::{SupervisorSettings, DEFAULT_CAPTURE_LIMIT, DEFAULT_KILL_GRACE};

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How long to wait for output pipes to close once the process is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The trailing part of an output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    tail: Vec<u8>,
    limit: usize,
    dropped: u64,
}

impl CapturedOutput {
    /// An empty capture retaining at most `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            tail: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Append a chunk, discarding the oldest bytes beyond the limit.
    pub fn push(&mut self, chunk: &[u8]) {
        self.tail.extend_from_slice(chunk);
        if self.tail.len() > self.limit {
            let excess = self.tail.len() - self.limit;
            self.tail.drain(..excess);
            self.dropped += excess as u64;
        }
    }

    /// Bytes discarded from the front of the stream.
    pub fn truncated_bytes(&self) -> u64 {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.tail.is_empty()
    }

    /// Lossy UTF-8 text, prefixed with a marker when bytes were dropped.
    pub fn text(&self) -> String {
        let body = String::from_utf8_lossy(&self.tail);
        if self.dropped > 0 {
            format!("[... {} bytes truncated ...]\n{}", self.dropped, body)
        } else {
            body.into_owned()
        }
    }
}

/// How a supervised run ended. Exactly one variant per run.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// The process exited before its deadline. `exit_code` is `None` when it
    /// was terminated by a signal.
    Completed {
        exit_code: Option<i32>,
        stdout: CapturedOutput,
        stderr: CapturedOutput,
    },
    /// The deadline passed first and the process group was terminated.
    TimedOut {
        budget: Duration,
        stderr: CapturedOutput,
    },
    /// The process could not be started, or could not be waited on.
    SpawnFailed { cause: String },
}

impl ProcessOutcome {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        matches!(
            self,
            ProcessOutcome::Completed {
                exit_code: Some(0),
                ..
            }
        )
    }

    /// Convert into the engine's error type, keeping stdout on success.
    ///
    /// # Errors
    ///
    /// - [`ConversionError::Spawn`] for [`ProcessOutcome::SpawnFailed`].
    /// - [`ConversionError::Timeout`] for [`ProcessOutcome::TimedOut`], with the
    ///   stderr tail as detail.
    /// - [`ConversionError::NonZeroExit`] for any exit other than code 0; the
    ///   detail is stderr, or stdout when stderr is empty.
    pub fn into_result(self, tool: &str) -> Result<CapturedOutput> {
        match self {
            ProcessOutcome::Completed {
                exit_code: Some(0),
                stdout,
                ..
            } => Ok(stdout),
            ProcessOutcome::Completed {
                exit_code,
                stdout,
                stderr,
            } => {
                let detail = if stderr.is_empty() {
                    stdout.text()
                } else {
                    stderr.text()
                };
                Err(ConversionError::NonZeroExit {
                    tool: tool.to_string(),
                    code: exit_code,
                    detail: detail.trim().to_string(),
                })
            }
            ProcessOutcome::TimedOut { budget, stderr } => Err(ConversionError::Timeout {
                tool: tool.to_string(),
                budget,
                detail: stderr.text().trim().to_string(),
            }),
            ProcessOutcome::SpawnFailed { cause } => Err(ConversionError::Spawn {
                tool: tool.to_string(),
                cause,
            }),
        }
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use convertforge_engine::ToolCommand;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// # async fn example() {
/// let outcome = ToolCommand::new(PathBuf::from("pandoc"))
///     .args(["notes.odt", "-o", "notes.docx"])
///     .timeout(Duration::from_secs(180))
///     .run()
///     .await;
/// assert!(outcome.success());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Duration,
    kill_grace: Duration,
    capture_limit: usize,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            envs: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Set the delay between SIGTERM and SIGKILL on timeout.
    pub fn kill_grace(&mut self, d: Duration) -> &mut Self {
        self.kill_grace = d;
        self
    }

    /// Set how many trailing bytes of each stream are kept.
    pub fn capture_limit(&mut self, bytes: usize) -> &mut Self {
        self.capture_limit = bytes;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Spawn the program and supervise it until exit or deadline.
    ///
    /// Never returns an error: every way a run can end is a
    /// [`ProcessOutcome`] variant.
    pub async fn run(&self) -> ProcessOutcome {
        let name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(tool = %name, error = %e, "failed to spawn");
                return ProcessOutcome::SpawnFailed {
                    cause: e.to_string(),
                };
            }
        };
        let pid = child.id();
        debug!(tool = %name, pid, args = ?self.args, timeout = ?self.timeout, "spawned");

        let stdout = spawn_capture(child.stdout.take(), self.capture_limit);
        let stderr = spawn_capture(child.stderr.take(), self.capture_limit);

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let exited = tokio::select! {
            biased;
            status = child.wait() => Some(status),
            _ = &mut deadline => None,
        };

        match exited {
            Some(Ok(status)) => {
                debug!(tool = %name, ?status, "exited");
                // Helpers the tool left running in its group go with it.
                if let Some(pid) = pid {
                    signal_group(pid, GroupSignal::Kill);
                }
                let (stdout, stderr) = tokio::join!(stdout.collect(), stderr.collect());
                ProcessOutcome::Completed {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                }
            }
            Some(Err(e)) => {
                warn!(tool = %name, error = %e, "failed waiting for process");
                self.terminate(&mut child, pid).await;
                ProcessOutcome::SpawnFailed {
                    cause: format!("failed waiting for process: {e}"),
                }
            }
            None => {
                warn!(tool = %name, pid, timeout = ?self.timeout, "deadline passed, terminating");
                self.terminate(&mut child, pid).await;
                ProcessOutcome::TimedOut {
                    budget: self.timeout,
                    stderr: stderr.collect().await,
                }
            }
        }
    }

    /// SIGTERM the process group, wait out the grace period, then SIGKILL.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) {
        if let Some(pid) = pid {
            signal_group(pid, GroupSignal::Terminate);
            let _ = tokio::time::timeout(self.kill_grace, child.wait()).await;
            signal_group(pid, GroupSignal::Kill);
        }
        let _ = child.kill().await;
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: GroupSignal) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        // ESRCH: the group is already gone.
        if e != Errno::ESRCH {
            warn!(pid, ?signal, error = %e, "failed to signal process group");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: GroupSignal) {}

/// A background reader filling a shared [`CapturedOutput`].
struct Capture {
    sink: Arc<Mutex<CapturedOutput>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    /// Wait briefly for the stream to hit EOF, then take what was read.
    async fn collect(self) -> CapturedOutput {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
                task.abort();
            }
        }
        let captured = self.sink.lock().clone();
        captured
    }
}

fn spawn_capture<R>(reader: Option<R>, limit: usize) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let sink = Arc::new(Mutex::new(CapturedOutput::with_limit(limit)));
    let task = reader.map(|mut reader| {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().push(&buf[..n]),
                }
            }
        })
    });
    Capture { sink, task }
}

/// Runs resolved conversion jobs with the configured limits.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
}

impl ProcessSupervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Execute a job. The enforced budget is the job's timeout, capped by
    /// `max_timeout` when one is configured.
    pub async fn run(&self, job: &ConversionJob) -> ProcessOutcome {
        let mut cmd = ToolCommand::new(job.command.clone());
        cmd.args(job.args.iter().cloned())
            .timeout(self.settings.effective_timeout(job.timeout))
            .kill_grace(self.settings.kill_grace)
            .capture_limit(self.settings.capture_limit);
        for (key, value) in &self.settings.env {
            cmd.env(key.as_str(), value.as_str());
        }
        cmd.run().await
    }
}
