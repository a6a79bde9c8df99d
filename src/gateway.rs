//! Command Gateway
//!
//! Runs a caller-supplied command line on the host, restricted to a closed
//! set of read-only network diagnostic binaries.
//!
//! # Security Model
//!
//! 1. **Allowlist**: the first whitespace-delimited token must equal one of the
//!    allowed program names exactly. No prefix, path, or pattern matching.
//! 2. **No shell**: tokens become a literal argv. Quotes, pipes, `;`, `&&`,
//!    `$(...)` and friends are passed to the program as plain text.
//! 3. **Deadline**: every child is killed once the gateway deadline expires.
//! 4. **Cancellation**: the child is killed when the calling future is dropped,
//!    e.g. when the HTTP client goes away.
//! 5. **Output Limits**: captured output is capped per stream.

use std::collections::BTreeSet;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Programs reachable through the gateway unless configured otherwise
pub const DEFAULT_ALLOWED_COMMANDS: [&str; 6] =
    ["curl", "wget", "dig", "nslookup", "ping", "traceroute"];

/// Maximum bytes captured per output stream (4 MB)
const MAX_STREAM_BYTES: usize = 4 * 1024 * 1024;

/// How long to keep draining pipes after the child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const OUTPUT_TRUNCATED: &str = "output truncated: pipes held open after exit";

/// Rejections that happen before anything is spawned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("missing cmd parameter")]
    MissingCommand,

    #[error("empty command")]
    EmptyCommand,

    #[error("command not allowed: {0}")]
    NotAllowed(String),
}

/// Closed set of program names the gateway may execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCommandSet {
    commands: BTreeSet<String>,
}

impl AllowedCommandSet {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact match only
    pub fn contains(&self, program: &str) -> bool {
        self.commands.contains(program)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }
}

impl Default for AllowedCommandSet {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_COMMANDS)
    }
}

/// A command line that passed the allowlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    program: String,
    args: Vec<String>,
}

impl CommandRequest {
    /// Tokenize `raw` on whitespace and check the program against `allowed`.
    pub fn parse(raw: &str, allowed: &AllowedCommandSet) -> Result<Self, GatewayError> {
        if raw.is_empty() {
            return Err(GatewayError::MissingCommand);
        }

        let mut tokens = raw.split_whitespace().map(str::to_string);
        let program = tokens.next().ok_or(GatewayError::EmptyCommand)?;

        if !allowed.contains(&program) {
            return Err(GatewayError::NotAllowed(program));
        }

        Ok(Self {
            program,
            args: tokens.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Captured output of one gateway run
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    /// Stdout followed by stderr
    pub output: Vec<u8>,
    /// Set when the child failed to start, exited non-zero, or hit the deadline
    pub error: Option<String>,
    /// Wall time from spawn to collection
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Allowlisted, shell-less command runner
#[derive(Debug)]
pub struct CommandGateway {
    allowed: AllowedCommandSet,
    timeout: Duration,
    spawned: AtomicU64,
    running: AtomicUsize,
}

impl CommandGateway {
    pub fn new(allowed: AllowedCommandSet, timeout: Duration) -> Self {
        Self {
            allowed,
            timeout,
            spawned: AtomicU64::new(0),
            running: AtomicUsize::new(0),
        }
    }

    pub fn allowed(&self) -> &AllowedCommandSet {
        &self.allowed
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Total children spawned since construction
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Children currently alive
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Validate a raw command line without running it
    pub fn check(&self, raw: &str) -> Result<CommandRequest, GatewayError> {
        let result = CommandRequest::parse(raw, &self.allowed);
        match &result {
            Err(GatewayError::NotAllowed(program)) => {
                warn!(program = %program, "exec blocked: command not allowed");
            }
            Err(e) => debug!(reason = %e, "exec rejected"),
            Ok(_) => {}
        }
        result
    }

    /// Run an already validated request.
    ///
    /// Process failure is reported in [`CommandResult::error`], never as an
    /// `Err`. Dropping the returned future kills the child.
    pub async fn run(&self, request: &CommandRequest) -> CommandResult {
        let start = Instant::now();

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %request.program, error = %e, "exec failed to start");
                return CommandResult {
                    output: Vec::new(),
                    error: Some(format!("failed to start {}: {}", request.program, e)),
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        };

        self.spawned.fetch_add(1, Ordering::SeqCst);
        let _running = RunningGuard::enter(&self.running);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut out = Vec::new();
        let mut err = Vec::new();

        let (mut error, drained) = {
            let exit = async {
                tokio::select! {
                    status = child.wait() => match status {
                        Ok(status) => describe_exit(status),
                        Err(e) => Some(format!("failed to wait for {}: {}", request.program, e)),
                    },
                    _ = tokio::time::sleep(self.timeout) => {
                        if let Err(e) = child.kill().await {
                            warn!(program = %request.program, error = %e, "failed to kill timed out child");
                        }
                        warn!(program = %request.program, timeout_secs = self.timeout.as_secs(), "exec timed out");
                        Some(format!("command timed out after {}s", self.timeout.as_secs()))
                    }
                }
            };
            let drain = async {
                tokio::join!(read_capped(stdout, &mut out), read_capped(stderr, &mut err));
            };
            tokio::pin!(exit, drain);

            // Pipes are read while the child runs and for DRAIN_GRACE after it exits
            let mut exited: Option<Option<String>> = None;
            let drained = loop {
                tokio::select! {
                    _ = &mut drain => break true,
                    error = &mut exit, if exited.is_none() => exited = Some(error),
                    _ = tokio::time::sleep(DRAIN_GRACE), if exited.is_some() => break false,
                }
            };

            let error = match exited {
                Some(error) => error,
                None => exit.await,
            };
            (error, drained)
        };

        if !drained {
            // A grandchild still holds the pipes open
            debug!(program = %request.program, "output drain abandoned");
            error = Some(match error {
                Some(e) => format!("{}; {}", e, OUTPUT_TRUNCATED),
                None => OUTPUT_TRUNCATED.to_string(),
            });
        }

        let mut output = out;
        output.extend_from_slice(&err);

        if let Some(ref e) = error {
            info!(program = %request.program, error = %e, "exec finished with error");
        }

        CommandResult {
            output,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Validate and run in one step
    pub async fn execute(&self, raw: &str) -> Result<CommandResult, GatewayError> {
        let request = self.check(raw)?;
        info!(command = %raw, "exec");
        Ok(self.run(&request).await)
    }
}

impl Default for CommandGateway {
    fn default() -> Self {
        Self::new(AllowedCommandSet::default(), Duration::from_secs(60))
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Append up to `MAX_STREAM_BYTES` from `pipe` into `buf`.
///
/// Bytes land in `buf` as they are read, so a dropped future keeps what it got.
async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) {
    let Some(mut pipe) = pipe else { return };
    let mut chunk = [0u8; 8192];

    while buf.len() < MAX_STREAM_BYTES {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = MAX_STREAM_BYTES - buf.len();
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!(error = %e, "pipe read failed");
                break;
            }
        }
    }
}

fn describe_exit(status: ExitStatus) -> Option<String> {
    if status.success() {
        None
    } else {
        Some(status.to_string())
    }
}
