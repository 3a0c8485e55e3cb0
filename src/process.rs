//! Subprocess execution for native build tools.
//!
//! [`Cmd`] spawns a tool with an explicit argument list (never through a
//! shell), captures stdout and stderr, and kills the child when the caller's
//! [`CancelToken`] trips or the timeout elapses. On unix the child leads its
//! own process group and the whole group is killed, so compilers started by
//! `make` or `sh -c` go down with it.

use crate::error::ToolOutput;
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to drain output after a kill before giving up on the pipes.
const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

/// Shared cancellation flag observed by downloads and tool invocations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Trip `token` on SIGINT or SIGTERM.
///
/// Tools run in their own process groups, so a terminal Ctrl-C reaches only
/// this process; the token then takes the running tools down.
#[cfg(unix)]
pub fn cancel_on_interrupt(token: &CancelToken) {
    let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic.
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
    let token = token.clone();
    thread::spawn(move || {
        while !INTERRUPTED.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);
        }
        tracing::warn!("interrupted, stopping running tools");
        token.cancel();
    });
}

#[cfg(not(unix))]
pub fn cancel_on_interrupt(_token: &CancelToken) {}

/// Why a tool invocation did not succeed.
#[derive(Debug)]
pub enum CmdError {
    /// The program could not be started at all.
    Spawn { command: String, message: String },
    /// The program ran and exited non-zero.
    Failed(ToolOutput),
    /// The timeout elapsed; the child was killed.
    TimedOut(ToolOutput, Duration),
    /// The cancel token tripped; the child was killed.
    Cancelled(ToolOutput),
}

impl CmdError {
    /// Short one-line description, without the captured output.
    pub fn summary(&self) -> String {
        match self {
            CmdError::Spawn { command, message } => {
                format!("failed to start `{}`: {}", command, message)
            }
            CmdError::Failed(out) => match out.status {
                Some(code) => format!("`{}` exited with status {}", out.command, code),
                None => format!("`{}` was terminated by a signal", out.command),
            },
            CmdError::TimedOut(out, after) => {
                format!("`{}` timed out after {}s", out.command, after.as_secs())
            }
            CmdError::Cancelled(out) => format!("`{}` was cancelled", out.command),
        }
    }

    pub fn output(&self) -> Option<ToolOutput> {
        match self {
            CmdError::Spawn { .. } => None,
            CmdError::Failed(out) | CmdError::TimedOut(out, _) | CmdError::Cancelled(out) => {
                Some(out.clone())
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CmdError::Cancelled(_))
    }
}

/// Builder for a single tool invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout: None,
            cancel: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (k, v) in vars {
            self = self.env(k, v);
        }
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancel(mut self, token: &CancelToken) -> Self {
        self.cancel = Some(token.clone());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments as lossy strings, mainly for inspection in tests.
    pub fn arguments(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Command line as it would be typed in a shell, for diagnostics.
    pub fn display(&self) -> String {
        let mut parts = vec![quote(&self.program.to_string_lossy())];
        parts.extend(self.args.iter().map(|a| quote(&a.to_string_lossy())));
        parts.join(" ")
    }

    /// Run to completion, capturing output.
    ///
    /// Succeeds only when the tool exits with status 0.
    pub fn run(&self) -> Result<ToolOutput, CmdError> {
        let command = self.display();
        tracing::debug!(cwd = ?self.cwd, "running {}", command);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        own_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| CmdError::Spawn {
            command: command.clone(),
            message: e.to_string(),
        })?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let started = Instant::now();
        let outcome = self.wait(&mut child, started);

        // A process that escaped the group can keep the pipes open forever.
        let drain = match outcome {
            WaitOutcome::Exited(_) => None,
            _ => Some(DRAIN_AFTER_KILL),
        };
        let mut output = ToolOutput {
            command,
            status: None,
            stdout: join_reader(stdout, drain),
            stderr: join_reader(stderr, drain),
        };

        match outcome {
            WaitOutcome::Exited(code) => {
                output.status = code;
                if code == Some(0) {
                    Ok(output)
                } else {
                    Err(CmdError::Failed(output))
                }
            }
            WaitOutcome::TimedOut(after) => Err(CmdError::TimedOut(output, after)),
            WaitOutcome::Cancelled => Err(CmdError::Cancelled(output)),
            WaitOutcome::WaitFailed(message) => Err(CmdError::Spawn {
                command: output.command,
                message,
            }),
        }
    }

    fn wait(&self, child: &mut Child, started: Instant) -> WaitOutcome {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return WaitOutcome::Exited(status.code()),
                Ok(None) => {}
                Err(e) => return WaitOutcome::WaitFailed(e.to_string()),
            }

            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                kill(child);
                return WaitOutcome::Cancelled;
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    kill(child);
                    return WaitOutcome::TimedOut(limit);
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

enum WaitOutcome {
    Exited(Option<i32>),
    TimedOut(Duration),
    Cancelled,
    WaitFailed(String),
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group id is our child's pid.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Collect a reader's output, waiting at most `limit` when one is given.
/// A reader that misses the deadline is abandoned.
fn join_reader(rx: Option<Receiver<Vec<u8>>>, limit: Option<Duration>) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    let bytes = match limit {
        Some(limit) => rx.recv_timeout(limit).ok(),
        None => rx.recv().ok(),
    };
    bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:,+@%".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
