//! Subprocess supervision: the persistent wrapper process with its reader
//! threads and response channel, plus the transient one-shot fallback.
//!
//! The persistent process runs `<interpreter> <wrapper> persistent` and
//! accepts command lines on stdin. Its stdout is owned by a background
//! reader thread that decodes protocol lines as they arrive: log lines and
//! executes are forwarded to the host immediately, host-read requests are
//! answered inline on the subprocess's stdin, and result lines complete the
//! outstanding command of their run mode through its response channel.
//! stderr gets its own thread that de-tags error lines.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rainode_host::{respond, HostApi};
use rainode_protocol::{decode, tags, Line, RunMode, Severity};

use crate::errors::{BridgeError, Result};
use crate::instance::{CachedValues, CancelToken};
use crate::BridgeSettings;

/// One outstanding command awaiting its result line. The registry is keyed
/// by run mode: a synchronous custom call may legally overlap the
/// background update cycle, and each needs its own response channel. The
/// token lets a timed-out waiter clear only its own entry.
struct Pending {
    token: u64,
    tx: mpsc::Sender<String>,
}

/// How a command send ended.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The matching result line arrived within the budget.
    Completed(String),
    /// The budget elapsed. The command may still finish later; its result
    /// then lands in the value cache instead of completing a wait.
    TimedOut,
    /// The wait was abandoned because the instance is shutting down.
    Cancelled,
    /// The pipe or process is gone. Callers fall back to a transient run.
    Broken,
}

/// Cloneable handle onto a persistent process's pipes. Commands are sent
/// through the handle without holding the instance lifecycle lock.
#[derive(Clone)]
pub struct ProcessHandle {
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    pending: Arc<Mutex<HashMap<RunMode, Pending>>>,
    next_token: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Remove this waiter's entry, leaving a newer same-mode entry alone.
    fn clear_pending(&self, mode: RunMode, token: u64) {
        if let Ok(mut slots) = self.pending.lock() {
            if slots.get(&mode).is_some_and(|p| p.token == token) {
                slots.remove(&mode);
            }
        }
    }

    fn drop_all_pending(&self) {
        if let Ok(mut slots) = self.pending.lock() {
            slots.clear();
        }
    }

    fn write_line(&self, line: &str) -> bool {
        let Ok(mut guard) = self.stdin.lock() else {
            return false;
        };
        let Some(stdin) = guard.as_mut() else {
            return false;
        };
        writeln!(stdin, "{line}").and_then(|()| stdin.flush()).is_ok()
    }

    /// Send one command line and wait for its result.
    ///
    /// Waits the whole command budget in poll-interval slices, checking the
    /// cancellation flag between slices. At most one command per run mode
    /// is outstanding at a time (the update cycle is single-flight
    /// upstream); commands of different modes may overlap and each gets its
    /// own response channel.
    pub fn send_command(
        &self,
        mode: RunMode,
        command: &str,
        cancel: &CancelToken,
        settings: &BridgeSettings,
    ) -> SendOutcome {
        if !self.is_alive() {
            return SendOutcome::Broken;
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        if let Ok(mut slots) = self.pending.lock() {
            slots.insert(mode, Pending { token, tx });
        } else {
            return SendOutcome::Broken;
        }

        if !self.write_line(command) {
            self.clear_pending(mode, token);
            self.alive.store(false, Ordering::SeqCst);
            return SendOutcome::Broken;
        }

        let deadline = Instant::now() + settings.command_budget;
        loop {
            if cancel.is_cancelled() {
                self.clear_pending(mode, token);
                return SendOutcome::Cancelled;
            }
            match rx.recv_timeout(settings.poll_interval) {
                Ok(payload) => return SendOutcome::Completed(payload),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if Instant::now() >= deadline {
                        self.clear_pending(mode, token);
                        return SendOutcome::TimedOut;
                    }
                    if !self.is_alive() {
                        self.clear_pending(mode, token);
                        return SendOutcome::Broken;
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.clear_pending(mode, token);
                    return SendOutcome::Broken;
                }
            }
        }
    }
}

/// A running persistent wrapper process.
pub struct PersistentProcess {
    child: Child,
    handle: ProcessHandle,
    stdout_thread: Option<JoinHandle<()>>,
    stderr_thread: Option<JoinHandle<()>>,
    stopped: bool,
}

impl PersistentProcess {
    /// Spawn `<interpreter> <wrapper> persistent` with all three pipes
    /// attached and start the reader threads.
    pub fn spawn(
        settings: &BridgeSettings,
        wrapper: &Path,
        working_dir: Option<&Path>,
        api: Arc<dyn HostApi>,
        values: Arc<Mutex<CachedValues>>,
    ) -> Result<Self> {
        let mut command = Command::new(&settings.node_command);
        command
            .arg(wrapper)
            .arg("persistent")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| BridgeError::Spawn {
            command: settings.node_command.display().to_string(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(BridgeError::PipeUnavailable {
            path: wrapper.to_path_buf(),
        })?;
        let stdout = child.stdout.take().ok_or(BridgeError::PipeUnavailable {
            path: wrapper.to_path_buf(),
        })?;
        let stderr = child.stderr.take().ok_or(BridgeError::PipeUnavailable {
            path: wrapper.to_path_buf(),
        })?;

        let handle = ProcessHandle {
            stdin: Arc::new(Mutex::new(Some(stdin))),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(0)),
            alive: Arc::new(AtomicBool::new(true)),
        };

        let stdout_thread = {
            let handle = handle.clone();
            let api = Arc::clone(&api);
            let values = Arc::clone(&values);
            std::thread::spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    dispatch_stdout_line(api.as_ref(), &handle, &values, &line);
                }
                handle.alive.store(false, Ordering::SeqCst);
                // Dropping the senders wakes every waiter with Broken.
                handle.drop_all_pending();
            })
        };

        let stderr_thread = {
            let api = Arc::clone(&api);
            std::thread::spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    forward_stderr_line(api.as_ref(), &line);
                }
            })
        };

        Ok(Self {
            child,
            handle,
            stdout_thread: Some(stdout_thread),
            stderr_thread: Some(stderr_thread),
            stopped: false,
        })
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the process to exit by closing its stdin, wait out the grace
    /// period, then force-kill whatever is left.
    pub fn stop(&mut self, grace: Duration) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Ok(mut guard) = self.handle.stdin.lock() {
            guard.take();
        }

        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                _ => {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
            }
        }

        self.handle.alive.store(false, Ordering::SeqCst);
        if let Some(thread) = self.stdout_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.stderr_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PersistentProcess {
    fn drop(&mut self) {
        self.stop(Duration::ZERO);
    }
}

fn dispatch_stdout_line(
    api: &dyn HostApi,
    handle: &ProcessHandle,
    values: &Mutex<CachedValues>,
    raw: &str,
) {
    match decode(raw) {
        Line::Log(severity, message) => api.log(severity, &message),
        Line::Execute(command) => api.execute(&command),
        Line::Request(request) => {
            let response = respond(api, &request);
            if !handle.write_line(&response) {
                api.log(Severity::Error, "failed to answer host request");
            }
        }
        Line::Result(mode, payload) => {
            let completed = match handle.pending.lock() {
                Ok(mut slots) => match slots.remove(&mode) {
                    Some(pending) => {
                        let _ = pending.tx.send(payload.clone());
                        true
                    }
                    None => false,
                },
                Err(_) => false,
            };
            if !completed {
                // Late result from a timed-out command; still the freshest
                // data there is.
                if let Ok(mut cache) = values.lock() {
                    cache.apply(&payload);
                }
            }
        }
        Line::Plain(text) => api.log(Severity::Notice, &text),
        Line::Empty => {}
    }
}

/// stderr carries tagged error lines from the wrapper's console.error
/// override; anything untagged is interpreter noise, logged as-is.
fn forward_stderr_line(api: &dyn HostApi, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let message = trimmed.strip_prefix(tags::LOG_ERROR).unwrap_or(trimmed);
    api.log(Severity::Error, message);
}

/// One-shot fallback run: `<interpreter> <wrapper> <mode> [call]`.
///
/// Used when the persistent channel is broken. The process is streamed to
/// completion on the calling thread; host requests are answered inline. A
/// non-zero exit is logged but does not discard a result already captured.
pub fn run_transient(
    settings: &BridgeSettings,
    wrapper: &Path,
    mode: RunMode,
    custom_call: Option<&str>,
    working_dir: Option<&Path>,
    api: &Arc<dyn HostApi>,
) -> Option<String> {
    let mut command = Command::new(&settings.node_command);
    command
        .arg(wrapper)
        .arg(mode.keyword())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(call) = custom_call {
        command.arg(call);
    }
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            api.log(
                Severity::Error,
                &format!(
                    "failed to start {}: {err}",
                    settings.node_command.display()
                ),
            );
            return None;
        }
    };

    let mut stdin = child.stdin.take();
    let stdout = child.stdout.take()?;
    let stderr = child.stderr.take()?;

    let stderr_thread = {
        let api = Arc::clone(api);
        std::thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                forward_stderr_line(api.as_ref(), &line);
            }
        })
    };

    let mut result = None;
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        match decode(&line) {
            Line::Log(severity, message) => api.log(severity, &message),
            Line::Execute(cmd) => api.execute(&cmd),
            Line::Request(request) => {
                let response = respond(api.as_ref(), &request);
                if let Some(stdin) = stdin.as_mut() {
                    let _ = writeln!(stdin, "{response}").and_then(|()| stdin.flush());
                }
            }
            Line::Result(m, payload) if m == mode => result = Some(payload),
            Line::Result(..) => {}
            Line::Plain(text) => api.log(Severity::Notice, &text),
            Line::Empty => {}
        }
    }

    drop(stdin);
    let status = child.wait();
    let _ = stderr_thread.join();

    match status {
        Ok(status) if !status.success() => {
            api.log(
                Severity::Warning,
                &format!("script process exited with {status}"),
            );
        }
        Err(err) => {
            api.log(Severity::Error, &format!("failed to reap script process: {err}"));
        }
        Ok(_) => {}
    }

    result
}
