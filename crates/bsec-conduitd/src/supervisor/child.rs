use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, ChildStdout, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::SUPERVISOR_TARGET;
use super::errors::SupervisorError;
use crate::health::HealthReporter;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 50;
const STDERR_SETTLE: Duration = Duration::from_millis(250);

/// How a stop request concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The child exited on its own or after `SIGTERM`.
    Exited(ExitStatus),
    /// The child ignored `SIGTERM` and was killed.
    Killed(ExitStatus),
    /// A stop was already requested; nothing was done.
    AlreadyRequested,
}

/// Owned handle to a running fusion process.
///
/// Dropping the handle kills a child that is still running.
pub struct ChildHandle {
    pid: u32,
    child: Mutex<Child>,
    stop_requested: AtomicBool,
    stdout: Mutex<Option<ChildStdout>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_reader: Mutex<Option<JoinHandle<()>>>,
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildHandle")
            .field("pid", &self.pid)
            .field("stop_requested", &self.stop_requested())
            .finish_non_exhaustive()
    }
}

impl ChildHandle {
    pub(super) fn new(mut child: Child, reporter: Arc<dyn HealthReporter>) -> Self {
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_reader = child
            .stderr
            .take()
            .and_then(|stderr| spawn_stderr_reader(pid, stderr, Arc::clone(&stderr_tail)));
        Self {
            pid,
            child: Mutex::new(child),
            stop_requested: AtomicBool::new(false),
            stdout: Mutex::new(stdout),
            stderr_tail,
            stderr_reader: Mutex::new(stderr_reader),
            reporter,
        }
    }

    /// Operating system process identifier.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Takes the stdout pipe; later calls return `None`.
    pub fn take_stdout(&self) -> Option<ChildStdout> {
        self.stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether [`ChildHandle::stop`] has been called.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Non-blocking exit check.
    pub fn try_exit(&self) -> Result<Option<ExitStatus>, SupervisorError> {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_wait()
            .map_err(|source| SupervisorError::Wait {
                pid: self.pid,
                source,
            })
    }

    /// Waits up to `timeout` for the child to exit.
    pub fn wait_exit(&self, timeout: Duration) -> Result<Option<ExitStatus>, SupervisorError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_exit()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Sends `SIGTERM`, waits up to `timeout`, then kills.
    ///
    /// Only the first call acts; later calls return
    /// [`StopOutcome::AlreadyRequested`].
    pub fn stop(&self, timeout: Duration) -> Result<StopOutcome, SupervisorError> {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            debug!(
                target: SUPERVISOR_TARGET,
                pid = self.pid,
                "stop already requested"
            );
            return Ok(StopOutcome::AlreadyRequested);
        }

        if let Some(status) = self.try_exit()? {
            info!(
                target: SUPERVISOR_TARGET,
                pid = self.pid,
                %status,
                "fusion process had already exited"
            );
            return Ok(StopOutcome::Exited(status));
        }

        match kill(process_id(self.pid)?, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(source) => {
                return Err(SupervisorError::Signal {
                    pid: self.pid,
                    source,
                });
            }
        }
        if let Some(status) = self.wait_exit(timeout)? {
            info!(
                target: SUPERVISOR_TARGET,
                pid = self.pid,
                %status,
                "fusion process stopped"
            );
            return Ok(StopOutcome::Exited(status));
        }

        warn!(
            target: SUPERVISOR_TARGET,
            pid = self.pid,
            timeout_ms = timeout.as_millis(),
            "fusion process ignored SIGTERM; killing"
        );
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        let wait_error = |source| SupervisorError::Wait {
            pid: self.pid,
            source,
        };
        // Exit may race the kill; reaping below covers both.
        let _ = child.kill();
        let status = child.wait().map_err(wait_error)?;
        drop(child);
        self.reporter.shutdown_escalated(self.pid);
        Ok(StopOutcome::Killed(status))
    }

    /// Last lines the child wrote to stderr, oldest first.
    ///
    /// Gives the reader thread a short window to drain output written just
    /// before exit.
    #[must_use]
    pub fn stderr_tail(&self) -> String {
        let reader = self
            .stderr_reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            let deadline = Instant::now() + STDERR_SETTLE;
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if reader.is_finished() {
                let _ = reader.join();
            }
        }
        let tail = self
            .stderr_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        let child = self.child.get_mut().unwrap_or_else(PoisonError::into_inner);
        if matches!(child.try_wait(), Ok(None)) {
            warn!(
                target: SUPERVISOR_TARGET,
                pid = self.pid,
                "fusion process still running on drop; killing"
            );
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn process_id(pid: u32) -> Result<Pid, SupervisorError> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| SupervisorError::Signal {
            pid,
            source: Errno::EINVAL,
        })
}

fn spawn_stderr_reader(
    pid: u32,
    stderr: ChildStderr,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("bsec-stderr".to_owned())
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                debug!(
                    target: SUPERVISOR_TARGET,
                    pid,
                    line = %line,
                    "fusion stderr"
                );
                let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(error) => {
            warn!(
                target: SUPERVISOR_TARGET,
                pid,
                error = %error,
                "failed to start stderr reader; stderr will be discarded"
            );
            None
        }
    }
}
