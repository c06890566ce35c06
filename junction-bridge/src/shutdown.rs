use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::error::BridgeResult;
use crate::runner::{CommandRunner, Invocation, Mode, RunError};
use crate::session::StateFile;

pub const GRACE_PERIOD: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(200);

/// Owns the running node child and everything the interrupt path has to
/// clean up. Shared with the signal task through an `Arc`.
pub struct NodeSession {
    runner: Arc<dyn CommandRunner>,
    node: Mutex<Option<Child>>,
    interrupted: AtomicBool,
    state_file: StateFile,
    binary_name: String,
    grace: Duration,
}

impl NodeSession {
    pub fn new(runner: Arc<dyn CommandRunner>, state_file: StateFile, binary_name: impl Into<String>) -> Self {
        Self {
            runner,
            node: Mutex::new(None),
            interrupted: AtomicBool::new(false),
            state_file,
            binary_name: binary_name.into(),
            grace: GRACE_PERIOD,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn interrupted(&self) -> &AtomicBool {
        &self.interrupted
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn node_pid(&self) -> Option<u32> {
        self.lock().as_ref().map(Child::id)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.node.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the node and blocks until it exits. An exit caused by our own
    /// shutdown path is not an error.
    pub fn run_node(&self, invocation: &Invocation) -> BridgeResult<()> {
        let child = self.runner.spawn(invocation)?;
        info!(pid = child.id(), "node started");
        *self.lock() = Some(child);
        loop {
            {
                let mut guard = self.lock();
                let Some(child) = guard.as_mut() else {
                    return Ok(());
                };
                if let Some(status) = child.try_wait()? {
                    guard.take();
                    if status.success() || self.is_interrupted() {
                        info!(%status, "node exited");
                        return Ok(());
                    }
                    return Err(RunError::Failed {
                        command: invocation.to_string(),
                        code: status.code(),
                        stderr: String::new(),
                    }
                    .into());
                }
            }
            thread::sleep(POLL);
        }
    }

    /// SIGTERM, wait out the grace period, then SIGKILL.
    pub fn stop_node(&self) -> Option<ExitStatus> {
        let mut child = self.lock().take()?;
        let pid = child.id().to_string();
        let term = Invocation::new("kill", Mode::Capture).args(["-TERM", pid.as_str()]);
        if let Err(err) = self.runner.run(&term) {
            warn!(%err, "could not send SIGTERM to node");
        }
        let deadline = Instant::now() + self.grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL.min(self.grace)),
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "could not poll node process");
                    break;
                }
            }
        }
        warn!(%pid, "node ignored SIGTERM, killing");
        if let Err(err) = child.kill() {
            warn!(%err, "could not kill node process");
        }
        child.wait().ok()
    }

    /// Interrupt path: stop our node, sweep stray same-named processes and
    /// forget the session.
    pub fn shutdown(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if let Some(status) = self.stop_node() {
            info!(%status, "node stopped");
        }
        let sweep = Invocation::new("pkill", Mode::Capture).args(["-x", self.binary_name.as_str()]);
        if self.runner.run(&sweep).is_ok() {
            info!(binary = %self.binary_name, "stopped other node processes");
        }
        match self.state_file.clear() {
            Ok(true) => info!(path = %self.state_file.path().display(), "session state removed"),
            Ok(false) => {}
            Err(err) => warn!(%err, "could not remove session state"),
        }
    }
}

/// Listens for Ctrl+C for the lifetime of `runtime`, then cleans up and exits.
pub fn install_signal_handler(runtime: &Runtime, session: Arc<NodeSession>) {
    runtime.spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "failed to install signal handler");
            return;
        }
        println!("\n🛑 Interrupted, cleaning up...");
        let cleanup = tokio::task::spawn_blocking(move || session.shutdown());
        if let Err(err) = cleanup.await {
            warn!(%err, "cleanup task failed");
        }
        std::process::exit(0);
    });
}
