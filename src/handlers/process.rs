//! # Payload child-process handler.
//!
//! Executes the payload command and reports when it starts and ends. One
//! handler drives at most one child; the supervisor constructs a fresh
//! handler for every start.
//!
//! The `started` and `ended` channels never close while the handler is
//! alive, so a supervisor select loop can keep polling them after the child
//! exited without spinning on a closed channel.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::PayloadSpec;
use crate::error::ProcessError;

type ProcessEvent = Result<(), ProcessError>;

/// Spawns the payload and notifies on its start and end.
pub struct ProcessHandler {
    payload: PayloadSpec,
    pid: std::sync::Arc<std::sync::Mutex<Option<i32>>>,
    /// Start outcome of the current child; one event per `start()`.
    pub started: mpsc::Receiver<ProcessEvent>,
    /// End outcome of the current child. A non-zero exit is an error event.
    pub ended: mpsc::Receiver<ProcessEvent>,
    started_tx: mpsc::Sender<ProcessEvent>,
    ended_tx: mpsc::Sender<ProcessEvent>,
}

impl ProcessHandler {
    /// Validates the payload command and prepares the event channels.
    pub fn new(payload: &PayloadSpec) -> Result<Self, ProcessError> {
        if !payload.is_runnable() {
            return Err(ProcessError::InvalidCommand);
        }
        let (started_tx, started) = mpsc::channel(1);
        let (ended_tx, ended) = mpsc::channel(1);
        Ok(Self {
            payload: payload.clone(),
            pid: std::sync::Arc::new(std::sync::Mutex::new(None)),
            started,
            ended,
            started_tx,
            ended_tx,
        })
    }

    /// Spawns the child and waits for it in a background task.
    ///
    /// The spawn outcome arrives on `started`; a failed spawn produces no
    /// `ended` event. After a successful spawn the wait outcome arrives on
    /// `ended` regardless of how the child finished.
    pub fn start(&self) {
        let payload = self.payload.clone();
        let pid = self.pid.clone();
        let started_tx = self.started_tx.clone();
        let ended_tx = self.ended_tx.clone();

        tokio::spawn(async move {
            info!(program = %payload.program.display(), "starting the payload");
            let mut command = Command::new(&payload.program);
            command.args(&payload.args);
            // The child's lifetime is bounded by its handler's.
            command.kill_on_drop(true);

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(source) => {
                    let _ = started_tx.send(Err(ProcessError::Start { source })).await;
                    return;
                }
            };
            *lock(&pid) = child.id().and_then(|id| i32::try_from(id).ok());
            let _ = started_tx.send(Ok(())).await;

            let outcome = match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(ProcessError::Exit { status }),
                Err(source) => Err(ProcessError::Wait { source }),
            };
            // The child is reaped; signaling this pid again would race pid
            // reuse, so forget it.
            *lock(&pid) = None;
            debug!(error = outcome.as_ref().err().map(|e| e.as_label()), "payload ended");
            let _ = ended_tx.send(outcome).await;
        });
    }

    /// Sends SIGKILL to the child.
    pub fn kill(&self) -> Result<(), ProcessError> {
        self.signal(Signal::SIGKILL)
    }

    /// Sends SIGTERM to the child.
    pub fn stop(&self) -> Result<(), ProcessError> {
        self.signal(Signal::SIGTERM)
    }

    /// Sends an arbitrary signal to the child if it is running.
    pub fn signal(&self, signal: Signal) -> Result<(), ProcessError> {
        let pid = (*lock(&self.pid)).ok_or(ProcessError::NoProcess)?;
        info!(signal = signal.as_str(), pid, "a signal is being sent");
        kill(Pid::from_raw(pid), signal).map_err(|errno| ProcessError::Signal {
            signal: signal.as_str(),
            pid,
            errno,
        })
    }
}

fn lock(pid: &std::sync::Mutex<Option<i32>>) -> std::sync::MutexGuard<'_, Option<i32>> {
    pid.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
