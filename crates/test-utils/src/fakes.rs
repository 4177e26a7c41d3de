#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use taskrunner::engine::{LaunchOutcome, LaunchRequest, RuntimeEvent};
use taskrunner::errors::{ProbeError, Result, TaskRunnerError};
use taskrunner::exec::{LaunchBackend, ProcessProbe};
use taskrunner::protocol::OutboundMessage;
use taskrunner::transport::Transport;

/// A transport that keeps everything the runtime publishes.
///
/// Messages are stored in a shared vector and mirrored to an unbounded
/// channel, so tests can either inspect the history or await the next one.
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl RecordingTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            tx,
        };
        (transport, rx)
    }

    /// Shared handle to the send history.
    pub fn history(&self) -> Arc<Mutex<Vec<OutboundMessage>>> {
        Arc::clone(&self.sent)
    }
}

impl Transport for RecordingTransport {
    fn send(
        &mut self,
        message: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let sent = Arc::clone(&self.sent);
        let tx = self.tx.clone();

        Box::pin(async move {
            sent.lock().unwrap().push(message.clone());
            // The receiver may have been dropped by tests that only look at
            // the history.
            let _ = tx.send(message);
            Ok(())
        })
    }
}

/// A launcher that never starts a process.
///
/// - records every request it is handed
/// - after `delay`, reports the scripted outcome for the task (rc 0 with
///   output `"ok"` unless scripted otherwise)
/// - can be told to refuse specific tasks outright
pub struct FakeLauncher {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    launched: Arc<Mutex<Vec<LaunchRequest>>>,
    outcomes: HashMap<String, LaunchOutcome>,
    refused: HashSet<String>,
    delay: Duration,
}

impl FakeLauncher {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            launched: Arc::new(Mutex::new(Vec::new())),
            outcomes: HashMap::new(),
            refused: HashSet::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_outcome(mut self, task_id: &str, outcome: LaunchOutcome) -> Self {
        self.outcomes.insert(task_id.to_string(), outcome);
        self
    }

    pub fn refusing(mut self, task_id: &str) -> Self {
        self.refused.insert(task_id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared handle to the recorded requests.
    pub fn launched(&self) -> Arc<Mutex<Vec<LaunchRequest>>> {
        Arc::clone(&self.launched)
    }
}

impl LaunchBackend for FakeLauncher {
    fn launch(
        &mut self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let launched = Arc::clone(&self.launched);
        let refused = self.refused.contains(&request.task_id);
        let outcome = self
            .outcomes
            .get(&request.task_id)
            .cloned()
            .unwrap_or_else(|| LaunchOutcome::new(0, "ok"));
        let delay = self.delay;

        Box::pin(async move {
            launched.lock().unwrap().push(request.clone());

            if refused {
                return Err(TaskRunnerError::Other(anyhow::anyhow!(
                    "launcher refused {}",
                    request.task_id
                )));
            }

            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let _ = tx
                    .send(RuntimeEvent::LaunchCompleted {
                        task_id: request.task_id,
                        outcome,
                    })
                    .await;
            });
            Ok(())
        })
    }
}

/// A probe backed by an in-memory set of "running" pidfiles.
///
/// Clones share state, so a test can keep one handle and flip liveness
/// while the runtime owns the other.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    alive: Arc<Mutex<HashSet<PathBuf>>>,
    broken: Arc<Mutex<HashSet<PathBuf>>>,
    interrupted: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alive(&self, pidfile: impl Into<PathBuf>) {
        self.alive.lock().unwrap().insert(pidfile.into());
    }

    pub fn kill(&self, pidfile: &Path) {
        self.alive.lock().unwrap().remove(pidfile);
    }

    /// Make every probe of `pidfile` fail with an unreadable-pidfile error.
    pub fn break_pidfile(&self, pidfile: impl Into<PathBuf>) {
        self.broken.lock().unwrap().insert(pidfile.into());
    }

    pub fn interrupted(&self) -> Vec<PathBuf> {
        self.interrupted.lock().unwrap().clone()
    }

    fn check(&self, pidfile: &Path) -> std::result::Result<bool, ProbeError> {
        if self.broken.lock().unwrap().contains(pidfile) {
            return Err(ProbeError::Unreadable {
                path: pidfile.display().to_string(),
                source: anyhow::anyhow!("permission denied"),
            });
        }
        Ok(self.alive.lock().unwrap().contains(pidfile))
    }
}

impl ProcessProbe for FakeProbe {
    fn is_alive(&self, pidfile: &Path) -> std::result::Result<bool, ProbeError> {
        self.check(pidfile)
    }

    fn interrupt(&self, pidfile: &Path) -> std::result::Result<bool, ProbeError> {
        let alive = self.check(pidfile)?;
        self.interrupted.lock().unwrap().push(pidfile.to_path_buf());
        Ok(alive)
    }
}
