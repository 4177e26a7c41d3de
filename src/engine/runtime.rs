// src/engine/runtime.rs

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RuntimeTimers;
use crate::errors::Result;
use crate::exec::{spawn_watchdog, LaunchBackend, ProcessProbe};
use crate::transport::Transport;
use crate::types::TaskId;

use super::core::CoreRuntime;
use super::{CoreCommand, LaunchOutcome, RuntimeEvent};

/// Drives the agent core in response to `RuntimeEvent`s and timers, and
/// delegates IO to a `Transport`, a `LaunchBackend` and a `ProcessProbe`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// semantics. Everything runs on one loop: the core and its registry are
/// only touched here, between awaits.
pub struct Runtime<T, L, P>
where
    T: Transport,
    L: LaunchBackend,
    P: ProcessProbe + 'static,
{
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    transport: T,
    launcher: L,
    probe: Arc<P>,
    timers: RuntimeTimers,
    watchdogs: HashMap<TaskId, JoinHandle<()>>,
}

impl<T, L, P> fmt::Debug for Runtime<T, L, P>
where
    T: Transport,
    L: LaunchBackend,
    P: ProcessProbe + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("timers", &self.timers)
            .field("watchdogs", &self.watchdogs.len())
            .finish_non_exhaustive()
    }
}

impl<T, L, P> Runtime<T, L, P>
where
    T: Transport,
    L: LaunchBackend,
    P: ProcessProbe + 'static,
{
    /// `event_tx` must be the sending half of `event_rx`; watchdogs report
    /// through it.
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        transport: T,
        launcher: L,
        probe: Arc<P>,
        timers: RuntimeTimers,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            transport,
            launcher,
            probe,
            timers,
            watchdogs: HashMap::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Registers immediately, then every `reg_period`.
    /// - Sweeps every `maint_period` (first sweep one period after start).
    /// - Feeds inbound messages, launch completions and probe results into
    ///   the core and executes the commands it returns.
    ///
    /// Returns after a `ShutdownRequested` event has been handled. Returns
    /// the core so callers can inspect the final registry.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!(local_id = %self.core.settings().local_id, "task runner started");

        let mut reg_timer = interval(self.timers.reg_period);
        reg_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let maint_period = self.timers.maint_period;
        let mut maint_timer = interval_at(Instant::now() + maint_period, maint_period);
        maint_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                maybe = self.event_rx.recv() => match maybe {
                    Some(e) => e,
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                },
                _ = reg_timer.tick() => RuntimeEvent::RegistrationDue,
                _ = maint_timer.tick() => RuntimeEvent::MaintenanceDue,
            };

            debug!(?event, "runtime received event");

            if !self.handle_event(event).await {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        self.abort_watchdogs();
        info!("runtime exiting");
        Ok(self.core)
    }

    /// Step the core with `event` and execute everything it asks for,
    /// including follow-up events produced while executing. Returns the
    /// core's `keep_running` verdict.
    async fn handle_event(&mut self, event: RuntimeEvent) -> bool {
        let step = self.core.step(event, Instant::now().into_std());
        let mut keep_running = step.keep_running;
        let mut pending: VecDeque<CoreCommand> = step.commands.into();

        while let Some(command) = pending.pop_front() {
            if let Some(follow_up) = self.execute_command(command).await {
                let step = self.core.step(follow_up, Instant::now().into_std());
                keep_running &= step.keep_running;
                pending.extend(step.commands);
            }
        }

        keep_running
    }

    /// Execute a single command from the core.
    ///
    /// Failures are logged and swallowed: nothing a single task does may take
    /// the loop down. A failure the core must hear about comes back as a
    /// follow-up event.
    async fn execute_command(&mut self, command: CoreCommand) -> Option<RuntimeEvent> {
        match command {
            CoreCommand::Send(message) => {
                let subject = message.subject().to_string();
                debug!(subject = %subject, ?message, "publishing");
                if let Err(e) = self.transport.send(message).await {
                    warn!(subject = %subject, error = %e, "failed to publish message");
                }
            }
            CoreCommand::Launch(request) => {
                let task_id = request.task_id.clone();
                if let Err(e) = self.launcher.launch(request).await {
                    // The backend never got the request; report it like a
                    // spawn failure so the task does not hang in flight.
                    warn!(task_id = %task_id, error = %e, "launch backend refused task");
                    let outcome = LaunchOutcome::new(-1, e.to_string());
                    return Some(RuntimeEvent::LaunchCompleted { task_id, outcome });
                }
            }
            CoreCommand::StartWatchdog { task_id, pidfile } => {
                let handle = spawn_watchdog(
                    task_id.clone(),
                    pidfile,
                    self.timers.watchdog_tick,
                    Arc::clone(&self.probe),
                    self.event_tx.clone(),
                );
                if let Some(old) = self.watchdogs.insert(task_id, handle) {
                    old.abort();
                }
            }
            CoreCommand::CancelWatchdog { task_id } => {
                if let Some(handle) = self.watchdogs.remove(&task_id) {
                    handle.abort();
                }
            }
            CoreCommand::Interrupt { task_id, pidfile } => {
                match self.probe.interrupt(&pidfile) {
                    Ok(true) => info!(task_id = %task_id, "sent interrupt"),
                    Ok(false) => debug!(task_id = %task_id, "no process to interrupt"),
                    Err(e) => {
                        warn!(task_id = %task_id, pidfile = ?pidfile, error = %e, "signal_pidfile failed")
                    }
                }
            }
        }
        None
    }

    fn abort_watchdogs(&mut self) {
        for (task_id, handle) in self.watchdogs.drain() {
            debug!(task_id = %task_id, "cancelling watchdog");
            handle.abort();
        }
    }
}
