// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::AgentSettings;
use crate::engine::dispatch::{plan_launch, LaunchOutcome, LaunchRequest};
use crate::engine::registry::{TaskRegistry, TaskState};
use crate::engine::stats::Stats;
use crate::errors::DispatchError;
use crate::protocol::{
    error_feedback, launch_feedback, Envelope, Feedback, OutboundMessage, TaskRegister, TaskReply,
};
use crate::types::{ReplyStatus, TaskId};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Publish a message to the router.
    Send(OutboundMessage),
    /// Start the bootstrap process of a task.
    Launch(LaunchRequest),
    /// Arm the periodic liveness probe for a freshly launched task.
    StartWatchdog { task_id: TaskId, pidfile: PathBuf },
    /// Disarm a task's liveness probe.
    CancelWatchdog { task_id: TaskId },
    /// Best-effort SIGINT to the process recorded in `pidfile`.
    Interrupt { task_id: TaskId, pidfile: PathBuf },
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn with(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn nothing() -> Self {
        Self::with(Vec::new())
    }
}

fn reply(task_id: &str, status: ReplyStatus, feedback: Feedback) -> CoreCommand {
    CoreCommand::Send(TaskReply::new(task_id, status, feedback).into())
}

/// Handle an inbound task-launch request.
///
/// On success the `starting` reply is queued ahead of the launch, so it
/// reaches the transport before the process exists.
pub fn handle_inbound(
    settings: &AgentSettings,
    registry: &mut TaskRegistry,
    envelope: Envelope,
) -> CoreStep {
    match plan_launch(settings, registry, &envelope) {
        Ok(request) => {
            registry.begin_launch(&request.task_id, request.pending());
            info!(
                task_id = %request.task_id,
                handler = %request.handler,
                "task accepted; launching"
            );
            CoreStep::with(vec![
                reply(&request.task_id, ReplyStatus::Starting, Feedback::new()),
                CoreCommand::Launch(request),
            ])
        }
        Err(err) => handle_dispatch_error(err, &envelope),
    }
}

fn handle_dispatch_error(err: DispatchError, envelope: &Envelope) -> CoreStep {
    match err {
        DispatchError::Decode(_) => {
            error!(
                error = %err,
                payload = %String::from_utf8_lossy(&envelope.payload),
                "dropping undecodable message"
            );
            CoreStep::nothing()
        }
        DispatchError::InvalidTaskId(_) => {
            error!(error = %err, "dropping request");
            CoreStep::nothing()
        }
        DispatchError::Duplicate(ref task_id) => {
            info!(task_id = %task_id, "ignored task: already known");
            CoreStep::nothing()
        }
        DispatchError::UnconfiguredHandler { ref task_id, .. } => {
            let msg = err.to_string();
            error!(task_id = %task_id, "{}", msg);
            CoreStep::with(vec![reply(task_id, ReplyStatus::Failed, error_feedback(&msg))])
        }
    }
}

/// Handle the end of a bootstrap process.
///
/// Exit code 0 creates the task state and arms its watchdog; anything else
/// is reported as `failed` and leaves no state behind.
pub fn handle_launch_completed(
    settings: &AgentSettings,
    registry: &mut TaskRegistry,
    stats: &mut Stats,
    task_id: TaskId,
    outcome: LaunchOutcome,
    now: Instant,
) -> CoreStep {
    let Some(pending) = registry.finish_launch(&task_id) else {
        warn!(task_id = %task_id, "launch completion for unknown task; ignoring");
        return CoreStep::nothing();
    };

    debug!(
        task_id = %task_id,
        rc = outcome.rc,
        out = %String::from_utf8_lossy(&outcome.output),
        "task bootstrap returned"
    );

    let feedback = launch_feedback(outcome.rc, &outcome.output);

    if !outcome.success() {
        stats.inc_failed();
        info!(task_id = %task_id, rc = outcome.rc, "task launch failed");
        return CoreStep::with(vec![reply(&task_id, ReplyStatus::Failed, feedback)]);
    }

    stats.inc_launched();
    let mut commands = vec![reply(&task_id, ReplyStatus::Launched, feedback)];

    let mut state = TaskState::new(&task_id, &pending.handler, pending.info, pending.pidfile);
    state.heartbeat = settings.task_heartbeat;
    state.start(now);
    let pidfile = state.pidfile.clone();

    if registry.insert_if_absent(state) {
        info!(task_id = %task_id, pidfile = ?pidfile, "task launched; watchdog armed");
        commands.push(CoreCommand::StartWatchdog { task_id, pidfile });
    } else {
        warn!(task_id = %task_id, "task state already present; not arming a second watchdog");
    }

    CoreStep::with(commands)
}

/// Handle one watchdog probe result.
pub fn handle_probe(
    registry: &mut TaskRegistry,
    task_id: TaskId,
    alive: bool,
    now: Instant,
) -> CoreStep {
    let Some(state) = registry.get(&task_id) else {
        debug!(task_id = %task_id, "probe result for untracked task; ignoring");
        return CoreStep::nothing();
    };

    if !state.is_active() {
        debug!(task_id = %task_id, "probe result for stopped task; ignoring");
        return CoreStep::nothing();
    }

    if alive {
        debug!(task = %state.name, "task is alive");
        if state.heartbeat {
            return CoreStep::with(vec![reply(&task_id, ReplyStatus::Running, Feedback::new())]);
        }
        return CoreStep::nothing();
    }

    match registry.mark_dead(&task_id, now) {
        Some(state) => {
            info!(task = %state.name, "task is over");
            CoreStep::with(vec![
                CoreCommand::CancelWatchdog {
                    task_id: task_id.clone(),
                },
                reply(&task_id, ReplyStatus::Stopped, Feedback::new()),
            ])
        }
        None => CoreStep::nothing(),
    }
}

/// Registration beacon: announce this agent to the router.
pub fn handle_registration(settings: &AgentSettings) -> CoreStep {
    info!(host = %settings.local_id, "registering with router");
    CoreStep::with(vec![CoreCommand::Send(
        TaskRegister::new(&settings.local_id).into(),
    )])
}

/// Maintenance sweep: forget stopped tasks past the grace period, then
/// publish a stats snapshot.
pub fn handle_maintenance(
    settings: &AgentSettings,
    registry: &mut TaskRegistry,
    stats: &mut Stats,
    now: Instant,
) -> CoreStep {
    debug!("maintenance sweep");

    let evicted = registry.evict_expired(now, settings.grace_period);
    for state in evicted.iter() {
        info!(task_id = %state.uid, "forgetting task");
    }
    stats.add_evicted(evicted.len());

    let report = stats.take_report(&settings.local_id, registry);
    info!(
        launched = report.tasks_launched,
        failed = report.tasks_failed,
        evicted = report.tasks_evicted,
        active = report.tasks_active,
        stopped = report.tasks_stopped,
        in_flight = report.launches_in_flight,
        "task stats"
    );

    CoreStep::with(vec![CoreCommand::Send(report.into())])
}

/// Shutdown: interrupt every task that is still running and stop the loop.
pub fn handle_shutdown(registry: &TaskRegistry) -> CoreStep {
    let mut commands = Vec::new();
    for state in registry.active() {
        info!(task = %state.name, "signalling task on shutdown");
        commands.push(CoreCommand::Interrupt {
            task_id: state.uid.clone(),
            pidfile: state.pidfile.clone(),
        });
    }

    CoreStep {
        commands,
        keep_running: false,
    }
}
