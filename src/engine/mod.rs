// src/engine/mod.rs

//! Orchestration engine for the task runner.
//!
//! This module ties together:
//! - dispatch of inbound task requests (validation, dedup, handler lookup)
//! - the task registry and its per-task watchdog state
//! - the registration beacon and the maintenance sweep
//! - the main runtime event loop that reacts to:
//!   - inbound messages from the router
//!   - launch completions
//!   - watchdog probe results
//!   - periodic timers
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::protocol::Envelope;
use crate::types::TaskId;

/// Events flowing into the runtime from the transport, launcher, watchdogs
/// and timers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A message arrived from the router.
    Inbound(Envelope),
    /// A task's bootstrap process exited (or failed to spawn).
    LaunchCompleted {
        task_id: TaskId,
        outcome: LaunchOutcome,
    },
    /// A watchdog probed a task's process.
    ProbeCompleted { task_id: TaskId, alive: bool },
    /// Time to (re-)announce this agent to the router.
    RegistrationDue,
    /// Time to sweep stopped tasks and publish stats.
    MaintenanceDue,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod dispatch;
pub mod event_handlers;
pub mod registry;
pub mod runtime;
pub mod stats;

pub use self::core::CoreRuntime;
pub use dispatch::{is_valid_task_id, plan_launch, LaunchOutcome, LaunchRequest};
pub use event_handlers::{CoreCommand, CoreStep};
pub use registry::{task_pidfile, TaskRegistry, TaskState};
pub use runtime::Runtime;
pub use stats::Stats;
