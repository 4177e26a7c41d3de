// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state (task registry + counters)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels and timers
//! - publishing messages on the transport
//! - launching processes and running watchdog probes
//! - handling Ctrl+C / shutdown
//!
//! Time is passed in explicitly, so the core can be tested without Tokio,
//! channels, filesystem, or processes.

use std::time::Instant;

use crate::config::AgentSettings;
use crate::engine::event_handlers::{
    handle_inbound, handle_launch_completed, handle_maintenance, handle_probe,
    handle_registration, handle_shutdown, CoreStep,
};
use crate::engine::registry::TaskRegistry;
use crate::engine::stats::Stats;
use crate::engine::RuntimeEvent;

/// Pure core runtime state.
///
/// This owns:
/// - the agent settings (handlers, grace period, heartbeat flag)
/// - the task registry
/// - the per-period counters
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    settings: AgentSettings,
    registry: TaskRegistry,
    stats: Stats,
}

impl CoreRuntime {
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            settings,
            registry: TaskRegistry::new(),
            stats: Stats::default(),
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Read-only view of the registry (for tests and dry runs).
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Counters accumulated since the last maintenance sweep.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, now: Instant) -> CoreStep {
        match event {
            RuntimeEvent::Inbound(envelope) => {
                handle_inbound(&self.settings, &mut self.registry, envelope)
            }
            RuntimeEvent::LaunchCompleted { task_id, outcome } => handle_launch_completed(
                &self.settings,
                &mut self.registry,
                &mut self.stats,
                task_id,
                outcome,
                now,
            ),
            RuntimeEvent::ProbeCompleted { task_id, alive } => {
                handle_probe(&mut self.registry, task_id, alive, now)
            }
            RuntimeEvent::RegistrationDue => handle_registration(&self.settings),
            RuntimeEvent::MaintenanceDue => {
                handle_maintenance(&self.settings, &mut self.registry, &mut self.stats, now)
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown(&self.registry),
        }
    }
}
