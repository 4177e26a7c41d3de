// src/engine/registry.rs

//! Task registry: the agent's record of launched and recently-finished tasks.
//!
//! The registry is owned by [`crate::engine::CoreRuntime`] and only mutated
//! from the runtime loop, so it needs no locking. All changes go through a
//! small set of operations:
//! - `begin_launch` / `finish_launch` bracket an in-flight launch,
//! - `insert_if_absent` records a successfully launched task,
//! - `mark_dead` performs the single ACTIVE -> STOPPED transition,
//! - `evict_expired` forgets stopped tasks past the grace period.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::protocol::TaskInfo;
use crate::types::{TaskId, TaskStatus};

/// Label used for a task's pidfile and in logs.
pub fn task_label(task_id: &str) -> String {
    format!("task_{task_id}")
}

/// Derive a task pidfile from the agent pidfile:
/// `/run/agent.pid` -> `/run/agent.task_<id>.pid`.
pub fn task_pidfile(agent_pidfile: &Path, task_id: &str) -> PathBuf {
    let label = task_label(task_id);
    let stem = agent_pidfile
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match agent_pidfile.extension() {
        Some(ext) => format!("{stem}.{label}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{label}"),
    };
    agent_pidfile.with_file_name(file_name)
}

/// State of one launched task, driven by its watchdog.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub uid: TaskId,
    pub name: String,
    pub handler: String,
    pub info: TaskInfo,
    pub pidfile: PathBuf,
    pub status: TaskStatus,
    pub heartbeat: bool,
    pub start_time: Option<Instant>,
    pub dead_since: Option<Instant>,
}

impl TaskState {
    pub fn new(uid: &str, handler: &str, info: TaskInfo, pidfile: PathBuf) -> Self {
        Self {
            uid: uid.to_string(),
            name: task_label(uid),
            handler: handler.to_string(),
            info,
            pidfile,
            status: TaskStatus::Active,
            heartbeat: false,
            start_time: None,
            dead_since: None,
        }
    }

    /// Record the start time; the caller arms the watchdog.
    pub fn start(&mut self, now: Instant) {
        self.start_time = Some(now);
        self.status = TaskStatus::Active;
    }

    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    /// Stopped and dead for strictly longer than `grace`.
    pub fn expired(&self, now: Instant, grace: Duration) -> bool {
        match (self.status, self.dead_since) {
            (TaskStatus::Stopped, Some(dead_since)) => {
                now.saturating_duration_since(dead_since) > grace
            }
            _ => false,
        }
    }
}

/// What the registry remembers about a launch that has not finished yet.
#[derive(Debug, Clone)]
pub struct PendingLaunch {
    pub handler: String,
    pub info: TaskInfo,
    pub pidfile: PathBuf,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskState>,
    launching: HashMap<TaskId, PendingLaunch>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the id has a task state or a launch in flight.
    pub fn is_known(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id) || self.launching.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskState> {
        self.tasks.get(task_id)
    }

    pub fn is_launching(&self, task_id: &str) -> bool {
        self.launching.contains_key(task_id)
    }

    /// Remember an in-flight launch. Returns false if the id is already known.
    pub fn begin_launch(&mut self, task_id: &str, pending: PendingLaunch) -> bool {
        if self.is_known(task_id) {
            return false;
        }
        self.launching.insert(task_id.to_string(), pending);
        true
    }

    pub fn finish_launch(&mut self, task_id: &str) -> Option<PendingLaunch> {
        self.launching.remove(task_id)
    }

    /// Insert a task state unless one already exists for its id.
    pub fn insert_if_absent(&mut self, state: TaskState) -> bool {
        if self.tasks.contains_key(&state.uid) {
            return false;
        }
        self.tasks.insert(state.uid.clone(), state);
        true
    }

    /// ACTIVE -> STOPPED. Returns the updated state only when this call made
    /// the transition; later calls (or unknown ids) return `None`.
    pub fn mark_dead(&mut self, task_id: &str, now: Instant) -> Option<&TaskState> {
        let state = self.tasks.get_mut(task_id)?;
        if !state.is_active() {
            return None;
        }
        state.status = TaskStatus::Stopped;
        state.dead_since = Some(now);
        debug!(task_id = %state.uid, "task marked stopped");
        Some(&*state)
    }

    /// Remove every stopped task whose process has been dead for longer than
    /// `grace`, returning the evicted states.
    pub fn evict_expired(&mut self, now: Instant, grace: Duration) -> Vec<TaskState> {
        let expired: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|s| s.expired(now, grace))
            .map(|s| s.uid.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.tasks.remove(&id))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskState> {
        self.tasks.values()
    }

    pub fn active(&self) -> impl Iterator<Item = &TaskState> {
        self.tasks.values().filter(|s| s.is_active())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn stopped_count(&self) -> usize {
        self.tasks.len() - self.active_count()
    }

    pub fn launching_count(&self) -> usize {
        self.launching.len()
    }
}
