// src/engine/dispatch.rs

//! Turning an inbound envelope into a launch request.
//!
//! [`plan_launch`] performs every check that happens before the `starting`
//! reply: decoding, task id validation, deduplication and handler lookup.
//! It returns a typed error instead of logging, so the caller decides what
//! gets logged and whether a reply is owed.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::{AgentSettings, HandlerSpec};
use crate::engine::registry::{task_pidfile, PendingLaunch, TaskRegistry};
use crate::errors::DispatchError;
use crate::protocol::{decode_task_request, Envelope, TaskInfo};
use crate::types::TaskId;

/// Environment variable carrying the derived pidfile path to the task.
pub const TASK_PIDFILE_ENV: &str = "TASKRUNNER_TASK_PIDFILE";

fn task_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("task id regex is valid"))
}

/// Task ids are restricted to `[-a-zA-Z0-9_]+` so they are safe to embed in
/// file names.
pub fn is_valid_task_id(task_id: &str) -> bool {
    task_id_regex().is_match(task_id)
}

/// Everything needed to start the bootstrap process of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub task_id: TaskId,
    pub handler: String,
    pub program: String,
    pub args: Vec<String>,
    /// Serialized [`TaskInfo`], written to the process's stdin.
    pub stdin: Vec<u8>,
    pub pidfile: PathBuf,
    pub info: TaskInfo,
}

impl LaunchRequest {
    /// Human-readable command line, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn pending(&self) -> PendingLaunch {
        PendingLaunch {
            handler: self.handler.clone(),
            info: self.info.clone(),
            pidfile: self.pidfile.clone(),
        }
    }
}

/// Result of a finished bootstrap process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Exit code; `-1` when the process could not be spawned or was killed by
    /// a signal.
    pub rc: i32,
    /// Combined stdout/stderr, in arrival order.
    pub output: Vec<u8>,
}

impl LaunchOutcome {
    pub fn new(rc: i32, output: impl Into<Vec<u8>>) -> Self {
        Self {
            rc,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.rc == 0
    }
}

/// Validate an inbound request and build its launch request.
pub fn plan_launch(
    settings: &AgentSettings,
    registry: &TaskRegistry,
    envelope: &Envelope,
) -> Result<LaunchRequest, DispatchError> {
    let (descriptor, info) = decode_task_request(envelope)?;
    let task_id = descriptor.task_id;

    if !is_valid_task_id(&task_id) {
        return Err(DispatchError::InvalidTaskId(task_id));
    }

    if registry.is_known(&task_id) {
        return Err(DispatchError::Duplicate(task_id));
    }

    let handler = settings.handler(&descriptor.task_handler).ok_or_else(|| {
        DispatchError::UnconfiguredHandler {
            task_id: task_id.clone(),
            handler: descriptor.task_handler.clone(),
        }
    })?;

    let stdin = info
        .to_json_bytes()
        .map_err(|e| DispatchError::Decode(format!("cannot serialize task info: {e}")))?;

    let (program, args) = build_invocation(settings, handler, &task_id);

    Ok(LaunchRequest {
        pidfile: task_pidfile(&settings.agent_pidfile, &task_id),
        task_id,
        handler: handler.name.clone(),
        program,
        args,
        stdin,
        info,
    })
}

/// `[sudo -n -u <user>] <program> <rendered args>`.
pub fn build_invocation(
    settings: &AgentSettings,
    handler: &HandlerSpec,
    task_id: &str,
) -> (String, Vec<String>) {
    let rendered = handler.render_args(&settings.config_path, task_id);

    match &handler.sudo_user {
        Some(user) => {
            let mut args = vec![
                "-n".to_string(),
                "-u".to_string(),
                user.clone(),
                handler.program.clone(),
            ];
            args.extend(rendered);
            (settings.sudo.to_string_lossy().into_owned(), args)
        }
        None => (handler.program.clone(), rendered),
    }
}
