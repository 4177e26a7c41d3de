// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum TaskRunnerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why an inbound task request did not lead to a launch.
///
/// Returned by the dispatch step; the caller decides how to log it and
/// whether a reply goes out (only `UnconfiguredHandler` produces one).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("cannot decode task request: {0}")]
    Decode(String),

    #[error("invalid task id: {0:?}")]
    InvalidTaskId(String),

    #[error("task {0} is already known")]
    Duplicate(TaskId),

    #[error("Task module {handler:?} not configured")]
    UnconfiguredHandler { task_id: TaskId, handler: String },
}

/// Failure while probing or signalling a task process through its pidfile.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("cannot read pidfile {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pidfile {path} does not contain a valid pid: {content:?}")]
    InvalidPid { path: String, content: String },

    #[error("signal to pid {pid} failed: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("process signalling is not supported on this platform")]
    Unsupported,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskRunnerError>;
