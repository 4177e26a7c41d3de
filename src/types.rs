use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical task id type used throughout the agent.
pub type TaskId = String;

/// Watchdog state of a tracked task.
///
/// - `Active`: the watchdog timer is armed and probing the process.
/// - `Stopped`: the process was confirmed dead; the state lingers until the
///   maintenance sweep evicts it after the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Active,
    Stopped,
}

/// Lifecycle status carried by a `task.reply.<id>` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Starting,
    Launched,
    Failed,
    Running,
    Stopped,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Starting => "starting",
            ReplyStatus::Launched => "launched",
            ReplyStatus::Failed => "failed",
            ReplyStatus::Running => "running",
            ReplyStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "starting" => Ok(ReplyStatus::Starting),
            "launched" => Ok(ReplyStatus::Launched),
            "failed" => Ok(ReplyStatus::Failed),
            "running" => Ok(ReplyStatus::Running),
            "stopped" => Ok(ReplyStatus::Stopped),
            other => Err(format!("invalid reply status: {other}")),
        }
    }
}
