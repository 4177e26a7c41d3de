// src/protocol/message.rs

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DispatchError;
use crate::protocol::Envelope;
use crate::types::{ReplyStatus, TaskId};

/// Free-form feedback mapping attached to a task reply.
pub type Feedback = Map<String, Value>;

pub const REGISTER_SUBJECT: &str = "task.register";
pub const STATS_SUBJECT: &str = "task.stats";

/// Correlation id for every reply about `task_id`.
pub fn reply_subject(task_id: &str) -> String {
    format!("task.reply.{task_id}")
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Inbound task-launch request.
///
/// Only `task_id` and `task_handler` are interpreted by the agent; every other
/// field belongs to the handler and is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    pub task_handler: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Snapshot of a request as written to the launched process's stdin:
/// `{"task": <descriptor>, "signature": "<base64>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task: Value,
    pub signature: String,
}

impl TaskInfo {
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Decode an envelope into the request descriptor and its info snapshot.
pub fn decode_task_request(
    envelope: &Envelope,
) -> Result<(TaskDescriptor, TaskInfo), DispatchError> {
    let task: Value = serde_json::from_slice(&envelope.payload)
        .map_err(|e| DispatchError::Decode(format!("payload is not JSON: {e}")))?;

    if !task.is_object() {
        return Err(DispatchError::Decode(format!(
            "payload must be a JSON object, got {}",
            json_kind(&task)
        )));
    }

    let descriptor: TaskDescriptor = serde_json::from_value(task.clone())
        .map_err(|e| DispatchError::Decode(format!("not a task request: {e}")))?;

    let info = TaskInfo {
        task,
        signature: encode_base64(&envelope.signature),
    };

    Ok((descriptor, info))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Feedback for a finished launch: `{rc, out: base64(output)}`.
pub fn launch_feedback(rc: i32, output: &[u8]) -> Feedback {
    let mut fb = Feedback::new();
    fb.insert("rc".to_string(), Value::from(rc));
    fb.insert("out".to_string(), Value::from(encode_base64(output)));
    fb
}

/// Feedback for a request rejected before any process was started.
///
/// Shaped like launch feedback (`rc = -1`, message as `out`) so routers can
/// treat both failure kinds alike; `msg` carries the plain text.
pub fn error_feedback(message: &str) -> Feedback {
    let mut fb = launch_feedback(-1, message.as_bytes());
    fb.insert("msg".to_string(), Value::from(message));
    fb
}

/// `task.reply.<task_id>` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReply {
    pub req: String,
    pub task_id: TaskId,
    pub status: ReplyStatus,
    #[serde(default)]
    pub feedback: Feedback,
}

impl TaskReply {
    pub fn new(task_id: &str, status: ReplyStatus, feedback: Feedback) -> Self {
        Self {
            req: reply_subject(task_id),
            task_id: task_id.to_string(),
            status,
            feedback,
        }
    }
}

/// `task.register` beacon. Not task-scoped, so no correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRegister {
    pub req: String,
    pub host: String,
}

impl TaskRegister {
    pub fn new(host: &str) -> Self {
        Self {
            req: REGISTER_SUBJECT.to_string(),
            host: host.to_string(),
        }
    }
}

/// Aggregate counters published after every maintenance sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub req: String,
    pub host: String,
    pub tasks_launched: u64,
    pub tasks_failed: u64,
    pub tasks_evicted: u64,
    pub tasks_active: u64,
    pub tasks_stopped: u64,
    pub launches_in_flight: u64,
}

/// Everything the agent ever sends to the router.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Reply(TaskReply),
    Register(TaskRegister),
    Stats(StatsReport),
}

impl OutboundMessage {
    /// Subject the router routes on.
    pub fn subject(&self) -> &str {
        match self {
            OutboundMessage::Reply(r) => &r.req,
            OutboundMessage::Register(r) => &r.req,
            OutboundMessage::Stats(s) => &s.req,
        }
    }

    pub fn as_reply(&self) -> Option<&TaskReply> {
        match self {
            OutboundMessage::Reply(r) => Some(r),
            _ => None,
        }
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl From<TaskReply> for OutboundMessage {
    fn from(r: TaskReply) -> Self {
        OutboundMessage::Reply(r)
    }
}

impl From<TaskRegister> for OutboundMessage {
    fn from(r: TaskRegister) -> Self {
        OutboundMessage::Register(r)
    }
}

impl From<StatsReport> for OutboundMessage {
    fn from(s: StatsReport) -> Self {
        OutboundMessage::Stats(s)
    }
}
