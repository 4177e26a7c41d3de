// src/protocol/mod.rs

//! Messages exchanged with the router.
//!
//! - [`envelope`]: what the transport hands in (payload + caller signature)
//!   and the line framing used on the wire.
//! - [`message`]: task requests, replies, registration beacons and stats
//!   reports.

pub mod envelope;
pub mod message;

pub use envelope::{decode_wire_line, Envelope, WireEnvelope};
pub use message::{
    decode_task_request, encode_base64, error_feedback, launch_feedback, reply_subject, Feedback,
    OutboundMessage, StatsReport, TaskDescriptor, TaskInfo, TaskRegister, TaskReply,
};
