#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use taskrunner::config::ConfigFile;
use taskrunner::engine::{CoreCommand, CoreRuntime, CoreStep};
use taskrunner::protocol::{OutboundMessage, TaskReply};
use taskrunner::types::ReplyStatus;
use taskrunner_test_utils::builders::{settings_for, ConfigFileBuilder, HandlerConfigBuilder};

pub const CONFIG_PATH: &str = "/etc/taskrunner/taskrunner.toml";
pub const AGENT_PIDFILE: &str = "/run/taskrunner/agent.pid";

/// One handler (`sample`), a known pidfile and a short grace period.
pub fn sample_config() -> ConfigFile {
    sample_builder().build()
}

pub fn sample_builder() -> ConfigFileBuilder {
    ConfigFileBuilder::new()
        .local_id("db1")
        .pidfile(AGENT_PIDFILE)
        .grace_period(Duration::from_secs(900))
        .with_handler("sample", HandlerConfigBuilder::new("/usr/lib/taskrunner/sample").build())
}

pub fn core_for(cfg: &ConfigFile) -> CoreRuntime {
    let (settings, _timers) = settings_for(cfg, Path::new(CONFIG_PATH));
    CoreRuntime::new(settings)
}

/// Every task reply queued by a step, in order.
pub fn replies(step: &CoreStep) -> Vec<TaskReply> {
    step.commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::Send(OutboundMessage::Reply(r)) => Some(r.clone()),
            _ => None,
        })
        .collect()
}

pub fn statuses(step: &CoreStep) -> Vec<ReplyStatus> {
    replies(step).into_iter().map(|r| r.status).collect()
}
