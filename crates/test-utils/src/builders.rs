#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Value};
use taskrunner::config::{
    AgentSection, AgentSettings, ConfigFile, DurationSpec, HandlerConfig, RawConfigFile,
    RuntimeTimers,
};
use taskrunner::config::model::default_handler_args;
use taskrunner::protocol::Envelope;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the `[agent]` defaults with a fixed `local_id` so tests do not
/// depend on the host name.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                agent: AgentSection {
                    local_id: Some("test-host".to_string()),
                    ..AgentSection::default()
                },
                handler: BTreeMap::new(),
            },
        }
    }

    pub fn with_handler(mut self, name: &str, handler: HandlerConfig) -> Self {
        self.config.handler.insert(name.to_string(), handler);
        self
    }

    pub fn local_id(mut self, id: &str) -> Self {
        self.config.agent.local_id = Some(id.to_string());
        self
    }

    pub fn pidfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.agent.pidfile = path.into();
        self
    }

    pub fn router(mut self, addr: &str) -> Self {
        self.config.agent.router = addr.to_string();
        self
    }

    pub fn reg_period(mut self, d: Duration) -> Self {
        self.config.agent.reg_period = DurationSpec::from(d);
        self
    }

    pub fn maint_period(mut self, d: Duration) -> Self {
        self.config.agent.maint_period = DurationSpec::from(d);
        self
    }

    pub fn grace_period(mut self, d: Duration) -> Self {
        self.config.agent.task_grace_period = DurationSpec::from(d);
        self
    }

    pub fn watchdog_tick(mut self, d: Duration) -> Self {
        self.config.agent.watchdog_tick = DurationSpec::from(d);
        self
    }

    pub fn heartbeat(mut self, val: bool) -> Self {
        self.config.agent.task_heartbeat = val;
        self
    }

    pub fn sudo(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.agent.sudo = path.into();
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `HandlerConfig`.
pub struct HandlerConfigBuilder {
    handler: HandlerConfig,
}

impl HandlerConfigBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            handler: HandlerConfig {
                program: program.to_string(),
                args: default_handler_args(),
                sudo_user: None,
            },
        }
    }

    /// Replace the argument template.
    pub fn args(mut self, args: &[&str]) -> Self {
        self.handler.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn sudo_user(mut self, user: &str) -> Self {
        self.handler.sudo_user = Some(user.to_string());
        self
    }

    pub fn build(self) -> HandlerConfig {
        self.handler
    }
}

/// Settings + timers for a config, with `config_path` as the path handed to
/// tasks.
pub fn settings_for(cfg: &ConfigFile, config_path: &Path) -> (AgentSettings, RuntimeTimers) {
    let settings =
        AgentSettings::from_config(cfg, config_path).expect("settings from valid config");
    let timers = RuntimeTimers::from_config(cfg).expect("timers from valid config");
    (settings, timers)
}

/// Payload of a task-launch request.
pub fn task_payload(task_id: &str, handler: &str) -> Value {
    json!({
        "task_id": task_id,
        "task_handler": handler,
    })
}

/// Envelope carrying a task-launch request with a fixed signature.
pub fn task_envelope(task_id: &str, handler: &str) -> Envelope {
    Envelope::from_json(&task_payload(task_id, handler), b"sig".to_vec())
        .expect("task payload serializes")
}
