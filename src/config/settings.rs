// src/config/settings.rs

//! Runtime-facing views of a validated [`ConfigFile`].
//!
//! The TOML model keeps periods as `DurationSpec` and handler argument
//! templates as plain strings; the engine wants `Duration`s and ready-made
//! launch descriptors. The conversion lives here so the core never touches
//! raw config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    ConfigFile, DurationSpec, HandlerConfig, CONFIG_PLACEHOLDER, TASK_ID_PLACEHOLDER,
};
use crate::errors::{Result, TaskRunnerError};

/// Launch descriptor for one handler module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub sudo_user: Option<String>,
}

impl HandlerSpec {
    pub fn from_config(name: &str, cfg: &HandlerConfig) -> Self {
        Self {
            name: name.to_string(),
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            sudo_user: cfg.sudo_user.clone(),
        }
    }

    /// Expand the argument template for a concrete task.
    pub fn render_args(&self, config_path: &Path, task_id: &str) -> Vec<String> {
        let config = config_path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(CONFIG_PLACEHOLDER, &config)
                    .replace(TASK_ID_PLACEHOLDER, task_id)
            })
            .collect()
    }
}

/// Everything the pure core needs to decide what to do with a request.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub local_id: String,
    /// Path of the config file; handed to every launched task.
    pub config_path: PathBuf,
    pub agent_pidfile: PathBuf,
    pub grace_period: Duration,
    pub task_heartbeat: bool,
    pub sudo: PathBuf,
    pub handlers: BTreeMap<String, HandlerSpec>,
}

impl AgentSettings {
    pub fn from_config(cfg: &ConfigFile, config_path: impl Into<PathBuf>) -> Result<Self> {
        let handlers = cfg
            .handler
            .iter()
            .map(|(name, h)| (name.clone(), HandlerSpec::from_config(name, h)))
            .collect();

        Ok(Self {
            local_id: cfg.agent.effective_local_id(),
            config_path: config_path.into(),
            agent_pidfile: cfg.agent.pidfile.clone(),
            grace_period: period("task_grace_period", &cfg.agent.task_grace_period)?,
            task_heartbeat: cfg.agent.task_heartbeat,
            sudo: cfg.agent.sudo.clone(),
            handlers,
        })
    }

    pub fn handler(&self, name: &str) -> Option<&HandlerSpec> {
        self.handlers.get(name)
    }
}

/// Periods driving the async shell's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeTimers {
    pub reg_period: Duration,
    pub maint_period: Duration,
    pub watchdog_tick: Duration,
}

impl RuntimeTimers {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Ok(Self {
            reg_period: period("reg_period", &cfg.agent.reg_period)?,
            maint_period: period("maint_period", &cfg.agent.maint_period)?,
            watchdog_tick: period("watchdog_tick", &cfg.agent.watchdog_tick)?,
        })
    }
}

/// Connection parameters for the router transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub router: String,
    pub reconnect_delay: Duration,
}

impl TransportSettings {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Ok(Self {
            router: cfg.agent.router.clone(),
            reconnect_delay: period("reconnect_delay", &cfg.agent.reconnect_delay)?,
        })
    }
}

fn period(key: &str, spec: &DurationSpec) -> Result<Duration> {
    spec.to_duration()
        .map_err(|e| TaskRunnerError::ConfigError(format!("[agent].{key}: {e}")))
}
