// src/config/validate.rs

use std::sync::OnceLock;

use regex::Regex;

use crate::config::model::{
    AgentSection, ConfigFile, DurationSpec, HandlerConfig, RawConfigFile, CONFIG_PLACEHOLDER,
    TASK_ID_PLACEHOLDER,
};
use crate::errors::{Result, TaskRunnerError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskRunnerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.agent, raw.handler))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_handlers(cfg)?;
    validate_agent(&cfg.agent)?;
    for (name, handler) in cfg.handler.iter() {
        validate_handler(name, handler)?;
    }
    Ok(())
}

fn ensure_has_handlers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.handler.is_empty() {
        return Err(TaskRunnerError::ConfigError(
            "config must contain at least one [handler.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_agent(agent: &AgentSection) -> Result<()> {
    if let Some(id) = &agent.local_id {
        if id.trim().is_empty() {
            return Err(TaskRunnerError::ConfigError(
                "[agent].local_id must not be empty".to_string(),
            ));
        }
    }

    if agent.router.trim().is_empty() {
        return Err(TaskRunnerError::ConfigError(
            "[agent].router must not be empty".to_string(),
        ));
    }

    if agent.pidfile.file_name().is_none() {
        return Err(TaskRunnerError::ConfigError(format!(
            "[agent].pidfile must name a file (got {:?})",
            agent.pidfile
        )));
    }

    ensure_positive("reg_period", &agent.reg_period)?;
    ensure_positive("maint_period", &agent.maint_period)?;
    ensure_positive("task_grace_period", &agent.task_grace_period)?;
    ensure_positive("watchdog_tick", &agent.watchdog_tick)?;
    ensure_positive("reconnect_delay", &agent.reconnect_delay)?;

    Ok(())
}

fn ensure_positive(key: &str, spec: &DurationSpec) -> Result<()> {
    let dur = spec
        .to_duration()
        .map_err(|e| TaskRunnerError::ConfigError(format!("[agent].{key}: {e}")))?;
    if dur.is_zero() {
        return Err(TaskRunnerError::ConfigError(format!(
            "[agent].{key} must be greater than zero"
        )));
    }
    Ok(())
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("placeholder regex is valid"))
}

fn validate_handler(name: &str, handler: &HandlerConfig) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TaskRunnerError::ConfigError(
            "handler name must not be empty".to_string(),
        ));
    }

    if handler.program.trim().is_empty() {
        return Err(TaskRunnerError::ConfigError(format!(
            "handler '{}' has an empty `program`",
            name
        )));
    }

    for arg in handler.args.iter() {
        for m in placeholder_regex().find_iter(arg) {
            let placeholder = m.as_str();
            if placeholder != CONFIG_PLACEHOLDER && placeholder != TASK_ID_PLACEHOLDER {
                return Err(TaskRunnerError::ConfigError(format!(
                    "handler '{}' uses unknown placeholder '{}' in `args` (expected {} or {})",
                    name, placeholder, CONFIG_PLACEHOLDER, TASK_ID_PLACEHOLDER
                )));
            }
        }
    }

    if let Some(user) = &handler.sudo_user {
        if user.trim().is_empty() {
            return Err(TaskRunnerError::ConfigError(format!(
                "handler '{}' has an empty `sudo_user`",
                name
            )));
        }
    }

    Ok(())
}
