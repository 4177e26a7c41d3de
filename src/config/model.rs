// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Placeholder replaced by the agent's config path in handler `args`.
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// Placeholder replaced by the task id in handler `args`.
pub const TASK_ID_PLACEHOLDER: &str = "{task_id}";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [agent]
/// local_id = "db1"
/// pidfile = "/run/taskrunner/taskrunner.pid"
/// router = "10.0.0.5:10000"
/// reg_period = "5m"
/// task_grace_period = 900
///
/// [handler.sample]
/// program = "/usr/lib/taskrunner/sample"
/// sudo_user = "postgres"
/// ```
///
/// This is the raw, unvalidated form. Use [`ConfigFile::try_from`] (or
/// `load_and_validate`) to obtain a checked [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Agent-wide settings from `[agent]`.
    #[serde(default)]
    pub agent: AgentSection,

    /// Handler modules from `[handler.<name>]`.
    ///
    /// Keys are the `task_handler` names tasks refer to.
    #[serde(default)]
    pub handler: BTreeMap<String, HandlerConfig>,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so the rest of the crate
/// can rely on handler entries and periods being sane.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub agent: AgentSection,
    pub handler: BTreeMap<String, HandlerConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        agent: AgentSection,
        handler: BTreeMap<String, HandlerConfig>,
    ) -> Self {
        Self { agent, handler }
    }
}

/// A period given either as integer seconds (`300`) or as a duration string
/// (`"5m"`, `"250ms"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    Seconds(u64),
    Text(String),
}

impl DurationSpec {
    pub fn to_duration(&self) -> Result<Duration, String> {
        match self {
            DurationSpec::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationSpec::Text(s) => parse_duration(s),
        }
    }
}

impl From<Duration> for DurationSpec {
    fn from(d: Duration) -> Self {
        DurationSpec::Text(format!("{}ms", d.as_millis()))
    }
}

/// `[agent]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Identity announced to the router. Defaults to the host name.
    #[serde(default, alias = "local-id")]
    pub local_id: Option<String>,

    /// The agent's own pidfile; task pidfiles are derived from it.
    #[serde(default = "default_pidfile")]
    pub pidfile: PathBuf,

    /// Router address (`host:port`).
    #[serde(default = "default_router")]
    pub router: String,

    #[serde(default = "default_reg_period", alias = "reg-period")]
    pub reg_period: DurationSpec,

    #[serde(default = "default_maint_period", alias = "maint-period")]
    pub maint_period: DurationSpec,

    /// How long a stopped task is remembered before the sweep forgets it.
    #[serde(default = "default_grace_period", alias = "task-grace-period")]
    pub task_grace_period: DurationSpec,

    /// Send a `running` reply on every watchdog tick while a task is alive.
    #[serde(default, alias = "task-heartbeat")]
    pub task_heartbeat: bool,

    #[serde(default = "default_watchdog_tick", alias = "watchdog-tick")]
    pub watchdog_tick: DurationSpec,

    #[serde(default = "default_reconnect_delay", alias = "reconnect-delay")]
    pub reconnect_delay: DurationSpec,

    /// Privilege-drop wrapper used for handlers with a `sudo_user`.
    #[serde(default = "default_sudo")]
    pub sudo: PathBuf,
}

fn default_pidfile() -> PathBuf {
    PathBuf::from("/run/taskrunner/taskrunner.pid")
}

fn default_router() -> String {
    "127.0.0.1:10000".to_string()
}

fn default_reg_period() -> DurationSpec {
    DurationSpec::Seconds(5 * 60)
}

fn default_maint_period() -> DurationSpec {
    DurationSpec::Seconds(60)
}

fn default_grace_period() -> DurationSpec {
    DurationSpec::Seconds(15 * 60)
}

fn default_watchdog_tick() -> DurationSpec {
    DurationSpec::Seconds(1)
}

fn default_reconnect_delay() -> DurationSpec {
    DurationSpec::Seconds(5)
}

fn default_sudo() -> PathBuf {
    PathBuf::from("/usr/bin/sudo")
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            local_id: None,
            pidfile: default_pidfile(),
            router: default_router(),
            reg_period: default_reg_period(),
            maint_period: default_maint_period(),
            task_grace_period: default_grace_period(),
            task_heartbeat: false,
            watchdog_tick: default_watchdog_tick(),
            reconnect_delay: default_reconnect_delay(),
            sudo: default_sudo(),
        }
    }
}

impl AgentSection {
    /// Configured `local_id`, falling back to the host name.
    pub fn effective_local_id(&self) -> String {
        self.local_id.clone().unwrap_or_else(hostname)
    }
}

/// `[handler.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    /// Entry point executable of the handler.
    pub program: String,

    /// Argument template; `{config}` and `{task_id}` are substituted.
    #[serde(default = "default_handler_args")]
    pub args: Vec<String>,

    /// Run the handler as this user through the `sudo` wrapper.
    #[serde(default, alias = "sudo")]
    pub sudo_user: Option<String>,
}

pub fn default_handler_args() -> Vec<String> {
    vec!["-d".to_string(), CONFIG_PLACEHOLDER.to_string()]
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(s.len());

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(value, 60, s),
        "h" => scaled_secs(value, 60 * 60, s),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn scaled_secs(value: u64, factor: u64, raw: &str) -> Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", raw))
}

fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    system_hostname().unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates
    // on success when the name fits.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    if name.is_empty() { None } else { Some(name) }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
