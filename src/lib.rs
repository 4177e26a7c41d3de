// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod protocol;
pub mod transport;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{
    load_and_validate, AgentSettings, ConfigFile, RuntimeTimers, TransportSettings,
};
use crate::engine::dispatch::build_invocation;
use crate::engine::{task_pidfile, CoreRuntime, Runtime, RuntimeEvent};
use crate::exec::{PidfileProbe, RealLauncher};
use crate::fs::{write_own_pidfile, FileSystem, RealFileSystem};
use crate::transport::TcpTransport;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the agent pidfile
/// - router transport, launcher and process probe
/// - core runtime and its async shell
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = resolve_config_path(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let settings = AgentSettings::from_config(&cfg, &config_path)?;
    let timers = RuntimeTimers::from_config(&cfg)?;
    let transport_settings = TransportSettings::from_config(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &settings, &timers, &transport_settings);
        return Ok(());
    }

    let fs = RealFileSystem;
    let agent_pidfile = settings.agent_pidfile.clone();
    write_own_pidfile(&fs, &agent_pidfile)?;
    info!(pidfile = ?agent_pidfile, "wrote agent pidfile");

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);

    let transport = TcpTransport::spawn(transport_settings, rt_tx.clone());
    let launcher = RealLauncher::new(rt_tx.clone());
    let probe = Arc::new(PidfileProbe::new(RealFileSystem));

    spawn_signal_listener(rt_tx.clone());

    let core = CoreRuntime::new(settings);
    let runtime = Runtime::new(core, rt_rx, rt_tx, transport, launcher, probe, timers);
    let result = runtime.run().await;

    if let Err(e) = fs.remove(&agent_pidfile) {
        warn!(pidfile = ?agent_pidfile, error = %e, "failed to remove agent pidfile");
    }

    let core = result?;
    debug!(remaining = core.registry().len(), "agent stopped");
    Ok(())
}

/// Tasks receive the config path, so make it absolute when possible.
fn resolve_config_path(raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Ctrl-C (and SIGTERM on unix) → graceful shutdown.
fn spawn_signal_listener(tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            eprintln!("failed to listen for shutdown signals: {e}");
            return;
        }
        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Print the effective agent settings and every handler's invocation.
fn print_dry_run(
    cfg: &ConfigFile,
    settings: &AgentSettings,
    timers: &RuntimeTimers,
    transport: &TransportSettings,
) {
    println!("taskrunner dry-run");
    println!("  agent.local_id = {}", settings.local_id);
    println!("  agent.router = {}", transport.router);
    println!("  agent.pidfile = {}", settings.agent_pidfile.display());
    println!("  agent.reg_period = {:?}", timers.reg_period);
    println!("  agent.maint_period = {:?}", timers.maint_period);
    println!("  agent.watchdog_tick = {:?}", timers.watchdog_tick);
    println!("  agent.task_grace_period = {:?}", settings.grace_period);
    println!("  agent.task_heartbeat = {}", settings.task_heartbeat);
    println!();

    let example_id = "example-task";
    println!("handlers ({}):", cfg.handler.len());
    for (name, handler) in settings.handlers.iter() {
        let (program, args) = build_invocation(settings, handler, example_id);
        println!("  - {name}");
        println!("      cmd: {program} {}", args.join(" "));
        println!(
            "      pidfile: {}",
            task_pidfile(&settings.agent_pidfile, example_id).display()
        );
    }

    debug!(config = ?settings.config_path, "dry-run complete (no execution)");
}
