// src/exec/watchdog.rs

//! Per-task watchdog timers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::engine::RuntimeEvent;
use crate::exec::probe::ProcessProbe;
use crate::types::TaskId;

/// Spawn the periodic liveness probe for one task.
///
/// Every `tick` the process behind `pidfile` is probed and the result sent
/// to the runtime as `ProbeCompleted`. The first probe happens one tick after
/// start, giving the bootstrap's detached process time to settle.
///
/// The loop ends by itself after reporting a dead process. Probe errors are
/// logged and the tick is skipped; the task stays active until a probe says
/// otherwise.
pub fn spawn_watchdog<P>(
    task_id: TaskId,
    pidfile: PathBuf,
    tick: Duration,
    probe: Arc<P>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()>
where
    P: ProcessProbe + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let alive = match probe.is_alive(&pidfile) {
                Ok(alive) => alive,
                Err(e) => {
                    warn!(task_id = %task_id, pidfile = ?pidfile, error = %e, "liveness probe failed");
                    continue;
                }
            };

            let event = RuntimeEvent::ProbeCompleted {
                task_id: task_id.clone(),
                alive,
            };
            if runtime_tx.send(event).await.is_err() {
                debug!(task_id = %task_id, "runtime gone; watchdog exiting");
                return;
            }

            if !alive {
                debug!(task_id = %task_id, "process gone; watchdog exiting");
                return;
            }
        }
    })
}
