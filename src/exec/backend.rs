// src/exec/backend.rs

//! Pluggable launch backend abstraction.
//!
//! The runtime talks to a `LaunchBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake launcher in tests while
//! keeping the production implementation in [`launcher`](super::launcher).
//!
//! - `RealLauncher` spawns each bootstrap process on its own Tokio task and
//!   reports `RuntimeEvent::LaunchCompleted` when it exits, so the runtime
//!   loop keeps serving other messages and watchdog ticks meanwhile.
//! - Tests can provide their own `LaunchBackend` that, for example, records
//!   the requests and emits scripted outcomes.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::{LaunchRequest, RuntimeEvent};
use crate::errors::Result;

use super::launcher::launch_task;

/// Trait abstracting how task bootstrap processes are started.
///
/// Implementations must not wait for the process: they hand it off and
/// report completion later through the runtime event channel.
pub trait LaunchBackend: Send {
    fn launch(
        &mut self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Launcher used in production.
pub struct RealLauncher {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl RealLauncher {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { runtime_tx }
    }
}

impl LaunchBackend for RealLauncher {
    fn launch(
        &mut self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            let task_id = request.task_id.clone();
            tokio::spawn(async move {
                launch_task(request, tx).await;
                debug!(task_id = %task_id, "launch future finished");
            });
            Ok(())
        })
    }
}
