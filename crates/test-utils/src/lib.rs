//! Shared helpers for `taskrunner` integration tests: config builders, fake
//! IO backends for the runtime, and tracing setup.

pub mod builders;
pub mod fakes;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use taskrunner::logging::{filter_from_env, LOG_ENV};
use tracing_subscriber::fmt;

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Honours `TASKRUNNER_LOG` like the agent itself, e.g.
/// `TASKRUNNER_LOG=taskrunner::engine=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = filter_from_env(std::env::var(LOG_ENV).ok().as_deref());

        // Another harness may already own the global subscriber.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if it takes longer than five seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("test future did not finish within 5 seconds")
}
