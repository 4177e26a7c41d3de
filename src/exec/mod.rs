// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running task bootstrap processes,
//! using `tokio::process::Command`, and for watching the processes they leave
//! behind. Everything reports back to the runtime via `RuntimeEvent`s.
//!
//! - [`launcher`] runs one bootstrap process and captures its output.
//! - [`backend`] provides the `LaunchBackend` trait and the concrete
//!   `RealLauncher` used in production, which tests replace with a fake.
//! - [`probe`] checks and signals processes through their pidfiles.
//! - [`watchdog`] runs the periodic per-task liveness probe.

pub mod backend;
pub mod launcher;
pub mod probe;
pub mod watchdog;

pub use backend::{LaunchBackend, RealLauncher};
pub use probe::{PidfileProbe, ProcessProbe};
pub use watchdog::spawn_watchdog;
