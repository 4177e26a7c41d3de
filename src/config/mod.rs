// src/config/mod.rs

//! Configuration loading and validation for taskrunner.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate handlers and agent periods at load time (`validate.rs`).
//! - Convert the validated file into engine settings (`settings.rs`).

pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{AgentSection, ConfigFile, DurationSpec, HandlerConfig, RawConfigFile};
pub use settings::{AgentSettings, HandlerSpec, RuntimeTimers, TransportSettings};
