//! # flutter - synthetic OpenTelemetry load
//!
//! Runnable shell around [`flutter_core`]: YAML configuration loading and
//! merging, plus the emitters that take finished batches somewhere useful.

pub mod config;
pub mod emitters;

pub use config::{Config, ConfigLoadError, OtlpDestination, load_configs, load_timeline};
pub use emitters::{DebugEmitter, OtlpEmitter, TickerEmitter};
