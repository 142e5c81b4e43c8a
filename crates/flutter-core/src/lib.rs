//! # flutter-core - synthetic OpenTelemetry load
//!
//! Discrete-event simulation core: a script of timed actions drives stateful
//! value generators and producers, one simulated second per tick, and hands
//! OTLP-shaped metric and trace batches to emitters.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          flutter-core                            │
//! │                                                                  │
//! │   Timeline ──merge_into_script──▶ Script (sorted Actions)        │
//! │                                      │                           │
//! │                                      ▼ tick loop                 │
//! │   ┌────────────────┐   fold   ┌─────────────────┐                │
//! │   │ Generators     │─────────▶│ MetricProducers │──▶ MetricsData │
//! │   │ (by ID)        │          │ (gauge / sum)   │                │
//! │   └────────────────┘          └─────────────────┘                │
//! │                               ┌─────────────────┐                │
//! │                               │ TraceProducers  │──▶ TracesData  │
//! │                               │ (exemplar tree) │                │
//! │                               └─────────────────┘                │
//! │                                      │                           │
//! │                                      ▼                           │
//! │                               dyn Emitter (external)             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! One [`RunState`] exists per run and owns the seeded random source; every
//! generator and producer borrows it for its draws. Registries iterate in ID
//! order, so a non-zero seed reproduces a run exactly. Span IDs come from a
//! separate fixed-seed source owned by the trace producer registry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flutter_core::{EmitContext, Emitter, MemoryEmitter, RunConfig, Script, Timeline};
//!
//! let timeline = Timeline::from_json(r#"{"metrics": [{
//!     "name": "requests", "type": "gauge",
//!     "variants": [{"timeline": [{"end_ts": "10m", "target": 100}]}]
//! }]}"#).unwrap();
//!
//! let mut script = Script::new();
//! timeline.merge_into_script(&mut script).unwrap();
//!
//! let config = RunConfig { seed: 42, dry_run: true, ..Default::default() };
//! let mut emitters: Vec<Box<dyn Emitter>> = vec![Box::new(MemoryEmitter::new())];
//! let summary = script.run(&config, &mut emitters, &EmitContext::new()).unwrap();
//! println!("{} datapoints", summary.datapoints);
//! ```

pub mod action;
pub mod emitter;
pub mod error;
pub mod generator;
pub mod producer;
pub mod script;
pub mod signal;
pub mod state;
pub mod timeline;

pub use action::{Action, ActionKind, RawAction, TraceRateSpec};
pub use emitter::{EmitContext, Emitter, MemoryEmitter};
pub use error::{ConfigError, EmitError, Error, Result};
pub use generator::{
    Direction, GeneratorPatch, GeneratorRegistry, GeneratorSpec, MetricGenerator, create_generator,
    list_generators,
};
pub use producer::{
    DEFAULT_FREQUENCY, MetricAttributes, MetricProducer, MetricProducerRegistry, MetricSpec,
    SpanSpec, TraceProducer, TraceProducerRegistry, TraceProducerSpec,
};
pub use script::{RunConfig, RunSummary, Script, TickOutput};
pub use signal::{MetricKind, MetricsData, TracesData};
pub use state::RunState;
pub use timeline::Timeline;
