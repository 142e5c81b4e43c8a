//! Emitter boundary: where finished batches leave the runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::EmitError;
use crate::signal::{MetricsData, TracesData};
use crate::state::RunState;

/// Context handed to every emitter call. Emitters check the cancellation
/// flag before doing I/O; the runner itself never reads it.
#[derive(Debug, Clone, Default)]
pub struct EmitContext {
    cancel: Arc<AtomicBool>,
}

impl EmitContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), EmitError> {
        if self.is_cancelled() {
            return Err(EmitError::Cancelled);
        }
        Ok(())
    }
}

/// Sink for per-tick batches. Any error aborts the run.
pub trait Emitter {
    fn name(&self) -> &str;

    fn emit_metrics(&mut self, ctx: &EmitContext, state: &RunState, batch: &MetricsData) -> Result<(), EmitError>;

    fn emit_traces(&mut self, ctx: &EmitContext, state: &RunState, batch: &TracesData) -> Result<(), EmitError>;
}

/// Keeps every non-empty batch in memory.
#[derive(Debug, Default)]
pub struct MemoryEmitter {
    pub metrics: Vec<(std::time::Duration, MetricsData)>,
    pub traces: Vec<(std::time::Duration, TracesData)>,
}

impl MemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Emitter for MemoryEmitter {
    fn name(&self) -> &str {
        "memory"
    }

    fn emit_metrics(&mut self, ctx: &EmitContext, state: &RunState, batch: &MetricsData) -> Result<(), EmitError> {
        ctx.check()?;
        if !batch.is_empty() {
            self.metrics.push((state.tick, batch.clone()));
        }
        Ok(())
    }

    fn emit_traces(&mut self, ctx: &EmitContext, state: &RunState, batch: &TracesData) -> Result<(), EmitError> {
        ctx.check()?;
        if !batch.is_empty() {
            self.traces.push((state.tick, batch.clone()));
        }
        Ok(())
    }
}
