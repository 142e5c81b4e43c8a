use std::io::Write;

use flutter_core::signal::{MetricsData, TracesData};
use flutter_core::{EmitContext, EmitError, Emitter, RunState};
use serde::Serialize;

#[derive(Serialize)]
struct Record<'a> {
    now: String,
    walltime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<&'a MetricsData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    traces: Option<&'a TracesData>,
}

impl<'a> Record<'a> {
    fn new(state: &RunState) -> Self {
        Self {
            now: humantime::format_duration(state.tick).to_string(),
            walltime: state.wallclock.to_rfc3339(),
            metrics: None,
            traces: None,
        }
    }
}

/// Writes each non-empty batch as one JSON line.
pub struct DebugEmitter<W: Write> {
    out: W,
}

impl<W: Write> DebugEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, record: &Record<'_>) -> Result<(), EmitError> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Emitter for DebugEmitter<W> {
    fn name(&self) -> &str {
        "debug"
    }

    fn emit_metrics(&mut self, ctx: &EmitContext, state: &RunState, batch: &MetricsData) -> Result<(), EmitError> {
        ctx.check()?;
        if batch.is_empty() {
            return Ok(());
        }
        let record = Record {
            metrics: Some(batch),
            ..Record::new(state)
        };
        self.write(&record)
    }

    fn emit_traces(&mut self, ctx: &EmitContext, state: &RunState, batch: &TracesData) -> Result<(), EmitError> {
        ctx.check()?;
        if batch.is_empty() {
            return Ok(());
        }
        let record = Record {
            traces: Some(batch),
            ..Record::new(state)
        };
        self.write(&record)
    }
}
