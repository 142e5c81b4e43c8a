use std::io::{self, Stderr, Write};

use flutter_core::signal::{MetricsData, TracesData};
use flutter_core::{EmitContext, EmitError, Emitter, RunState};

/// Overwrites a single progress line once per tick.
pub struct TickerEmitter<W: Write> {
    out: W,
}

impl TickerEmitter<Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> TickerEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Emitter for TickerEmitter<W> {
    fn name(&self) -> &str {
        "ticker"
    }

    // Called exactly once per tick, so the line is written here.
    fn emit_metrics(&mut self, ctx: &EmitContext, state: &RunState, _batch: &MetricsData) -> Result<(), EmitError> {
        ctx.check()?;
        write!(
            self.out,
            "Tick {} {:.2}% {}\r",
            state.tick.as_secs(),
            state.progress(),
            state.wallclock.format("%Y-%m-%d %H:%M:%S"),
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn emit_traces(&mut self, _ctx: &EmitContext, _state: &RunState, _batch: &TracesData) -> Result<(), EmitError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[test]
    fn test_progress_line() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let mut rs = RunState::new(Duration::from_secs(200), 1, start);
        rs.advance_to(Duration::from_secs(50));

        let ctx = EmitContext::new();
        let mut t = TickerEmitter::new(Vec::new());
        t.emit_metrics(&ctx, &rs, &MetricsData::default()).unwrap();
        t.emit_traces(&ctx, &rs, &TracesData::default()).unwrap();

        let line = String::from_utf8(t.into_inner()).unwrap();
        assert_eq!(line, "Tick 50 25.00% 2025-06-01 08:00:50\r");
    }
}
