//! Script runner
//!
//! Owns the sorted action list and every registry, and drives the tick
//! loop:
//!
//! ```text
//!  tick t ──▶ dispatch due action ──▶ metric producers ──▶ MetricsData ─┐
//!                                 └─▶ trace producers  ──▶ TracesData ──┼─▶ emitters (t >= from)
//!                                                                       │
//!  sleep 1s (unless dry run) ◀──────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::action::{Action, ActionKind};
use crate::emitter::{EmitContext, Emitter};
use crate::error::{Error, Result};
use crate::generator::{GeneratorRegistry, GeneratorSpec, create_generator};
use crate::producer::{MetricProducerRegistry, TraceProducer, TraceProducerRegistry};
use crate::signal::{MetricsBuilder, MetricsData, TracesBuilder, TracesData};
use crate::state::RunState;

/// Run-level knobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    /// Zero picks a seed from the clock
    pub seed: u64,
    /// Defaults to now
    pub wallclock_start: Option<DateTime<Utc>>,
    /// Zero means "as long as the script"
    pub duration: Duration,
    /// Skip real-time pacing
    pub dry_run: bool,
    /// Batches before this offset are computed but not emitted
    pub from: Duration,
    /// Dispatch every due action per tick instead of one
    pub drain_due_actions: bool,
}

/// Batches produced by one tick.
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub metrics: MetricsData,
    pub traces: TracesData,
    pub dispatched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub actions_dispatched: usize,
    pub datapoints: usize,
    pub spans: usize,
}

#[derive(Debug, Default)]
pub struct Script {
    actions: Vec<Action>,
    duration: Duration,
    prepared: bool,
    generators: GeneratorRegistry,
    metrics: MetricProducerRegistry,
    traces: TraceProducerRegistry,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        let mut script = Self::new();
        script.add_actions(actions);
        script
    }

    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
        self.prepared = false;
    }

    pub fn add_actions(&mut self, actions: impl IntoIterator<Item = Action>) {
        for action in actions {
            self.add_action(action);
        }
    }

    /// Register a trace producer directly; `traceRate` actions address it by `id`.
    pub fn add_trace_producer(&mut self, id: impl Into<String>, producer: TraceProducer) {
        self.traces.insert(id, producer);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Run duration, valid after [`Script::prepare`].
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn generators(&self) -> &GeneratorRegistry {
        &self.generators
    }

    pub fn metrics(&self) -> &MetricProducerRegistry {
        &self.metrics
    }

    pub fn traces(&self) -> &TraceProducerRegistry {
        &self.traces
    }

    /// Sort the script, fix the run duration and create the generators.
    ///
    /// `configured` of zero means "derive from the script".
    pub fn prepare(&mut self, configured: Duration) -> Result<()> {
        if self.actions.is_empty() {
            return Err(Error::NoActions);
        }

        self.actions.sort_by(|a, b| {
            a.at.cmp(&b.at)
                .then_with(|| a.type_name().cmp(b.type_name()))
                .then_with(|| a.id.cmp(&b.id))
        });

        let required = self
            .actions
            .iter()
            .map(Action::horizon)
            .max()
            .unwrap_or(Duration::ZERO);
        if !configured.is_zero() && configured < required {
            return Err(Error::DurationTooShort {
                configured,
                required,
            });
        }
        self.duration = configured.max(required);

        // Producers may be created before a generator they reference is
        // dispatched, so every generator exists up front. Later patches are
        // checked against the spec they will be laid over.
        let mut specs: BTreeMap<&str, GeneratorSpec> = BTreeMap::new();
        for action in &self.actions {
            let ActionKind::MetricGenerator(patch) = &action.kind else {
                continue;
            };
            let wrap = |source| Error::Generator {
                id: action.id.clone(),
                source,
            };
            let spec = match specs.get(action.id.as_str()) {
                Some(prev) => patch.overlay(prev),
                None => patch.resolve(),
            }
            .map_err(wrap)?;
            create_generator(action.at, &spec).map_err(wrap)?;

            if !self.generators.contains(&action.id) {
                self.generators.apply(&action.id, action.at, patch)?;
            }
            specs.insert(&action.id, spec);
        }

        self.prepared = true;
        debug!(
            actions = self.actions.len(),
            generators = self.generators.len(),
            duration = ?self.duration,
            "script prepared"
        );
        Ok(())
    }

    /// Write the sorted action list as YAML.
    pub fn dump(&self, w: impl Write) -> Result<()> {
        serde_yaml::to_writer(w, &self.actions)?;
        Ok(())
    }

    fn dispatch(&mut self, index: usize, now: Duration) -> Result<()> {
        let action = &self.actions[index];
        debug!(
            id = %action.id,
            kind = action.type_name(),
            at = ?action.at,
            "dispatching action"
        );
        match &action.kind {
            ActionKind::MetricGenerator(patch) => self.generators.apply(&action.id, action.at, patch),
            ActionKind::Metric(spec) => self
                .metrics
                .apply(&action.id, action.to, spec, &self.generators),
            ActionKind::DisableMetric => self.metrics.set_enabled(&action.id, false),
            ActionKind::EnableMetric => self.metrics.set_enabled(&action.id, true),
            ActionKind::TraceRate(spec) => self.traces.set_rate(
                &action.id,
                action.at,
                action.to,
                now,
                spec.rate,
                spec.start,
            ),
        }
    }

    /// Advance one tick at `state.tick`: dispatch, then produce.
    pub fn tick(&mut self, state: &mut RunState, drain_due_actions: bool) -> Result<TickOutput> {
        let mut dispatched = 0;
        while state.current_action < self.actions.len()
            && self.actions[state.current_action].at <= state.tick
        {
            let index = state.current_action;
            state.current_action += 1;
            self.dispatch(index, state.tick)?;
            dispatched += 1;
            if !drain_due_actions {
                break;
            }
        }

        let mut mb = MetricsBuilder::new();
        self.metrics.emit_all(&mut self.generators, state, &mut mb)?;
        let mut tb = TracesBuilder::new();
        self.traces.emit_all(state, &mut tb);

        Ok(TickOutput {
            metrics: mb.build(),
            traces: tb.build(),
            dispatched,
        })
    }

    /// Run the whole script, pacing in real time unless `dry_run` is set.
    pub fn run(
        &mut self,
        config: &RunConfig,
        emitters: &mut [Box<dyn Emitter>],
        ctx: &EmitContext,
    ) -> Result<RunSummary> {
        if !self.prepared {
            self.prepare(config.duration)?;
        }

        let start = config.wallclock_start.unwrap_or_else(Utc::now);
        let mut state = RunState::new(self.duration, config.seed, start);
        let seconds = self.duration.as_secs();
        info!(
            duration = ?self.duration,
            seed = config.seed,
            actions = self.actions.len(),
            dry_run = config.dry_run,
            "starting run"
        );

        let mut summary = RunSummary::default();
        for tick in 0..=seconds {
            state.advance_to(Duration::from_secs(tick));
            let out = self.tick(&mut state, config.drain_due_actions)?;

            summary.ticks += 1;
            summary.actions_dispatched += out.dispatched;
            summary.datapoints += out.metrics.datapoint_count();
            summary.spans += out.traces.span_count();

            if state.tick >= config.from {
                for emitter in emitters.iter_mut() {
                    let sent = emitter
                        .emit_metrics(ctx, &state, &out.metrics)
                        .and_then(|()| emitter.emit_traces(ctx, &state, &out.traces));
                    if let Err(e) = sent {
                        warn!(emitter = emitter.name(), error = %e, "emitter failed");
                        return Err(e.into());
                    }
                }
            }

            if !config.dry_run && tick < seconds {
                std::thread::sleep(Duration::from_secs(1));
            }
        }

        info!(
            ticks = summary.ticks,
            datapoints = summary.datapoints,
            spans = summary.spans,
            "run finished"
        );
        Ok(summary)
    }
}
