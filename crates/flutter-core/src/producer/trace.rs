//! Trace producers: replay an exemplar span tree at an interpolated rate.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::generator::interpolate;
use crate::signal::{
    Attributes, STATUS_CODE_ERROR, STATUS_CODE_OK, Span, SpanKind, Status, TracesBuilder, hex_id,
    key_values, timestamp_nanos,
};
use crate::state::RunState;

/// Fixed seed for span IDs, so span IDs repeat across runs.
const SPAN_ID_SEED: u64 = 0x5eed_5a11;

/// Upper bound, in standard deviations, of the jitter distribution.
const JITTER_MAX_SIGMA: f64 = 3.0;

/// Jitter scale in milliseconds.
const JITTER_MS: f64 = 2.0;

/// Template span; the root of an exemplar tree.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SpanSpec {
    /// Handle used by variant overrides
    #[serde(default, rename = "ref", skip_serializing_if = "String::is_empty")]
    pub reference: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Offset of this span's start from the trace start
    #[serde(default, rename = "start_ts", with = "humantime_serde")]
    pub start_ts: Duration,
    #[serde(default, with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub error: bool,
    #[serde(default, rename = "resourceAttributes")]
    pub resource_attributes: Attributes,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SpanSpec>,
}

impl SpanSpec {
    /// Levels in the subtree rooted here; a leaf is 1.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(SpanSpec::depth).max().unwrap_or(0)
    }

    pub fn span_count(&self) -> usize {
        1 + self.children.iter().map(SpanSpec::span_count).sum::<usize>()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TraceProducerSpec {
    #[serde(default, with = "humantime_serde")]
    pub at: Duration,
    #[serde(default, with = "humantime_serde")]
    pub to: Duration,
    pub exemplar: SpanSpec,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub rate: f64,
}

/// Source of span IDs, seeded once and independent of the run's random
/// source.
#[derive(Debug, Clone)]
pub struct SpanIdAllocator {
    rng: StdRng,
}

impl Default for SpanIdAllocator {
    fn default() -> Self {
        Self::with_seed(SPAN_ID_SEED)
    }
}

impl SpanIdAllocator {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_id(&mut self) -> [u8; 8] {
        let mut id = [0u8; 8];
        self.rng.fill(&mut id[..]);
        id
    }
}

/// Half-normal sample capped at 3 sigma, scaled into `[0, 1]`.
fn scaled_half_normal(rng: &mut impl Rng) -> f64 {
    loop {
        let x: f64 = rng.sample(StandardNormal);
        let x = x.min(JITTER_MAX_SIGMA);
        if x >= 0.0 {
            return x / JITTER_MAX_SIGMA;
        }
    }
}

fn millis(ms: f64) -> chrono::Duration {
    chrono::Duration::nanoseconds((ms * 1_000_000.0) as i64)
}

fn offset(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

#[derive(Debug, Clone)]
pub struct TraceProducer {
    spec: TraceProducerSpec,
    /// Rate at `spec.at`; interpolation runs from here to `spec.rate`
    start: f64,
}

impl TraceProducer {
    pub fn new(spec: TraceProducerSpec) -> Self {
        Self {
            start: spec.rate,
            spec,
        }
    }

    pub fn exemplar(&self) -> &SpanSpec {
        &self.spec.exemplar
    }

    pub fn window(&self) -> (Duration, Duration) {
        (self.spec.at, self.spec.to)
    }

    pub fn rate_at(&self, now: Duration) -> f64 {
        interpolate(
            self.start,
            self.spec.rate,
            self.spec.at,
            now,
            self.spec.to.saturating_sub(self.spec.at),
        )
    }

    /// Retarget the rate; the value in effect at `now` becomes the new start.
    pub fn set_rate(&mut self, at: Duration, to: Duration, now: Duration, rate: f64) {
        self.start = self.rate_at(now);
        self.spec.at = at;
        self.spec.to = to;
        self.spec.rate = rate;
    }

    pub fn set_start(&mut self, start: f64) {
        self.start = start;
    }

    /// Replay the exemplar `floor(rate)` times. Returns the number of spans
    /// written.
    pub fn emit(&self, state: &mut RunState, ids: &mut SpanIdAllocator, tb: &mut TracesBuilder) -> usize {
        if self.spec.disabled || state.tick < self.spec.at || state.tick > self.spec.to {
            return 0;
        }
        let rate = self.rate_at(state.tick);
        if rate <= 0.0 {
            return 0;
        }

        let mut written = 0;
        for _ in 0..rate as u64 {
            let base = state.wallclock - chrono::Duration::seconds(1)
                + chrono::Duration::nanoseconds(state.rng.random_range(0..1_000_000_000));
            let jitter = (
                scaled_half_normal(&mut state.rng) * JITTER_MS,
                scaled_half_normal(&mut state.rng) * JITTER_MS,
            );
            let mut trace_id = [0u8; 16];
            state.rng.fill(&mut trace_id[..]);

            written += replay(
                &self.spec.exemplar,
                base,
                jitter,
                &hex_id(&trace_id),
                "",
                ids,
                tb,
            );
        }
        written
    }
}

fn replay(
    span: &SpanSpec,
    base: DateTime<Utc>,
    jitter: (f64, f64),
    trace_id: &str,
    parent_id: &str,
    ids: &mut SpanIdAllocator,
    tb: &mut TracesBuilder,
) -> usize {
    let span_id = hex_id(&ids.next_id());
    let scale = span.depth() as f64;
    let start = base + offset(span.start_ts);
    let start_ts = start - millis(jitter.0 * scale);
    let end_ts = start + offset(span.duration) + millis(jitter.1 * scale);

    let status = if span.error {
        Status {
            code: STATUS_CODE_ERROR,
            message: "error".to_string(),
        }
    } else {
        Status {
            code: STATUS_CODE_OK,
            message: String::new(),
        }
    };

    tb.add_span(
        &span.resource_attributes,
        &Attributes::new(),
        Span {
            trace_id: trace_id.to_string(),
            span_id: span_id.clone(),
            parent_span_id: parent_id.to_string(),
            name: span.name.clone(),
            kind: SpanKind::parse(&span.kind),
            start_time_unix_nano: timestamp_nanos(start_ts),
            end_time_unix_nano: timestamp_nanos(end_ts),
            attributes: key_values(&span.attributes),
            status,
        },
    );

    1 + span
        .children
        .iter()
        .map(|child| replay(child, base, jitter, trace_id, &span_id, ids, tb))
        .sum::<usize>()
}

/// Trace producers keyed by ID, plus the span ID source they share.
#[derive(Debug, Default)]
pub struct TraceProducerRegistry {
    producers: BTreeMap<String, TraceProducer>,
    ids: SpanIdAllocator,
}

impl TraceProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, producer: TraceProducer) {
        self.producers.insert(id.into(), producer);
    }

    pub fn get(&self, id: &str) -> Option<&TraceProducer> {
        self.producers.get(id)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn set_rate(
        &mut self,
        id: &str,
        at: Duration,
        to: Duration,
        now: Duration,
        rate: f64,
        start: Option<f64>,
    ) -> Result<()> {
        let producer = self
            .producers
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTraceProducer(id.to_string()))?;
        producer.set_rate(at, to, now, rate);
        if let Some(start) = start {
            producer.set_start(start);
        }
        Ok(())
    }

    /// Returns the number of spans written.
    pub fn emit_all(&mut self, state: &mut RunState, tb: &mut TracesBuilder) -> usize {
        let mut written = 0;
        for producer in self.producers.values() {
            written += producer.emit(state, &mut self.ids, tb);
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn exemplar() -> SpanSpec {
        serde_json::from_str(
            r#"{
                "ref": "root",
                "name": "GET /checkout",
                "kind": "server",
                "duration": "120ms",
                "resourceAttributes": {"service.name": "frontend"},
                "attributes": {"http.method": "GET"},
                "children": [
                    {
                        "ref": "db",
                        "name": "SELECT orders",
                        "kind": "client",
                        "start_ts": "10ms",
                        "duration": "40ms",
                        "error": true,
                        "resourceAttributes": {"service.name": "frontend"}
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn producer(rate: f64) -> TraceProducer {
        TraceProducer::new(TraceProducerSpec {
            at: secs(0),
            to: secs(60),
            exemplar: exemplar(),
            disabled: false,
            rate,
        })
    }

    fn run_state() -> RunState {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        RunState::new(secs(120), 21, start)
    }

    #[test]
    fn test_exemplar_shape() {
        let e = exemplar();
        assert_eq!(e.depth(), 2);
        assert_eq!(e.span_count(), 2);
        assert_eq!(e.children[0].start_ts, Duration::from_millis(10));
    }

    #[test]
    fn test_emit_replays_tree_rate_times() {
        let p = producer(3.0);
        let mut rs = run_state();
        rs.advance_to(secs(5));
        let mut ids = SpanIdAllocator::default();
        let mut tb = TracesBuilder::new();

        assert_eq!(p.emit(&mut rs, &mut ids, &mut tb), 6);
        let td = tb.build();
        let spans: Vec<_> = td.spans().collect();

        let roots: Vec<_> = spans.iter().filter(|s| s.parent_span_id.is_empty()).collect();
        assert_eq!(roots.len(), 3);
        let trace_ids: HashSet<_> = roots.iter().map(|s| s.trace_id.clone()).collect();
        assert_eq!(trace_ids.len(), 3);

        for child in spans.iter().filter(|s| !s.parent_span_id.is_empty()) {
            let parent = roots.iter().find(|r| r.span_id == child.parent_span_id).unwrap();
            assert_eq!(parent.trace_id, child.trace_id);
            assert_eq!(child.status.code, STATUS_CODE_ERROR);
            assert_eq!(child.status.message, "error");
            assert_eq!(child.kind, SpanKind::Client);
        }
        for root in &roots {
            assert_eq!(root.status.code, STATUS_CODE_OK);
            assert_eq!(root.kind, SpanKind::Server);
            assert_eq!(root.trace_id.len(), 32);
            assert_eq!(root.span_id.len(), 16);
        }
    }

    #[test]
    fn test_span_times_are_near_wallclock() {
        let p = producer(1.0);
        let mut rs = run_state();
        rs.advance_to(secs(10));
        let mut ids = SpanIdAllocator::default();
        let mut tb = TracesBuilder::new();
        p.emit(&mut rs, &mut ids, &mut tb);

        let td = tb.build();
        let now = rs.wallclock.timestamp_nanos_opt().unwrap();
        for span in td.spans() {
            let start: i64 = span.start_time_unix_nano.parse().unwrap();
            let end: i64 = span.end_time_unix_nano.parse().unwrap();
            assert!(start < end);
            assert!(start > now - 1_100_000_000);
            assert!(end < now + 200_000_000);
        }
    }

    #[test]
    fn test_silent_outside_window() {
        let p = TraceProducer::new(TraceProducerSpec {
            at: secs(10),
            to: secs(20),
            exemplar: exemplar(),
            disabled: false,
            rate: 5.0,
        });
        let mut rs = run_state();
        let mut ids = SpanIdAllocator::default();
        let mut tb = TracesBuilder::new();

        rs.advance_to(secs(9));
        assert_eq!(p.emit(&mut rs, &mut ids, &mut tb), 0);
        rs.advance_to(secs(21));
        assert_eq!(p.emit(&mut rs, &mut ids, &mut tb), 0);
        rs.advance_to(secs(20));
        assert_eq!(p.emit(&mut rs, &mut ids, &mut tb), 10);
    }

    #[test]
    fn test_set_rate_starts_from_current_value() {
        let mut p = TraceProducer::new(TraceProducerSpec {
            at: secs(0),
            to: secs(100),
            exemplar: exemplar(),
            disabled: false,
            rate: 0.0,
        });
        p.set_rate(secs(0), secs(100), secs(0), 10.0);
        assert!((p.rate_at(secs(50)) - 5.0).abs() < 1e-9);

        p.set_rate(secs(50), secs(150), secs(50), 0.0);
        assert!((p.rate_at(secs(50)) - 5.0).abs() < 1e-9);
        assert!((p.rate_at(secs(100)) - 2.5).abs() < 1e-9);

        p.set_start(8.0);
        assert_eq!(p.rate_at(secs(50)), 8.0);
    }

    #[test]
    fn test_span_ids_are_deterministic() {
        let mut a = SpanIdAllocator::default();
        let mut b = SpanIdAllocator::default();
        for _ in 0..10 {
            assert_eq!(a.next_id(), b.next_id());
        }
    }

    #[test]
    fn test_registry_unknown_producer() {
        let mut reg = TraceProducerRegistry::new();
        assert!(matches!(
            reg.set_rate("nope", secs(0), secs(1), secs(0), 1.0, None),
            Err(Error::UnknownTraceProducer(_))
        ));
    }

    #[test]
    fn test_disabled_producer_is_silent() {
        let mut p = producer(5.0);
        p.spec.disabled = true;
        let mut rs = run_state();
        let mut ids = SpanIdAllocator::default();
        let mut tb = TracesBuilder::new();
        assert_eq!(p.emit(&mut rs, &mut ids, &mut tb), 0);
    }
}
