//! Timeline compiler
//!
//! A timeline describes metrics and traces as piecewise curves per variant.
//! [`Timeline::merge_into_script`] lowers it into primitive actions:
//!
//! ```text
//! metric variant ──▶ metric action        (at first start, to last end)
//!                ├─▶ <id>_noise           normalNoise, always on
//!                ├─▶ <id>_ramp_<k>        one ramp per segment
//!                └─▶ disable/enableMetric around "disable" segments
//!
//! trace variant  ──▶ trace producer       exemplar with overrides applied
//!                └─▶ traceRate            one per segment
//! ```

mod metric;
mod trace;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::producer::SpanSpec;
use crate::script::Script;
use crate::signal::{Attributes, MetricKind};

pub use metric::metric_id;
pub use trace::{apply_overrides, trace_id};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    #[default]
    Segment,
    Disable,
}

/// One piece of a curve.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Segment {
    #[serde(default, rename = "type")]
    pub kind: SegmentKind,
    /// Optional after the first segment; zero continues from the previous end
    #[serde(default, rename = "start_ts", with = "humantime_serde")]
    pub start_ts: Duration,
    #[serde(default, rename = "end_ts", with = "humantime_serde")]
    pub end_ts: Duration,
    /// Optional; defaults to the previous segment's target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default)]
    pub target: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Variant {
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub timeline: Vec<Segment>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetricTimeline {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Zero means the default cadence
    #[serde(default, with = "humantime_serde")]
    pub frequency: Duration,
    #[serde(default)]
    pub resource_attributes: Attributes,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// Per-span changes applied to one trace variant, keyed by span `ref`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SpanOverride {
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    /// A `null` value removes the attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TraceVariant {
    #[serde(default, rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timeline: Vec<Segment>,
    #[serde(default)]
    pub overrides: BTreeMap<String, SpanOverride>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TraceTimeline {
    #[serde(default, rename = "ref")]
    pub reference: String,
    pub name: String,
    pub exemplar: SpanSpec,
    #[serde(default)]
    pub variants: Vec<TraceVariant>,
}

/// Top-level timeline document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Timeline {
    #[serde(default)]
    pub metrics: Vec<MetricTimeline>,
    #[serde(default)]
    pub traces: Vec<TraceTimeline>,
}

impl Timeline {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Append the compiled actions and trace producers to `script`.
    pub fn merge_into_script(&self, script: &mut Script) -> Result<()> {
        for m in &self.metrics {
            metric::merge_metric(script, m)?;
        }
        for t in &self.traces {
            trace::merge_trace(script, t)?;
        }
        Ok(())
    }
}

/// Copy of `base` with `patch` applied; `null` values in `patch` delete.
pub fn apply_map(base: &Attributes, patch: &Attributes) -> Attributes {
    let mut merged = base.clone();
    for (k, v) in patch {
        if v.is_null() {
            merged.remove(k);
        } else {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Render `x` in base 32 using digits `0-9a-v`.
pub(crate) fn format_base32(mut x: u64) -> String {
    const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";
    if x == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while x > 0 {
        out.push(DIGITS[(x % 32) as usize] as char);
        x /= 32;
    }
    out.iter().rev().collect()
}
