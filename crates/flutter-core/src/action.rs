//! Script actions.
//!
//! On disk an action is `{id, at, to, type, spec}` with an open `spec` map.
//! Decoding goes through [`RawAction`] once and lands in a typed
//! [`ActionKind`]. Generator specs stay a [`GeneratorPatch`] so a later
//! action can change some fields and leave the rest alone.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::generator::GeneratorPatch;
use crate::producer::MetricSpec;

/// Rate change for a trace producer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TraceRateSpec {
    pub rate: f64,
    /// Overrides the interpolated starting rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    MetricGenerator(GeneratorPatch),
    Metric(MetricSpec),
    DisableMetric,
    EnableMetric,
    TraceRate(TraceRateSpec),
}

impl ActionKind {
    /// Wire name of the action type; also the secondary sort key.
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::MetricGenerator(_) => "metricGenerator",
            ActionKind::Metric(_) => "metric",
            ActionKind::DisableMetric => "disableMetric",
            ActionKind::EnableMetric => "enableMetric",
            ActionKind::TraceRate(_) => "traceRate",
        }
    }
}

/// A single scheduled event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    pub id: String,
    /// Offset from run start at which the action fires
    pub at: Duration,
    /// End of the window the action describes, if any
    pub to: Duration,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(id: impl Into<String>, at: Duration, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            at,
            to: Duration::ZERO,
            kind,
        }
    }

    pub fn with_to(mut self, to: Duration) -> Self {
        self.to = to;
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Latest offset this action refers to.
    pub fn horizon(&self) -> Duration {
        self.at.max(self.to)
    }
}

/// Serialized form of [`Action`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RawAction {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(default, with = "humantime_serde")]
    pub at: Duration,
    #[serde(default, with = "humantime_serde")]
    pub to: Duration,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub spec: serde_json::Value,
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let decode_err = |e: serde_json::Error| format!("action {}: invalid {} spec: {e}", raw.id, raw.kind);
        let kind = match raw.kind.as_str() {
            "metricGenerator" => {
                ActionKind::MetricGenerator(serde_json::from_value(raw.spec.clone()).map_err(decode_err)?)
            }
            "metric" => ActionKind::Metric(serde_json::from_value(raw.spec.clone()).map_err(decode_err)?),
            "disableMetric" => ActionKind::DisableMetric,
            "enableMetric" => ActionKind::EnableMetric,
            "traceRate" => ActionKind::TraceRate(serde_json::from_value(raw.spec.clone()).map_err(decode_err)?),
            other => return Err(format!("action {}: unknown action type {other:?}", raw.id)),
        };
        Ok(Action {
            id: raw.id,
            at: raw.at,
            to: raw.to,
            kind,
        })
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let kind = action.type_name().to_string();
        let spec = match &action.kind {
            ActionKind::MetricGenerator(s) => serde_json::to_value(s),
            ActionKind::Metric(s) => serde_json::to_value(s),
            ActionKind::TraceRate(s) => serde_json::to_value(s),
            ActionKind::DisableMetric | ActionKind::EnableMetric => Ok(serde_json::Value::Null),
        }
        .unwrap_or(serde_json::Value::Null);
        RawAction {
            id: action.id,
            at: action.at,
            to: action.to,
            kind,
            spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratorSpec, RampSpec};

    const SCRIPT: &str = r#"
- id: ramp
  type: metricGenerator
  spec:
    type: ramp
    start: 0
    target: 100
    duration: 10m
- id: cpu
  at: 0s
  to: 15m
  type: metric
  spec:
    type: gauge
    generators: [ramp]
    frequency: 10s
- id: cpu
  at: 12m
  type: disableMetric
- name: checkout-fast
  at: 1m
  to: 2m
  type: traceRate
  spec:
    rate: 30
"#;

    #[test]
    fn test_decode_script() {
        let actions: Vec<Action> = serde_yaml::from_str(SCRIPT).unwrap();
        assert_eq!(actions.len(), 4);

        let ActionKind::MetricGenerator(patch) = &actions[0].kind else {
            panic!("expected generator, got {:?}", actions[0].kind);
        };
        let GeneratorSpec::Ramp(ramp) = patch.resolve().unwrap() else {
            panic!("expected ramp");
        };
        assert_eq!(ramp.duration, Duration::from_secs(600));
        assert_eq!(actions[1].to, Duration::from_secs(900));
        assert_eq!(actions[2].kind, ActionKind::DisableMetric);
        assert_eq!(actions[3].id, "checkout-fast");
        assert_eq!(
            actions[3].kind,
            ActionKind::TraceRate(TraceRateSpec {
                rate: 30.0,
                start: None
            })
        );
    }

    #[test]
    fn test_unknown_action_type_rejected() {
        let err = serde_yaml::from_str::<Vec<Action>>("- id: x\n  type: explode\n").unwrap_err();
        assert!(err.to_string().contains("unknown action type"));
    }

    #[test]
    fn test_bad_spec_rejected() {
        let yaml = "- id: x\n  type: metricGenerator\n  spec:\n    type: sawtooth\n    target: 1\n";
        assert!(serde_yaml::from_str::<Vec<Action>>(yaml).is_err());

        let yaml = "- id: m\n  type: metric\n  spec:\n    type: gauge\n    generators: [x]\n    wobble: 3\n";
        assert!(serde_yaml::from_str::<Vec<Action>>(yaml).is_err());
    }

    #[test]
    fn test_partial_generator_spec_loads() {
        let yaml = "- id: r\n  at: 1m\n  type: metricGenerator\n  spec: {type: ramp, target: 0}\n";
        let actions: Vec<Action> = serde_yaml::from_str(yaml).unwrap();
        let ActionKind::MetricGenerator(patch) = &actions[0].kind else {
            panic!("expected generator");
        };
        assert_eq!(patch.kind(), "ramp");

        let yaml = serde_yaml::to_string(&actions[0]).unwrap();
        assert!(!yaml.contains("duration"));
    }

    #[test]
    fn test_dump_keeps_wire_shape() {
        let action = Action::new(
            "g",
            Duration::from_secs(30),
            ActionKind::MetricGenerator(GeneratorSpec::Ramp(RampSpec {
                start: 1.0,
                target: 2.0,
                duration: Duration::from_secs(60),
                prestart_zero: false,
                postend_zero: true,
            })
            .into()),
        );
        let yaml = serde_yaml::to_string(&action).unwrap();
        assert!(yaml.contains("type: metricGenerator"));
        assert!(yaml.contains("at: 30s"));
        assert!(yaml.contains("duration: 1m"));

        let back: Action = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_horizon() {
        let a = Action::new("x", Duration::from_secs(5), ActionKind::EnableMetric)
            .with_to(Duration::from_secs(20));
        assert_eq!(a.horizon(), Duration::from_secs(20));
    }
}
