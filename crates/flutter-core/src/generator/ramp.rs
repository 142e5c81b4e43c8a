use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GeneratorSpec, MetricGenerator};
use crate::error::ConfigError;
use crate::state::RunState;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RampSpec {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub target: f64,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Emit 0 instead of `start` before the anchor
    #[serde(default, rename = "prestart_zero")]
    pub prestart_zero: bool,
    /// Emit 0 instead of `target` once the ramp is over
    #[serde(default, rename = "postend_zero")]
    pub postend_zero: bool,
}

/// Linear interpolation from `start` to `target`, anchored at `start_at`
/// and evaluated at `now`.
pub fn interpolate(start: f64, target: f64, start_at: Duration, now: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return target;
    }
    if now <= start_at {
        return start;
    }
    let elapsed = now - start_at;
    if elapsed >= duration {
        return target;
    }
    start + (target - start) * (elapsed.as_secs_f64() / duration.as_secs_f64())
}

#[derive(Debug)]
pub struct Ramp {
    spec: RampSpec,
    /// Anchor: offset at which the ramp leaves `start`
    at: Duration,
}

impl Ramp {
    pub fn new(at: Duration, spec: RampSpec) -> Result<Self, ConfigError> {
        if spec.duration.is_zero() {
            return Err(ConfigError::InvalidDuration);
        }
        Ok(Self { spec, at })
    }

    pub fn value_at(&self, now: Duration) -> f64 {
        if now < self.at && self.spec.prestart_zero {
            return 0.0;
        }
        if now >= self.at + self.spec.duration && self.spec.postend_zero {
            return 0.0;
        }
        interpolate(self.spec.start, self.spec.target, self.at, now, self.spec.duration)
    }
}

impl MetricGenerator for Ramp {
    fn kind(&self) -> &'static str {
        "ramp"
    }

    fn emit(&mut self, state: &mut RunState, incoming: f64) -> f64 {
        incoming + self.value_at(state.tick)
    }

    fn spec(&self) -> GeneratorSpec {
        GeneratorSpec::Ramp(self.spec.clone())
    }

    fn reconfigure(&mut self, at: Duration, spec: &GeneratorSpec) -> Result<(), ConfigError> {
        let GeneratorSpec::Ramp(spec) = spec else {
            return Err(spec.mismatch(self.kind()));
        };
        if spec.duration.is_zero() {
            return Err(ConfigError::InvalidDuration);
        }

        let mut next = spec.clone();
        if at > self.at {
            // continue from wherever the old curve is right now
            next.start = self.value_at(at);
        }
        self.spec = next;
        self.at = at;
        Ok(())
    }
}
