use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{GeneratorSpec, MetricGenerator, check_variation, clamp_around};
use crate::error::ConfigError;
use crate::state::RunState;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RandomWalkSpec {
    #[serde(default)]
    pub target: f64,
    /// Fraction of the distance to `target` recovered per tick
    #[serde(default)]
    pub elasticity: f64,
    pub step_size: f64,
    #[serde(default)]
    pub variation: f64,
}

impl RandomWalkSpec {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.step_size <= 0.0 || self.step_size.is_nan() {
            return Err(ConfigError::InvalidStepSize(self.step_size));
        }
        check_variation(self.variation)
    }
}

/// Mean-reverting walk:
/// `x += elasticity * (target - x) + U(-stepSize, stepSize)`, clamped to
/// `target +/- variation`.
#[derive(Debug)]
pub struct RandomWalk {
    spec: RandomWalkSpec,
    current: f64,
}

impl RandomWalk {
    pub fn new(spec: RandomWalkSpec) -> Result<Self, ConfigError> {
        spec.validate()?;
        Ok(Self {
            current: spec.target,
            spec,
        })
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

impl MetricGenerator for RandomWalk {
    fn kind(&self) -> &'static str {
        "randomWalk"
    }

    fn emit(&mut self, state: &mut RunState, incoming: f64) -> f64 {
        let noise = (state.rng.random::<f64>() * 2.0 - 1.0) * self.spec.step_size;
        let pull = self.spec.elasticity * (self.spec.target - self.current);
        self.current = clamp_around(
            self.current + pull + noise,
            self.spec.target,
            self.spec.variation,
        );
        incoming + self.current
    }

    fn spec(&self) -> GeneratorSpec {
        GeneratorSpec::RandomWalk(self.spec.clone())
    }

    fn reconfigure(&mut self, _at: Duration, spec: &GeneratorSpec) -> Result<(), ConfigError> {
        let GeneratorSpec::RandomWalk(spec) = spec else {
            return Err(spec.mismatch(self.kind()));
        };
        spec.validate()?;
        self.spec = spec.clone();
        self.current = self.spec.target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn spec(target: f64, variation: f64) -> RandomWalkSpec {
        RandomWalkSpec {
            target,
            elasticity: 0.1,
            step_size: 4.0,
            variation,
        }
    }

    #[test]
    fn test_walk_stays_in_band() {
        let mut rs = RunState::new(Duration::from_secs(10), 99, Utc::now());
        let mut w = RandomWalk::new(spec(50.0, 5.0)).unwrap();
        for _ in 0..5000 {
            let v = w.emit(&mut rs, 0.0);
            assert!((45.0..=55.0).contains(&v), "{v} out of band");
        }
    }

    #[test]
    fn test_reconfigure_resets_to_target() {
        let mut rs = RunState::new(Duration::from_secs(10), 3, Utc::now());
        let mut w = RandomWalk::new(spec(10.0, 2.0)).unwrap();
        for _ in 0..10 {
            w.emit(&mut rs, 0.0);
        }
        w.reconfigure(Duration::from_secs(10), &GeneratorSpec::RandomWalk(spec(100.0, 2.0)))
            .unwrap();
        assert_eq!(w.current(), 100.0);
    }

    #[test]
    fn test_invalid_step_size() {
        let mut s = spec(0.0, 1.0);
        s.step_size = 0.0;
        assert_eq!(
            RandomWalk::new(s).unwrap_err(),
            ConfigError::InvalidStepSize(0.0)
        );
    }

    #[test]
    fn test_negative_variation_rejected() {
        assert_eq!(
            RandomWalk::new(spec(0.0, -1.0)).unwrap_err(),
            ConfigError::InvalidVariation(-1.0)
        );
    }
}
