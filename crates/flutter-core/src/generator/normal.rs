use std::time::Duration;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::{Direction, GeneratorSpec, MetricGenerator, check_variation, clamp_around};
use crate::error::ConfigError;
use crate::state::RunState;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NormalNoiseSpec {
    /// Mean of the distribution
    #[serde(default)]
    pub target: f64,
    /// Negative means `variation / 3`
    #[serde(default = "default_std_dev")]
    pub std_dev: f64,
    /// Max deviation from `target` after clamping
    #[serde(default)]
    pub variation: f64,
    #[serde(default = "default_direction")]
    pub direction: Direction,
}

fn default_std_dev() -> f64 {
    -1.0
}

fn default_direction() -> Direction {
    Direction::Both
}

impl NormalNoiseSpec {
    pub fn effective_std_dev(&self) -> f64 {
        if self.std_dev < 0.0 {
            self.variation / 3.0
        } else {
            self.std_dev
        }
    }
}

/// Independent gaussian samples around `target`, clamped to
/// `target +/- variation`.
#[derive(Debug)]
pub struct NormalNoise {
    spec: NormalNoiseSpec,
    std_dev: f64,
}

impl NormalNoise {
    pub fn new(spec: NormalNoiseSpec) -> Result<Self, ConfigError> {
        check_variation(spec.variation)?;
        Ok(Self {
            std_dev: spec.effective_std_dev(),
            spec,
        })
    }

    /// Noise term before `target` is added. One-sided directions use
    /// rejection sampling.
    fn noise(&self, rng: &mut impl Rng) -> f64 {
        if self.spec.direction == Direction::Both {
            return rng.sample::<f64, _>(StandardNormal) * self.std_dev;
        }
        if self.std_dev <= 0.0 {
            return 0.0;
        }
        loop {
            let n = rng.sample::<f64, _>(StandardNormal) * self.std_dev;
            match self.spec.direction {
                Direction::Positive if n >= 0.0 => return n,
                Direction::Negative if n <= 0.0 => return n,
                _ => {}
            }
        }
    }
}

impl MetricGenerator for NormalNoise {
    fn kind(&self) -> &'static str {
        "normalNoise"
    }

    fn emit(&mut self, state: &mut RunState, incoming: f64) -> f64 {
        let x = self.spec.target + self.noise(&mut state.rng);
        incoming + clamp_around(x, self.spec.target, self.spec.variation)
    }

    fn spec(&self) -> GeneratorSpec {
        GeneratorSpec::NormalNoise(self.spec.clone())
    }

    fn reconfigure(&mut self, _at: Duration, spec: &GeneratorSpec) -> Result<(), ConfigError> {
        let GeneratorSpec::NormalNoise(spec) = spec else {
            return Err(spec.mismatch(self.kind()));
        };
        *self = NormalNoise::new(spec.clone())?;
        Ok(())
    }
}
