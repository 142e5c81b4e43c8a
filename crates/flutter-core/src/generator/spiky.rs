use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Direction, GeneratorSpec, MetricGenerator, check_variation, sample_poisson};
use crate::error::ConfigError;
use crate::state::RunState;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpikyNoiseSpec {
    /// Per-tick probability of OFF -> ON
    #[serde(default = "default_p_start")]
    pub p_start: f64,
    /// Per-tick probability of ON -> OFF
    #[serde(default = "default_p_end")]
    pub p_end: f64,
    /// Poisson mean while spiking
    #[serde(default = "default_peak_target")]
    pub peak_target: f64,
    #[serde(default = "default_variation")]
    pub variation: f64,
    #[serde(default = "default_direction")]
    pub direction: Direction,
}

fn default_p_start() -> f64 {
    0.02
}

fn default_p_end() -> f64 {
    0.20
}

fn default_peak_target() -> f64 {
    10.0
}

fn default_variation() -> f64 {
    3.0
}

fn default_direction() -> Direction {
    Direction::Positive
}

impl Default for SpikyNoiseSpec {
    fn default() -> Self {
        Self {
            p_start: default_p_start(),
            p_end: default_p_end(),
            peak_target: default_peak_target(),
            variation: default_variation(),
            direction: default_direction(),
        }
    }
}

impl SpikyNoiseSpec {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("pStart", self.p_start), ("pEnd", self.p_end)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }
        check_variation(self.variation)
    }
}

/// Two-state burst generator. Emits 0 while OFF; while ON emits a Poisson
/// sample around `peakTarget`.
#[derive(Debug)]
pub struct SpikyNoise {
    spec: SpikyNoiseSpec,
    spiking: bool,
}

impl SpikyNoise {
    pub fn new(spec: SpikyNoiseSpec) -> Result<Self, ConfigError> {
        spec.validate()?;
        Ok(Self {
            spec,
            spiking: false,
        })
    }

    pub fn is_spiking(&self) -> bool {
        self.spiking
    }

    fn sample(&mut self, rng: &mut impl Rng) -> f64 {
        if !self.spiking && rng.random::<f64>() < self.spec.p_start {
            self.spiking = true;
        }
        if !self.spiking {
            return 0.0;
        }

        let high = self.spec.peak_target + self.spec.variation;
        let mut noise = sample_poisson(self.spec.peak_target, rng).clamp(0.0, high.max(0.0));
        if self.spec.direction == Direction::Negative {
            noise = -noise;
        }

        if rng.random::<f64>() < self.spec.p_end {
            self.spiking = false;
        }
        noise
    }
}

impl MetricGenerator for SpikyNoise {
    fn kind(&self) -> &'static str {
        "spikyNoise"
    }

    fn emit(&mut self, state: &mut RunState, incoming: f64) -> f64 {
        incoming + self.sample(&mut state.rng)
    }

    /// On/off state carries over.
    fn spec(&self) -> GeneratorSpec {
        GeneratorSpec::SpikyNoise(self.spec.clone())
    }

    fn reconfigure(&mut self, _at: Duration, spec: &GeneratorSpec) -> Result<(), ConfigError> {
        let GeneratorSpec::SpikyNoise(spec) = spec else {
            return Err(spec.mismatch(self.kind()));
        };
        spec.validate()?;
        self.spec = spec.clone();
        Ok(())
    }
}
