use std::time::Duration;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::{Direction, GeneratorSpec, MetricGenerator, check_variation};
use crate::error::ConfigError;
use crate::state::RunState;

/// Above this mean the normal approximation is used.
const KNUTH_LIMIT: f64 = 30.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PoissonNoiseSpec {
    /// Expected count per tick
    #[serde(default)]
    pub target: f64,
    #[serde(default)]
    pub variation: f64,
    #[serde(default = "default_direction")]
    pub direction: Direction,
}

fn default_direction() -> Direction {
    Direction::Positive
}

/// Draw a Poisson(lambda) variate.
///
/// Knuth's multiplication method below 30, `round(N(lambda, sqrt(lambda)))`
/// above. Non-positive lambda yields 0.
pub fn sample_poisson(lambda: f64, rng: &mut impl Rng) -> f64 {
    if lambda <= 0.0 || lambda.is_nan() {
        return 0.0;
    }
    if lambda < KNUTH_LIMIT {
        let limit = (-lambda).exp();
        let mut k = 0u64;
        let mut p = 1.0;
        while p > limit {
            k += 1;
            p *= rng.random::<f64>();
        }
        return (k - 1) as f64;
    }
    let n: f64 = rng.sample(StandardNormal);
    (n * lambda.sqrt() + lambda).round()
}

/// Poisson counts clamped into `[max(0, target - variation), target + variation]`.
#[derive(Debug)]
pub struct PoissonNoise {
    spec: PoissonNoiseSpec,
}

impl PoissonNoise {
    pub fn new(spec: PoissonNoiseSpec) -> Result<Self, ConfigError> {
        check_variation(spec.variation)?;
        Ok(Self { spec })
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        let lambda = self.spec.target;
        let low = (lambda - self.spec.variation).max(0.0);
        let high = lambda + self.spec.variation;
        let mut sample = sample_poisson(lambda, rng);
        if sample < low {
            sample = low;
        } else if sample > high {
            sample = high;
        }

        match self.spec.direction {
            Direction::Positive if sample < 0.0 => 0.0,
            Direction::Negative if sample > 0.0 => -sample,
            _ => sample,
        }
    }
}

impl MetricGenerator for PoissonNoise {
    fn kind(&self) -> &'static str {
        "poissonNoise"
    }

    fn emit(&mut self, state: &mut RunState, incoming: f64) -> f64 {
        incoming + self.sample(&mut state.rng)
    }

    fn spec(&self) -> GeneratorSpec {
        GeneratorSpec::PoissonNoise(self.spec.clone())
    }

    fn reconfigure(&mut self, _at: Duration, spec: &GeneratorSpec) -> Result<(), ConfigError> {
        let GeneratorSpec::PoissonNoise(spec) = spec else {
            return Err(spec.mismatch(self.kind()));
        };
        check_variation(spec.variation)?;
        self.spec = spec.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::make_rng;
    use chrono::Utc;

    fn mean_of(lambda: f64, n: usize) -> f64 {
        let mut rng = make_rng(2024);
        (0..n).map(|_| sample_poisson(lambda, &mut rng)).sum::<f64>() / n as f64
    }

    #[test]
    fn test_zero_lambda() {
        let mut rng = make_rng(1);
        assert_eq!(sample_poisson(0.0, &mut rng), 0.0);
        assert_eq!(sample_poisson(-3.0, &mut rng), 0.0);
    }

    #[test]
    fn test_mean_converges_knuth_branch() {
        let m = mean_of(4.0, 50_000);
        assert!((m - 4.0).abs() < 0.1, "mean {m}");
    }

    #[test]
    fn test_mean_converges_normal_branch() {
        let m = mean_of(100.0, 50_000);
        assert!((m - 100.0).abs() < 0.5, "mean {m}");
    }

    #[test]
    fn test_samples_are_integers() {
        let mut rng = make_rng(5);
        for lambda in [0.5, 3.0, 29.0, 30.0, 250.0] {
            for _ in 0..200 {
                let s = sample_poisson(lambda, &mut rng);
                assert_eq!(s, s.trunc());
                assert!(s >= 0.0);
            }
        }
    }

    #[test]
    fn test_clamped_and_signed() {
        let mut rs = RunState::new(Duration::from_secs(10), 77, Utc::now());
        let mut pos = PoissonNoise::new(PoissonNoiseSpec {
            target: 10.0,
            variation: 3.0,
            direction: Direction::Positive,
        })
        .unwrap();
        let mut neg = PoissonNoise::new(PoissonNoiseSpec {
            target: 10.0,
            variation: 3.0,
            direction: Direction::Negative,
        })
        .unwrap();

        for _ in 0..2000 {
            let p = pos.emit(&mut rs, 0.0);
            assert!((7.0..=13.0).contains(&p));
            assert_eq!(p, p.trunc());

            let n = neg.emit(&mut rs, 0.0);
            assert!((-13.0..=-7.0).contains(&n));
        }
    }

    #[test]
    fn test_additive_onto_incoming() {
        let mut rs = RunState::new(Duration::from_secs(10), 8, Utc::now());
        let mut g = PoissonNoise::new(PoissonNoiseSpec {
            target: 5.0,
            variation: 0.0,
            direction: Direction::Positive,
        })
        .unwrap();
        assert_eq!(g.emit(&mut rs, 100.0), 105.0);
    }

    #[test]
    fn test_default_direction_is_positive() {
        let s: PoissonNoiseSpec = serde_yaml::from_str("target: 3\n").unwrap();
        assert_eq!(s.direction, Direction::Positive);
    }
}
