//! Value generators
//!
//! Stateful scalar sources folded together by metric producers:
//! - **constant**: fixed offset
//! - **ramp**: linear interpolation with continuity on reconfigure
//! - **randomWalk**: mean-reverting bounded walk
//! - **normalNoise**: clamped gaussian noise, optionally one-sided
//! - **poissonNoise**: clamped Poisson counts
//! - **spikyNoise**: on/off bursts of Poisson noise

pub mod constant;
pub mod normal;
pub mod poisson;
pub mod ramp;
pub mod random_walk;
pub mod spiky;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, Error, Result};
use crate::state::RunState;

pub use constant::{Constant, ConstantSpec};
pub use normal::{NormalNoise, NormalNoiseSpec};
pub use poisson::{PoissonNoise, PoissonNoiseSpec, sample_poisson};
pub use ramp::{Ramp, RampSpec, interpolate};
pub use random_walk::{RandomWalk, RandomWalkSpec};
pub use spiky::{SpikyNoise, SpikyNoiseSpec};

/// A named scalar source advanced once per tick.
///
/// `emit` is additive: it returns `incoming` plus this generator's sample.
pub trait MetricGenerator: Send + std::fmt::Debug {
    /// Registry discriminant, e.g. `"ramp"`
    fn kind(&self) -> &'static str;

    fn emit(&mut self, state: &mut RunState, incoming: f64) -> f64;

    /// Live configuration, the base a partial reconfigure is laid over.
    fn spec(&self) -> GeneratorSpec;

    /// Apply a new configuration taking effect at `at`.
    ///
    /// `spec` must be of the same kind as the generator.
    fn reconfigure(&mut self, at: Duration, spec: &GeneratorSpec) -> std::result::Result<(), ConfigError>;
}

/// Sign constraint applied to noise samples.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
    Both,
}

/// Typed generator configuration, tagged by `type`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GeneratorSpec {
    Constant(ConstantSpec),
    Ramp(RampSpec),
    RandomWalk(RandomWalkSpec),
    NormalNoise(NormalNoiseSpec),
    PoissonNoise(PoissonNoiseSpec),
    SpikyNoise(SpikyNoiseSpec),
}

impl GeneratorSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            GeneratorSpec::Constant(_) => "constant",
            GeneratorSpec::Ramp(_) => "ramp",
            GeneratorSpec::RandomWalk(_) => "randomWalk",
            GeneratorSpec::NormalNoise(_) => "normalNoise",
            GeneratorSpec::PoissonNoise(_) => "poissonNoise",
            GeneratorSpec::SpikyNoise(_) => "spikyNoise",
        }
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> ConfigError {
        ConfigError::KindMismatch {
            expected,
            found: self.kind(),
        }
    }
}

/// Generator configuration as written in a script: the `type` tag plus the
/// fields to set. Fields left out keep their live value on reconfigure.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(into = "Map<String, Value>")]
pub struct GeneratorPatch {
    kind: &'static str,
    fields: Map<String, Value>,
}

impl GeneratorPatch {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Decode the patch on its own, as for a newly created generator.
    pub fn resolve(&self) -> std::result::Result<GeneratorSpec, ConfigError> {
        decode(self.fields.clone())
    }

    /// Lay the patch over `base`.
    pub fn overlay(&self, base: &GeneratorSpec) -> std::result::Result<GeneratorSpec, ConfigError> {
        if self.kind != base.kind() {
            return Err(ConfigError::KindMismatch {
                expected: base.kind(),
                found: self.kind,
            });
        }
        let mut merged = match serde_json::to_value(base) {
            Ok(Value::Object(m)) => m,
            Ok(other) => return Err(ConfigError::InvalidSpec(format!("not a map: {other}"))),
            Err(e) => return Err(ConfigError::InvalidSpec(e.to_string())),
        };
        merged.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        decode(merged)
    }
}

fn decode(fields: Map<String, Value>) -> std::result::Result<GeneratorSpec, ConfigError> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| ConfigError::InvalidSpec(e.to_string()))
}

impl TryFrom<Map<String, Value>> for GeneratorPatch {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let name = match fields.get("type") {
            Some(Value::String(name)) => name,
            Some(other) => return Err(format!("generator type must be a string, got {other}")),
            None => return Err("missing generator type".to_string()),
        };
        let kind = list_generators()
            .into_iter()
            .map(|(kind, _)| kind)
            .find(|kind| *kind == name.as_str())
            .ok_or_else(|| format!("unknown generator type {name:?}"))?;
        Ok(Self { kind, fields })
    }
}

// Equivalent to `#[serde(try_from = "Map<String, Value>")]`, written by hand
// because the derive ties the impl to `'de: 'static` via the `&'static str` field.
impl<'de> Deserialize<'de> for GeneratorPatch {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        GeneratorPatch::try_from(fields).map_err(serde::de::Error::custom)
    }
}

impl From<GeneratorPatch> for Map<String, Value> {
    fn from(patch: GeneratorPatch) -> Self {
        patch.fields
    }
}

impl From<GeneratorSpec> for GeneratorPatch {
    fn from(spec: GeneratorSpec) -> Self {
        let fields = match serde_json::to_value(&spec) {
            Ok(Value::Object(m)) => m,
            _ => Map::new(),
        };
        Self {
            kind: spec.kind(),
            fields,
        }
    }
}

/// Construct a generator from its spec, validating it.
pub fn create_generator(
    at: Duration,
    spec: &GeneratorSpec,
) -> std::result::Result<Box<dyn MetricGenerator>, ConfigError> {
    Ok(match spec {
        GeneratorSpec::Constant(s) => Box::new(Constant::new(s.clone())),
        GeneratorSpec::Ramp(s) => Box::new(Ramp::new(at, s.clone())?),
        GeneratorSpec::RandomWalk(s) => Box::new(RandomWalk::new(s.clone())?),
        GeneratorSpec::NormalNoise(s) => Box::new(NormalNoise::new(s.clone())?),
        GeneratorSpec::PoissonNoise(s) => Box::new(PoissonNoise::new(s.clone())?),
        GeneratorSpec::SpikyNoise(s) => Box::new(SpikyNoise::new(s.clone())?),
    })
}

/// List the built-in generator kinds
pub fn list_generators() -> Vec<(&'static str, &'static str)> {
    vec![
        ("constant", "Adds a fixed value"),
        (
            "ramp",
            "Linear interpolation from start to target over a duration",
        ),
        (
            "randomWalk",
            "Mean-reverting random walk bounded around a target",
        ),
        (
            "normalNoise",
            "Gaussian noise around a target, clamped to +/- variation",
        ),
        (
            "poissonNoise",
            "Poisson-distributed counts around a target, clamped to +/- variation",
        ),
        (
            "spikyNoise",
            "Occasional bursts of Poisson noise switched on and off at random",
        ),
    ]
}

/// Generators keyed by ID.
#[derive(Debug, Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Box<dyn MetricGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.generators.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Create the generator on first sight; afterwards lay `patch` over its
    /// live spec and reconfigure.
    pub fn apply(&mut self, id: &str, at: Duration, patch: &GeneratorPatch) -> Result<()> {
        let wrap = |source| Error::Generator {
            id: id.to_string(),
            source,
        };
        match self.generators.get_mut(id) {
            Some(g) => {
                let spec = patch.overlay(&g.spec()).map_err(wrap)?;
                g.reconfigure(at, &spec).map_err(wrap)
            }
            None => {
                let spec = patch.resolve().map_err(wrap)?;
                let g = create_generator(at, &spec).map_err(wrap)?;
                self.generators.insert(id.to_string(), g);
                Ok(())
            }
        }
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut (dyn MetricGenerator + 'static)> {
        self.generators.get_mut(id).map(|g| g.as_mut())
    }

    /// Left fold of the named generators, starting from zero.
    pub fn fold(&mut self, ids: &[String], state: &mut RunState) -> std::result::Result<f64, ConfigError> {
        let mut value = 0.0;
        for id in ids {
            let g = self
                .generators
                .get_mut(id)
                .ok_or_else(|| ConfigError::UnknownGenerator(id.clone()))?;
            value = g.emit(state, value);
        }
        Ok(value)
    }
}

/// Clamp `value` into `[target - variation, target + variation]`.
pub(crate) fn clamp_around(value: f64, target: f64, variation: f64) -> f64 {
    value.clamp(target - variation, target + variation)
}

pub(crate) fn check_variation(variation: f64) -> std::result::Result<(), ConfigError> {
    if variation < 0.0 || variation.is_nan() {
        return Err(ConfigError::InvalidVariation(variation));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state() -> RunState {
        RunState::new(Duration::from_secs(60), 1, Utc::now())
    }

    #[test]
    fn test_spec_decodes_by_type_tag() {
        let spec: GeneratorSpec =
            serde_yaml::from_str("type: ramp\nstart: 0\ntarget: 100\nduration: 10m\n").unwrap();
        assert_eq!(spec.kind(), "ramp");

        let err = serde_yaml::from_str::<GeneratorSpec>("type: sawtooth\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = serde_yaml::from_str::<GeneratorSpec>("type: constant\nvalue: 1\nbogus: 2\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_registry_creates_then_reconfigures() {
        let mut reg = GeneratorRegistry::new();
        let one: GeneratorPatch = GeneratorSpec::Constant(ConstantSpec { value: 1.0 }).into();
        let two: GeneratorPatch = GeneratorSpec::Constant(ConstantSpec { value: 2.0 }).into();

        reg.apply("c", Duration::ZERO, &one).unwrap();
        reg.apply("c", Duration::from_secs(5), &two).unwrap();
        assert_eq!(reg.len(), 1);

        let mut rs = state();
        assert_eq!(reg.fold(&["c".to_string()], &mut rs).unwrap(), 2.0);
    }

    #[test]
    fn test_reconfigure_with_other_kind_fails() {
        let mut reg = GeneratorRegistry::new();
        reg.apply("g", Duration::ZERO, &GeneratorSpec::Constant(ConstantSpec { value: 1.0 }).into())
            .unwrap();

        let ramp: GeneratorPatch = GeneratorSpec::Ramp(RampSpec {
            start: 0.0,
            target: 1.0,
            duration: Duration::from_secs(1),
            prestart_zero: false,
            postend_zero: false,
        })
        .into();
        let err = reg.apply("g", Duration::ZERO, &ramp).unwrap_err();
        assert!(matches!(
            err,
            Error::Generator {
                source: ConfigError::KindMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_fold_accumulates_in_order() {
        let mut reg = GeneratorRegistry::new();
        reg.apply("a", Duration::ZERO, &GeneratorSpec::Constant(ConstantSpec { value: 1.5 }).into())
            .unwrap();
        reg.apply("b", Duration::ZERO, &GeneratorSpec::Constant(ConstantSpec { value: 2.0 }).into())
            .unwrap();

        let mut rs = state();
        let v = reg
            .fold(&["a".to_string(), "b".to_string(), "a".to_string()], &mut rs)
            .unwrap();
        assert_eq!(v, 5.0);

        let err = reg.fold(&["missing".to_string()], &mut rs).unwrap_err();
        assert_eq!(err, ConfigError::UnknownGenerator("missing".to_string()));
    }

    #[test]
    fn test_list_generators_covers_every_kind() {
        let kinds: Vec<_> = list_generators().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds.len(), 6);
        assert!(kinds.contains(&"spikyNoise"));
    }

    fn patch(yaml: &str) -> GeneratorPatch {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_patch_checks_type_at_load() {
        assert_eq!(patch("type: ramp\ntarget: 0\n").kind(), "ramp");
        assert!(serde_yaml::from_str::<GeneratorPatch>("type: sawtooth\n").is_err());
        assert!(serde_yaml::from_str::<GeneratorPatch>("target: 1\n").is_err());
    }

    #[test]
    fn test_partial_ramp_reconfigure_keeps_duration() {
        let mut reg = GeneratorRegistry::new();
        reg.apply(
            "r",
            Duration::ZERO,
            &patch("type: ramp\nstart: 0\ntarget: 100\nduration: 100s\n"),
        )
        .unwrap();
        reg.apply("r", Duration::from_secs(50), &patch("type: ramp\ntarget: 0\n"))
            .unwrap();

        let g = reg.get_mut("r").unwrap();
        let GeneratorSpec::Ramp(spec) = g.spec() else {
            panic!("expected ramp");
        };
        assert_eq!(spec.duration, Duration::from_secs(100));
        assert_eq!(spec.start, 50.0);
        assert_eq!(spec.target, 0.0);

        let mut rs = state();
        rs.advance_to(Duration::from_secs(100));
        assert!((g.emit(&mut rs, 0.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_spiky_reconfigure_keeps_peak() {
        let mut reg = GeneratorRegistry::new();
        reg.apply(
            "s",
            Duration::ZERO,
            &patch("type: spikyNoise\npeakTarget: 500\npStart: 1\npEnd: 0\n"),
        )
        .unwrap();
        reg.apply("s", Duration::from_secs(5), &patch("type: spikyNoise\npStart: 1\npEnd: 0\n"))
            .unwrap();

        let mut rs = state();
        let v = reg.fold(&["s".to_string()], &mut rs).unwrap();
        assert!(v > 400.0, "peak fell back to default: {v}");
    }

    #[test]
    fn test_partial_reconfigure_revalidates() {
        let mut reg = GeneratorRegistry::new();
        reg.apply("n", Duration::ZERO, &patch("type: normalNoise\ntarget: 10\nvariation: 2\n"))
            .unwrap();
        let err = reg
            .apply("n", Duration::from_secs(1), &patch("type: normalNoise\nvariation: -1\n"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Generator {
                source: ConfigError::InvalidVariation(_),
                ..
            }
        ));

        let err = reg
            .apply("n", Duration::from_secs(1), &patch("type: normalNoise\nwobble: 1\n"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Generator {
                source: ConfigError::InvalidSpec(_),
                ..
            }
        ));
    }

    #[test]
    fn test_incomplete_patch_cannot_create() {
        let mut reg = GeneratorRegistry::new();
        let err = reg
            .apply("r", Duration::ZERO, &patch("type: ramp\ntarget: 0\n"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Generator {
                source: ConfigError::InvalidSpec(_),
                ..
            }
        ));
    }
}
