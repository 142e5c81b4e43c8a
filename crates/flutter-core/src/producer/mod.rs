//! Producers
//!
//! Metric producers fold generator output into gauge/sum datapoints on a
//! fixed cadence. Trace producers live in [`trace`].

pub mod trace;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};
use crate::generator::GeneratorRegistry;
use crate::signal::{Attributes, MetricKind, MetricsBuilder};
use crate::state::RunState;

pub use trace::{SpanIdAllocator, SpanSpec, TraceProducer, TraceProducerRegistry, TraceProducerSpec};

/// Cadence used when a metric does not set `frequency`.
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(10);

fn default_frequency() -> Duration {
    DEFAULT_FREQUENCY
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricAttributes {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource: Attributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scope: Attributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub datapoint: Attributes,
}

/// Configuration of a gauge or sum producer as written in a `metric` action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetricSpec {
    /// Defaults to the action ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default)]
    pub attributes: MetricAttributes,
    #[serde(default)]
    pub generators: Vec<String>,
    #[serde(default = "default_frequency", with = "humantime_serde")]
    pub frequency: Duration,
    /// Last tick at which the producer may emit; zero means unbounded
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Duration::is_zero")]
    pub to: Duration,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
}

/// Resolved, validated producer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricConfig {
    pub name: String,
    pub kind: MetricKind,
    pub attributes: MetricAttributes,
    pub generators: Vec<String>,
    pub frequency: Duration,
    pub to: Duration,
}

impl MetricConfig {
    /// Resolve defaults from the owning action and check every generator exists.
    pub fn resolve(
        id: &str,
        action_to: Duration,
        spec: &MetricSpec,
        generators: &GeneratorRegistry,
    ) -> std::result::Result<Self, ConfigError> {
        let name = if spec.name.is_empty() { id } else { &spec.name };
        if name.is_empty() {
            return Err(ConfigError::InvalidMetricName);
        }
        if spec.generators.is_empty() {
            return Err(ConfigError::NoGenerators);
        }
        if let Some(missing) = spec.generators.iter().find(|g| !generators.contains(g)) {
            return Err(ConfigError::UnknownGenerator(missing.clone()));
        }

        Ok(Self {
            name: name.to_string(),
            kind: spec.kind,
            attributes: spec.attributes.clone(),
            generators: spec.generators.clone(),
            frequency: if spec.frequency.is_zero() {
                DEFAULT_FREQUENCY
            } else {
                spec.frequency
            },
            to: if spec.to.is_zero() { action_to } else { spec.to },
        })
    }
}

/// Mutable per-producer bookkeeping, kept apart from configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerState {
    /// `None` until the first datapoint
    pub last_emitted: Option<Duration>,
    pub disabled: bool,
}

#[derive(Debug)]
pub struct MetricProducer {
    config: MetricConfig,
    state: ProducerState,
}

impl MetricProducer {
    pub fn new(
        id: &str,
        action_to: Duration,
        spec: &MetricSpec,
        generators: &GeneratorRegistry,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            config: MetricConfig::resolve(id, action_to, spec, generators)?,
            state: ProducerState {
                last_emitted: None,
                disabled: spec.disabled,
            },
        })
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    pub fn state(&self) -> &ProducerState {
        &self.state
    }

    /// Replace the configuration; emission bookkeeping is kept.
    pub fn reconfigure(
        &mut self,
        id: &str,
        action_to: Duration,
        spec: &MetricSpec,
        generators: &GeneratorRegistry,
    ) -> std::result::Result<(), ConfigError> {
        self.config = MetricConfig::resolve(id, action_to, spec, generators)?;
        self.state.disabled = spec.disabled;
        Ok(())
    }

    pub fn enable(&mut self) {
        self.state.disabled = false;
    }

    pub fn disable(&mut self) {
        self.state.disabled = true;
    }

    pub fn is_disabled(&self) -> bool {
        self.state.disabled
    }

    pub fn should_emit(&self, tick: Duration) -> bool {
        if self.state.disabled {
            return false;
        }
        let due = match self.state.last_emitted {
            Some(last) => tick >= last + self.config.frequency,
            None => true,
        };
        due && (self.config.to.is_zero() || tick <= self.config.to)
    }

    /// Fold the generators and append one datapoint if due. Returns whether
    /// a datapoint was written.
    pub fn emit(
        &mut self,
        generators: &mut GeneratorRegistry,
        state: &mut RunState,
        mb: &mut MetricsBuilder,
    ) -> std::result::Result<bool, ConfigError> {
        if !self.should_emit(state.tick) {
            return Ok(false);
        }
        let value = generators.fold(&self.config.generators, state)?;
        let attrs = &self.config.attributes;
        mb.add_datapoint(
            &attrs.resource,
            &attrs.scope,
            &self.config.name,
            self.config.kind,
            &attrs.datapoint,
            state.wallclock,
            value,
        );
        self.state.last_emitted = Some(state.tick);
        Ok(true)
    }
}

/// Metric producers keyed by ID, iterated in ID order.
#[derive(Debug, Default)]
pub struct MetricProducerRegistry {
    producers: BTreeMap<String, MetricProducer>,
}

impl MetricProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&MetricProducer> {
        self.producers.get(id)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Reconfigure an existing producer, then replace it with a fresh one.
    pub fn apply(
        &mut self,
        id: &str,
        action_to: Duration,
        spec: &MetricSpec,
        generators: &GeneratorRegistry,
    ) -> Result<()> {
        let wrap = |source| Error::Producer {
            id: id.to_string(),
            source,
        };
        if let Some(existing) = self.producers.get_mut(id) {
            existing
                .reconfigure(id, action_to, spec, generators)
                .map_err(wrap)?;
        }
        let producer = MetricProducer::new(id, action_to, spec, generators).map_err(wrap)?;
        self.producers.insert(id.to_string(), producer);
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let producer = self
            .producers
            .get_mut(id)
            .ok_or_else(|| Error::UnknownMetric(id.to_string()))?;
        if enabled {
            producer.enable();
        } else {
            producer.disable();
        }
        Ok(())
    }

    /// Emit every due producer into `mb`. Returns the datapoint count.
    pub fn emit_all(
        &mut self,
        generators: &mut GeneratorRegistry,
        state: &mut RunState,
        mb: &mut MetricsBuilder,
    ) -> Result<usize> {
        let mut written = 0;
        for (id, producer) in self.producers.iter_mut() {
            let emitted = producer
                .emit(generators, state, mb)
                .map_err(|source| Error::Producer {
                    id: id.clone(),
                    source,
                })?;
            if emitted {
                written += 1;
            }
        }
        Ok(written)
    }
}
