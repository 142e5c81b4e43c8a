use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GeneratorSpec, MetricGenerator};
use crate::error::ConfigError;
use crate::state::RunState;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConstantSpec {
    #[serde(default)]
    pub value: f64,
}

/// Adds a fixed value. Reconfiguring jumps to the new value immediately.
#[derive(Debug)]
pub struct Constant {
    spec: ConstantSpec,
}

impl Constant {
    pub fn new(spec: ConstantSpec) -> Self {
        Self { spec }
    }
}

impl MetricGenerator for Constant {
    fn kind(&self) -> &'static str {
        "constant"
    }

    fn emit(&mut self, _state: &mut RunState, incoming: f64) -> f64 {
        incoming + self.spec.value
    }

    fn spec(&self) -> GeneratorSpec {
        GeneratorSpec::Constant(self.spec.clone())
    }

    fn reconfigure(&mut self, _at: Duration, spec: &GeneratorSpec) -> Result<(), ConfigError> {
        let GeneratorSpec::Constant(spec) = spec else {
            return Err(spec.mismatch(self.kind()));
        };
        self.spec = spec.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_constant_adds_value() {
        let mut rs = RunState::new(Duration::from_secs(10), 1, Utc::now());
        let mut c = Constant::new(ConstantSpec { value: 3.0 });
        assert_eq!(c.emit(&mut rs, 0.0), 3.0);
        assert_eq!(c.emit(&mut rs, 2.0), 5.0);

        c.reconfigure(
            Duration::from_secs(5),
            &GeneratorSpec::Constant(ConstantSpec { value: -1.0 }),
        )
        .unwrap();
        assert_eq!(c.emit(&mut rs, 2.0), 1.0);
    }
}
