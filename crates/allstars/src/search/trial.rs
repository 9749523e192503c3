//! Trials: the per-evaluation handle through which objectives request
//! hyperparameter values.
//!
//! Suggestions are made dynamically, so a trial's dimensionality can depend on
//! earlier answers (e.g. a layer count followed by that many widths).

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{AllstarsError, Result};

/// A concrete value assigned to a named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Categorical(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Categorical(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::Categorical(v.to_string())
    }
}

/// Declared domain of a suggested parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    Categorical(Vec<String>),
    Int { low: i64, high: i64 },
    LogUniform { low: f64, high: f64 },
    Bool,
}

impl Distribution {
    fn validate(&self, name: &str) -> Result<()> {
        match self {
            Distribution::Categorical(choices) if choices.is_empty() => {
                Err(AllstarsError::invalid(name, "categorical distribution has no choices"))
            }
            Distribution::Int { low, high } if low > high => {
                Err(AllstarsError::invalid(name, format!("empty integer range [{}, {}]", low, high)))
            }
            Distribution::LogUniform { low, high } if !(*low > 0.0 && low <= high) => Err(AllstarsError::invalid(
                name,
                format!("invalid log-uniform range [{}, {}]", low, high),
            )),
            _ => Ok(()),
        }
    }

    /// Does `value` lie inside this domain?
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (Distribution::Categorical(choices), ParameterValue::Categorical(v)) => choices.contains(v),
            (Distribution::Int { low, high }, ParameterValue::Int(v)) => (low..=high).contains(&v),
            (Distribution::LogUniform { low, high }, ParameterValue::Float(v)) => (low..=high).contains(&v),
            (Distribution::LogUniform { low, high }, ParameterValue::Int(v)) => (*low..=*high).contains(&(*v as f64)),
            (Distribution::Bool, ParameterValue::Bool(_)) => true,
            _ => false,
        }
    }
}

/// Handle through which an objective requests parameter values.
pub trait Trial {
    fn number(&self) -> usize;

    fn suggest(&mut self, name: &str, distribution: Distribution) -> Result<ParameterValue>;

    /// Every value suggested so far, by name.
    fn params(&self) -> &BTreeMap<String, ParameterValue>;

    fn suggest_categorical(&mut self, name: &str, choices: &[&str]) -> Result<String> {
        let dist = Distribution::Categorical(choices.iter().map(|c| c.to_string()).collect());
        match self.suggest(name, dist)? {
            ParameterValue::Categorical(v) => Ok(v),
            other => Err(AllstarsError::invalid(name, format!("expected a category, got {}", other))),
        }
    }

    fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> Result<i64> {
        match self.suggest(name, Distribution::Int { low, high })? {
            ParameterValue::Int(v) => Ok(v),
            other => Err(AllstarsError::invalid(name, format!("expected an integer, got {}", other))),
        }
    }

    fn suggest_loguniform(&mut self, name: &str, low: f64, high: f64) -> Result<f64> {
        match self.suggest(name, Distribution::LogUniform { low, high })? {
            ParameterValue::Float(v) => Ok(v),
            ParameterValue::Int(v) => Ok(v as f64),
            other => Err(AllstarsError::invalid(name, format!("expected a float, got {}", other))),
        }
    }

    fn suggest_bool(&mut self, name: &str) -> Result<bool> {
        match self.suggest(name, Distribution::Bool)? {
            ParameterValue::Bool(v) => Ok(v),
            other => Err(AllstarsError::invalid(name, format!("expected a bool, got {}", other))),
        }
    }
}

/// Replays a fixed assignment; used to rebuild a known configuration.
#[derive(Debug, Clone, Default)]
pub struct FixedTrial {
    number: usize,
    values: BTreeMap<String, ParameterValue>,
    params: BTreeMap<String, ParameterValue>,
}

impl FixedTrial {
    pub fn new(values: BTreeMap<String, ParameterValue>) -> Self {
        Self {
            number: 0,
            values,
            params: BTreeMap::new(),
        }
    }

    /// Builder-style insertion of one fixed value.
    pub fn with<V: Into<ParameterValue>>(mut self, name: &str, value: V) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }
}

impl Trial for FixedTrial {
    fn number(&self) -> usize {
        self.number
    }

    fn suggest(&mut self, name: &str, distribution: Distribution) -> Result<ParameterValue> {
        distribution.validate(name)?;
        let value = self
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| AllstarsError::invalid(name, "no fixed value for this parameter"))?;
        if !distribution.contains(&value) {
            return Err(AllstarsError::invalid(
                name,
                format!("fixed value {} lies outside {:?}", value, distribution),
            ));
        }
        self.params.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn params(&self) -> &BTreeMap<String, ParameterValue> {
        &self.params
    }
}

/// Random-search trial with optional pinned values.
pub struct SampledTrial {
    number: usize,
    rng: StdRng,
    pinned: BTreeMap<String, ParameterValue>,
    params: BTreeMap<String, ParameterValue>,
    distributions: BTreeMap<String, Distribution>,
}

impl SampledTrial {
    pub fn new(number: usize, seed: u64, pinned: BTreeMap<String, ParameterValue>) -> Self {
        Self {
            number,
            rng: StdRng::seed_from_u64(seed),
            pinned,
            params: BTreeMap::new(),
            distributions: BTreeMap::new(),
        }
    }

    pub fn distributions(&self) -> &BTreeMap<String, Distribution> {
        &self.distributions
    }

    fn sample(&mut self, distribution: &Distribution) -> ParameterValue {
        match distribution {
            Distribution::Categorical(choices) => {
                ParameterValue::Categorical(choices[self.rng.gen_range(0..choices.len())].clone())
            }
            Distribution::Int { low, high } => ParameterValue::Int(self.rng.gen_range(*low..=*high)),
            Distribution::LogUniform { low, high } => {
                let (a, b) = (low.ln(), high.ln());
                let v = if a == b { *low } else { self.rng.gen_range(a..b).exp() };
                ParameterValue::Float(v)
            }
            Distribution::Bool => ParameterValue::Bool(self.rng.gen_bool(0.5)),
        }
    }
}

impl Trial for SampledTrial {
    fn number(&self) -> usize {
        self.number
    }

    fn suggest(&mut self, name: &str, distribution: Distribution) -> Result<ParameterValue> {
        distribution.validate(name)?;
        // a repeated name returns the first answer
        if let Some(existing) = self.params.get(name) {
            return Ok(existing.clone());
        }
        let value = match self.pinned.get(name) {
            Some(v) if distribution.contains(v) => match (v, &distribution) {
                (ParameterValue::Int(i), Distribution::LogUniform { .. }) => ParameterValue::Float(*i as f64),
                _ => v.clone(),
            },
            Some(v) => {
                log::warn!(
                    "Enqueued value {} for '{}' is outside {:?}; sampling instead",
                    v,
                    name,
                    distribution
                );
                self.sample(&distribution)
            }
            None => self.sample(&distribution),
        };
        self.params.insert(name.to_string(), value.clone());
        self.distributions.insert(name.to_string(), distribution);
        Ok(value)
    }

    fn params(&self) -> &BTreeMap<String, ParameterValue> {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_values_override_sampling() {
        let mut pinned = BTreeMap::new();
        pinned.insert("model_name".to_string(), ParameterValue::from("kNN"));
        let mut trial = SampledTrial::new(0, 1, pinned);
        let family = trial.suggest_categorical("model_name", &["Ridge", "kNN"]).unwrap();
        assert_eq!(family, "kNN");
    }

    #[test]
    fn out_of_domain_pins_are_resampled() {
        let mut pinned = BTreeMap::new();
        pinned.insert("depth".to_string(), ParameterValue::Int(99));
        let mut trial = SampledTrial::new(0, 5, pinned);
        let depth = trial.suggest_int("depth", 2, 32).unwrap();
        assert!((2..=32).contains(&depth));
    }

    #[test]
    fn same_seed_gives_same_suggestions() {
        let draw = |seed| {
            let mut t = SampledTrial::new(0, seed, BTreeMap::new());
            (
                t.suggest_int("a", 0, 1000).unwrap(),
                t.suggest_loguniform("b", 1e-5, 1e5).unwrap(),
                t.suggest_bool("c").unwrap(),
            )
        };
        assert_eq!(draw(11), draw(11));
    }

    #[test]
    fn loguniform_stays_in_range() {
        let mut t = SampledTrial::new(0, 3, BTreeMap::new());
        for i in 0..100 {
            let v = t.suggest_loguniform(&format!("p{}", i), 1e-4, 1e-2).unwrap();
            assert!((1e-4..=1e-2).contains(&v));
        }
    }

    #[test]
    fn fixed_trial_reports_missing_parameters() {
        let mut t = FixedTrial::default().with("x", 3i64);
        assert_eq!(t.suggest_int("x", 0, 5).unwrap(), 3);
        assert!(matches!(
            t.suggest_int("y", 0, 5),
            Err(AllstarsError::InvalidParameter { .. })
        ));
        assert_eq!(t.params().len(), 1);
    }

    #[test]
    fn empty_ranges_are_rejected() {
        let mut t = SampledTrial::new(0, 0, BTreeMap::new());
        assert!(t.suggest_int("n", 5, 2).is_err());
        assert!(t.suggest_loguniform("lr", 0.0, 1.0).is_err());
    }
}
