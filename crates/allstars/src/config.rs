use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::factory::Family;
use crate::preprocessing::ScalerKind;

/// Metric used to score classification candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMetric {
    /// F1 on the positive (larger) label
    #[default]
    F1,
    Accuracy,
}

impl fmt::Display for ClassificationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassificationMetric::F1 => "f1",
            ClassificationMetric::Accuracy => "accuracy",
        })
    }
}

impl FromStr for ClassificationMetric {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "f1" | "f1_score" => Ok(ClassificationMetric::F1),
            "accuracy" => Ok(ClassificationMetric::Accuracy),
            other => Err(AllstarsError::invalid(
                "classification_metric",
                format!("unknown metric '{}'", other),
            )),
        }
    }
}

/// Settings for the single-level search objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub classifier_names: Vec<Family>,
    pub regressor_names: Vec<Family>,
    pub scalers: Vec<ScalerKind>,
    pub classification_metric: ClassificationMetric,
    /// Fraction held out per trial when no evaluation set is supplied
    pub test_size: f64,
    /// Pin the per-trial split; `None` draws a fresh split every trial
    pub split_seed: Option<u64>,
    pub trial_timeout_secs: u64,
    pub classifier_fit_timeout_secs: u64,
    pub regressor_fit_timeout_secs: u64,
    /// Seed for the trial sampler and for stochastic estimators
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            classifier_names: Family::CLASSIFIERS.to_vec(),
            regressor_names: Family::REGRESSORS.to_vec(),
            scalers: vec![ScalerKind::StandardScaler, ScalerKind::MinMaxScaler],
            classification_metric: ClassificationMetric::F1,
            test_size: 0.1,
            split_seed: None,
            trial_timeout_secs: 10,
            classifier_fit_timeout_secs: 60,
            regressor_fit_timeout_secs: 600,
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn trial_timeout(&self) -> Duration {
        Duration::from_secs(self.trial_timeout_secs)
    }

    pub fn fit_timeout(&self, kind: ProblemKind) -> Duration {
        Duration::from_secs(match kind {
            ProblemKind::Classification => self.classifier_fit_timeout_secs,
            ProblemKind::Regression => self.regressor_fit_timeout_secs,
        })
    }

    pub fn family_names(&self, kind: ProblemKind) -> &[Family] {
        match kind {
            ProblemKind::Classification => &self.classifier_names,
            ProblemKind::Regression => &self.regressor_names,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackingConfig {
    pub enabled: bool,
    pub n_trials: usize,
    pub timeout_secs: u64,
    pub test_size: f64,
    pub split_seed: Option<u64>,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_trials: 50,
            timeout_secs: 1000,
            test_size: 0.1,
            split_seed: None,
        }
    }
}

/// Budget of the driving loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Trials per stage (each family stage and the open stage)
    pub n_trials: usize,
    /// Wall-clock budget per stage
    pub timeout_secs: u64,
    pub feature_selection: bool,
    pub show_progress_bar: bool,
    pub stacking: StackingConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            n_trials: 100,
            timeout_secs: 100,
            feature_selection: true,
            show_progress_bar: false,
            stacking: StackingConfig::default(),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllstarsConfig {
    pub search: SearchConfig,
    pub fit: FitConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let cfg: AllstarsConfig =
            serde_json::from_str(r#"{"search": {"test_size": 0.25}, "fit": {"n_trials": 5}}"#).unwrap();
        assert_eq!(cfg.search.test_size, 0.25);
        assert_eq!(cfg.search.trial_timeout_secs, 10);
        assert_eq!(cfg.fit.n_trials, 5);
        assert!(cfg.fit.stacking.enabled);
        assert_eq!(cfg.search.classifier_names.len(), 11);
    }

    #[test]
    fn fit_bounds_depend_on_problem_kind() {
        let cfg = SearchConfig::default();
        assert_eq!(cfg.fit_timeout(ProblemKind::Classification), Duration::from_secs(60));
        assert_eq!(cfg.fit_timeout(ProblemKind::Regression), Duration::from_secs(600));
    }

    #[test]
    fn metric_names_parse() {
        assert_eq!("f1_score".parse::<ClassificationMetric>().unwrap(), ClassificationMetric::F1);
        assert!("auc".parse::<ClassificationMetric>().is_err());
    }
}
