//! Second-level search over stacked ensembles of the per-family champions.
//!
//! Base learners are shared with the first-level registry and only ever read.
//! A random forest combines their outputs: positive-class probabilities for
//! classifiers that expose them, raw predictions otherwise.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::StackingConfig;
use crate::data_handling::{BinaryLabels, Dataset, ProblemKind};
use crate::error::{AllstarsError, Result};
use crate::metrics::{accuracy, r2_score};
use crate::models::estimator::Estimator;
use crate::models::factory::Family;
use crate::models::forest::{Forest, ForestParams};
use crate::search::candidate::CandidateModel;
use crate::search::objective::{Objective, LOW_SCORE_SENTINEL};
use crate::search::registry::GlobalBest;
use crate::search::study::ObjectiveFunction;
use crate::search::trial::Trial;
use crate::timeout::{self, Bound, Notifier};

const META_N_ESTIMATORS: (i64, i64) = (50, 200);
const META_DEPTH: (i64, i64) = (2, 32);

/// Fitted base learners plus a meta-forest trained on their outputs.
pub struct StackedModel {
    bases: Vec<(Family, Arc<CandidateModel>)>,
    params: ForestParams,
    kind: ProblemKind,
    labels: Option<BinaryLabels>,
    fit_timeout: Duration,
    notifier: Notifier,
    meta: Option<Forest>,
}

impl fmt::Debug for StackedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackedModel")
            .field("bases", &self.base_names())
            .field("params", &self.params)
            .field("fitted", &self.meta.is_some())
            .finish()
    }
}

impl StackedModel {
    pub fn new(
        bases: Vec<(Family, Arc<CandidateModel>)>,
        params: ForestParams,
        kind: ProblemKind,
        labels: Option<BinaryLabels>,
    ) -> Result<Self> {
        if bases.is_empty() {
            return Err(AllstarsError::invalid("bases", "a stacked model needs at least one base learner"));
        }
        if kind.is_classification() && labels.is_none() {
            return Err(AllstarsError::invalid("labels", "classification stacks need a label mapping"));
        }
        Ok(Self {
            bases,
            params,
            kind,
            labels,
            fit_timeout: Duration::from_secs(match kind {
                ProblemKind::Classification => 60,
                ProblemKind::Regression => 600,
            }),
            notifier: timeout::log_notifier(),
            meta: None,
        })
    }

    pub fn with_fit_timeout(mut self, limit: Duration) -> Self {
        self.fit_timeout = limit;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn base_names(&self) -> Vec<&'static str> {
        self.bases.iter().map(|(f, _)| f.name()).collect()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    fn meta_features(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((x.nrows(), self.bases.len()));
        for (j, (_, base)) in self.bases.iter().enumerate() {
            out.column_mut(j).assign(&base.meta_feature(x)?);
        }
        Ok(out)
    }

    /// Fit the meta-forest only; the base learners stay as they are.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let meta_x = self.meta_features(x)?;
        let meta_y = match &self.labels {
            Some(labels) => labels.encode(y),
            None => y.to_owned(),
        };
        let mut meta = Forest::new(self.params.clone(), self.kind);
        let operation = match self.kind {
            ProblemKind::Classification => "stacking_classifier.fit",
            ProblemKind::Regression => "stacking_regressor.fit",
        };
        let meta = timeout::run_with_timeout(operation, self.fit_timeout, Bound::Fit, &self.notifier, move || {
            meta.fit(&meta_x, &meta_y)?;
            Ok(meta)
        })?;
        self.meta = Some(meta);
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let meta = self.meta.as_ref().ok_or(AllstarsError::NotFitted)?;
        let pred = meta.predict(&self.meta_features(x)?)?;
        Ok(match &self.labels {
            Some(labels) => labels.decode(&pred),
            None => pred,
        })
    }

    /// Accuracy for classification, R² for regression.
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let pred = self.predict(x)?;
        Ok(match self.kind {
            ProblemKind::Classification => accuracy(y, &pred),
            ProblemKind::Regression => r2_score(y, &pred),
        })
    }

    /// Meta-forest importance of every base learner, keyed by family name.
    pub fn model_importances(&self) -> Result<BTreeMap<String, f64>> {
        let meta = self.meta.as_ref().ok_or(AllstarsError::NotFitted)?;
        let importances = meta.feature_importances()?;
        Ok(self
            .bases
            .iter()
            .zip(importances.iter())
            .map(|((family, _), imp)| (family.name().to_string(), *imp))
            .collect())
    }
}

pub struct StackingObjective {
    train: Arc<Dataset>,
    kind: ProblemKind,
    labels: Option<BinaryLabels>,
    bases: Vec<(Family, Arc<CandidateModel>)>,
    config: StackingConfig,
    fit_timeout: Duration,
    seed: Option<u64>,
    notifier: Notifier,
    split_rng: StdRng,
    best: GlobalBest<Option<Arc<StackedModel>>>,
    already_tried: BTreeSet<String>,
}

impl StackingObjective {
    /// Fails with [`AllstarsError::EmptyRegistry`] when the first-level
    /// search has no champion yet.
    pub fn new(objective: &Objective, config: StackingConfig) -> Result<Self> {
        let registry = objective.registry();
        if registry.is_empty() {
            return Err(AllstarsError::EmptyRegistry);
        }
        let bases = registry.iter().map(|(f, c)| (f, Arc::clone(&c.model))).collect();
        let seed = objective.config().seed;
        let split_rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            train: Arc::new(objective.train().clone()),
            kind: objective.kind(),
            labels: objective.labels(),
            bases,
            fit_timeout: objective.config().fit_timeout(objective.kind()),
            seed,
            notifier: Arc::clone(objective.notifier()),
            config,
            split_rng,
            best: GlobalBest::new(),
            already_tried: BTreeSet::new(),
        })
    }

    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    /// Families available as base learners, in registry order.
    pub fn families(&self) -> Vec<Family> {
        self.bases.iter().map(|(f, _)| *f).collect()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.score()
    }

    /// `None` until a non-degenerate trial has won.
    pub fn best_model(&self) -> Option<&Arc<StackedModel>> {
        self.best.model().and_then(|m| m.as_ref())
    }

    /// Inclusion patterns seen so far. Recorded only; repeated patterns are
    /// still evaluated.
    pub fn already_tried(&self) -> &BTreeSet<String> {
        &self.already_tried
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.best_model().ok_or(AllstarsError::NotFitted)?.predict(x)
    }

    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.best_model().ok_or(AllstarsError::NotFitted)?.score(x, y)
    }

    fn split(&mut self) -> Result<(Dataset, Dataset)> {
        match self.config.split_seed {
            Some(seed) => self
                .train
                .train_test_split(self.config.test_size, &mut StdRng::seed_from_u64(seed)),
            None => self.train.train_test_split(self.config.test_size, &mut self.split_rng),
        }
    }

    fn run_trial(&mut self, trial: &mut dyn Trial) -> Result<Option<(Arc<StackedModel>, f64)>> {
        let mut selected = Vec::new();
        for (family, model) in &self.bases {
            if trial.suggest_int(family.name(), 0, 1)? == 1 {
                selected.push((*family, Arc::clone(model)));
            }
        }
        if selected.is_empty() {
            return Ok(None);
        }
        let key = selected.iter().map(|(f, _)| f.name()).collect::<Vec<_>>().join(",");
        if !self.already_tried.insert(key.clone()) {
            log::debug!("Stack [{}] was already evaluated", key);
        }

        let n_estimators = trial.suggest_int("rf_n_estimators", META_N_ESTIMATORS.0, META_N_ESTIMATORS.1)?;
        let max_depth = trial.suggest_int("rf_max_depth", META_DEPTH.0, META_DEPTH.1)?;
        let warm_start = trial.suggest_categorical("rf_warm_start", &["true", "false"])? == "true";
        let oob_score = trial.suggest_categorical("rf_oob_score", &["true", "false"])? == "true";
        let params = ForestParams {
            n_estimators: n_estimators as usize,
            max_depth: Some(max_depth as usize),
            warm_start,
            oob_score,
            seed: self.seed,
            ..ForestParams::random_forest(self.kind)
        };

        let (fold, eval) = self.split()?;
        let mut model = StackedModel::new(selected, params, self.kind, self.labels)?
            .with_fit_timeout(self.fit_timeout)
            .with_notifier(Arc::clone(&self.notifier));
        model.fit(&fold.x, &fold.y)?;
        let score = model.score(&eval.x, &eval.y)?;
        if !score.is_finite() {
            return Err(AllstarsError::Estimator(format!("stack [{}] produced a non-finite score", key)));
        }
        Ok(Some((Arc::new(model), score)))
    }
}

impl ObjectiveFunction for StackingObjective {
    fn evaluate(&mut self, trial: &mut dyn Trial) -> Result<f64> {
        let (model, score) = match self.run_trial(trial) {
            Ok(Some((model, score))) => (Some(model), score),
            Ok(None) => {
                log::debug!("Stacking trial {} selected no base learners", trial.number());
                (None, LOW_SCORE_SENTINEL)
            }
            Err(err) if err.is_recoverable() => {
                log::warn!("Stacking trial {} failed: {}", trial.number(), err);
                (None, LOW_SCORE_SENTINEL)
            }
            Err(err) => return Err(err),
        };
        if self.best.offer(score, model) {
            log::debug!("New best stacking score: {:.6}", score);
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::search::trial::FixedTrial;

    fn fitted_objective() -> Objective {
        let x = Array2::from_shape_fn((20, 2), |(r, c)| r as f64 + c as f64);
        let y = Array1::from_iter((0..20).map(|r| if r < 10 { 0.0 } else { 1.0 }));
        let config = SearchConfig {
            split_seed: Some(3),
            test_size: 0.25,
            ..SearchConfig::default()
        };
        let mut objective = Objective::new(Dataset::from_arrays(x, y).unwrap(), None, None, config).unwrap();
        let mut trial = FixedTrial::default()
            .with("model_name", "kNN")
            .with("standardize", "MinMaxScaler")
            .with("knn_n_neighbors", 3i64)
            .with("knn_weights", "distance")
            .with("knn_algorithm", "kd_tree")
            .with("knn_leaf_size", 20i64);
        objective.evaluate(&mut trial).unwrap();
        objective
    }

    fn stacking_config() -> StackingConfig {
        StackingConfig {
            split_seed: Some(9),
            test_size: 0.25,
            ..StackingConfig::default()
        }
    }

    #[test]
    fn empty_selection_still_becomes_the_first_best() {
        let objective = fitted_objective();
        let mut stacking = StackingObjective::new(&objective, stacking_config()).unwrap();
        let mut trial = FixedTrial::default().with("kNN", 0i64);

        assert_eq!(stacking.evaluate(&mut trial).unwrap(), LOW_SCORE_SENTINEL);
        assert_eq!(stacking.best_score(), Some(LOW_SCORE_SENTINEL));
        assert!(stacking.best_model().is_none());
        assert!(matches!(stacking.predict(&objective.train().x), Err(AllstarsError::NotFitted)));
    }

    #[test]
    fn selected_stack_replaces_the_degenerate_best() {
        let objective = fitted_objective();
        let mut stacking = StackingObjective::new(&objective, stacking_config()).unwrap();
        stacking.evaluate(&mut FixedTrial::default().with("kNN", 0i64)).unwrap();

        let mut trial = FixedTrial::default()
            .with("kNN", 1i64)
            .with("rf_n_estimators", 50i64)
            .with("rf_max_depth", 3i64)
            .with("rf_warm_start", "false")
            .with("rf_oob_score", "true");
        let score = stacking.evaluate(&mut trial).unwrap();
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(stacking.best_score(), Some(score));

        let model = stacking.best_model().unwrap();
        assert_eq!(model.base_names(), vec!["kNN"]);
        let importances = model.model_importances().unwrap();
        assert_eq!(importances.len(), 1);
        assert!(stacking.already_tried().contains("kNN"));
    }

    #[test]
    fn empty_registry_is_rejected() {
        let x = Array2::from_shape_fn((6, 1), |(r, _)| r as f64);
        let y = Array1::from(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let objective =
            Objective::new(Dataset::from_arrays(x, y).unwrap(), None, None, SearchConfig::default()).unwrap();
        assert!(matches!(
            StackingObjective::new(&objective, StackingConfig::default()),
            Err(AllstarsError::EmptyRegistry)
        ));
    }
}
