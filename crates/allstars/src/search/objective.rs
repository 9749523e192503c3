//! Single-level search objective.
//!
//! Each trial picks a family and its hyperparameters, fits a
//! [`CandidateModel`] on a training fold under the trial bound, scores it on
//! the evaluation fold and offers it to the per-family and global registries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::data_handling::{BinaryLabels, Dataset, FeatureMask, ProblemKind};
use crate::error::{AllstarsError, Result};
use crate::models::factory::Family;
use crate::search::candidate::CandidateModel;
use crate::search::catalog::Catalog;
use crate::search::registry::{BestModelRegistry, GlobalBest};
use crate::search::study::ObjectiveFunction;
use crate::search::trial::Trial;
use crate::timeout::{self, Bound, Notifier};

/// Score returned for failed or degenerate trials.
pub const LOW_SCORE_SENTINEL: f64 = -530_000.0;

/// Per-family statistics over every completed trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySummary {
    pub family: String,
    pub best_score: Option<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub n_selected: usize,
    pub mean_time: f64,
    pub std_time: f64,
    pub total_time: f64,
}

pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

pub struct Objective {
    train: Arc<Dataset>,
    test: Option<Arc<Dataset>>,
    support: Option<Arc<FeatureMask>>,
    kind: ProblemKind,
    labels: Option<BinaryLabels>,
    config: SearchConfig,
    catalog: Catalog,
    registry: BestModelRegistry,
    global: GlobalBest<Arc<CandidateModel>>,
    scores: BTreeMap<Family, Vec<f64>>,
    times: BTreeMap<Family, Vec<f64>>,
    split_rng: StdRng,
    notifier: Notifier,
}

impl Objective {
    /// The problem kind is fixed here from the training labels and never
    /// re-evaluated.
    pub fn new(
        train: Dataset,
        test: Option<Dataset>,
        support: Option<FeatureMask>,
        config: SearchConfig,
    ) -> Result<Self> {
        if let Some(mask) = &support {
            mask.check_width(train.n_features())?;
            if mask.count_selected() == 0 {
                return Err(AllstarsError::invalid("support", "the feature mask selects no columns"));
            }
        }
        if let Some(test) = &test {
            if test.n_features() != train.n_features() {
                return Err(AllstarsError::ShapeMismatch {
                    expected: train.n_features(),
                    actual: test.n_features(),
                });
            }
            if test.feature_names != train.feature_names {
                return Err(AllstarsError::invalid(
                    "test",
                    format!(
                        "feature columns {:?} do not match the training columns {:?}",
                        test.feature_names, train.feature_names
                    ),
                ));
            }
        }

        let kind = train.problem_kind();
        let labels = match kind {
            ProblemKind::Classification => Some(BinaryLabels::from_labels(&train.y)?),
            ProblemKind::Regression => None,
        };
        let n_features = support.as_ref().map_or(train.n_features(), |m| m.count_selected());
        let catalog = Catalog::new(config.scalers.clone(), n_features).with_model_seed(config.seed);
        let split_rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        log::debug!(
            "Objective over {} rows x {} features ({:?}, {} selected)",
            train.n_samples(),
            train.n_features(),
            kind,
            n_features
        );

        Ok(Self {
            train: Arc::new(train),
            test: test.map(Arc::new),
            support: support.map(Arc::new),
            kind,
            labels,
            config,
            catalog,
            registry: BestModelRegistry::new(),
            global: GlobalBest::new(),
            scores: BTreeMap::new(),
            times: BTreeMap::new(),
            split_rng,
            notifier: timeout::log_notifier(),
        })
    }

    /// Replace the callback that receives timeout messages.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    pub fn labels(&self) -> Option<BinaryLabels> {
        self.labels
    }

    pub fn train(&self) -> &Dataset {
        &self.train
    }

    pub fn support(&self) -> Option<&FeatureMask> {
        self.support.as_deref()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn get_model_names(&self) -> &[Family] {
        self.config.family_names(self.kind)
    }

    /// Restrict the families offered to trials for the current problem kind.
    pub fn set_model_names(&mut self, names: Vec<Family>) -> Result<()> {
        if let Some(bad) = names.iter().find(|f| !f.supports(self.kind)) {
            return Err(AllstarsError::UnsupportedModel(bad.name().to_string()));
        }
        match self.kind {
            ProblemKind::Classification => self.config.classifier_names = names,
            ProblemKind::Regression => self.config.regressor_names = names,
        }
        Ok(())
    }

    pub fn registry(&self) -> &BestModelRegistry {
        &self.registry
    }

    pub fn best_scores(&self) -> BTreeMap<String, f64> {
        self.registry.scores()
    }

    pub fn best_models(&self) -> BTreeMap<String, Arc<CandidateModel>> {
        self.registry.models()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.global.score()
    }

    pub fn best_model(&self) -> Option<&Arc<CandidateModel>> {
        self.global.model()
    }

    /// Raw score history per family.
    pub fn scores(&self) -> &BTreeMap<Family, Vec<f64>> {
        &self.scores
    }

    /// Fit durations in seconds per family.
    pub fn times(&self) -> &BTreeMap<Family, Vec<f64>> {
        &self.times
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.global.model().ok_or(AllstarsError::EmptyRegistry)?.predict(x)
    }

    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.global.model().ok_or(AllstarsError::EmptyRegistry)?.score(x, y)
    }

    pub fn summary(&self) -> Vec<FamilySummary> {
        self.scores
            .iter()
            .map(|(family, scores)| {
                let times = self.times.get(family).map(Vec::as_slice).unwrap_or(&[]);
                let (mean_score, std_score) = mean_std(scores);
                let (mean_time, std_time) = mean_std(times);
                FamilySummary {
                    family: family.name().to_string(),
                    best_score: self.registry.get(*family).map(|c| c.score),
                    mean_score,
                    std_score,
                    n_selected: scores.len(),
                    mean_time,
                    std_time,
                    total_time: times.iter().sum(),
                }
            })
            .collect()
    }

    fn split(&mut self) -> Result<(Dataset, Dataset)> {
        if let Some(test) = &self.test {
            return Ok((self.train.as_ref().clone(), test.as_ref().clone()));
        }
        match self.config.split_seed {
            Some(seed) => self
                .train
                .train_test_split(self.config.test_size, &mut StdRng::seed_from_u64(seed)),
            None => self.train.train_test_split(self.config.test_size, &mut self.split_rng),
        }
    }

    /// Fit and score under the trial bound. Nothing is recorded here.
    fn run_trial(&mut self, trial: &mut dyn Trial) -> Result<(Family, Arc<CandidateModel>, f64, f64)> {
        let names: Vec<&str> = self.get_model_names().iter().map(|f| f.name()).collect();
        let family_name = trial.suggest_categorical("model_name", &names)?;
        let assignment = self.catalog.build_params(&family_name, trial, self.kind)?;
        let family = assignment.family();

        let (fold, eval) = self.split()?;
        let candidate = CandidateModel::new(assignment, self.kind, self.labels, self.support.clone())?
            .with_metric(self.config.classification_metric)
            .with_fit_timeout(self.config.fit_timeout(self.kind))
            .with_notifier(Arc::clone(&self.notifier));

        let operation = format!("trial {} ({})", trial.number(), family);
        let (candidate, elapsed, score) = timeout::run_with_timeout(
            &operation,
            self.config.trial_timeout(),
            Bound::Trial,
            &self.notifier,
            move || {
                let mut candidate = candidate;
                let elapsed = candidate.fit(&fold.x, &fold.y)?;
                let score = candidate.score(&eval.x, &eval.y)?;
                Ok((candidate, elapsed, score))
            },
        )?;
        if !score.is_finite() {
            return Err(AllstarsError::Estimator(format!("{} produced a non-finite score", family)));
        }
        Ok((family, Arc::new(candidate), elapsed, score))
    }
}

impl ObjectiveFunction for Objective {
    fn evaluate(&mut self, trial: &mut dyn Trial) -> Result<f64> {
        let started = Instant::now();
        match self.run_trial(trial) {
            Ok((family, candidate, elapsed, score)) => {
                self.scores.entry(family).or_default().push(score);
                self.times.entry(family).or_default().push(elapsed);
                if self.registry.offer(family, score, Arc::clone(&candidate)) {
                    log::debug!("New best {} score: {:.6}", family, score);
                }
                self.global.offer(score, candidate);
                log::debug!(
                    "Trial {} {} scored {:.6} in {:.2?}",
                    trial.number(),
                    family,
                    score,
                    started.elapsed()
                );
                Ok(score)
            }
            Err(err) if err.is_recoverable() => {
                log::warn!("Trial {} failed: {}", trial.number(), err);
                Ok(LOW_SCORE_SENTINEL)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::trial::FixedTrial;
    use ndarray::array;
    use std::sync::Mutex;

    fn binary() -> Dataset {
        let x = Array2::from_shape_fn((10, 3), |(r, c)| r as f64 + c as f64 * 0.1);
        let y = Array1::from_iter((0..10).map(|r| if r < 5 { 0.0 } else { 1.0 }));
        Dataset::from_arrays(x, y).unwrap()
    }

    fn knn_trial() -> FixedTrial {
        FixedTrial::default()
            .with("model_name", "kNN")
            .with("standardize", "StandardScaler")
            .with("knn_n_neighbors", 2i64)
            .with("knn_weights", "uniform")
            .with("knn_algorithm", "brute")
            .with("knn_leaf_size", 30i64)
    }

    #[test]
    fn knn_trial_populates_the_registry() {
        let config = SearchConfig {
            split_seed: Some(0),
            test_size: 0.3,
            ..SearchConfig::default()
        };
        let mut objective = Objective::new(binary(), None, None, config).unwrap();
        let score = objective.evaluate(&mut knn_trial()).unwrap();
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(objective.best_scores()["kNN"], score);
        assert_eq!(objective.best_score(), Some(score));
        assert_eq!(objective.summary()[0].n_selected, 1);
    }

    #[test]
    fn unknown_family_is_fatal() {
        let mut objective = Objective::new(binary(), None, None, SearchConfig::default()).unwrap();
        let mut trial = FixedTrial::default().with("model_name", "CatBoost");
        assert!(objective.evaluate(&mut trial).is_err());
    }

    #[test]
    fn trial_timeouts_score_the_sentinel_and_notify() {
        let messages = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = messages.clone();
        let config = SearchConfig {
            trial_timeout_secs: 0,
            split_seed: Some(1),
            test_size: 0.3,
            ..SearchConfig::default()
        };
        let mut objective = Objective::new(binary(), None, None, config)
            .unwrap()
            .with_notifier(Arc::new(move |m: &str| sink.lock().unwrap().push(m.to_string())));

        let score = objective.evaluate(&mut knn_trial()).unwrap();
        assert_eq!(score, LOW_SCORE_SENTINEL);
        assert!(objective.best_scores().is_empty());
        assert!(objective.best_model().is_none());
        assert_eq!(messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn mask_width_is_checked_up_front() {
        let mask = FeatureMask::new(vec![true, false]);
        assert!(matches!(
            Objective::new(binary(), None, Some(mask), SearchConfig::default()),
            Err(AllstarsError::ShapeMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn supplied_test_set_is_used_as_is() {
        let train = binary();
        let test = Dataset::from_arrays(array![[0.0, 0.1, 0.2], [9.0, 9.1, 9.2]], array![0.0, 1.0]).unwrap();
        let mut objective = Objective::new(train, Some(test.clone()), None, SearchConfig::default()).unwrap();
        objective.evaluate(&mut knn_trial()).unwrap();
        assert_eq!(objective.score(&test.x, &test.y).unwrap(), 1.0);
        assert_eq!(objective.predict(&test.x).unwrap(), test.y);
    }

    #[test]
    fn reordered_test_columns_are_rejected() {
        let train = Dataset::new(array![[0.0, 1.0], [1.0, 0.0]], array![0.0, 1.0], vec!["a".into(), "b".into()]).unwrap();
        let test = Dataset::new(array![[1.0, 0.0]], array![0.0], vec!["b".into(), "a".into()]).unwrap();
        assert!(matches!(
            Objective::new(train, Some(test), None, SearchConfig::default()),
            Err(AllstarsError::InvalidParameter { .. })
        ));
    }
}
