//! Random forests and extremely randomized trees.
//!
//! Trees are grown in parallel with rayon. Each tree draws its own seed from
//! the forest seed so results do not depend on thread scheduling.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::metrics::{accuracy, r2_score};
use crate::models::estimator::{check_fit_input, check_width, threshold, Estimator};
use crate::models::tree::{Criterion, DecisionTree, MaxFeatures, Splitter, TreeParams};
use crate::timeout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    pub splitter: Splitter,
    pub bootstrap: bool,
    pub oob_score: bool,
    pub warm_start: bool,
    pub seed: Option<u64>,
}

impl ForestParams {
    pub fn random_forest(kind: ProblemKind) -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            max_features: MaxFeatures::Auto,
            criterion: default_criterion(kind),
            splitter: Splitter::Best,
            bootstrap: true,
            oob_score: false,
            warm_start: false,
            seed: None,
        }
    }

    pub fn extra_trees(kind: ProblemKind) -> Self {
        Self {
            splitter: Splitter::Random,
            bootstrap: false,
            ..Self::random_forest(kind)
        }
    }
}

fn default_criterion(kind: ProblemKind) -> Criterion {
    match kind {
        ProblemKind::Classification => Criterion::Gini,
        ProblemKind::Regression => Criterion::Mse,
    }
}

#[derive(Debug, Clone)]
struct BaggedTree {
    tree: DecisionTree,
    /// Bootstrap multiplicity of every training row
    in_bag: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Forest {
    params: ForestParams,
    kind: ProblemKind,
    trees: Vec<BaggedTree>,
    n_features: Option<usize>,
    oob_score: Option<f64>,
}

impl Forest {
    pub fn new(params: ForestParams, kind: ProblemKind) -> Self {
        Self {
            params,
            kind,
            trees: Vec::new(),
            n_features: None,
            oob_score: None,
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Update the ensemble size, e.g. before a warm-started refit.
    pub fn set_n_estimators(&mut self, n_estimators: usize) {
        self.params.n_estimators = n_estimators;
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Out-of-bag accuracy (classification) or R² (regression), when requested.
    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score
    }

    fn tree_params(&self) -> TreeParams {
        let criterion = match self.kind {
            ProblemKind::Classification => Criterion::Gini,
            ProblemKind::Regression => self.params.criterion,
        };
        TreeParams {
            criterion,
            max_depth: self.params.max_depth,
            max_features: self.params.max_features,
            splitter: self.params.splitter,
            ..TreeParams::default()
        }
    }

    fn mean_prediction(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let n_features = self.n_features.ok_or(AllstarsError::NotFitted)?;
        check_width(n_features, x)?;
        if self.trees.is_empty() {
            return Err(AllstarsError::NotFitted);
        }
        let mut sum = self
            .trees
            .par_iter()
            .map(|t| t.tree.predict(x.view()))
            .reduce(|| Array1::zeros(x.nrows()), |a, b| a + b);
        sum /= self.trees.len() as f64;
        Ok(sum)
    }

    fn compute_oob(&self, x: &Array2<f64>, y: &Array1<f64>) -> Option<f64> {
        let n = x.nrows();
        let mut sum = vec![0.0; n];
        let mut count = vec![0usize; n];
        for bagged in self.trees.iter().filter(|t| t.in_bag.len() == n) {
            for i in (0..n).filter(|&i| bagged.in_bag[i] == 0.0) {
                sum[i] += bagged.tree.predict_row(x.row(i));
                count[i] += 1;
            }
        }
        let covered: Vec<usize> = (0..n).filter(|&i| count[i] > 0).collect();
        if covered.is_empty() {
            log::warn!("Too few trees to compute an out-of-bag score");
            return None;
        }
        let truth: Array1<f64> = covered.iter().map(|&i| y[i]).collect();
        let pred: Array1<f64> = covered.iter().map(|&i| sum[i] / count[i] as f64).collect();
        Some(match self.kind {
            ProblemKind::Classification => accuracy(&truth, &threshold(&pred)),
            ProblemKind::Regression => r2_score(&truth, &pred),
        })
    }
}

impl Estimator for Forest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.oob_score && !self.params.bootstrap {
            return Err(AllstarsError::invalid(
                "oob_score",
                "out-of-bag estimation requires bootstrap sampling",
            ));
        }
        if !self.params.warm_start || self.n_features != Some(x.ncols()) {
            self.trees.clear();
        }
        let existing = self.trees.len();
        let n_new = self.params.n_estimators.saturating_sub(existing);
        if n_new == 0 && existing > 0 {
            log::debug!("Warm start with n_estimators={} fits no new trees", self.params.n_estimators);
        }

        let n = x.nrows();
        let base_seed = self.params.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let tree_params = self.tree_params();
        let (bootstrap, kind) = (self.params.bootstrap, self.kind);
        let token = timeout::current();

        let grown = (0..n_new)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add((existing + i) as u64));
                let in_bag = if bootstrap {
                    let mut counts = vec![0.0; n];
                    for _ in 0..n {
                        counts[rng.gen_range(0..n)] += 1.0;
                    }
                    counts
                } else {
                    vec![1.0; n]
                };
                let mut tree = DecisionTree::new(tree_params.clone(), kind);
                tree.fit(x.view(), y.view(), &in_bag, &mut rng, &token)?;
                Ok(BaggedTree { tree, in_bag })
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees.extend(grown);
        self.n_features = Some(x.ncols());
        self.oob_score = if self.params.oob_score {
            self.compute_oob(x, y)
        } else {
            None
        };
        log::trace!("{} fitted with {} trees", self.name(), self.trees.len());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mean = self.mean_prediction(x)?;
        Ok(match self.kind {
            ProblemKind::Classification => threshold(&mean),
            ProblemKind::Regression => mean,
        })
    }

    fn kind(&self) -> ProblemKind {
        self.kind
    }

    fn name(&self) -> &str {
        match self.params.splitter {
            Splitter::Best => "RandomForest",
            Splitter::Random => "ExtraTrees",
        }
    }

    fn supports_probability(&self) -> bool {
        self.kind.is_classification()
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.kind.is_classification() {
            return Err(AllstarsError::CapabilityUnavailable {
                model: self.name().to_string(),
                capability: "predict_proba",
            });
        }
        self.mean_prediction(x)
    }

    fn supports_feature_importance(&self) -> bool {
        true
    }

    fn feature_importances(&self) -> Result<Array1<f64>> {
        let n_features = self.n_features.ok_or(AllstarsError::NotFitted)?;
        let trees: Vec<&DecisionTree> = self.trees.iter().map(|t| &t.tree).collect();
        Ok(mean_normalized_importances(&trees, None, n_features))
    }
}

/// Average of per-tree normalized impurity decreases, renormalized to sum to one.
///
/// `weights` defaults to equal weights; trees that never split contribute zeros.
pub(crate) fn mean_normalized_importances(
    trees: &[&DecisionTree],
    weights: Option<&[f64]>,
    n_features: usize,
) -> Array1<f64> {
    let mut total = Array1::zeros(n_features);
    for (i, tree) in trees.iter().enumerate() {
        let decrease = Array1::from(tree.impurity_decrease().to_vec());
        let sum = decrease.sum();
        if sum > 0.0 && decrease.len() == n_features {
            let w = weights.map_or(1.0, |w| w[i]);
            total = total + decrease * (w / sum);
        }
    }
    let norm = total.sum();
    if norm > 0.0 {
        total / norm
    } else {
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        // informative first column, noise in the second
        let x = Array2::from_shape_fn((40, 2), |(r, c)| {
            if c == 0 {
                if r < 20 { r as f64 * 0.1 } else { 5.0 + r as f64 * 0.1 }
            } else {
                ((r * 7) % 11) as f64
            }
        });
        let y = Array1::from_iter((0..40).map(|r| if r < 20 { 0.0 } else { 1.0 }));
        (x, y)
    }

    #[test]
    fn random_forest_separates_blobs_and_ranks_features() {
        let (x, y) = blobs();
        let mut params = ForestParams::random_forest(ProblemKind::Classification);
        params.n_estimators = 25;
        params.seed = Some(11);
        params.max_features = MaxFeatures::All;
        let mut forest = Forest::new(params, ProblemKind::Classification);
        forest.fit(&x, &y).unwrap();

        assert_eq!(forest.predict(&x).unwrap(), y);
        let imp = forest.feature_importances().unwrap();
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn seeded_forests_are_reproducible() {
        let (x, y) = blobs();
        let mut params = ForestParams::extra_trees(ProblemKind::Regression);
        params.n_estimators = 10;
        params.seed = Some(5);
        let mut a = Forest::new(params.clone(), ProblemKind::Regression);
        let mut b = Forest::new(params, ProblemKind::Regression);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn warm_start_only_adds_missing_trees() {
        let (x, y) = blobs();
        let mut params = ForestParams::random_forest(ProblemKind::Classification);
        params.n_estimators = 5;
        params.warm_start = true;
        let mut forest = Forest::new(params, ProblemKind::Classification);
        forest.fit(&x, &y).unwrap();
        forest.set_n_estimators(8);
        forest.fit(&x, &y).unwrap();
        assert_eq!(forest.n_trees(), 8);
    }

    #[test]
    fn oob_score_is_reported_when_bootstrapping() {
        let (x, y) = blobs();
        let mut params = ForestParams::random_forest(ProblemKind::Classification);
        params.n_estimators = 30;
        params.oob_score = true;
        params.seed = Some(1);
        let mut forest = Forest::new(params, ProblemKind::Classification);
        forest.fit(&x, &y).unwrap();
        let oob = forest.oob_score().unwrap();
        assert!((0.0..=1.0).contains(&oob));
    }

    #[test]
    fn oob_without_bootstrap_is_rejected() {
        let (x, y) = blobs();
        let mut params = ForestParams::extra_trees(ProblemKind::Classification);
        params.oob_score = true;
        let mut forest = Forest::new(params, ProblemKind::Classification);
        assert!(forest.fit(&x, &y).is_err());
    }

    #[test]
    fn unfitted_forest_refuses_to_predict() {
        let forest = Forest::new(ForestParams::random_forest(ProblemKind::Regression), ProblemKind::Regression);
        assert!(matches!(forest.predict(&Array2::zeros((1, 2))), Err(AllstarsError::NotFitted)));
    }
}
