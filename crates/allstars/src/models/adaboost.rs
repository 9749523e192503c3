//! AdaBoost over weighted CART trees.
//!
//! Classification uses binary SAMME with decision stumps; regression uses
//! AdaBoost.R2 with depth-3 trees and a weighted-median combination.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::estimator::{check_fit_input, check_width, sigmoid, Estimator};
use crate::models::forest::mean_normalized_importances;
use crate::models::tree::{weighted_median, Criterion, DecisionTree, TreeParams};
use crate::timeout;

/// Loss used to rescale absolute errors in AdaBoost.R2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaBoostLoss {
    Linear,
    Square,
    Exponential,
}

impl AdaBoostLoss {
    fn apply(&self, relative_error: f64) -> f64 {
        match self {
            AdaBoostLoss::Linear => relative_error,
            AdaBoostLoss::Square => relative_error * relative_error,
            AdaBoostLoss::Exponential => 1.0 - (-relative_error).exp(),
        }
    }
}

impl fmt::Display for AdaBoostLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdaBoostLoss::Linear => "linear",
            AdaBoostLoss::Square => "square",
            AdaBoostLoss::Exponential => "exponential",
        })
    }
}

impl FromStr for AdaBoostLoss {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(AdaBoostLoss::Linear),
            "square" => Ok(AdaBoostLoss::Square),
            "exponential" => Ok(AdaBoostLoss::Exponential),
            other => Err(AllstarsError::invalid("ab_loss", format!("unknown loss '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub loss: AdaBoostLoss,
    pub seed: Option<u64>,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            loss: AdaBoostLoss::Linear,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaBoost {
    params: AdaBoostParams,
    kind: ProblemKind,
    estimators: Vec<DecisionTree>,
    weights: Vec<f64>,
    n_features: Option<usize>,
}

impl AdaBoost {
    pub fn new(params: AdaBoostParams, kind: ProblemKind) -> Self {
        Self {
            params,
            kind,
            estimators: Vec::new(),
            weights: Vec::new(),
            n_features: None,
        }
    }

    pub fn n_estimators_fitted(&self) -> usize {
        self.estimators.len()
    }

    fn base_params(&self) -> TreeParams {
        match self.kind {
            ProblemKind::Classification => TreeParams {
                criterion: Criterion::Gini,
                max_depth: Some(1),
                ..TreeParams::default()
            },
            ProblemKind::Regression => TreeParams {
                criterion: Criterion::Mse,
                max_depth: Some(3),
                ..TreeParams::default()
            },
        }
    }

    fn fit_samme(&mut self, x: &Array2<f64>, y: &Array1<f64>, rng: &mut StdRng) -> Result<()> {
        let n = x.nrows();
        let mut w = vec![1.0 / n as f64; n];
        let token = timeout::current();

        for round in 0..self.params.n_estimators {
            timeout::checkpoint()?;
            let mut stump = DecisionTree::new(self.base_params(), self.kind);
            stump.fit(x.view(), y.view(), &w, rng, &token)?;
            let hard = stump.predict(x.view()).mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 });

            let total: f64 = w.iter().sum();
            let miss: Vec<bool> = hard.iter().zip(y.iter()).map(|(p, t)| p != t).collect();
            let err = w.iter().zip(&miss).filter_map(|(wi, &m)| m.then_some(*wi)).sum::<f64>() / total;

            if err <= 0.0 {
                self.estimators.push(stump);
                self.weights.push(1.0);
                break;
            }
            if err >= 0.5 {
                if round == 0 {
                    return Err(AllstarsError::Estimator(
                        "AdaBoost base estimator is no better than chance".into(),
                    ));
                }
                break;
            }

            let alpha = self.params.learning_rate * ((1.0 - err) / err).ln();
            for (wi, &m) in w.iter_mut().zip(&miss) {
                if m {
                    *wi *= alpha.exp();
                }
            }
            let norm: f64 = w.iter().sum();
            w.iter_mut().for_each(|wi| *wi /= norm);

            self.estimators.push(stump);
            self.weights.push(alpha);
        }
        Ok(())
    }

    fn fit_r2(&mut self, x: &Array2<f64>, y: &Array1<f64>, rng: &mut StdRng) -> Result<()> {
        let n = x.nrows();
        let mut w = vec![1.0 / n as f64; n];
        let token = timeout::current();
        let lr = self.params.learning_rate;

        for round in 0..self.params.n_estimators {
            timeout::checkpoint()?;
            let mut tree = DecisionTree::new(self.base_params(), self.kind);
            tree.fit(x.view(), y.view(), &w, rng, &token)?;
            let pred = tree.predict(x.view());

            let abs_err: Vec<f64> = pred.iter().zip(y.iter()).map(|(p, t)| (p - t).abs()).collect();
            let max_err = abs_err.iter().cloned().fold(0.0, f64::max);
            if max_err <= 0.0 {
                self.estimators.push(tree);
                self.weights.push(1.0);
                break;
            }
            let losses: Vec<f64> = abs_err.iter().map(|e| self.params.loss.apply(e / max_err)).collect();
            let total: f64 = w.iter().sum();
            let avg_loss = w.iter().zip(&losses).map(|(wi, l)| wi * l).sum::<f64>() / total;

            if avg_loss <= 0.0 {
                self.estimators.push(tree);
                self.weights.push(1.0);
                break;
            }
            if avg_loss >= 0.5 {
                if round == 0 {
                    self.estimators.push(tree);
                    self.weights.push(1.0);
                }
                break;
            }

            let beta = avg_loss / (1.0 - avg_loss);
            for (wi, l) in w.iter_mut().zip(&losses) {
                *wi *= beta.powf((1.0 - l) * lr);
            }
            let norm: f64 = w.iter().sum();
            w.iter_mut().for_each(|wi| *wi /= norm);

            self.estimators.push(tree);
            self.weights.push(lr * (1.0 / beta).ln());
        }
        Ok(())
    }

    /// Weighted vote in [-1, 1]; positive favours class 1.
    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        let total: f64 = self.weights.iter().sum();
        let mut score = Array1::zeros(x.nrows());
        for (tree, &alpha) in self.estimators.iter().zip(&self.weights) {
            let votes = tree.predict(x.view()).mapv(|p| if p >= 0.5 { 1.0 } else { -1.0 });
            score = score + votes * alpha;
        }
        if total > 0.0 {
            score / total
        } else {
            score
        }
    }

    fn check_predict(&self, x: &Array2<f64>) -> Result<()> {
        let n_features = self.n_features.ok_or(AllstarsError::NotFitted)?;
        check_width(n_features, x)
    }
}

impl Estimator for AdaBoost {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.estimators.clear();
        self.weights.clear();
        let mut rng = match self.params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::thread_rng().gen()),
        };
        match self.kind {
            ProblemKind::Classification => self.fit_samme(x, y, &mut rng)?,
            ProblemKind::Regression => self.fit_r2(x, y, &mut rng)?,
        }
        self.n_features = Some(x.ncols());
        log::trace!("AdaBoost stopped after {} estimators", self.estimators.len());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_predict(x)?;
        match self.kind {
            ProblemKind::Classification => {
                Ok(self.decision(x).mapv(|d| if d > 0.0 { 1.0 } else { 0.0 }))
            }
            ProblemKind::Regression => {
                let per_tree: Vec<Array1<f64>> =
                    self.estimators.iter().map(|t| t.predict(x.view())).collect();
                Ok((0..x.nrows())
                    .map(|i| {
                        let mut pairs: Vec<(f64, f64)> = per_tree
                            .iter()
                            .zip(&self.weights)
                            .map(|(p, &w)| (p[i], w))
                            .collect();
                        weighted_median(&mut pairs)
                    })
                    .collect())
            }
        }
    }

    fn kind(&self) -> ProblemKind {
        self.kind
    }

    fn name(&self) -> &str {
        "AdaBoost"
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
        self.check_predict(x)?;
        Ok(self.decision(x).mapv(|d| sigmoid(2.0 * d)))
    }

    fn supports_feature_importance(&self) -> bool {
        true
    }

    fn feature_importances(&self) -> Result<Array1<f64>> {
        let n_features = self.n_features.ok_or(AllstarsError::NotFitted)?;
        let trees: Vec<&DecisionTree> = self.estimators.iter().collect();
        Ok(mean_normalized_importances(&trees, Some(&self.weights), n_features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn samme_learns_an_axis_aligned_rule() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = AdaBoost::new(
            AdaBoostParams {
                n_estimators: 10,
                seed: Some(0),
                ..AdaBoostParams::default()
            },
            ProblemKind::Classification,
        );
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5 && proba[5] > 0.5);
    }

    #[test]
    fn r2_regressor_tracks_a_step_function() {
        let x = Array2::from_shape_fn((20, 1), |(r, _)| r as f64);
        let y = Array1::from_iter((0..20).map(|r| if r < 10 { 1.0 } else { 3.0 }));
        let mut model = AdaBoost::new(
            AdaBoostParams {
                n_estimators: 5,
                loss: AdaBoostLoss::Square,
                seed: Some(2),
                ..AdaBoostParams::default()
            },
            ProblemKind::Regression,
        );
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert!((pred[0] - 1.0).abs() < 1e-9);
        assert!((pred[19] - 3.0).abs() < 1e-9);
        assert!(!model.supports_probability());
    }

    #[test]
    fn loss_names_parse() {
        assert_eq!("square".parse::<AdaBoostLoss>().unwrap(), AdaBoostLoss::Square);
        assert!("cubic".parse::<AdaBoostLoss>().is_err());
    }
}
