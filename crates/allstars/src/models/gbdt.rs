use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::estimator::{check_fit_input, check_width, threshold, Estimator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub max_depth: u32,
    pub learning_rate: f64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 3,
            learning_rate: 0.1,
        }
    }
}

/// Gradient Boosting Decision Tree (GBDT) backed by the `gbdt` crate.
///
/// Classification trains with log-likelihood loss on -1/+1 labels; regression
/// with squared error.
pub struct GradientBoosting {
    params: GradientBoostingParams,
    kind: ProblemKind,
    model: Option<GBDT>,
    n_features: Option<usize>,
}

impl GradientBoosting {
    pub fn new(params: GradientBoostingParams, kind: ProblemKind) -> Self {
        GradientBoosting {
            params,
            kind,
            model: None,
            n_features: None,
        }
    }

    fn to_data(x: &Array2<f64>, labels: Option<&Array1<f64>>) -> DataVec {
        x.rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let features: Vec<f32> = row.iter().map(|&v| v as f32).collect();
                let label = labels.map_or(0.0, |y| y[i] as f32);
                Data::new_training_data(features, 1.0, label, None)
            })
            .collect()
    }

    fn raw_predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (model, n_features) = match (&self.model, self.n_features) {
            (Some(m), Some(n)) => (m, n),
            _ => return Err(AllstarsError::NotFitted),
        };
        check_width(n_features, x)?;
        let test_x = Self::to_data(x, None);
        Ok(model.predict(&test_x).into_iter().map(|p| p as f64).collect())
    }
}

impl Estimator for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let mut config = Config::new();
        config.set_feature_size(x.ncols());
        config.set_shrinkage(self.params.learning_rate as f32);
        config.set_max_depth(self.params.max_depth);
        config.set_iterations(self.params.n_estimators);
        config.set_debug(false);
        config.set_training_optimization_level(2);

        let labels = match self.kind {
            ProblemKind::Classification => {
                config.set_loss("LogLikelyhood");
                y.mapv(|v| if v >= 0.5 { 1.0 } else { -1.0 })
            }
            ProblemKind::Regression => {
                config.set_loss("SquaredError");
                y.clone()
            }
        };

        let mut gbdt = GBDT::new(&config);
        let mut train_x = Self::to_data(x, Some(&labels));
        gbdt.fit(&mut train_x);

        self.model = Some(gbdt);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let raw = self.raw_predict(x)?;
        Ok(match self.kind {
            ProblemKind::Classification => threshold(&raw),
            ProblemKind::Regression => raw,
        })
    }

    fn kind(&self) -> ProblemKind {
        self.kind
    }

    fn name(&self) -> &str {
        "GradientBoosting"
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
        self.raw_predict(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (Array2<f64>, Array1<f64>) {
        // 10 samples, 5 features; the label follows the sign of the second feature
        let x = Array2::from_shape_vec(
            (10, 5),
            vec![
                0.1, 1.0, 5.0, 0.2, -0.3, 0.4, -1.0, 5.0, 0.8, 0.1, 0.6, 1.0, 5.0, 1.2, 0.2, 0.9,
                -1.0, 5.0, 1.8, -0.1, 1.2, 1.0, 5.0, 2.4, 0.3, 1.5, -1.0, 5.0, 3.0, 0.0, 1.8, 1.0,
                5.0, 3.6, -0.2, 2.1, -1.0, 5.0, 4.2, 0.4, 2.4, 1.0, 5.0, 4.8, -0.1, 2.7, -1.0, 5.0,
                5.4, 0.2,
            ],
        )
        .unwrap();
        let y = x.column(1).mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn classifier_probabilities_follow_the_label() {
        let (x, y) = toy();
        let mut model = GradientBoosting::new(
            GradientBoostingParams {
                n_estimators: 20,
                max_depth: 2,
                learning_rate: 0.3,
            },
            ProblemKind::Classification,
        );
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), x.nrows());
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn regressor_has_no_probabilities() {
        let (x, _) = toy();
        let y = x.column(0).to_owned();
        let mut model = GradientBoosting::new(GradientBoostingParams::default(), ProblemKind::Regression);
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict_proba(&x),
            Err(AllstarsError::CapabilityUnavailable { .. })
        ));
    }
}
