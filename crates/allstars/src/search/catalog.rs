//! Search space per estimator family.
//!
//! `Catalog::build_params` turns a family name plus a trial into a concrete
//! [`ParameterAssignment`]. The order of suggestions is fixed per family, so
//! identical answers in identical order give identical assignments.

use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::adaboost::AdaBoostParams;
use crate::models::factory::{Family, ModelParams};
use crate::models::forest::ForestParams;
use crate::models::gbdt::GradientBoostingParams;
use crate::models::linear::{
    LassoParams, LinearRegressionParams, LogisticRegressionParams, PlsParams, RidgeParams, RidgeSolver,
};
use crate::models::mlp::MlpParams;
use crate::models::neighbors::KnnParams;
use crate::models::svm::{SvmGamma, SvmKernel, SvmParams};
use crate::preprocessing::ScalerKind;
use crate::search::trial::Trial;

const MAX_ITER: u32 = 530_000;
const CLASSIFIER_MLP_MAX_ITER: usize = 530_000;
const REGRESSOR_MLP_MAX_ITER: usize = 200;

const N_LAYERS: (i64, i64) = (1, 10);
const N_NEURONS: (i64, i64) = (4, 64);
const DEPTH: (i64, i64) = (2, 32);
const STRENGTH: (f64, f64) = (1e-5, 1e5);

const MAX_FEATURES: [&str; 3] = ["auto", "sqrt", "log2"];
const CRITERIA: [&str; 2] = ["mse", "mae"];
const BOOLS: [&str; 2] = ["true", "false"];

/// Everything one trial decides: the scaler and the estimator hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAssignment {
    pub standardize: ScalerKind,
    pub model: ModelParams,
}

impl ParameterAssignment {
    pub fn family(&self) -> Family {
        self.model.family()
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    /// Scalers a trial may pick from
    pub scalers: Vec<ScalerKind>,
    /// Width of the matrix the estimator will see (after masking)
    pub n_features: usize,
    /// Seed forwarded to stochastic estimators
    pub model_seed: Option<u64>,
}

impl Catalog {
    pub fn new(scalers: Vec<ScalerKind>, n_features: usize) -> Self {
        Self {
            scalers,
            n_features,
            model_seed: None,
        }
    }

    pub fn with_model_seed(mut self, seed: Option<u64>) -> Self {
        self.model_seed = seed;
        self
    }

    pub fn build_params(
        &self,
        family_name: &str,
        trial: &mut dyn Trial,
        kind: ProblemKind,
    ) -> Result<ParameterAssignment> {
        let family: Family = family_name.parse()?;
        if !family.supports(kind) {
            return Err(AllstarsError::UnsupportedModel(family_name.to_string()));
        }

        let scaler_names: Vec<&str> = self.scalers.iter().map(|s| s.name()).collect();
        let standardize = trial.suggest_categorical("standardize", &scaler_names)?.parse()?;

        let model = match kind {
            ProblemKind::Classification => self.classifier_params(family, trial)?,
            ProblemKind::Regression => self.regressor_params(family, trial)?,
        };
        Ok(ParameterAssignment { standardize, model })
    }

    fn classifier_params(&self, family: Family, trial: &mut dyn Trial) -> Result<ModelParams> {
        let kind = ProblemKind::Classification;
        Ok(match family {
            Family::Svc => ModelParams::Svc(svm_params(trial)?),
            Family::RandomForest => {
                let n_estimators = trial.suggest_int("rf_n_estimators", 100, 200)?;
                let max_features = trial.suggest_categorical("rf_max_features", &MAX_FEATURES)?;
                let max_depth = trial.suggest_int("rf_max_depth", DEPTH.0, DEPTH.1)?;
                let warm_start = suggest_flag(trial, "rf_warm_start")?;
                ModelParams::RandomForest(ForestParams {
                    n_estimators: n_estimators as usize,
                    max_features: max_features.parse()?,
                    max_depth: Some(max_depth as usize),
                    warm_start,
                    seed: self.model_seed,
                    ..ForestParams::random_forest(kind)
                })
            }
            Family::Mlp => {
                let hidden_layers = suggest_layers(trial)?;
                let warm_start = suggest_flag(trial, "mlp_warm_start")?;
                let activation = trial
                    .suggest_categorical("mlp_activation", &["identity", "logistic", "tanh", "relu"])?
                    .parse()?;
                ModelParams::Mlp(MlpParams {
                    hidden_layers,
                    activation,
                    warm_start,
                    early_stopping: true,
                    max_iter: CLASSIFIER_MLP_MAX_ITER,
                    seed: self.model_seed,
                    ..MlpParams::default()
                })
            }
            Family::LogisticRegression => {
                let c = trial.suggest_loguniform("lr_C", STRENGTH.0, STRENGTH.1)?;
                ModelParams::LogisticRegression(LogisticRegressionParams {
                    c,
                    max_iter: MAX_ITER as u64,
                })
            }
            Family::GradientBoosting => {
                let n_estimators = trial.suggest_int("gb_n_estimators", 50, 200)?;
                let max_depth = trial.suggest_int("gb_max_depth", DEPTH.0, DEPTH.1)?;
                ModelParams::GradientBoosting(GradientBoostingParams {
                    n_estimators: n_estimators as usize,
                    max_depth: max_depth as u32,
                    ..GradientBoostingParams::default()
                })
            }
            Family::ExtraTrees => {
                let n_estimators = trial.suggest_int("et_n_estimators", 50, 300)?;
                let max_depth = trial.suggest_int("et_max_depth", DEPTH.0, DEPTH.1)?;
                let warm_start = suggest_flag(trial, "et_warm_start")?;
                ModelParams::ExtraTrees(ForestParams {
                    n_estimators: n_estimators as usize,
                    max_depth: Some(max_depth as usize),
                    warm_start,
                    seed: self.model_seed,
                    ..ForestParams::extra_trees(kind)
                })
            }
            Family::AdaBoost => {
                let n_estimators = trial.suggest_int("ab_n_estimators", 50, 300)?;
                ModelParams::AdaBoost(AdaBoostParams {
                    n_estimators: n_estimators as usize,
                    seed: self.model_seed,
                    ..AdaBoostParams::default()
                })
            }
            Family::Knn => {
                let n_neighbors = trial.suggest_int("knn_n_neighbors", 2, 10)?;
                let weights = trial.suggest_categorical("knn_weights", &["uniform", "distance"])?;
                let algorithm = trial.suggest_categorical("knn_algorithm", &KNN_ALGORITHMS)?;
                let leaf_size = trial.suggest_int("knn_leaf_size", 20, 40)?;
                ModelParams::Knn(KnnParams {
                    n_neighbors: n_neighbors as usize,
                    weights: weights.parse()?,
                    algorithm: algorithm.parse()?,
                    leaf_size: leaf_size as usize,
                })
            }
            Family::Ridge => ModelParams::Ridge(ridge_params(trial)?),
            Family::Qda => ModelParams::Qda,
            Family::Lda => ModelParams::Lda,
            other => return Err(AllstarsError::UnsupportedModel(other.name().to_string())),
        })
    }

    fn regressor_params(&self, family: Family, trial: &mut dyn Trial) -> Result<ModelParams> {
        let kind = ProblemKind::Regression;
        Ok(match family {
            Family::GradientBoosting => {
                let learning_rate = trial.suggest_loguniform("gb_learning_rate", 1e-3, 1e-1)?;
                let n_estimators = trial.suggest_int("gb_n_estimators", 50, 200)?;
                let max_depth = trial.suggest_int("gb_max_depth", DEPTH.0, DEPTH.1)?;
                ModelParams::GradientBoosting(GradientBoostingParams {
                    n_estimators: n_estimators as usize,
                    max_depth: max_depth as u32,
                    learning_rate,
                })
            }
            Family::ExtraTrees => {
                let n_estimators = trial.suggest_int("et_n_estimators", 50, 300)?;
                let criterion = trial.suggest_categorical("et_criterion", &CRITERIA)?;
                let max_depth = trial.suggest_int("et_max_depth", DEPTH.0, DEPTH.1)?;
                let max_features = trial.suggest_categorical("et_max_features", &MAX_FEATURES)?;
                let warm_start = suggest_flag(trial, "et_warm_start")?;
                ModelParams::ExtraTrees(ForestParams {
                    n_estimators: n_estimators as usize,
                    criterion: criterion.parse()?,
                    max_depth: Some(max_depth as usize),
                    max_features: max_features.parse()?,
                    bootstrap: true,
                    oob_score: true,
                    warm_start,
                    seed: self.model_seed,
                    ..ForestParams::extra_trees(kind)
                })
            }
            Family::RandomForest => {
                let n_estimators = trial.suggest_int("rf_n_estimators", 100, 200)?;
                let criterion = trial.suggest_categorical("rf_criterion", &CRITERIA)?;
                let max_depth = trial.suggest_int("rf_max_depth", DEPTH.0, DEPTH.1)?;
                let max_features = trial.suggest_categorical("rf_max_features", &MAX_FEATURES)?;
                let warm_start = suggest_flag(trial, "rf_warm_start")?;
                ModelParams::RandomForest(ForestParams {
                    n_estimators: n_estimators as usize,
                    criterion: criterion.parse()?,
                    max_depth: Some(max_depth as usize),
                    max_features: max_features.parse()?,
                    bootstrap: true,
                    oob_score: true,
                    warm_start,
                    seed: self.model_seed,
                    ..ForestParams::random_forest(kind)
                })
            }
            Family::AdaBoost => {
                let n_estimators = trial.suggest_int("ab_n_estimators", 50, 300)?;
                let learning_rate = trial.suggest_loguniform("ab_learning_rate", 0.1, 1.0)?;
                let loss = trial.suggest_categorical("ab_loss", &["linear", "square", "exponential"])?;
                ModelParams::AdaBoost(AdaBoostParams {
                    n_estimators: n_estimators as usize,
                    learning_rate,
                    loss: loss.parse()?,
                    seed: self.model_seed,
                })
            }
            Family::Mlp => {
                let hidden_layers = suggest_layers(trial)?;
                let learning_rate = trial
                    .suggest_categorical("mlp_learning_rate", &["constant", "invscaling", "adaptive"])?
                    .parse()?;
                let learning_rate_init = trial.suggest_loguniform("mlp_learning_rate_init", 1e-4, 1e-2)?;
                let warm_start = suggest_flag(trial, "mlp_warm_start")?;
                ModelParams::Mlp(MlpParams {
                    hidden_layers,
                    learning_rate,
                    learning_rate_init,
                    warm_start,
                    early_stopping: true,
                    max_iter: REGRESSOR_MLP_MAX_ITER,
                    seed: self.model_seed,
                    ..MlpParams::default()
                })
            }
            Family::Svr => ModelParams::Svr(svm_params(trial)?),
            Family::Knn => {
                let n_neighbors = trial.suggest_int("knn_n_neighbors", 2, 10)?;
                let weights = trial.suggest_categorical("knn_weights", &["uniform", "distance"])?;
                let algorithm = trial.suggest_categorical("knn_algorithm", &KNN_ALGORITHMS)?;
                ModelParams::Knn(KnnParams {
                    n_neighbors: n_neighbors as usize,
                    weights: weights.parse()?,
                    algorithm: algorithm.parse()?,
                    ..KnnParams::default()
                })
            }
            Family::Ridge => ModelParams::Ridge(ridge_params(trial)?),
            Family::Lasso => {
                let alpha = trial.suggest_loguniform("lasso_alpha", STRENGTH.0, STRENGTH.1)?;
                ModelParams::Lasso(LassoParams {
                    alpha,
                    max_iter: MAX_ITER,
                    tol: 1e-4,
                })
            }
            Family::Pls => {
                let p = self.n_features as i64;
                let n_components = trial.suggest_int("pls_n_components", p.min(2), p)?;
                let scale = suggest_flag(trial, "pls_scale")?;
                let tol = trial.suggest_loguniform("pls_tol", 1e-7, 1e-5)?;
                ModelParams::Pls(PlsParams {
                    n_components: n_components as usize,
                    scale,
                    tol,
                    max_iter: MAX_ITER as usize,
                })
            }
            Family::LinearRegression => ModelParams::LinearRegression(LinearRegressionParams {
                fit_intercept: suggest_flag(trial, "lr_fit_intercept")?,
            }),
            other => return Err(AllstarsError::UnsupportedModel(other.name().to_string())),
        })
    }
}

const KNN_ALGORITHMS: [&str; 4] = ["auto", "ball_tree", "kd_tree", "brute"];

/// Boolean drawn as a two-way categorical so enqueued JSON strings pin it too.
fn suggest_flag(trial: &mut dyn Trial, name: &str) -> Result<bool> {
    Ok(trial.suggest_categorical(name, &BOOLS)? == "true")
}

/// Layer count first, then one width per layer keyed "0", "1", ...
fn suggest_layers(trial: &mut dyn Trial) -> Result<Vec<usize>> {
    let n_layers = trial.suggest_int("n_layers", N_LAYERS.0, N_LAYERS.1)?;
    (0..n_layers)
        .map(|i| {
            trial
                .suggest_int(&i.to_string(), N_NEURONS.0, N_NEURONS.1)
                .map(|w| w as usize)
        })
        .collect()
}

fn svm_params(trial: &mut dyn Trial) -> Result<SvmParams> {
    let kernel: SvmKernel = trial.suggest_categorical("svm_kernel", &["linear", "rbf"])?.parse()?;
    let c = trial.suggest_loguniform("svm_c", STRENGTH.0, STRENGTH.1)?;
    let gamma = match kernel {
        SvmKernel::Rbf => trial.suggest_categorical("svm_gamma", &["auto", "scale"])?.parse()?,
        SvmKernel::Linear => SvmGamma::Auto,
    };
    Ok(SvmParams { kernel, c, gamma })
}

fn ridge_params(trial: &mut dyn Trial) -> Result<RidgeParams> {
    let alpha = trial.suggest_loguniform("ridge_alpha", STRENGTH.0, STRENGTH.1)?;
    let solver: RidgeSolver = trial.suggest_categorical("ridge_solver", &RidgeSolver::ALL)?.parse()?;
    Ok(RidgeParams {
        alpha,
        solver,
        max_iter: MAX_ITER,
    })
}
