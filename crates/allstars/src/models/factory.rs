use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::adaboost::{AdaBoost, AdaBoostParams};
use crate::models::discriminant::{LinearDiscriminant, QuadraticDiscriminant};
use crate::models::estimator::Estimator;
use crate::models::forest::{Forest, ForestParams};
use crate::models::gbdt::{GradientBoosting, GradientBoostingParams};
use crate::models::linear::{
    Lasso, LassoParams, LinearRegressionParams, Logistic, LogisticRegressionParams, OrdinaryLeastSquares,
    PartialLeastSquares, PlsParams, Ridge, RidgeParams,
};
use crate::models::mlp::{Mlp, MlpParams};
use crate::models::neighbors::{KNearestNeighbors, KnnParams};
use crate::models::svm::{SupportVectorClassifier, SupportVectorRegressor, SvmParams};

/// Closed set of estimator families the catalog can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Family {
    GradientBoosting,
    ExtraTrees,
    RandomForest,
    AdaBoost,
    #[serde(rename = "MLP")]
    Mlp,
    #[serde(rename = "SVC")]
    Svc,
    #[serde(rename = "SVR")]
    Svr,
    #[serde(rename = "kNN")]
    Knn,
    Ridge,
    Lasso,
    #[serde(rename = "PLS")]
    Pls,
    LinearRegression,
    LogisticRegression,
    #[serde(rename = "LDA")]
    Lda,
    #[serde(rename = "QDA")]
    Qda,
}

impl Family {
    pub const CLASSIFIERS: [Family; 11] = [
        Family::GradientBoosting,
        Family::ExtraTrees,
        Family::RandomForest,
        Family::AdaBoost,
        Family::Mlp,
        Family::Svc,
        Family::Knn,
        Family::Ridge,
        Family::Qda,
        Family::Lda,
        Family::LogisticRegression,
    ];

    pub const REGRESSORS: [Family; 11] = [
        Family::GradientBoosting,
        Family::ExtraTrees,
        Family::RandomForest,
        Family::AdaBoost,
        Family::Mlp,
        Family::Svr,
        Family::Knn,
        Family::Ridge,
        Family::Lasso,
        Family::Pls,
        Family::LinearRegression,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Family::GradientBoosting => "GradientBoosting",
            Family::ExtraTrees => "ExtraTrees",
            Family::RandomForest => "RandomForest",
            Family::AdaBoost => "AdaBoost",
            Family::Mlp => "MLP",
            Family::Svc => "SVC",
            Family::Svr => "SVR",
            Family::Knn => "kNN",
            Family::Ridge => "Ridge",
            Family::Lasso => "Lasso",
            Family::Pls => "PLS",
            Family::LinearRegression => "LinearRegression",
            Family::LogisticRegression => "LogisticRegression",
            Family::Lda => "LDA",
            Family::Qda => "QDA",
        }
    }

    /// Default family list for a problem kind.
    pub fn defaults(kind: ProblemKind) -> Vec<Family> {
        match kind {
            ProblemKind::Classification => Self::CLASSIFIERS.to_vec(),
            ProblemKind::Regression => Self::REGRESSORS.to_vec(),
        }
    }

    pub fn supports(&self, kind: ProblemKind) -> bool {
        match kind {
            ProblemKind::Classification => Self::CLASSIFIERS.contains(self),
            ProblemKind::Regression => Self::REGRESSORS.contains(self),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        Family::CLASSIFIERS
            .iter()
            .chain(Family::REGRESSORS.iter())
            .find(|f| f.name() == s)
            .copied()
            .ok_or_else(|| AllstarsError::UnsupportedModel(s.to_string()))
    }
}

/// Concrete hyperparameters for one estimator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelParams {
    GradientBoosting(GradientBoostingParams),
    ExtraTrees(ForestParams),
    RandomForest(ForestParams),
    AdaBoost(AdaBoostParams),
    Mlp(MlpParams),
    Svc(SvmParams),
    Svr(SvmParams),
    Knn(KnnParams),
    Ridge(RidgeParams),
    Lasso(LassoParams),
    Pls(PlsParams),
    LinearRegression(LinearRegressionParams),
    LogisticRegression(LogisticRegressionParams),
    Lda,
    Qda,
}

impl ModelParams {
    pub fn family(&self) -> Family {
        match self {
            ModelParams::GradientBoosting(_) => Family::GradientBoosting,
            ModelParams::ExtraTrees(_) => Family::ExtraTrees,
            ModelParams::RandomForest(_) => Family::RandomForest,
            ModelParams::AdaBoost(_) => Family::AdaBoost,
            ModelParams::Mlp(_) => Family::Mlp,
            ModelParams::Svc(_) => Family::Svc,
            ModelParams::Svr(_) => Family::Svr,
            ModelParams::Knn(_) => Family::Knn,
            ModelParams::Ridge(_) => Family::Ridge,
            ModelParams::Lasso(_) => Family::Lasso,
            ModelParams::Pls(_) => Family::Pls,
            ModelParams::LinearRegression(_) => Family::LinearRegression,
            ModelParams::LogisticRegression(_) => Family::LogisticRegression,
            ModelParams::Lda => Family::Lda,
            ModelParams::Qda => Family::Qda,
        }
    }
}

/// Build an unfitted estimator from a `ModelParams`.
///
/// Fails with `UnsupportedModel` when the family has no implementation for
/// `kind` (e.g. LDA for regression).
pub fn build_estimator(params: &ModelParams, kind: ProblemKind) -> Result<Box<dyn Estimator>> {
    let family = params.family();
    if !family.supports(kind) {
        return Err(AllstarsError::UnsupportedModel(family.name().to_string()));
    }
    Ok(match params.clone() {
        ModelParams::GradientBoosting(p) => Box::new(GradientBoosting::new(p, kind)),
        ModelParams::ExtraTrees(p) | ModelParams::RandomForest(p) => Box::new(Forest::new(p, kind)),
        ModelParams::AdaBoost(p) => Box::new(AdaBoost::new(p, kind)),
        ModelParams::Mlp(p) => Box::new(Mlp::new(p, kind)),
        ModelParams::Svc(p) => Box::new(SupportVectorClassifier::new(p)),
        ModelParams::Svr(p) => Box::new(SupportVectorRegressor::new(p)),
        ModelParams::Knn(p) => Box::new(KNearestNeighbors::new(p, kind)),
        ModelParams::Ridge(p) => Box::new(Ridge::new(p, kind)),
        ModelParams::Lasso(p) => Box::new(Lasso::new(p)),
        ModelParams::Pls(p) => Box::new(PartialLeastSquares::new(p)),
        ModelParams::LinearRegression(p) => Box::new(OrdinaryLeastSquares::new(p)),
        ModelParams::LogisticRegression(p) => Box::new(Logistic::new(p)),
        ModelParams::Lda => Box::new(LinearDiscriminant::new()),
        ModelParams::Qda => Box::new(QuadraticDiscriminant::new()),
    })
}
