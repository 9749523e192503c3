//! Linear families: ordinary least squares, ridge, lasso, logistic
//! regression and partial least squares.

use std::fmt;
use std::str::FromStr;

use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_elasticnet::ElasticNet;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use linfa_pls::PlsRegression;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::estimator::{check_fit_input, check_width, Estimator};
use crate::models::linalg::{cholesky, cholesky_solve, regularize};

/// Fitted hyperplane `x · coef + intercept`.
#[derive(Debug, Clone)]
struct Hyperplane {
    coef: Array1<f64>,
    intercept: f64,
}

impl Hyperplane {
    fn decision(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_width(self.coef.len(), x)?;
        Ok(x.dot(&self.coef) + self.intercept)
    }
}

fn not_fitted<T>(value: &Option<T>) -> Result<&T> {
    value.as_ref().ok_or(AllstarsError::NotFitted)
}

// ---------------------------------------------------------------------------
// Ordinary least squares
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionParams {
    pub fit_intercept: bool,
}

pub struct OrdinaryLeastSquares {
    params: LinearRegressionParams,
    model: Option<FittedLinearRegression<f64>>,
}

impl OrdinaryLeastSquares {
    pub fn new(params: LinearRegressionParams) -> Self {
        Self { params, model: None }
    }
}

impl Estimator for OrdinaryLeastSquares {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let dataset = Dataset::new(x.to_owned(), y.to_owned());
        let model = LinearRegression::new()
            .with_intercept(self.params.fit_intercept)
            .fit(&dataset)
            .map_err(AllstarsError::estimator)?;
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = not_fitted(&self.model)?;
        check_width(model.params().len(), x)?;
        Ok(model.predict(x))
    }

    fn kind(&self) -> ProblemKind {
        ProblemKind::Regression
    }

    fn name(&self) -> &str {
        "LinearRegression"
    }
}

// ---------------------------------------------------------------------------
// Ridge
// ---------------------------------------------------------------------------

/// Ridge solver names. Direct solvers use the normal equations; the
/// iterative ones run coordinate descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RidgeSolver {
    Auto,
    Svd,
    Cholesky,
    Lsqr,
    SparseCg,
    Sag,
    Saga,
}

impl RidgeSolver {
    pub const ALL: [&'static str; 7] = ["auto", "svd", "cholesky", "lsqr", "sparse_cg", "sag", "saga"];

    fn is_direct(&self) -> bool {
        matches!(self, RidgeSolver::Auto | RidgeSolver::Svd | RidgeSolver::Cholesky)
    }
}

impl fmt::Display for RidgeSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idx = *self as usize;
        f.write_str(Self::ALL[idx])
    }
}

impl FromStr for RidgeSolver {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "auto" => RidgeSolver::Auto,
            "svd" => RidgeSolver::Svd,
            "cholesky" => RidgeSolver::Cholesky,
            "lsqr" => RidgeSolver::Lsqr,
            "sparse_cg" => RidgeSolver::SparseCg,
            "sag" => RidgeSolver::Sag,
            "saga" => RidgeSolver::Saga,
            other => {
                return Err(AllstarsError::invalid("ridge_solver", format!("unknown solver '{}'", other)))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeParams {
    pub alpha: f64,
    pub solver: RidgeSolver,
    pub max_iter: u32,
}

/// Ridge regression, or a ridge classifier regressing on -1/+1 targets.
pub struct Ridge {
    params: RidgeParams,
    kind: ProblemKind,
    plane: Option<Hyperplane>,
}

impl Ridge {
    pub fn new(params: RidgeParams, kind: ProblemKind) -> Self {
        Self {
            params,
            kind,
            plane: None,
        }
    }

    fn solve_direct(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Hyperplane> {
        let x_mean = x.mean_axis(Axis(0)).ok_or(AllstarsError::NotFitted)?;
        let y_mean = y.mean().unwrap_or(0.0);
        let xc = x - &x_mean;
        let yc = y - y_mean;

        let mut gram = xc.t().dot(&xc);
        for i in 0..gram.nrows() {
            gram[[i, i]] += self.params.alpha;
        }
        let l = match cholesky(&gram) {
            Ok(l) => l,
            Err(_) => {
                regularize(&mut gram, 1e-10);
                cholesky(&gram)?
            }
        };
        let coef = cholesky_solve(&l, &xc.t().dot(&yc));
        let intercept = y_mean - x_mean.dot(&coef);
        Ok(Hyperplane { coef, intercept })
    }

    fn solve_iterative(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Hyperplane> {
        // penalty/n matches the unnormalized ||y - Xw||² + alpha ||w||² objective
        let penalty = self.params.alpha / x.nrows() as f64;
        let dataset = Dataset::new(x.to_owned(), y.to_owned());
        let model = ElasticNet::<f64>::ridge()
            .penalty(penalty)
            .max_iterations(self.params.max_iter)
            .tolerance(1e-4)
            .with_intercept(true)
            .fit(&dataset)
            .map_err(AllstarsError::estimator)?;
        Ok(Hyperplane {
            coef: model.hyperplane().to_owned(),
            intercept: model.intercept(),
        })
    }
}

impl Estimator for Ridge {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let targets = match self.kind {
            ProblemKind::Classification => y.mapv(|v| if v >= 0.5 { 1.0 } else { -1.0 }),
            ProblemKind::Regression => y.to_owned(),
        };
        let plane = if self.params.solver.is_direct() {
            self.solve_direct(x, &targets)?
        } else {
            self.solve_iterative(x, &targets)?
        };
        self.plane = Some(plane);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let decision = not_fitted(&self.plane)?.decision(x)?;
        Ok(match self.kind {
            ProblemKind::Classification => decision.mapv(|d| if d > 0.0 { 1.0 } else { 0.0 }),
            ProblemKind::Regression => decision,
        })
    }

    fn kind(&self) -> ProblemKind {
        self.kind
    }

    fn name(&self) -> &str {
        "Ridge"
    }
}

// ---------------------------------------------------------------------------
// Lasso
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LassoParams {
    pub alpha: f64,
    pub max_iter: u32,
    pub tol: f64,
}

pub struct Lasso {
    params: LassoParams,
    plane: Option<Hyperplane>,
}

impl Lasso {
    pub fn new(params: LassoParams) -> Self {
        Self { params, plane: None }
    }
}

impl Estimator for Lasso {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let dataset = Dataset::new(x.to_owned(), y.to_owned());
        let model = ElasticNet::<f64>::lasso()
            .penalty(self.params.alpha)
            .max_iterations(self.params.max_iter)
            .tolerance(self.params.tol)
            .with_intercept(true)
            .fit(&dataset)
            .map_err(AllstarsError::estimator)?;
        self.plane = Some(Hyperplane {
            coef: model.hyperplane().to_owned(),
            intercept: model.intercept(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        not_fitted(&self.plane)?.decision(x)
    }

    fn kind(&self) -> ProblemKind {
        ProblemKind::Regression
    }

    fn name(&self) -> &str {
        "Lasso"
    }
}

// ---------------------------------------------------------------------------
// Logistic regression
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionParams {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: u64,
}

pub struct Logistic {
    params: LogisticRegressionParams,
    model: Option<FittedLogisticRegression<f64, usize>>,
    n_features: Option<usize>,
}

impl Logistic {
    pub fn new(params: LogisticRegressionParams) -> Self {
        Self {
            params,
            model: None,
            n_features: None,
        }
    }
}

impl Estimator for Logistic {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let targets: Array1<usize> = y.mapv(|v| if v >= 0.5 { 1 } else { 0 });
        let dataset = Dataset::new(x.to_owned(), targets);
        let model = LogisticRegression::default()
            .alpha(1.0 / self.params.c)
            .max_iterations(self.params.max_iter)
            .with_intercept(true)
            .fit(&dataset)
            .map_err(AllstarsError::estimator)?;
        self.model = Some(model);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = not_fitted(&self.model)?;
        check_width(self.n_features.unwrap_or(0), x)?;
        let labels: Array1<usize> = model.predict(x);
        Ok(labels.mapv(|l| l as f64))
    }

    fn kind(&self) -> ProblemKind {
        ProblemKind::Classification
    }

    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn supports_probability(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = not_fitted(&self.model)?;
        check_width(self.n_features.unwrap_or(0), x)?;
        let p = model.predict_probabilities(x);
        // probabilities refer to linfa's own positive label
        if model.labels().pos.class == 1 {
            Ok(p)
        } else {
            Ok(p.mapv(|v| 1.0 - v))
        }
    }
}

// ---------------------------------------------------------------------------
// Partial least squares
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlsParams {
    pub n_components: usize,
    pub scale: bool,
    pub tol: f64,
    pub max_iter: usize,
}

pub struct PartialLeastSquares {
    params: PlsParams,
    model: Option<PlsRegression<f64>>,
    n_features: Option<usize>,
}

impl PartialLeastSquares {
    pub fn new(params: PlsParams) -> Self {
        Self {
            params,
            model: None,
            n_features: None,
        }
    }
}

impl Estimator for PartialLeastSquares {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.n_components == 0 || self.params.n_components > x.ncols() {
            return Err(AllstarsError::Estimator(format!(
                "PLS needs 1..={} components, got {}",
                x.ncols(),
                self.params.n_components
            )));
        }
        let targets = y.to_owned().insert_axis(Axis(1));
        let dataset = Dataset::new(x.to_owned(), targets);
        let model = PlsRegression::params(self.params.n_components)
            .scale(self.params.scale)
            .tolerance(self.params.tol)
            .max_iterations(self.params.max_iter)
            .fit(&dataset)
            .map_err(AllstarsError::estimator)?;
        self.model = Some(model);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = not_fitted(&self.model)?;
        check_width(self.n_features.unwrap_or(0), x)?;
        let pred: Array2<f64> = model.predict(x);
        Ok(pred.column(0).to_owned())
    }

    fn kind(&self) -> ProblemKind {
        ProblemKind::Regression
    }

    fn name(&self) -> &str {
        "PLS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn line() -> (Array2<f64>, Array1<f64>) {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let y = x.column(0).mapv(|v| 2.0 * v + 1.0) + x.column(1).mapv(|v| 0.5 * v);
        (x, y)
    }

    #[test]
    fn least_squares_recovers_exact_line() {
        let (x, y) = line();
        let mut model = OrdinaryLeastSquares::new(LinearRegressionParams { fit_intercept: true });
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert!(pred.iter().zip(y.iter()).all(|(p, t)| (p - t).abs() < 1e-8));
    }

    #[test]
    fn tiny_ridge_penalty_matches_least_squares() {
        let (x, y) = line();
        let mut model = Ridge::new(
            RidgeParams {
                alpha: 1e-8,
                solver: RidgeSolver::Cholesky,
                max_iter: 1000,
            },
            ProblemKind::Regression,
        );
        model.fit(&x, &y).unwrap();
        assert!(model.score(&x, &y).unwrap() > 0.999);
    }

    #[test]
    fn ridge_classifier_predicts_encoded_labels() {
        let x = array![[0.0], [1.0], [2.0], [8.0], [9.0], [10.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = Ridge::new(
            RidgeParams {
                alpha: 1.0,
                solver: RidgeSolver::Auto,
                max_iter: 1000,
            },
            ProblemKind::Classification,
        );
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        assert!(!model.supports_probability());
    }

    #[test]
    fn logistic_probabilities_increase_with_the_signal() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [7.0], [8.0], [9.0], [10.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = Logistic::new(LogisticRegressionParams { c: 1.0, max_iter: 200 });
        model.fit(&x, &y).unwrap();
        let p = model.predict_proba(&x).unwrap();
        assert!(p[0] < 0.5 && p[7] > 0.5);
    }

    #[test]
    fn pls_rejects_too_many_components() {
        let (x, y) = line();
        let mut model = PartialLeastSquares::new(PlsParams {
            n_components: 3,
            scale: true,
            tol: 1e-6,
            max_iter: 500,
        });
        assert!(matches!(model.fit(&x, &y), Err(AllstarsError::Estimator(_))));
    }

    #[test]
    fn solver_names_round_trip() {
        for name in RidgeSolver::ALL {
            assert_eq!(name.parse::<RidgeSolver>().unwrap().to_string(), name);
        }
    }
}
