use std::fmt;
use std::str::FromStr;

use linfa::dataset::Pr;
use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_svm::{Svm, SvmParams as LinfaSvmParams};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::estimator::{check_fit_input, check_width, threshold, Estimator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvmKernel {
    Linear,
    Rbf,
}

/// Bandwidth heuristic for the RBF kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvmGamma {
    /// 1 / n_features
    Auto,
    /// 1 / (n_features * var(X))
    Scale,
}

impl fmt::Display for SvmKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SvmKernel::Linear => "linear",
            SvmKernel::Rbf => "rbf",
        })
    }
}

impl FromStr for SvmKernel {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(SvmKernel::Linear),
            "rbf" => Ok(SvmKernel::Rbf),
            other => Err(AllstarsError::invalid("svm_kernel", format!("unsupported kernel '{}'", other))),
        }
    }
}

impl FromStr for SvmGamma {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(SvmGamma::Auto),
            "scale" => Ok(SvmGamma::Scale),
            other => Err(AllstarsError::invalid("svm_gamma", format!("unsupported gamma '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    pub kernel: SvmKernel,
    pub c: f64,
    pub gamma: SvmGamma,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            kernel: SvmKernel::Rbf,
            c: 1.0,
            gamma: SvmGamma::Scale,
        }
    }
}

impl SvmParams {
    /// linfa's gaussian kernel is exp(-|a-b|² / eps), so eps = 1 / gamma.
    fn gaussian_eps(&self, x: &Array2<f64>) -> f64 {
        let n_features = x.ncols().max(1) as f64;
        match self.gamma {
            SvmGamma::Auto => n_features,
            SvmGamma::Scale => {
                let mean = x.mean().unwrap_or(0.0);
                let var = x.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(0.0);
                if var > 0.0 {
                    n_features * var
                } else {
                    1.0
                }
            }
        }
    }

    fn configure<T>(&self, params: LinfaSvmParams<f64, T>, x: &Array2<f64>) -> LinfaSvmParams<f64, T> {
        match self.kernel {
            SvmKernel::Linear => params.linear_kernel(),
            SvmKernel::Rbf => params.gaussian_kernel(self.gaussian_eps(x)),
        }
    }
}

/// Support vector classifier with Platt-scaled probabilities.
pub struct SupportVectorClassifier {
    params: SvmParams,
    model: Option<Svm<f64, Pr>>,
    n_features: Option<usize>,
}

impl SupportVectorClassifier {
    pub fn new(params: SvmParams) -> Self {
        SupportVectorClassifier {
            params,
            model: None,
            n_features: None,
        }
    }
}

impl Estimator for SupportVectorClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let targets: Array1<bool> = y.mapv(|v| v >= 0.5);
        let dataset = Dataset::new(x.to_owned(), targets);

        let c = self.params.c;
        let params = self.params.configure(Svm::<f64, Pr>::params().pos_neg_weights(c, c), x);
        let model = params.fit(&dataset).map_err(AllstarsError::estimator)?;

        self.model = Some(model);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.predict_proba(x)?))
    }

    fn kind(&self) -> ProblemKind {
        ProblemKind::Classification
    }

    fn name(&self) -> &str {
        "SVC"
    }

    fn supports_probability(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (model, n_features) = match (&self.model, self.n_features) {
            (Some(m), Some(n)) => (m, n),
            _ => return Err(AllstarsError::NotFitted),
        };
        check_width(n_features, x)?;
        let predictions: Array1<Pr> = model.predict(x);
        Ok(predictions.mapv(|p| *p as f64))
    }
}

/// Epsilon support vector regression.
pub struct SupportVectorRegressor {
    params: SvmParams,
    model: Option<Svm<f64, f64>>,
    n_features: Option<usize>,
}

impl SupportVectorRegressor {
    pub fn new(params: SvmParams) -> Self {
        SupportVectorRegressor {
            params,
            model: None,
            n_features: None,
        }
    }
}

impl Estimator for SupportVectorRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let dataset = Dataset::new(x.to_owned(), y.to_owned());
        let params = self
            .params
            .configure(Svm::<f64, f64>::params().c_svr(self.params.c, None), x);
        let model = params.fit(&dataset).map_err(AllstarsError::estimator)?;

        self.model = Some(model);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (model, n_features) = match (&self.model, self.n_features) {
            (Some(m), Some(n)) => (m, n),
            _ => return Err(AllstarsError::NotFitted),
        };
        check_width(n_features, x)?;
        let predictions: Array1<f64> = model.predict(x);
        Ok(predictions)
    }

    fn kind(&self) -> ProblemKind {
        ProblemKind::Regression
    }

    fn name(&self) -> &str {
        "SVR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn linear_svc_separates_two_clusters() {
        let x = array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.3],
            [0.3, 0.2],
            [3.0, 3.1],
            [3.2, 2.9],
            [2.9, 3.3],
            [3.1, 3.0]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = SupportVectorClassifier::new(SvmParams {
            kernel: SvmKernel::Linear,
            c: 10.0,
            gamma: SvmGamma::Auto,
        });
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < proba[7]);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn unfitted_svr_reports_not_fitted() {
        let model = SupportVectorRegressor::new(SvmParams::default());
        assert!(matches!(model.predict(&array![[1.0]]), Err(AllstarsError::NotFitted)));
        assert!(!model.supports_probability());
    }

    #[test]
    fn kernel_names_parse() {
        assert_eq!("rbf".parse::<SvmKernel>().unwrap(), SvmKernel::Rbf);
        assert!("poly".parse::<SvmKernel>().is_err());
    }
}
