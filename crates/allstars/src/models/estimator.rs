use ndarray::{Array1, Array2};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::metrics::{accuracy, r2_score};

/// Capability interface implemented by every estimator family.
///
/// The base contract is fit/predict/score. Probability output and feature
/// importances are optional extensions that an implementation declares
/// through `supports_probability` / `supports_feature_importance`; the
/// default bodies report [`AllstarsError::CapabilityUnavailable`].
///
/// Classification estimators receive targets encoded as 0.0 / 1.0 and
/// predict in the same encoding.
pub trait Estimator: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn kind(&self) -> ProblemKind;

    /// Human readable family name
    fn name(&self) -> &str;

    /// Native score: accuracy for classifiers, R² for regressors.
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let pred = self.predict(x)?;
        Ok(match self.kind() {
            ProblemKind::Classification => accuracy(y, &pred),
            ProblemKind::Regression => r2_score(y, &pred),
        })
    }

    fn supports_probability(&self) -> bool {
        false
    }

    /// Probability of the positive class (or a monotone decision score).
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(AllstarsError::CapabilityUnavailable {
            model: self.name().to_string(),
            capability: "predict_proba",
        })
    }

    fn supports_feature_importance(&self) -> bool {
        false
    }

    /// Normalized importance per input column.
    fn feature_importances(&self) -> Result<Array1<f64>> {
        Err(AllstarsError::CapabilityUnavailable {
            model: self.name().to_string(),
            capability: "feature_importances",
        })
    }
}

/// Threshold positive-class probabilities into 0/1 predictions.
pub(crate) fn threshold(proba: &Array1<f64>) -> Array1<f64> {
    proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 })
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(AllstarsError::ShapeMismatch {
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(AllstarsError::Estimator("cannot fit on an empty training set".into()));
    }
    Ok(())
}

pub(crate) fn check_width(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(AllstarsError::ShapeMismatch {
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}
