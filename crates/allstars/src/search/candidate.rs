use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::{Array1, Array2};

use crate::config::ClassificationMetric;
use crate::data_handling::{BinaryLabels, FeatureMask, ProblemKind};
use crate::error::{AllstarsError, Result};
use crate::metrics::{accuracy, f1_score, r2_score};
use crate::models::estimator::Estimator;
use crate::models::factory::{build_estimator, Family};
use crate::preprocessing::Scaler;
use crate::search::catalog::ParameterAssignment;
use crate::timeout::{self, Bound, Notifier};

/// One concrete estimator plus its scaler and optional column mask.
///
/// The mask is applied on every call, so fitting and prediction always see the
/// same columns. The scaler is fit on the training fold only. Classification
/// labels are mapped to 0/1 before reaching the estimator and mapped back on
/// the way out.
pub struct CandidateModel {
    assignment: ParameterAssignment,
    kind: ProblemKind,
    labels: Option<BinaryLabels>,
    support: Option<Arc<FeatureMask>>,
    metric: ClassificationMetric,
    fit_timeout: Duration,
    notifier: Notifier,
    scaler: Scaler,
    estimator: Option<Box<dyn Estimator>>,
}

impl fmt::Debug for CandidateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateModel")
            .field("assignment", &self.assignment)
            .field("kind", &self.kind)
            .field("fitted", &self.is_fitted())
            .finish()
    }
}

impl CandidateModel {
    /// `labels` is required for classification and ignored for regression.
    pub fn new(
        assignment: ParameterAssignment,
        kind: ProblemKind,
        labels: Option<BinaryLabels>,
        support: Option<Arc<FeatureMask>>,
    ) -> Result<Self> {
        if kind.is_classification() && labels.is_none() {
            return Err(AllstarsError::invalid("labels", "classification candidates need a label mapping"));
        }
        let scaler = Scaler::new(assignment.standardize);
        Ok(Self {
            assignment,
            kind,
            labels: if kind.is_classification() { labels } else { None },
            support,
            metric: ClassificationMetric::default(),
            fit_timeout: match kind {
                ProblemKind::Classification => Duration::from_secs(60),
                ProblemKind::Regression => Duration::from_secs(600),
            },
            notifier: timeout::log_notifier(),
            scaler,
            estimator: None,
        })
    }

    pub fn with_metric(mut self, metric: ClassificationMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_fit_timeout(mut self, limit: Duration) -> Self {
        self.fit_timeout = limit;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn assignment(&self) -> &ParameterAssignment {
        &self.assignment
    }

    pub fn family(&self) -> Family {
        self.assignment.family()
    }

    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    pub fn support(&self) -> Option<&FeatureMask> {
        self.support.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        self.estimator.is_some()
    }

    fn project(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match &self.support {
            Some(mask) => mask.project(x),
            None => Ok(x.to_owned()),
        }
    }

    fn prepare(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.scaler.transform(&self.project(x)?)
    }

    fn encode(&self, y: &Array1<f64>) -> Array1<f64> {
        match &self.labels {
            Some(labels) => labels.encode(y),
            None => y.to_owned(),
        }
    }

    fn fitted(&self) -> Result<&dyn Estimator> {
        self.estimator.as_deref().ok_or(AllstarsError::NotFitted)
    }

    /// Fit under the fit bound and return the elapsed seconds.
    ///
    /// On timeout the candidate stays unfitted; the abandoned estimator is
    /// never written back.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        if x.nrows() != y.len() {
            return Err(AllstarsError::ShapeMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        let started = Instant::now();
        let projected = self.project(x)?;
        let mut scaler = Scaler::new(self.assignment.standardize);
        let xs = scaler.fit_transform(&projected)?;
        let ys = self.encode(y);
        log::trace!(
            "Fitting {} on {}x{} with {}",
            self.family(),
            xs.nrows(),
            xs.ncols(),
            scaler.kind()
        );

        let mut estimator = build_estimator(&self.assignment.model, self.kind)?;
        let operation = match self.kind {
            ProblemKind::Classification => "classifier.fit",
            ProblemKind::Regression => "regressor.fit",
        };
        let estimator = timeout::run_with_timeout(operation, self.fit_timeout, Bound::Fit, &self.notifier, move || {
            estimator.fit(&xs, &ys)?;
            Ok(estimator)
        })?;

        self.scaler = scaler;
        self.estimator = Some(estimator);
        Ok(started.elapsed().as_secs_f64())
    }

    /// Predictions in the caller's label space.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let pred = self.fitted()?.predict(&self.prepare(x)?)?;
        Ok(match &self.labels {
            Some(labels) => labels.decode(&pred),
            None => pred,
        })
    }

    pub fn supports_probability(&self) -> bool {
        self.estimator.as_ref().map_or(false, |e| e.supports_probability())
    }

    /// Probability of the positive label.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let estimator = self.fitted()?;
        if !estimator.supports_probability() {
            return Err(AllstarsError::CapabilityUnavailable {
                model: self.family().name().to_string(),
                capability: "predict_proba",
            });
        }
        estimator.predict_proba(&self.prepare(x)?)
    }

    /// F1 on the positive label or accuracy for classification, R² for regression.
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let pred = self.predict(x)?;
        Ok(match (&self.labels, self.metric) {
            (Some(labels), ClassificationMetric::F1) => f1_score(y, &pred, labels.positive),
            (Some(_), ClassificationMetric::Accuracy) => accuracy(y, &pred),
            (None, _) => r2_score(y, &pred),
        })
    }

    /// Input column for a stacking meta-learner: positive-class probability
    /// when available, otherwise the 0/1 (or continuous) prediction.
    pub fn meta_feature(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let estimator = self.fitted()?;
        let xs = self.prepare(x)?;
        if self.kind.is_classification() && estimator.supports_probability() {
            estimator.predict_proba(&xs)
        } else {
            estimator.predict(&xs)
        }
    }

    pub fn supports_feature_importance(&self) -> bool {
        self.estimator
            .as_ref()
            .map_or(false, |e| e.supports_feature_importance())
    }

    /// Importances over the columns the estimator saw (after masking).
    pub fn feature_importances(&self) -> Result<Array1<f64>> {
        self.fitted()?.feature_importances()
    }
}
