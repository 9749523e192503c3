//! Gaussian discriminant analysis for binary targets.

use ndarray::{Array1, Array2, Axis};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::estimator::{check_fit_input, check_width, sigmoid, threshold, Estimator};
use crate::models::linalg::{cholesky, cholesky_solve, log_det, regularize};

const SHRINK: f64 = 1e-6;

struct ClassStats {
    mean: Array1<f64>,
    /// Sum of squared deviations about the class mean
    scatter: Array2<f64>,
    count: usize,
}

fn class_stats(x: &Array2<f64>, y: &Array1<f64>, label: f64) -> Result<ClassStats> {
    let rows: Vec<usize> = y
        .iter()
        .enumerate()
        .filter(|(_, &v)| (v >= 0.5) == (label >= 0.5))
        .map(|(i, _)| i)
        .collect();
    if rows.is_empty() {
        return Err(AllstarsError::Estimator(format!(
            "class {} has no training samples",
            label
        )));
    }
    let subset = x.select(Axis(0), &rows);
    let mean = subset.mean_axis(Axis(0)).ok_or(AllstarsError::NotFitted)?;
    let centered = &subset - &mean;
    Ok(ClassStats {
        mean,
        scatter: centered.t().dot(&centered),
        count: rows.len(),
    })
}

/// Linear discriminant analysis with a shared covariance.
#[derive(Debug, Clone, Default)]
pub struct LinearDiscriminant {
    coef: Option<Array1<f64>>,
    intercept: f64,
}

impl LinearDiscriminant {
    pub fn new() -> Self {
        Self::default()
    }

    fn decision(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coef = self.coef.as_ref().ok_or(AllstarsError::NotFitted)?;
        check_width(coef.len(), x)?;
        Ok(x.dot(coef) + self.intercept)
    }
}

impl Estimator for LinearDiscriminant {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let neg = class_stats(x, y, 0.0)?;
        let pos = class_stats(x, y, 1.0)?;
        let n = neg.count + pos.count;
        let dof = n.saturating_sub(2).max(1) as f64;

        let mut pooled = (&neg.scatter + &pos.scatter) / dof;
        regularize(&mut pooled, SHRINK);
        let l = cholesky(&pooled)?;

        let coef = cholesky_solve(&l, &(&pos.mean - &neg.mean));
        let prior_pos = pos.count as f64 / n as f64;
        let prior_neg = neg.count as f64 / n as f64;
        let midpoint = (&pos.mean + &neg.mean) * 0.5;
        self.intercept = -midpoint.dot(&coef) + (prior_pos / prior_neg).ln();
        self.coef = Some(coef);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.predict_proba(x)?))
    }

    fn kind(&self) -> ProblemKind {
        ProblemKind::Classification
    }

    fn name(&self) -> &str {
        "LDA"
    }

    fn supports_probability(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision(x)?.mapv(sigmoid))
    }
}

struct GaussianClass {
    mean: Array1<f64>,
    chol: Array2<f64>,
    log_prior: f64,
}

impl GaussianClass {
    fn log_density(&self, row: &Array1<f64>) -> f64 {
        let diff = row - &self.mean;
        let solved = cholesky_solve(&self.chol, &diff);
        -0.5 * log_det(&self.chol) - 0.5 * diff.dot(&solved) + self.log_prior
    }
}

/// Quadratic discriminant analysis: one covariance per class.
#[derive(Default)]
pub struct QuadraticDiscriminant {
    classes: Option<[GaussianClass; 2]>,
}

impl QuadraticDiscriminant {
    pub fn new() -> Self {
        Self::default()
    }

    fn fit_class(stats: ClassStats, n: usize) -> Result<GaussianClass> {
        if stats.count < 2 {
            return Err(AllstarsError::Estimator(
                "QDA needs at least two samples per class".into(),
            ));
        }
        let mut cov = stats.scatter / (stats.count - 1) as f64;
        regularize(&mut cov, SHRINK);
        Ok(GaussianClass {
            mean: stats.mean,
            chol: cholesky(&cov)?,
            log_prior: (stats.count as f64 / n as f64).ln(),
        })
    }
}

impl Estimator for QuadraticDiscriminant {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        let neg = Self::fit_class(class_stats(x, y, 0.0)?, n)?;
        let pos = Self::fit_class(class_stats(x, y, 1.0)?, n)?;
        self.classes = Some([neg, pos]);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.predict_proba(x)?))
    }

    fn kind(&self) -> ProblemKind {
        ProblemKind::Classification
    }

    fn name(&self) -> &str {
        "QDA"
    }

    fn supports_probability(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let [neg, pos] = self.classes.as_ref().ok_or(AllstarsError::NotFitted)?;
        check_width(neg.mean.len(), x)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                let row = row.to_owned();
                sigmoid(pos.log_density(&row) - neg.log_density(&row))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn clusters() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.2],
            [0.3, -0.1],
            [-0.2, 0.1],
            [0.1, 0.0],
            [4.0, 4.1],
            [4.2, 3.8],
            [3.9, 4.3],
            [4.1, 4.0]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn lda_separates_shifted_clusters() {
        let (x, y) = clusters();
        let mut lda = LinearDiscriminant::new();
        lda.fit(&x, &y).unwrap();
        assert_eq!(lda.predict(&x).unwrap(), y);
    }

    #[test]
    fn qda_separates_shifted_clusters() {
        let (x, y) = clusters();
        let mut qda = QuadraticDiscriminant::new();
        qda.fit(&x, &y).unwrap();
        let p = qda.predict_proba(&x).unwrap();
        assert!(p[0] < 0.5 && p[7] > 0.5);
    }

    #[test]
    fn qda_rejects_singleton_classes() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 0.0, 1.0];
        let mut qda = QuadraticDiscriminant::new();
        assert!(matches!(qda.fit(&x, &y), Err(AllstarsError::Estimator(_))));
    }

    #[test]
    fn missing_class_is_an_estimator_error() {
        let x = array![[0.0], [1.0]];
        let y = array![1.0, 1.0];
        let mut lda = LinearDiscriminant::new();
        assert!(lda.fit(&x, &y).is_err());
    }
}
