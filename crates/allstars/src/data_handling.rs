//! Tabular data containers shared by the search objectives.
//!
//! A [`Dataset`] owns a feature matrix, a row-aligned label vector and the
//! ordered feature names. Splits and column projections always produce new
//! datasets; the source is never mutated.

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AllstarsError, Result};

/// Classification or regression, decided from the number of distinct labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProblemKind {
    Classification,
    Regression,
}

impl ProblemKind {
    /// Fewer than three distinct label values means classification.
    pub fn from_labels(y: &Array1<f64>) -> Self {
        if distinct_values(y).len() < 3 {
            ProblemKind::Classification
        } else {
            ProblemKind::Regression
        }
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, ProblemKind::Classification)
    }
}

fn distinct_values(y: &Array1<f64>) -> BTreeSet<u64> {
    // +0.0 and -0.0 share a bucket
    y.iter().map(|v| (v + 0.0).to_bits()).collect()
}

/// Mapping between the two raw label values and the 0/1 encoding used by estimators.
///
/// The positive class is the larger of the two values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryLabels {
    pub negative: f64,
    pub positive: f64,
}

impl BinaryLabels {
    pub fn from_labels(y: &Array1<f64>) -> Result<Self> {
        let mut values: Vec<f64> = distinct_values(y).into_iter().map(f64::from_bits).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        match values.as_slice() {
            [only] => Ok(Self {
                negative: *only,
                positive: *only,
            }),
            [neg, pos] => Ok(Self {
                negative: *neg,
                positive: *pos,
            }),
            _ => Err(AllstarsError::invalid(
                "labels",
                format!("expected at most two distinct labels, found {}", values.len()),
            )),
        }
    }

    pub fn encode(&self, y: &Array1<f64>) -> Array1<f64> {
        y.mapv(|v| if v == self.positive && self.positive != self.negative { 1.0 } else { 0.0 })
    }

    pub fn decode(&self, y: &Array1<f64>) -> Array1<f64> {
        y.mapv(|v| if v >= 0.5 { self.positive } else { self.negative })
    }
}

/// Boolean column selector aligned with the feature columns of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMask(Vec<bool>);

impl FeatureMask {
    pub fn new(mask: Vec<bool>) -> Self {
        Self(mask)
    }

    pub fn all(n_features: usize) -> Self {
        Self(vec![true; n_features])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count_selected(&self) -> usize {
        self.0.iter().filter(|&&keep| keep).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect()
    }

    /// Check that the mask fits a matrix with `n_features` columns.
    pub fn check_width(&self, n_features: usize) -> Result<()> {
        if self.0.len() != n_features {
            return Err(AllstarsError::ShapeMismatch {
                expected: n_features,
                actual: self.0.len(),
            });
        }
        Ok(())
    }

    /// Project `x` onto the selected columns.
    pub fn project(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;
        Ok(x.select(Axis(1), &self.selected_indices()))
    }
}

/// A feature matrix with named columns and a row-aligned label vector.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(x: Array2<f64>, y: Array1<f64>, feature_names: Vec<String>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(AllstarsError::ShapeMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        if feature_names.len() != x.ncols() {
            return Err(AllstarsError::ShapeMismatch {
                expected: x.ncols(),
                actual: feature_names.len(),
            });
        }
        Ok(Self { x, y, feature_names })
    }

    /// Build a dataset with generated column names `x0`, `x1`, ...
    pub fn from_arrays(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        let names = (0..x.ncols()).map(|i| format!("x{}", i)).collect();
        Self::new(x, y, names)
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn problem_kind(&self) -> ProblemKind {
        ProblemKind::from_labels(&self.y)
    }

    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }

    pub fn select_features(&self, mask: &FeatureMask) -> Result<Dataset> {
        let x = mask.project(&self.x)?;
        let feature_names = mask
            .selected_indices()
            .into_iter()
            .map(|i| self.feature_names[i].clone())
            .collect();
        Ok(Dataset {
            x,
            y: self.y.clone(),
            feature_names,
        })
    }

    /// Shuffle the rows and hold out `ceil(test_size * n)` of them for evaluation.
    pub fn train_test_split<R: Rng + ?Sized>(
        &self,
        test_size: f64,
        rng: &mut R,
    ) -> Result<(Dataset, Dataset)> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(AllstarsError::invalid(
                "test_size",
                format!("must lie in (0, 1), got {}", test_size),
            ));
        }
        let n = self.n_samples();
        let n_test = (test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(AllstarsError::invalid(
                "test_size",
                format!("{} rows cannot be split with test_size {}", n, test_size),
            ));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        let (test_idx, train_idx) = indices.split_at(n_test);
        log::trace!("Split {} rows into {} train / {} test", n, train_idx.len(), test_idx.len());

        Ok((self.select_rows(train_idx), self.select_rows(test_idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn three_distinct_labels_is_the_regression_boundary() {
        assert_eq!(
            ProblemKind::from_labels(&array![0.0, 1.0, 1.0, 0.0]),
            ProblemKind::Classification
        );
        assert_eq!(
            ProblemKind::from_labels(&array![0.0, 1.0, 2.0]),
            ProblemKind::Regression
        );
    }

    #[test]
    fn binary_labels_encode_larger_value_as_positive() {
        let y = array![-1.0, 1.0, 1.0, -1.0];
        let labels = BinaryLabels::from_labels(&y).unwrap();
        assert_eq!(labels.positive, 1.0);
        assert_eq!(labels.encode(&y), array![0.0, 1.0, 1.0, 0.0]);
        assert_eq!(labels.decode(&array![0.2, 0.9]), array![-1.0, 1.0]);
    }

    #[test]
    fn mask_with_wrong_length_is_rejected() {
        let x = Array2::<f64>::zeros((4, 3));
        let mask = FeatureMask::new(vec![true, false]);
        assert!(matches!(
            mask.project(&x),
            Err(AllstarsError::ShapeMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn split_preserves_rows_and_feature_names() {
        let x = Array2::from_shape_fn((10, 2), |(r, c)| (r * 2 + c) as f64);
        let y = Array1::from_iter((0..10).map(|r| (r % 2) as f64));
        let data = Dataset::from_arrays(x, y).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let (train, test) = data.train_test_split(0.1, &mut rng).unwrap();

        assert_eq!(test.n_samples(), 1);
        assert_eq!(train.n_samples(), 9);
        assert_eq!(train.feature_names, vec!["x0", "x1"]);
        // row alignment: column 0 encodes the row index, label its parity
        for (row, label) in train.x.rows().into_iter().zip(train.y.iter()) {
            assert_eq!(((row[0] / 2.0) as usize % 2) as f64, *label);
        }
    }

    #[test]
    fn split_rejects_fraction_outside_unit_interval() {
        let data = Dataset::from_arrays(Array2::zeros((4, 1)), Array1::zeros(4)).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(data.train_test_split(0.0, &mut rng).is_err());
        assert!(data.train_test_split(1.0, &mut rng).is_err());
    }
}
