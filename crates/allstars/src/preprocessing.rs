//! Feature scaling applied by candidate models before their estimator.
//!
//! The scaler is fit on the training fold only and reused unchanged for every
//! later transform.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{AllstarsError, Result};

/// Scaling methods a trial can choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalerKind {
    StandardScaler,
    MinMaxScaler,
    NoScaler,
}

impl ScalerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScalerKind::StandardScaler => "StandardScaler",
            ScalerKind::MinMaxScaler => "MinMaxScaler",
            ScalerKind::NoScaler => "NoScaler",
        }
    }
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalerKind {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "StandardScaler" => Ok(ScalerKind::StandardScaler),
            "MinMaxScaler" => Ok(ScalerKind::MinMaxScaler),
            "NoScaler" => Ok(ScalerKind::NoScaler),
            other => Err(AllstarsError::invalid(
                "standardize",
                format!("unknown scaler '{}'", other),
            )),
        }
    }
}

/// Per-column affine transform `(x - offset) / scale`.
#[derive(Clone, Debug)]
pub struct Scaler {
    kind: ScalerKind,
    offset: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl Scaler {
    /// Minimum spread to avoid division by zero on constant columns.
    const MIN_SCALE: f64 = 1e-6;

    pub fn new(kind: ScalerKind) -> Self {
        Self {
            kind,
            offset: None,
            scale: None,
        }
    }

    pub fn kind(&self) -> ScalerKind {
        self.kind
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.kind, ScalerKind::NoScaler) || self.offset.is_some()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(AllstarsError::invalid("x", "cannot fit a scaler on zero rows"));
        }
        let (offset, scale) = match self.kind {
            ScalerKind::NoScaler => return Ok(()),
            ScalerKind::StandardScaler => {
                let mean = x.mean_axis(Axis(0)).ok_or(AllstarsError::NotFitted)?;
                let std = x.std_axis(Axis(0), 0.0).mapv(|s| s.max(Self::MIN_SCALE));
                (mean, std)
            }
            ScalerKind::MinMaxScaler => {
                let min = x.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
                let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
                let range = (&max - &min).mapv(|r| r.max(Self::MIN_SCALE));
                (min, range)
            }
        };
        self.offset = Some(offset);
        self.scale = Some(scale);
        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if matches!(self.kind, ScalerKind::NoScaler) {
            return Ok(x.to_owned());
        }
        let (offset, scale) = match (&self.offset, &self.scale) {
            (Some(o), Some(s)) => (o, s),
            _ => return Err(AllstarsError::NotFitted),
        };
        if offset.len() != x.ncols() {
            return Err(AllstarsError::ShapeMismatch {
                expected: offset.len(),
                actual: x.ncols(),
            });
        }
        Ok((x - offset) / scale)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn standard_scaler_centers_columns() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let mut sc = Scaler::new(ScalerKind::StandardScaler);
        let t = sc.fit_transform(&x).unwrap();
        let means = t.mean_axis(Axis(0)).unwrap();
        assert!(means.iter().all(|m| m.abs() < 1e-12));
        assert!((t.std_axis(Axis(0), 0.0)[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn min_max_scaler_maps_training_range_to_unit_interval() {
        let x = array![[2.0], [4.0], [6.0]];
        let mut sc = Scaler::new(ScalerKind::MinMaxScaler);
        let t = sc.fit_transform(&x).unwrap();
        assert_eq!(t, array![[0.0], [0.5], [1.0]]);
        // unseen values extrapolate with the training statistics
        assert_eq!(sc.transform(&array![[8.0]]).unwrap(), array![[1.5]]);
    }

    #[test]
    fn no_scaler_is_identity() {
        let x = array![[1.5, -2.0]];
        let sc = Scaler::new(ScalerKind::NoScaler);
        assert_eq!(sc.transform(&x).unwrap(), x);
    }

    #[test]
    fn unfitted_scaler_refuses_to_transform() {
        let sc = Scaler::new(ScalerKind::StandardScaler);
        assert!(matches!(sc.transform(&array![[1.0]]), Err(AllstarsError::NotFitted)));
    }

    #[test]
    fn scaler_names_round_trip() {
        for kind in [ScalerKind::StandardScaler, ScalerKind::MinMaxScaler, ScalerKind::NoScaler] {
            assert_eq!(kind.name().parse::<ScalerKind>().unwrap(), kind);
        }
    }
}
