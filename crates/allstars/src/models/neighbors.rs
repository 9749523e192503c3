use std::fmt;
use std::str::FromStr;

use linfa_nn::distance::{Distance, L2Dist};
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::estimator::{check_fit_input, check_width, Estimator};

/// Above this width kd-trees lose to ball trees.
const KD_TREE_MAX_FEATURES: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnnWeights {
    Uniform,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnnAlgorithm {
    Auto,
    BallTree,
    KdTree,
    Brute,
}

impl fmt::Display for KnnWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KnnWeights::Uniform => "uniform",
            KnnWeights::Distance => "distance",
        })
    }
}

impl FromStr for KnnWeights {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uniform" => Ok(KnnWeights::Uniform),
            "distance" => Ok(KnnWeights::Distance),
            other => Err(AllstarsError::invalid("knn_weights", format!("unknown weighting '{}'", other))),
        }
    }
}

impl fmt::Display for KnnAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KnnAlgorithm::Auto => "auto",
            KnnAlgorithm::BallTree => "ball_tree",
            KnnAlgorithm::KdTree => "kd_tree",
            KnnAlgorithm::Brute => "brute",
        })
    }
}

impl FromStr for KnnAlgorithm {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(KnnAlgorithm::Auto),
            "ball_tree" => Ok(KnnAlgorithm::BallTree),
            "kd_tree" => Ok(KnnAlgorithm::KdTree),
            "brute" => Ok(KnnAlgorithm::Brute),
            other => Err(AllstarsError::invalid("knn_algorithm", format!("unknown algorithm '{}'", other))),
        }
    }
}

impl KnnAlgorithm {
    fn index_kind(&self, n_features: usize) -> CommonNearestNeighbour {
        match self {
            KnnAlgorithm::Auto if n_features <= KD_TREE_MAX_FEATURES => CommonNearestNeighbour::KdTree,
            KnnAlgorithm::Auto => CommonNearestNeighbour::BallTree,
            KnnAlgorithm::BallTree => CommonNearestNeighbour::BallTree,
            KnnAlgorithm::KdTree => CommonNearestNeighbour::KdTree,
            KnnAlgorithm::Brute => CommonNearestNeighbour::LinearSearch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnParams {
    pub n_neighbors: usize,
    pub weights: KnnWeights,
    pub algorithm: KnnAlgorithm,
    pub leaf_size: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: KnnWeights::Uniform,
            algorithm: KnnAlgorithm::Auto,
            leaf_size: 30,
        }
    }
}

/// k-nearest-neighbours vote (classification) or average (regression).
///
/// The training set is kept as-is; the spatial index is built per predict call
/// because linfa-nn indices borrow their points.
pub struct KNearestNeighbors {
    params: KnnParams,
    kind: ProblemKind,
    train: Option<(Array2<f64>, Array1<f64>)>,
}

impl KNearestNeighbors {
    pub fn new(params: KnnParams, kind: ProblemKind) -> Self {
        Self {
            params,
            kind,
            train: None,
        }
    }

    /// Weighted average of neighbour targets for every row of `x`.
    fn neighbour_average(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (records, targets) = self.train.as_ref().ok_or(AllstarsError::NotFitted)?;
        check_width(records.ncols(), x)?;

        let k = self.params.n_neighbors.clamp(1, records.nrows());
        let index = self
            .params
            .algorithm
            .index_kind(records.ncols())
            .from_batch_with_leaf_size(records, self.params.leaf_size.max(1), L2Dist)
            .map_err(AllstarsError::estimator)?;

        x.rows()
            .into_iter()
            .map(|row| {
                let neighbours = index.k_nearest(row, k).map_err(AllstarsError::estimator)?;
                let hits: Vec<(f64, f64)> = neighbours
                    .into_iter()
                    .map(|(point, idx)| (L2Dist.distance(row, point), targets[idx]))
                    .collect();
                Ok(self.combine(&hits))
            })
            .collect()
    }

    fn combine(&self, hits: &[(f64, f64)]) -> f64 {
        let mean = |values: &mut dyn Iterator<Item = f64>| {
            let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            sum / count.max(1) as f64
        };
        match self.params.weights {
            KnnWeights::Uniform => mean(&mut hits.iter().map(|&(_, t)| t)),
            KnnWeights::Distance => {
                // exact matches dominate
                if hits.iter().any(|&(d, _)| d == 0.0) {
                    return mean(&mut hits.iter().filter(|&&(d, _)| d == 0.0).map(|&(_, t)| t));
                }
                let (num, den) = hits
                    .iter()
                    .fold((0.0, 0.0), |(n, d), &(dist, t)| (n + t / dist, d + 1.0 / dist));
                num / den
            }
        }
    }
}

impl Estimator for KNearestNeighbors {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.train = Some((x.to_owned(), y.to_owned()));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let avg = self.neighbour_average(x)?;
        Ok(match self.kind {
            // tied votes go to the negative class
            ProblemKind::Classification => avg.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }),
            ProblemKind::Regression => avg,
        })
    }

    fn kind(&self) -> ProblemKind {
        self.kind
    }

    fn name(&self) -> &str {
        "kNN"
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
        self.neighbour_average(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn majority_vote_on_two_clusters() {
        let x = array![[0.0, 0.0], [0.1, 0.1], [0.2, 0.0], [5.0, 5.0], [5.1, 4.9], [4.9, 5.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        for algorithm in [KnnAlgorithm::Auto, KnnAlgorithm::BallTree, KnnAlgorithm::KdTree, KnnAlgorithm::Brute] {
            let mut knn = KNearestNeighbors::new(
                KnnParams {
                    n_neighbors: 3,
                    algorithm,
                    ..KnnParams::default()
                },
                ProblemKind::Classification,
            );
            knn.fit(&x, &y).unwrap();
            assert_eq!(knn.predict(&x).unwrap(), y, "{}", algorithm);
        }
    }

    #[test]
    fn distance_weighting_returns_exact_matches() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![10.0, 20.0, 30.0];
        let mut knn = KNearestNeighbors::new(
            KnnParams {
                n_neighbors: 3,
                weights: KnnWeights::Distance,
                ..KnnParams::default()
            },
            ProblemKind::Regression,
        );
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&x).unwrap(), y);
    }

    #[test]
    fn neighbour_count_is_clamped_to_the_training_set() {
        let x = array![[0.0], [1.0]];
        let y = array![1.0, 3.0];
        let mut knn = KNearestNeighbors::new(
            KnnParams {
                n_neighbors: 10,
                ..KnnParams::default()
            },
            ProblemKind::Regression,
        );
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.5]]).unwrap(), array![2.0]);
    }

    #[test]
    fn tied_votes_go_to_the_negative_class() {
        let x = array![[0.0], [2.0]];
        let y = array![0.0, 1.0];
        let mut knn = KNearestNeighbors::new(
            KnnParams {
                n_neighbors: 2,
                algorithm: KnnAlgorithm::Brute,
                ..KnnParams::default()
            },
            ProblemKind::Classification,
        );
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict_proba(&array![[1.0]]).unwrap(), array![0.5]);
        assert_eq!(knn.predict(&array![[1.0]]).unwrap(), array![0.0]);
    }
}
