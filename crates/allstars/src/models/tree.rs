//! Weighted CART trees used by the forest, extra-trees and boosting families.
//!
//! Classification trees expect 0/1 targets and store the weighted fraction of
//! positives in each leaf. Regression trees store the weighted mean (squared
//! error) or weighted median (absolute error).

use std::str::FromStr;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::timeout::CancelToken;

/// Split quality measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    Gini,
    Mse,
    Mae,
}

impl FromStr for Criterion {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gini" => Ok(Criterion::Gini),
            "mse" => Ok(Criterion::Mse),
            "mae" => Ok(Criterion::Mae),
            other => Err(AllstarsError::invalid("criterion", format!("unknown criterion '{}'", other))),
        }
    }
}

/// Number of features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// sqrt for classification, every feature for regression
    Auto,
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize, kind: ProblemKind) -> usize {
        let n = n_features as f64;
        let k = match (self, kind) {
            (MaxFeatures::All, _) | (MaxFeatures::Auto, ProblemKind::Regression) => n_features,
            (MaxFeatures::Sqrt, _) | (MaxFeatures::Auto, ProblemKind::Classification) => n.sqrt() as usize,
            (MaxFeatures::Log2, _) => n.log2() as usize,
        };
        k.clamp(1, n_features.max(1))
    }
}

impl FromStr for MaxFeatures {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(MaxFeatures::Auto),
            "sqrt" => Ok(MaxFeatures::Sqrt),
            "log2" => Ok(MaxFeatures::Log2),
            other => Err(AllstarsError::invalid("max_features", format!("unknown setting '{}'", other))),
        }
    }
}

/// Exhaustive best threshold, or one random threshold per feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Splitter {
    Best,
    Random,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub splitter: Splitter,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth: None,
            max_features: MaxFeatures::All,
            splitter: Splitter::Best,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Absolute-error splits are evaluated at this many evenly spaced positions.
const MAE_CANDIDATES: usize = 16;
const MIN_IMPURITY: f64 = 1e-12;

struct NodeData<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    w: &'a [f64],
}

/// Weight, weight-scaled impurity and leaf value of a set of rows.
#[derive(Debug, Clone, Copy)]
struct NodeStats {
    weight: f64,
    impurity: f64,
    value: f64,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    children_impurity: f64,
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    params: TreeParams,
    kind: ProblemKind,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(params: TreeParams, kind: ProblemKind) -> Self {
        Self {
            params,
            kind,
            nodes: Vec::new(),
            importances: Vec::new(),
        }
    }

    /// Grow the tree on the rows with positive weight.
    pub fn fit<'a, R: Rng>(
        &mut self,
        x: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        weights: &'a [f64],
        rng: &mut R,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.nodes.clear();
        self.importances = vec![0.0; x.ncols()];
        let data = NodeData { x, y, w: weights };
        let rows: Vec<usize> = (0..x.nrows()).filter(|&i| weights[i] > 0.0).collect();
        self.build(&data, rows, 0, rng, cancel)?;
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[feature] <= threshold { left } else { right },
            }
        }
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Unnormalized total impurity decrease per feature.
    pub fn impurity_decrease(&self) -> &[f64] {
        &self.importances
    }

    fn build<R: Rng>(
        &mut self,
        data: &NodeData,
        rows: Vec<usize>,
        depth: usize,
        rng: &mut R,
        cancel: &CancelToken,
    ) -> Result<usize> {
        cancel.check()?;
        let stats = self.stats(data, &rows);
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: stats.value });

        let splittable = rows.len() >= self.params.min_samples_split.max(2)
            && self.params.max_depth.map_or(true, |d| depth < d)
            && stats.impurity > MIN_IMPURITY * stats.weight.max(1.0);
        if !splittable {
            return Ok(idx);
        }

        let candidate = match self.params.splitter {
            Splitter::Best => self.best_split(data, &rows, rng),
            Splitter::Random => self.random_split(data, &rows, rng),
        };
        let Some(split) = candidate else {
            return Ok(idx);
        };
        if split.children_impurity >= stats.impurity {
            return Ok(idx);
        }

        self.importances[split.feature] += stats.impurity - split.children_impurity;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| data.x[[r, split.feature]] <= split.threshold);

        let left = self.build(data, left_rows, depth + 1, rng, cancel)?;
        let right = self.build(data, right_rows, depth + 1, rng, cancel)?;
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        Ok(idx)
    }

    fn candidate_features<R: Rng>(&self, n_features: usize, rng: &mut R) -> Vec<usize> {
        let k = self.params.max_features.resolve(n_features, self.kind);
        if k >= n_features {
            (0..n_features).collect()
        } else {
            sample(rng, n_features, k).into_vec()
        }
    }

    fn stats(&self, data: &NodeData, rows: &[usize]) -> NodeStats {
        let weight: f64 = rows.iter().map(|&r| data.w[r]).sum();
        if weight <= 0.0 {
            return NodeStats {
                weight: 0.0,
                impurity: 0.0,
                value: 0.0,
            };
        }
        match self.params.criterion {
            Criterion::Gini => {
                let pos: f64 = rows.iter().map(|&r| data.w[r] * data.y[r]).sum();
                NodeStats {
                    weight,
                    impurity: 2.0 * pos * (weight - pos) / weight,
                    value: pos / weight,
                }
            }
            Criterion::Mse => {
                let (s, s2) = rows.iter().fold((0.0, 0.0), |(s, s2), &r| {
                    let (w, y) = (data.w[r], data.y[r]);
                    (s + w * y, s2 + w * y * y)
                });
                NodeStats {
                    weight,
                    impurity: (s2 - s * s / weight).max(0.0),
                    value: s / weight,
                }
            }
            Criterion::Mae => {
                let mut pairs: Vec<(f64, f64)> = rows.iter().map(|&r| (data.y[r], data.w[r])).collect();
                let median = weighted_median(&mut pairs);
                NodeStats {
                    weight,
                    impurity: pairs.iter().map(|(y, w)| w * (y - median).abs()).sum(),
                    value: median,
                }
            }
        }
    }

    fn counts_ok(&self, n_left: usize, n_right: usize) -> bool {
        n_left >= self.params.min_samples_leaf.max(1) && n_right >= self.params.min_samples_leaf.max(1)
    }

    fn best_split<R: Rng>(&self, data: &NodeData, rows: &[usize], rng: &mut R) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        for feature in self.candidate_features(data.x.ncols(), rng) {
            let mut sorted = rows.to_vec();
            sorted.sort_by(|&a, &b| data.x[[a, feature]].total_cmp(&data.x[[b, feature]]));
            let value_at = |i: usize| data.x[[sorted[i], feature]];

            let positions: Vec<usize> = (0..sorted.len() - 1)
                .filter(|&i| value_at(i) < value_at(i + 1) && self.counts_ok(i + 1, sorted.len() - i - 1))
                .collect();
            if positions.is_empty() {
                continue;
            }

            let scored: Vec<(usize, f64)> = match self.params.criterion {
                Criterion::Gini | Criterion::Mse => self.sweep(data, &sorted, &positions),
                Criterion::Mae => {
                    let step = (positions.len() as f64 / MAE_CANDIDATES as f64).max(1.0);
                    (0..positions.len().min(MAE_CANDIDATES))
                        .map(|j| positions[(j as f64 * step) as usize])
                        .map(|i| {
                            let total = self.stats(data, &sorted[..=i]).impurity
                                + self.stats(data, &sorted[i + 1..]).impurity;
                            (i, total)
                        })
                        .collect()
                }
            };

            for (i, total) in scored {
                if best.as_ref().map_or(true, |b| total < b.children_impurity) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (value_at(i) + value_at(i + 1)) / 2.0,
                        children_impurity: total,
                    });
                }
            }
        }
        best
    }

    /// Running-sum evaluation of every split position for Gini and squared error.
    fn sweep(&self, data: &NodeData, sorted: &[usize], positions: &[usize]) -> Vec<(usize, f64)> {
        let total_w: f64 = sorted.iter().map(|&r| data.w[r]).sum();
        let total_s: f64 = sorted.iter().map(|&r| data.w[r] * data.y[r]).sum();
        let total_s2: f64 = sorted.iter().map(|&r| data.w[r] * data.y[r] * data.y[r]).sum();

        let impurity = |w: f64, s: f64, s2: f64| -> f64 {
            if w <= 0.0 {
                return 0.0;
            }
            match self.params.criterion {
                Criterion::Gini => 2.0 * s * (w - s) / w,
                _ => (s2 - s * s / w).max(0.0),
            }
        };

        let mut out = Vec::with_capacity(positions.len());
        let (mut w, mut s, mut s2) = (0.0, 0.0, 0.0);
        let mut next = positions.iter().peekable();
        for (i, &r) in sorted.iter().enumerate() {
            let (wr, yr) = (data.w[r], data.y[r]);
            w += wr;
            s += wr * yr;
            s2 += wr * yr * yr;
            if next.peek() == Some(&&i) {
                next.next();
                let total = impurity(w, s, s2) + impurity(total_w - w, total_s - s, total_s2 - s2);
                out.push((i, total));
            }
        }
        out
    }

    fn random_split<R: Rng>(&self, data: &NodeData, rows: &[usize], rng: &mut R) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        for feature in self.candidate_features(data.x.ncols(), rng) {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                let v = data.x[[r, feature]];
                (lo.min(v), hi.max(v))
            });
            if !(hi > lo) {
                continue;
            }
            let threshold = rng.gen_range(lo..hi);
            let (left, right): (Vec<usize>, Vec<usize>) =
                rows.iter().copied().partition(|&r| data.x[[r, feature]] <= threshold);
            if !self.counts_ok(left.len(), right.len()) {
                continue;
            }
            let total = self.stats(data, &left).impurity + self.stats(data, &right).impurity;
            if best.as_ref().map_or(true, |b| total < b.children_impurity) {
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    children_impurity: total,
                });
            }
        }
        best
    }
}

/// Weighted median of `(value, weight)` pairs; sorts `pairs` in place.
pub(crate) fn weighted_median(pairs: &mut [(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = pairs.iter().map(|p| p.1).sum::<f64>() / 2.0;
    let mut acc = 0.0;
    for &(value, weight) in pairs.iter() {
        acc += weight;
        if acc >= half {
            return value;
        }
    }
    pairs[pairs.len() - 1].0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fit_tree(params: TreeParams, kind: ProblemKind, x: &Array2<f64>, y: &Array1<f64>) -> DecisionTree {
        let mut tree = DecisionTree::new(params, kind);
        let w = vec![1.0; y.len()];
        let mut rng = StdRng::seed_from_u64(3);
        tree.fit(x.view(), y.view(), &w, &mut rng, &CancelToken::new()).unwrap();
        tree
    }

    #[test]
    fn separable_classes_are_learned_exactly() {
        let x = array![[0.0, 5.0], [1.0, 3.0], [2.0, 4.0], [10.0, 3.5], [11.0, 5.5], [12.0, 4.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let tree = fit_tree(TreeParams::default(), ProblemKind::Classification, &x, &y);
        assert_eq!(tree.predict(x.view()), y);
        assert_eq!(tree.depth(), 1);
        // only the first column separates the classes
        assert!(tree.impurity_decrease()[0] > 0.0);
        assert_eq!(tree.impurity_decrease()[1], 0.0);
    }

    #[test]
    fn max_depth_limits_growth() {
        let x = Array2::from_shape_fn((32, 1), |(r, _)| r as f64);
        let y = Array1::from_iter((0..32).map(|r| (r as f64).sin()));
        let params = TreeParams {
            criterion: Criterion::Mse,
            max_depth: Some(2),
            ..TreeParams::default()
        };
        let tree = fit_tree(params, ProblemKind::Regression, &x, &y);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn absolute_error_leaves_hold_medians() {
        let x = array![[0.0], [0.0], [0.0]];
        let y = array![1.0, 2.0, 10.0];
        let params = TreeParams {
            criterion: Criterion::Mae,
            ..TreeParams::default()
        };
        let tree = fit_tree(params, ProblemKind::Regression, &x, &y);
        assert_eq!(tree.predict(array![[0.0]].view()), array![2.0]);
    }

    #[test]
    fn zero_weight_rows_are_ignored() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 5.0, 1.0];
        let mut tree = DecisionTree::new(
            TreeParams {
                criterion: Criterion::Mse,
                max_depth: Some(0),
                ..TreeParams::default()
            },
            ProblemKind::Regression,
        );
        let mut rng = StdRng::seed_from_u64(0);
        tree.fit(x.view(), y.view(), &[1.0, 0.0, 1.0], &mut rng, &CancelToken::new()).unwrap();
        assert_eq!(tree.predict_row(array![1.0].view()), 0.5);
    }

    #[test]
    fn cancelled_token_stops_growth() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let token = CancelToken::new();
        token.cancel();
        let mut tree = DecisionTree::new(TreeParams::default(), ProblemKind::Classification);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(tree.fit(x.view(), y.view(), &[1.0, 1.0], &mut rng, &token).is_err());
    }
}
