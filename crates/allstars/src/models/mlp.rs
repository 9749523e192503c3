//! Fully connected perceptron trained with AdamW on candle.

use std::fmt;
use std::str::FromStr;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{AdamW, Linear, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data_handling::ProblemKind;
use crate::error::{AllstarsError, Result};
use crate::models::estimator::{check_fit_input, check_width, threshold, Estimator};
use crate::timeout;

/// Map candle failures into estimator errors.
trait CandleResultExt<T> {
    fn nn(self) -> Result<T>;
}

impl<T> CandleResultExt<T> for candle_core::Result<T> {
    fn nn(self) -> Result<T> {
        self.map_err(AllstarsError::estimator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Identity,
    Logistic,
    Tanh,
    Relu,
}

impl Activation {
    fn apply(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Identity => Ok(xs.clone()),
            Activation::Logistic => candle_nn::ops::sigmoid(xs),
            Activation::Tanh => xs.tanh(),
            Activation::Relu => xs.relu(),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Activation::Identity => "identity",
            Activation::Logistic => "logistic",
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
        })
    }
}

impl FromStr for Activation {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" => Ok(Activation::Identity),
            "logistic" => Ok(Activation::Logistic),
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::Relu),
            other => Err(AllstarsError::invalid("mlp_activation", format!("unknown activation '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningRateSchedule {
    Constant,
    /// lr = init / sqrt(step + 1)
    InvScaling,
    /// Divide by 5 whenever the loss stalls for two epochs
    Adaptive,
}

impl fmt::Display for LearningRateSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LearningRateSchedule::Constant => "constant",
            LearningRateSchedule::InvScaling => "invscaling",
            LearningRateSchedule::Adaptive => "adaptive",
        })
    }
}

impl FromStr for LearningRateSchedule {
    type Err = AllstarsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "constant" => Ok(LearningRateSchedule::Constant),
            "invscaling" => Ok(LearningRateSchedule::InvScaling),
            "adaptive" => Ok(LearningRateSchedule::Adaptive),
            other => Err(AllstarsError::invalid(
                "mlp_learning_rate",
                format!("unknown schedule '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    /// Hidden layer widths, input side first
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: LearningRateSchedule,
    pub learning_rate_init: f64,
    /// L2 penalty, applied as AdamW weight decay
    pub alpha: f64,
    pub batch_size: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub n_iter_no_change: usize,
    pub early_stopping: bool,
    pub validation_fraction: f64,
    pub warm_start: bool,
    pub seed: Option<u64>,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100],
            activation: Activation::Relu,
            learning_rate: LearningRateSchedule::Constant,
            learning_rate_init: 1e-3,
            alpha: 1e-4,
            batch_size: 200,
            max_iter: 200,
            tol: 1e-4,
            n_iter_no_change: 10,
            early_stopping: false,
            validation_fraction: 0.1,
            warm_start: false,
            seed: None,
        }
    }
}

struct Network {
    // owns the trainable variables behind `layers`
    varmap: VarMap,
    layers: Vec<Linear>,
    activation: Activation,
    n_inputs: usize,
}

impl Network {
    fn build(n_inputs: usize, hidden: &[usize], activation: Activation, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut width = n_inputs;
        for (i, &out) in hidden.iter().chain(std::iter::once(&1)).enumerate() {
            layers.push(candle_nn::linear(width, out, vb.pp(format!("layer{}", i))).nn()?);
            width = out;
        }
        Ok(Self {
            varmap,
            layers,
            activation,
            n_inputs,
        })
    }

    fn matches(&self, n_inputs: usize, hidden: &[usize]) -> bool {
        self.n_inputs == n_inputs
            && self.layers.len() == hidden.len() + 1
            && self
                .layers
                .iter()
                .zip(hidden)
                .all(|(layer, &w)| layer.weight().dims().first() == Some(&w))
    }

    /// Raw output of the last layer, shape (n, 1).
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut out = xs.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            out = layer.forward(&out)?;
            if i < last {
                out = self.activation.apply(&out)?;
            }
        }
        Ok(out)
    }
}

/// Multi-layer perceptron with one output unit.
///
/// Classification trains on logits with binary cross-entropy; regression
/// minimises squared error. Training stops when the monitored loss (the
/// held-out loss under early stopping, else the training loss) fails to
/// improve by `tol` for `n_iter_no_change` epochs, or after `max_iter` epochs.
pub struct Mlp {
    params: MlpParams,
    kind: ProblemKind,
    device: Device,
    network: Option<Network>,
    n_epochs: usize,
}

impl Mlp {
    pub fn new(params: MlpParams, kind: ProblemKind) -> Self {
        Self {
            params,
            kind,
            device: Device::Cpu,
            network: None,
            n_epochs: 0,
        }
    }

    /// Epochs run by the last fit.
    pub fn n_epochs(&self) -> usize {
        self.n_epochs
    }

    fn to_tensor(&self, x: &Array2<f64>) -> Result<Tensor> {
        let data: Vec<f32> = x.iter().map(|&v| v as f32).collect();
        Tensor::from_vec(data, (x.nrows(), x.ncols()), &self.device).nn()
    }

    fn loss(&self, output: &Tensor, target: &Tensor) -> candle_core::Result<Tensor> {
        match self.kind {
            ProblemKind::Classification => candle_nn::loss::binary_cross_entropy_with_logit(output, target),
            ProblemKind::Regression => candle_nn::loss::mse(output, target),
        }
    }

    fn raw_output(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let network = self.network.as_ref().ok_or(AllstarsError::NotFitted)?;
        check_width(network.n_inputs, x)?;
        let xs = self.to_tensor(x)?;
        let out = network.forward(&xs).nn()?.squeeze(1).nn()?.to_vec1::<f32>().nn()?;
        Ok(out.into_iter().map(f64::from).collect())
    }

    fn train(&mut self, x: &Array2<f64>, y: &Array1<f64>, rng: &mut StdRng) -> Result<()> {
        let n = x.nrows();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let n_valid = if self.params.early_stopping && n >= 10 {
            ((n as f64 * self.params.validation_fraction).ceil() as usize).clamp(1, n - 1)
        } else {
            0
        };
        let (valid_rows, train_rows) = order.split_at(n_valid);

        let xs = self.to_tensor(x)?;
        let ys = Tensor::from_vec(y.iter().map(|&v| v as f32).collect::<Vec<_>>(), (n, 1), &self.device).nn()?;
        let select = |rows: &[usize]| -> Result<(Tensor, Tensor)> {
            let ids: Vec<u32> = rows.iter().map(|&r| r as u32).collect();
            let ids = Tensor::from_vec(ids, rows.len(), &self.device).nn()?;
            Ok((xs.index_select(&ids, 0).nn()?, ys.index_select(&ids, 0).nn()?))
        };
        let validation = if n_valid > 0 { Some(select(valid_rows)?) } else { None };

        let network = self.network.as_ref().ok_or(AllstarsError::NotFitted)?;
        let mut opt = AdamW::new(
            network.varmap.all_vars(),
            ParamsAdamW {
                lr: self.params.learning_rate_init,
                weight_decay: self.params.alpha,
                ..Default::default()
            },
        )
        .nn()?;

        let batch_size = self.params.batch_size.clamp(1, train_rows.len().max(1));
        let mut train_rows = train_rows.to_vec();
        let mut best = f64::INFINITY;
        let mut stalled = 0usize;
        let mut lr = self.params.learning_rate_init;
        let mut step = 0usize;
        let mut epochs = 0usize;

        for epoch in 0..self.params.max_iter {
            timeout::checkpoint()?;
            train_rows.shuffle(rng);
            let mut epoch_loss = 0.0;
            for batch in train_rows.chunks(batch_size) {
                let (bx, by) = select(batch)?;
                let loss = self.loss(&network.forward(&bx).nn()?, &by).nn()?;
                opt.backward_step(&loss).nn()?;
                epoch_loss += loss.to_scalar::<f32>().nn()? as f64 * batch.len() as f64;

                step += 1;
                if self.params.learning_rate == LearningRateSchedule::InvScaling {
                    opt.set_learning_rate(self.params.learning_rate_init / ((step + 1) as f64).sqrt());
                }
            }
            epoch_loss /= train_rows.len().max(1) as f64;
            epochs = epoch + 1;

            let monitored = match &validation {
                Some((vx, vy)) => self.loss(&network.forward(vx).nn()?, vy).nn()?.to_scalar::<f32>().nn()? as f64,
                None => epoch_loss,
            };
            if !monitored.is_finite() {
                return Err(AllstarsError::Estimator("MLP loss diverged".into()));
            }

            if monitored < best - self.params.tol {
                best = monitored;
                stalled = 0;
            } else {
                stalled += 1;
            }

            if self.params.learning_rate == LearningRateSchedule::Adaptive && stalled >= 2 {
                lr /= 5.0;
                opt.set_learning_rate(lr);
                stalled = 0;
                if lr < 1e-6 {
                    break;
                }
                continue;
            }
            if stalled >= self.params.n_iter_no_change {
                break;
            }
        }
        log::trace!("MLP finished after {} epochs (loss {:.6})", epochs, best);
        self.n_epochs = epochs;
        Ok(())
    }
}

impl Estimator for Mlp {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.params.hidden_layers.iter().any(|&w| w == 0) {
            return Err(AllstarsError::invalid("n_layers", "hidden layers need at least one unit"));
        }
        let reuse = self.params.warm_start
            && self
                .network
                .as_ref()
                .map_or(false, |net| net.matches(x.ncols(), &self.params.hidden_layers));
        if !reuse {
            self.network = Some(Network::build(
                x.ncols(),
                &self.params.hidden_layers,
                self.params.activation,
                &self.device,
            )?);
        }
        let mut rng = match self.params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::thread_rng().gen()),
        };
        self.train(x, y, &mut rng)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self.kind {
            ProblemKind::Classification => Ok(threshold(&self.predict_proba(x)?)),
            ProblemKind::Regression => self.raw_output(x),
        }
    }

    fn kind(&self) -> ProblemKind {
        self.kind
    }

    fn name(&self) -> &str {
        "MLP"
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
        Ok(self.raw_output(x)?.mapv(crate::models::estimator::sigmoid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(r, c)| {
            let base = if r % 2 == 0 { -1.0 } else { 1.0 };
            base + 0.05 * (r as f64 / n as f64) * if c == 0 { 1.0 } else { -1.0 }
        });
        let y = Array1::from_iter((0..n).map(|r| (r % 2) as f64));
        (x, y)
    }

    #[test]
    fn classifier_learns_a_separable_problem() {
        let (x, y) = separable(40);
        let mut mlp = Mlp::new(
            MlpParams {
                hidden_layers: vec![8],
                activation: Activation::Tanh,
                learning_rate_init: 1e-2,
                max_iter: 300,
                seed: Some(7),
                ..MlpParams::default()
            },
            ProblemKind::Classification,
        );
        mlp.fit(&x, &y).unwrap();
        assert!(mlp.score(&x, &y).unwrap() >= 0.95);
        assert!(mlp.n_epochs() > 0);
    }

    #[test]
    fn regressor_has_no_probabilities() {
        let (x, y) = separable(20);
        let mut mlp = Mlp::new(
            MlpParams {
                hidden_layers: vec![4, 4],
                max_iter: 5,
                early_stopping: true,
                seed: Some(1),
                ..MlpParams::default()
            },
            ProblemKind::Regression,
        );
        mlp.fit(&x, &y).unwrap();
        assert_eq!(mlp.predict(&x).unwrap().len(), 20);
        assert!(matches!(
            mlp.predict_proba(&x),
            Err(AllstarsError::CapabilityUnavailable { .. })
        ));
    }

    #[test]
    fn warm_start_keeps_a_compatible_network() {
        let (x, y) = separable(20);
        let mut mlp = Mlp::new(
            MlpParams {
                hidden_layers: vec![4],
                max_iter: 2,
                warm_start: true,
                seed: Some(3),
                ..MlpParams::default()
            },
            ProblemKind::Regression,
        );
        mlp.fit(&x, &y).unwrap();
        let before = mlp.predict(&x).unwrap();
        assert!(mlp.network.as_ref().unwrap().matches(2, &[4]));
        mlp.fit(&x, &y).unwrap();
        assert_ne!(before, mlp.predict(&x).unwrap());
    }

    #[test]
    fn activation_names_parse() {
        assert_eq!("logistic".parse::<Activation>().unwrap(), Activation::Logistic);
        assert!("softmax".parse::<Activation>().is_err());
    }
}
