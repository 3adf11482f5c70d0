use ndarray::{Array1, Array2, ArrayView1, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TrainingError;

const BN_MOMENTUM: f64 = 0.99;
const BN_EPSILON: f64 = 1e-3;
const PROB_CLIP: f64 = 1e-7;
const PLATEAU_MIN_DELTA: f64 = 1e-4;

/// One hidden stage: Dense + ReLU, optionally followed by batch
/// normalization, then dropout while training
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSpec {
    pub units: usize,
    pub batch_norm: bool,
    pub dropout: f64,
}

/// Funnel of hidden stages between the 12 inputs and the softmax output
pub const HIDDEN_LAYERS: [LayerSpec; 4] = [
    LayerSpec { units: 128, batch_norm: true, dropout: 0.3 },
    LayerSpec { units: 64, batch_norm: true, dropout: 0.3 },
    LayerSpec { units: 32, batch_norm: true, dropout: 0.2 },
    LayerSpec { units: 16, batch_norm: false, dropout: 0.1 },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias
    fn glorot(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(outputs),
        }
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights) + &self.bias
    }

    fn param_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BatchNorm {
    gamma: Array1<f64>,
    beta: Array1<f64>,
    running_mean: Array1<f64>,
    running_var: Array1<f64>,
}

struct NormCache {
    normalized: Array2<f64>,
    inv_std: Array1<f64>,
}

impl BatchNorm {
    fn new(width: usize) -> Self {
        Self {
            gamma: Array1::ones(width),
            beta: Array1::zeros(width),
            running_mean: Array1::zeros(width),
            running_var: Array1::ones(width),
        }
    }

    fn width(&self) -> usize {
        self.gamma.len()
    }

    fn forward_train(&mut self, x: &Array2<f64>) -> (Array2<f64>, NormCache) {
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let var = x.var_axis(Axis(0), 0.0);
        let inv_std = var.mapv(|v| 1.0 / (v + BN_EPSILON).sqrt());
        let normalized = (x - &mean) * &inv_std;
        let out = &normalized * &self.gamma + &self.beta;

        self.running_mean = &self.running_mean * BN_MOMENTUM + &mean * (1.0 - BN_MOMENTUM);
        self.running_var = &self.running_var * BN_MOMENTUM + &var * (1.0 - BN_MOMENTUM);

        (out, NormCache { normalized, inv_std })
    }

    fn forward_infer(&self, x: &Array2<f64>) -> Array2<f64> {
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + BN_EPSILON).sqrt());
        (x - &self.running_mean) * &inv_std * &self.gamma + &self.beta
    }

    fn backward(&self, dout: &Array2<f64>, cache: &NormCache) -> (Array2<f64>, NormGrad) {
        let n = dout.nrows() as f64;
        let gamma = (dout * &cache.normalized).sum_axis(Axis(0));
        let beta = dout.sum_axis(Axis(0));

        let dxhat = dout * &self.gamma;
        let sum_dxhat = dxhat.sum_axis(Axis(0));
        let sum_dxhat_xhat = (&dxhat * &cache.normalized).sum_axis(Axis(0));
        let dx = (&dxhat * n - &sum_dxhat - &cache.normalized * &sum_dxhat_xhat) * &(&cache.inv_std / n);

        (dx, NormGrad { gamma, beta })
    }

    fn param_count(&self) -> usize {
        self.gamma.len() + self.beta.len() + self.running_mean.len() + self.running_var.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Stage {
    dense: Dense,
    norm: Option<BatchNorm>,
    dropout: f64,
}

struct StageCache {
    input: Array2<f64>,
    pre_activation: Array2<f64>,
    norm: Option<NormCache>,
    dropout_mask: Option<Array2<f64>>,
}

struct DenseGrad {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

struct NormGrad {
    gamma: Array1<f64>,
    beta: Array1<f64>,
}

struct StageGrad {
    dense: DenseGrad,
    norm: Option<NormGrad>,
}

struct NetGrad {
    stages: Vec<StageGrad>,
    output: DenseGrad,
}

impl NetGrad {
    /// Same order as [`MlpClassifier::params_mut`]
    fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut views = Vec::new();
        for stage in &self.stages {
            views.push(stage.dense.weights.view().into_dyn());
            views.push(stage.dense.bias.view().into_dyn());
            if let Some(norm) = &stage.norm {
                views.push(norm.gamma.view().into_dyn());
                views.push(norm.beta.view().into_dyn());
            }
        }
        views.push(self.output.weights.view().into_dyn());
        views.push(self.output.bias.view().into_dyn());
        views
    }
}

/// Adam with Keras defaults for the moment decay rates
struct Adam {
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl Adam {
    fn new() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: Vec<ArrayViewD<'_, f64>>, learning_rate: f64) {
        if self.m.is_empty() {
            self.m = params.iter().map(|p| vec![0.0; p.len()]).collect();
            self.v = params.iter().map(|p| vec![0.0; p.len()]).collect();
        }
        self.t += 1;
        let step = learning_rate * (1.0 - self.beta2.powi(self.t)).sqrt() / (1.0 - self.beta1.powi(self.t));
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        for (((mut param, grad), m), v) in params
            .into_iter()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            for (((p, g), mi), vi) in param.iter_mut().zip(grad.iter()).zip(m.iter_mut()).zip(v.iter_mut()) {
                *mi = b1 * *mi + (1.0 - b1) * g;
                *vi = b2 * *vi + (1.0 - b2) * g * g;
                *p -= step * *mi / (vi.sqrt() + eps);
            }
        }
    }
}

/// Hyper-parameters for [`MlpClassifier::fit`]
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub early_stopping_patience: usize,
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_learning_rate: f64,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            early_stopping_patience: 10,
            lr_patience: 5,
            lr_factor: 0.2,
            min_learning_rate: 0.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitHistory {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub final_train_loss: f64,
    pub final_train_accuracy: f64,
    pub final_val_loss: f64,
    pub final_val_accuracy: f64,
    pub final_learning_rate: f64,
}

/// Feed-forward softmax classifier over standardized feature rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    input_dim: usize,
    stages: Vec<Stage>,
    output: Dense,
}

impl MlpClassifier {
    pub fn new(input_dim: usize, classes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut width = input_dim;
        let mut stages = Vec::with_capacity(HIDDEN_LAYERS.len());
        for spec in HIDDEN_LAYERS {
            stages.push(Stage {
                dense: Dense::glorot(width, spec.units, &mut rng),
                norm: spec.batch_norm.then(|| BatchNorm::new(spec.units)),
                dropout: spec.dropout,
            });
            width = spec.units;
        }
        Self {
            input_dim,
            stages,
            output: Dense::glorot(width, classes, &mut rng),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output.bias.len()
    }

    /// Trainable plus running-statistic parameters
    pub fn param_count(&self) -> usize {
        let hidden: usize = self
            .stages
            .iter()
            .map(|s| s.dense.param_count() + s.norm.as_ref().map_or(0, BatchNorm::param_count))
            .sum();
        hidden + self.output.param_count()
    }

    /// Dense, normalization and dropout layers, plus the output layer
    pub fn layer_count(&self) -> usize {
        let hidden: usize = self
            .stages
            .iter()
            .map(|s| 1 + usize::from(s.norm.is_some()) + usize::from(s.dropout > 0.0))
            .sum();
        hidden + 1
    }

    /// Structural check used on reload
    pub fn validate(&self, input_dim: usize, classes: usize) -> Result<(), String> {
        if self.input_dim != input_dim {
            return Err(format!("input dimension {} (expected {})", self.input_dim, input_dim));
        }
        if self.stages.is_empty() {
            return Err("no hidden layers".to_string());
        }

        let mut width = input_dim;
        for (i, stage) in self.stages.iter().enumerate() {
            let (rows, cols) = stage.dense.weights.dim();
            if rows != width || stage.dense.bias.len() != cols {
                return Err(format!("hidden layer {} has shape {}x{} after width {}", i, rows, cols, width));
            }
            if let Some(norm) = &stage.norm {
                let widths = [norm.beta.len(), norm.running_mean.len(), norm.running_var.len()];
                if norm.width() != cols || widths.iter().any(|w| *w != cols) {
                    return Err(format!("normalization after layer {} does not match width {}", i, cols));
                }
                if norm.running_var.iter().any(|v| *v < 0.0) {
                    return Err(format!("negative running variance after layer {}", i));
                }
            }
            if !(0.0..1.0).contains(&stage.dropout) {
                return Err(format!("dropout {} out of range", stage.dropout));
            }
            width = cols;
        }

        let (rows, cols) = self.output.weights.dim();
        if rows != width || cols != classes || self.output.bias.len() != classes {
            return Err(format!("output layer has shape {}x{} (expected {}x{})", rows, cols, width, classes));
        }
        if !self.all_finite() {
            return Err("non-finite parameter".to_string());
        }
        Ok(())
    }

    fn all_finite(&self) -> bool {
        let dense_ok = |d: &Dense| d.weights.iter().chain(d.bias.iter()).all(|v| v.is_finite());
        self.stages.iter().all(|s| {
            dense_ok(&s.dense)
                && s.norm.as_ref().map_or(true, |n| {
                    n.gamma
                        .iter()
                        .chain(n.beta.iter())
                        .chain(n.running_mean.iter())
                        .chain(n.running_var.iter())
                        .all(|v| v.is_finite())
                })
        }) && dense_ok(&self.output)
    }

    /// Class probabilities per row, inference mode
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut h = x.to_owned();
        for stage in &self.stages {
            let mut z = stage.dense.forward(&h);
            z.mapv_inplace(relu);
            h = match &stage.norm {
                Some(norm) => norm.forward_infer(&z),
                None => z,
            };
        }
        softmax(&self.output.forward(&h))
    }

    /// Mean categorical cross-entropy against one-hot targets
    pub fn loss(&self, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        cross_entropy(&self.predict_proba(x), y)
    }

    pub fn accuracy(&self, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        accuracy(&self.predict_proba(x), y)
    }

    fn forward_train(&mut self, x: &Array2<f64>, rng: &mut StdRng) -> (Array2<f64>, Vec<StageCache>) {
        let mut caches = Vec::with_capacity(self.stages.len());
        let mut h = x.to_owned();

        for stage in &mut self.stages {
            let pre_activation = stage.dense.forward(&h);
            let activated = pre_activation.mapv(relu);
            let (normed, norm) = match &mut stage.norm {
                Some(bn) => {
                    let (out, cache) = bn.forward_train(&activated);
                    (out, Some(cache))
                }
                None => (activated, None),
            };

            let (out, dropout_mask) = if stage.dropout > 0.0 {
                let keep = 1.0 - stage.dropout;
                let mask = Array2::from_shape_fn(normed.raw_dim(), |_| {
                    if rng.gen::<f64>() < keep {
                        1.0 / keep
                    } else {
                        0.0
                    }
                });
                (&normed * &mask, Some(mask))
            } else {
                (normed, None)
            };

            caches.push(StageCache {
                input: h,
                pre_activation,
                norm,
                dropout_mask,
            });
            h = out;
        }

        let probs = softmax(&self.output.forward(&h));
        caches.push(StageCache {
            input: h,
            pre_activation: Array2::zeros((0, 0)),
            norm: None,
            dropout_mask: None,
        });
        (probs, caches)
    }

    fn backward(&self, probs: &Array2<f64>, y: &Array2<f64>, caches: &[StageCache]) -> NetGrad {
        let batch = probs.nrows().max(1) as f64;
        let dlogits = (probs - y) / batch;

        // last cache holds the output layer's input
        let head_input = &caches[self.stages.len()].input;
        let output = DenseGrad {
            weights: head_input.t().dot(&dlogits),
            bias: dlogits.sum_axis(Axis(0)),
        };
        let mut grad = dlogits.dot(&self.output.weights.t());

        let mut stages = Vec::with_capacity(self.stages.len());
        for (stage, cache) in self.stages.iter().zip(&caches[..self.stages.len()]).rev() {
            if let Some(mask) = &cache.dropout_mask {
                grad = grad * mask;
            }
            let (mut dz, norm) = match (&stage.norm, &cache.norm) {
                (Some(bn), Some(norm_cache)) => {
                    let (dx, ng) = bn.backward(&grad, norm_cache);
                    (dx, Some(ng))
                }
                _ => (grad, None),
            };
            dz.zip_mut_with(&cache.pre_activation, |g, &z| {
                if z <= 0.0 {
                    *g = 0.0;
                }
            });

            let dense = DenseGrad {
                weights: cache.input.t().dot(&dz),
                bias: dz.sum_axis(Axis(0)),
            };
            grad = dz.dot(&stage.dense.weights.t());
            stages.push(StageGrad { dense, norm });
        }
        stages.reverse();

        NetGrad { stages, output }
    }

    /// Same order as [`NetGrad::views`]
    fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut params = Vec::new();
        for stage in &mut self.stages {
            params.push(stage.dense.weights.view_mut().into_dyn());
            params.push(stage.dense.bias.view_mut().into_dyn());
            if let Some(norm) = &mut stage.norm {
                params.push(norm.gamma.view_mut().into_dyn());
                params.push(norm.beta.view_mut().into_dyn());
            }
        }
        params.push(self.output.weights.view_mut().into_dyn());
        params.push(self.output.bias.view_mut().into_dyn());
        params
    }

    /// Mini-batch Adam with early stopping on validation loss (best weights
    /// restored) and learning-rate reduction on plateau.
    /// An empty validation set falls back to monitoring training loss.
    pub fn fit(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array2<f64>,
        x_val: &Array2<f64>,
        y_val: &Array2<f64>,
        options: &FitOptions,
    ) -> Result<FitHistory, TrainingError> {
        if x_train.nrows() == 0 {
            return Err(TrainingError::Diverged("empty training partition".to_string()));
        }

        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut optimizer = Adam::new();
        let mut indices: Vec<usize> = (0..x_train.nrows()).collect();
        let batch_size = options.batch_size.max(1);
        let has_validation = x_val.nrows() > 0;

        let mut learning_rate = options.learning_rate;
        let mut best = (f64::INFINITY, 0usize, self.clone());
        let mut stale_epochs = 0;
        let mut plateau_best = f64::INFINITY;
        let mut plateau_wait = 0;
        let mut epochs_run = 0;
        let mut last = (0.0, 0.0, 0.0, 0.0);

        for epoch in 1..=options.epochs {
            indices.shuffle(&mut rng);
            for chunk in indices.chunks(batch_size) {
                let xb = x_train.select(Axis(0), chunk);
                let yb = y_train.select(Axis(0), chunk);
                let (probs, caches) = self.forward_train(&xb, &mut rng);
                let grads = self.backward(&probs, &yb, &caches);
                optimizer.step(self.params_mut(), grads.views(), learning_rate);
            }
            epochs_run = epoch;

            let train_probs = self.predict_proba(x_train);
            let train_loss = cross_entropy(&train_probs, y_train);
            let train_acc = accuracy(&train_probs, y_train);
            let (val_loss, val_acc) = if has_validation {
                let val_probs = self.predict_proba(x_val);
                (cross_entropy(&val_probs, y_val), accuracy(&val_probs, y_val))
            } else {
                (train_loss, train_acc)
            };

            if !train_loss.is_finite() || !val_loss.is_finite() {
                return Err(TrainingError::Diverged(format!("non-finite loss at epoch {}", epoch)));
            }
            last = (train_loss, train_acc, val_loss, val_acc);
            debug!(
                "Epoch {}/{}: loss={:.4} acc={:.3} val_loss={:.4} val_acc={:.3} lr={:.2e}",
                epoch, options.epochs, train_loss, train_acc, val_loss, val_acc, learning_rate
            );

            if val_loss < best.0 {
                best = (val_loss, epoch, self.clone());
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
            }

            if val_loss < plateau_best - PLATEAU_MIN_DELTA {
                plateau_best = val_loss;
                plateau_wait = 0;
            } else {
                plateau_wait += 1;
                if plateau_wait >= options.lr_patience {
                    let reduced = (learning_rate * options.lr_factor).max(options.min_learning_rate);
                    if reduced < learning_rate {
                        info!("Reducing learning rate to {:.2e} at epoch {}", reduced, epoch);
                        learning_rate = reduced;
                    }
                    plateau_wait = 0;
                }
            }

            if stale_epochs >= options.early_stopping_patience {
                info!("Early stopping at epoch {} (best epoch {})", epoch, best.1);
                break;
            }
        }

        let (best_val_loss, best_epoch, best_net) = best;
        if best_epoch > 0 {
            *self = best_net;
        }

        let (final_train_loss, final_train_accuracy, final_val_loss, final_val_accuracy) = last;
        Ok(FitHistory {
            epochs_run,
            best_epoch,
            best_val_loss,
            final_train_loss,
            final_train_accuracy,
            final_val_loss,
            final_val_accuracy,
            final_learning_rate: learning_rate,
        })
    }
}

fn relu(v: f64) -> f64 {
    v.max(0.0)
}

/// Row-wise softmax with max subtraction
pub fn softmax(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

pub fn argmax(row: ArrayView1<f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

pub fn cross_entropy(probs: &Array2<f64>, y: &Array2<f64>) -> f64 {
    let n = probs.nrows();
    if n == 0 {
        return 0.0;
    }
    let total: f64 = probs
        .iter()
        .zip(y.iter())
        .map(|(p, t)| -t * p.clamp(PROB_CLIP, 1.0 - PROB_CLIP).ln())
        .sum();
    total / n as f64
}

pub fn accuracy(probs: &Array2<f64>, y: &Array2<f64>) -> f64 {
    let n = probs.nrows();
    if n == 0 {
        return 0.0;
    }
    let correct = probs
        .rows()
        .into_iter()
        .zip(y.rows())
        .filter(|(p, t)| argmax(p.view()) == argmax(t.view()))
        .count();
    correct as f64 / n as f64
}

pub fn one_hot(classes: &[usize], width: usize) -> Array2<f64> {
    let mut y = Array2::zeros((classes.len(), width));
    for (row, &class) in classes.iter().enumerate() {
        if class < width {
            y[[row, class]] = 1.0;
        }
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Three well-separated clusters in 12 dimensions
    fn clusters(per_class: usize, seed: u64) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = per_class * 3;
        let mut x = Array2::zeros((n, 12));
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let class = i % 3;
            for j in 0..12 {
                x[[i, j]] = rng.gen_range(-0.5..0.5);
            }
            x[[i, class]] += 3.0;
            labels.push(class);
        }
        (x, labels)
    }

    #[test]
    fn test_architecture_shape() {
        let net = MlpClassifier::new(12, 3, 42);
        assert_eq!(net.input_dim(), 12);
        assert_eq!(net.output_dim(), 3);
        assert_eq!(net.param_count(), 13475);
        assert_eq!(net.layer_count(), 12);
        assert!(net.validate(12, 3).is_ok());
        assert!(net.validate(11, 3).is_err());
        assert!(net.validate(12, 2).is_err());
    }

    #[test]
    fn test_same_seed_same_weights() {
        assert_eq!(MlpClassifier::new(12, 3, 7), MlpClassifier::new(12, 3, 7));
        assert_ne!(MlpClassifier::new(12, 3, 7), MlpClassifier::new(12, 3, 8));
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let net = MlpClassifier::new(12, 3, 1);
        let (x, _) = clusters(5, 3);
        let probs = net.predict_proba(&x);
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|p| *p >= 0.0));
        }
    }

    #[test]
    fn test_softmax_and_loss_helpers() {
        let p = softmax(&array![[0.0, 0.0], [1000.0, 0.0]]);
        assert!((p[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((p[[1, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(argmax(p.row(1)), 0);

        let y = one_hot(&[0, 0], 2);
        let loss = cross_entropy(&p, &y);
        assert!((loss - (0.5f64.ln() * -0.5 + (1.0 - PROB_CLIP).ln() * -0.5)).abs() < 1e-9);
        assert_eq!(accuracy(&p, &y), 1.0);
    }

    #[test]
    fn test_fit_learns_separable_clusters() {
        let (x, labels) = clusters(60, 11);
        let (xv, val_labels) = clusters(15, 12);
        let y = one_hot(&labels, 3);
        let yv = one_hot(&val_labels, 3);

        let mut net = MlpClassifier::new(12, 3, 42);
        let before = net.loss(&xv, &yv);
        let options = FitOptions {
            epochs: 30,
            ..FitOptions::default()
        };
        let history = net.fit(&x, &y, &xv, &yv, &options).unwrap();

        assert!(history.epochs_run >= 1 && history.epochs_run <= 30);
        assert!(history.best_epoch >= 1);
        assert!(net.loss(&xv, &yv) < before);
        assert!(net.accuracy(&xv, &yv) > 0.8);
        assert!(net.validate(12, 3).is_ok());
    }

    #[test]
    fn test_fit_is_reproducible() {
        let (x, labels) = clusters(20, 5);
        let y = one_hot(&labels, 3);
        let options = FitOptions {
            epochs: 3,
            ..FitOptions::default()
        };

        let mut a = MlpClassifier::new(12, 3, 42);
        let mut b = MlpClassifier::new(12, 3, 42);
        a.fit(&x, &y, &x, &y, &options).unwrap();
        b.fit(&x, &y, &x, &y, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_preserves_predictions() {
        let (x, labels) = clusters(10, 9);
        let y = one_hot(&labels, 3);
        let mut net = MlpClassifier::new(12, 3, 42);
        net.fit(&x, &y, &x, &y, &FitOptions { epochs: 2, ..FitOptions::default() }).unwrap();

        let json = serde_json::to_string(&net).unwrap();
        let restored: MlpClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.predict_proba(&x), net.predict_proba(&x));
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        let mut net = MlpClassifier::new(12, 3, 42);
        let empty = Array2::<f64>::zeros((0, 12));
        let y = Array2::<f64>::zeros((0, 3));
        assert!(net.fit(&empty, &y, &empty, &y, &FitOptions::default()).is_err());
    }
}
