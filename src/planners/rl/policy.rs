//! Actor-critic network using the Burn framework
//!
//! The PPO update loop is written against [`DifferentiableModel`], not against
//! [`ActorCritic`] directly, so any Burn module exposing logits and a value
//! head can be trained by it.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleVisitor, Param, ParamId};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::{log_softmax, softmax, tanh};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, TensorData};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::action_space::{ACTION_COUNT, ActionSpace};
use crate::error::Result as AgentResult;

/// Configuration for the actor-critic network
#[derive(Debug, Config)]
pub struct ActorCriticConfig {
    /// Length of the input feature vector (fixed for the network's lifetime)
    pub feature_count: usize,
    /// Width of the first trunk layer; the second is half as wide
    #[config(default = 128)]
    pub hidden_size: usize,
    /// Number of policy outputs
    #[config(default = "ACTION_COUNT")]
    pub action_count: usize,
    /// Orthogonal gain for trunk layers
    #[config(default = "std::f64::consts::SQRT_2")]
    pub hidden_gain: f64,
    /// Orthogonal gain for the policy head (small keeps the initial policy near uniform)
    #[config(default = 0.01)]
    pub policy_gain: f64,
    /// Orthogonal gain for the value head
    #[config(default = 1.0)]
    pub value_gain: f64,
}

impl ActorCriticConfig {
    /// Build a network with seeded orthogonal weights and zero biases.
    ///
    /// Fails if the policy head would not match the static action table.
    pub fn init<B: Backend>(&self, device: &B::Device, seed: u64) -> AgentResult<ActorCritic<B>> {
        ActionSpace::ensure_output_units(self.action_count)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let half = (self.hidden_size / 2).max(1);

        Ok(ActorCritic {
            input: orthogonal_linear(
                self.feature_count,
                self.hidden_size,
                self.hidden_gain,
                &mut rng,
                device,
            ),
            input_norm: LayerNormConfig::new(self.hidden_size).init(device),
            hidden: orthogonal_linear(self.hidden_size, half, self.hidden_gain, &mut rng, device),
            hidden_norm: LayerNormConfig::new(half).init(device),
            actor: orthogonal_linear(half, self.action_count, self.policy_gain, &mut rng, device),
            critic: orthogonal_linear(half, 1, self.value_gain, &mut rng, device),
        })
    }

    /// (features, hidden, actions) - everything that fixes parameter shapes
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.feature_count, self.hidden_size, self.action_count)
    }
}

/// Shared-trunk actor-critic network.
///
/// `Linear -> LayerNorm -> tanh -> Linear -> LayerNorm -> tanh`, then a
/// linear policy head (logits) and a linear value head.
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    input: Linear<B>,
    input_norm: LayerNorm<B>,
    hidden: Linear<B>,
    hidden_norm: LayerNorm<B>,
    actor: Linear<B>,
    critic: Linear<B>,
}

impl<B: Backend> ActorCritic<B> {
    fn features(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = tanh(self.input_norm.forward(self.input.forward(states)));
        tanh(self.hidden_norm.forward(self.hidden.forward(x)))
    }
}

impl<B: Backend> PolicyNetwork<B> for ActorCritic<B> {
    fn logits_and_value(&self, states: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let features = self.features(states);
        let logits = self.actor.forward(features.clone());
        let value = self.critic.forward(features).squeeze(1);
        (logits, value)
    }
}

/// Output of [`PolicyNetwork::evaluate`] for a batch of (state, action) pairs
#[derive(Debug, Clone)]
pub struct Evaluation<B: Backend> {
    pub log_probs: Tensor<B, 1>,
    pub values: Tensor<B, 1>,
    pub entropy: Tensor<B, 1>,
}

/// Result of sampling one action
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionSample {
    pub action: usize,
    pub log_prob: f32,
    pub value: f32,
}

/// Categorical policy with a value head
pub trait PolicyNetwork<B: Backend>: Module<B> {
    /// Raw action logits `[batch, actions]` and state values `[batch]`
    fn logits_and_value(&self, states: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 1>);

    /// Action probabilities (softmax over logits) and state values
    fn forward(&self, states: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let (logits, values) = self.logits_and_value(states);
        (softmax(logits, 1), values)
    }

    /// Log-probabilities of `actions`, values and per-sample entropy.
    /// Builds the autodiff graph on autodiff backends but never touches parameters.
    fn evaluate(&self, states: Tensor<B, 2>, actions: Tensor<B, 1, Int>) -> Evaluation<B> {
        let (logits, values) = self.logits_and_value(states);
        let all_log_probs = log_softmax(logits, 1);
        let probs = all_log_probs.clone().exp();

        let batch_size = actions.dims()[0];
        let log_probs = all_log_probs
            .clone()
            .gather(1, actions.reshape([batch_size, 1]))
            .squeeze(1);
        let entropy = -(probs * all_log_probs).sum_dim(1).squeeze(1);

        Evaluation {
            log_probs,
            values,
            entropy,
        }
    }

    /// Sample an action for a single state `[1, features]`
    fn sample<R: Rng>(&self, state: Tensor<B, 2>, rng: &mut R) -> ActionSample {
        let (logits, value) = self.logits_and_value(state);
        let log_probs = to_floats(log_softmax(logits, 1));
        let value = value.into_scalar().elem::<f32>();

        let action = sample_categorical(&log_probs, rng);
        ActionSample {
            action,
            log_prob: log_probs[action],
            value,
        }
    }

    /// Stochastic action and its log-probability
    fn act<R: Rng>(&self, state: Tensor<B, 2>, rng: &mut R) -> (usize, f32) {
        let sample = self.sample(state, rng);
        (sample.action, sample.log_prob)
    }

    /// Most probable action
    fn act_greedy(&self, state: Tensor<B, 2>) -> usize {
        let (probs, _) = self.forward(state);
        argmax(&to_floats(probs))
    }
}

/// A policy network that can be trained: exposes the gradient step used by PPO
pub trait DifferentiableModel<B: AutodiffBackend>: PolicyNetwork<B> + AutodiffModule<B> {
    /// Backpropagate `loss`, clip the global gradient norm to `max_grad_norm`
    /// and apply one optimizer step. Returns the updated model and the
    /// gradient norm before clipping.
    fn apply_gradients<O: Optimizer<Self, B>>(
        self,
        optimizer: &mut O,
        loss: Tensor<B, 1>,
        learning_rate: f64,
        max_grad_norm: f64,
    ) -> (Self, f64) {
        let grads = loss.backward();
        let mut grads = GradientsParams::from_grads(grads, &self);
        let norm = clip_grad_norm(&self, &mut grads, max_grad_norm);
        (optimizer.step(learning_rate, self, grads), norm)
    }
}

impl<B, M> DifferentiableModel<B> for M
where
    B: AutodiffBackend,
    M: PolicyNetwork<B> + AutodiffModule<B>,
{
}

/// Scale all gradients so that their joint L2 norm is at most `max_norm`
pub fn clip_grad_norm<B, M>(model: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut norm_visitor = GradNormVisitor::<B> {
        grads,
        sum_sq: 0.0,
        _backend: PhantomData,
    };
    model.visit(&mut norm_visitor);
    let total_norm = norm_visitor.sum_sq.sqrt();

    if total_norm > max_norm {
        let mut scale_visitor = GradScaleVisitor::<B> {
            grads,
            scale: max_norm / (total_norm + 1e-6),
            _backend: PhantomData,
        };
        model.visit(&mut scale_visitor);
    }

    total_norm
}

struct GradNormVisitor<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum_sq: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct GradScaleVisitor<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScaleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
        }
    }
}

/// Single-row state tensor from a feature slice
pub fn state_tensor<B: Backend>(state: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 1>::from_floats(state, device).reshape([1, state.len()])
}

/// Flatten any tensor into host floats
pub fn to_floats<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

fn sample_categorical<R: Rng>(log_probs: &[f32], rng: &mut R) -> usize {
    let threshold: f32 = rng.random();
    let mut cumsum = 0.0;
    let mut last_possible = 0;

    for (idx, log_prob) in log_probs.iter().enumerate() {
        let prob = log_prob.exp();
        if prob > 0.0 {
            last_possible = idx;
        }
        cumsum += prob;
        if threshold < cumsum {
            return idx;
        }
    }

    // Rounding left the cumulative mass just under the threshold
    last_possible
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (idx, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = idx;
        }
    }
    best
}

fn orthogonal_linear<B: Backend, R: Rng>(
    d_input: usize,
    d_output: usize,
    gain: f64,
    rng: &mut R,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output).init(device);
    let weights = orthogonal(d_input, d_output, gain, rng);
    linear.weight = Param::from_tensor(Tensor::from_data(
        TensorData::new(weights, [d_input, d_output]),
        device,
    ));
    linear.bias = Some(Param::from_tensor(Tensor::zeros([d_output], device)));
    linear
}

/// Row-major `[rows, cols]` matrix with orthonormal rows or columns
/// (whichever dimension is smaller), scaled by `gain`.
///
/// Gram-Schmidt over a Gaussian matrix, equivalent to taking Q from a QR
/// decomposition with a positive diagonal in R.
pub fn orthogonal<R: Rng>(rows: usize, cols: usize, gain: f64, rng: &mut R) -> Vec<f32> {
    let tall = rows.max(cols);
    let narrow = rows.min(cols);

    // Columns of a [tall, narrow] matrix, stored column by column
    let mut columns: Vec<Vec<f64>> = (0..narrow)
        .map(|_| (0..tall).map(|_| standard_normal(rng)).collect())
        .collect();

    for k in 0..narrow {
        for j in 0..k {
            let projection: f64 = (0..tall).map(|i| columns[k][i] * columns[j][i]).sum();
            for i in 0..tall {
                columns[k][i] -= projection * columns[j][i];
            }
        }
        let norm = columns[k].iter().map(|v| v * v).sum::<f64>().sqrt().max(1e-12);
        for value in columns[k].iter_mut() {
            *value /= norm;
        }
    }

    let mut matrix = vec![0.0f32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            let value = if rows >= cols {
                columns[c][r]
            } else {
                columns[r][c]
            };
            matrix[r * cols + c] = (value * gain) as f32;
        }
    }
    matrix
}

fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // Box-Muller; 1 - u keeps the logarithm finite
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
