//! PPO update loop: clipped surrogate over shuffled mini-batches

use std::marker::PhantomData;

use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use rand::Rng;
use rand::seq::SliceRandom;

use super::buffer::{RolloutBatch, RolloutBuffer};
use super::gae::compute_normalized;
use super::policy::DifferentiableModel;
use crate::error::{AgentError, Result as AgentResult};

/// PPO hyperparameters
#[derive(Debug, Config)]
pub struct PpoConfig {
    /// Discount factor
    #[config(default = 0.99)]
    pub gamma: f32,
    /// GAE smoothing
    #[config(default = 0.95)]
    pub gae_lambda: f32,
    /// Ratio clip range
    #[config(default = 0.2)]
    pub clip_epsilon: f32,
    /// Weight of the critic loss (c1)
    #[config(default = 0.5)]
    pub value_coef: f32,
    /// Weight of the entropy bonus (c2)
    #[config(default = 0.01)]
    pub entropy_coef: f32,
    /// Multiplier on the critic MSE (0.5 gives the halved variant)
    #[config(default = 1.0)]
    pub value_loss_scale: f32,
    #[config(default = 3e-4)]
    pub learning_rate: f64,
    /// Multiplicative learning rate decay applied once per update
    #[config(default = 0.995)]
    pub lr_decay: f64,
    #[config(default = 1e-5)]
    pub min_learning_rate: f64,
    #[config(default = 4)]
    pub epochs: usize,
    #[config(default = 64)]
    pub mini_batch_size: usize,
    /// Rollout buffer capacity
    #[config(default = 2048)]
    pub buffer_size: usize,
    /// Bound on the global gradient norm
    #[config(default = 0.5)]
    pub max_grad_norm: f64,
    /// Stop the remaining epochs once the mean approximate KL exceeds this
    #[config(default = "Some(0.02)")]
    pub target_kl: Option<f32>,
}

/// Exponential learning rate decay with a floor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRateDecay {
    current: f64,
    decay: f64,
    min: f64,
}

impl LearningRateDecay {
    pub fn new(initial: f64, decay: f64, min: f64) -> Self {
        Self {
            current: initial.max(min),
            decay,
            min,
        }
    }

    pub fn from_config(config: &PpoConfig) -> Self {
        Self::new(
            config.learning_rate,
            config.lr_decay,
            config.min_learning_rate,
        )
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Advance one step and return the new rate
    pub fn step(&mut self) -> f64 {
        self.current = (self.current * self.decay).max(self.min);
        self.current
    }

    /// Restore a saved rate
    pub fn restore(&mut self, learning_rate: f64) {
        self.current = learning_rate.max(self.min);
    }
}

/// Summary of one PPO update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateStats {
    /// Index of this update (1-based, monotonic across the agent's life)
    pub update: usize,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    /// Mean approximate KL of the last epoch run
    pub approx_kl: f32,
    pub epochs_run: usize,
    pub early_stopped: bool,
    pub mean_grad_norm: f32,
    /// Learning rate after the decay step
    pub learning_rate: f64,
    pub transitions: usize,
}

/// Shuffled mini-batches covering `0..len` exactly once
pub fn minibatch_indices<R: Rng>(len: usize, batch_size: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    indices
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// `-mean(min(r * A, clip(r, 1 - eps, 1 + eps) * A))`
pub fn clipped_surrogate_loss<B: Backend>(
    ratio: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_epsilon: f32,
) -> Tensor<B, 1> {
    let clipped_ratio = ratio.clone().clamp(1.0 - clip_epsilon, 1.0 + clip_epsilon);
    let surr1 = ratio * advantages.clone();
    let surr2 = clipped_ratio * advantages;
    -surr1.min_pair(surr2).mean()
}

/// Adam as used by the PPO update
pub type PolicyOptimizer<M, B> = OptimizerAdaptor<Adam, M, B>;

pub fn policy_optimizer<B, M>() -> PolicyOptimizer<M, B>
where
    B: AutodiffBackend,
    M: DifferentiableModel<B>,
{
    AdamConfig::new().with_epsilon(1e-5).init::<B, M>()
}

/// Optimizer, learning rate schedule and update counter for one policy.
///
/// Works on any [`DifferentiableModel`]; the model itself stays with the caller.
pub struct PpoLearner<B: AutodiffBackend, M: DifferentiableModel<B>> {
    config: PpoConfig,
    optimizer: PolicyOptimizer<M, B>,
    schedule: LearningRateDecay,
    update_count: usize,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend, M: DifferentiableModel<B>> PpoLearner<B, M> {
    pub fn new(config: PpoConfig) -> Self {
        Self {
            schedule: LearningRateDecay::from_config(&config),
            optimizer: policy_optimizer::<B, M>(),
            config,
            update_count: 0,
            _backend: PhantomData,
        }
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }

    pub fn learning_rate(&self) -> f64 {
        self.schedule.current()
    }

    pub fn optimizer(&self) -> &PolicyOptimizer<M, B> {
        &self.optimizer
    }

    /// Swap in restored optimizer moments, schedule position and counter
    pub fn restore(
        &mut self,
        optimizer: Option<<PolicyOptimizer<M, B> as Optimizer<M, B>>::Record>,
        learning_rate: Option<f64>,
        update_count: usize,
    ) {
        if let Some(record) = optimizer {
            let fresh = policy_optimizer::<B, M>();
            self.optimizer = fresh.load_record(record);
        }
        if let Some(lr) = learning_rate {
            self.schedule.restore(lr);
        }
        self.update_count = update_count;
    }

    /// Drain `buffer` into one PPO update of `model`.
    ///
    /// Skipped (returns `Ok(None)`) while the buffer holds less than one
    /// mini-batch. A full buffer that is still too small to train on is
    /// cleared so collection can continue.
    pub fn update<R: Rng>(
        &mut self,
        model: &mut M,
        buffer: &mut RolloutBuffer,
        device: &B::Device,
        rng: &mut R,
    ) -> AgentResult<Option<UpdateStats>> {
        if buffer.len() < self.config.mini_batch_size {
            tracing::debug!(
                "Skipping update: {} transitions < mini-batch {}",
                buffer.len(),
                self.config.mini_batch_size
            );
            if buffer.is_full() {
                tracing::warn!(
                    "Buffer capacity {} is below the mini-batch size; discarding rollout",
                    buffer.capacity()
                );
                buffer.clear();
            }
            return Ok(None);
        }

        let batch = buffer.get();
        buffer.clear();

        let stats = self.train_on(model, &batch, device, rng)?;
        Ok(Some(stats))
    }

    /// Run the configured epochs over an already drained rollout
    pub fn train_on<R: Rng>(
        &mut self,
        model: &mut M,
        batch: &RolloutBatch,
        device: &B::Device,
        rng: &mut R,
    ) -> AgentResult<UpdateStats> {
        let update = self.update_count + 1;
        let len = batch.len();
        let feature_count = batch.states.first().map_or(0, |s| s.len());

        let targets = compute_normalized(
            &batch.rewards,
            &batch.values,
            &batch.dones,
            self.config.gamma,
            self.config.gae_lambda,
        );

        let learning_rate = self.schedule.current();
        let mut stats = UpdateStats {
            update,
            transitions: len,
            ..Default::default()
        };
        let mut total_policy_loss = 0.0f32;
        let mut total_value_loss = 0.0f32;
        let mut total_entropy = 0.0f32;
        let mut total_grad_norm = 0.0f32;
        let mut num_minibatches = 0usize;

        for epoch in 0..self.config.epochs {
            let mut epoch_kl = 0.0f32;
            let mut epoch_batches = 0usize;

            for indices in minibatch_indices(len, self.config.mini_batch_size, rng) {
                let size = indices.len();

                let states: Vec<f32> = indices
                    .iter()
                    .flat_map(|&i| batch.states[i].iter().copied())
                    .collect();
                let actions: Vec<i64> = indices.iter().map(|&i| batch.actions[i] as i64).collect();
                let old_log_probs: Vec<f32> = indices.iter().map(|&i| batch.log_probs[i]).collect();
                let returns: Vec<f32> = indices.iter().map(|&i| targets.returns[i]).collect();
                let advantages: Vec<f32> =
                    indices.iter().map(|&i| targets.advantages[i]).collect();

                let states_tensor = Tensor::<B, 1>::from_floats(states.as_slice(), device)
                    .reshape([size, feature_count]);
                let actions_tensor = Tensor::<B, 1, Int>::from_ints(actions.as_slice(), device);
                let old_log_probs_tensor =
                    Tensor::<B, 1>::from_floats(old_log_probs.as_slice(), device);
                let returns_tensor = Tensor::<B, 1>::from_floats(returns.as_slice(), device);
                let advantages_tensor = Tensor::<B, 1>::from_floats(advantages.as_slice(), device);

                let eval = model.evaluate(states_tensor, actions_tensor);

                let approx_kl = (old_log_probs_tensor.clone() - eval.log_probs.clone())
                    .mean()
                    .into_scalar()
                    .elem::<f32>();

                let ratio = (eval.log_probs - old_log_probs_tensor).exp();
                let policy_loss =
                    clipped_surrogate_loss(ratio, advantages_tensor, self.config.clip_epsilon);
                let value_loss = (returns_tensor - eval.values).powf_scalar(2.0).mean()
                    * self.config.value_loss_scale;
                let entropy = eval.entropy.mean();

                let loss = policy_loss.clone() + value_loss.clone() * self.config.value_coef
                    - entropy.clone() * self.config.entropy_coef;

                let loss_value = loss.clone().into_scalar().elem::<f32>();
                if !loss_value.is_finite() {
                    tracing::error!(
                        "Non-finite loss {} at update {}, epoch {}",
                        loss_value,
                        update,
                        epoch
                    );
                    return Err(AgentError::TrainingDivergence {
                        update,
                        epoch,
                        loss: loss_value,
                    });
                }

                let (updated, grad_norm) = model.clone().apply_gradients(
                    &mut self.optimizer,
                    loss,
                    learning_rate,
                    self.config.max_grad_norm,
                );
                *model = updated;

                total_policy_loss += policy_loss.into_scalar().elem::<f32>();
                total_value_loss += value_loss.into_scalar().elem::<f32>();
                total_entropy += entropy.into_scalar().elem::<f32>();
                total_grad_norm += grad_norm as f32;
                num_minibatches += 1;

                epoch_kl += approx_kl;
                epoch_batches += 1;
            }

            stats.epochs_run = epoch + 1;
            stats.approx_kl = if epoch_batches > 0 {
                epoch_kl / epoch_batches as f32
            } else {
                0.0
            };

            if let Some(target_kl) = self.config.target_kl {
                if stats.approx_kl > target_kl {
                    tracing::info!(
                        "Early stopping at epoch {} of update {}: KL {:.4} > {:.4}",
                        epoch,
                        update,
                        stats.approx_kl,
                        target_kl
                    );
                    stats.early_stopped = true;
                    break;
                }
            }
        }

        if num_minibatches > 0 {
            let n = num_minibatches as f32;
            stats.policy_loss = total_policy_loss / n;
            stats.value_loss = total_value_loss / n;
            stats.entropy = total_entropy / n;
            stats.mean_grad_norm = total_grad_norm / n;
        }

        stats.learning_rate = self.schedule.step();
        self.update_count = update;

        tracing::debug!(
            "Update {}: policy_loss={:.4}, value_loss={:.4}, entropy={:.4}, kl={:.4}, lr={:.2e}",
            update,
            stats.policy_loss,
            stats.value_loss,
            stats.entropy,
            stats.approx_kl,
            stats.learning_rate
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planners::rl::buffer::Transition;
    use crate::planners::rl::gae::compute_gae;
    use crate::planners::rl::policy::{ActorCritic, ActorCriticConfig, PolicyNetwork, to_floats};
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type TestBackend = Autodiff<NdArray<f32>>;
    type TestLearner = PpoLearner<TestBackend, ActorCritic<TestBackend>>;

    const FEATURES: usize = 6;

    fn network(seed: u64) -> ActorCritic<TestBackend> {
        ActorCriticConfig::new(FEATURES)
            .with_hidden_size(8)
            .init(&NdArrayDevice::default(), seed)
            .unwrap()
    }

    fn fill(buffer: &mut RolloutBuffer, count: usize) {
        for i in 0..count {
            buffer
                .store(Transition {
                    state: (0..FEATURES).map(|f| ((i + f) % 5) as f32 / 5.0).collect(),
                    action: i % 10,
                    log_prob: -(10.0f32).ln(),
                    reward: if i % 3 == 0 { 1.0 } else { -0.5 },
                    value: 0.0,
                    done: i % 7 == 6,
                })
                .unwrap();
        }
    }

    #[test]
    fn test_ppo_config_default() {
        let config = PpoConfig::new();
        assert!((config.gamma - 0.99).abs() < 1e-6);
        assert_eq!(config.epochs, 4);
        assert_eq!(config.mini_batch_size, 64);
        assert_eq!(config.buffer_size, 2048);
        assert_eq!(config.target_kl, Some(0.02));
    }

    #[test]
    fn test_ppo_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ppo.json");
        let config = PpoConfig::new()
            .with_mini_batch_size(2)
            .with_target_kl(None)
            .with_learning_rate(1e-3);

        config.save(&path).unwrap();
        let loaded = PpoConfig::load(&path).unwrap();
        assert_eq!(loaded.mini_batch_size, 2);
        assert_eq!(loaded.target_kl, None);
        assert!((loaded.learning_rate - 1e-3).abs() < 1e-12);
        assert_eq!(loaded.epochs, config.epochs);
    }

    #[test]
    fn test_minibatch_coverage() {
        let mut rng = StdRng::seed_from_u64(3);
        for (len, size) in [(10, 3), (64, 64), (100, 7), (5, 64)] {
            let batches = minibatch_indices(len, size, &mut rng);
            let mut seen: Vec<usize> = batches.iter().flatten().copied().collect();
            assert!(batches.iter().all(|b| b.len() <= size));
            seen.sort_unstable();
            assert_eq!(seen, (0..len).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_clipped_surrogate_positive_advantage() {
        let device = NdArrayDevice::default();
        let ratio = Tensor::<NdArray<f32>, 1>::from_floats([0.5, 1.0, 1.5], &device);
        let advantages = Tensor::<NdArray<f32>, 1>::from_floats([1.0, 1.0, 1.0], &device);

        let loss = clipped_surrogate_loss(ratio, advantages, 0.2)
            .into_scalar()
            .elem::<f32>();
        // min terms: 0.5 (unclipped), 1.0, 1.2 (clipped at 1 + eps)
        assert!((loss - (-(0.5 + 1.0 + 1.2) / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn test_clipped_surrogate_negative_advantage() {
        let device = NdArrayDevice::default();
        let ratio = Tensor::<NdArray<f32>, 1>::from_floats([0.5, 1.2, 1.5], &device);
        let advantages = Tensor::<NdArray<f32>, 1>::from_floats([-1.0, -1.0, -1.0], &device);

        let loss = clipped_surrogate_loss(ratio, advantages, 0.2)
            .into_scalar()
            .elem::<f32>();
        // min terms: -0.8 (clipped at 1 - eps), -1.2 (boundary), -1.5 (unclipped)
        assert!((loss - (0.8 + 1.2 + 1.5) / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_learning_rate_decay_floor() {
        let mut schedule = LearningRateDecay::new(1e-4, 0.5, 3e-5);
        assert!((schedule.step() - 5e-5).abs() < 1e-12);
        assert!((schedule.step() - 3e-5).abs() < 1e-12);
        assert!((schedule.step() - 3e-5).abs() < 1e-12);
    }

    #[test]
    fn test_update_skipped_below_minibatch() {
        let device = NdArrayDevice::default();
        let mut model = network(1);
        let mut learner = TestLearner::new(PpoConfig::new().with_mini_batch_size(8));
        let mut buffer = RolloutBuffer::new(16);
        let mut rng = StdRng::seed_from_u64(0);
        fill(&mut buffer, 5);

        let stats = learner.update(&mut model, &mut buffer, &device, &mut rng).unwrap();
        assert!(stats.is_none());
        assert_eq!(buffer.len(), 5);
        assert_eq!(learner.update_count(), 0);
    }

    #[test]
    fn test_update_drains_buffer_and_changes_policy() {
        let device = NdArrayDevice::default();
        let mut model = network(2);
        let config = PpoConfig::new()
            .with_mini_batch_size(4)
            .with_epochs(2)
            .with_target_kl(None)
            .with_learning_rate(1e-2);
        let mut learner = TestLearner::new(config);
        let mut buffer = RolloutBuffer::new(16);
        let mut rng = StdRng::seed_from_u64(1);
        fill(&mut buffer, 16);

        let sample = Tensor::<TestBackend, 1>::from_floats([0.2; FEATURES], &device)
            .reshape([1, FEATURES]);
        let (before, _) = model.forward(sample.clone());
        let before = to_floats(before);

        let stats = learner
            .update(&mut model, &mut buffer, &device, &mut rng)
            .unwrap()
            .unwrap();

        assert!(buffer.is_empty());
        assert_eq!(stats.update, 1);
        assert_eq!(stats.epochs_run, 2);
        assert_eq!(stats.transitions, 16);
        assert!(stats.policy_loss.is_finite() && stats.value_loss.is_finite());
        assert!((stats.learning_rate - 1e-2 * 0.995).abs() < 1e-9);
        assert_eq!(learner.update_count(), 1);

        let (after, _) = model.forward(sample);
        assert_ne!(before, to_floats(after));
    }

    #[test]
    fn test_update_on_single_short_episode() {
        let device = NdArrayDevice::default();
        let mut model = network(6);
        let config = PpoConfig::new()
            .with_buffer_size(4)
            .with_mini_batch_size(2)
            .with_epochs(1);
        let mut learner = TestLearner::new(config);
        let mut buffer = RolloutBuffer::new(4);
        let mut rng = StdRng::seed_from_u64(4);

        let rewards = [1.0, 0.0, 0.0, 1.0];
        for (i, reward) in rewards.iter().enumerate() {
            buffer
                .store(Transition {
                    state: vec![i as f32 / 4.0; FEATURES],
                    action: i,
                    log_prob: -(10.0f32).ln(),
                    reward: *reward,
                    value: 0.0,
                    done: i == 3,
                })
                .unwrap();
        }
        assert!(buffer.is_full());

        let batch = buffer.get();
        let targets = compute_gae(&batch.rewards, &batch.values, &batch.dones, 0.99, 0.95);
        for (got, want) in targets.returns.iter().zip([1.8319, 0.8845, 0.9405, 1.0]) {
            assert!((got - want).abs() < 1e-3, "return {got} != {want}");
        }

        let stats = learner
            .update(&mut model, &mut buffer, &device, &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(stats.transitions, 4);
        assert_eq!(stats.epochs_run, 1);
        assert_eq!(stats.update, 1);
        assert!(stats.policy_loss.is_finite() && stats.value_loss.is_finite());
        assert!(buffer.is_empty());
        assert_eq!(learner.update_count(), 1);
    }

    #[test]
    fn test_kl_early_stop() {
        let device = NdArrayDevice::default();
        let mut model = network(4);
        // A negative threshold trips after the first epoch
        let config = PpoConfig::new()
            .with_mini_batch_size(4)
            .with_epochs(5)
            .with_target_kl(Some(-1.0));
        let mut learner = TestLearner::new(config);
        let mut buffer = RolloutBuffer::new(8);
        let mut rng = StdRng::seed_from_u64(2);
        fill(&mut buffer, 8);

        let stats = learner
            .update(&mut model, &mut buffer, &device, &mut rng)
            .unwrap()
            .unwrap();
        assert!(stats.early_stopped);
        assert_eq!(stats.epochs_run, 1);
    }

    #[test]
    fn test_nan_reward_is_divergence() {
        let device = NdArrayDevice::default();
        let mut model = network(5);
        let mut learner = TestLearner::new(PpoConfig::new().with_mini_batch_size(4));
        let mut buffer = RolloutBuffer::new(4);
        let mut rng = StdRng::seed_from_u64(3);
        fill(&mut buffer, 3);
        buffer
            .store(Transition {
                state: vec![0.0; FEATURES],
                action: 0,
                log_prob: -1.0,
                reward: f32::NAN,
                value: 0.0,
                done: true,
            })
            .unwrap();

        let err = learner
            .update(&mut model, &mut buffer, &device, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::TrainingDivergence { update: 1, epoch: 0, .. }
        ));
        assert_eq!(learner.update_count(), 0);
    }
}
