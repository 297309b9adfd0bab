//! PPO-driven bomber and the backend selection that picks between it and the
//! rule-based fallback.

use std::path::Path;

use burn::module::{AutodiffModule, Module};
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::action_space::{ActionSpace, Command};
use super::buffer::{RolloutBuffer, Transition};
use super::checkpoint::{self, PolicyCheckpoint};
use super::encoder::StateEncoder;
use super::policy::{ActorCritic, ActorCriticConfig, PolicyNetwork, state_tensor};
use super::ppo::{PpoConfig, PpoLearner, UpdateStats};
use crate::error::{AgentError, Result};
use crate::planners::DecisionPolicy;
use crate::planners::heuristic::FallbackPolicy;
use crate::state::{PlayerId, WorldState};

/// Sampled decision waiting for its reward
#[derive(Debug, Clone)]
struct PendingStep {
    state: Vec<f32>,
    action: usize,
    log_prob: f32,
    value: f32,
}

/// On-policy PPO agent owning its network, buffer and optimizer
pub struct PpoAgent<B: AutodiffBackend> {
    self_id: PlayerId,
    encoder: StateEncoder,
    network_config: ActorCriticConfig,
    network: ActorCritic<B>,
    learner: PpoLearner<B, ActorCritic<B>>,
    buffer: RolloutBuffer,
    device: B::Device,
    rng: StdRng,
    training: bool,
    pending: Option<PendingStep>,
}

impl<B: AutodiffBackend> PpoAgent<B> {
    /// Agent with the default network width for `encoder`'s feature count
    pub fn new(
        self_id: PlayerId,
        encoder: StateEncoder,
        ppo: PpoConfig,
        device: B::Device,
        seed: u64,
    ) -> Result<Self> {
        let network_config = ActorCriticConfig::new(encoder.feature_count());
        Self::with_network(self_id, encoder, network_config, ppo, device, seed)
    }

    pub fn with_network(
        self_id: PlayerId,
        encoder: StateEncoder,
        network_config: ActorCriticConfig,
        ppo: PpoConfig,
        device: B::Device,
        seed: u64,
    ) -> Result<Self> {
        let network = network_config.init::<B>(&device, seed)?;
        let buffer = RolloutBuffer::new(ppo.buffer_size);

        Ok(Self {
            self_id,
            encoder,
            network_config,
            network,
            learner: PpoLearner::new(ppo),
            buffer,
            device,
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            training: true,
            pending: None,
        })
    }

    pub fn self_id(&self) -> PlayerId {
        self.self_id
    }

    pub fn network(&self) -> &ActorCritic<B> {
        &self.network
    }

    pub fn network_config(&self) -> &ActorCriticConfig {
        &self.network_config
    }

    pub fn update_count(&self) -> usize {
        self.learner.update_count()
    }

    pub fn learning_rate(&self) -> f64 {
        self.learner.learning_rate()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Stochastic sampling with transition recording (true) or greedy play (false)
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        self.pending = None;
    }

    /// Choose an action index for the encoded state
    fn select(&mut self, state: Vec<f32>) -> usize {
        // Decisions never need gradients, so they run on the inner backend
        let policy = self.network.valid();
        let input = state_tensor::<B::InnerBackend>(&state, &self.device);

        if self.training {
            let sample = policy.sample(input, &mut self.rng);
            self.pending = Some(PendingStep {
                state,
                action: sample.action,
                log_prob: sample.log_prob,
                value: sample.value,
            });
            sample.action
        } else {
            policy.act_greedy(input)
        }
    }

    /// Run one PPO update on whatever the buffer holds
    pub fn update(&mut self) -> Result<Option<UpdateStats>> {
        self.learner.update(
            &mut self.network,
            &mut self.buffer,
            &self.device,
            &mut self.rng,
        )
    }

    /// Train on a partial buffer if it holds at least one mini-batch
    pub fn flush(&mut self) -> Result<Option<UpdateStats>> {
        if self.buffer.len() >= self.learner.config().mini_batch_size {
            self.update()
        } else {
            Ok(None)
        }
    }

    fn checkpoint(&self, with_optimizer: bool) -> PolicyCheckpoint<B> {
        let mut record = checkpoint::inference_only(
            &self.network,
            &self.network_config,
            self.learner.update_count(),
        );
        if with_optimizer {
            record.optimizer = Some(self.learner.optimizer().to_record());
            record.scheduler = Some(self.learner.learning_rate());
        }
        record
    }

    /// Persist weights, optimizer, schedule and update counter
    pub fn save(&self, path: &Path) -> Result<()> {
        checkpoint::save(self.checkpoint(true), path).map(|_| ())
    }

    /// Persist weights only
    pub fn save_inference(&self, path: &Path) -> Result<()> {
        checkpoint::save(self.checkpoint(false), path).map(|_| ())
    }

    /// Restore a checkpoint; optimizer and schedule are kept fresh when the
    /// file carries none.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let restored = checkpoint::load::<B>(path, &self.network_config, &self.device)?;

        self.network = self.network.clone().load_record(restored.model);
        self.learner.restore(
            restored.optimizer,
            restored.scheduler,
            restored.update_count,
        );
        self.buffer.clear();
        self.pending = None;
        Ok(())
    }
}

impl<B: AutodiffBackend> DecisionPolicy for PpoAgent<B> {
    fn decide(&mut self, world: &WorldState) -> Result<Command> {
        let alive = world.player(self.self_id).is_some_and(|p| p.alive);
        if !alive {
            self.pending = None;
            return Ok(Command::STAY);
        }

        let state = self.encoder.encode(world, self.self_id);
        let action = self.select(state);
        ActionSpace::decode(action)
    }

    fn observe(&mut self, reward: f32, done: bool) -> Result<Option<UpdateStats>> {
        if !self.training {
            return Ok(None);
        }
        let Some(step) = self.pending.take() else {
            return Ok(None);
        };

        self.buffer.store(Transition {
            state: step.state,
            action: step.action,
            log_prob: step.log_prob,
            reward,
            value: step.value,
            done,
        })?;

        if self.buffer.is_full() {
            self.update()
        } else {
            Ok(None)
        }
    }
}

/// Which decision machinery is available, chosen once at construction
#[derive(Debug, Clone)]
pub enum PolicyBackend<B: AutodiffBackend> {
    /// Trainable network on the given device
    Autodiff(B::Device),
    /// No trainable backend: rule-based play only
    Heuristic,
}

/// A bomber controlled either by PPO or by the fallback rules
pub enum Agent<B: AutodiffBackend> {
    Ppo(Box<PpoAgent<B>>),
    Fallback(FallbackPolicy),
}

impl<B: AutodiffBackend> Agent<B> {
    pub fn new(
        backend: PolicyBackend<B>,
        self_id: PlayerId,
        encoder: StateEncoder,
        ppo: PpoConfig,
        seed: u64,
    ) -> Result<Self> {
        match backend {
            PolicyBackend::Autodiff(device) => Ok(Agent::Ppo(Box::new(PpoAgent::new(
                self_id, encoder, ppo, device, seed,
            )?))),
            PolicyBackend::Heuristic => {
                tracing::info!("No trainable backend; player {} uses fallback rules", self_id);
                Ok(Agent::Fallback(FallbackPolicy::new(self_id, seed)))
            }
        }
    }

    /// Like [`new`](Self::new), then restore `path` if possible. A missing,
    /// unreadable or incompatible checkpoint leaves fresh weights in place.
    pub fn load_or_fresh(
        backend: PolicyBackend<B>,
        self_id: PlayerId,
        encoder: StateEncoder,
        ppo: PpoConfig,
        seed: u64,
        path: &Path,
    ) -> Result<Self> {
        let mut agent = Self::new(backend, self_id, encoder, ppo, seed)?;
        if let Agent::Ppo(ppo_agent) = &mut agent {
            match ppo_agent.load(path) {
                Ok(()) => {}
                Err(err @ AgentError::CheckpointLoad { .. }) => {
                    tracing::warn!("{}; starting from fresh weights", err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(agent)
    }

    pub fn as_ppo(&self) -> Option<&PpoAgent<B>> {
        match self {
            Agent::Ppo(agent) => Some(&**agent),
            Agent::Fallback(_) => None,
        }
    }

    pub fn as_ppo_mut(&mut self) -> Option<&mut PpoAgent<B>> {
        match self {
            Agent::Ppo(agent) => Some(&mut **agent),
            Agent::Fallback(_) => None,
        }
    }

    pub fn set_training(&mut self, training: bool) {
        if let Agent::Ppo(agent) = self {
            agent.set_training(training);
        }
    }
}

impl<B: AutodiffBackend> DecisionPolicy for Agent<B> {
    fn decide(&mut self, world: &WorldState) -> Result<Command> {
        match self {
            Agent::Ppo(agent) => agent.decide(world),
            Agent::Fallback(policy) => policy.decide(world),
        }
    }

    fn observe(&mut self, reward: f32, done: bool) -> Result<Option<UpdateStats>> {
        match self {
            Agent::Ppo(agent) => agent.observe(reward, done),
            Agent::Fallback(policy) => policy.observe(reward, done),
        }
    }
}
