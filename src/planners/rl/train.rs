//! Episode-driven PPO training against the scripted opponent

use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;

use super::agent::PpoAgent;
use super::encoder::{EncoderConfig, StateEncoder};
use super::env::{EnvConfig, RLEnv};
use super::metrics::{EvaluationMetrics, TrainingMetrics};
use super::policy::ActorCriticConfig;
use super::ppo::{PpoConfig, UpdateStats};
use crate::error::{AgentError, Result};
use crate::planners::DecisionPolicy;

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Number of training episodes
    pub episodes: usize,
    pub seed: u64,
    /// Checkpoint location; the recorder adds the `.mpk` extension
    pub model_path: PathBuf,
    /// Restore `model_path` before training if it exists
    pub resume: bool,
    pub hidden_size: usize,
    /// Episodes between console summaries
    pub log_interval: usize,
    /// Episodes between greedy evaluations
    pub eval_interval: usize,
    pub eval_episodes: usize,
    /// Episodes between periodic checkpoints
    pub save_interval: usize,
    /// Stop once an evaluation reaches this win rate (0..=1)
    pub target_win_rate: f32,
    /// Stop after this many episodes without a better evaluation
    pub patience: usize,
    pub env: EnvConfig,
    pub encoder: EncoderConfig,
    pub ppo: PpoConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            episodes: 5000,
            seed: 42,
            model_path: PathBuf::from("models/bomber_ppo"),
            resume: true,
            hidden_size: 128,
            log_interval: 10,
            eval_interval: 50,
            eval_episodes: 20,
            save_interval: 100,
            target_win_rate: 0.7,
            patience: 500,
            env: EnvConfig::default(),
            encoder: EncoderConfig::default(),
            ppo: PpoConfig::new(),
        }
    }
}

impl TrainConfig {
    /// Where the best evaluated policy is kept
    pub fn best_model_path(&self) -> PathBuf {
        sibling(&self.model_path, "best")
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_{suffix}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ran every configured episode
    Completed,
    TargetReached,
    /// No evaluation improvement within the patience window
    Patience,
}

#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub episodes: usize,
    pub updates: usize,
    pub best_win_rate: f32,
    pub stop_reason: StopReason,
}

/// Outcome of one training episode
#[derive(Debug, Clone, Copy)]
struct EpisodeResult {
    reward: f32,
    steps: usize,
    won: bool,
    died: bool,
}

pub struct Trainer<B: AutodiffBackend> {
    config: TrainConfig,
    agent: PpoAgent<B>,
    env: RLEnv,
    eval_env: RLEnv,
    metrics: TrainingMetrics,
    best_win_rate: f32,
    episodes_without_improvement: usize,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self> {
        let encoder = StateEncoder::new(config.encoder.clone());
        let network = ActorCriticConfig::new(encoder.feature_count())
            .with_hidden_size(config.hidden_size);
        let mut agent = PpoAgent::with_network(
            RLEnv::AGENT_ID,
            encoder,
            network,
            config.ppo.clone(),
            device,
            config.seed,
        )?;

        if config.resume {
            match agent.load(&config.model_path) {
                Ok(()) => tracing::info!(
                    "Resumed from {:?} after {} updates",
                    config.model_path,
                    agent.update_count()
                ),
                Err(err @ AgentError::CheckpointLoad { .. }) => {
                    tracing::warn!("{}; starting from fresh weights", err);
                }
                Err(err) => return Err(err),
            }
        }

        let env = RLEnv::new(config.env.clone(), config.seed);
        let eval_env = RLEnv::new(config.env.clone(), config.seed.wrapping_add(1_000_003));

        Ok(Self {
            config,
            agent,
            env,
            eval_env,
            metrics: TrainingMetrics::default(),
            best_win_rate: 0.0,
            episodes_without_improvement: 0,
        })
    }

    pub fn agent(&self) -> &PpoAgent<B> {
        &self.agent
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Run the training loop. A diverged update aborts immediately; the
    /// diverged policy is never saved, so the artifact on disk stays at the
    /// last interval checkpoint (if any).
    pub fn train(&mut self) -> Result<TrainSummary> {
        tracing::info!(
            "Starting training for {} episodes (max {} steps each)",
            self.config.episodes,
            self.config.env.max_steps
        );

        let mut stop_reason = StopReason::Completed;
        let mut episodes = 0;

        for episode in 1..=self.config.episodes {
            let result = self.run_episode()?;
            episodes = episode;
            self.metrics
                .record_episode(result.reward, result.steps, result.won, result.died);

            if self.config.log_interval > 0 && episode % self.config.log_interval == 0 {
                self.metrics.log_to_console();
            }

            if self.config.eval_interval > 0 && episode % self.config.eval_interval == 0 {
                if let Some(reason) = self.evaluate_and_track(episode)? {
                    stop_reason = reason;
                    break;
                }
            }

            if self.config.save_interval > 0 && episode % self.config.save_interval == 0 {
                self.agent.save(&self.config.model_path)?;
            }
        }

        self.agent.save(&self.config.model_path)?;

        let summary = TrainSummary {
            episodes,
            updates: self.agent.update_count(),
            best_win_rate: self.best_win_rate,
            stop_reason,
        };
        tracing::info!(
            "Training finished after {} episodes ({:?}): {} updates, best win rate {:.1}%",
            summary.episodes,
            summary.stop_reason,
            summary.updates,
            summary.best_win_rate * 100.0
        );
        Ok(summary)
    }

    fn record(&mut self, stats: Option<UpdateStats>) {
        if let Some(stats) = stats {
            self.metrics.record_update(&stats);
        }
    }

    fn run_episode(&mut self) -> Result<EpisodeResult> {
        self.env.reset();
        let mut total_reward = 0.0;

        loop {
            let command = self.agent.decide(self.env.world())?;
            let result = self.env.step(command)?;
            total_reward += result.reward;

            // A truncated episode still ends the trajectory for advantage estimation
            let stats = self
                .agent
                .observe(result.reward, result.done || result.truncated)?;
            self.record(stats);

            if result.done || result.truncated {
                let stats = self.agent.flush()?;
                self.record(stats);
                return Ok(EpisodeResult {
                    reward: total_reward,
                    steps: result.info.steps,
                    won: result.info.won,
                    died: result.info.died,
                });
            }
        }
    }

    /// Greedy play on a separate arena; nothing is recorded
    pub fn evaluate(&mut self, episodes: usize) -> Result<EvaluationMetrics> {
        self.agent.set_training(false);
        let mut metrics = EvaluationMetrics::new();
        let outcome = self.play_greedy(episodes, &mut metrics);
        self.agent.set_training(true);
        outcome.map(|()| metrics)
    }

    fn play_greedy(&mut self, episodes: usize, metrics: &mut EvaluationMetrics) -> Result<()> {
        for _ in 0..episodes {
            self.eval_env.reset();
            let mut total_reward = 0.0;
            loop {
                let command = self.agent.decide(self.eval_env.world())?;
                let result = self.eval_env.step(command)?;
                total_reward += result.reward;
                if result.done || result.truncated {
                    metrics.record_episode(
                        total_reward,
                        result.info.steps,
                        result.info.won,
                        result.info.died,
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    fn evaluate_and_track(&mut self, episode: usize) -> Result<Option<StopReason>> {
        tracing::info!("Evaluating at episode {}", episode);
        let eval = self.evaluate(self.config.eval_episodes)?;
        eval.print_summary();

        let win_rate = eval.win_rate();
        if win_rate > self.best_win_rate {
            self.best_win_rate = win_rate;
            self.episodes_without_improvement = 0;
            let best = self.config.best_model_path();
            self.agent.save(&best)?;
            tracing::info!("New best win rate {:.1}%", win_rate * 100.0);
        } else {
            self.episodes_without_improvement += self.config.eval_interval;
        }

        if win_rate >= self.config.target_win_rate {
            tracing::info!("Target win rate reached; stopping early");
            return Ok(Some(StopReason::TargetReached));
        }
        if self.episodes_without_improvement >= self.config.patience {
            tracing::info!(
                "No improvement for {} episodes; stopping",
                self.episodes_without_improvement
            );
            return Ok(Some(StopReason::Patience));
        }
        Ok(None)
    }
}
