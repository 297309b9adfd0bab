//! Reinforcement Learning bomber using PPO (clipped surrogate, GAE, shared actor-critic)
//!
//! # Architecture
//!
//! ```text
//! WorldState
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StateEncoder                                               │
//! │  - grid cells + self/enemy/bomb/power-up scalars            │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ActorCritic                                                │
//! │  - shared trunk → policy logits (10 actions) + state value  │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PpoAgent                                                   │
//! │  - samples / argmax, stores transitions in RolloutBuffer    │
//! │  - PpoLearner: GAE → clipped updates → LR decay             │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! Command (dx, dy, place_bomb)
//! ```

// Core modules that don't depend on Burn
pub mod action_space;
pub mod buffer;
pub mod encoder;
pub mod env;
pub mod gae;
pub mod metrics;

// Burn-dependent modules
pub mod agent;
pub mod checkpoint;
pub mod policy;
pub mod ppo;
pub mod train;

// Re-export commonly used types
pub use action_space::{ACTION_COUNT, ActionSpace, Command};
pub use agent::{Agent, PolicyBackend, PpoAgent};
pub use buffer::{RolloutBatch, RolloutBuffer, Transition};
pub use encoder::{EncoderConfig, StateEncoder};
pub use env::{EnvConfig, RLEnv, RewardConfig, StepInfo, StepResult};
pub use gae::{AdvantageSet, compute_gae, compute_normalized};
pub use metrics::{EvaluationMetrics, MovingAverage, TrainingMetrics};
pub use policy::{ActorCritic, ActorCriticConfig, DifferentiableModel, PolicyNetwork};
pub use ppo::{LearningRateDecay, PpoConfig, PpoLearner, UpdateStats};
pub use train::{StopReason, TrainConfig, TrainSummary, Trainer};
