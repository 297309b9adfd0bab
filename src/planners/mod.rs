//! Decision makers that drive a bomber in the arena

pub mod heuristic;
pub mod rl;

use crate::error::Result;
use crate::state::WorldState;

pub use rl::action_space::Command;
pub use rl::ppo::UpdateStats;

/// Interface the simulation loop talks to: one `decide` per tick, followed
/// by one `observe` with the shaped reward for that decision.
pub trait DecisionPolicy {
    fn decide(&mut self, world: &WorldState) -> Result<Command>;

    /// Feedback for the last decision. Returns statistics when it triggered
    /// a training update.
    fn observe(&mut self, reward: f32, done: bool) -> Result<Option<UpdateStats>>;
}
