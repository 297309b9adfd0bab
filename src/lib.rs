pub mod error;
pub mod game;
pub mod infra;
pub mod planners;
pub mod state;

// Re-export commonly used types for convenience
pub use error::{AgentError, Result};
pub use infra::{AStar, Position};
pub use planners::{Command, DecisionPolicy};
pub use state::WorldState;
