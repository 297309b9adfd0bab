//! Error types for the agent core

use std::path::PathBuf;

use thiserror::Error;

/// Why a checkpoint could not be restored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointLoadReason {
    Missing,
    Unreadable(String),
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
}

impl std::fmt::Display for CheckpointLoadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointLoadReason::Missing => write!(f, "file not found"),
            CheckpointLoadReason::Unreadable(msg) => write!(f, "unreadable: {msg}"),
            CheckpointLoadReason::ShapeMismatch { expected, found } => write!(
                f,
                "shape mismatch (features, hidden, actions): expected {expected:?}, found {found:?}"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("action index {index} is outside the action table of size {size}")]
    InvalidActionIndex { index: usize, size: usize },

    #[error("rollout buffer is full ({capacity} transitions) and has not been drained")]
    BufferOverflow { capacity: usize },

    #[error("training diverged at update {update}, epoch {epoch}: loss = {loss}")]
    TrainingDivergence {
        update: usize,
        epoch: usize,
        loss: f32,
    },

    #[error("could not load checkpoint {path}: {reason}")]
    CheckpointLoad {
        path: PathBuf,
        reason: CheckpointLoadReason,
    },

    #[error("could not save checkpoint {path}: {message}")]
    CheckpointSave { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
