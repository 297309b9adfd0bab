//! Fixed-capacity rollout storage for on-policy training

use crate::error::{AgentError, Result};

/// One decision step, never mutated after insertion
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: usize,
    pub log_prob: f32,
    pub reward: f32,
    pub value: f32,
    pub done: bool,
}

/// Snapshot of a drained buffer as parallel arrays in decision order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolloutBatch {
    pub states: Vec<Vec<f32>>,
    pub actions: Vec<usize>,
    pub log_probs: Vec<f32>,
    pub rewards: Vec<f32>,
    pub values: Vec<f32>,
    pub dones: Vec<bool>,
}

impl RolloutBatch {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Rollout buffer for PPO training.
///
/// Callers check [`is_full`](Self::is_full) before storing; an update drains
/// the buffer with [`get`](Self::get) and then calls [`clear`](Self::clear).
#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    capacity: usize,
    transitions: Vec<Transition>,
}

impl RolloutBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            transitions: Vec::with_capacity(capacity),
        }
    }

    pub fn store(&mut self, transition: Transition) -> Result<()> {
        if self.is_full() {
            return Err(AgentError::BufferOverflow {
                capacity: self.capacity,
            });
        }
        self.transitions.push(transition);
        Ok(())
    }

    /// Copy of the current contents; later stores do not affect it
    pub fn get(&self) -> RolloutBatch {
        let mut batch = RolloutBatch {
            states: Vec::with_capacity(self.len()),
            actions: Vec::with_capacity(self.len()),
            log_probs: Vec::with_capacity(self.len()),
            rewards: Vec::with_capacity(self.len()),
            values: Vec::with_capacity(self.len()),
            dones: Vec::with_capacity(self.len()),
        };

        for t in &self.transitions {
            batch.states.push(t.state.clone());
            batch.actions.push(t.action);
            batch.log_probs.push(t.log_prob);
            batch.rewards.push(t.reward);
            batch.values.push(t.value);
            batch.dones.push(t.done);
        }

        batch
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }

    pub fn is_full(&self) -> bool {
        self.transitions.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(reward: f32, done: bool) -> Transition {
        Transition {
            state: vec![reward; 3],
            action: 1,
            log_prob: -2.3,
            reward,
            value: 0.5,
            done,
        }
    }

    #[test]
    fn test_rollout_buffer() {
        let mut buffer = RolloutBuffer::new(4);
        assert!(buffer.is_empty());

        buffer.store(transition(1.0, false)).unwrap();
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_store_on_full_buffer_overflows() {
        let mut buffer = RolloutBuffer::new(2);
        buffer.store(transition(0.0, false)).unwrap();
        buffer.store(transition(0.0, false)).unwrap();
        assert!(buffer.is_full());

        let err = buffer.store(transition(0.0, false)).unwrap_err();
        assert!(matches!(err, AgentError::BufferOverflow { capacity: 2 }));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut buffer = RolloutBuffer::new(3);
        buffer.store(transition(1.0, false)).unwrap();

        buffer.clear();
        assert_eq!(buffer.len(), 0);
        buffer.clear();
        assert_eq!(buffer.len(), 0);

        buffer.store(transition(2.0, true)).unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_get_returns_snapshot() {
        let mut buffer = RolloutBuffer::new(3);
        buffer.store(transition(1.0, false)).unwrap();
        buffer.store(transition(2.0, true)).unwrap();

        let batch = buffer.get();
        buffer.clear();
        buffer.store(transition(9.0, false)).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rewards, vec![1.0, 2.0]);
        assert_eq!(batch.dones, vec![false, true]);
        assert_eq!(batch.states[1], vec![2.0; 3]);
    }
}
