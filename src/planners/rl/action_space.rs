//! Static discrete action table - maps network output indices to game commands

use crate::error::{AgentError, Result};

/// Number of discrete actions; the policy head must have exactly this many units
pub const ACTION_COUNT: usize = 10;

/// A single game command: an axis-aligned step and an optional bomb drop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Command {
    pub dx: i32,
    pub dy: i32,
    pub place_bomb: bool,
}

impl Command {
    pub const STAY: Command = Command::new(0, 0, false);

    pub const fn new(dx: i32, dy: i32, place_bomb: bool) -> Self {
        Self { dx, dy, place_bomb }
    }

    pub fn as_tuple(&self) -> (i32, i32, bool) {
        (self.dx, self.dy, self.place_bomb)
    }
}

/// Index -> command lookup. Never mutated at runtime.
pub const ACTION_TABLE: [Command; ACTION_COUNT] = [
    Command::new(0, 0, false),  // 0: stay
    Command::new(0, -1, false), // 1: up
    Command::new(0, 1, false),  // 2: down
    Command::new(-1, 0, false), // 3: left
    Command::new(1, 0, false),  // 4: right
    Command::new(0, 0, true),   // 5: bomb
    Command::new(0, -1, true),  // 6: bomb + up
    Command::new(0, 1, true),   // 7: bomb + down
    Command::new(-1, 0, true),  // 8: bomb + left
    Command::new(1, 0, true),   // 9: bomb + right
];

pub struct ActionSpace;

impl ActionSpace {
    pub fn size() -> usize {
        ACTION_COUNT
    }

    /// Look up the command for a network output index
    pub fn decode(index: usize) -> Result<Command> {
        ACTION_TABLE
            .get(index)
            .copied()
            .ok_or(AgentError::InvalidActionIndex {
                index,
                size: ACTION_COUNT,
            })
    }

    /// Reverse lookup, `None` for diagonal or oversized steps
    pub fn encode(command: &Command) -> Option<usize> {
        ACTION_TABLE.iter().position(|c| c == command)
    }

    /// Startup check that a policy head with `units` outputs matches the table
    pub fn ensure_output_units(units: usize) -> Result<()> {
        if units == ACTION_COUNT {
            Ok(())
        } else {
            Err(AgentError::InvalidActionIndex {
                index: units.min(ACTION_COUNT),
                size: ACTION_COUNT,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_axis_aligned() {
        for command in ACTION_TABLE {
            assert!(command.dx.abs() + command.dy.abs() <= 1);
        }
        let bombs = ACTION_TABLE.iter().filter(|c| c.place_bomb).count();
        assert_eq!(bombs, 5);
    }

    #[test]
    fn test_decode_bounds() {
        assert_eq!(ActionSpace::decode(0).unwrap(), Command::STAY);
        assert_eq!(ActionSpace::decode(9).unwrap().as_tuple(), (1, 0, true));
        assert!(matches!(
            ActionSpace::decode(ACTION_COUNT),
            Err(AgentError::InvalidActionIndex { index: 10, size: 10 })
        ));
    }

    #[test]
    fn test_encode_inverts_decode() {
        for index in 0..ACTION_COUNT {
            let command = ActionSpace::decode(index).unwrap();
            assert_eq!(ActionSpace::encode(&command), Some(index));
        }
        assert_eq!(ActionSpace::encode(&Command::new(1, 1, false)), None);
    }

    #[test]
    fn test_output_unit_check() {
        assert!(ActionSpace::ensure_output_units(ACTION_COUNT).is_ok());
        assert!(ActionSpace::ensure_output_units(12).is_err());
        assert!(ActionSpace::ensure_output_units(4).is_err());
    }
}
