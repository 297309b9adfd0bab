use crate::infra::{Direction, Position};

pub type PlayerId = usize;

const MAX_BOMBS_CAP: u32 = 8;
const BOMB_RANGE_CAP: i32 = 10;
const SPEED_CAP: u32 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub position: Position,
    pub alive: bool,
    pub direction: Direction,
    /// Tiles per second, only used as a feature
    pub speed: u32,
    pub active_bombs: u32,
    pub max_bombs: u32,
    pub bomb_range: i32,
}

impl PlayerState {
    pub fn new(id: PlayerId, pos: Position) -> Self {
        Self {
            id,
            position: pos,
            alive: true,
            direction: Direction::Down,
            speed: 4,
            active_bombs: 0,
            max_bombs: 1,
            bomb_range: 2,
        }
    }

    pub fn can_place_bomb(&self) -> bool {
        self.alive && self.active_bombs < self.max_bombs
    }

    pub fn apply_power_up(&mut self, kind: PowerUpKind) {
        match kind {
            PowerUpKind::BombUp => self.max_bombs = (self.max_bombs + 1).min(MAX_BOMBS_CAP),
            PowerUpKind::FireUp => self.bomb_range = (self.bomb_range + 1).min(BOMB_RANGE_CAP),
            PowerUpKind::SpeedUp => self.speed = (self.speed + 1).min(SPEED_CAP),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerUpKind {
    BombUp,
    FireUp,
    SpeedUp,
}

impl PowerUpKind {
    pub fn index(&self) -> usize {
        match self {
            PowerUpKind::BombUp => 0,
            PowerUpKind::FireUp => 1,
            PowerUpKind::SpeedUp => 2,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % 3 {
            0 => PowerUpKind::BombUp,
            1 => PowerUpKind::FireUp,
            _ => PowerUpKind::SpeedUp,
        }
    }
}
