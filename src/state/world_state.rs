use crate::infra::Position;

use super::map::{Grid, Tile};
use super::player_state::{PlayerId, PlayerState, PowerUpKind};

/// A bomb with less fuse than this (seconds) counts as an immediate threat
pub const DANGER_TIMER: f32 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Bomb {
    pub position: Position,
    /// Seconds until detonation
    pub timer: f32,
    pub range: i32,
    pub owner: Option<PlayerId>,
}

impl Bomb {
    /// Whether `pos` lies on this bomb's blast cross. Walls are not considered.
    pub fn covers(&self, pos: &Position) -> bool {
        (pos.x == self.position.x && (pos.y - self.position.y).abs() <= self.range)
            || (pos.y == self.position.y && (pos.x - self.position.x).abs() <= self.range)
    }

    pub fn is_imminent(&self) -> bool {
        self.timer < DANGER_TIMER
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Explosion {
    pub position: Position,
    /// Seconds the flame stays lethal
    pub remaining: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerUp {
    pub position: Position,
    pub kind: PowerUpKind,
}

/// Snapshot of the arena handed to agents every decision step
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldState {
    pub grid: Grid,
    pub players: Vec<PlayerState>,
    pub bombs: Vec<Bomb>,
    pub explosions: Vec<Explosion>,
    /// Visible power-ups, in discovery order
    pub power_ups: Vec<PowerUp>,
}

impl WorldState {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            ..Default::default()
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// First living player other than `self_id`
    pub fn find_enemy(&self, self_id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id != self_id && p.alive)
    }

    pub fn bomb_at(&self, pos: &Position) -> Option<&Bomb> {
        self.bombs.iter().find(|b| b.position == *pos)
    }

    pub fn power_up_at(&self, pos: &Position) -> Option<&PowerUp> {
        self.power_ups.iter().find(|p| p.position == *pos)
    }

    /// Free of walls, soft walls and bombs
    pub fn is_walkable(&self, pos: &Position) -> bool {
        !self.grid.tile(pos).is_solid() && self.bomb_at(pos).is_none()
    }

    /// Whether any bomb's blast cross reaches `pos`, regardless of its fuse
    pub fn in_blast_range(&self, pos: &Position) -> bool {
        self.bombs.iter().any(|b| b.covers(pos))
    }

    /// Standing in flames or on the cross of a bomb about to go off
    pub fn in_danger(&self, pos: &Position) -> bool {
        self.explosions.iter().any(|e| e.position == *pos)
            || self.bombs.iter().any(|b| b.is_imminent() && b.covers(pos))
    }

    pub fn soft_wall_count(&self) -> usize {
        self.grid.count(Tile::SoftWall)
    }

    /// Walkable orthogonal neighbours of `pos`
    pub fn escape_routes(&self, pos: &Position) -> usize {
        pos.neighbors()
            .iter()
            .filter(|n| self.is_walkable(n))
            .count()
    }
}
