//! State encoder for RL - converts WorldState to a flat feature vector

use crate::infra::Position;
use crate::state::{GRID_SIZE, PlayerId, PlayerState, WorldState};

/// Number of scalar features appended after the grid cells
pub const SCALAR_FEATURES: usize = 20;

/// Configuration for the state encoder
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Edge length of the encoded grid window (cells outside the world read as walls)
    pub grid_size: i32,
    /// Divisor for bomb fuse timers
    pub max_bomb_timer: f32,
    /// Divisor for the remaining soft wall count
    pub soft_wall_budget: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            max_bomb_timer: 3.0,
            soft_wall_budget: 50.0,
        }
    }
}

/// State encoder for converting WorldState to fixed-length feature vectors
#[derive(Debug, Clone)]
pub struct StateEncoder {
    config: EncoderConfig,
}

impl StateEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Length of every vector produced by [`encode`](Self::encode)
    pub fn feature_count(&self) -> usize {
        let side = self.config.grid_size.max(0) as usize;
        side * side + SCALAR_FEATURES
    }

    /// Encode the world from the point of view of `self_id`.
    ///
    /// Never fails: a missing or dead self still yields a full-length vector,
    /// and every normalized ratio is clamped into `[0, 1]`.
    pub fn encode(&self, world: &WorldState, self_id: PlayerId) -> Vec<f32> {
        let mut obs = Vec::with_capacity(self.feature_count());
        let size = self.config.grid_size;
        let scale = size.max(1) as f32;

        // Grid cells (raw tile codes)
        for y in 0..size {
            for x in 0..size {
                obs.push(world.grid.tile(&Position::new(x, y)).code());
            }
        }

        let fallback = PlayerState::new(self_id, Position::new(0, 0));
        let me = world.player(self_id).unwrap_or(&fallback);
        let pos = me.position;

        // Own position
        obs.push(ratio(pos.x as f32 / scale));
        obs.push(ratio(pos.y as f32 / scale));

        // Enemy position
        match world.find_enemy(self_id) {
            Some(enemy) => {
                obs.push(ratio(enemy.position.x as f32 / scale));
                obs.push(ratio(enemy.position.y as f32 / scale));
            }
            None => obs.extend_from_slice(&[0.5, 0.5]),
        }

        // Facing and speed
        obs.push(me.direction.index() as f32 / 3.0);
        obs.push(ratio(me.speed as f32 / 10.0));

        // Bomb availability
        obs.push(ratio(me.active_bombs as f32 / me.max_bombs.max(1) as f32));
        obs.push(if me.can_place_bomb() { 1.0 } else { 0.0 });

        obs.extend(self.nearest_bomb(world, pos, scale));
        obs.extend(Self::danger_directions(world, pos));
        obs.extend(Self::power_up_info(world, pos, scale));

        // Global progress
        obs.push(ratio(world.bombs.len() as f32 / 10.0));
        obs.push(ratio(
            1.0 - world.soft_wall_count() as f32 / self.config.soft_wall_budget,
        ));

        debug_assert_eq!(obs.len(), self.feature_count());
        obs
    }

    /// [distance, fuse, in blast range] for the closest bomb
    fn nearest_bomb(&self, world: &WorldState, pos: Position, scale: f32) -> [f32; 3] {
        let nearest = world
            .bombs
            .iter()
            .min_by_key(|bomb| bomb.position.distance(&pos));

        match nearest {
            Some(bomb) => [
                ratio(bomb.position.distance(&pos) as f32 / scale),
                ratio(bomb.timer.max(0.0) / self.config.max_bomb_timer),
                if bomb.covers(&pos) { 1.0 } else { 0.0 },
            ],
            None => [1.0, 0.0, 0.0],
        }
    }

    /// Imminent blasts reaching `pos` from above, below, left and right
    fn danger_directions(world: &WorldState, pos: Position) -> [f32; 4] {
        let mut dangers = [0.0; 4];

        for bomb in world.bombs.iter().filter(|b| b.is_imminent()) {
            let b = bomb.position;
            if pos.x == b.x {
                if pos.y > b.y && pos.y - b.y <= bomb.range {
                    dangers[0] = 1.0;
                } else if pos.y < b.y && b.y - pos.y <= bomb.range {
                    dangers[1] = 1.0;
                }
            }
            if pos.y == b.y {
                if pos.x > b.x && pos.x - b.x <= bomb.range {
                    dangers[2] = 1.0;
                } else if pos.x < b.x && b.x - pos.x <= bomb.range {
                    dangers[3] = 1.0;
                }
            }
        }

        dangers
    }

    /// [count, nearest distance, nearest kind]
    fn power_up_info(world: &WorldState, pos: Position, scale: f32) -> [f32; 3] {
        let nearest = world
            .power_ups
            .iter()
            .min_by_key(|p| p.position.distance(&pos));

        match nearest {
            Some(power_up) => [
                ratio(world.power_ups.len() as f32 / 10.0),
                ratio(power_up.position.distance(&pos) as f32 / scale),
                power_up.kind.index() as f32 / 2.0,
            ],
            None => [0.0, 1.0, 0.0],
        }
    }
}

fn ratio(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
