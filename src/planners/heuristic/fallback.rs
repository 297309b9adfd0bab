use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::Result;
use crate::infra::{AStar, Position, path_to_step};
use crate::planners::{Command, DecisionPolicy, UpdateStats};
use crate::state::{PlayerId, WorldState};

const STEPS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Flee, bomb, chase, wander - in that order of priority
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    self_id: PlayerId,
    rng: StdRng,
    /// Manhattan distance at which the enemy is considered in reach
    attack_range: i32,
    /// Chance of dropping a bomb when the enemy is in reach
    bomb_chance: f32,
}

impl FallbackPolicy {
    pub fn new(self_id: PlayerId, seed: u64) -> Self {
        Self {
            self_id,
            rng: StdRng::seed_from_u64(seed),
            attack_range: 3,
            bomb_chance: 0.8,
        }
    }

    pub fn self_id(&self) -> PlayerId {
        self.self_id
    }

    pub fn choose(&mut self, world: &WorldState) -> Command {
        let Some(me) = world.player(self.self_id).filter(|p| p.alive) else {
            return Command::STAY;
        };
        let pos = me.position;

        if world.in_danger(&pos) {
            debug!("Fallback: in danger at {:?}", pos);
            return self.safe_move(world, pos);
        }

        let enemy = world.find_enemy(self.self_id).map(|e| e.position);

        if let Some(target) = enemy {
            if pos.distance(&target) <= self.attack_range
                && me.can_place_bomb()
                && self.rng.random::<f32>() < self.bomb_chance
            {
                return Command::new(0, 0, true);
            }
            return self.move_toward(world, pos, target);
        }

        self.random_move(world, pos)
    }

    /// Step onto a neighbour outside every blast line, or hold still
    fn safe_move(&mut self, world: &WorldState, pos: Position) -> Command {
        let mut steps = STEPS;
        steps.shuffle(&mut self.rng);

        steps
            .iter()
            .map(|&(dx, dy)| (dx, dy, pos.offset(dx, dy)))
            .find(|(_, _, next)| world.is_walkable(next) && !world.in_blast_range(next))
            .map_or(Command::STAY, |(dx, dy, _)| Command::new(dx, dy, false))
    }

    fn move_toward(&mut self, world: &WorldState, pos: Position, target: Position) -> Command {
        let path = AStar::find_path(&world.grid, pos, target, |p| world.is_walkable(p));
        if let Some((dx, dy)) = path.and_then(|path| path_to_step(pos, &path)) {
            return Command::new(dx, dy, false);
        }

        // No route (walls in between): greedy axis step, x first
        let dx = (target.x - pos.x).signum();
        let dy = (target.y - pos.y).signum();
        if dx != 0 && world.is_walkable(&pos.offset(dx, 0)) {
            return Command::new(dx, 0, false);
        }
        if dy != 0 && world.is_walkable(&pos.offset(0, dy)) {
            return Command::new(0, dy, false);
        }

        self.random_move(world, pos)
    }

    fn random_move(&mut self, world: &WorldState, pos: Position) -> Command {
        let mut steps = [(0, -1), (0, 1), (-1, 0), (1, 0), (0, 0)];
        steps.shuffle(&mut self.rng);

        steps
            .iter()
            .find(|&&(dx, dy)| world.is_walkable(&pos.offset(dx, dy)))
            .map_or(Command::STAY, |&(dx, dy)| Command::new(dx, dy, false))
    }
}

impl DecisionPolicy for FallbackPolicy {
    fn decide(&mut self, world: &WorldState) -> Result<Command> {
        Ok(self.choose(world))
    }

    fn observe(&mut self, _reward: f32, _done: bool) -> Result<Option<UpdateStats>> {
        Ok(None)
    }
}
