//! Discrete-tick duel arena used for training and evaluation.
//!
//! Every tick each living player may step one tile and drop a bomb, then
//! fuses burn down by a fixed time slice, blasts spread, players standing in
//! flames die and power-ups are picked up.

use std::collections::HashMap;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::infra::{Direction, Position};
use crate::planners::Command;
use crate::state::{
    Bomb, Explosion, GRID_SIZE, Grid, PlayerId, PlayerState, PowerUp, PowerUpKind, Tile,
    WorldState,
};

/// Arena generation and timing
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub grid_size: i32,
    /// Chance that a free interior tile starts as a soft wall
    pub soft_wall_density: f32,
    /// Chance that a soft wall hides a power-up
    pub power_up_chance: f32,
    /// Seconds from placement to detonation
    pub bomb_timer: f32,
    /// Seconds a blast tile stays lethal
    pub explosion_duration: f32,
    /// Simulated seconds per tick
    pub tick_seconds: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            soft_wall_density: 0.05,
            power_up_chance: 0.6,
            bomb_timer: 3.0,
            explosion_duration: 0.5,
            tick_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Running,
    Won(PlayerId),
    Draw,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub bombs_placed: Vec<PlayerId>,
    pub soft_walls_destroyed: usize,
    pub power_ups_collected: Vec<(PlayerId, PowerUpKind)>,
    pub deaths: Vec<PlayerId>,
}

pub struct Arena {
    config: ArenaConfig,
    world: WorldState,
    /// Power-ups still buried under soft walls
    hidden: HashMap<Position, PowerUpKind>,
    rng: StdRng,
    outcome: Outcome,
    ticks: usize,
}

impl Arena {
    /// Two-player arena with starting corners (1, 1) and (n-2, n-2)
    pub fn new(config: ArenaConfig, seed: u64) -> Self {
        let mut arena = Self {
            world: WorldState::default(),
            hidden: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            outcome: Outcome::Running,
            ticks: 0,
            config,
        };
        arena.reset();
        arena
    }

    /// Fresh layout and players; the random stream continues
    pub fn reset(&mut self) {
        let size = self.config.grid_size;
        let mut grid = Grid::arena(size);
        self.hidden.clear();

        let safe_zones = [
            Position::new(1, 1),
            Position::new(2, 1),
            Position::new(1, 2),
            Position::new(size - 2, size - 2),
            Position::new(size - 3, size - 2),
            Position::new(size - 2, size - 3),
        ];

        for y in 1..size - 1 {
            for x in 1..size - 1 {
                let pos = Position::new(x, y);
                if grid.tile(&pos) != Tile::Empty || safe_zones.contains(&pos) {
                    continue;
                }
                if self.rng.random::<f32>() < self.config.soft_wall_density {
                    grid.set(pos, Tile::SoftWall);
                    if self.rng.random::<f32>() < self.config.power_up_chance {
                        let kind = PowerUpKind::from_index(self.rng.random_range(0..3));
                        self.hidden.insert(pos, kind);
                    }
                }
            }
        }

        self.world = WorldState::new(grid);
        self.world
            .players
            .push(PlayerState::new(0, Position::new(1, 1)));
        self.world
            .players
            .push(PlayerState::new(1, Position::new(size - 2, size - 2)));
        self.outcome = Outcome::Running;
        self.ticks = 0;
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Direct access for scenario setup
    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome != Outcome::Running
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn hidden_power_ups(&self) -> usize {
        self.hidden.len()
    }

    /// Apply the commands in order, then advance time by one tick
    pub fn step(&mut self, commands: &[(PlayerId, Command)]) -> TickReport {
        let mut report = TickReport::default();
        if self.is_over() {
            return report;
        }

        for &(id, command) in commands {
            self.apply(id, command, &mut report);
        }

        self.advance(&mut report);
        self.resolve_collisions(&mut report);
        self.update_outcome();
        self.ticks += 1;
        report
    }

    fn apply(&mut self, id: PlayerId, command: Command, report: &mut TickReport) {
        let Some(player) = self.world.player(id).filter(|p| p.alive) else {
            return;
        };
        let mut pos = player.position;

        if let Some(direction) = Direction::from_step(command.dx, command.dy) {
            let target = pos.offset(command.dx.signum(), command.dy.signum());
            let walkable = self.world.is_walkable(&target);
            if let Some(player) = self.world.player_mut(id) {
                player.direction = direction;
                if walkable {
                    player.position = target;
                    pos = target;
                }
            }
        }

        if command.place_bomb {
            let free = self.world.bomb_at(&pos).is_none();
            let bomb_timer = self.config.bomb_timer;
            if let Some(player) = self.world.player_mut(id) {
                if free && player.can_place_bomb() {
                    player.active_bombs += 1;
                    let range = player.bomb_range;
                    self.world.bombs.push(Bomb {
                        position: pos,
                        timer: bomb_timer,
                        range,
                        owner: Some(id),
                    });
                    report.bombs_placed.push(id);
                }
            }
        }
    }

    fn advance(&mut self, report: &mut TickReport) {
        let dt = self.config.tick_seconds;

        for bomb in self.world.bombs.iter_mut() {
            bomb.timer -= dt;
        }
        for explosion in self.world.explosions.iter_mut() {
            explosion.remaining -= dt;
        }
        self.world.explosions.retain(|e| e.remaining > 0.0);

        let (detonated, live): (Vec<Bomb>, Vec<Bomb>) = std::mem::take(&mut self.world.bombs)
            .into_iter()
            .partition(|b| b.timer <= 0.0);
        self.world.bombs = live;

        for bomb in detonated {
            if let Some(owner) = bomb.owner {
                if let Some(player) = self.world.player_mut(owner) {
                    player.active_bombs = player.active_bombs.saturating_sub(1);
                }
            }
            self.detonate(&bomb, report);
        }
    }

    /// Cross-shaped blast; walls stop it, soft walls are destroyed and stop it
    fn detonate(&mut self, bomb: &Bomb, report: &mut TickReport) {
        let duration = self.config.explosion_duration;
        self.world.explosions.push(Explosion {
            position: bomb.position,
            remaining: duration,
        });

        for (dx, dy) in [(0, -1), (0, 1), (-1, 0), (1, 0)] {
            for i in 1..=bomb.range {
                let pos = bomb.position.offset(dx * i, dy * i);
                match self.world.grid.tile(&pos) {
                    Tile::Wall => break,
                    Tile::SoftWall => {
                        self.world.explosions.push(Explosion {
                            position: pos,
                            remaining: duration,
                        });
                        self.world.grid.set(pos, Tile::Empty);
                        report.soft_walls_destroyed += 1;
                        if let Some(kind) = self.hidden.remove(&pos) {
                            self.world.power_ups.push(PowerUp {
                                position: pos,
                                kind,
                            });
                        }
                        break;
                    }
                    Tile::Empty => self.world.explosions.push(Explosion {
                        position: pos,
                        remaining: duration,
                    }),
                }
            }
        }
    }

    fn resolve_collisions(&mut self, report: &mut TickReport) {
        let WorldState {
            players,
            explosions,
            power_ups,
            ..
        } = &mut self.world;

        for player in players.iter_mut().filter(|p| p.alive) {
            if explosions.iter().any(|e| e.position == player.position) {
                player.alive = false;
                report.deaths.push(player.id);
                tracing::debug!("Player {} caught in a blast at {:?}", player.id, player.position);
            }
        }

        for player in players.iter_mut().filter(|p| p.alive) {
            if let Some(idx) = power_ups.iter().position(|p| p.position == player.position) {
                let power_up = power_ups.remove(idx);
                player.apply_power_up(power_up.kind);
                report.power_ups_collected.push((player.id, power_up.kind));
            }
        }
    }

    fn update_outcome(&mut self) {
        let alive: Vec<PlayerId> = self
            .world
            .players
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.id)
            .collect();

        self.outcome = match alive.as_slice() {
            [] => Outcome::Draw,
            [winner] if self.world.players.len() > 1 => Outcome::Won(*winner),
            _ => Outcome::Running,
        };
    }
}
