//! RL Environment - the duel arena seen from one player, with shaped rewards

use crate::error::Result;
use crate::game::{Arena, ArenaConfig, Outcome, TickReport};
use crate::planners::DecisionPolicy;
use crate::planners::heuristic::FallbackPolicy;
use crate::state::{PlayerId, WorldState};

use super::action_space::Command;

/// Reward shaping weights
#[derive(Debug, Clone)]
pub struct RewardConfig {
    pub win: f32,
    pub death: f32,
    /// Added every step (negative encourages finishing quickly)
    pub step: f32,
    /// Per soft wall destroyed this step
    pub soft_wall: f32,
    pub power_up: f32,
    /// Magnitude of the bonus / penalty for closing / opening the distance
    pub approach: f32,
    /// Bomb placed within `bomb_near_distance` of the enemy
    pub bomb_near_enemy: f32,
    pub bomb_near_distance: i32,
    /// Bomb placed with fewer than two walkable neighbours
    pub unsafe_bomb: f32,
    /// Leaving a threatened tile
    pub escape_danger: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            win: 200.0,
            death: -200.0,
            step: -0.5,
            soft_wall: 20.0,
            power_up: 10.0,
            approach: 5.0,
            bomb_near_enemy: 15.0,
            bomb_near_distance: 3,
            unsafe_bomb: -20.0,
            escape_danger: 30.0,
        }
    }
}

/// Environment configuration
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Maximum steps per episode
    pub max_steps: usize,
    pub arena: ArenaConfig,
    pub rewards: RewardConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            max_steps: 300,
            arena: ArenaConfig::default(),
            rewards: RewardConfig::default(),
        }
    }
}

/// Step result from the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    pub reward: f32,
    /// Someone died
    pub done: bool,
    /// Hit max steps
    pub truncated: bool,
    pub info: StepInfo,
}

/// Additional information from a step
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    pub steps: usize,
    pub won: bool,
    pub died: bool,
    pub soft_walls_destroyed: usize,
    pub power_ups_collected: usize,
}

/// What the shaping compares against after the tick
#[derive(Debug, Clone, Copy)]
struct Before {
    enemy_distance: Option<i32>,
    in_danger: bool,
}

/// Single-agent duel: the learner plays `AGENT_ID`, a scripted policy plays the other side
pub struct RLEnv {
    arena: Arena,
    config: EnvConfig,
    opponent: Box<dyn DecisionPolicy>,
    steps: usize,
}

impl RLEnv {
    pub const AGENT_ID: PlayerId = 0;
    pub const OPPONENT_ID: PlayerId = 1;

    /// Environment with the fallback rules as opponent
    pub fn new(config: EnvConfig, seed: u64) -> Self {
        let opponent = FallbackPolicy::new(Self::OPPONENT_ID, seed.wrapping_add(7919));
        Self::with_opponent(config, seed, Box::new(opponent))
    }

    pub fn with_opponent(config: EnvConfig, seed: u64, opponent: Box<dyn DecisionPolicy>) -> Self {
        Self {
            arena: Arena::new(config.arena.clone(), seed),
            config,
            opponent,
            steps: 0,
        }
    }

    /// Start a new episode on a fresh layout
    pub fn reset(&mut self) -> &WorldState {
        self.arena.reset();
        self.steps = 0;
        self.arena.world()
    }

    pub fn world(&self) -> &WorldState {
        self.arena.world()
    }

    pub fn outcome(&self) -> Outcome {
        self.arena.outcome()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Agent acts first, then the opponent, then time advances one tick
    pub fn step(&mut self, command: Command) -> Result<StepResult> {
        let before = self.snapshot();

        let mut commands = vec![(Self::AGENT_ID, command)];
        let opponent_alive = self
            .world()
            .player(Self::OPPONENT_ID)
            .is_some_and(|p| p.alive);
        if opponent_alive {
            let reply = self.opponent.decide(self.arena.world())?;
            commands.push((Self::OPPONENT_ID, reply));
        }

        let report = self.arena.step(&commands);
        self.steps += 1;

        let reward = self.shape_reward(&before, &report);
        let died = !self.agent_alive();
        let won = matches!(self.arena.outcome(), Outcome::Won(id) if id == Self::AGENT_ID);
        let done = self.arena.is_over();
        let truncated = !done && self.steps >= self.config.max_steps;

        Ok(StepResult {
            reward,
            done,
            truncated,
            info: StepInfo {
                steps: self.steps,
                won,
                died,
                soft_walls_destroyed: report.soft_walls_destroyed,
                power_ups_collected: report
                    .power_ups_collected
                    .iter()
                    .filter(|(id, _)| *id == Self::AGENT_ID)
                    .count(),
            },
        })
    }

    fn agent_alive(&self) -> bool {
        self.world()
            .player(Self::AGENT_ID)
            .is_some_and(|p| p.alive)
    }

    fn enemy_distance(&self) -> Option<i32> {
        let world = self.world();
        let me = world.player(Self::AGENT_ID)?;
        let enemy = world.find_enemy(Self::AGENT_ID)?;
        Some(me.position.distance(&enemy.position))
    }

    fn snapshot(&self) -> Before {
        let in_danger = self
            .world()
            .player(Self::AGENT_ID)
            .is_some_and(|p| self.world().in_danger(&p.position));
        Before {
            enemy_distance: self.enemy_distance(),
            in_danger,
        }
    }

    fn shape_reward(&self, before: &Before, report: &TickReport) -> f32 {
        let weights = &self.config.rewards;
        let world = self.world();

        if !self.agent_alive() {
            return weights.death;
        }
        let enemy_alive = world
            .player(Self::OPPONENT_ID)
            .is_some_and(|p| p.alive);
        if !enemy_alive {
            return weights.win;
        }

        let mut reward = weights.step;
        reward += weights.soft_wall * report.soft_walls_destroyed as f32;

        let collected = report
            .power_ups_collected
            .iter()
            .any(|(id, _)| *id == Self::AGENT_ID);
        if collected {
            reward += weights.power_up;
        }

        let distance = self.enemy_distance();
        if let (Some(prev), Some(now)) = (before.enemy_distance, distance) {
            if now < prev {
                reward += weights.approach;
            } else if now > prev {
                reward -= weights.approach;
            }
        }

        if report.bombs_placed.contains(&Self::AGENT_ID) {
            if distance.is_some_and(|d| d <= weights.bomb_near_distance) {
                reward += weights.bomb_near_enemy;
            }
            let escape_routes = world
                .player(Self::AGENT_ID)
                .map_or(0, |p| world.escape_routes(&p.position));
            if escape_routes < 2 {
                reward += weights.unsafe_bomb;
            }
        }

        if before.in_danger {
            let safe_now = world
                .player(Self::AGENT_ID)
                .is_some_and(|p| !world.in_danger(&p.position));
            if safe_now {
                reward += weights.escape_danger;
            }
        }

        reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::Position;
    use crate::state::{Bomb, Tile};

    /// Opponent that never moves
    struct Statue;

    impl DecisionPolicy for Statue {
        fn decide(&mut self, _world: &WorldState) -> Result<Command> {
            Ok(Command::STAY)
        }

        fn observe(
            &mut self,
            _reward: f32,
            _done: bool,
        ) -> Result<Option<crate::planners::UpdateStats>> {
            Ok(None)
        }
    }

    fn open_env() -> RLEnv {
        let config = EnvConfig {
            arena: ArenaConfig {
                soft_wall_density: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        RLEnv::with_opponent(config, 3, Box::new(Statue))
    }

    #[test]
    fn test_approach_and_retreat() {
        let mut env = open_env();
        let closer = env.step(Command::new(1, 0, false)).unwrap();
        assert!((closer.reward - (-0.5 + 5.0)).abs() < 1e-6);

        let away = env.step(Command::new(-1, 0, false)).unwrap();
        assert!((away.reward - (-0.5 - 5.0)).abs() < 1e-6);

        // Blocked by the border: distance unchanged
        let blocked = env.step(Command::new(0, -1, false)).unwrap();
        assert!((blocked.reward + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cornered_bomb_is_penalized() {
        let mut env = open_env();
        // (1, 1) has two open neighbours, so bombing there is allowed
        let result = env.step(Command::new(0, 0, true)).unwrap();
        assert!((result.reward + 0.5).abs() < 1e-6);

        let mut env = open_env();
        env.arena
            .world_mut()
            .grid
            .set(Position::new(2, 1), Tile::SoftWall);
        let result = env.step(Command::new(0, 0, true)).unwrap();
        assert!((result.reward - (-0.5 - 20.0)).abs() < 1e-6);
    }

    #[test]
    fn test_bomb_near_enemy_bonus() {
        let mut env = open_env();
        env.arena.world_mut().players[1].position = Position::new(3, 1);
        let result = env.step(Command::new(0, 0, true)).unwrap();
        assert!((result.reward - (-0.5 + 15.0)).abs() < 1e-6);
    }

    #[test]
    fn test_escaping_danger_is_rewarded() {
        let mut env = open_env();
        env.arena.world_mut().bombs.push(Bomb {
            position: Position::new(1, 3),
            timer: 1.0,
            range: 2,
            owner: None,
        });
        // (1, 1) is on the bomb's column; stepping right leaves it and also
        // closes in on the enemy
        let result = env.step(Command::new(1, 0, false)).unwrap();
        assert!((result.reward - (-0.5 + 5.0 + 30.0)).abs() < 1e-6);
    }

    #[test]
    fn test_death_ends_episode() {
        let mut env = open_env();
        env.arena.world_mut().bombs.push(Bomb {
            position: Position::new(1, 1),
            timer: 0.05,
            range: 1,
            owner: None,
        });
        let result = env.step(Command::STAY).unwrap();
        assert_eq!(result.reward, -200.0);
        assert!(result.done);
        assert!(result.info.died);
        assert!(!result.info.won);
    }

    #[test]
    fn test_truncation_at_max_steps() {
        let config = EnvConfig {
            max_steps: 3,
            arena: ArenaConfig {
                soft_wall_density: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut env = RLEnv::with_opponent(config, 1, Box::new(Statue));
        let results: Vec<StepResult> = (0..3).map(|_| env.step(Command::STAY).unwrap()).collect();
        assert!(!results[1].truncated);
        assert!(results[2].truncated);
        assert!(!results[2].done);

        env.reset();
        assert_eq!(env.steps(), 0);
    }

    #[test]
    fn test_default_opponent_plays() {
        let mut env = RLEnv::new(EnvConfig::default(), 5);
        let start = env.world().players[1].position;
        for _ in 0..5 {
            env.step(Command::STAY).unwrap();
        }
        assert_ne!(env.world().players[1].position, start);
    }
}
