mod map;
mod player_state;
mod world_state;

pub use map::{GRID_SIZE, Grid, Tile};
pub use player_state::{PlayerId, PlayerState, PowerUpKind};
pub use world_state::{Bomb, DANGER_TIMER, Explosion, PowerUp, WorldState};
