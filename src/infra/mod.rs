mod pathfinding;
mod types;

pub use pathfinding::AStar;
pub use types::{Direction, Position};

// ============================================================================
// Helper functions
// ============================================================================

/// Unit step `(dx, dy)` from `current` toward the second node of `path`
pub fn path_to_step(current: Position, path: &[Position]) -> Option<(i32, i32)> {
    if path.len() < 2 {
        return None;
    }
    let next = path[1];

    let dx = (next.x - current.x).signum();
    let dy = (next.y - current.y).signum();
    if dx != 0 && dy != 0 {
        return None;
    }
    if dx == 0 && dy == 0 { None } else { Some((dx, dy)) }
}
