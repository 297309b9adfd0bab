#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn neighbors(&self) -> [Position; 4] {
        [
            Position::new(self.x, self.y - 1), // Up
            Position::new(self.x, self.y + 1), // Down
            Position::new(self.x - 1, self.y), // Left
            Position::new(self.x + 1, self.y), // Right
        ]
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    pub fn is_adjacent(&self, other: &Position) -> bool {
        self.distance(other) == 1
    }
}

/// Facing direction of a player, in the order used by the feature encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    /// Direction implied by a unit step; `None` for (0, 0)
    pub fn from_step(dx: i32, dy: i32) -> Option<Self> {
        if dx != 0 {
            Some(if dx > 0 {
                Direction::Right
            } else {
                Direction::Left
            })
        } else if dy != 0 {
            Some(if dy > 0 {
                Direction::Down
            } else {
                Direction::Up
            })
        } else {
            None
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }
}
