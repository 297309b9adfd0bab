use crate::infra::Position;

/// Default arena edge length
pub const GRID_SIZE: i32 = 13;

/// Static tile contents. The discriminants are the raw codes fed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tile {
    #[default]
    Empty = 0,
    Wall = 1,
    SoftWall = 2,
}

impl Tile {
    pub fn code(&self) -> f32 {
        *self as u8 as f32
    }

    pub fn is_solid(&self) -> bool {
        matches!(self, Tile::Wall | Tile::SoftWall)
    }
}

/// Square tile grid, row-major
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    pub size: i32,
    tiles: Vec<Tile>,
}

impl Grid {
    pub fn new(size: i32) -> Self {
        Self {
            size,
            tiles: vec![Tile::Empty; (size * size) as usize],
        }
    }

    /// Border walls plus indestructible pillars on every even interior cell
    pub fn arena(size: i32) -> Self {
        let mut grid = Self::new(size);
        for y in 0..size {
            for x in 0..size {
                let border = x == 0 || y == 0 || x == size - 1 || y == size - 1;
                let pillar = x % 2 == 0 && y % 2 == 0;
                if border || pillar {
                    grid.set(Position::new(x, y), Tile::Wall);
                }
            }
        }
        grid
    }

    pub fn contains(&self, pos: &Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.size && pos.y < self.size
    }

    /// Tile at `pos`; anything outside the grid reads as a wall
    pub fn tile(&self, pos: &Position) -> Tile {
        if !self.contains(pos) {
            return Tile::Wall;
        }
        self.tiles[self.index(pos)]
    }

    pub fn set(&mut self, pos: Position, tile: Tile) {
        if self.contains(&pos) {
            let index = self.index(&pos);
            self.tiles[index] = tile;
        }
    }

    pub fn cell_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn count(&self, tile: Tile) -> usize {
        self.tiles.iter().filter(|&&t| t == tile).count()
    }

    /// Tiles in row-major order
    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    fn index(&self, pos: &Position) -> usize {
        (pos.y * self.size + pos.x) as usize
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::arena(GRID_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_layout() {
        let grid = Grid::arena(GRID_SIZE);
        assert_eq!(grid.cell_count(), 169);
        assert_eq!(grid.tile(&Position::new(0, 5)), Tile::Wall);
        assert_eq!(grid.tile(&Position::new(2, 2)), Tile::Wall);
        assert_eq!(grid.tile(&Position::new(1, 1)), Tile::Empty);
        assert_eq!(grid.tile(&Position::new(-1, 3)), Tile::Wall);
    }

    #[test]
    fn test_set_ignores_out_of_bounds() {
        let mut grid = Grid::new(3);
        grid.set(Position::new(5, 5), Tile::SoftWall);
        assert_eq!(grid.count(Tile::SoftWall), 0);
        grid.set(Position::new(1, 1), Tile::SoftWall);
        assert_eq!(grid.count(Tile::SoftWall), 1);
    }
}
