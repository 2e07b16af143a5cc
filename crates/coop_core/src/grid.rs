//! Static grid map: walkability, directional walls and 4-connected adjacency.
//!
//! Coordinates are 1-based, `(1, 1)` is the top-left cell and `(rows, cols)`
//! the bottom-right one. A grid is immutable once built; everything in the
//! planning core borrows it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};

/// A grid coordinate. Carries no payload; walkability comes from the [`GridWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub row: i32,
    pub col: i32,
}

impl Cell {
    #[inline]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Manhattan distance, the admissible heuristic for unit-cost cardinal moves.
    #[inline]
    pub fn manhattan(self, other: Cell) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    #[inline]
    pub fn step(self, dir: Direction) -> Cell {
        let (dr, dc) = dir.offset();
        Cell::new(self.row + dr, self.col + dc)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

impl From<(i32, i32)> for Cell {
    fn from((row, col): (i32, i32)) -> Self {
        Cell::new(row, col)
    }
}

/// Cardinal move directions. Diagonals are never generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// Expansion order used by [`GridWorld::neighbors`].
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    #[inline]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (-1, 0),
            Direction::East => (0, 1),
            Direction::South => (1, 0),
            Direction::West => (0, -1),
        }
    }

    #[inline]
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    #[inline]
    const fn bit(self) -> u8 {
        match self {
            Direction::North => 1 << 0,
            Direction::East => 1 << 1,
            Direction::South => 1 << 2,
            Direction::West => 1 << 3,
        }
    }
}

/// Fixed-size walkability field with optional per-cell wall bitmask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridWorld {
    rows: i32,
    cols: i32,
    blocked: Vec<bool>,
    walls: Vec<u8>,
}

impl GridWorld {
    /// An obstacle-free `rows × cols` grid.
    pub fn open(rows: i32, cols: i32) -> Result<Self> {
        if rows <= 0 || cols <= 0 {
            return Err(PlanError::invalid(format!(
                "grid dimensions must be positive, got {rows}x{cols}"
            )));
        }
        let len = rows as usize * cols as usize;
        Ok(Self {
            rows,
            cols,
            blocked: vec![false; len],
            walls: vec![0; len],
        })
    }

    /// A grid with the listed cells blocked. Out-of-range obstacles are a configuration error.
    pub fn with_obstacles<I>(rows: i32, cols: i32, obstacles: I) -> Result<Self>
    where
        I: IntoIterator<Item = Cell>,
    {
        let mut grid = Self::open(rows, cols)?;
        for cell in obstacles {
            let idx = grid
                .slot(cell)
                .ok_or_else(|| PlanError::invalid(format!("obstacle {cell} is outside the grid")))?;
            grid.blocked[idx] = true;
        }
        Ok(grid)
    }

    /// Parses an ASCII map: `#` is an obstacle, any other character is free.
    ///
    /// Blank leading/trailing lines are ignored; every remaining row must have
    /// the same width.
    pub fn from_ascii(map: &str) -> Result<Self> {
        let lines: Vec<&str> = map
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .skip_while(|l| l.trim().is_empty())
            .collect();
        let lines: Vec<&str> = match lines.iter().rposition(|l| !l.trim().is_empty()) {
            Some(last) => lines[..=last].to_vec(),
            None => return Err(PlanError::invalid("map is empty")),
        };

        let cols = lines[0].chars().count();
        let mut obstacles = Vec::new();
        for (r, line) in lines.iter().enumerate() {
            if line.chars().count() != cols {
                return Err(PlanError::invalid(format!(
                    "map row {} has width {}, expected {cols}",
                    r + 1,
                    line.chars().count()
                )));
            }
            for (c, ch) in line.chars().enumerate() {
                if ch == '#' {
                    obstacles.push(Cell::new(r as i32 + 1, c as i32 + 1));
                }
            }
        }
        Self::with_obstacles(lines.len() as i32, cols as i32, obstacles)
    }

    /// Adds directional walls. Each wall closes the passage from both sides,
    /// so adjacency stays symmetric.
    pub fn with_walls<I>(mut self, walls: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Cell, Direction)>,
    {
        for (cell, dir) in walls {
            let idx = self
                .slot(cell)
                .ok_or_else(|| PlanError::invalid(format!("wall at {cell} is outside the grid")))?;
            self.walls[idx] |= dir.bit();
            if let Some(other) = self.slot(cell.step(dir)) {
                self.walls[other] |= dir.opposite().bit();
            }
        }
        Ok(self)
    }

    #[inline]
    pub fn rows(&self) -> i32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> i32 {
        self.cols
    }

    /// Number of cells, walkable or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        (1..=self.rows).contains(&cell.row) && (1..=self.cols).contains(&cell.col)
    }

    #[inline]
    fn slot(&self, cell: Cell) -> Option<usize> {
        self.contains(cell)
            .then(|| (cell.row - 1) as usize * self.cols as usize + (cell.col - 1) as usize)
    }

    /// Dense row-major index, used as the key of bitmap cell sets.
    #[inline]
    pub fn index(&self, cell: Cell) -> Option<u32> {
        self.slot(cell).map(|i| i as u32)
    }

    /// Inverse of [`GridWorld::index`].
    #[inline]
    pub fn cell_at(&self, index: u32) -> Option<Cell> {
        let index = index as usize;
        (index < self.len()).then(|| {
            let cols = self.cols as usize;
            Cell::new((index / cols) as i32 + 1, (index % cols) as i32 + 1)
        })
    }

    /// In range and not an obstacle.
    #[inline]
    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.slot(cell).is_some_and(|i| !self.blocked[i])
    }

    /// Walkable cardinal neighbours in [`Direction::ALL`] order.
    pub fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        let mask = self.slot(cell).map_or(0b1111, |i| self.walls[i]);
        let origin_ok = self.is_walkable(cell);
        Direction::ALL.into_iter().filter_map(move |dir| {
            if !origin_ok || mask & dir.bit() != 0 {
                return None;
            }
            let next = cell.step(dir);
            self.is_walkable(next).then_some(next)
        })
    }

    /// All walkable cells in row-major order.
    pub fn free_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.len() as u32).filter_map(|i| self.cell_at(i).filter(|c| self.is_walkable(*c)))
    }

    pub fn free_count(&self) -> usize {
        self.blocked.iter().filter(|b| !**b).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(grid: &GridWorld, cell: Cell) -> Vec<Cell> {
        let mut n: Vec<_> = grid.neighbors(cell).collect();
        n.sort();
        n
    }

    #[test]
    fn corner_has_two_neighbors() {
        let grid = GridWorld::open(3, 3).unwrap();
        assert_eq!(
            sorted(&grid, Cell::new(1, 1)),
            vec![Cell::new(1, 2), Cell::new(2, 1)]
        );
        assert_eq!(grid.neighbors(Cell::new(2, 2)).count(), 4);
    }

    #[test]
    fn obstacles_and_out_of_range_are_excluded() {
        let grid = GridWorld::with_obstacles(3, 3, [Cell::new(1, 2)]).unwrap();
        assert!(!grid.is_walkable(Cell::new(1, 2)));
        assert!(!grid.is_walkable(Cell::new(0, 1)));
        assert!(!grid.is_walkable(Cell::new(4, 4)));
        assert_eq!(sorted(&grid, Cell::new(1, 1)), vec![Cell::new(2, 1)]);
        assert_eq!(grid.neighbors(Cell::new(9, 9)).count(), 0);
    }

    #[test]
    fn walls_close_both_sides() {
        let grid = GridWorld::open(2, 2)
            .unwrap()
            .with_walls([(Cell::new(1, 1), Direction::East)])
            .unwrap();
        assert!(!grid.neighbors(Cell::new(1, 1)).any(|c| c == Cell::new(1, 2)));
        assert!(!grid.neighbors(Cell::new(1, 2)).any(|c| c == Cell::new(1, 1)));
        assert!(grid.neighbors(Cell::new(1, 1)).any(|c| c == Cell::new(2, 1)));
    }

    #[test]
    fn ascii_map_round_trips_dimensions() {
        let grid = GridWorld::from_ascii("\n..#\n.#.\n...\n\n").unwrap();
        assert_eq!((grid.rows(), grid.cols()), (3, 3));
        assert!(!grid.is_walkable(Cell::new(1, 3)));
        assert!(!grid.is_walkable(Cell::new(2, 2)));
        assert_eq!(grid.free_count(), 7);
        assert_eq!(grid.free_cells().next(), Some(Cell::new(1, 1)));
    }

    #[test]
    fn ragged_or_empty_maps_are_rejected() {
        assert!(matches!(
            GridWorld::from_ascii("...\n..\n"),
            Err(PlanError::InvalidConfiguration(_))
        ));
        assert!(GridWorld::from_ascii("   \n").is_err());
        assert!(GridWorld::open(0, 4).is_err());
        assert!(GridWorld::with_obstacles(2, 2, [Cell::new(3, 1)]).is_err());
    }

    #[test]
    fn index_is_dense_row_major() {
        let grid = GridWorld::open(2, 3).unwrap();
        assert_eq!(grid.index(Cell::new(1, 1)), Some(0));
        assert_eq!(grid.index(Cell::new(2, 3)), Some(5));
        assert_eq!(grid.index(Cell::new(3, 1)), None);
        assert_eq!(grid.cell_at(4), Some(Cell::new(2, 2)));
        assert_eq!(grid.cell_at(6), None);
    }
}
