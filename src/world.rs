use serde::{Deserialize, Serialize};

use crate::{pos, Pos};

pub mod rule;

/// byte used by images for a live cell.
pub const ALIVE_BYTE: u8 = 255;
/// byte used by images for a dead cell.
pub const DEAD_BYTE: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cell {
    active: bool,
}

impl Cell {
    pub fn active() -> Self {
        Self { active: true }
    }

    pub fn inactive() -> Self {
        Self { active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            active: byte != DEAD_BYTE,
        }
    }

    pub fn to_byte(self) -> u8 {
        if self.active {
            ALIVE_BYTE
        } else {
            DEAD_BYTE
        }
    }
}

impl From<bool> for Cell {
    fn from(active: bool) -> Self {
        Self { active }
    }
}

/// A fixed-size toroidal board.
///
/// A row is the line of `height` cells sharing one `x` coordinate, rows are
/// indexed over the width. Cells of a row are stored contiguously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0, "grid dimensions must be positive");
        let cells = vec![Cell::inactive(); (width * height) as usize];
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn with_actives(width: i32, height: i32, actives: impl IntoIterator<Item = Pos>) -> Self {
        let mut grid = Self::new(width, height);
        for pos in actives {
            grid.set(pos, Cell::active());
        }
        grid
    }

    /// builds a grid from image bytes laid out `y` outer, `x` inner.
    pub fn from_bytes(width: i32, height: i32, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != (width * height) as usize {
            return None;
        }
        let mut grid = Self::new(width, height);
        for (index, byte) in bytes.iter().enumerate() {
            let index = index as i32;
            grid.set(pos!(index % width, index / width), Cell::from_byte(*byte));
        }
        Some(grid)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| pos!(x, y)))
            .map(|pos| self.get(pos).to_byte())
            .collect()
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn contains(&self, pos: Pos) -> bool {
        (0..self.width).contains(&pos.x) && (0..self.height).contains(&pos.y)
    }

    fn index(&self, pos: Pos) -> usize {
        assert!(
            self.contains(pos),
            "{pos:?} is outside of a {}x{} grid",
            self.width,
            self.height
        );
        (pos.x * self.height + pos.y) as usize
    }

    pub fn get(&self, pos: Pos) -> Cell {
        self.cells[self.index(pos)]
    }

    pub fn set(&mut self, pos: Pos, cell: Cell) {
        let index = self.index(pos);
        self.cells[index] = cell;
    }

    pub fn is_cell_alive(&self, pos: Pos) -> bool {
        self.get(pos).is_active()
    }

    /// every position of row `x`.
    pub fn row(&self, x: i32) -> impl Iterator<Item = Pos> {
        (0..self.height).map(move |y| pos!(x, y))
    }

    pub fn actives(&self) -> Vec<Pos> {
        (0..self.width)
            .flat_map(|x| self.row(x))
            .filter(|pos| self.is_cell_alive(*pos))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_active()).count()
    }
}
