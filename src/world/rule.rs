use crate::{pos, Cell, Grid, Pos};

/// What happens to a single cell between two generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Die,
    Birth,
}

/// the eight surrounding positions, wrapped around the torus.
pub fn get_neighbors(grid: &Grid, pos: Pos) -> impl Iterator<Item = Pos> + '_ {
    (-1..=1)
        .flat_map(|x| (-1..=1).map(move |y| pos!(x, y)))
        .filter(|offset| *offset != pos!(0, 0))
        .map(move |offset| (pos + offset).wrap(grid.width(), grid.height()))
}

pub fn neighbor_count(grid: &Grid, pos: Pos) -> usize {
    get_neighbors(grid, pos)
        .filter(|neighbor| grid.is_cell_alive(*neighbor))
        .count()
}

/// Value of `pos` in the generation following `grid`.
///
/// Pure function of the snapshot, safe to call from many threads at once.
/// Panics when `pos` is outside of the grid.
pub fn next_state(grid: &Grid, pos: Pos) -> Cell {
    let is_active = grid.is_cell_alive(pos);
    match (is_active, neighbor_count(grid, pos)) {
        (true, count) if count < 2 || count > 3 => Cell::inactive(), // dies
        (true, _) => Cell::active(),                                 // stays
        (false, 3) => Cell::active(),                                // becomes alive
        _ => Cell::inactive(),                                       // stays dead
    }
}

pub fn transition(grid: &Grid, pos: Pos) -> Transition {
    match (grid.is_cell_alive(pos), next_state(grid, pos).is_active()) {
        (true, false) => Transition::Die,
        (false, true) => Transition::Birth,
        _ => Transition::Stay,
    }
}
