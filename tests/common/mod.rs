#![allow(dead_code)]

use golrs_dist::{pos, Grid, Params, WorkerPool};

pub fn params(width: i32, height: i32, turns: u64, partitions: usize) -> Params {
    Params {
        turns,
        threads: 3,
        width,
        height,
        partitions,
    }
}

/// deterministic soup, roughly a third of the cells alive.
pub fn soup(width: i32, height: i32, seed: u64) -> Grid {
    let mut state = seed;
    let mut actives = vec![];
    for y in 0..height {
        for x in 0..width {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            if (state >> 33) % 3 == 0 {
                actives.push(pos!(x, y));
            }
        }
    }
    Grid::with_actives(width, height, actives)
}

/// the board after `turns` generations computed on one node.
pub fn reference(grid: &Grid, turns: u64) -> Grid {
    let pool = WorkerPool::new(2);
    let mut grid = grid.clone();
    for _ in 0..turns {
        pool.step(&grid).apply(&mut grid);
    }
    grid
}
