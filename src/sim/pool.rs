use std::{ops::Range, sync::mpsc, thread};

use parking_lot::Mutex;

use crate::{
    world::rule::{self, Transition},
    Cell, Grid, Pos,
};

/// Cells changed by one generation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delta {
    pub died: Vec<Pos>,
    pub born: Vec<Pos>,
}

impl Delta {
    pub fn apply(&self, grid: &mut Grid) {
        for pos in &self.died {
            grid.set(*pos, Cell::inactive());
        }
        for pos in &self.born {
            grid.set(*pos, Cell::active());
        }
    }

    pub fn flipped(&self) -> impl Iterator<Item = Pos> + '_ {
        self.died.iter().chain(self.born.iter()).copied()
    }

    pub fn len(&self) -> usize {
        self.died.len() + self.born.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Evaluates one generation over a fixed number of threads.
///
/// Rows are handed out through a shared queue, workers only read the grid and
/// push their findings into the `died` and `born` channels. The grid is never
/// touched before every worker is done.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn step(&self, grid: &Grid) -> Delta {
        self.step_rows(grid, 0..grid.width())
    }

    /// evaluates only the rows in `rows`, the rest of `grid` is context.
    pub fn step_rows(&self, grid: &Grid, rows: Range<i32>) -> Delta {
        let (row_sender, row_receiver) = mpsc::channel();
        for x in rows {
            // receiver lives until the end of this function.
            let _ = row_sender.send(x);
        }
        drop(row_sender);
        let queue = Mutex::new(row_receiver);

        let (died_sender, died_receiver) = mpsc::channel();
        let (born_sender, born_receiver) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..self.threads {
                let queue = &queue;
                let died = died_sender.clone();
                let born = born_sender.clone();
                scope.spawn(move || worker_loop(grid, queue, died, born));
            }
        });
        drop(died_sender);
        drop(born_sender);

        let mut died: Vec<_> = died_receiver.into_iter().collect();
        let mut born: Vec<_> = born_receiver.into_iter().collect();
        died.sort_unstable();
        born.sort_unstable();
        Delta { died, born }
    }
}

fn worker_loop(
    grid: &Grid,
    queue: &Mutex<mpsc::Receiver<i32>>,
    died: mpsc::Sender<Pos>,
    born: mpsc::Sender<Pos>,
) {
    loop {
        let next = queue.lock().recv();
        let Ok(x) = next else { break };
        for pos in grid.row(x) {
            // receivers outlive the scope running this worker.
            let _ = match rule::transition(grid, pos) {
                Transition::Die => died.send(pos),
                Transition::Birth => born.send(pos),
                Transition::Stay => Ok(()),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos;

    #[test]
    fn diagonal_ends_die_and_nothing_is_born() {
        let mut grid = Grid::with_actives(4, 4, [pos!(1, 1), pos!(2, 2), pos!(3, 3)]);
        let delta = WorkerPool::new(4).step(&grid);
        // the middle cell keeps its two diagonal neighbors.
        assert_eq!(delta.died, vec![pos!(1, 1), pos!(3, 3)]);
        assert!(delta.born.is_empty());
        delta.apply(&mut grid);
        assert_eq!(grid.actives(), vec![pos!(2, 2)]);

        let delta = WorkerPool::new(4).step(&grid);
        assert_eq!(delta.died, vec![pos!(2, 2)]);
        delta.apply(&mut grid);
        assert_eq!(grid.alive_count(), 0);
    }

    #[test]
    fn thread_count_does_not_change_the_result() {
        let glider = [pos!(1, 0), pos!(2, 1), pos!(0, 2), pos!(1, 2), pos!(2, 2)];
        let grid = Grid::with_actives(9, 7, glider);
        let reference = WorkerPool::new(1).step(&grid);
        for threads in [0, 2, 3, 16] {
            assert_eq!(WorkerPool::new(threads).step(&grid), reference);
        }
        assert_eq!(reference.len(), 4);
    }

    #[test]
    fn step_rows_stays_inside_the_range() {
        let grid = Grid::with_actives(6, 6, [pos!(0, 2), pos!(1, 2), pos!(2, 2)]);
        let delta = WorkerPool::new(2).step_rows(&grid, 1..2);
        assert_eq!(delta.born, vec![pos!(1, 1), pos!(1, 3)]);
        assert!(delta.died.is_empty());
    }
}
