use std::{
    sync::mpsc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::{
    events::{Event, EventSender, State},
    Grid, Io, Params, Result,
};

pub use pool::{Delta, WorkerPool};
mod pool;

/// Drives the generations of a run loop.
///
/// Implemented by [`LocalStepper`] on a single node and by the coordinator,
/// whose generations are computed by remote partition agents.
pub trait Stepper: Send {
    /// generations completed so far.
    fn turn(&self) -> u64;

    fn snapshot(&self) -> Grid;

    fn alive_count(&self) -> usize {
        self.snapshot().alive_count()
    }

    /// computes, or waits a little for, the next generation.
    fn step(&mut self, events: &EventSender) -> Result<()>;

    fn set_paused(&mut self, _paused: bool) {}

    /// Called once the loop stopped, before the final snapshot.
    ///
    /// No generation may complete after it returns.
    fn finish(&mut self) {}
}

/// Single-node stepper, every generation goes through a [`WorkerPool`].
pub struct LocalStepper {
    grid: Grid,
    turn: u64,
    pool: WorkerPool,
}

impl LocalStepper {
    pub fn new(grid: Grid, threads: usize) -> Self {
        Self {
            grid,
            turn: 0,
            pool: WorkerPool::new(threads),
        }
    }
}

impl Stepper for LocalStepper {
    fn turn(&self) -> u64 {
        self.turn
    }

    fn snapshot(&self) -> Grid {
        self.grid.clone()
    }

    fn alive_count(&self) -> usize {
        self.grid.alive_count()
    }

    fn step(&mut self, events: &EventSender) -> Result<()> {
        let delta = self.pool.step(&self.grid);
        delta.apply(&mut self.grid);
        self.turn += 1;
        for pos in delta.flipped() {
            events.send(Event::CellFlipped {
                turn: self.turn,
                pos,
            });
        }
        events.send(Event::TurnComplete { turn: self.turn });
        Ok(())
    }
}

/// Key commands understood by the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Snapshot,
    Quit,
    Pause,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            's' => Some(Command::Snapshot),
            'q' => Some(Command::Quit),
            'p' => Some(Command::Pause),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimHandle {
    sender: mpsc::Sender<char>,
}

impl SimHandle {
    pub fn new(sender: mpsc::Sender<char>) -> Self {
        Self { sender }
    }

    /// forwards a key press, returns false once the loop is gone.
    pub fn key_press(&self, key: char) -> bool {
        self.sender.send(key).is_ok()
    }
}

#[derive(Debug)]
pub struct Sim {
    thread: JoinHandle<Result<()>>,
    sender: mpsc::Sender<char>,
}

impl Sim {
    pub fn spawn<S, I>(params: Params, stepper: S, io: I, events: EventSender) -> Self
    where
        S: Stepper + 'static,
        I: Io + 'static,
    {
        Self::spawn_sampled(params, stepper, io, events, ALIVE_COUNT_INTERVAL)
    }

    /// like [`Sim::spawn`], publishing the live population every `sample_every`.
    pub fn spawn_sampled<S, I>(
        params: Params,
        stepper: S,
        io: I,
        events: EventSender,
        sample_every: Duration,
    ) -> Self
    where
        S: Stepper + 'static,
        I: Io + 'static,
    {
        announce(&params, &stepper, &events);
        let (sender, receiver) = mpsc::channel();
        let loop_state = Loop {
            params,
            receiver,
            events,
            sample_every,
        };
        let thread = thread::spawn(move || sim_loop(loop_state, stepper, io));
        Self { thread, sender }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle::new(self.sender.clone())
    }

    pub fn join(self) -> Result<()> {
        drop(self.sender);
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

const EVT_CHECK_TIMEOUT: Duration = Duration::from_millis(10);
pub const ALIVE_COUNT_INTERVAL: Duration = Duration::from_secs(2);

struct Loop {
    params: Params,
    receiver: mpsc::Receiver<char>,
    events: EventSender,
    sample_every: Duration,
}

#[derive(Debug, Default)]
struct Control {
    paused: bool,
    quit: bool,
}

/// initial board, published before any generation can complete.
fn announce<S: Stepper>(params: &Params, stepper: &S, events: &EventSender) {
    let initial = stepper.snapshot();
    for pos in initial.actives() {
        events.send(Event::CellFlipped { turn: 0, pos });
    }
    events.send(Event::TurnComplete {
        turn: stepper.turn(),
    });
    info!(
        width = params.width,
        height = params.height,
        turns = params.turns,
        alive = initial.alive_count(),
        "simulation started"
    );
}

fn sim_loop<S, I>(loop_state: Loop, mut stepper: S, mut io: I) -> Result<()>
where
    S: Stepper,
    I: Io,
{
    let Loop {
        params,
        receiver,
        events,
        sample_every,
    } = loop_state;
    let mut control = Control::default();
    let mut last_sample = Instant::now();

    while stepper.turn() < params.turns && !control.quit {
        while let Ok(key) = receiver.try_recv() {
            handle_key(key, &params, &mut stepper, &mut io, &mut control, &events)?;
        }
        if control.quit {
            break;
        }

        if last_sample.elapsed() >= sample_every {
            events.send(Event::AliveCellsCount {
                turn: stepper.turn(),
                count: stepper.alive_count(),
            });
            last_sample = Instant::now();
        }

        if control.paused {
            thread::sleep(EVT_CHECK_TIMEOUT);
            continue;
        }

        stepper.step(&events)?;
    }

    // the snapshot is taken once nothing can advance any more, quitting
    // included.
    stepper.finish();
    let grid = stepper.snapshot();
    let turn = stepper.turn();
    write_snapshot(&params, &grid, turn, &mut io)?;
    info!(turn, alive = grid.alive_count(), "simulation finished");
    events.send(Event::FinalTurnComplete {
        turn,
        alive: grid.actives(),
    });

    io.check_idle()?;
    events.send(Event::StateChange {
        turn,
        state: State::Quitting,
    });
    Ok(())
}

fn handle_key<S, I>(
    key: char,
    params: &Params,
    stepper: &mut S,
    io: &mut I,
    control: &mut Control,
    events: &EventSender,
) -> Result<()>
where
    S: Stepper,
    I: Io,
{
    let Some(command) = Command::from_key(key) else {
        debug!(?key, "ignored key");
        return Ok(());
    };
    let turn = stepper.turn();
    match command {
        Command::Snapshot => {
            write_snapshot(params, &stepper.snapshot(), turn, io)?;
        }
        Command::Quit => {
            control.quit = true;
            info!(turn, "quit requested");
        }
        Command::Pause => {
            control.paused = !control.paused;
            stepper.set_paused(control.paused);
            let state = if control.paused {
                info!(turn, "paused");
                State::Paused
            } else {
                info!(turn, "continuing");
                State::Executing
            };
            events.send(Event::StateChange { turn, state });
        }
    }
    Ok(())
}

fn write_snapshot<I: Io>(params: &Params, grid: &Grid, turn: u64, io: &mut I) -> Result<()> {
    let name = params.output_name(turn);
    io.write_image(&name, grid.width(), grid.height(), &grid.to_bytes())?;
    info!(%name, "snapshot saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events, pos, MemoryIo};

    fn params(turns: u64) -> Params {
        Params {
            turns,
            threads: 2,
            width: 4,
            height: 4,
            partitions: 1,
        }
    }

    #[test]
    fn keys_are_decoded() {
        assert_eq!(Command::from_key('s'), Some(Command::Snapshot));
        assert_eq!(Command::from_key('q'), Some(Command::Quit));
        assert_eq!(Command::from_key('p'), Some(Command::Pause));
        assert_eq!(Command::from_key('x'), None);
    }

    #[test]
    fn local_stepper_emits_flips_then_turn() {
        let grid = Grid::with_actives(4, 4, [pos!(1, 1), pos!(2, 2), pos!(3, 3)]);
        let mut stepper = LocalStepper::new(grid, 2);
        let (sender, stream) = events::channel();
        stepper.step(&sender).unwrap();
        drop(sender);
        let emitted: Vec<_> = stream.collect();
        assert_eq!(
            emitted,
            vec![
                Event::CellFlipped {
                    turn: 1,
                    pos: pos!(1, 1)
                },
                Event::CellFlipped {
                    turn: 1,
                    pos: pos!(3, 3)
                },
                Event::TurnComplete { turn: 1 },
            ]
        );
        assert_eq!(stepper.turn(), 1);
    }

    #[test]
    fn quit_saves_the_final_board() {
        let io = MemoryIo::default();
        let grid = Grid::with_actives(4, 4, [pos!(0, 0)]);
        let (sender, stream) = events::channel();
        let sim = Sim::spawn(params(u64::MAX), LocalStepper::new(grid, 1), io.clone(), sender);
        let handle = sim.handle();
        assert!(handle.key_press('p'));
        assert!(handle.key_press('q'));
        sim.join().unwrap();

        let emitted: Vec<_> = stream.collect();
        let states: Vec<_> = emitted
            .iter()
            .filter_map(|event| match event {
                Event::StateChange { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![State::Paused, State::Quitting]);
        let final_turn = emitted
            .iter()
            .find_map(|event| match event {
                Event::FinalTurnComplete { turn, .. } => Some(*turn),
                _ => None,
            })
            .unwrap();
        assert!(io.image(&format!("4x4x{final_turn}")).is_some());
    }

    /// completes one more generation while finishing, like agents reporting
    /// just before the exit flag goes up.
    struct LateTurn {
        inner: LocalStepper,
        events: EventSender,
    }

    impl Stepper for LateTurn {
        fn turn(&self) -> u64 {
            self.inner.turn()
        }

        fn snapshot(&self) -> Grid {
            self.inner.snapshot()
        }

        fn step(&mut self, events: &EventSender) -> Result<()> {
            self.inner.step(events)
        }

        fn finish(&mut self) {
            self.inner.step(&self.events).unwrap();
        }
    }

    #[test]
    fn quit_snapshot_matches_the_final_turn() {
        let io = MemoryIo::default();
        let blinker = Grid::with_actives(5, 5, [pos!(1, 2), pos!(2, 2), pos!(3, 2)]);
        let (late, _late_stream) = events::channel();
        let stepper = LateTurn {
            inner: LocalStepper::new(blinker, 1),
            events: late,
        };
        let (sender, stream) = events::channel();
        let sim = Sim::spawn(
            Params {
                width: 5,
                height: 5,
                ..params(u64::MAX)
            },
            stepper,
            io.clone(),
            sender,
        );
        assert!(sim.handle().key_press('p'));
        assert!(sim.handle().key_press('q'));
        sim.join().unwrap();

        let (turn, alive) = stream
            .filter_map(|event| match event {
                Event::FinalTurnComplete { turn, alive } => Some((turn, alive)),
                _ => None,
            })
            .next()
            .unwrap();
        let saved = io.image(&format!("5x5x{turn}")).unwrap();
        assert_eq!(Grid::from_bytes(5, 5, &saved).unwrap().actives(), alive);
    }

    #[test]
    fn alive_cells_are_sampled_while_paused() {
        let block = Grid::with_actives(4, 4, [pos!(1, 1), pos!(1, 2), pos!(2, 1), pos!(2, 2)]);
        let (sender, stream) = events::channel();
        let sim = Sim::spawn_sampled(
            params(u64::MAX),
            LocalStepper::new(block, 1),
            MemoryIo::default(),
            sender,
            Duration::from_millis(20),
        );
        assert!(sim.handle().key_press('p'));
        thread::sleep(Duration::from_millis(150));
        assert!(sim.handle().key_press('q'));
        sim.join().unwrap();

        let emitted: Vec<_> = stream.collect();
        let paused_at = emitted
            .iter()
            .position(|event| {
                matches!(
                    event,
                    Event::StateChange {
                        state: State::Paused,
                        ..
                    }
                )
            })
            .unwrap();
        let paused_turn = emitted[paused_at].turn();
        let samples: Vec<_> = emitted[paused_at..]
            .iter()
            .filter_map(|event| match event {
                Event::AliveCellsCount { turn, count } => Some((*turn, *count)),
                _ => None,
            })
            .collect();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|sample| *sample == (paused_turn, 4)));
    }
}
