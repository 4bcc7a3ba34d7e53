//! Turn barrier shared by every partition agent.
//!
//! A partition may compute the current turn once every partition has been
//! claimed and it has not reported that turn yet. The current turn only moves
//! forward after every partition reported it, and edges are always served
//! from the last fully aggregated grid.

use std::{collections::HashMap, sync::Arc, thread, time::Duration};

use metrohash::MetroBuildHasher;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    dist::{proto::*, Partition},
    events::{Event, EventSender},
    sim::Stepper,
    Grid, Params, Pos, Result,
};

/// Why a request was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("turn {reported} reported while the current turn is {current}")]
    StaleTurn { reported: u64, current: u64 },

    #[error("{0:?} is not a partition of this run")]
    UnknownPartition(Partition),

    #[error("{0:?} has not been claimed")]
    Unclaimed(Partition),

    #[error("{0:?} already reported turn {1}")]
    Duplicate(Partition, u64),

    #[error("{pos:?} lies outside of {partition:?}")]
    OutOfRange { partition: Partition, pos: Pos },

    #[error("the run is exiting")]
    Exiting,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::StaleTurn { .. } => "stale_turn",
            Rejection::UnknownPartition(_) => "unknown_partition",
            Rejection::Unclaimed(_) => "unclaimed",
            Rejection::Duplicate(..) => "duplicate",
            Rejection::OutOfRange { .. } => "out_of_range",
            Rejection::Exiting => "exiting",
        }
    }
}

impl From<Rejection> for Response {
    fn from(rejection: Rejection) -> Self {
        Response::error(rejection.code(), &rejection)
    }
}

/// Passed to the turn-complete callback once every partition reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// number of completed generations, one more than the aggregated turn.
    pub turn: u64,
    /// cells whose value changed in that generation.
    pub flipped: Vec<Pos>,
}

type TurnCallback = Box<dyn FnMut(&TurnOutcome) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unclaimed,
    /// next turn the partition has to report.
    Ready(u64),
}

type PartitionMap<V> = HashMap<Partition, V, MetroBuildHasher>;

struct State {
    params: Params,
    partitions: Vec<Partition>,
    marks: PartitionMap<Mark>,
    current_turn: u64,
    reports: PartitionMap<Vec<Point>>,
    grid: Grid,
    paused: bool,
    exit_requested: bool,
    /// dropped once the run exits, releasing whatever the callback holds.
    on_turn_complete: Option<TurnCallback>,
}

impl State {
    fn exit(&self) -> bool {
        self.exit_requested || self.current_turn >= self.params.turns
    }

    /// partitions the current turn still waits on: unclaimed ones and the
    /// ones that have not reported it yet.
    fn missing(&self) -> Vec<Partition> {
        self.partitions
            .iter()
            .copied()
            .filter(|partition| {
                self.marks.get(partition) != Some(&Mark::Ready(self.current_turn + 1))
            })
            .collect()
    }

    fn all_claimed(&self) -> bool {
        self.marks.values().all(|mark| *mark != Mark::Unclaimed)
    }

    fn ready(&self, partition: Partition) -> bool {
        !self.paused
            && self.all_claimed()
            && self.marks.get(&partition) == Some(&Mark::Ready(self.current_turn))
    }

    fn accept(&mut self, report: Report) -> Result<(), Rejection> {
        let Report {
            partition,
            turn,
            points,
        } = report;

        if self.exit_requested {
            return Err(Rejection::Exiting);
        }
        if turn != self.current_turn {
            return Err(Rejection::StaleTurn {
                reported: turn,
                current: self.current_turn,
            });
        }
        match self.marks.get(&partition) {
            None => return Err(Rejection::UnknownPartition(partition)),
            Some(Mark::Unclaimed) => return Err(Rejection::Unclaimed(partition)),
            Some(Mark::Ready(_)) if self.reports.contains_key(&partition) => {
                return Err(Rejection::Duplicate(partition, turn))
            }
            Some(Mark::Ready(_)) => (),
        }
        let outside = |pos: Pos| !partition.contains(pos) || !self.grid.contains(pos);
        if let Some(point) = points.iter().find(|point| outside(point.pos)) {
            return Err(Rejection::OutOfRange {
                partition,
                pos: point.pos,
            });
        }

        self.reports.insert(partition, points);
        self.marks.insert(partition, Mark::Ready(turn + 1));
        debug!(?partition, turn, "report accepted");

        if self.reports.len() == self.partitions.len() {
            self.aggregate();
        }
        Ok(())
    }

    fn aggregate(&mut self) {
        let mut flipped = vec![];
        for point in self.reports.drain().flat_map(|(_, points)| points) {
            if self.grid.get(point.pos) != point.cell {
                flipped.push(point.pos);
                self.grid.set(point.pos, point.cell);
            }
        }
        flipped.sort_unstable();
        let outcome = TurnOutcome {
            turn: self.current_turn + 1,
            flipped,
        };
        debug!(turn = outcome.turn, flipped = outcome.flipped.len(), "turn aggregated");
        if let Some(on_turn_complete) = &mut self.on_turn_complete {
            on_turn_complete(&outcome);
        }
        self.current_turn += 1;
    }
}

pub struct Coordinator {
    state: Mutex<State>,
}

impl Coordinator {
    /// `grid` is the initial board, `on_turn_complete` runs under the
    /// coordinator lock after every aggregated turn.
    pub fn new(
        params: Params,
        grid: Grid,
        on_turn_complete: impl FnMut(&TurnOutcome) + Send + 'static,
    ) -> Self {
        let partitions = Partition::split(params.width, params.partitions);
        let marks = partitions
            .iter()
            .map(|partition| (*partition, Mark::Unclaimed))
            .collect();
        info!(?params, partitions = ?partitions, "coordinator ready");
        let state = State {
            params,
            partitions,
            marks,
            current_turn: 0,
            reports: PartitionMap::default(),
            grid,
            paused: false,
            exit_requested: false,
            on_turn_complete: Some(Box::new(on_turn_complete)),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Coordinator whose turns are published as events on `events`.
    ///
    /// The sender is released by [`Coordinator::request_exit`].
    pub fn with_events(params: Params, grid: Grid, events: EventSender) -> Self {
        Self::new(params, grid, move |outcome| {
            for pos in &outcome.flipped {
                events.send(Event::CellFlipped {
                    turn: outcome.turn,
                    pos: *pos,
                });
            }
            events.send(Event::TurnComplete { turn: outcome.turn });
        })
    }

    pub fn partitions(&self) -> Vec<Partition> {
        self.state.lock().partitions.clone()
    }

    /// Claims the next free partition.
    ///
    /// `None` once every partition has been handed out, callers must not start
    /// computing in that case.
    pub fn fetch_my_config(&self) -> Option<Assignment> {
        let mut state = self.state.lock();
        let current_turn = state.current_turn;
        let params = state.params;
        let partition = state
            .partitions
            .iter()
            .copied()
            .find(|partition| state.marks.get(partition) == Some(&Mark::Unclaimed))?;
        state.marks.insert(partition, Mark::Ready(current_turn));
        info!(?partition, rows = partition.len(), "partition claimed");
        Some(Assignment { partition, params })
    }

    /// Whether `partition` may compute the current turn now.
    ///
    /// A partition that already reported the current turn waits for the
    /// others, an unknown one is never ready.
    pub fn check_next_turn(&self, partition: Partition) -> TurnStatus {
        let state = self.state.lock();
        TurnStatus {
            all_ready: state.ready(partition),
            missing: state.missing(),
            exit: state.exit(),
        }
    }

    /// current turn and the rows bordering `partition`.
    pub fn fetch_next_turn(&self, partition: Partition) -> Result<NextTurn, Rejection> {
        let state = self.state.lock();
        if !state.marks.contains_key(&partition) {
            return Err(Rejection::UnknownPartition(partition));
        }
        let edges = partition
            .edge_rows(state.grid.width())
            .into_iter()
            .flat_map(|x| state.grid.row(x))
            .map(|pos| Point {
                pos,
                cell: state.grid.get(pos),
            })
            .collect();
        Ok(NextTurn {
            turn: state.current_turn,
            edges,
        })
    }

    /// Stores one partition's state for the current turn.
    ///
    /// The last expected report aggregates the turn: points are applied to the
    /// grid, the turn-complete callback runs and the current turn moves on.
    pub fn report_my_state(&self, report: Report) -> Result<(), Rejection> {
        let partition = report.partition;
        let result = self.state.lock().accept(report);
        if let Err(rejection) = &result {
            warn!(?partition, %rejection, "report rejected");
        }
        result
    }

    pub fn turn(&self) -> u64 {
        self.state.lock().current_turn
    }

    /// partitions the current turn still waits on.
    pub fn missing(&self) -> Vec<Partition> {
        self.state.lock().missing()
    }

    pub fn snapshot(&self) -> Grid {
        self.state.lock().grid.clone()
    }

    pub fn alive_count(&self) -> usize {
        self.state.lock().grid.alive_count()
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    /// Raises the exit flag, later reports are refused.
    ///
    /// No turn can complete afterwards, so the turn-complete callback is
    /// dropped here.
    pub fn request_exit(&self) {
        let mut state = self.state.lock();
        if !state.exit_requested {
            info!(turn = state.current_turn, "exit requested");
            state.exit_requested = true;
            state.on_turn_complete = None;
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Coordinator")
            .field("params", &state.params)
            .field("current_turn", &state.current_turn)
            .field("reports", &state.reports.len())
            .finish()
    }
}

const TURN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run-loop side of a coordinator node, turns are computed by the agents.
#[derive(Debug)]
pub struct CoordinatorStepper {
    coordinator: Arc<Coordinator>,
    reported_missing: Option<Vec<Partition>>,
}

impl CoordinatorStepper {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            reported_missing: None,
        }
    }
}

impl Stepper for CoordinatorStepper {
    fn turn(&self) -> u64 {
        self.coordinator.turn()
    }

    fn snapshot(&self) -> Grid {
        self.coordinator.snapshot()
    }

    fn alive_count(&self) -> usize {
        self.coordinator.alive_count()
    }

    fn step(&mut self, _events: &EventSender) -> Result<()> {
        thread::sleep(TURN_POLL_INTERVAL);
        let missing = self.coordinator.missing();
        // only log when the set of lagging partitions changes.
        if self.reported_missing.as_ref() != Some(&missing) {
            if !missing.is_empty() {
                debug!(?missing, "waiting on partitions");
            }
            self.reported_missing = Some(missing);
        }
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        self.coordinator.set_paused(paused);
    }

    fn finish(&mut self) {
        self.coordinator.request_exit();
    }
}
