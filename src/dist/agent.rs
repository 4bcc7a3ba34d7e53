use std::{sync::Arc, thread, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    dist::{proto::*, Coordinator, Partition, Rejection},
    events::{Event, EventSender, State},
    sim::WorkerPool,
    Error, Grid, Params, Result,
};

/// The four coordinator operations, as seen from a partition agent.
pub trait CoordinatorApi {
    fn fetch_my_config(&mut self) -> Result<Option<Assignment>>;
    fn check_next_turn(&mut self, partition: Partition) -> Result<TurnStatus>;
    fn fetch_next_turn(&mut self, partition: Partition) -> Result<NextTurn>;
    fn report_my_state(&mut self, report: Report) -> Result<()>;
}

/// in-process access, used when agents share the coordinator's address space.
impl CoordinatorApi for Arc<Coordinator> {
    fn fetch_my_config(&mut self) -> Result<Option<Assignment>> {
        Ok(Coordinator::fetch_my_config(self))
    }

    fn check_next_turn(&mut self, partition: Partition) -> Result<TurnStatus> {
        Ok(Coordinator::check_next_turn(self, partition))
    }

    fn fetch_next_turn(&mut self, partition: Partition) -> Result<NextTurn> {
        Coordinator::fetch_next_turn(self, partition).map_err(rejected)
    }

    fn report_my_state(&mut self, report: Report) -> Result<()> {
        Coordinator::report_my_state(self, report).map_err(rejected)
    }
}

fn rejected(rejection: Rejection) -> Error {
    Error::Rejected {
        code: rejection.code().to_string(),
        message: rejection.to_string(),
    }
}

/// Exponential pause between readiness polls.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min,
            min,
            max,
        }
    }

    /// the delay to wait now, doubling the next one up to the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn wait(&mut self) {
        thread::sleep(self.next_delay());
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1), Duration::from_millis(50))
    }
}

/// A partition worker: polls the coordinator, computes its rows, reports them.
#[derive(Debug)]
pub struct PartitionAgent<C> {
    api: C,
    assignment: Assignment,
    pool: WorkerPool,
    backoff: Backoff,
}

impl<C> PartitionAgent<C>
where
    C: CoordinatorApi,
{
    /// claims a partition, failing with [`Error::NoAssignment`] when none is left.
    pub fn connect(mut api: C) -> Result<Self> {
        let assignment = api.fetch_my_config()?.ok_or(Error::NoAssignment)?;
        info!(partition = ?assignment.partition, "partition assigned");
        Ok(Self {
            api,
            pool: WorkerPool::new(assignment.params.threads),
            assignment,
            backoff: Backoff::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn params(&self) -> &Params {
        &self.assignment.params
    }

    pub fn partition(&self) -> Partition {
        self.assignment.partition
    }

    /// Runs until the coordinator raises its exit flag.
    ///
    /// `grid` is the initial board, only the owned rows and the edges fetched
    /// every turn are read. Returns the number of turns computed here.
    pub fn run(mut self, mut grid: Grid, events: EventSender) -> Result<u64> {
        let partition = self.partition();
        let mut computed = 0;
        let mut last_turn = 0;

        loop {
            let status = self.api.check_next_turn(partition)?;
            if status.exit {
                break;
            }
            if !status.all_ready {
                self.backoff.wait();
                continue;
            }
            self.backoff.reset();

            let NextTurn { turn, edges } = self.api.fetch_next_turn(partition)?;
            for point in edges {
                grid.set(point.pos, point.cell);
            }

            // the local grid only moves on once the coordinator took the report.
            let delta = self.pool.step_rows(&grid, partition.rows());
            let mut next = grid.clone();
            delta.apply(&mut next);

            let points = partition
                .rows()
                .flat_map(|x| next.row(x))
                .map(|pos| Point {
                    pos,
                    cell: next.get(pos),
                })
                .collect();
            let report = Report {
                partition,
                turn,
                points,
            };
            match self.api.report_my_state(report) {
                Ok(()) => {
                    debug!(turn, flipped = delta.len(), "turn reported");
                    grid = next;
                    for pos in delta.flipped() {
                        events.send(Event::CellFlipped {
                            turn: turn + 1,
                            pos,
                        });
                    }
                    computed += 1;
                    last_turn = turn + 1;
                }
                Err(Error::Rejected { code, message }) => {
                    warn!(turn, %code, %message, "report rejected");
                }
                Err(error) => return Err(error),
            }
        }

        info!(?partition, computed, "coordinator asked to exit");
        events.send(Event::StateChange {
            turn: last_turn,
            state: State::Quitting,
        });
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events, pos};

    /// refuses the first report, then forwards everything.
    struct RefuseFirstReport {
        inner: Arc<Coordinator>,
        refused: bool,
    }

    impl CoordinatorApi for RefuseFirstReport {
        fn fetch_my_config(&mut self) -> Result<Option<Assignment>> {
            CoordinatorApi::fetch_my_config(&mut self.inner)
        }

        fn check_next_turn(&mut self, partition: Partition) -> Result<TurnStatus> {
            CoordinatorApi::check_next_turn(&mut self.inner, partition)
        }

        fn fetch_next_turn(&mut self, partition: Partition) -> Result<NextTurn> {
            CoordinatorApi::fetch_next_turn(&mut self.inner, partition)
        }

        fn report_my_state(&mut self, report: Report) -> Result<()> {
            if !self.refused {
                self.refused = true;
                return Err(Error::Rejected {
                    code: "busy".into(),
                    message: "try again".into(),
                });
            }
            CoordinatorApi::report_my_state(&mut self.inner, report)
        }
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
    }

    #[test]
    fn exhausted_pool_is_fatal_to_the_agent() {
        let params = Params {
            turns: 1,
            threads: 1,
            width: 2,
            height: 2,
            partitions: 1,
        };
        let coordinator = Arc::new(Coordinator::new(params, Grid::new(2, 2), |_| ()));
        let _first = PartitionAgent::connect(coordinator.clone()).unwrap();
        let second = PartitionAgent::connect(coordinator);
        assert!(matches!(second, Err(Error::NoAssignment)));
    }

    #[test]
    fn single_agent_drives_every_turn() {
        let params = Params {
            turns: 2,
            threads: 2,
            width: 5,
            height: 5,
            partitions: 1,
        };
        let grid = Grid::with_actives(5, 5, [pos!(1, 2), pos!(2, 2), pos!(3, 2)]);
        let coordinator = Arc::new(Coordinator::new(params, grid.clone(), |_| ()));
        let agent = PartitionAgent::connect(coordinator.clone()).unwrap();
        assert_eq!(agent.partition(), Partition::new(0, 5));

        let (sender, stream) = events::channel();
        assert_eq!(agent.run(grid.clone(), sender).unwrap(), 2);
        assert_eq!(coordinator.turn(), 2);
        assert_eq!(coordinator.snapshot(), grid);

        let emitted: Vec<_> = stream.collect();
        let flips = emitted
            .iter()
            .filter(|event| matches!(event, Event::CellFlipped { .. }))
            .count();
        assert_eq!(flips, 8);
        assert_eq!(
            emitted.last(),
            Some(&Event::StateChange {
                turn: 2,
                state: State::Quitting
            })
        );
    }

    #[test]
    fn refused_report_is_computed_again_from_the_same_board() {
        let params = Params {
            turns: 2,
            threads: 1,
            width: 5,
            height: 5,
            partitions: 1,
        };
        let blinker = Grid::with_actives(5, 5, [pos!(1, 2), pos!(2, 2), pos!(3, 2)]);
        let coordinator = Arc::new(Coordinator::new(params, blinker.clone(), |_| ()));
        let api = RefuseFirstReport {
            inner: coordinator.clone(),
            refused: false,
        };
        let agent = PartitionAgent::connect(api).unwrap();

        let (sender, stream) = events::channel();
        assert_eq!(agent.run(blinker.clone(), sender).unwrap(), 2);
        assert_eq!(coordinator.snapshot(), blinker);
        let flips = stream
            .filter(|event| matches!(event, Event::CellFlipped { .. }))
            .count();
        assert_eq!(flips, 8);
    }
}
