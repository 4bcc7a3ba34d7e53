mod common;

use golrs_dist::{
    events::{self, Event, State},
    io::load_grid,
    pos, Grid, LocalStepper, MemoryIo, Sim,
};

#[test]
fn events_follow_every_turn_in_order() {
    let params = common::params(8, 8, 5, 1);
    let glider = Grid::with_actives(8, 8, [pos!(1, 0), pos!(2, 1), pos!(0, 2), pos!(1, 2), pos!(2, 2)]);
    let mut io = MemoryIo::default();
    io.insert_grid(&params, &glider);
    let grid = load_grid(&mut io, &params).unwrap();

    let (sender, stream) = events::channel();
    let sim = Sim::spawn(params, LocalStepper::new(grid, params.threads), io.clone(), sender);
    sim.join().unwrap();
    let emitted: Vec<_> = stream.collect();

    let turns: Vec<_> = emitted
        .iter()
        .filter_map(|event| match event {
            Event::TurnComplete { turn } => Some(*turn),
            _ => None,
        })
        .collect();
    assert_eq!(turns, (0..=5).collect::<Vec<_>>());

    let initial_flips = emitted
        .iter()
        .take_while(|event| !matches!(event, Event::TurnComplete { .. }))
        .count();
    assert_eq!(initial_flips, 5);

    // flips of a turn always precede its completion.
    let mut completed: Option<u64> = None;
    for event in &emitted {
        match event {
            Event::CellFlipped { turn, .. } => {
                assert_eq!(*turn, completed.map_or(0, |completed| completed + 1))
            }
            Event::TurnComplete { turn } => completed = Some(*turn),
            _ => (),
        }
    }

    let expected = common::reference(&glider, 5);
    let tail = &emitted[emitted.len() - 2..];
    assert_eq!(
        tail,
        [
            Event::FinalTurnComplete {
                turn: 5,
                alive: expected.actives(),
            },
            Event::StateChange {
                turn: 5,
                state: State::Quitting,
            },
        ]
    );
    assert_eq!(io.image("8x8x5"), Some(expected.to_bytes()));
}

#[test]
fn snapshot_key_keeps_the_run_going() {
    let params = common::params(6, 6, 200, 1);
    let grid = common::soup(6, 6, 7);
    let io = MemoryIo::default();

    let (sender, stream) = events::channel();
    let sim = Sim::spawn(params, LocalStepper::new(grid.clone(), 2), io.clone(), sender);
    assert!(sim.handle().key_press('s'));
    sim.join().unwrap();

    let last = stream.last();
    assert_eq!(
        last,
        Some(Event::StateChange {
            turn: 200,
            state: State::Quitting
        })
    );
    assert_eq!(io.image("6x6x200"), Some(common::reference(&grid, 200).to_bytes()));
}
