//! Progress events published to observers.
//!
//! Producers hold an [`EventSender`], observers drain the [`EventStream`].
//! The stream ends once every sender has been dropped, which the run loops
//! only do after their last event.

use std::{fmt, sync::mpsc};

use tracing::trace;

use crate::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Paused,
    Executing,
    Quitting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// a cell changed value while computing generation `turn`.
    CellFlipped { turn: u64, pos: Pos },
    /// `turn` generations are now complete.
    TurnComplete { turn: u64 },
    /// periodic sample of the live population.
    AliveCellsCount { turn: u64, count: usize },
    /// the run loop stopped after `turn` generations, `alive` is the final board.
    FinalTurnComplete { turn: u64, alive: Vec<Pos> },
    StateChange { turn: u64, state: State },
}

impl Event {
    pub fn turn(&self) -> u64 {
        match self {
            Event::CellFlipped { turn, .. }
            | Event::TurnComplete { turn }
            | Event::AliveCellsCount { turn, .. }
            | Event::FinalTurnComplete { turn, .. }
            | Event::StateChange { turn, .. } => *turn,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CellFlipped { turn, pos } => {
                write!(f, "turn {turn}: cell ({}, {}) flipped", pos.x, pos.y)
            }
            Event::TurnComplete { turn } => write!(f, "turn {turn} complete"),
            Event::AliveCellsCount { turn, count } => {
                write!(f, "turn {turn}: {count} alive cells")
            }
            Event::FinalTurnComplete { turn, alive } => {
                write!(f, "final turn {turn}: {} alive cells", alive.len())
            }
            Event::StateChange { turn, state } => write!(f, "turn {turn}: {state:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn send(&self, event: Event) {
        // observers may stop listening early, the run goes on without them.
        if let Err(mpsc::SendError(event)) = self.sender.send(event) {
            trace!(%event, "event dropped, no observer left");
        }
    }
}

#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::Receiver<Event>,
}

impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.receiver.recv().ok()
    }
}

pub fn channel() -> (EventSender, EventStream) {
    let (sender, receiver) = mpsc::channel();
    (EventSender { sender }, EventStream { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos;

    #[test]
    fn stream_closes_after_last_sender() {
        let (sender, stream) = channel();
        let other = sender.clone();
        sender.send(Event::TurnComplete { turn: 0 });
        drop(sender);
        other.send(Event::TurnComplete { turn: 1 });
        drop(other);
        let turns: Vec<_> = stream.map(|event| event.turn()).collect();
        assert_eq!(turns, vec![0, 1]);
    }

    #[test]
    fn sending_without_observer_is_silent() {
        let (sender, stream) = channel();
        drop(stream);
        sender.send(Event::CellFlipped {
            turn: 1,
            pos: pos!(0, 0),
        });
    }
}
