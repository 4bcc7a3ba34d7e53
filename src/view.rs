use std::{
    io::{stdin, stdout, Stdout},
    thread::{self, JoinHandle},
};

use termion::{event::Key, input::TermRead, raw::IntoRawMode, raw::RawTerminal};
use tracing::{debug, info, warn};

use crate::events::{Event, EventStream, State};

/// What an observer saw before the stream closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub turns: u64,
    pub flips: u64,
    pub alive: Option<usize>,
    pub quit: bool,
}

/// Observer thread draining an [`EventStream`] into the log until it closes.
pub struct View {
    thread: JoinHandle<Summary>,
}

impl View {
    pub fn spawn(stream: EventStream) -> Self {
        let thread = thread::spawn(move || view_loop(stream));
        Self { thread }
    }

    /// waits for the stream to close.
    pub fn join(self) -> Summary {
        match self.thread.join() {
            Ok(summary) => summary,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

fn view_loop(stream: EventStream) -> Summary {
    let mut summary = Summary::default();
    for event in stream {
        match &event {
            Event::CellFlipped { .. } => summary.flips += 1,
            Event::TurnComplete { turn } => {
                summary.turns = *turn;
                debug!(turn, "turn complete");
            }
            Event::AliveCellsCount { turn, count } => info!(turn, count, "alive cells"),
            Event::FinalTurnComplete { turn, alive } => {
                summary.turns = *turn;
                summary.alive = Some(alive.len());
                info!(turn, alive = alive.len(), "final turn complete");
            }
            Event::StateChange { turn, state } => {
                summary.quit |= *state == State::Quitting;
                info!(turn, ?state, "state changed");
            }
        }
    }
    summary
}

/// Terminal key reader, the terminal stays in raw mode while it lives.
pub struct Keyboard {
    _raw: RawTerminal<Stdout>,
}

impl Keyboard {
    /// Forwards every typed character to `on_key` until it returns false.
    ///
    /// Ctrl-C is read as `q`. Returns `None` when stdin is not a terminal.
    pub fn spawn<F>(mut on_key: F) -> Option<Self>
    where
        F: FnMut(char) -> bool + Send + 'static,
    {
        if !termion::is_tty(&stdin()) {
            debug!("stdin is not a terminal, keyboard disabled");
            return None;
        }
        let raw = match stdout().into_raw_mode() {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "failed to enter raw mode, keyboard disabled");
                return None;
            }
        };
        thread::spawn(move || {
            for key in stdin().keys() {
                let key = match key {
                    Ok(Key::Ctrl('c')) => 'q',
                    Ok(Key::Char(key)) => key,
                    Ok(_) => continue,
                    Err(error) => {
                        warn!(%error, "failed to read a key");
                        break;
                    }
                };
                if !on_key(key) {
                    break;
                }
            }
        });
        Some(Self { _raw: raw })
    }
}
