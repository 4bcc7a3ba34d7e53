//! Game of life on a fixed toroidal board, computed either on one node by a
//! pool of worker threads, or by partition agents synchronised by a
//! coordinator at every turn.

pub use utils::Pos;
mod utils;

pub use world::{Cell, Grid};
pub mod world;

pub use config::Params;
pub mod config;

pub use error::{Error, Result};
mod error;

pub use events::{Event, EventSender, EventStream};
pub mod events;

pub use io::{Io, MemoryIo, PgmDir};
pub mod io;

pub use sim::{LocalStepper, Sim, SimHandle, Stepper, WorkerPool};
pub mod sim;

pub mod dist;

pub use view::{Keyboard, View};
pub mod view;
