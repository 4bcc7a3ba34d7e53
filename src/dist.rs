//! Coordinator / partition agent mode.
//!
//! The coordinator splits the rows of the board into partitions, every agent
//! claims one and computes it turn after turn, exchanging edge rows and
//! reports with the coordinator through the four operations of [`proto`].

pub use agent::{Backoff, CoordinatorApi, PartitionAgent};
pub mod agent;

pub use coordinator::{Coordinator, CoordinatorStepper, Rejection, TurnOutcome};
mod coordinator;

pub use partition::Partition;
mod partition;

pub mod proto;

pub use transport::{Client, NodeService, Server, Service};
pub mod transport;
