//! HWT905 Polling Driver
//!
//! Sequences read requests over a device session in a fixed round-robin
//! order, drains externally queued commands after each round, and publishes
//! the latest measurement record to readers.

mod poller;

pub use poller::{
    CommandQueue, CycleOutcome, PollMode, Poller, PollerConfig, PollerError, PollerStats,
};
