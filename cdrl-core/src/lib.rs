#![warn(missing_docs)]
//! Backend-independent building blocks of categorical distributional RL agents.
//!
//! This crate holds what the agents share regardless of the tensor library:
//! the error type, [`record::Record`] returned by learning steps, the [`Env`]
//! action-space interface, the duplex [`channel`] protocol used to serve
//! actions to worker processes, and the [`priority`] sum tree used by
//! prioritized replay memories.
pub mod channel;
pub mod error;
pub mod priority;
pub mod record;

mod base;
pub use base::{ActionSpace, Env};
pub use channel::{duplex, Request, ServerChannel, ServerEnd, WorkerEnd};
pub use priority::{IwScheduler, PerConfig, SumTree};
