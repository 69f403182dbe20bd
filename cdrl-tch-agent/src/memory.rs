//! Replay memories consumed by the agents.
//!
//! The agents only rely on [`Memory`] and, for the multi-agent variant,
//! [`RelatedMemory`]. [`PrioritizedMemory`] is a reference implementation.
mod base;
mod prioritized;
pub use base::{Memory, RelatedMemory, RelatedSample, TransitionBatch};
pub use prioritized::{PrioritizedMemory, PrioritizedMemoryConfig, Transition};
