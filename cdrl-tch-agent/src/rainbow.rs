//! Rainbow agent: categorical DQN with double-Q targets and prioritized replay.
mod base;
pub use base::Rainbow;

/// Configuration of [`Rainbow`].
pub type RainbowConfig<C> = crate::config::AgentConfig<C>;
