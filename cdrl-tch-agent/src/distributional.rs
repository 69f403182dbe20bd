//! Categorical support, distributional projection and the average-reward tracker.
mod average_reward;
mod support;
pub use average_reward::AverageReward;
pub use support::Support;
