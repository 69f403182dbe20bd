//! Categorical distributional RL agents implemented with [tch](https://crates.io/crates/tch).
//!
//! Three agents share the same distributional machinery:
//!
//! * [`rainbow::Rainbow`]: C51-style DQN with double-Q targets over a discrete action space.
//! * [`ddpg::Ddpg`]: actor-critic whose critic is a categorical distribution over the support.
//! * [`maddpg::Maddpg`]: cooperative multi-agent variant of [`ddpg::Ddpg`], bootstrapping
//!   from actions its neighbors would take on their own next states.
//!
//! The networks are opaque to the agents: anything implementing
//! [`model::CategoricalQ`] or [`model::ActorCritic`] can be plugged in.
//! [`mlp`] provides small reference networks.
pub mod agent;
pub mod config;
pub mod ddpg;
pub mod distributional;
pub mod maddpg;
pub mod memory;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod rainbow;
pub mod selector;
pub mod serve;
pub mod twin;
pub mod util;
use serde::{Deserialize, Serialize};

pub use agent::{Agent, TaskMode};
pub use config::AgentConfig;
pub use distributional::{AverageReward, Support};
pub use selector::{to_one_hot, ActionSelection};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq)]
/// Device for using tch.
///
/// This enum is added because [`tch::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The GPU device with the given index.
    Cuda(usize),
}

impl From<tch::Device> for Device {
    fn from(device: tch::Device) -> Self {
        match device {
            tch::Device::Cuda(n) => Self::Cuda(n),
            _ => Self::Cpu,
        }
    }
}

impl From<Device> for tch::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => tch::Device::Cpu,
            Device::Cuda(n) => tch::Device::Cuda(n),
        }
    }
}
