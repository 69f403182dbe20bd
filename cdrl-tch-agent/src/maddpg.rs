//! Cooperative multi-agent DDPG with a categorical critic over joint actions.
//!
//! Agents are registered in a [`SiblingRegistry`] owned by the training driver.
//! Each agent keeps a weak handle to it and looks siblings up by index, both to
//! read their memories during [`Maddpg::learn`] and to exchange parameters.
mod base;
mod blind;
mod config;
mod registry;
pub use base::Maddpg;
pub use blind::neighbor_windows;
pub use config::{BlindConfig, MaddpgConfig};
pub use registry::SiblingRegistry;
