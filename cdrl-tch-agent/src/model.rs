//! Interfaces of the networks used by the agents.
mod base;
mod dist_model;
pub use base::{ActorCritic, CategoricalQ, ModelBase, SubModel};
pub use dist_model::DistModel;
