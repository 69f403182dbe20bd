use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`CategoricalMlp`](super::CategoricalMlp).
pub struct CategoricalMlpConfig {
    pub(super) in_dim: i64,
    pub(super) units: Vec<i64>,
    pub(super) n_actions: i64,
    pub(super) atoms: i64,
}

impl CategoricalMlpConfig {
    /// `in_dim` is the number of elements of a flattened state.
    pub fn new(in_dim: i64, units: Vec<i64>, n_actions: i64, atoms: i64) -> Self {
        Self {
            in_dim,
            units,
            n_actions,
            atoms,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`ActorCriticMlp`](super::ActorCriticMlp).
pub struct ActorCriticMlpConfig {
    pub(super) in_dim: i64,
    pub(super) units: Vec<i64>,
    pub(super) n_actions: i64,
    pub(super) atoms: i64,
    pub(super) n_slots: i64,
}

impl ActorCriticMlpConfig {
    /// Critic for a single action.
    pub fn new(in_dim: i64, units: Vec<i64>, n_actions: i64, atoms: i64) -> Self {
        Self {
            in_dim,
            units,
            n_actions,
            atoms,
            n_slots: 1,
        }
    }

    /// Critic for the joint action of `n_slots` agents.
    pub fn n_slots(mut self, n_slots: i64) -> Self {
        self.n_slots = n_slots;
        self
    }
}
