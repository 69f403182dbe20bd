use anyhow::Result;
use tch::{Device, Tensor};

/// A batch of n-step transitions sampled from a memory.
pub struct TransitionBatch {
    /// Priority indices of the samples, passed back with updated priorities.
    pub ixs: Vec<usize>,

    /// Storage positions of the samples, used to align related samples of siblings.
    pub data_ixs: Vec<usize>,

    /// States, `[batch, ..]`.
    pub states: Tensor,

    /// Actions taken, `[batch]`.
    pub actions: Tensor,

    /// Actions of the neighbor slots, `[batch, slots]`, `-1` for no action.
    pub neighbor_actions: Option<Tensor>,

    /// Availability masks of the next states, `[batch, n_actions]`.
    pub avails: Tensor,

    /// n-step returns, `[batch]`.
    pub returns: Tensor,

    /// States n steps later, `[batch, ..]`.
    pub next_states: Tensor,

    /// 0 if the episode ended within n steps, otherwise 1, `[batch]`.
    pub nonterminals: Tensor,

    /// Importance sampling weights, `[batch]`.
    pub weights: Tensor,
}

impl TransitionBatch {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.ixs.len()
    }

    /// Returns `true` if the batch has no samples.
    pub fn is_empty(&self) -> bool {
        self.ixs.is_empty()
    }

    /// Moves the tensors to `device`.
    pub fn to_device(self, device: Device) -> Self {
        Self {
            ixs: self.ixs,
            data_ixs: self.data_ixs,
            states: self.states.to(device),
            actions: self.actions.to(device),
            neighbor_actions: self.neighbor_actions.map(|t| t.to(device)),
            avails: self.avails.to(device),
            returns: self.returns.to(device),
            next_states: self.next_states.to(device),
            nonterminals: self.nonterminals.to(device),
            weights: self.weights.to(device),
        }
    }
}

/// Next states and availability masks aligned to another agent's sample.
pub struct RelatedSample {
    /// `[batch, ..]`
    pub next_states: Tensor,

    /// `[batch, n_actions]`
    pub avails: Tensor,
}

/// Memory of transitions with prioritized sampling.
pub trait Memory {
    /// Samples a batch of transitions.
    ///
    /// `avg_reward` is the current average-reward estimate of the agent.
    fn sample(&mut self, batch_size: usize, avg_reward: f64) -> Result<TransitionBatch>;

    /// Updates the priorities of the samples at `ixs`.
    fn update_priorities(&mut self, ixs: &[usize], priorities: &[f32]) -> Result<()>;
}

/// Memory that can serve samples aligned with the storage positions of a sibling's batch.
pub trait RelatedMemory: Memory {
    /// Returns next states and availability masks at `data_ixs`.
    fn get_relate_sample(&self, batch_size: usize, data_ixs: &[usize]) -> Result<RelatedSample>;
}
