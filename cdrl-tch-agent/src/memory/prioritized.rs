use super::{Memory, RelatedMemory, RelatedSample, TransitionBatch};
use anyhow::{Context, Result};
use cdrl_core::{error::CoreError, IwScheduler, PerConfig, SumTree};
use log::{info, trace};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};
use tch::{Device, Tensor};

/// Configuration of [`PrioritizedMemory`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PrioritizedMemoryConfig {
    /// Maximum number of stored transitions.
    pub capacity: usize,

    /// Prioritization and importance-weight schedule.
    pub per_config: PerConfig,
}

impl Default for PrioritizedMemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            per_config: PerConfig::default(),
        }
    }
}

impl PrioritizedMemoryConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the prioritization config.
    pub fn per_config(mut self, per_config: PerConfig) -> Self {
        self.per_config = per_config;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let c = serde_yaml::from_reader(rdr)?;
        Ok(c)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A single n-step transition to be stored.
pub struct Transition {
    /// State, without batch dimension.
    pub state: Tensor,

    /// Action taken.
    pub action: i64,

    /// Actions of the neighbor slots, `-1` for no action. Empty for single agents.
    pub neighbor_actions: Vec<i64>,

    /// n-step return.
    pub ret: f32,

    /// State n steps later, without batch dimension.
    pub next_state: Tensor,

    /// Availability of each action in the next state.
    pub next_avail: Vec<f32>,

    /// `false` if the episode ended within n steps.
    pub nonterminal: bool,
}

/// Ring buffer of transitions sampled proportionally to their priorities.
///
/// Returns handed out by [`Memory::sample`] are differential: the average-reward
/// estimate given by the agent is subtracted from the stored n-step return.
pub struct PrioritizedMemory {
    capacity: usize,
    i: usize,
    len: usize,
    n_actions: usize,
    n_slots: Option<usize>,
    states: Option<Tensor>,
    next_states: Option<Tensor>,
    actions: Vec<i64>,
    neighbor_actions: Vec<Vec<i64>>,
    next_avails: Vec<Vec<f32>>,
    returns: Vec<f32>,
    nonterminals: Vec<f32>,
    sum_tree: SumTree,
    iw_scheduler: IwScheduler,
}

fn ring_insert<T>(buf: &mut Vec<T>, i: usize, value: T) {
    if i < buf.len() {
        buf[i] = value;
    } else {
        buf.push(value);
    }
}

fn index_tensor(ixs: &[usize]) -> Tensor {
    Tensor::from_slice(&ixs.iter().map(|&i| i as i64).collect::<Vec<_>>())
}

#[allow(clippy::len_without_is_empty)]
impl PrioritizedMemory {
    /// Creates an empty memory for an action space of `n_actions`.
    pub fn build(config: &PrioritizedMemoryConfig, n_actions: usize) -> Self {
        info!(
            "Construct prioritized memory with capacity = {}",
            config.capacity
        );
        let per = &config.per_config;
        Self {
            capacity: config.capacity,
            i: 0,
            len: 0,
            n_actions,
            n_slots: None,
            states: None,
            next_states: None,
            actions: Vec::with_capacity(config.capacity),
            neighbor_actions: Vec::with_capacity(config.capacity),
            next_avails: Vec::with_capacity(config.capacity),
            returns: Vec::with_capacity(config.capacity),
            nonterminals: Vec::with_capacity(config.capacity),
            sum_tree: SumTree::new(config.capacity, per.alpha),
            iw_scheduler: IwScheduler::new(per.beta_0, per.beta_final, per.n_opts_final),
        }
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Current exponent of the importance-sampling weights.
    pub fn beta(&self) -> f32 {
        self.iw_scheduler.beta()
    }

    fn store(buf: &mut Option<Tensor>, capacity: usize, i: usize, x: &Tensor) {
        let buf = buf.get_or_insert_with(|| {
            let mut shape = vec![capacity as i64];
            shape.extend(x.size());
            Tensor::zeros(shape.as_slice(), (x.kind(), Device::Cpu))
        });
        buf.get(i as i64).copy_(x);
    }

    /// Stores a transition with the largest priority seen so far.
    pub fn push(&mut self, tr: Transition) -> Result<()> {
        if tr.next_avail.len() != self.n_actions {
            return Err(CoreError::ShapeMismatch(format!(
                "{} availability flags for {} actions",
                tr.next_avail.len(),
                self.n_actions
            ))
            .into());
        }
        let n_slots = *self.n_slots.get_or_insert(tr.neighbor_actions.len());
        if tr.neighbor_actions.len() != n_slots {
            return Err(CoreError::ShapeMismatch(format!(
                "{} neighbor actions, memory holds {} slots",
                tr.neighbor_actions.len(),
                n_slots
            ))
            .into());
        }

        let i = self.i;
        Self::store(&mut self.states, self.capacity, i, &tr.state);
        Self::store(&mut self.next_states, self.capacity, i, &tr.next_state);
        ring_insert(&mut self.actions, i, tr.action);
        ring_insert(&mut self.neighbor_actions, i, tr.neighbor_actions);
        ring_insert(&mut self.next_avails, i, tr.next_avail);
        ring_insert(&mut self.returns, i, tr.ret);
        ring_insert(&mut self.nonterminals, i, tr.nonterminal as i32 as f32);

        let max_p = self.sum_tree.max();
        self.sum_tree.add(i, max_p);

        self.i = (self.i + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
        trace!("Stored transition at {}", i);

        Ok(())
    }

    fn gather_avails(&self, ixs: &[usize]) -> Tensor {
        let flat = ixs
            .iter()
            .flat_map(|&i| self.next_avails[i].iter().copied())
            .collect::<Vec<_>>();
        Tensor::from_slice(&flat).view([ixs.len() as i64, self.n_actions as i64])
    }

    fn next_states_at(&self, index: &Tensor) -> Result<Tensor> {
        let next_states = self.next_states.as_ref().context("No transition stored")?;
        Ok(next_states.index_select(0, index))
    }
}

impl Memory for PrioritizedMemory {
    fn sample(&mut self, batch_size: usize, avg_reward: f64) -> Result<TransitionBatch> {
        if self.len == 0 || batch_size == 0 {
            return Err(CoreError::EmptyMemory {
                len: self.len,
                batch_size,
            }
            .into());
        }

        let (ixs, ws) = self.sum_tree.sample(batch_size, self.iw_scheduler.beta());
        self.iw_scheduler.add_n_opts();
        let index = index_tensor(&ixs);

        let states = self
            .states
            .as_ref()
            .context("No transition stored")?
            .index_select(0, &index);
        let next_states = self.next_states_at(&index)?;
        let actions = Tensor::from_slice(&ixs.iter().map(|&i| self.actions[i]).collect::<Vec<_>>());
        let neighbor_actions = match self.n_slots {
            Some(n_slots) if n_slots > 0 => {
                let flat = ixs
                    .iter()
                    .flat_map(|&i| self.neighbor_actions[i].iter().copied())
                    .collect::<Vec<_>>();
                Some(Tensor::from_slice(&flat).view([ixs.len() as i64, n_slots as i64]))
            }
            _ => None,
        };
        let avails = self.gather_avails(&ixs);
        let returns = Tensor::from_slice(
            &ixs.iter()
                .map(|&i| self.returns[i] - avg_reward as f32)
                .collect::<Vec<_>>(),
        );
        let nonterminals =
            Tensor::from_slice(&ixs.iter().map(|&i| self.nonterminals[i]).collect::<Vec<_>>());

        Ok(TransitionBatch {
            data_ixs: ixs.clone(),
            ixs,
            states,
            actions,
            neighbor_actions,
            avails,
            returns,
            next_states,
            nonterminals,
            weights: Tensor::from_slice(&ws),
        })
    }

    fn update_priorities(&mut self, ixs: &[usize], priorities: &[f32]) -> Result<()> {
        if ixs.len() != priorities.len() {
            return Err(CoreError::ShapeMismatch(format!(
                "{} indices and {} priorities",
                ixs.len(),
                priorities.len()
            ))
            .into());
        }
        for (&ix, &p) in ixs.iter().zip(priorities.iter()) {
            self.sum_tree.update(ix, p);
        }
        Ok(())
    }
}

impl RelatedMemory for PrioritizedMemory {
    fn get_relate_sample(&self, batch_size: usize, data_ixs: &[usize]) -> Result<RelatedSample> {
        if data_ixs.len() != batch_size {
            return Err(CoreError::ShapeMismatch(format!(
                "{} storage positions for a batch of {}",
                data_ixs.len(),
                batch_size
            ))
            .into());
        }
        if let Some(&ix) = data_ixs.iter().find(|&&ix| ix >= self.len) {
            return Err(CoreError::ShapeMismatch(format!(
                "storage position {} beyond {} stored transitions",
                ix, self.len
            ))
            .into());
        }

        Ok(RelatedSample {
            next_states: self.next_states_at(&index_tensor(data_ixs))?,
            avails: self.gather_avails(data_ixs),
        })
    }
}
