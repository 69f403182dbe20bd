use crate::util::NamedTensors;
use anyhow::{anyhow, Result};
use cdrl_core::error::CoreError;
use std::sync::{Arc, RwLock};

/// Sibling agents' memories and published parameters, looked up by agent index.
///
/// Owned by the training driver. Agents hold weak handles to it, so dropping the
/// registry never leaks through reference cycles.
pub struct SiblingRegistry<M> {
    memories: Vec<Arc<RwLock<M>>>,
    params: Vec<RwLock<Option<NamedTensors>>>,
}

impl<M> SiblingRegistry<M> {
    /// Registers the memories of all agents, the `i`-th memory belonging to agent `i`.
    pub fn new(memories: Vec<Arc<RwLock<M>>>) -> Arc<Self> {
        let params = memories.iter().map(|_| RwLock::new(None)).collect();
        Arc::new(Self { memories, params })
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.memories.len()
    }

    /// Returns `true` if no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// Memory of agent `index`.
    pub fn memory(&self, index: usize) -> Result<&Arc<RwLock<M>>> {
        self.memories
            .get(index)
            .ok_or_else(|| CoreError::UnknownSibling(index).into())
    }

    /// Publishes the parameters of agent `index`, replacing previously published ones.
    pub fn publish(&self, index: usize, params: NamedTensors) -> Result<()> {
        let slot = self
            .params
            .get(index)
            .ok_or(CoreError::UnknownSibling(index))?;
        *slot
            .write()
            .map_err(|_| anyhow!("Parameters of sibling {} are poisoned", index))? = Some(params);
        Ok(())
    }

    /// Copy of the parameters last published by agent `index`.
    pub fn params(&self, index: usize) -> Result<Option<NamedTensors>> {
        let slot = self
            .params
            .get(index)
            .ok_or(CoreError::UnknownSibling(index))?;
        let params = slot
            .read()
            .map_err(|_| anyhow!("Parameters of sibling {} are poisoned", index))?;
        Ok(params.clone())
    }
}
