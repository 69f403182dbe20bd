use anyhow::{anyhow, Result};
use std::{collections::HashMap, iter::FromIterator};
use tch::{nn::VarStore, Device::Cpu, Tensor};

/// Named tensors holding a detached CPU copy of model parameters.
///
/// Used as state dicts: snapshots for rollback and parameters exchanged
/// between agents.
pub struct NamedTensors {
    pub named_tensors: HashMap<String, Tensor>,
}

fn deep_copy(t: &Tensor) -> Tensor {
    t.detach().to(Cpu).copy()
}

impl NamedTensors {
    /// Copy data of VarStore to CPU.
    pub fn copy_from(vs: &VarStore) -> Self {
        let src = vs.variables();

        tch::no_grad(|| NamedTensors {
            named_tensors: HashMap::from_iter(
                src.iter().map(|(k, v)| (k.clone(), deep_copy(v))),
            ),
        })
    }

    /// Copy named tensors to [VarStore].
    pub fn copy_to(&self, vs: &mut VarStore) -> Result<()> {
        let src = &self.named_tensors;
        let dest = &mut vs.variables();
        if src.len() != dest.len() {
            return Err(anyhow!(
                "State dict has {} tensors, the network has {}",
                src.len(),
                dest.len()
            ));
        }

        tch::no_grad(|| -> Result<()> {
            for (name, src) in src.iter() {
                let dest = dest
                    .get_mut(name)
                    .ok_or_else(|| anyhow!("Unexpected key {} in state dict", name))?;
                dest.copy_(src);
            }
            Ok(())
        })
    }

    /// Returns `true` if all tensors of `self` and `other` are equal.
    pub fn equal(&self, other: &Self) -> bool {
        self.named_tensors.len() == other.named_tensors.len()
            && self.named_tensors.iter().all(|(k, v)| match other.named_tensors.get(k) {
                Some(w) => v.equal(w),
                None => false,
            })
    }
}

impl Clone for NamedTensors {
    fn clone(&self) -> Self {
        let src = &self.named_tensors;

        tch::no_grad(|| NamedTensors {
            named_tensors: HashMap::from_iter(
                src.iter().map(|(k, v)| (k.clone(), deep_copy(v))),
            ),
        })
    }
}

impl std::fmt::Debug for NamedTensors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys = self.named_tensors.keys().collect::<Vec<_>>();
        keys.sort();
        f.debug_struct("NamedTensors").field("keys", &keys).finish()
    }
}
