//! Utilities.
use crate::model::ModelBase;
use anyhow::{anyhow, Result};
use log::trace;
mod named_tensors;
pub use named_tensors::NamedTensors;

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track<M: ModelBase>(dest: &mut M, src: &M, tau: f64) -> Result<()> {
    let src = src.get_var_store().variables();
    let mut dest = dest.get_var_store().variables();
    debug_assert_eq!(src.len(), dest.len());

    tch::no_grad(|| -> Result<()> {
        for (name, src) in src.iter() {
            let dest = dest
                .get_mut(name)
                .ok_or_else(|| anyhow!("Variable {} missing in the target network", name))?;
            dest.copy_(&(tau * src + (1.0 - tau) * &*dest));
        }
        Ok(())
    })?;
    trace!("soft update");
    Ok(())
}

/// Converts a shape given as `usize` into the `i64` shape used by tch.
pub fn to_i64_shape(shape: &[usize]) -> Vec<i64> {
    shape.iter().map(|&d| d as i64).collect()
}
