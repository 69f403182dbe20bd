use super::{ModelBase, SubModel};
use crate::{
    opt::{Optimizer, OptimizerConfig},
    util::NamedTensors,
};
use anyhow::Result;
use log::{info, trace};
use std::path::Path;
use tch::{nn, Device, Tensor};

/// A network together with its [`VarStore`](nn::VarStore) and optimizer.
pub struct DistModel<N: SubModel> {
    device: Device,
    var_store: nn::VarStore,
    net: N,
    opt_config: OptimizerConfig,
    opt: Optimizer,
}

impl<N> DistModel<N>
where
    N: SubModel,
{
    /// Constructs the network and its optimizer on `device`.
    pub fn build(config: N::Config, opt_config: OptimizerConfig, device: Device) -> Result<Self> {
        let var_store = nn::VarStore::new(device);
        let net = N::build(&var_store, config);

        Self::_build(device, opt_config, net, var_store, None)
    }

    fn _build(
        device: Device,
        opt_config: OptimizerConfig,
        net: N,
        mut var_store: nn::VarStore,
        var_store_src: Option<&nn::VarStore>,
    ) -> Result<Self> {
        let opt = opt_config.build(&var_store)?;

        if let Some(var_store_src) = var_store_src {
            var_store.copy(var_store_src)?;
        }

        Ok(Self {
            device,
            var_store,
            net,
            opt_config,
            opt,
        })
    }

    /// Clones the network with its own parameters, copied from `self`.
    pub fn try_clone(&self) -> Result<Self> {
        let var_store = nn::VarStore::new(self.device);
        let net = self.net.clone_with_var_store(&var_store);

        Self::_build(
            self.device,
            self.opt_config.clone(),
            net,
            var_store,
            Some(&self.var_store),
        )
    }

    /// The device where the parameters live.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Returns the network.
    pub fn net(&self) -> &N {
        &self.net
    }

    /// Returns the network as mutable reference.
    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }

    /// Stops gradient tracking of all the parameters.
    pub fn freeze(&mut self) {
        self.var_store.freeze();
    }

    /// Copies the parameters to CPU.
    pub fn snapshot(&self) -> NamedTensors {
        NamedTensors::copy_from(&self.var_store)
    }

    /// Overwrites the parameters with `params`.
    pub fn restore(&mut self, params: &NamedTensors) -> Result<()> {
        params.copy_to(&mut self.var_store)
    }
}

impl<N> ModelBase for DistModel<N>
where
    N: SubModel,
{
    fn backward_step(&mut self, loss: &Tensor) {
        self.opt.backward_step(loss);
    }

    fn backward_step_clip_norm(&mut self, loss: &Tensor, max_norm: f64) {
        self.opt.backward_step_clip_norm(loss, max_norm);
    }

    fn get_var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.var_store
    }

    fn get_var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.var_store.save(&path)?;
        info!("Save model to {:?}", path.as_ref());
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.var_store.load(&path)?;
        info!("Load model from {:?}", path.as_ref());
        Ok(())
    }
}
