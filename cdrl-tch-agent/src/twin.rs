//! Online and target networks with a one-level rollback buffer.
use crate::{
    model::{DistModel, ModelBase, SubModel},
    opt::OptimizerConfig,
    util::{track, NamedTensors},
};
use anyhow::Result;
use cdrl_core::error::CoreError;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tch::Device;

/// Path of the pretrained model of the agent with `index` in `model_dir`.
pub fn model_path(model_dir: impl AsRef<Path>, index: usize) -> PathBuf {
    model_dir.as_ref().join(format!("model{}.pth", index))
}

/// Splices `index` before the extension of `name`, e.g. `model.pth` to `model3.pth`.
pub fn indexed_name(name: &str, index: usize) -> String {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            "{}{}.{}",
            stem.to_string_lossy(),
            index,
            ext.to_string_lossy()
        ),
        _ => format!("{}{}", name, index),
    }
}

/// The online network, its target copy, and snapshots of both.
pub struct TwinNet<N: SubModel> {
    online: DistModel<N>,
    target: DistModel<N>,
    online_dict: NamedTensors,
    target_dict: NamedTensors,
}

impl<N> TwinNet<N>
where
    N: SubModel,
{
    /// Builds the online network and a target network holding the same parameters.
    ///
    /// If `pretrained` is given, the online parameters are loaded from it first;
    /// a missing file is an error.
    pub fn build(
        config: N::Config,
        opt_config: OptimizerConfig,
        device: Device,
        pretrained: Option<PathBuf>,
    ) -> Result<Self> {
        let mut online = DistModel::<N>::build(config, opt_config, device)?;
        if let Some(path) = pretrained {
            if !path.is_file() {
                return Err(CoreError::ModelNotFound(path).into());
            }
            online.load(&path)?;
            info!("Loading pretrained model: {:?}", path);
        }
        online.net_mut().set_train(true);

        let mut target = online.try_clone()?;
        target.freeze();
        target.net_mut().set_train(true);

        let online_dict = online.snapshot();
        let target_dict = target.snapshot();

        Ok(Self {
            online,
            target,
            online_dict,
            target_dict,
        })
    }

    /// The trained network.
    pub fn online(&self) -> &DistModel<N> {
        &self.online
    }

    /// The trained network as mutable reference.
    pub fn online_mut(&mut self) -> &mut DistModel<N> {
        &mut self.online
    }

    /// The target network.
    pub fn target(&self) -> &DistModel<N> {
        &self.target
    }

    /// The target network as mutable reference.
    pub fn target_mut(&mut self) -> &mut DistModel<N> {
        &mut self.target
    }

    /// Copies the online parameters into the target network.
    pub fn update_target_net(&mut self) -> Result<()> {
        self.target
            .get_var_store_mut()
            .copy(self.online.get_var_store())?;
        debug!("Hard update of the target network");
        Ok(())
    }

    /// Moves the target parameters towards the online ones by `tau`.
    pub fn soft_update_target_net(&mut self, tau: f64) -> Result<()> {
        track(&mut self.target, &self.online, tau)
    }

    /// Takes snapshots of both networks if `better`, otherwise restores the last snapshots.
    pub fn reload_step_state_dict(&mut self, better: bool) -> Result<()> {
        if better {
            self.online_dict = self.online.snapshot();
            self.target_dict = self.target.snapshot();
            debug!("Took snapshots of the networks");
        } else {
            self.online.restore(&self.online_dict)?;
            self.target.restore(&self.target_dict)?;
            debug!("Restored the networks from the snapshots");
        }
        Ok(())
    }

    /// Copy of the online parameters.
    pub fn get_state_dict(&self) -> NamedTensors {
        self.online.snapshot()
    }

    /// Overwrites the online parameters.
    pub fn set_state_dict(&mut self, params: &NamedTensors) -> Result<()> {
        self.online.restore(params)
    }

    /// Copy of the target parameters.
    pub fn get_target_dict(&self) -> NamedTensors {
        self.target.snapshot()
    }

    /// Overwrites the target parameters.
    pub fn set_target_dict(&mut self, params: &NamedTensors) -> Result<()> {
        self.target.restore(params)
    }

    /// Saves the online parameters to `dir/name`, or `dir/<stem><index>.<ext>`.
    pub fn save(&self, dir: impl AsRef<Path>, index: Option<usize>, name: &str) -> Result<PathBuf> {
        let file_name = match index {
            Some(index) => indexed_name(name, index),
            None => name.to_string(),
        };
        let path = dir.as_ref().join(file_name);
        self.online.save(&path)?;
        Ok(path)
    }

    /// Switches the online network between training and evaluation behavior.
    pub fn set_train(&mut self, train: bool) {
        self.online.net_mut().set_train(train);
    }

    /// Resamples the exploration noise of the online network.
    pub fn reset_noise(&mut self) {
        self.online.net_mut().reset_noise();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_names() {
        assert_eq!(indexed_name("model.pth", 3), "model3.pth");
        assert_eq!(indexed_name("weights", 0), "weights0");
        assert_eq!(
            model_path("/tmp/models", 2),
            PathBuf::from("/tmp/models/model2.pth")
        );
    }
}
