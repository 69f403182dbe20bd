//! Configuration shared by the agents.
use crate::{opt::OptimizerConfig, selector::ActionSelection, Device};
use anyhow::{Context, Result};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Configuration of a distributional agent, generic over the network configuration `C`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct AgentConfig<C> {
    pub(crate) model_config: Option<C>,
    pub(crate) opt_config: OptimizerConfig,
    pub(crate) atoms: i64,
    pub(crate) v_min: f64,
    pub(crate) v_max: f64,
    pub(crate) batch_size: usize,
    pub(crate) multi_step: usize,
    pub(crate) discount: f64,
    pub(crate) reward_update_rate: f64,
    pub(crate) action_selection: ActionSelection,
    #[serde(default)]
    pub(crate) model_dir: Option<PathBuf>,
    pub device: Option<Device>,
}

impl<C> Default for AgentConfig<C> {
    fn default() -> Self {
        Self {
            model_config: None,
            opt_config: OptimizerConfig::default(),
            atoms: 51,
            v_min: -10.0,
            v_max: 10.0,
            batch_size: 32,
            multi_step: 3,
            discount: 0.99,
            reward_update_rate: 1e-3,
            action_selection: ActionSelection::Greedy,
            model_dir: None,
            device: None,
        }
    }
}

impl<C> AgentConfig<C>
where
    C: DeserializeOwned + Serialize,
{
    /// Sets the configuration of the network.
    pub fn model_config(mut self, v: C) -> Self {
        self.model_config = Some(v);
        self
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the number of atoms of the support.
    pub fn atoms(mut self, v: i64) -> Self {
        self.atoms = v;
        self
    }

    /// Sets the range of the support.
    pub fn support_range(mut self, v_min: f64, v_max: f64) -> Self {
        self.v_min = v_min;
        self.v_max = v_max;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the number of steps of the bootstrapped return.
    pub fn multi_step(mut self, v: usize) -> Self {
        self.multi_step = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount(mut self, v: f64) -> Self {
        self.discount = v;
        self
    }

    /// Sets the step size of the average-reward estimate.
    pub fn reward_update_rate(mut self, v: f64) -> Self {
        self.reward_update_rate = v;
        self
    }

    /// Sets the action selection policy.
    pub fn action_selection(mut self, v: ActionSelection) -> Self {
        self.action_selection = v;
        self
    }

    /// Sets the directory holding pretrained `model<index>.pth` files.
    pub fn model_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(v.into());
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: tch::Device) -> Self {
        self.device = Some(v.into());
        self
    }

    /// `discount^multi_step`, the factor applied to bootstrapped values.
    pub fn discount_n(&self) -> f64 {
        self.discount.powi(self.multi_step as i32)
    }

    pub(crate) fn take_model_config(&mut self) -> Result<C> {
        self.model_config
            .take()
            .context("Model configuration is not set")
    }

    pub(crate) fn pretrained_path(&self, index: usize) -> Option<PathBuf> {
        self.model_dir
            .as_ref()
            .map(|dir| crate::twin::model_path(dir, index))
    }

    pub(crate) fn tch_device(&self) -> tch::Device {
        self.device.map(Into::into).unwrap_or(tch::Device::Cpu)
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let c = serde_yaml::from_reader(rdr)?;
        info!("Load config of agent from {}", path_.to_str().unwrap_or("?"));
        Ok(c)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of agent into {}", path_.to_str().unwrap_or("?"));
        Ok(())
    }
}
