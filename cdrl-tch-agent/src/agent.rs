//! Operations shared by the agents.
use crate::{model::SubModel, twin::TwinNet, util::NamedTensors};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether the task is split into episodes.
///
/// In [`TaskMode::Episodic`] mode the average-reward estimate is reset to zero at
/// the beginning of every learning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum TaskMode {
    /// A single never-ending task.
    Continuing,

    /// Independent episodes.
    Episodic,
}

impl Default for TaskMode {
    fn default() -> Self {
        Self::Continuing
    }
}

/// An agent owning online and target networks.
///
/// Synchronization, rollback and persistence are provided on top of
/// [`Agent::nets`] and [`Agent::nets_mut`].
pub trait Agent {
    /// The network of the agent.
    type Net: SubModel;

    /// Index of the agent, used to name model files.
    fn index(&self) -> usize;

    /// The online/target pair.
    fn nets(&self) -> &TwinNet<Self::Net>;

    /// The online/target pair as mutable reference.
    fn nets_mut(&mut self) -> &mut TwinNet<Self::Net>;

    /// Switches to training behavior.
    fn train(&mut self) {
        self.nets_mut().set_train(true);
    }

    /// Switches to evaluation behavior.
    fn eval(&mut self) {
        self.nets_mut().set_train(false);
    }

    /// Resamples the exploration noise of the online network.
    fn reset_noise(&mut self) {
        self.nets_mut().reset_noise();
    }

    /// Hard copy of the online parameters to the target network.
    fn update_target_net(&mut self) -> Result<()> {
        self.nets_mut().update_target_net()
    }

    /// `target = target * (1 - tau) + online * tau`.
    fn soft_update_target_net(&mut self, tau: f64) -> Result<()> {
        self.nets_mut().soft_update_target_net(tau)
    }

    /// Keeps the current parameters as the rollback point if `better`, otherwise rolls back.
    fn reload_step_state_dict(&mut self, better: bool) -> Result<()> {
        self.nets_mut().reload_step_state_dict(better)
    }

    /// Copy of the online parameters.
    fn get_state_dict(&self) -> NamedTensors {
        self.nets().get_state_dict()
    }

    /// Overwrites the online parameters.
    fn set_state_dict(&mut self, params: &NamedTensors) -> Result<()> {
        self.nets_mut().set_state_dict(params)
    }

    /// Copy of the target parameters.
    fn get_target_dict(&self) -> NamedTensors {
        self.nets().get_target_dict()
    }

    /// Overwrites the target parameters.
    fn set_target_dict(&mut self, params: &NamedTensors) -> Result<()> {
        self.nets_mut().set_target_dict(params)
    }

    /// Saves the online parameters under `path`.
    ///
    /// With `Some(index)`, the index is spliced before the extension of `name`.
    fn save(&self, path: impl AsRef<Path>, index: Option<usize>, name: &str) -> Result<PathBuf> {
        self.nets().save(path, index, name)
    }
}
