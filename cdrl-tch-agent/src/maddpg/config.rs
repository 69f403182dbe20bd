//! Configuration of the multi-agent DDPG agent.
use crate::config::AgentConfig;
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Geometry of the spatial observations used to crop neighbor views.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct BlindConfig {
    /// Side length of the square field of view, in map units.
    pub field_of_view: f64,

    /// Map units per grid cell.
    pub square_step: f64,

    /// Number of trailing observation channels; the first of them marks neighbor positions.
    pub observation_dims: i64,
}

impl Default for BlindConfig {
    fn default() -> Self {
        Self {
            field_of_view: 5.0,
            square_step: 1.0,
            observation_dims: 1,
        }
    }
}

impl BlindConfig {
    /// Padding added around the map by the environment, in cells.
    pub fn pad_width(&self) -> i64 {
        (1.0 + ((self.field_of_view - 1.0) / 2.0) / self.square_step).floor() as i64
    }
}

/// Configuration of [`Maddpg`](super::Maddpg).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MaddpgConfig<C> {
    pub(crate) agent: AgentConfig<C>,

    /// Slot of the joint action holding the agent's own action.
    pub(crate) self_slot: usize,

    #[serde(default)]
    pub(crate) blind: BlindConfig,
}

impl<C> Default for MaddpgConfig<C> {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            self_slot: 0,
            blind: BlindConfig::default(),
        }
    }
}

impl<C> MaddpgConfig<C>
where
    C: DeserializeOwned + Serialize,
{
    /// Sets the configuration shared with the single-agent variants.
    pub fn agent(mut self, v: AgentConfig<C>) -> Self {
        self.agent = v;
        self
    }

    /// Sets the slot of the agent's own action in the joint action.
    pub fn self_slot(mut self, v: usize) -> Self {
        self.self_slot = v;
        self
    }

    /// Sets the observation geometry.
    pub fn blind(mut self, v: BlindConfig) -> Self {
        self.blind = v;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let c = serde_yaml::from_reader(rdr)?;
        info!("Load config of MADDPG agent from {}", path_.to_str().unwrap_or("?"));
        Ok(c)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of MADDPG agent into {}", path_.to_str().unwrap_or("?"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mlp::ActorCriticMlpConfig, selector::ActionSelection};

    #[test]
    fn pad_width_follows_field_of_view() {
        let blind = BlindConfig {
            field_of_view: 7.0,
            square_step: 1.0,
            observation_dims: 2,
        };
        assert_eq!(blind.pad_width(), 4);
        let blind = BlindConfig {
            square_step: 2.0,
            ..blind
        };
        assert_eq!(blind.pad_width(), 2);
    }

    #[test]
    fn yaml_round_trip() {
        let dir = tempdir::TempDir::new("maddpg_config").unwrap();
        let path = dir.path().join("maddpg.yaml");
        let agent = AgentConfig::default()
            .model_config(ActorCriticMlpConfig::new(8, vec![16], 4, 11).n_slots(3))
            .action_selection(ActionSelection::Boltzmann)
            .batch_size(8);
        let config = MaddpgConfig::default().agent(agent).self_slot(1);
        config.save(&path).unwrap();
        assert_eq!(MaddpgConfig::load(&path).unwrap(), config);
    }
}
