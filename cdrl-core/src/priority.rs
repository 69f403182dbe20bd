//! Prioritized sampling of stored transitions.
//!
//! [`SumTree`] holds the priority of every slot of a ring buffer and draws
//! slot indices proportionally to `(p + eps)^alpha`. [`IwScheduler`] anneals
//! the exponent of the importance-sampling weights returned with each draw.
mod iw_scheduler;
mod sum_tree;
use serde::{Deserialize, Serialize};

pub use iw_scheduler::IwScheduler;
pub use sum_tree::SumTree;

/// Configuration of prioritized sampling.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Exponent for prioritization; `0` gives uniform sampling.
    pub alpha: f32,

    /// Initial exponent of importance-sampling weights.
    pub beta_0: f32,

    /// Final exponent of importance-sampling weights.
    pub beta_final: f32,

    /// Number of sampling steps after which `beta` reaches `beta_final`.
    pub n_opts_final: usize,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta_0: 0.4,
            beta_final: 1.0,
            n_opts_final: 500_000,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the initial importance-sampling exponent.
    pub fn beta_0(mut self, beta_0: f32) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the final importance-sampling exponent.
    pub fn beta_final(mut self, beta_final: f32) -> Self {
        self.beta_final = beta_final;
        self
    }

    /// Sets the number of steps to reach the final exponent.
    pub fn n_opts_final(mut self, n_opts_final: usize) -> Self {
        self.n_opts_final = n_opts_final;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_is_rejected_and_full_yaml_loads() {
        let yaml = "alpha: 0.6\nbeta_0: 0.4\nbeta_final: 1.0\nn_opts_final: 1000\n";
        let config: PerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config, PerConfig::default().alpha(0.6).n_opts_final(1000));
        assert!(serde_yaml::from_str::<PerConfig>("alpha: 0.6\n").is_err());
    }
}
