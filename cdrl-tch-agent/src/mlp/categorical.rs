use super::{mlp, CategoricalMlpConfig};
use crate::model::{CategoricalQ, SubModel};
use tch::{nn, nn::Module, Device, Kind, Tensor};

/// Multilayer perceptron returning a categorical distribution for every action.
pub struct CategoricalMlp {
    config: CategoricalMlpConfig,
    device: Device,
    seq: nn::Sequential,
}

impl CategoricalMlp {
    fn create_net(var_store: &nn::VarStore, config: &CategoricalMlpConfig) -> nn::Sequential {
        let p = &(var_store.root() / "categorical");
        mlp(
            p,
            config.in_dim,
            &config.units,
            config.n_actions * config.atoms,
        )
    }
}

impl SubModel for CategoricalMlp {
    type Config = CategoricalMlpConfig;

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        let device = var_store.device();
        let seq = Self::create_net(var_store, &config);

        Self {
            config,
            device,
            seq,
        }
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        Self::build(var_store, self.config.clone())
    }
}

impl CategoricalQ for CategoricalMlp {
    fn forward(&self, xs: &Tensor, log: bool) -> Tensor {
        let xs = xs.to(self.device).flatten(1, -1);
        let logits = self
            .seq
            .forward(&xs)
            .view([-1, self.config.n_actions, self.config.atoms]);
        match log {
            true => logits.log_softmax(-1, Kind::Float),
            false => logits.softmax(-1, Kind::Float),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_distributions() {
        let vs = nn::VarStore::new(Device::Cpu);
        let net = CategoricalMlp::build(&vs, CategoricalMlpConfig::new(4, vec![16], 3, 11));
        let xs = Tensor::rand([5, 4], (Kind::Float, Device::Cpu));
        let ps = net.forward(&xs, false);
        assert_eq!(ps.size(), vec![5, 3, 11]);
        let sums = ps.sum_dim_intlist(Some([-1].as_slice()), false, Kind::Float);
        let ones = Tensor::ones([5, 3], (Kind::Float, Device::Cpu));
        assert!(sums.allclose(&ones, 1e-5, 1e-5, false));

        let log_ps = net.forward(&xs, true);
        assert!(log_ps.exp().allclose(&ps, 1e-5, 1e-5, false));
    }
}
