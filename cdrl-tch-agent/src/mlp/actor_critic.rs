use super::{mlp, ActorCriticMlpConfig};
use crate::model::{ActorCritic, SubModel};
use tch::{nn, nn::Module, Device, Kind, Tensor};

/// Actor and categorical critic sharing a [`VarStore`](nn::VarStore).
///
/// The actor output is squashed with `tanh`. The critic takes the flattened state
/// concatenated with the flattened action input.
pub struct ActorCriticMlp {
    config: ActorCriticMlpConfig,
    device: Device,
    actor: nn::Sequential,
    critic: nn::Sequential,
}

impl ActorCriticMlp {
    fn create_nets(
        var_store: &nn::VarStore,
        config: &ActorCriticMlpConfig,
    ) -> (nn::Sequential, nn::Sequential) {
        let root = var_store.root();
        let actor = mlp(
            &(&root / "actor"),
            config.in_dim,
            &config.units,
            config.n_actions,
        )
        .add_fn(|x| x.tanh());
        let critic = mlp(
            &(&root / "critic"),
            config.in_dim + config.n_slots * config.n_actions,
            &config.units,
            config.atoms,
        );
        (actor, critic)
    }
}

impl SubModel for ActorCriticMlp {
    type Config = ActorCriticMlpConfig;

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        let device = var_store.device();
        let (actor, critic) = Self::create_nets(var_store, &config);

        Self {
            config,
            device,
            actor,
            critic,
        }
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        Self::build(var_store, self.config.clone())
    }
}

impl ActorCritic for ActorCriticMlp {
    fn actor(&self, xs: &Tensor) -> Tensor {
        self.actor.forward(&xs.to(self.device).flatten(1, -1))
    }

    fn critic(&self, xs: &Tensor, act: &Tensor, log: bool) -> Tensor {
        let xs = xs.to(self.device).flatten(1, -1);
        let act = act.to(self.device).flatten(1, -1);
        let logits = self.critic.forward(&Tensor::cat(&[xs, act], -1));
        match log {
            true => logits.log_softmax(-1, Kind::Float),
            false => logits.softmax(-1, Kind::Float),
        }
    }
}
