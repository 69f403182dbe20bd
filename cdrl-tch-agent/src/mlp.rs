//! Multilayer perceptrons implementing the network interfaces.
mod actor_critic;
mod categorical;
mod config;
pub use actor_critic::ActorCriticMlp;
pub use categorical::CategoricalMlp;
pub use config::{ActorCriticMlpConfig, CategoricalMlpConfig};
use tch::nn;

/// Hidden layers with ReLU activation, followed by a linear output layer.
fn mlp(p: &nn::Path, in_dim: i64, units: &[i64], out_dim: i64) -> nn::Sequential {
    let mut seq = nn::seq();
    let mut in_dim = in_dim;

    for (i, &n) in units.iter().enumerate() {
        seq = seq.add(nn::linear(
            p / format!("ln{}", i),
            in_dim,
            n,
            Default::default(),
        ));
        seq = seq.add_fn(|x| x.relu());
        in_dim = n;
    }

    seq.add(nn::linear(
        p / format!("ln{}", units.len()),
        in_dim,
        out_dim,
        Default::default(),
    ))
}
