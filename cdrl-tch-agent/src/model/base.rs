//! Definition of interfaces of neural networks.
use anyhow::Result;
use std::path::Path;
use tch::{nn, nn::VarStore, Tensor};

/// Base interface.
pub trait ModelBase {
    /// Trains the network given a loss.
    fn backward_step(&mut self, loss: &Tensor);

    /// Trains the network given a loss, clipping the global gradient norm at `max_norm`.
    fn backward_step_clip_norm(&mut self, loss: &Tensor, max_norm: f64);

    /// Returns `var_store` as mutable reference.
    fn get_var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Returns `var_store`.
    fn get_var_store(&self) -> &nn::VarStore;

    /// Save parameters of the neural network.
    fn save<T: AsRef<Path>>(&self, path: T) -> Result<()>;

    /// Load parameters of the neural network.
    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()>;
}

/// Neural network model that can be initialized with [`VarStore`] and configuration.
///
/// Modules consisting a neural network share a [`VarStore`], so structs implementing
/// this trait are initialized with a given [`VarStore`]. Cloning with another
/// [`VarStore`] is used to create target networks.
///
/// [`VarStore`]: https://docs.rs/tch/0.16.0/tch/nn/struct.VarStore.html
pub trait SubModel {
    /// Configuration from which [`SubModel`] is constructed.
    type Config;

    /// Builds [`SubModel`] with [`VarStore`] and [`SubModel::Config`].
    fn build(var_store: &VarStore, config: Self::Config) -> Self;

    /// Clones [`SubModel`] with [`VarStore`].
    fn clone_with_var_store(&self, var_store: &VarStore) -> Self;

    /// Resamples the exploration noise of noisy layers, if any.
    fn reset_noise(&mut self) {}

    /// Switches between training and evaluation behavior, if any.
    fn set_train(&mut self, _train: bool) {}
}

/// Network returning a categorical return distribution for every action.
pub trait CategoricalQ: SubModel {
    /// Returns distributions of shape `[batch, n_actions, atoms]`.
    ///
    /// Each row over the last axis sums to one, or log-sums to zero when `log` is `true`.
    fn forward(&self, xs: &Tensor, log: bool) -> Tensor;
}

/// Actor-critic network with a categorical critic.
pub trait ActorCritic: SubModel {
    /// Returns action scores of shape `[batch, n_actions]`.
    fn actor(&self, xs: &Tensor) -> Tensor;

    /// Returns the return distribution of shape `[batch, atoms]` for the given action input.
    ///
    /// `act` is either `[batch, n_actions]` or the joint action `[batch, slots, n_actions]`.
    fn critic(&self, xs: &Tensor, act: &Tensor, log: bool) -> Tensor;
}
