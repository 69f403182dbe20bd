//! DDPG agent with a categorical critic.
mod base;
pub use base::Ddpg;

/// Configuration of [`Ddpg`].
pub type DdpgConfig<C> = crate::config::AgentConfig<C>;

/// Coefficient of the L2 penalty on the raw actor output.
pub(crate) const ACTOR_L2: f64 = 1e-3;

/// Maximum global gradient norm of actor-critic updates.
pub(crate) const MAX_GRAD_NORM: f64 = 0.5;
