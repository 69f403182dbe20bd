//! Environment.

/// The part of an environment the agents depend on: the size of its discrete action space.
///
/// Dynamics, observations and rewards are handled by the training driver and
/// the replay memory, never by the agents themselves.
pub trait Env {
    /// Returns the number of actions.
    fn action_size(&self) -> usize;
}

/// An environment described only by its number of actions.
///
/// Useful when agents are built in a process that does not run the environment,
/// e.g., a learner fed by worker processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpace(pub usize);

impl Env for ActionSpace {
    fn action_size(&self) -> usize {
        self.0
    }
}
