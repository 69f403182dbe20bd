//! Core functionalities.
mod env;
pub use env::{ActionSpace, Env};
