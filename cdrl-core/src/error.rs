//! Errors in the library.
use std::path::PathBuf;
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// A pretrained model was requested but the file does not exist.
    #[error("Pretrained model not found: {0}")]
    ModelNotFound(PathBuf),

    /// An index given to one-hot encoding is outside of `[-1, num_classes)`.
    #[error("One-hot index {index} is out of range [-1, {num_classes})")]
    OneHotIndex {
        /// The offending index.
        index: i64,
        /// The number of classes of the encoding.
        num_classes: i64,
    },

    /// A row of an availability mask has no selectable action.
    #[error("No available action in row {0}")]
    NoAvailableAction(usize),

    /// Parameters of a categorical support are invalid.
    #[error("Invalid support: atoms = {atoms}, v_min = {v_min}, v_max = {v_max}")]
    InvalidSupport {
        /// Number of atoms.
        atoms: i64,
        /// Lower bound of the support.
        v_min: f64,
        /// Upper bound of the support.
        v_max: f64,
    },

    /// Shapes of tensors or sequences do not match.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A projected bin index fell outside of the support.
    #[error("Projection bin index out of bounds: [{min}, {max}] not within [0, {atoms})")]
    ProjectionOutOfBounds {
        /// Smallest index computed.
        min: i64,
        /// Largest index computed.
        max: i64,
        /// Number of atoms.
        atoms: i64,
    },

    /// The spatial layout of neighbors in an observation is inconsistent.
    #[error("Neighbor layout error: {0}")]
    NeighborLayout(String),

    /// The registry of sibling agents is no longer alive.
    #[error("Sibling registry has been dropped")]
    RegistryDropped,

    /// A sibling index is not registered.
    #[error("Unknown sibling agent: {0}")]
    UnknownSibling(usize),

    /// Not enough transitions to build a batch.
    #[error("Memory holds {len} transitions, cannot sample a batch of {batch_size}")]
    EmptyMemory {
        /// Number of stored transitions.
        len: usize,
        /// Requested batch size.
        batch_size: usize,
    },
}
