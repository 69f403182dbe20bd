//! Records of values computed in learning steps.
//!
//! Every `learn` call of an agent returns a [`Record`] holding named values
//! such as the critic loss or the current average-reward estimate. The driver
//! decides what to do with them (logging, aggregation, early stopping).
//!
//! ```rust
//! use cdrl_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss_critic", 0.25);
//! record.insert("priorities", RecordValue::Array1(vec![0.1, 0.4]));
//! assert_eq!(record.get_scalar("loss_critic").unwrap(), 0.25);
//! ```
mod base;

pub use base::{Record, RecordValue};
