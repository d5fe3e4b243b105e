//! Error handling, logging and test helpers shared across tuplesift

pub mod error;
pub mod logging;

pub mod test_utils;

pub use error::{Error, Result};
