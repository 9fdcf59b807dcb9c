//! Tracing setup shared by the Farwatch binaries.

mod tracing;

pub use crate::tracing::{init, init_with_level};
