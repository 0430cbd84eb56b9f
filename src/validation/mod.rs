//! Validation of provider output.
//!
//! Raw provider payloads are checked against the adapted-content schema
//! before anything reaches the cache or a renderer.

pub mod response_validator;

pub use response_validator::{Repair, RepairLog, ResponseValidator};
