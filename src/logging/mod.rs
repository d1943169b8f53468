//! Structured logging with pass and tracker context.
//!
//! Provides logging macros and utilities that include the aggregation pass
//! id (or tracker id) in every log message for easy correlation.

pub mod structured;

pub use structured::*;
