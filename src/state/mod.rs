//! State input module.
//!
//! The collaborators that feed the aggregator:
//! - Discovery of state file locations and their metadata
//! - Loading and parsing of state documents

pub mod discovery;
pub mod loader;
pub mod models;

pub use discovery::*;
pub use loader::*;
pub use models::*;
