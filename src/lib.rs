//! Mixer — a read-only federated query service over a knowledge graph of
//! statistical observations.
//!
//! A request fans out across an in-memory overlay (the hottest, most
//! recently published data) and a fixed-priority list of persistent
//! row-store instances, merges by source priority or a ranking table
//! depending on the operation, and returns a typed response. The core
//! never writes to the graph it serves.

#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod dcid;
pub mod error;
pub mod handlers;
pub mod index;
pub mod key;
pub mod rank;
pub mod relational;
pub mod store;

pub use dcid::Dcid;
pub use error::{MixerError, MixerResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
