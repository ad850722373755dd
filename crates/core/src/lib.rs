//! Core library for ccache-ci
//!
//! This crate contains the decision logic and orchestration for caching
//! compiler-cache directories on CI runners: key derivation, restore and save
//! protocol, stats parsing, eviction policy, tool installation and
//! configuration, the cross-phase job state, logging, and error handling.

pub mod configure;
pub mod context;
pub mod errors;
pub mod eviction;
pub mod install;
pub mod keys;
pub mod logging;
pub mod outcome;
pub mod platform;
pub mod retry;
pub mod save;
pub mod setup;
pub mod state;
pub mod stats;
pub mod store;
pub mod summary;
pub mod tool;
pub mod variant;
pub mod version;
pub mod workflow;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
