//! # Orchestrator Testing Utils
//!
//! Shared testing utilities for the task-scheduling core.
//! This crate provides in-memory mock implementations of the repository
//! traits and builder-pattern constructors for test data, usable across
//! all other crates in the workspace.
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use mocks::*;
