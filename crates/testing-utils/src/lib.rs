//! # Arith Testing Utils
//!
//! Shared test helpers for the workspace: throwaway databases, entity
//! builders and polling helpers.
//!
//! ```toml
//! [dev-dependencies]
//! arith-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod helpers;

pub use builders::*;
pub use containers::*;
pub use helpers::*;
