//! Data model shared by the rbacgraph crates.
//!
//! Everything here is a plain value: produced fresh by an extraction call,
//! never mutated across calls.

pub mod config;
pub mod error;
pub mod identity;
pub mod rbac;
pub mod workload;

pub use error::{Error, Result};
