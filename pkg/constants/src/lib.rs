//! Centralized constants for the rbacgraph project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod kinds;
pub mod paths;
pub mod rbac;
