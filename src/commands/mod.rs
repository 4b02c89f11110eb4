//! Commands module
//!
//! Boundary operations exposed to the host application.

pub mod browse;

pub use browse::*;
