//! Test utilities for AgriConnect services.
//!
//! Import in `#[cfg(test)]` blocks and integration tests only; never in production code.

pub mod clock;
