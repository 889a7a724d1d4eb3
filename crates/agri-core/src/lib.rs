//! Service plumbing shared by AgriConnect services: tracing, request ids,
//! health probes, error responses, timestamps and the clock abstraction.

pub mod clock;
pub mod error;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
