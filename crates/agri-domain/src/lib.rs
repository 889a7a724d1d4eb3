//! Domain types shared across AgriConnect OTP components.
//!
//! This crate contains only pure types with no framework dependencies.
//! Import in `usecase/` and `domain/` layers; never depend on `infra/` from here.

pub mod challenge;
pub mod id;
pub mod purpose;
pub mod recipient;
