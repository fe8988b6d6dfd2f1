//! Public facade crate for `webcite`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the backend-agnostic types/traits from `webcite-core`;
//! the reqwest-backed providers live in `webcite-local`.

pub use webcite_core::*;
