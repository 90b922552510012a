//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod openapi;
pub mod summary;
pub mod types;
