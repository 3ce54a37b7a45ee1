//! Domain layer types and invariants.

pub mod ids;
pub mod records;
pub mod views;
