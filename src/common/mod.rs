//! Chain-facing types and collaborator interfaces shared across the engine

pub mod types;
pub mod traits;
