//! Shared building blocks for the vCenter processor.
//!
//! Holds the normalized record schema, the error taxonomy, tolerant value
//! coercion helpers and the process-wide configuration types.

pub mod data_processors;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod settings;
