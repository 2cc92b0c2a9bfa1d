//! Output layer for the vCenter processor.
//!
//! Writes each deduplicated `(client, environment)` group as CSV, Excel and
//! JSON artifacts (all-or-nothing per group) and produces the batch summary
//! report.

pub mod error;
pub mod excel;
pub mod exporter;
pub mod summary;

pub use processor_core as core;
pub use processor_data as data;
