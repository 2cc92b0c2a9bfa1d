//! Batch orchestration layer for the vCenter processor.
//!
//! Wires classification, extraction, normalization, aggregation and export
//! into a single synchronous [`pipeline::run_batch`] call and reports the
//! outcome per file and per group.

pub mod pipeline;

pub use processor_core as core;
pub use processor_data as data;
pub use processor_export as export;
