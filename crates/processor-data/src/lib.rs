//! Extraction and normalization layer for the vCenter processor.
//!
//! Responsible for classifying input paths, pulling VM and alarm entries out
//! of heterogeneous Ansible JSON/YAML documents, coercing them into the typed
//! schema and folding them into a deduplicated per-environment dataset.

pub mod aggregator;
pub mod classifier;
pub mod extractor;
pub mod normalizer;

pub use processor_core as core;
