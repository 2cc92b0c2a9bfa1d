//! One-shot input discovery.
//!
//! Stands in for the watcher: walks the input directory once and reads every
//! supported file into a [`BatchFile`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use processor_core::error::ProcessorError;
use processor_core::models::InputFormat;
use processor_runtime::pipeline::BatchFile;
use tracing::{debug, warn};

/// A discovered file that was left out of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Files in discovery order (sorted by path).
    pub files: Vec<BatchFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Collect all `.json`, `.yaml` and `.yml` files below `input_dir`.
///
/// Paths in the returned batch are relative to `input_dir`. Files larger than
/// `max_bytes` or unreadable files are skipped with a warning.
pub fn collect_batch(input_dir: &Path, max_bytes: u64) -> Result<ScanOutcome, ProcessorError> {
    if !input_dir.is_dir() {
        return Err(ProcessorError::InputDirectoryNotFound(input_dir.to_path_buf()));
    }

    let mut outcome = ScanOutcome::default();

    let entries = walkdir::WalkDir::new(input_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("cannot access input entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file());

    for entry in entries {
        let path = entry.path();
        let Some(format) = InputFormat::from_path(path) else {
            debug!(path = %path.display(), "ignoring unsupported file");
            continue;
        };
        let relative = path.strip_prefix(input_dir).unwrap_or(path).to_path_buf();

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                outcome.skip(relative, format!("cannot read metadata: {}", e));
                continue;
            }
        };

        if metadata.len() > max_bytes {
            outcome.skip(
                relative,
                format!("{} bytes exceeds the {} byte limit", metadata.len(), max_bytes),
            );
            continue;
        }

        let content = match fs::read(path) {
            Ok(content) => content,
            Err(source) => {
                let err = ProcessorError::FileRead {
                    path: path.to_path_buf(),
                    source,
                };
                outcome.skip(relative, err.to_string());
                continue;
            }
        };

        let modified_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH));

        outcome
            .files
            .push(BatchFile::new(relative, content, format, modified_at));
    }

    Ok(outcome)
}

impl ScanOutcome {
    fn skip(&mut self, path: PathBuf, reason: String) {
        warn!(path = %path.display(), "skipping input file: {}", reason);
        self.skipped.push(SkippedFile { path, reason });
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
