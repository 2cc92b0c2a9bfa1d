//! Path → `(client, environment)` classification.

use std::path::{Component, Path};

use processor_core::models::EnvironmentContext;
use processor_core::settings::EnvironmentMapping;

/// Outcome of classifying one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A path segment matched a mapping entry.
    Matched {
        context: EnvironmentContext,
        segment: String,
    },
    /// Nothing matched; the default `(unclassified, unknown)` context applies.
    Fallback(EnvironmentContext),
}

impl Classification {
    pub fn context(&self) -> &EnvironmentContext {
        match self {
            Classification::Matched { context, .. } => context,
            Classification::Fallback(context) => context,
        }
    }

    pub fn into_context(self) -> EnvironmentContext {
        match self {
            Classification::Matched { context, .. } => context,
            Classification::Fallback(context) => context,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Classification::Fallback(_))
    }
}

/// Maps directory paths onto environments using an immutable mapping table.
#[derive(Debug, Clone, Copy)]
pub struct PathClassifier<'a> {
    mapping: &'a EnvironmentMapping,
}

impl<'a> PathClassifier<'a> {
    pub fn new(mapping: &'a EnvironmentMapping) -> Self {
        Self { mapping }
    }

    /// Classify a directory path.
    ///
    /// Segments are scanned from the most specific (deepest) to the least
    /// specific; the first exact match wins. Unmatched paths degrade to
    /// [`EnvironmentContext::unclassified`] rather than failing.
    pub fn classify_dir(&self, dir: &Path) -> Classification {
        let segments: Vec<&str> = dir
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        self.classify_segments(&segments)
    }

    /// Classify the directory that contains `file`.
    pub fn classify_file(&self, file: &Path) -> Classification {
        match file.parent() {
            Some(parent) => self.classify_dir(parent),
            None => Classification::Fallback(EnvironmentContext::unclassified()),
        }
    }

    /// Classify pre-split segments, ordered from root to leaf.
    pub fn classify_segments<S: AsRef<str>>(&self, segments: &[S]) -> Classification {
        segments
            .iter()
            .rev()
            .find_map(|segment| {
                let segment = segment.as_ref();
                self.mapping
                    .get(segment)
                    .map(|target| Classification::Matched {
                        context: target.to_context(),
                        segment: segment.to_string(),
                    })
            })
            .unwrap_or_else(|| Classification::Fallback(EnvironmentContext::unclassified()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
