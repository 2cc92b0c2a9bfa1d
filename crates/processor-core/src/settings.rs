use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{ProcessorError, Result};
use crate::models::{EnvironmentContext, InputFormat};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Normalize Ansible vCenter exports into Power BI ready datasets
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vcenter-processor",
    about = "Normalize Ansible vCenter exports into Power BI ready datasets",
    version
)]
pub struct Settings {
    /// Directory containing Ansible output files
    #[arg(long, env = "WATCH_DIRECTORY", default_value = "./ansible_outputs")]
    pub input_dir: PathBuf,

    /// Directory receiving CSV, Excel and JSON exports
    #[arg(long, env = "OUTPUT_DIRECTORY", default_value = "./powerbi_outputs")]
    pub output_dir: PathBuf,

    /// JSON or YAML file mapping directory names to environment and client
    #[arg(long, env = "ENVIRONMENT_MAPPING_FILE")]
    pub mapping_file: Option<PathBuf>,

    /// Write one combined dataset instead of one per client and environment
    #[arg(long)]
    pub no_segregation: bool,

    /// Skip input files larger than this many megabytes (1-1024)
    #[arg(long, env = "MAX_FILE_SIZE_MB", default_value = "50", value_parser = clap::value_parser!(u64).range(1..=1024))]
    pub max_file_size_mb: u64,

    /// Do not write the processing summary report
    #[arg(long)]
    pub no_summary: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse the process arguments.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os())
    }

    /// Same as [`Settings::load`] but with an explicit argument list, which
    /// lets tests run without spawning subprocesses.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut settings = Settings::parse_from(args);
        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Options handed to the batch pipeline.
    pub fn processing_options(&self) -> ProcessingOptions {
        ProcessingOptions {
            output_dir: self.output_dir.clone(),
            segregate_by_environment: !self.no_segregation,
            write_summary: !self.no_summary,
        }
    }
}

/// Per-batch switches consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOptions {
    pub output_dir: PathBuf,
    /// When `false`, every record lands in the single `(ALL, ALL)` group.
    pub segregate_by_environment: bool,
    pub write_summary: bool,
}

impl ProcessingOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            segregate_by_environment: true,
            write_summary: true,
        }
    }
}

// ── EnvironmentMapping ─────────────────────────────────────────────────────────

/// Target of one mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentTarget {
    pub environment: String,
    pub client: String,
}

impl EnvironmentTarget {
    pub fn to_context(&self) -> EnvironmentContext {
        EnvironmentContext::new(self.client.clone(), self.environment.clone())
    }
}

/// Immutable `directory segment → (environment, client)` lookup table.
///
/// Loaded once at startup and passed by reference to whoever classifies
/// paths; it is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentMapping {
    entries: HashMap<String, EnvironmentTarget>,
}

impl Default for EnvironmentMapping {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EnvironmentMapping {
    /// The mapping shipped with the processor.
    pub fn builtin() -> Self {
        Self::from_entries([
            ("prod-vcenter1", "production-vc1", "client-a"),
            ("prod-vcenter2", "production-vc2", "client-b"),
            ("dev-vcenter", "development", "internal"),
            ("test-vcenter", "testing", "internal"),
        ])
    }

    /// Build a table from `(segment, environment, client)` triples.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(segment, environment, client)| {
                (
                    segment.to_string(),
                    EnvironmentTarget {
                        environment: environment.to_string(),
                        client: client.to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Exact-match lookup for one path segment.
    pub fn get(&self, segment: &str) -> Option<&EnvironmentTarget> {
        self.entries.get(segment)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a mapping document of the form
    /// `{ "<segment>": { "environment": "..", "client": ".." } }`.
    pub fn parse(text: &str, format: InputFormat) -> Result<Self> {
        let parsed: BTreeMap<String, EnvironmentTarget> = match format {
            InputFormat::Json => serde_json::from_str(text)
                .map_err(|e| ProcessorError::Config(format!("invalid mapping JSON: {}", e)))?,
            InputFormat::Yaml => serde_yaml::from_str(text)
                .map_err(|e| ProcessorError::Config(format!("invalid mapping YAML: {}", e)))?,
        };

        if let Some((segment, _)) = parsed
            .iter()
            .find(|(segment, target)| {
                segment.trim().is_empty()
                    || target.environment.trim().is_empty()
                    || target.client.trim().is_empty()
            })
        {
            return Err(ProcessorError::Config(format!(
                "mapping entry \"{}\" must have a non-empty segment, environment and client",
                segment
            )));
        }

        Ok(Self {
            entries: parsed.into_iter().collect(),
        })
    }

    /// Load a mapping file; the format is chosen by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let format = InputFormat::from_path(path).ok_or_else(|| {
            ProcessorError::Config(format!(
                "mapping file {} must have a .json, .yaml or .yml extension",
                path.display()
            ))
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| ProcessorError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mapping = Self::parse(&text, format)?;
        tracing::info!(
            path = %path.display(),
            entries = mapping.len(),
            "loaded environment mapping"
        );
        Ok(mapping)
    }

    /// Candidate locations of the implicit mapping file, rooted at `base_dir`.
    pub fn default_paths_in(base_dir: &Path) -> Vec<PathBuf> {
        let dir = base_dir.join(".vcenter-processor");
        ["environments.json", "environments.yaml", "environments.yml"]
            .iter()
            .map(|name| dir.join(name))
            .collect()
    }

    /// Resolve the mapping for this run.
    ///
    /// An explicit path must load successfully. Without one, the first existing
    /// `~/.vcenter-processor/environments.{json,yaml,yml}` is used, falling back
    /// to [`EnvironmentMapping::builtin`].
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::resolve_in(explicit, &home)
    }

    /// [`EnvironmentMapping::resolve`] with an injectable home directory.
    pub fn resolve_in(explicit: Option<&Path>, home: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match Self::default_paths_in(home).into_iter().find(|p| p.exists()) {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("no mapping file found; using built-in environment mapping");
                Ok(Self::builtin())
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
