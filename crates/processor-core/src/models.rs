use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Client assigned to files whose path matches no mapping entry.
pub const UNCLASSIFIED_CLIENT: &str = "unclassified";
/// Environment assigned to files whose path matches no mapping entry.
pub const UNKNOWN_ENVIRONMENT: &str = "unknown";
/// Client and environment of the single group used when segregation is off.
pub const COMBINED_GROUP: &str = "ALL";

// ── Enumerations ──────────────────────────────────────────────────────────────

/// Power state of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    Suspended,
    Unknown,
}

impl PowerState {
    /// Match a raw value case-insensitively; unmatched values map to `Unknown`.
    ///
    /// Accepts the vSphere spellings (`poweredOn`, `poweredOff`) as well as
    /// the short forms.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "on" | "poweredon" | "powered_on" | "running" => PowerState::On,
            "off" | "poweredoff" | "powered_off" | "stopped" => PowerState::Off,
            "suspended" => PowerState::Suspended,
            _ => PowerState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
            PowerState::Suspended => "suspended",
            PowerState::Unknown => "unknown",
        }
    }
}

/// Severity of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Unknown,
}

impl Severity {
    /// Match a raw value case-insensitively; vCenter colour codes are folded
    /// into the three known levels.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "info" | "information" | "green" => Severity::Info,
            "warning" | "warn" | "yellow" => Severity::Warning,
            "critical" | "error" | "red" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Unknown => "unknown",
        }
    }
}

/// Lifecycle status of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    Active,
    Acknowledged,
    Cleared,
    Unknown,
}

impl AlarmStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "active" | "triggered" => AlarmStatus::Active,
            "acknowledged" | "acked" => AlarmStatus::Acknowledged,
            "cleared" | "resolved" => AlarmStatus::Cleared,
            _ => AlarmStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlarmStatus::Active => "active",
            AlarmStatus::Acknowledged => "acknowledged",
            AlarmStatus::Cleared => "cleared",
            AlarmStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two record families carried through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Vm,
    Alarm,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Vm => "vm",
            RecordKind::Alarm => "alarm",
        }
    }

    /// Leading component of exported file names.
    pub fn file_prefix(self) -> &'static str {
        match self {
            RecordKind::Vm => "vcenter_vms",
            RecordKind::Alarm => "vcenter_alarms",
        }
    }

    /// Worksheet name used in Excel exports.
    pub fn sheet_name(self) -> &'static str {
        match self {
            RecordKind::Vm => "VM_Details",
            RecordKind::Alarm => "VM_Alarms",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared syntax of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Json,
    Yaml,
}

impl InputFormat {
    /// Detect the format from a file extension (`json`, `yaml`, `yml`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(InputFormat::Json),
            "yaml" | "yml" => Some(InputFormat::Yaml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ── EnvironmentContext ────────────────────────────────────────────────────────

/// The `(client, environment)` pair resolved for an input path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvironmentContext {
    pub client: String,
    pub environment: String,
}

impl EnvironmentContext {
    pub fn new(client: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            environment: environment.into(),
        }
    }

    /// Context used when no path segment matches the mapping table.
    pub fn unclassified() -> Self {
        Self::new(UNCLASSIFIED_CLIENT, UNKNOWN_ENVIRONMENT)
    }

    /// Single group key used when environment segregation is disabled.
    pub fn combined() -> Self {
        Self::new(COMBINED_GROUP, COMBINED_GROUP)
    }
}

impl fmt::Display for EnvironmentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client, self.environment)
    }
}

// ── Tabular rendering ─────────────────────────────────────────────────────────

/// One typed cell of an exported row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Integer(u64),
    Float(f64),
    Bool(bool),
    Empty,
}

impl Cell {
    /// Text form used by delimited exports.
    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Integer(n) => n.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Empty => String::new(),
        }
    }

    fn optional_text(value: &Option<String>) -> Self {
        match value {
            Some(s) => Cell::Text(s.clone()),
            None => Cell::Empty,
        }
    }

    fn timestamp(value: &DateTime<Utc>) -> Self {
        Cell::Text(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

/// A record that can be laid out as a flat row in canonical column order.
///
/// `COLUMNS` and the serde field order of the implementing struct must agree
/// so that CSV, Excel and JSON exports share one schema.
pub trait TabularRecord: Serialize {
    const KIND: RecordKind;
    const COLUMNS: &'static [&'static str];

    /// Cells in `COLUMNS` order.
    fn cells(&self) -> Vec<Cell>;
}

// ── VmRecord ──────────────────────────────────────────────────────────────────

/// One virtual machine observation in the normalized schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    pub name: String,
    pub uuid: Option<String>,
    pub power_state: PowerState,
    pub cpu_count: u32,
    pub memory_mb: u64,
    pub disk_gb: f64,
    pub network_count: u32,
    pub guest_os: Option<String>,
    pub host_name: Option<String>,
    pub cluster_name: Option<String>,
    pub datacenter_name: Option<String>,
    pub client: String,
    pub environment: String,
    pub source_file: String,
    pub ingested_at: DateTime<Utc>,
}

/// Identity of a VM within a batch: later observations replace earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VmKey {
    pub client: String,
    pub environment: String,
    pub name: String,
    /// The VM's uuid when present, otherwise its name.
    pub identity: String,
}

impl VmRecord {
    pub fn dedup_key(&self) -> VmKey {
        VmKey {
            client: self.client.clone(),
            environment: self.environment.clone(),
            name: self.name.clone(),
            identity: self.uuid.clone().unwrap_or_else(|| self.name.clone()),
        }
    }
}

impl TabularRecord for VmRecord {
    const KIND: RecordKind = RecordKind::Vm;
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "uuid",
        "power_state",
        "cpu_count",
        "memory_mb",
        "disk_gb",
        "network_count",
        "guest_os",
        "host_name",
        "cluster_name",
        "datacenter_name",
        "client",
        "environment",
        "source_file",
        "ingested_at",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.name.clone()),
            Cell::optional_text(&self.uuid),
            Cell::Text(self.power_state.as_str().to_string()),
            Cell::Integer(u64::from(self.cpu_count)),
            Cell::Integer(self.memory_mb),
            Cell::Float(self.disk_gb),
            Cell::Integer(u64::from(self.network_count)),
            Cell::optional_text(&self.guest_os),
            Cell::optional_text(&self.host_name),
            Cell::optional_text(&self.cluster_name),
            Cell::optional_text(&self.datacenter_name),
            Cell::Text(self.client.clone()),
            Cell::Text(self.environment.clone()),
            Cell::Text(self.source_file.clone()),
            Cell::timestamp(&self.ingested_at),
        ]
    }
}

// ── AlarmRecord ───────────────────────────────────────────────────────────────

/// One alarm or event observation in the normalized schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub vm_name: String,
    pub alarm_name: String,
    pub description: String,
    pub severity: Severity,
    pub status: AlarmStatus,
    /// `None` when the source timestamp was missing or unparseable.
    pub triggered_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    pub client: String,
    pub environment: String,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlarmKey {
    pub client: String,
    pub environment: String,
    pub vm_name: String,
    pub alarm_name: String,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl AlarmRecord {
    pub fn dedup_key(&self) -> AlarmKey {
        AlarmKey {
            client: self.client.clone(),
            environment: self.environment.clone(),
            vm_name: self.vm_name.clone(),
            alarm_name: self.alarm_name.clone(),
            triggered_at: self.triggered_at,
        }
    }
}

impl TabularRecord for AlarmRecord {
    const KIND: RecordKind = RecordKind::Alarm;
    const COLUMNS: &'static [&'static str] = &[
        "vm_name",
        "alarm_name",
        "description",
        "severity",
        "status",
        "triggered_at",
        "acknowledged",
        "client",
        "environment",
        "source_file",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.vm_name.clone()),
            Cell::Text(self.alarm_name.clone()),
            Cell::Text(self.description.clone()),
            Cell::Text(self.severity.as_str().to_string()),
            Cell::Text(self.status.as_str().to_string()),
            self.triggered_at
                .as_ref()
                .map(Cell::timestamp)
                .unwrap_or(Cell::Empty),
            Cell::Bool(self.acknowledged),
            Cell::Text(self.client.clone()),
            Cell::Text(self.environment.clone()),
            Cell::Text(self.source_file.clone()),
        ]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
