//! Coerces raw entries into the typed [`VmRecord`] / [`AlarmRecord`] schema.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use processor_core::data_processors::{TimestampProcessor, ValueCoercer};
use processor_core::diagnostics::{Diagnostic, WithDiagnostics};
use processor_core::error::ValidationError;
use processor_core::models::{
    AlarmRecord, AlarmStatus, EnvironmentContext, PowerState, RecordKind, Severity, VmRecord,
};

use crate::extractor::{ExtractedRecords, RawRecord};

const KB_PER_GB: f64 = 1024.0 * 1024.0;

/// A single normalized record of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRecord {
    Vm(VmRecord),
    Alarm(AlarmRecord),
}

/// Typed records from one file, plus how many raw entries were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecords {
    pub vms: Vec<VmRecord>,
    pub alarms: Vec<AlarmRecord>,
    pub vms_dropped: usize,
    pub alarms_dropped: usize,
}

/// Normalizes entries of one file into records stamped with its context.
#[derive(Debug, Clone)]
pub struct Normalizer<'a> {
    context: &'a EnvironmentContext,
    source_file: &'a str,
    ingested_at: DateTime<Utc>,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        context: &'a EnvironmentContext,
        source_file: &'a str,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            context,
            source_file,
            ingested_at,
        }
    }

    /// Normalize one raw entry of the given kind.
    pub fn normalize(
        &self,
        raw: &RawRecord,
        kind: RecordKind,
    ) -> Result<NormalizedRecord, ValidationError> {
        match kind {
            RecordKind::Vm => self.normalize_vm(raw).map(NormalizedRecord::Vm),
            RecordKind::Alarm => self.normalize_alarm(raw).map(NormalizedRecord::Alarm),
        }
    }

    /// Build a [`VmRecord`]; only a non-empty name is required.
    pub fn normalize_vm(&self, raw: &RawRecord) -> Result<VmRecord, ValidationError> {
        let data = as_value(raw);

        let name = ValueCoercer::text(&data, &["name", "vm_name", "guest_name"]).ok_or_else(|| {
            ValidationError {
                kind: RecordKind::Vm,
                missing: vec!["name"],
            }
        })?;

        let power_state = ValueCoercer::text(&data, &["power_state", "runtime.powerState"])
            .map(|s| PowerState::parse(&s))
            .unwrap_or(PowerState::Unknown);

        Ok(VmRecord {
            name,
            uuid: ValueCoercer::text(&data, &["uuid", "instance_uuid", "vm_uuid"]),
            power_state,
            cpu_count: ValueCoercer::to_u32(ValueCoercer::lookup(
                &data,
                &["cpu_count", "num_cpu", "config.hardware.numCPU"],
            )),
            memory_mb: ValueCoercer::to_u64(ValueCoercer::lookup(
                &data,
                &["memory_mb", "memory_size_mb", "config.hardware.memoryMB"],
            )),
            disk_gb: disk_gb(&data),
            network_count: network_count(&data),
            guest_os: ValueCoercer::text(
                &data,
                &["guest_os", "guest_fullname", "config.guestFullName"],
            ),
            host_name: ValueCoercer::text(&data, &["host_name", "runtime.host"]),
            cluster_name: ValueCoercer::text(&data, &["cluster_name", "cluster"]),
            datacenter_name: ValueCoercer::text(&data, &["datacenter_name", "datacenter"]),
            client: self.context.client.clone(),
            environment: self.context.environment.clone(),
            source_file: self.source_file.to_string(),
            ingested_at: self.ingested_at,
        })
    }

    /// Build an [`AlarmRecord`]; both the alarm name and the VM name are required.
    pub fn normalize_alarm(&self, raw: &RawRecord) -> Result<AlarmRecord, ValidationError> {
        let data = as_value(raw);

        let vm_name = ValueCoercer::text(&data, &["vm_name", "entity_name", "object_name"]);
        let alarm_name = ValueCoercer::text(&data, &["alarm_name", "name"]);

        let (vm_name, alarm_name) = match (vm_name, alarm_name) {
            (Some(vm), Some(alarm)) => (vm, alarm),
            (vm, alarm) => {
                let mut missing = Vec::new();
                if alarm.is_none() {
                    missing.push("alarm_name");
                }
                if vm.is_none() {
                    missing.push("vm_name");
                }
                return Err(ValidationError {
                    kind: RecordKind::Alarm,
                    missing,
                });
            }
        };

        let severity = ValueCoercer::text(&data, &["severity", "alarm_severity"])
            .map(|s| Severity::parse(&s))
            .unwrap_or(Severity::Unknown);
        let status = ValueCoercer::text(&data, &["status", "alarm_status"])
            .map(|s| AlarmStatus::parse(&s))
            .unwrap_or(AlarmStatus::Unknown);
        let triggered_at = ValueCoercer::lookup(
            &data,
            &["triggered_at", "triggered_time", "time", "created_time"],
        )
        .and_then(TimestampProcessor::parse);

        Ok(AlarmRecord {
            vm_name,
            alarm_name,
            description: ValueCoercer::text(&data, &["description", "alarm_description"])
                .unwrap_or_default(),
            severity,
            status,
            triggered_at,
            acknowledged: ValueCoercer::to_bool(data.get("acknowledged")),
            client: self.context.client.clone(),
            environment: self.context.environment.clone(),
            source_file: self.source_file.to_string(),
        })
    }

    /// Normalize every entry of one file.
    ///
    /// Entries failing validation are dropped and reported as warnings; the
    /// rest of the file is kept.
    pub fn normalize_all(&self, extracted: &ExtractedRecords) -> WithDiagnostics<NormalizedRecords> {
        let mut out = WithDiagnostics::new(NormalizedRecords::default());

        for (index, raw) in extracted.vms.iter().enumerate() {
            match self.normalize_vm(raw) {
                Ok(vm) => out.value.vms.push(vm),
                Err(e) => {
                    out.value.vms_dropped += 1;
                    out.push(self.dropped(index, &e));
                }
            }
        }

        for (index, raw) in extracted.alarms.iter().enumerate() {
            match self.normalize_alarm(raw) {
                Ok(alarm) => out.value.alarms.push(alarm),
                Err(e) => {
                    out.value.alarms_dropped += 1;
                    out.push(self.dropped(index, &e));
                }
            }
        }

        out
    }

    fn dropped(&self, index: usize, error: &ValidationError) -> Diagnostic {
        warn!(
            file = self.source_file,
            entry = index,
            "dropping record: {}",
            error
        );
        Diagnostic::warning(
            self.source_file,
            format!("{} entry #{} dropped: {}", error.kind, index, error),
        )
    }
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn as_value(raw: &RawRecord) -> Value {
    Value::Object(raw.clone())
}

/// Explicit size in GB, otherwise the sum of `disk[].size_kb`.
fn disk_gb(data: &Value) -> f64 {
    let explicit = ValueCoercer::to_f64(ValueCoercer::lookup(data, &["disk_gb", "disk_size_gb"]));
    if explicit > 0.0 {
        return explicit;
    }
    match data.get("disk").and_then(Value::as_array) {
        Some(disks) => {
            let total_kb: f64 = disks
                .iter()
                .map(|disk| ValueCoercer::to_f64(disk.get("size_kb")))
                .sum();
            total_kb / KB_PER_GB
        }
        None => 0.0,
    }
}

/// Explicit adapter count, otherwise the length of `networks`.
fn network_count(data: &Value) -> u32 {
    if let Some(count) = ValueCoercer::lookup(data, &["network_count"]) {
        return ValueCoercer::to_u32(Some(count));
    }
    data.get("networks")
        .and_then(Value::as_array)
        .map(|networks| networks.len().min(u32::MAX as usize) as u32)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
