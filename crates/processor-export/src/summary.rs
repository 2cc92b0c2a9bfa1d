//! Batch summary report.
//!
//! Statistics over the deduplicated dataset, written next to the exported
//! artifacts as `processing_summary_{YYYYMMDD_HHMMSS}.json`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use processor_data::aggregator::Dataset;
use serde::Serialize;

/// Number of guest OS entries kept in the distribution.
const TOP_GUEST_OS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processing_summary: ProcessingMetadata,
    pub vm_statistics: VmStatistics,
    pub alarm_statistics: AlarmStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingMetadata {
    pub started_at: DateTime<Utc>,
    pub files_received: usize,
    pub files_failed: usize,
    pub groups: usize,
    pub total_vms: usize,
    pub total_alarms: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmStatistics {
    pub total_count: usize,
    pub power_state_distribution: BTreeMap<String, usize>,
    pub average_cpu_count: f64,
    pub average_memory_gb: f64,
    pub total_disk_gb: f64,
    /// Most common guest operating systems, most frequent first.
    pub guest_os_distribution: Vec<GuestOsCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestOsCount {
    pub guest_os: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmStatistics {
    pub total_count: usize,
    pub severity_distribution: BTreeMap<String, usize>,
    pub acknowledged_count: usize,
    pub unacknowledged_count: usize,
    pub unique_vms_with_alarms: usize,
}

impl BatchSummary {
    /// Compute the summary of `dataset` for a batch of `files_received` files.
    pub fn from_dataset(
        dataset: &Dataset,
        started_at: DateTime<Utc>,
        files_received: usize,
        files_failed: usize,
    ) -> Self {
        Self {
            processing_summary: ProcessingMetadata {
                started_at,
                files_received,
                files_failed,
                groups: dataset.len(),
                total_vms: dataset.total_vms(),
                total_alarms: dataset.total_alarms(),
            },
            vm_statistics: VmStatistics::compute(dataset),
            alarm_statistics: AlarmStatistics::compute(dataset),
        }
    }
}

impl VmStatistics {
    fn compute(dataset: &Dataset) -> Self {
        let mut power_states: BTreeMap<String, usize> = BTreeMap::new();
        let mut guest_os: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_cpu = 0u64;
        let mut total_memory_mb = 0u64;
        let mut total_disk_gb = 0.0f64;
        let mut count = 0usize;

        for vm in dataset.all_vms() {
            count += 1;
            *power_states.entry(vm.power_state.as_str().to_string()).or_default() += 1;
            if let Some(os) = &vm.guest_os {
                *guest_os.entry(os.clone()).or_default() += 1;
            }
            total_cpu += u64::from(vm.cpu_count);
            total_memory_mb = total_memory_mb.saturating_add(vm.memory_mb);
            total_disk_gb += vm.disk_gb;
        }

        let mut guest_os_distribution: Vec<GuestOsCount> = guest_os
            .into_iter()
            .map(|(guest_os, count)| GuestOsCount { guest_os, count })
            .collect();
        // Stable sort keeps the alphabetical order among equal counts.
        guest_os_distribution.sort_by(|a, b| b.count.cmp(&a.count));
        guest_os_distribution.truncate(TOP_GUEST_OS);

        Self {
            total_count: count,
            power_state_distribution: power_states,
            average_cpu_count: round2(average(total_cpu as f64, count)),
            average_memory_gb: round2(average(total_memory_mb as f64 / 1024.0, count)),
            total_disk_gb: round2(total_disk_gb),
            guest_os_distribution,
        }
    }
}

impl AlarmStatistics {
    fn compute(dataset: &Dataset) -> Self {
        let mut severities: BTreeMap<String, usize> = BTreeMap::new();
        let mut vms: BTreeSet<&str> = BTreeSet::new();
        let mut acknowledged = 0usize;
        let mut count = 0usize;

        for alarm in dataset.all_alarms() {
            count += 1;
            *severities.entry(alarm.severity.as_str().to_string()).or_default() += 1;
            if alarm.acknowledged {
                acknowledged += 1;
            }
            vms.insert(alarm.vm_name.as_str());
        }

        Self {
            total_count: count,
            severity_distribution: severities,
            acknowledged_count: acknowledged,
            unacknowledged_count: count - acknowledged,
            unique_vms_with_alarms: vms.len(),
        }
    }
}

fn average(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
