//! Batch-wide deduplication and grouping by `(client, environment)`.

use std::collections::{BTreeMap, HashMap};

use processor_core::models::{AlarmKey, AlarmRecord, EnvironmentContext, VmKey, VmRecord};

use crate::normalizer::NormalizedRecords;

// ── RecordGroup ───────────────────────────────────────────────────────────────

/// Deduplicated records of one `(client, environment)` group.
///
/// Records keep the position of their first occurrence; a later record with
/// the same key overwrites the earlier one in place.
#[derive(Debug, Clone)]
pub struct RecordGroup {
    context: EnvironmentContext,
    vms: Vec<VmRecord>,
    alarms: Vec<AlarmRecord>,
    vm_index: HashMap<VmKey, usize>,
    alarm_index: HashMap<AlarmKey, usize>,
}

impl RecordGroup {
    fn new(context: EnvironmentContext) -> Self {
        Self {
            context,
            vms: Vec::new(),
            alarms: Vec::new(),
            vm_index: HashMap::new(),
            alarm_index: HashMap::new(),
        }
    }

    pub fn context(&self) -> &EnvironmentContext {
        &self.context
    }

    pub fn vms(&self) -> &[VmRecord] {
        &self.vms
    }

    pub fn alarms(&self) -> &[AlarmRecord] {
        &self.alarms
    }

    pub fn is_empty(&self) -> bool {
        self.vms.is_empty() && self.alarms.is_empty()
    }

    /// Insert or replace; returns `true` when an earlier record was replaced.
    fn upsert_vm(&mut self, vm: VmRecord) -> bool {
        upsert(&mut self.vms, &mut self.vm_index, vm.dedup_key(), vm)
    }

    fn upsert_alarm(&mut self, alarm: AlarmRecord) -> bool {
        upsert(&mut self.alarms, &mut self.alarm_index, alarm.dedup_key(), alarm)
    }
}

fn upsert<K, R>(records: &mut Vec<R>, index: &mut HashMap<K, usize>, key: K, record: R) -> bool
where
    K: std::hash::Hash + Eq,
{
    match index.get(&key) {
        Some(&position) => {
            records[position] = record;
            true
        }
        None => {
            index.insert(key, records.len());
            records.push(record);
            false
        }
    }
}

// ── Dataset ───────────────────────────────────────────────────────────────────

/// All groups of one batch, ordered by `(client, environment)`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    groups: BTreeMap<EnvironmentContext, RecordGroup>,
}

impl Dataset {
    pub fn groups(&self) -> impl Iterator<Item = &RecordGroup> {
        self.groups.values()
    }

    pub fn group(&self, context: &EnvironmentContext) -> Option<&RecordGroup> {
        self.groups.get(context)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_vms(&self) -> usize {
        self.groups.values().map(|g| g.vms.len()).sum()
    }

    pub fn total_alarms(&self) -> usize {
        self.groups.values().map(|g| g.alarms.len()).sum()
    }

    pub fn all_vms(&self) -> impl Iterator<Item = &VmRecord> {
        self.groups.values().flat_map(|g| g.vms.iter())
    }

    pub fn all_alarms(&self) -> impl Iterator<Item = &AlarmRecord> {
        self.groups.values().flat_map(|g| g.alarms.iter())
    }
}

// ── DatasetAggregator ─────────────────────────────────────────────────────────

/// Folds per-file records into a [`Dataset`].
///
/// Inputs must be fed in file-discovery order (oldest modification time
/// first) so that last-write-wins is deterministic.
#[derive(Debug)]
pub struct DatasetAggregator {
    segregate: bool,
    dataset: Dataset,
    replaced_vms: usize,
    replaced_alarms: usize,
}

impl DatasetAggregator {
    /// `segregate = false` collapses everything into the `(ALL, ALL)` group.
    pub fn new(segregate: bool) -> Self {
        Self {
            segregate,
            dataset: Dataset::default(),
            replaced_vms: 0,
            replaced_alarms: 0,
        }
    }

    /// Add the records of one file classified as `context`.
    pub fn add(&mut self, context: &EnvironmentContext, records: NormalizedRecords) {
        if records.vms.is_empty() && records.alarms.is_empty() {
            return;
        }

        let group_key = if self.segregate {
            context.clone()
        } else {
            EnvironmentContext::combined()
        };
        let group = self
            .dataset
            .groups
            .entry(group_key.clone())
            .or_insert_with(|| RecordGroup::new(group_key));

        for vm in records.vms {
            if group.upsert_vm(vm) {
                self.replaced_vms += 1;
            }
        }
        for alarm in records.alarms {
            if group.upsert_alarm(alarm) {
                self.replaced_alarms += 1;
            }
        }
    }

    /// Number of VM records overwritten by a later duplicate so far.
    pub fn replaced_vms(&self) -> usize {
        self.replaced_vms
    }

    pub fn replaced_alarms(&self) -> usize {
        self.replaced_alarms
    }

    pub fn finish(self) -> Dataset {
        tracing::debug!(
            groups = self.dataset.len(),
            vms = self.dataset.total_vms(),
            alarms = self.dataset.total_alarms(),
            replaced_vms = self.replaced_vms,
            replaced_alarms = self.replaced_alarms,
            "dataset aggregated"
        );
        self.dataset
    }

    /// Aggregate a full sequence of `(context, records)` pairs in one call.
    pub fn aggregate(
        inputs: impl IntoIterator<Item = (EnvironmentContext, NormalizedRecords)>,
        segregate: bool,
    ) -> Dataset {
        let mut aggregator = Self::new(segregate);
        for (context, records) in inputs {
            aggregator.add(&context, records);
        }
        aggregator.finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
