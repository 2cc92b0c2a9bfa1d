//! Locates raw VM and alarm entries inside Ansible output documents.
//!
//! Ansible playbooks emit the same inventory in several shapes. Each record
//! category has an ordered list of [`Strategy`] values; the first one that
//! applies to a document decides where entries are read from and later ones
//! are never merged in.

use serde_json::{Map, Value};
use tracing::debug;

use processor_core::diagnostics::{Diagnostic, WithDiagnostics};
use processor_core::error::ParseError;
use processor_core::models::{InputFormat, RecordKind};

/// One source entry before normalization.
pub type RawRecord = Map<String, Value>;

/// A way of locating entries of one category within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Entries live under this top-level key.
    Key(&'static str),
    /// Entries live inside an Ansible wrapper (`ansible_facts`, `results`, `plays`).
    Envelope,
    /// The document itself is a sequence of entries.
    BareSequence,
}

const VM_STRATEGIES: &[Strategy] = &[
    Strategy::Key("vms"),
    Strategy::Key("vm_inventory"),
    Strategy::Key("virtual_machines"),
    Strategy::Key("vm_info"),
    Strategy::Key("instances"),
    Strategy::Key("vm_facts"),
    Strategy::Key("vmware_vm_info"),
    Strategy::Key("vcenter_vm_info"),
    Strategy::Envelope,
    Strategy::BareSequence,
];

const ALARM_STRATEGIES: &[Strategy] = &[
    Strategy::Key("alarms"),
    Strategy::Key("alarm_data"),
    Strategy::Key("vm_alarms"),
    Strategy::Key("alerts"),
    Strategy::Key("events"),
    Strategy::Key("alarm_info"),
    Strategy::Key("vmware_alarms"),
    Strategy::Envelope,
    Strategy::BareSequence,
];

/// Keys that mark an item of a bare sequence as an alarm rather than a VM.
const ALARM_MARKERS: &[&str] = &[
    "alarm_name",
    "alarm_severity",
    "alarm_status",
    "triggered_time",
    "triggered_at",
];

/// Ordered strategies for `kind`.
pub fn strategies(kind: RecordKind) -> &'static [Strategy] {
    match kind {
        RecordKind::Vm => VM_STRATEGIES,
        RecordKind::Alarm => ALARM_STRATEGIES,
    }
}

/// Raw entries pulled from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRecords {
    pub vms: Vec<RawRecord>,
    pub alarms: Vec<RawRecord>,
    /// Strategy that produced `vms`, `None` when nothing matched.
    pub vm_strategy: Option<Strategy>,
    pub alarm_strategy: Option<Strategy>,
}

impl ExtractedRecords {
    pub fn is_empty(&self) -> bool {
        self.vms.is_empty() && self.alarms.is_empty()
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse raw file content into a generic document.
///
/// An empty or whitespace-only YAML file is a valid empty document.
pub fn parse_document(content: &[u8], format: InputFormat) -> Result<Value, ParseError> {
    match format {
        InputFormat::Json => Ok(serde_json::from_slice(content)?),
        InputFormat::Yaml => {
            if content.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            Ok(serde_yaml::from_slice(content)?)
        }
    }
}

/// Parse `content` and locate its VM and alarm entries.
///
/// Fails only on invalid syntax. Documents without any recognised section
/// yield empty lists.
pub fn extract(
    content: &[u8],
    format: InputFormat,
) -> Result<WithDiagnostics<ExtractedRecords>, ParseError> {
    let document = parse_document(content, format)?;
    Ok(extract_from_value(&document))
}

/// Locate VM and alarm entries in an already-parsed document.
pub fn extract_from_value(document: &Value) -> WithDiagnostics<ExtractedRecords> {
    let mut diagnostics = Vec::new();

    let vm_located = locate(document, RecordKind::Vm);
    let alarm_located = locate(document, RecordKind::Alarm);

    for (kind, located) in [(RecordKind::Vm, &vm_located), (RecordKind::Alarm, &alarm_located)] {
        if located.ignored > 0 {
            diagnostics.push(Diagnostic::warning(
                kind.as_str(),
                format!(
                    "ignored {} {} entr{} that are not mappings",
                    located.ignored,
                    kind,
                    if located.ignored == 1 { "y" } else { "ies" }
                ),
            ));
        }
    }

    debug!(
        vms = vm_located.entries.len(),
        alarms = alarm_located.entries.len(),
        vm_strategy = ?vm_located.strategy,
        alarm_strategy = ?alarm_located.strategy,
        "extracted raw entries"
    );

    WithDiagnostics::with(
        ExtractedRecords {
            vms: vm_located.entries,
            alarms: alarm_located.entries,
            vm_strategy: vm_located.strategy,
            alarm_strategy: alarm_located.strategy,
        },
        diagnostics,
    )
}

// ── Strategy resolution ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Located {
    entries: Vec<RawRecord>,
    strategy: Option<Strategy>,
    ignored: usize,
}

fn locate(document: &Value, kind: RecordKind) -> Located {
    for &strategy in strategies(kind) {
        let found = match strategy {
            Strategy::Key(key) => document
                .as_object()
                .and_then(|object| object.get(key))
                .map(|section| section_entries(section, kind)),
            Strategy::Envelope => envelope_entries(document, kind),
            Strategy::BareSequence => document
                .as_array()
                .map(|items| partition_sequence(items, kind)),
        };
        if let Some(mut located) = found {
            located.strategy = Some(strategy);
            return located;
        }
    }
    Located::default()
}

/// Read the entries of a matched section.
///
/// A sequence contributes its mapping items. A mapping keyed by name
/// contributes its values, each inheriting the key as its name when it has
/// none; for alarms, sequence values contribute all of their items.
fn section_entries(section: &Value, kind: RecordKind) -> Located {
    let mut located = Located::default();
    match section {
        Value::Array(items) => collect_objects(items, &mut located),
        Value::Object(by_name) => {
            let name_key = match kind {
                RecordKind::Vm => "name",
                RecordKind::Alarm => "alarm_name",
            };
            for (key, value) in by_name {
                match value {
                    Value::Object(entry) => {
                        let mut entry = entry.clone();
                        if !has_value(&entry, name_key) {
                            entry.insert(name_key.to_string(), Value::String(key.clone()));
                        }
                        located.entries.push(entry);
                    }
                    Value::Array(items) if kind == RecordKind::Alarm => {
                        collect_objects(items, &mut located)
                    }
                    _ => located.ignored += 1,
                }
            }
        }
        Value::Null => {}
        _ => located.ignored += 1,
    }
    located
}

/// Search Ansible wrappers when no top-level key matched.
///
/// `ansible_facts` and a single `results` mapping are searched as nested
/// documents; `results` items and the per-host results of `plays[].tasks[].hosts` are searched in order and
/// their entries concatenated. Returns `None` when no wrapper is present.
fn envelope_entries(document: &Value, kind: RecordKind) -> Option<Located> {
    let object = document.as_object()?;

    if let Some(facts) = object.get("ansible_facts").filter(|v| v.is_object()) {
        return Some(locate_keys_only(facts, kind));
    }

    let nested: Vec<&Value> = if let Some(results) = object.get("results").and_then(Value::as_array)
    {
        results.iter().filter(|item| item.is_object()).collect()
    } else if let Some(result) = object.get("results").filter(|v| v.is_object()) {
        vec![result]
    } else if let Some(plays) = object.get("plays").and_then(Value::as_array) {
        plays
            .iter()
            .filter_map(|play| play.get("tasks").and_then(Value::as_array))
            .flatten()
            .filter_map(|task| task.get("hosts").and_then(Value::as_object))
            .flat_map(|hosts| hosts.values())
            .collect()
    } else {
        return None;
    };

    let mut combined = Located::default();
    for item in nested {
        let located = locate_keys_only(item, kind);
        combined.entries.extend(located.entries);
        combined.ignored += located.ignored;
    }
    Some(combined)
}

/// Key strategies only: envelopes do not nest and are never bare sequences.
fn locate_keys_only(document: &Value, kind: RecordKind) -> Located {
    let Some(object) = document.as_object() else {
        return Located::default();
    };
    strategies(kind)
        .iter()
        .find_map(|strategy| match strategy {
            Strategy::Key(key) => object.get(*key).map(|section| section_entries(section, kind)),
            _ => None,
        })
        .unwrap_or_default()
}

/// Split a top-level sequence by shape: alarm-looking mappings are alarms,
/// every other mapping is a VM.
fn partition_sequence(items: &[Value], kind: RecordKind) -> Located {
    let mut located = Located::default();
    for item in items {
        match item {
            Value::Object(entry) => {
                let is_alarm = ALARM_MARKERS.iter().any(|marker| has_value(entry, marker));
                if is_alarm == (kind == RecordKind::Alarm) {
                    located.entries.push(entry.clone());
                }
            }
            // Counted once, against the VM category.
            _ if kind == RecordKind::Vm => located.ignored += 1,
            _ => {}
        }
    }
    located
}

fn collect_objects(items: &[Value], located: &mut Located) {
    for item in items {
        match item {
            Value::Object(entry) => located.entries.push(entry.clone()),
            _ => located.ignored += 1,
        }
    }
}

fn has_value(entry: &RawRecord, key: &str) -> bool {
    entry.get(key).map(|v| !v.is_null()).unwrap_or(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract_json(doc: Value) -> ExtractedRecords {
        extract_from_value(&doc).value
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = extract(b"{\"vms\": [", InputFormat::Json).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = extract(b"vms: [unclosed\n", InputFormat::Yaml).unwrap_err();
        assert!(matches!(err, ParseError::Yaml(_)));
    }

    #[test]
    fn test_empty_yaml_is_empty_result() {
        let out = extract(b"  \n", InputFormat::Yaml).unwrap();
        assert!(out.value.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_yaml_document() {
        let yaml = b"vms:\n  - name: web01\n    num_cpu: 2\nalarms:\n  - alarm_name: CPU\n    vm_name: web01\n";
        let out = extract(yaml, InputFormat::Yaml).unwrap().value;
        assert_eq!(out.vms.len(), 1);
        assert_eq!(out.alarms.len(), 1);
        assert_eq!(out.vms[0]["name"], json!("web01"));
    }

    // ── VM conventions ────────────────────────────────────────────────────────

    #[test]
    fn test_vms_key_and_bare_list_extract_identically() {
        let entries = json!([
            {"name": "web01", "num_cpu": 2},
            {"name": "db01", "num_cpu": 8}
        ]);
        let keyed = extract_json(json!({"vms": entries.clone()}));
        let bare = extract_json(entries);
        assert_eq!(keyed.vms, bare.vms);
        assert_eq!(keyed.vm_strategy, Some(Strategy::Key("vms")));
        assert_eq!(bare.vm_strategy, Some(Strategy::BareSequence));
        assert!(bare.alarms.is_empty());
    }

    #[test]
    fn test_vm_inventory_key() {
        let out = extract_json(json!({"vm_inventory": [{"name": "app01"}]}));
        assert_eq!(out.vms.len(), 1);
        assert_eq!(out.vm_strategy, Some(Strategy::Key("vm_inventory")));
    }

    #[test]
    fn test_first_matching_key_wins_without_merge() {
        let out = extract_json(json!({
            "vms": [{"name": "a"}],
            "vm_inventory": [{"name": "b"}, {"name": "c"}]
        }));
        assert_eq!(out.vms.len(), 1);
        assert_eq!(out.vms[0]["name"], json!("a"));
    }

    #[test]
    fn test_vm_mapping_keyed_by_name() {
        let out = extract_json(json!({
            "virtual_machines": {
                "web01": {"num_cpu": 2},
                "db01": {"name": "db01-renamed"}
            }
        }));
        assert_eq!(out.vms.len(), 2);
        let names: Vec<&Value> = out.vms.iter().map(|vm| &vm["name"]).collect();
        assert!(names.contains(&&json!("web01")));
        assert!(names.contains(&&json!("db01-renamed")));
    }

    #[test]
    fn test_mapping_keeps_document_order() {
        let out = extract(
            br#"{"vms": {"zeta": {"num_cpu": 1}, "alpha": {"num_cpu": 2}, "mid": {"num_cpu": 4}}}"#,
            InputFormat::Json,
        )
        .unwrap()
        .value;
        let names: Vec<&Value> = out.vms.iter().map(|vm| &vm["name"]).collect();
        assert_eq!(names, vec![&json!("zeta"), &json!("alpha"), &json!("mid")]);
    }

    #[test]
    fn test_yaml_mapping_keeps_document_order() {
        let yaml = b"vm_inventory:\n  zeta:\n    num_cpu: 1\n  alpha:\n    num_cpu: 2\n";
        let out = extract(yaml, InputFormat::Yaml).unwrap().value;
        let names: Vec<&Value> = out.vms.iter().map(|vm| &vm["name"]).collect();
        assert_eq!(names, vec![&json!("zeta"), &json!("alpha")]);
    }

    #[test]
    fn test_unrecognised_structure_is_empty() {
        let out = extract_from_value(&json!({"hosts": ["esx01"], "changed": false}));
        assert!(out.value.is_empty());
        assert_eq!(out.value.vm_strategy, None);
        assert!(out.diagnostics.is_empty());

        let scalar = extract_json(json!("just a string"));
        assert!(scalar.is_empty());
    }

    #[test]
    fn test_non_mapping_items_are_reported() {
        let out = extract_from_value(&json!({"vms": [{"name": "ok"}, "bogus", 42]}));
        assert_eq!(out.value.vms.len(), 1);
        assert_eq!(out.diagnostics.len(), 1);
        assert!(out.diagnostics[0].message.contains("ignored 2 vm entries"));
    }

    // ── Alarm conventions ─────────────────────────────────────────────────────

    #[test]
    fn test_alarm_data_key() {
        let out = extract_json(json!({
            "alarm_data": [{"alarm_name": "CPU", "vm_name": "web01"}]
        }));
        assert_eq!(out.alarms.len(), 1);
        assert_eq!(out.alarm_strategy, Some(Strategy::Key("alarm_data")));
        assert!(out.vms.is_empty());
    }

    #[test]
    fn test_events_key_holds_alarms() {
        let out = extract_json(json!({
            "events": [
                {"alarm_name": "Host connection lost", "vm_name": "web01"},
                {"alarm_name": "CPU", "vm_name": "db01"}
            ]
        }));
        assert_eq!(out.alarms.len(), 2);
        assert_eq!(out.alarm_strategy, Some(Strategy::Key("events")));
        assert!(out.vms.is_empty());
    }

    #[test]
    fn test_file_with_both_sections() {
        let out = extract_json(json!({
            "vms": [{"name": "web01"}],
            "alarms": [{"alarm_name": "CPU", "vm_name": "web01"}]
        }));
        assert_eq!(out.vms.len(), 1);
        assert_eq!(out.alarms.len(), 1);
    }

    #[test]
    fn test_alarm_mapping_with_nested_lists() {
        let out = extract_json(json!({
            "vm_alarms": {
                "web01": [
                    {"alarm_name": "CPU", "vm_name": "web01"},
                    {"alarm_name": "Memory", "vm_name": "web01"}
                ],
                "Datastore usage": {"vm_name": "db01"}
            }
        }));
        assert_eq!(out.alarms.len(), 3);
        assert!(out
            .alarms
            .iter()
            .any(|a| a["alarm_name"] == json!("Datastore usage")));
    }

    #[test]
    fn test_bare_sequence_partitioned_by_shape() {
        let out = extract_json(json!([
            {"name": "web01", "num_cpu": 2},
            {"alarm_name": "CPU", "vm_name": "web01", "severity": "red"},
            {"vm_name": "db01", "triggered_time": "2024-01-15T10:00:00Z"}
        ]));
        assert_eq!(out.vms.len(), 1);
        assert_eq!(out.alarms.len(), 2);
    }

    // ── Envelopes ─────────────────────────────────────────────────────────────

    #[test]
    fn test_ansible_facts_envelope() {
        let out = extract_json(json!({
            "ansible_facts": {"vms": [{"name": "web01"}], "alarms": []}
        }));
        assert_eq!(out.vms.len(), 1);
        assert_eq!(out.vm_strategy, Some(Strategy::Envelope));
    }

    #[test]
    fn test_results_envelope_concatenates_items() {
        let out = extract_json(json!({
            "results": [
                {"virtual_machines": [{"name": "a"}]},
                {"vm_info": [{"name": "b"}], "alerts": [{"alarm_name": "x", "vm_name": "b"}]},
                "skipped"
            ]
        }));
        assert_eq!(out.vms.len(), 2);
        assert_eq!(out.alarms.len(), 1);
    }

    #[test]
    fn test_single_results_object_envelope() {
        let out = extract_json(json!({
            "changed": false,
            "results": {
                "virtual_machines": [{"name": "web01"}, {"name": "web02"}],
                "alarms": [{"alarm_name": "CPU", "vm_name": "web01"}]
            }
        }));
        assert_eq!(out.vms.len(), 2);
        assert_eq!(out.alarms.len(), 1);
        assert_eq!(out.vm_strategy, Some(Strategy::Envelope));
    }

    #[test]
    fn test_playbook_envelope() {
        let out = extract_json(json!({
            "plays": [{
                "tasks": [{
                    "hosts": {
                        "vcenter01": {"vms": [{"name": "web01"}, {"name": "web02"}]}
                    }
                }]
            }]
        }));
        assert_eq!(out.vms.len(), 2);
    }

    #[test]
    fn test_top_level_key_beats_envelope() {
        let out = extract_json(json!({
            "vms": [{"name": "top"}],
            "ansible_facts": {"vms": [{"name": "nested"}]}
        }));
        assert_eq!(out.vms.len(), 1);
        assert_eq!(out.vms[0]["name"], json!("top"));
    }
}
