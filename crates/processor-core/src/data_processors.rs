use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Layouts that carry a UTC offset. The space-separated one is how PyYAML
/// dumps timezone-aware datetimes from community.vmware facts.
const OFFSET_PATTERNS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Layouts without an offset; the wall time is taken as UTC.
const NAIVE_PATTERNS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Reads alarm `triggered_time` values into UTC.
///
/// vCenter reports alarm times as ISO 8601 strings, usually with a `Z`
/// suffix and microseconds; playbooks that post-process them may emit epoch
/// seconds instead.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// `None` for nulls, non-scalar values and anything no layout accepts.
    pub fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => Self::parse_str(s.trim()),
            Value::Number(n) => Self::from_epoch(n),
            _ => None,
        }
    }

    fn from_epoch(n: &serde_json::Number) -> Option<DateTime<Utc>> {
        if let Some(secs) = n.as_i64() {
            return DateTime::from_timestamp(secs, 0);
        }
        let f = n.as_f64().filter(|f| f.is_finite())?;
        let nanos = (f.fract().abs() * 1_000_000_000.0).round() as u32;
        DateTime::from_timestamp(f.trunc() as i64, nanos.min(999_999_999))
    }

    fn parse_str(s: &str) -> Option<DateTime<Utc>> {
        if s.is_empty() {
            return None;
        }

        // `%:z` does not accept a bare `Z`.
        let with_offset = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
            Some(stripped) => format!("{}+00:00", stripped),
            None => s.to_string(),
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(&with_offset) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Some(dt) = OFFSET_PATTERNS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(&with_offset, fmt).ok())
        {
            return Some(dt.with_timezone(&Utc));
        }

        let naive = NAIVE_PATTERNS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            });
        if naive.is_none() {
            debug!(value = s, "unrecognised timestamp");
        }
        naive.map(|naive| Utc.from_utc_datetime(&naive))
    }
}

// ── ValueCoercer ──────────────────────────────────────────────────────────────

/// Tolerant lookups and casts over loosely-typed source entries.
///
/// Numeric strings are accepted wherever numbers are expected; anything else
/// collapses to a zero default rather than an error.
pub struct ValueCoercer;

impl ValueCoercer {
    /// Return the first non-null value among `keys`.
    ///
    /// A key is first tried literally (Ansible sometimes emits flattened keys
    /// such as `runtime.powerState`), then as a dotted path into nested
    /// objects.
    pub fn lookup<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|key| {
            let found = data.get(*key).or_else(|| Self::lookup_path(data, key))?;
            (!found.is_null()).then_some(found)
        })
    }

    fn lookup_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
        if !path.contains('.') {
            return None;
        }
        path.split('.')
            .try_fold(data, |current, segment| current.get(segment))
    }

    /// First non-blank textual value among `keys`.
    pub fn text(data: &Value, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| Self::lookup(data, &[*key]).and_then(Self::as_text))
    }

    /// Render a scalar as trimmed text; blank strings and containers are `None`.
    pub fn as_text(value: &Value) -> Option<String> {
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// Cast to a non-negative integer; negatives clamp to 0, fractions truncate.
    pub fn to_u64(value: Option<&Value>) -> u64 {
        match value {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_u64() {
                    v
                } else {
                    n.as_f64().map(Self::clamp_f64_to_u64).unwrap_or(0)
                }
            }
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<u64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().map(Self::clamp_f64_to_u64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    pub fn to_u32(value: Option<&Value>) -> u32 {
        Self::to_u64(value).min(u64::from(u32::MAX)) as u32
    }

    /// Cast to a non-negative float; non-numeric and non-finite values are 0.0.
    pub fn to_f64(value: Option<&Value>) -> f64 {
        let parsed = match value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => 0.0,
        }
    }

    /// Interpret booleans, `"true"/"yes"/"1"` strings and non-zero numbers.
    pub fn to_bool(value: Option<&Value>) -> bool {
        match value {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Some(Value::String(s)) => matches!(
                s.trim().to_lowercase().as_str(),
                "true" | "yes" | "y" | "1"
            ),
            _ => false,
        }
    }

    fn clamp_f64_to_u64(v: f64) -> u64 {
        if v.is_finite() && v > 0.0 {
            v.trunc().min(u64::MAX as f64) as u64
        } else {
            0
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
