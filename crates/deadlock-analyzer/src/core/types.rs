use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::value::CellValue;

/// Column names of one result set and the key order of its row objects.
///
/// A repeated name keeps the position of its first occurrence and takes the
/// value of its last, the way a dictionary overwrites an existing key.
/// Computed once per result set and shared by every row.
#[derive(Debug, PartialEq)]
pub struct ColumnLayout {
    names: Vec<String>,
    /// (name index, value index) per distinct key, in output order.
    entries: Vec<(usize, usize)>,
}

impl ColumnLayout {
    pub fn new(names: Vec<String>) -> Self {
        let mut slots: HashMap<&str, usize> = HashMap::with_capacity(names.len());
        let mut entries: Vec<(usize, usize)> = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            match slots.get(name.as_str()) {
                Some(&slot) => entries[slot].1 = i,
                None => {
                    slots.insert(name, entries.len());
                    entries.push((i, i));
                }
            }
        }
        Self { names, entries }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One result row, values in column order. Serializes as a JSON object
/// following its [`ColumnLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct DbRow {
    layout: Arc<ColumnLayout>,
    values: Vec<CellValue>,
}

impl DbRow {
    pub fn new(layout: Arc<ColumnLayout>, values: Vec<CellValue>) -> Self {
        debug_assert_eq!(layout.names().len(), values.len());
        Self { layout, values }
    }
}

impl Serialize for DbRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = &self.layout.entries;
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for &(name, value) in entries {
            map.serialize_entry(&self.layout.names[name], &self.values[value])?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticQueryRequest {
    #[serde(default)]
    pub connection_string: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Runs a catalog entry by name instead of caller supplied SQL.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredefinedQueryRequest {
    #[serde(default)]
    pub connection_string: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticQueryResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<DbRow>,
    pub column_names: Vec<String>,
    pub record_count: usize,
    pub execution_time_ms: f64,
}

impl DiagnosticQueryResponse {
    pub fn ok(column_names: Vec<String>, results: Vec<DbRow>, execution_time_ms: f64) -> Self {
        Self {
            success: true,
            message: "Query executed successfully".into(),
            record_count: results.len(),
            results,
            column_names,
            execution_time_ms,
        }
    }

    pub fn failed(message: impl Into<String>, execution_time_ms: f64) -> Self {
        Self {
            success: false,
            message: message.into(),
            results: Vec::new(),
            column_names: Vec::new(),
            record_count: 0,
            execution_time_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Limits {
    pub max_records: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PredefinedQuery {
    pub name: &'static str,
    pub description: &'static str,
    pub query: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlockEventsRequest {
    #[serde(default)]
    pub connection_string: String,
    #[serde(default)]
    pub extended_event_session_name: String,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub start_date: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub end_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub max_records: Option<usize>,
}

/// Accepts `2024-03-05T14:07:09[.fff]`, RFC 3339 with an offset (converted to
/// UTC, which is what the event file timestamps are in) or a bare date.
fn lenient_datetime<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(d)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.naive_utc()));
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(d.and_time(NaiveTime::MIN)));
    }
    Err(serde::de::Error::custom(format!("invalid date: {raw}")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlockEvent {
    pub timestamp: NaiveDateTime,
    pub xml_report: String,
    pub session_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlockEventsResponse {
    pub success: bool,
    pub message: String,
    pub events: Vec<DeadlockEvent>,
    pub total_records: usize,
}

impl DeadlockEventsResponse {
    pub fn ok(events: Vec<DeadlockEvent>) -> Self {
        Self {
            success: true,
            message: format!("Retrieved {} deadlock events", events.len()),
            total_records: events.len(),
            events,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            events: Vec::new(),
            total_records: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedEventSession {
    pub name: String,
    pub state: String,
    pub is_running: bool,
    pub create_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnectionRequest {
    #[serde(default)]
    pub connection_string: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnectionResponse {
    pub is_connected: bool,
    pub message: String,
    pub server_version: Option<String>,
    pub database_name: Option<String>,
}

impl DatabaseConnectionResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_connected: false,
            message: message.into(),
            server_version: None,
            database_name: None,
        }
    }
}
