use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::StoreError;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Fields owned by the store, never accepted from callers
const RESERVED_FIELDS: &[&str] = &[ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

pub type RecordId = u64;

/// One stored JSON object: `id`, caller fields, then lifecycle timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

/// Caller-supplied fields for create and update, with reserved keys rejected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Map<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from API input JSON, rejecting non-objects and store-owned fields
    pub fn from_json(json: Value) -> Result<Self, StoreError> {
        match json {
            Value::Object(map) => Self::from_map(map),
            other => Err(StoreError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self, StoreError> {
        if let Some(key) = map.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            return Err(StoreError::ReservedField(key.clone()));
        }
        Ok(Self(map))
    }

    /// Builder-style insert. Reserved keys are silently skipped.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        if !RESERVED_FIELDS.contains(&key.as_str()) {
            self.0.insert(key, value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Record {
    /// New record laid out as `{id, ...fields, createdAt}`
    pub(crate) fn create(id: RecordId, fields: Fields, now: DateTime<Utc>) -> Self {
        let mut map = Map::with_capacity(fields.len() + 2);
        map.insert(ID_FIELD.to_string(), Value::from(id));
        map.extend(fields.0);
        map.insert(CREATED_AT_FIELD.to_string(), Value::String(format_timestamp(now)));
        Self(map)
    }

    /// Validate one element read back from a collection file
    pub(crate) fn from_stored(value: Value) -> Result<Self, String> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(format!("expected object, found {}", json_kind(&other))),
        };
        match map.get(ID_FIELD).and_then(Value::as_u64) {
            Some(id) if id > 0 => Ok(Self(map)),
            _ => Err(format!(
                "record without a positive integer id: {}",
                Value::Object(map)
            )),
        }
    }

    /// Shallow merge: supplied keys overwrite, everything else stays.
    /// `updatedAt` always moves past both the previous update and `createdAt`.
    pub(crate) fn merge(&mut self, fields: Fields, now: DateTime<Utc>) {
        for (key, value) in fields.0 {
            self.0.insert(key, value);
        }
        let previous = self.updated_at().or_else(|| self.created_at());
        let stamp = next_update_stamp(previous, now);
        self.0
            .insert(UPDATED_AT_FIELD.to_string(), Value::String(format_timestamp(stamp)));
    }

    pub fn id(&self) -> RecordId {
        // from_stored and create both guarantee a positive integer id
        self.0.get(ID_FIELD).and_then(Value::as_u64).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.get_str(CREATED_AT_FIELD).and_then(parse_timestamp)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.get_str(UPDATED_AT_FIELD).and_then(parse_timestamp)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy of the record with the named fields removed (e.g. password hashes)
    pub fn without(&self, hidden: &[&str]) -> Value {
        let map: Map<String, Value> = self
            .0
            .iter()
            .filter(|(k, _)| !hidden.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn next_update_stamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(3);
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
