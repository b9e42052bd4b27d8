use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::store::{Record, RecordId};

/// Fields never returned to clients
pub const HIDDEN_USER_FIELDS: &[&str] = &["password"];

/// Parse a `:id` path segment as a positive record id
pub fn parse_id(raw: &str) -> Result<RecordId, ApiError> {
    match raw.trim().parse::<RecordId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request(format!("Invalid id '{}'", raw))),
    }
}

/// Unwrap a JSON body, turning extractor rejections into the error envelope
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_json(rejection.body_text()))
}

/// Body must be a JSON object
pub fn require_object(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::invalid_json("Request body must be a JSON object")),
    }
}

/// Non-blank string, trimmed; `None` for missing or blank values
pub fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// User record as shown to clients
pub fn public_user(user: &Record) -> Value {
    user.without(HIDDEN_USER_FIELDS)
}

/// Owning user id stored on a record, if any
pub fn owner_id(record: &Record) -> Option<RecordId> {
    record.get("userId").and_then(Value::as_u64)
}

/// Accept numbers or numeric strings ("12.5"); anything else is a 400
pub fn coerce_number(field: &str, value: &Value) -> Result<f64, ApiError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).ok_or_else(|| {
        ApiError::validation_error(format!("Field '{}' must be a number", field), None)
    })
}
