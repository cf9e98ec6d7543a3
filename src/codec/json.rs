//! JSON colony codec
//!
//! Colony objects look like
//! `{"id":1,"x":10.0,"y":20.0,"active":true,"visited":false,"modified":null}`.
//! Decoding layers a (possibly partial) object over an existing colony, so a
//! missing key keeps whatever the colony already had. Full collections travel
//! inside a `{"colonies":[...]}` envelope.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

use super::CodecError;
use crate::model::{Colony, ColonySet};

/// Envelope key wrapping a full collection.
pub const ENVELOPE_KEY: &str = "colonies";

/// Encode one colony as a JSON object.
pub fn encode(colony: &Colony) -> Value {
    json!({
        "id": colony.id(),
        "x": colony.x(),
        "y": colony.y(),
        "active": colony.is_active(),
        "visited": colony.is_visited(),
        "modified": colony
            .modified_at()
            .map(|at| at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    })
}

/// Decode a colony object from scratch.
pub fn decode(value: &Value) -> Result<Colony, CodecError> {
    let mut colony = Colony::default();
    decode_into(&mut colony, value)?;
    Ok(colony)
}

/// Layer `value` over `colony`.
///
/// The colony is only modified when the whole object decodes cleanly.
pub fn decode_into(colony: &mut Colony, value: &Value) -> Result<(), CodecError> {
    let object = value.as_object().ok_or(CodecError::NotAnObject)?;

    let id = match field(object, "id") {
        Some(raw) => raw
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .ok_or(CodecError::FieldType {
                field: "id",
                expected: "a 32-bit integer",
            })?,
        None => colony.id(),
    };
    let x = number_or(object, "x", colony.x())?;
    let y = number_or(object, "y", colony.y())?;
    let active = bool_or(object, "active", colony.is_active())?;
    let visited = bool_or(object, "visited", colony.is_visited())?;
    let modified_at = match object.get("modified") {
        None => colony.modified_at(),
        Some(Value::Null) => None,
        Some(Value::String(text)) => Some(parse_timestamp(text)?),
        Some(_) => {
            return Err(CodecError::FieldType {
                field: "modified",
                expected: "a date-time string or null",
            })
        }
    };

    let mut decoded = Colony::new(id, x, y, active);
    decoded.set_visited(visited);
    decoded.set_modified_at(modified_at);
    *colony = decoded;
    Ok(())
}

/// Wrap a collection in the `{"colonies":[...]}` envelope.
pub fn encode_envelope(colonies: &ColonySet) -> Value {
    json!({ ENVELOPE_KEY: encode_all(colonies) })
}

/// Encode every colony into a JSON array.
pub fn encode_all(colonies: &ColonySet) -> Value {
    Value::Array(colonies.iter().map(encode).collect())
}

/// Decode a JSON array of colonies, skipping elements that fail.
pub fn decode_all(elements: &[Value]) -> ColonySet {
    let mut colonies = ColonySet::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        match decode(element) {
            Ok(colony) => {
                colonies.insert(colony);
            }
            Err(e) => warn!(index, error = %e, "Skipping malformed colony element"),
        }
    }
    colonies
}

/// Decode an envelope from text.
///
/// Fails only if the text is not JSON or carries no `colonies` array.
pub fn decode_envelope(text: &str) -> Result<ColonySet, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let elements = value
        .get(ENVELOPE_KEY)
        .and_then(Value::as_array)
        .ok_or(CodecError::MissingEnvelope)?;
    Ok(decode_all(elements))
}

fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

fn number_or(
    object: &Map<String, Value>,
    key: &'static str,
    current: f64,
) -> Result<f64, CodecError> {
    match field(object, key) {
        Some(raw) => raw.as_f64().ok_or(CodecError::FieldType {
            field: key,
            expected: "a number",
        }),
        None => Ok(current),
    }
}

fn bool_or(
    object: &Map<String, Value>,
    key: &'static str,
    current: bool,
) -> Result<bool, CodecError> {
    match field(object, key) {
        Some(raw) => raw.as_bool().ok_or(CodecError::FieldType {
            field: key,
            expected: "a boolean",
        }),
        None => Ok(current),
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, CodecError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| CodecError::InvalidTimestamp(text.to_string()))
}
