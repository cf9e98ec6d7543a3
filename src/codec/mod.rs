//! Colony codecs
//!
//! - `csv`: legacy fixed-format bulk import (`id,x,y,A,,`)
//! - `json`: live store and wire representation
//!
//! Batch decoders never fail on a single bad record: they skip it and keep
//! going.

pub mod csv;
pub mod json;

use thiserror::Error;

/// Why a single record could not be decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected a JSON object for a colony")]
    NotAnObject,

    #[error("field `{field}` should be {expected}")]
    FieldType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("missing `colonies` array")]
    MissingEnvelope,
}
