//! Colony server wire protocol
//!
//! Newline-terminated JSON, one request line answered by one response line:
//!
//! ```text
//! {"request":"get-colonies"}                  -> {"colonies":[...]}
//! {"request":"update","colony":{...}}         -> acknowledgement line
//! {"request":"update_all","colonies":[...]}   -> acknowledgement line
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::json;
use crate::error::{Result, SyncError};
use crate::model::{Colony, ColonySet};

/// Client-to-server request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request")]
pub enum Request {
    /// Fetch the full collection
    #[serde(rename = "get-colonies")]
    GetColonies,

    /// Store one colony
    #[serde(rename = "update")]
    Update { colony: Value },

    /// Replace the server's collection
    #[serde(rename = "update_all")]
    UpdateAll { colonies: Vec<Value> },
}

impl Request {
    pub fn update(colony: &Colony) -> Self {
        Request::Update {
            colony: json::encode(colony),
        }
    }

    pub fn update_all(colonies: &ColonySet) -> Self {
        Request::UpdateAll {
            colonies: colonies.iter().map(json::encode).collect(),
        }
    }

    /// Discriminator as it appears on the wire, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetColonies => "get-colonies",
            Request::Update { .. } => "update",
            Request::UpdateAll { .. } => "update_all",
        }
    }

    /// Serialize to a single line, terminator included.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Interpret a `get-colonies` response line.
pub fn parse_colonies_response(line: &str) -> Result<ColonySet> {
    json::decode_envelope(line).map_err(|e| SyncError::Protocol(format!("get-colonies: {e}")))
}
