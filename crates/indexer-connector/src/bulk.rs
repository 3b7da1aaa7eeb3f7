// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk request assembly.
//!
//! Converts a drained batch of queue entries into the newline-delimited
//! body of one `_bulk` request. Pure transformation: no I/O, no connector
//! state.
//!
//! Each entry carries a minimal envelope; the `data` body is otherwise
//! opaque to the connector:
//!
//! ```json
//! { "operation": "DELETED" | <other>, "id": <optional>, "data": <json> }
//! ```
//!
//! A `DELETED` operation emits an action line deleting the document by id;
//! anything else emits an index action line followed by the document body,
//! letting the backend assign an id when none is supplied.

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::ConnectorError;

/// Marker operation for delete actions.
const DELETE_OPERATION: &str = "DELETED";

/// Envelope every queue entry is expected to parse as.
#[derive(Debug, Deserialize)]
struct Envelope {
    operation: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Assembled body of one bulk request.
#[derive(Debug)]
pub struct BulkPayload {
    /// Newline-delimited action/body lines, terminated by a trailing
    /// newline. Empty when the batch produced no actions; an empty body
    /// suppresses the network round-trip entirely.
    pub body: String,
    /// Number of actions included.
    pub actions: usize,
    /// Entries that failed envelope parsing and were skipped. Skipped
    /// entries are committed with the batch so they can never block their
    /// column.
    pub skipped: usize,
}

/// Builds the bulk body for `entries` targeting `index`, in entry order.
#[must_use]
pub fn build_bulk_payload(index: &str, entries: &[Vec<u8>]) -> BulkPayload {
    let mut payload = BulkPayload {
        body: String::new(),
        actions: 0,
        skipped: 0,
    };

    for entry in entries {
        match render_action(index, entry) {
            Ok(lines) => {
                payload.body.push_str(&lines);
                payload.actions += 1;
            }
            Err(error) => {
                warn!(%error, "skipping malformed queue entry");
                payload.skipped += 1;
            }
        }
    }
    payload
}

/// Renders the action line(s) for a single entry, trailing newline
/// included.
fn render_action(index: &str, entry: &[u8]) -> Result<String, ConnectorError> {
    let envelope: Envelope = serde_json::from_slice(entry)
        .map_err(|e| ConnectorError::MalformedPayload(e.to_string()))?;

    if envelope.operation == DELETE_OPERATION {
        let id = envelope.id.ok_or_else(|| {
            ConnectorError::MalformedPayload("delete operation without an id".to_string())
        })?;
        let metadata = json!({ "delete": { "_index": index, "_id": id } });
        return Ok(format!("{metadata}\n"));
    }

    let data = envelope.data.ok_or_else(|| {
        ConnectorError::MalformedPayload(format!(
            "{:?} operation without a data body",
            envelope.operation
        ))
    })?;
    let metadata = match envelope.id {
        Some(id) => json!({ "index": { "_index": index, "_id": id } }),
        None => json!({ "index": { "_index": index } }),
    };
    Ok(format!("{metadata}\n{data}\n"))
}
