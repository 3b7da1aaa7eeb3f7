// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connector error taxonomy.
//!
//! Storage and configuration errors propagate to the caller and are never
//! masked. Transport errors are caught at the send boundary and converted
//! into retain-and-retry; they never crash the pipeline.

use thiserror::Error;

/// Errors surfaced by the connector API.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Invalid configuration; fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The durable store failed; fatal for the affected operation.
    #[error("storage error: {0}")]
    Storage(#[from] column_queue::QueueError),

    /// Network/TLS failure or non-success backend response. Recoverable:
    /// the batch stays in the store and is retried on the next drain cycle,
    /// possibly against a different host.
    #[error("transport error: {0}")]
    Transport(String),

    /// The stop flag is set; no new work is accepted and no new network
    /// call is started. Not a data-loss condition.
    #[error("connector is shutting down")]
    ShutdownInProgress,

    /// A dequeued entry does not parse as the expected envelope. Such
    /// entries are skipped, never delivered and never retried, so a single
    /// poison entry cannot stall its column.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
