// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors surfaced by [`crate::ColumnQueue`].
///
/// Storage failures are fatal for the affected operation and always
/// propagated to the caller; the queue never retries or swallows them.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The column name is not a decimal numeric string.
    ///
    /// Column ids are encoded as zero-padded decimal numbers inside the
    /// physical keys, so only names like `"1"` or `"001"` are accepted.
    #[error("invalid column name {0:?}: column names must be decimal numeric strings")]
    InvalidColumn(String),

    /// The column holds no entries.
    ///
    /// Returned by `front` and `pop` on an empty column. Popping an empty
    /// column is reported rather than silently ignored.
    #[error("column {0:?} is empty")]
    Empty(String),

    /// The underlying store failed (I/O error, disk full, corruption).
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),

    /// A key found during recovery could not be interpreted as
    /// `<column>_<sequence>`.
    #[error("corrupt queue key {0:?}")]
    CorruptKey(String),
}
