// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Embedded, crash-safe multi-queue storage.
//!
//! This crate provides [`ColumnQueue`], a durable store multiplexing any
//! number of independent FIFO queues ("columns") into a single on-disk sled
//! database. It is the buffering layer between an event producer and a
//! network forwarder: entries pushed here survive process restarts and are
//! only removed once the consumer explicitly acknowledges them.
//!
//! # Key scheme
//!
//! Every entry is stored under a key built from the column's numeric id and
//! the entry's sequence number, both zero-padded to ten digits:
//!
//! ```text
//! 0000000001_0000000001  ->  first entry of column "1"
//! 0000000001_0000000002  ->  second entry of column "1"
//! 0000000002_0000000001  ->  first entry of column "2"
//! ```
//!
//! The padding makes lexicographic byte order identical to
//! `(column, sequence)` numeric order, so the sorted store yields FIFO
//! semantics from a plain prefix scan with no secondary index.
//!
//! # Durability
//!
//! `push` flushes to disk before returning, and batch removal is a single
//! atomic write followed by a flush. On open, the store rebuilds all column
//! state purely from the on-disk keys; databases written by older versions
//! with unpadded keys are migrated to the canonical form during recovery.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(unused_extern_crates)]
#![deny(unreachable_pub)]

mod error;
mod key;
mod queue;

pub use error::QueueError;
pub use queue::ColumnQueue;
