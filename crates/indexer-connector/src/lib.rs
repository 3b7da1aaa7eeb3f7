// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Indexer Connector
//!
//! Durable, batched event forwarding to a search/indexing backend.
//!
//! The connector sits between a monitoring agent producing events and a
//! remote bulk-indexing API. Every published event is buffered on local
//! disk before the call returns, so nothing is lost across process
//! restarts or network outages; a pool of dispatch workers then drains the
//! buffer, assembles bulk requests and delivers them with failover across
//! the configured backend hosts.
//!
//! ```text
//!   producer ──> publish() ──> ColumnQueue (fsync) ──> worker pool
//!                                                          │
//!                                              bulk POST   v
//!                                   backend <── ServerSelector rotation
//! ```
//!
//! Delivery is at-least-once: a batch is only removed from the buffer
//! after the backend acknowledged it, and a failed batch is re-sent
//! byte-identical on a later cycle. With `working_threads = 1` the
//! connector preserves strict publish order end to end; higher counts
//! trade that ordering for throughput.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(unused_extern_crates)]
#![deny(unreachable_pub)]

pub mod bulk;
pub mod config;
mod dispatcher;
pub mod error;
mod http;
pub mod selector;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use column_queue::ColumnQueue;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use crate::config::IndexerConnectorConfig;
pub use crate::error::ConnectorError;

use crate::dispatcher::DispatchContext;
use crate::selector::ServerSelector;

/// Durable publisher of agent events to a bulk-indexing backend.
///
/// Owns the on-disk queue and a pool of dispatch worker tasks for its whole
/// lifetime. Construction opens (and, if needed, recovers) the store,
/// validates the configuration and spawns the workers, so it must run
/// inside a tokio runtime. Call [`shutdown`] for a graceful stop; dropping
/// the connector also stops the workers, without waiting for them.
///
/// [`shutdown`]: IndexerConnector::shutdown
pub struct IndexerConnector {
    context: Arc<DispatchContext>,
    workers: Vec<JoinHandle<()>>,
    next_slot: AtomicUsize,
    working_threads: usize,
}

impl IndexerConnector {
    /// Validates `config`, opens the durable queue at
    /// `<storage_path>/<resolved index name>` and starts the worker pool.
    ///
    /// # Errors
    ///
    /// Fails fast on configuration problems (uppercase index name, empty
    /// host pool, unreadable TLS material, zero batch limit) and on storage
    /// failures while opening or recovering the queue.
    pub fn new(config: IndexerConnectorConfig) -> Result<Self, ConnectorError> {
        let index_name = config::resolve_index_name(&config.name)?;

        if config.batch_limit == 0 {
            return Err(ConnectorError::Configuration(
                "batch limit must be at least 1".to_string(),
            ));
        }
        let working_threads = if config.working_threads == 0 {
            debug!("invalid number of working threads, using single ordered dispatching");
            1
        } else {
            config.working_threads
        };

        let selector = ServerSelector::new(config.hosts.clone(), selector::DEFAULT_COOLDOWN)?;
        let client = http::build_client(&config)?;
        let (username, password) = config::credentials(&config);
        let queue = ColumnQueue::open(config.storage_path.join(&index_name))?;

        let context = Arc::new(DispatchContext {
            index_name,
            queue,
            selector,
            client,
            username,
            password,
            batch_limit: config.batch_limit,
            drain_interval: config.drain_interval,
            cancel: CancellationToken::new(),
            wake: Notify::new(),
            claims: std::sync::Mutex::new(std::collections::HashSet::new()),
        });

        let workers = (0..working_threads)
            .map(|slot| tokio::spawn(dispatcher::run_worker(Arc::clone(&context), slot)))
            .collect();

        info!(
            index = %context.index_name,
            workers = working_threads,
            backlog = context.queue.len(),
            "indexer connector started"
        );

        Ok(Self {
            context,
            workers,
            next_slot: AtomicUsize::new(0),
            working_threads,
        })
    }

    /// Durably enqueues one event for asynchronous delivery.
    ///
    /// The payload is the opaque envelope bytes produced by the event
    /// transformation stage; it is flushed to disk before this returns.
    /// Events are sharded round-robin across one column per worker, which
    /// keeps single-worker deployments strictly ordered and lets larger
    /// pools drain in parallel without contention.
    ///
    /// # Errors
    ///
    /// [`ConnectorError::ShutdownInProgress`] once shutdown has begun;
    /// [`ConnectorError::Storage`] if the queue write fails (fatal,
    /// surfaced, never swallowed).
    pub fn publish(&self, payload: &[u8]) -> Result<(), ConnectorError> {
        if self.context.cancel.is_cancelled() {
            return Err(ConnectorError::ShutdownInProgress);
        }

        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.working_threads;
        self.context.queue.push(&(slot + 1).to_string(), payload)?;
        self.context.wake.notify_one();
        Ok(())
    }

    /// Number of events buffered on disk and not yet acknowledged by the
    /// backend.
    #[must_use]
    pub fn backlog(&self) -> u64 {
        self.context.queue.len()
    }

    /// Resolved target index name (after `$(date)` substitution).
    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.context.index_name
    }

    /// Cooperative shutdown: sets the stop flag, then waits for every
    /// worker to observe it and exit. In-flight drain cycles abort before
    /// starting any new network call; entries not yet committed remain in
    /// the store for the next process start.
    pub async fn shutdown(&mut self) {
        self.context.cancel.cancel();
        self.context.wake.notify_waiters();

        for worker in self.workers.drain(..) {
            if let Err(error) = worker.await {
                error!(%error, "dispatch worker terminated abnormally");
            }
        }

        info!(
            remaining = self.context.queue.len(),
            "indexer connector stopped"
        );
    }
}

impl Drop for IndexerConnector {
    fn drop(&mut self) {
        // Stop flag for workers still running if shutdown() was never
        // called; they hold their own reference to the context and exit at
        // the next suspension point.
        self.context.cancel.cancel();
    }
}
