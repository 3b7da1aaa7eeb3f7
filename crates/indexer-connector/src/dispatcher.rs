// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dispatch workers: drain the durable queue and publish bulk requests.
//!
//! Each worker runs the same cycle:
//!
//! ```text
//!   ┌──────┐    ┌──────────┐    ┌──────────┐    ┌─────────┐
//!   │ Idle │ -> │ Draining │ -> │ Building │ -> │ Sending │
//!   └──────┘    └──────────┘    └──────────┘    └────┬────┘
//!      ^                                             │
//!      │        ┌────────────┐   2xx                 │
//!      ├─────── │ Committing │ <──────────┬──────────┤
//!      │        └────────────┘            │          │ error
//!      │        ┌────────────┐            │          │
//!      └─────── │  Retrying  │ <──────────┴──────────┘
//!               └────────────┘
//! ```
//!
//! Draining claims one column (mutual exclusion per column, so two workers
//! can never race on the same head) and peeks a bounded batch in sequence
//! order. Committing removes the batch from the store — that removal is the
//! acknowledgment point. On any transport failure the batch is left
//! untouched and redrained on the next cycle, against a possibly different
//! host: at-least-once delivery, never silent loss.
//!
//! Workers hold no state of their own; everything shared lives in the
//! reference-counted [`DispatchContext`], and the stop token is checked at
//! every suspension point.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use column_queue::ColumnQueue;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::bulk;
use crate::error::ConnectorError;
use crate::selector::ServerSelector;

/// Shared state for the worker pool.
#[derive(Debug)]
pub(crate) struct DispatchContext {
    pub(crate) index_name: String,
    pub(crate) queue: ColumnQueue,
    pub(crate) selector: ServerSelector,
    pub(crate) client: reqwest::Client,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) batch_limit: usize,
    pub(crate) drain_interval: Duration,
    pub(crate) cancel: CancellationToken,
    pub(crate) wake: Notify,
    /// Columns currently being drained by some worker.
    pub(crate) claims: Mutex<HashSet<String>>,
}

#[allow(clippy::expect_used)]
impl DispatchContext {
    /// Claims the first unclaimed column that currently holds entries.
    fn claim_column(&self) -> Option<ColumnClaim<'_>> {
        let mut claims = self.claims.lock().expect("column claims lock poisoned");
        for column in self.queue.columns() {
            if !claims.contains(&column) {
                claims.insert(column.clone());
                return Some(ColumnClaim {
                    context: self,
                    column,
                });
            }
        }
        None
    }
}

/// Exclusive right to drain one column; released on drop.
struct ColumnClaim<'a> {
    context: &'a DispatchContext,
    column: String,
}

impl ColumnClaim<'_> {
    fn column(&self) -> &str {
        &self.column
    }
}

#[allow(clippy::expect_used)]
impl Drop for ColumnClaim<'_> {
    fn drop(&mut self) {
        self.context
            .claims
            .lock()
            .expect("column claims lock poisoned")
            .remove(&self.column);
    }
}

/// Main loop of one dispatch worker. Runs until the stop token is
/// cancelled; uncommitted entries stay in the store for the next start.
pub(crate) async fn run_worker(context: Arc<DispatchContext>, slot: usize) {
    debug!(slot, "dispatch worker started");

    loop {
        if context.cancel.is_cancelled() {
            break;
        }

        let Some(claim) = context.claim_column() else {
            idle_wait(&context).await;
            continue;
        };

        match drain_column(&context, claim.column()).await {
            // Batch committed: drain again immediately, the column may
            // hold more.
            Ok(committed) if committed > 0 => {}
            Ok(_) => {
                drop(claim);
                idle_wait(&context).await;
            }
            Err(ConnectorError::ShutdownInProgress) => break,
            Err(error @ ConnectorError::Transport(_)) => {
                warn!(%error, column = claim.column(), "send failed, batch retained for retry");
                drop(claim);
                idle_wait(&context).await;
            }
            Err(error) => {
                error!(%error, column = claim.column(), "drain cycle failed");
                drop(claim);
                idle_wait(&context).await;
            }
        }
    }

    debug!(slot, "dispatch worker stopped");
}

/// One Draining → Building → Sending → Committing pass over `column`.
/// Returns the number of entries committed (zero when the column turned
/// out empty).
async fn drain_column(context: &DispatchContext, column: &str) -> Result<usize, ConnectorError> {
    let entries = context.queue.peek_batch(column, context.batch_limit)?;
    if entries.is_empty() {
        return Ok(0);
    }

    if context.cancel.is_cancelled() {
        return Err(ConnectorError::ShutdownInProgress);
    }

    let payload = bulk::build_bulk_payload(&context.index_name, &entries);

    if !payload.body.is_empty() {
        send_bulk(context, payload.body).await?;
    }

    // The acknowledgment point: entries are only considered delivered once
    // the store confirms removal. Skipped malformed entries are removed
    // with the batch so they can never wedge the column.
    context.queue.pop_batch(column, entries.len())?;
    debug!(
        column,
        entries = entries.len(),
        actions = payload.actions,
        skipped = payload.skipped,
        "batch committed"
    );
    Ok(entries.len())
}

/// Sends one bulk body to the next selected host.
async fn send_bulk(context: &DispatchContext, body: String) -> Result<(), ConnectorError> {
    let host = context.selector.next();
    let url = format!("{host}/_bulk?refresh=wait_for");

    let response = context
        .client
        .post(&url)
        .basic_auth(&context.username, Some(&context.password))
        .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .send()
        .await;

    match response {
        Ok(response) if response.status().is_success() => {
            context.selector.report_success(&host);
            debug!(host = %host, "bulk request acknowledged");
            Ok(())
        }
        Ok(response) => {
            context.selector.report_failure(&host);
            Err(ConnectorError::Transport(format!(
                "{host} answered {}",
                response.status()
            )))
        }
        Err(error) => {
            context.selector.report_failure(&host);
            Err(ConnectorError::Transport(error.to_string()))
        }
    }
}

/// Parks an idle worker until new work arrives, the drain interval
/// elapses, or shutdown begins.
async fn idle_wait(context: &DispatchContext) {
    tokio::select! {
        () = context.cancel.cancelled() => {}
        () = context.wake.notified() => {}
        () = tokio::time::sleep(context.drain_interval) => {}
    }
}
