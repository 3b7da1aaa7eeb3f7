// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Indexer agent: reads newline-delimited event envelopes from stdin and
//! forwards them to a bulk-indexing backend through the durable connector.
//!
//! Configuration is environment-variable driven; the event producer is
//! expected to pipe one JSON envelope per line. On interrupt or end of
//! stream the connector shuts down cooperatively and any unacknowledged
//! events stay buffered on disk for the next start.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, path::PathBuf, time::Duration};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use indexer_connector::{ConnectorError, IndexerConnector, IndexerConnectorConfig};

const DEFAULT_INDEX_NAME: &str = "agent-events-$(date)";
const DEFAULT_STORAGE_PATH: &str = "queue-data";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("IDX_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,reqwest=off,sled=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let hosts: Vec<String> = env::var("IDX_HOSTS")
        .map(|val| {
            val.split(',')
                .map(|host| host.trim().to_string())
                .filter(|host| !host.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if hosts.is_empty() {
        error!("IDX_HOSTS not set. Shutting down indexer agent.");
        return;
    }

    let config = IndexerConnectorConfig {
        name: env::var("IDX_INDEX_NAME").unwrap_or_else(|_| DEFAULT_INDEX_NAME.to_string()),
        hosts,
        timeout: Duration::from_secs(
            env::var("IDX_TIMEOUT_SECS")
                .ok()
                .and_then(|val| val.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        ),
        ca_cert_path: env::var("IDX_CA_CERT").ok().map(PathBuf::from),
        client_cert_path: env::var("IDX_CLIENT_CERT").ok().map(PathBuf::from),
        client_key_path: env::var("IDX_CLIENT_KEY").ok().map(PathBuf::from),
        username: env::var("IDX_USERNAME").ok(),
        password: env::var("IDX_PASSWORD").ok(),
        working_threads: env::var("IDX_WORKING_THREADS")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(1),
        storage_path: env::var("IDX_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_PATH)),
        ..Default::default()
    };

    let mut connector = match IndexerConnector::new(config) {
        Ok(connector) => connector,
        Err(e) => {
            error!("Error creating indexer connector on agent startup: {e}");
            return;
        }
    };

    info!(
        index = connector.index_name(),
        "indexer agent started, reading events from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match connector.publish(line.as_bytes()) {
                        Ok(()) => {}
                        Err(ConnectorError::ShutdownInProgress) => break,
                        Err(e) => {
                            error!("failed to buffer event: {e}");
                            break;
                        }
                    }
                }
                Ok(None) => {
                    info!("event stream closed");
                    break;
                }
                Err(e) => {
                    error!("failed to read event stream: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    let backlog = connector.backlog();
    if backlog > 0 {
        info!(backlog, "events still buffered, they will be delivered on next start");
    }
    connector.shutdown().await;
}
