// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connector configuration and construction-time validation.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::ConnectorError;

/// Placeholder in index names substituted with the current date at
/// construction time, e.g. `events-$(date)` -> `events-2026.08.06`.
const DATE_PLACEHOLDER: &str = "$(date)";

/// Fallback credential used when no username or password is configured.
/// Explicitly insecure; a warning is logged whenever it is applied.
const DEFAULT_CREDENTIAL: &str = "admin";

/// Options for [`crate::IndexerConnector`].
///
/// All fields have test-friendly defaults except `name`, `hosts` and
/// `storage_path`, which every deployment must provide.
#[derive(Debug, Clone)]
pub struct IndexerConnectorConfig {
    /// Target index name, which also names the queue store directory.
    /// Supports the `$(date)` placeholder; the resolved name must be
    /// all-lowercase.
    pub name: String,
    /// Backend base URLs tried in rotation. Must be non-empty.
    pub hosts: Vec<String>,
    /// Per-request timeout. Expiry is treated like any other transport
    /// error: the batch is retained and retried.
    pub timeout: Duration,
    /// Optional PEM CA bundle for verifying the backend.
    pub ca_cert_path: Option<PathBuf>,
    /// Optional PEM client certificate (with `client_key_path`) for mutual
    /// TLS.
    pub client_cert_path: Option<PathBuf>,
    /// Optional PEM client key (with `client_cert_path`).
    pub client_key_path: Option<PathBuf>,
    /// Basic-auth username; defaults to an insecure fallback with a warning
    /// when unset.
    pub username: Option<String>,
    /// Basic-auth password; same fallback behavior as `username`.
    pub password: Option<String>,
    /// Dispatch worker count. `0` falls back to single ordered dispatching.
    /// Only `1` preserves cross-entry operation order.
    pub working_threads: usize,
    /// Root directory for the durable queue; the store lives at
    /// `<storage_path>/<resolved name>`.
    pub storage_path: PathBuf,
    /// Maximum entries per bulk request.
    pub batch_limit: usize,
    /// How long an idle worker sleeps between drain cycles.
    pub drain_interval: Duration,
}

impl Default for IndexerConnectorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            hosts: Vec::new(),
            timeout: Duration::from_secs(10),
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            username: None,
            password: None,
            working_threads: 1,
            storage_path: PathBuf::new(),
            batch_limit: 1000,
            drain_interval: Duration::from_secs(1),
        }
    }
}

/// Substitutes the `$(date)` placeholder and validates the resolved index
/// name.
///
/// # Errors
///
/// Fails fast on an empty name or one containing uppercase characters; the
/// backend rejects uppercase index names at request time, which would
/// otherwise wedge every batch in permanent retry.
pub(crate) fn resolve_index_name(name: &str) -> Result<String, ConnectorError> {
    let resolved = name.replace(DATE_PLACEHOLDER, &current_date());

    if resolved.is_empty() {
        return Err(ConnectorError::Configuration(
            "index name must not be empty".to_string(),
        ));
    }
    if resolved.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ConnectorError::Configuration(format!(
            "index name {resolved:?} must be lowercase"
        )));
    }
    Ok(resolved)
}

fn current_date() -> String {
    chrono::Utc::now().format("%Y.%m.%d").to_string()
}

/// Resolves basic-auth credentials, applying the documented insecure
/// default for any side left unset.
pub(crate) fn credentials(config: &IndexerConnectorConfig) -> (String, String) {
    let username = match config.username.as_deref() {
        Some(user) if !user.is_empty() => user.to_string(),
        _ => {
            warn!("no username found in the configuration, using default value");
            DEFAULT_CREDENTIAL.to_string()
        }
    };
    let password = match config.password.as_deref() {
        Some(pass) if !pass.is_empty() => pass.to_string(),
        _ => {
            warn!("no password found in the configuration, using default value");
            DEFAULT_CREDENTIAL.to_string()
        }
    };
    (username, password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lowercase_name_passes_through() {
        assert_eq!(resolve_index_name("events-main").unwrap(), "events-main");
    }

    #[test]
    fn date_placeholder_is_substituted() {
        let resolved = resolve_index_name("events-$(date)").unwrap();
        let expected = format!("events-{}", chrono::Utc::now().format("%Y.%m.%d"));
        assert_eq!(resolved, expected);
    }

    #[test]
    fn uppercase_names_are_rejected() {
        assert!(resolve_index_name("Events").is_err());
        assert!(resolve_index_name("events-A").is_err());
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(resolve_index_name("").is_err());
    }

    #[test]
    fn missing_credentials_fall_back_to_default() {
        let config = IndexerConnectorConfig::default();
        let (user, pass) = credentials(&config);
        assert_eq!(user, "admin");
        assert_eq!(pass, "admin");
    }

    #[test]
    fn configured_credentials_are_used() {
        let config = IndexerConnectorConfig {
            username: Some("svc-indexer".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let (user, pass) = credentials(&config);
        assert_eq!(user, "svc-indexer");
        assert_eq!(pass, "hunter2");
    }

    #[test]
    fn empty_credentials_fall_back_to_default() {
        let config = IndexerConnectorConfig {
            username: Some(String::new()),
            password: Some(String::new()),
            ..Default::default()
        };
        let (user, pass) = credentials(&config);
        assert_eq!(user, "admin");
        assert_eq!(pass, "admin");
    }
}
