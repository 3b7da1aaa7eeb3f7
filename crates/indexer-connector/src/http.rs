// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTPS client construction.
//!
//! Builds the single reqwest client shared by all dispatch workers:
//! per-request timeout from the configuration, connection pooling with TCP
//! keep-alive, an optional private CA bundle and an optional client
//! identity for mutual TLS. Construction fails fast on unreadable or
//! invalid TLS material; a connector that silently skipped its TLS
//! configuration would fail on every send with a far less useful error.

use std::path::Path;
use std::time::Duration;

use crate::config::IndexerConnectorConfig;
use crate::error::ConnectorError;

pub(crate) fn build_client(
    config: &IndexerConnectorConfig,
) -> Result<reqwest::Client, ConnectorError> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        // Enable TCP keepalive to detect dead connections
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if let Some(path) = &config.ca_cert_path {
        let pem = read_pem(path)?;
        let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
            ConnectorError::Configuration(format!("invalid CA certificate {path:?}: {e}"))
        })?;
        builder = builder.add_root_certificate(certificate);
    }

    match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            // reqwest expects certificate and key concatenated in one PEM
            // bundle.
            let mut pem = read_pem(cert_path)?;
            pem.extend(read_pem(key_path)?);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                ConnectorError::Configuration(format!(
                    "invalid client identity {cert_path:?}/{key_path:?}: {e}"
                ))
            })?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(ConnectorError::Configuration(
                "client certificate and key must be configured together".to_string(),
            ));
        }
    }

    builder
        .build()
        .map_err(|e| ConnectorError::Configuration(format!("failed to build HTTP client: {e}")))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConnectorError> {
    std::fs::read(path)
        .map_err(|e| ConnectorError::Configuration(format!("cannot read TLS file {path:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_client_builds() {
        let config = IndexerConnectorConfig::default();
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn missing_ca_file_fails_construction() {
        let config = IndexerConnectorConfig {
            ca_cert_path: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_client(&config),
            Err(ConnectorError::Configuration(_))
        ));
    }

    #[test]
    fn cert_without_key_fails_construction() {
        let config = IndexerConnectorConfig {
            client_cert_path: Some("/nonexistent/cert.pem".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_client(&config),
            Err(ConnectorError::Configuration(_))
        ));
    }

    #[test]
    fn garbage_ca_material_fails_construction() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, b"definitely not pem").unwrap();

        let config = IndexerConnectorConfig {
            ca_cert_path: Some(path),
            ..Default::default()
        };
        assert!(matches!(
            build_client(&config),
            Err(ConnectorError::Configuration(_))
        ));
    }
}
