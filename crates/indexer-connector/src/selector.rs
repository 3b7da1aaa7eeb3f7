// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rotating, health-aware backend host selection.
//!
//! The selector rotates round-robin over the configured pool and prefers
//! hosts currently believed healthy. Health is a passive signal: the
//! dispatcher reports the outcome of every send attempt. A failing host is
//! deprioritized rather than excluded and becomes eligible again after a
//! cooldown, since transient outages are expected. Selection never blocks:
//! with every host failing, the least-recently-failed one is returned so
//! the pipeline keeps probing instead of stalling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::ConnectorError;

/// How long a failing host stays deprioritized before being retried.
pub(crate) const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct HostStatus {
    healthy: bool,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
struct HostState {
    url: String,
    status: Mutex<HostStatus>,
}

/// Chooses the next backend host for each delivery attempt.
#[derive(Debug)]
pub struct ServerSelector {
    hosts: Vec<HostState>,
    cursor: AtomicUsize,
    cooldown: Duration,
}

#[allow(clippy::expect_used)]
impl ServerSelector {
    /// Builds a selector over `hosts`. Trailing slashes are stripped so
    /// URLs compose cleanly with request paths.
    ///
    /// # Errors
    ///
    /// An empty pool is a configuration error.
    pub fn new(hosts: Vec<String>, cooldown: Duration) -> Result<Self, ConnectorError> {
        if hosts.is_empty() {
            return Err(ConnectorError::Configuration(
                "at least one backend host must be configured".to_string(),
            ));
        }
        let hosts = hosts
            .into_iter()
            .map(|url| HostState {
                url: url.trim_end_matches('/').to_string(),
                status: Mutex::new(HostStatus {
                    healthy: true,
                    last_failure: None,
                }),
            })
            .collect();
        Ok(Self {
            hosts,
            cursor: AtomicUsize::new(0),
            cooldown,
        })
    }

    /// Returns the base URL to try next.
    pub fn next(&self) -> String {
        let pool_size = self.hosts.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);

        // Rotation pass: the first host that is healthy, or whose cooldown
        // has elapsed, wins.
        for offset in 0..pool_size {
            let host = &self.hosts[(start + offset) % pool_size];
            let status = host.status.lock().expect("host status lock poisoned");
            let cooled_down = status
                .last_failure
                .is_none_or(|failed_at| failed_at.elapsed() >= self.cooldown);
            if status.healthy || cooled_down {
                return host.url.clone();
            }
        }

        // Every host failed recently: take the least-recently-failed one
        // rather than stalling the pipeline.
        let fallback = self
            .hosts
            .iter()
            .max_by_key(|host| {
                host.status
                    .lock()
                    .expect("host status lock poisoned")
                    .last_failure
                    .map_or(Duration::MAX, |failed_at| failed_at.elapsed())
            })
            .expect("host pool is never empty");
        fallback.url.clone()
    }

    /// Marks a host healthy after a successful send.
    pub fn report_success(&self, url: &str) {
        if let Some(host) = self.hosts.iter().find(|host| host.url == url) {
            let mut status = host.status.lock().expect("host status lock poisoned");
            status.healthy = true;
            status.last_failure = None;
        }
    }

    /// Deprioritizes a host after a failed send.
    pub fn report_failure(&self, url: &str) {
        if let Some(host) = self.hosts.iter().find(|host| host.url == url) {
            let mut status = host.status.lock().expect("host status lock poisoned");
            status.healthy = false;
            status.last_failure = Some(Instant::now());
            debug!(host = %host.url, "backend host deprioritized after failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(urls: &[&str], cooldown: Duration) -> ServerSelector {
        ServerSelector::new(urls.iter().map(ToString::to_string).collect(), cooldown).unwrap()
    }

    #[test]
    fn empty_pool_is_a_configuration_error() {
        assert!(ServerSelector::new(Vec::new(), DEFAULT_COOLDOWN).is_err());
    }

    #[test]
    fn rotates_round_robin_over_healthy_hosts() {
        let selector = selector(&["http://a:9200", "http://b:9200"], DEFAULT_COOLDOWN);

        assert_eq!(selector.next(), "http://a:9200");
        assert_eq!(selector.next(), "http://b:9200");
        assert_eq!(selector.next(), "http://a:9200");
    }

    #[test]
    fn trailing_slashes_are_stripped() {
        let selector = selector(&["http://a:9200/"], DEFAULT_COOLDOWN);
        assert_eq!(selector.next(), "http://a:9200");
    }

    #[test]
    fn failed_host_is_skipped_until_cooldown() {
        let selector = selector(&["http://a:9200", "http://b:9200"], Duration::from_secs(60));

        selector.report_failure("http://a:9200");
        assert_eq!(selector.next(), "http://b:9200");
        assert_eq!(selector.next(), "http://b:9200");
    }

    #[test]
    fn failed_host_returns_after_cooldown() {
        let selector = selector(&["http://a:9200", "http://b:9200"], Duration::from_millis(10));

        selector.report_failure("http://a:9200");
        std::thread::sleep(Duration::from_millis(20));
        // Cooldown elapsed: "a" is back in rotation.
        assert_eq!(selector.next(), "http://a:9200");
    }

    #[test]
    fn success_restores_a_failed_host() {
        let selector = selector(&["http://a:9200", "http://b:9200"], Duration::from_secs(60));

        selector.report_failure("http://a:9200");
        selector.report_success("http://a:9200");
        assert_eq!(selector.next(), "http://a:9200");
    }

    #[test]
    fn all_failed_returns_least_recently_failed_without_blocking() {
        let selector = selector(&["http://a:9200", "http://b:9200"], Duration::from_secs(60));

        selector.report_failure("http://a:9200");
        std::thread::sleep(Duration::from_millis(5));
        selector.report_failure("http://b:9200");

        // "a" failed first, so it is the least-recently-failed candidate.
        assert_eq!(selector.next(), "http://a:9200");
    }
}
