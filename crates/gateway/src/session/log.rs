//! Pending log stream sessions.

use std::time::{Duration, Instant};

use super::registry::RegistryEntry;

/// A log stream waiting for its consumer.
///
/// Holds the remote client built during setup and the resource URL to read.
/// There is no worker: the consumer looks the session up, performs the read
/// and deletes the entry.
#[derive(Debug)]
pub struct LogSession<C> {
    client: C,
    url: String,
    created_at: Instant,
    /// Lifetime of the client handle; the sweeper drops the entry after it.
    ttl: Duration,
}

impl<C> LogSession<C> {
    pub fn new(client: C, url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Resource URL exactly as supplied at registration.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl<C: Send + Sync + 'static> RegistryEntry for LogSession<C> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_kept_verbatim() {
        let url = "/api/v1/namespaces/default/pods/foo/log?follow=true";
        let session = LogSession::new((), url, Duration::from_secs(1));
        assert_eq!(session.url(), url);
    }

    #[test]
    fn test_expires_after_ttl() {
        let session = LogSession::new((), "/log", Duration::from_secs(10));
        let created = session.created_at();
        assert!(!session.is_expired(created + Duration::from_secs(9)));
        assert!(session.is_expired(created + Duration::from_secs(10)));
    }
}
