//! Concurrent session registry.
//!
//! A registry maps session identifiers to shared session state. One registry
//! exists per session kind. All operations are safe to call concurrently from
//! any task without external locking; operations on the same key are
//! linearizable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::id::SessionId;

/// Lifecycle hooks for values stored in a [`SessionRegistry`].
pub trait RegistryEntry: Send + Sync + 'static {
    /// Called when the entry leaves the registry through `delete`,
    /// an overwriting `put`, a sweep, or `close_all`.
    fn close(&self) {}

    /// Whether the sweeper may drop this entry.
    fn is_expired(&self, now: Instant) -> bool;
}

/// Thread-safe session store keyed by [`SessionId`].
pub struct SessionRegistry<S> {
    /// Label used in log output.
    kind: &'static str,
    sessions: DashMap<SessionId, Arc<S>>,
}

impl<S: RegistryEntry> SessionRegistry<S> {
    /// Creates an empty registry.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            sessions: DashMap::new(),
        }
    }

    /// Inserts or overwrites the entry for `id`.
    ///
    /// Last write wins. A replaced session is closed.
    pub fn put(&self, id: SessionId, session: Arc<S>) {
        let incoming = Arc::clone(&session);
        if let Some(previous) = self.sessions.insert(id.clone(), session) {
            if !Arc::ptr_eq(&previous, &incoming) {
                tracing::debug!(kind = self.kind, session_id = %id, "Replaced existing session");
                previous.close();
            }
        }
    }

    /// Returns the session for `id`, if present.
    pub fn get(&self, id: &str) -> Option<Arc<S>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes and closes the session for `id`.
    ///
    /// Deleting an absent id is a no-op and returns `None`.
    pub fn delete(&self, id: &str) -> Option<Arc<S>> {
        let (id, session) = self.sessions.remove(id)?;
        session.close();
        tracing::debug!(kind = self.kind, session_id = %id, "Removed session");
        Some(session)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of the identifiers currently registered.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Removes every entry that reports itself expired at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.sessions.retain(|id, session| {
            if session.is_expired(now) {
                session.close();
                tracing::info!(kind = self.kind, session_id = %id, "Cleaned up expired session");
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Closes and removes every entry.
    pub fn close_all(&self) {
        self.sessions.retain(|_, session| {
            session.close();
            false
        });
    }

    /// Starts a background task that periodically sweeps expired sessions.
    ///
    /// The task exits when `shutdown` is cancelled.
    pub fn start_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = registry.sweep(Instant::now());
                        if removed > 0 {
                            tracing::debug!(
                                kind = registry.kind,
                                removed,
                                remaining = registry.len(),
                                "Session sweep finished"
                            );
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Entry {
        value: u32,
        expired: AtomicBool,
        closed: AtomicBool,
    }

    impl Entry {
        fn new(value: u32) -> Arc<Self> {
            Arc::new(Self {
                value,
                expired: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            })
        }
    }

    impl RegistryEntry for Entry {
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_expired(&self, _now: Instant) -> bool {
            self.expired.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_put_then_get_returns_same_session() {
        let registry = SessionRegistry::new("test");
        let entry = Entry::new(7);

        registry.put("a".to_string(), Arc::clone(&entry));

        let found = registry.get("a").unwrap();
        assert!(Arc::ptr_eq(&found, &entry));
        assert_eq!(found.value, 7);
    }

    #[test]
    fn test_get_missing() {
        let registry = SessionRegistry::<Entry>::new("test");
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_put_overwrites_and_closes_previous() {
        let registry = SessionRegistry::new("test");
        let first = Entry::new(1);
        let second = Entry::new(2);

        registry.put("a".to_string(), Arc::clone(&first));
        registry.put("a".to_string(), Arc::clone(&second));

        assert_eq!(registry.get("a").unwrap().value, 2);
        assert!(first.closed.load(Ordering::SeqCst));
        assert!(!second.closed.load(Ordering::SeqCst));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_put_same_session_twice_does_not_close() {
        let registry = SessionRegistry::new("test");
        let entry = Entry::new(1);

        registry.put("a".to_string(), Arc::clone(&entry));
        registry.put("a".to_string(), Arc::clone(&entry));

        assert!(!entry.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let registry = SessionRegistry::new("test");
        let entry = Entry::new(1);
        registry.put("a".to_string(), Arc::clone(&entry));

        assert!(registry.delete("a").is_some());
        assert!(entry.closed.load(Ordering::SeqCst));
        assert!(registry.get("a").is_none());

        assert!(registry.delete("a").is_none());
        assert!(registry.delete("never-inserted").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let registry = SessionRegistry::new("test");
        let keep = Entry::new(1);
        let stale = Entry::new(2);
        stale.expired.store(true, Ordering::SeqCst);

        registry.put("keep".to_string(), Arc::clone(&keep));
        registry.put("drop".to_string(), Arc::clone(&stale));

        assert_eq!(registry.sweep(Instant::now()), 1);
        assert!(registry.contains("keep"));
        assert!(!registry.contains("drop"));
        assert!(stale.closed.load(Ordering::SeqCst));
        assert!(!keep.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_close_all() {
        let registry = SessionRegistry::new("test");
        let a = Entry::new(1);
        let b = Entry::new(2);
        registry.put("a".to_string(), Arc::clone(&a));
        registry.put("b".to_string(), Arc::clone(&b));

        registry.close_all();

        assert!(registry.is_empty());
        assert!(a.closed.load(Ordering::SeqCst));
        assert!(b.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_get_from_other_task() {
        let registry = Arc::new(SessionRegistry::new("test"));
        let entry = Entry::new(42);
        registry.put("shared".to_string(), Arc::clone(&entry));

        let reader = Arc::clone(&registry);
        let found = tokio::spawn(async move { reader.get("shared") })
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&found, &entry));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_put_get_delete() {
        let registry = Arc::new(SessionRegistry::new("test"));

        let handles: Vec<_> = (0..200u32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let id = format!("session-{i}");
                    let entry = Entry::new(i);
                    registry.put(id.clone(), Arc::clone(&entry));
                    let found = registry.get(&id).unwrap();
                    assert_eq!(found.value, i);
                    if i % 2 == 0 {
                        registry.delete(&id);
                        assert!(registry.get(&id).is_none());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.len(), 100);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let registry = Arc::new(SessionRegistry::new("test"));
        let entry = Entry::new(1);
        entry.expired.store(true, Ordering::SeqCst);
        registry.put("a".to_string(), entry);

        let shutdown = CancellationToken::new();
        let handle = registry.start_sweeper(Duration::from_millis(10), shutdown.clone());

        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.contains("a") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sweeper did not remove expired entry");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
