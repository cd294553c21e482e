//! Per-key memoization with at most one computation in flight per key.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct Flight<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for Flight<K, V> {
    fn default() -> Self {
        Self { cells: Mutex::new(HashMap::new()) }
    }
}

impl<K, V> Flight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        self.cells.lock().entry(key.clone()).or_default().clone()
    }

    /// The memoized value for `key`, running `init` if nobody has yet.
    ///
    /// Concurrent callers wait on the first caller's `init`. A failed `init`
    /// stores nothing, so the next waiter runs its own.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(key);
        cell.get_or_try_init(init).await.cloned()
    }

    /// Forget `key`. Callers already waiting keep the old cell.
    pub fn invalidate(&self, key: &K) {
        self.cells.lock().remove(key);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.cells.lock().get(key).is_some_and(|cell| cell.initialized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_callers_share_one_run() {
        let flight: Flight<&str, usize> = Flight::new();
        let counter = AtomicUsize::new(0);
        let runs = &counter;
        let call = || {
            flight.get_or_try_init(&"k", move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok::<_, ()>(7)
            })
        };
        let (a, b, c) = tokio::join!(call(), call(), call());
        assert_eq!((a, b, c), (Ok(7), Ok(7), Ok(7)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_run() {
        let flight: Flight<String, usize> = Flight::new();
        let key = "pkg".to_string();
        let first = flight.get_or_try_init(&key, || async { Ok::<_, ()>(1) }).await;
        flight.invalidate(&key);
        assert!(!flight.contains(&key));
        let second = flight.get_or_try_init(&key, || async { Ok::<_, ()>(2) }).await;
        assert_eq!((first, second), (Ok(1), Ok(2)));
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let flight: Flight<u8, u8> = Flight::new();
        let failed = flight.get_or_try_init(&0, || async { Err::<u8, _>("boom") }).await;
        assert_eq!(failed, Err("boom"));
        let ok = flight.get_or_try_init(&0, || async { Ok::<_, &str>(3) }).await;
        assert_eq!(ok, Ok(3));
    }
}
