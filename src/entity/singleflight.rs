//! Single-flight request collapsing.
//!
//! Concurrent callers asking for the same fingerprint share one in-flight
//! future. The first caller spawns the work; later callers await the same
//! shared result. The registry entry is dropped as soon as the work settles,
//! whether it succeeded or failed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CacheError, Result};

type SharedCall<T> = Shared<BoxFuture<'static, Result<T>>>;

struct Call<T> {
    /// Distinguishes a forgotten call from a newer one under the same key
    id: u64,
    result: SharedCall<T>,
}

// == Single Flight ==
/// Registry of in-flight calls keyed by fingerprint.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, Call<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // == Run ==
    /// Runs `work` for `key` unless a call for it is already in flight, in
    /// which case the caller joins that call instead.
    ///
    /// The work is spawned onto the runtime, so it completes (and the
    /// registry entry is cleaned up) even if every waiter goes away.
    ///
    /// # Arguments
    /// * `key` - Fingerprint shared by callers that want the same result
    /// * `work` - Builds the call's future; only invoked when no call is registered
    pub async fn run<F, Fut>(self: &Arc<Self>, key: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(call) => {
                    debug!(key, "joining in-flight load");
                    call.result.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let result = self.spawn(key.to_string(), id, work());
                    calls.insert(
                        key.to_string(),
                        Call {
                            id,
                            result: result.clone(),
                        },
                    );
                    result
                }
            }
        };

        shared.await
    }

    // == Forget ==
    /// Drops the registry entry for `key` so the next caller starts a fresh
    /// call. A call already running still finishes for its own waiters.
    pub fn forget(&self, key: &str) {
        self.calls.lock().remove(key);
    }

    // == Introspection ==
    /// Returns true while a call for `key` is registered.
    pub fn in_flight(&self, key: &str) -> bool {
        self.calls.lock().contains_key(key)
    }

    /// Number of registered calls.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true when no call is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn<Fut>(self: &Arc<Self>, key: String, id: u64, work: Fut) -> SharedCall<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let guard = FlightGuard {
            registry: Arc::clone(self),
            key,
            id,
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            work.await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(CacheError::TaskFailed(err.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}

impl<T> SingleFlight<T> {
    fn finish(&self, key: &str, id: u64) {
        let mut calls = self.calls.lock();
        if calls.get(key).is_some_and(|call| call.id == id) {
            calls.remove(key);
        }
    }
}

// == Flight Guard ==
/// Unregisters a call when its task ends, including by panic.
struct FlightGuard<T> {
    registry: Arc<SingleFlight<T>>,
    key: String,
    id: u64,
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        self.registry.finish(&self.key, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_single_call_runs_work() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        let value = flights.run("k", || async { Ok(7) }).await.unwrap();

        assert_eq!(value, 7);
        assert!(flights.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_collapse() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let flights = Arc::clone(&flights);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                flights
                    .run("k", move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(14)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 14);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn test_error_is_shared_and_not_retained() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        let first = flights
            .run("k", || async { Err(CacheError::load("k", "boom".into())) })
            .await;
        assert!(matches!(first, Err(CacheError::Load { .. })));
        assert!(!flights.in_flight("k"));

        let second = flights.run("k", || async { Ok(1) }).await;
        assert_eq!(second.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_forget_starts_fresh_call() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let release = Arc::new(Notify::new());

        let gate = Arc::clone(&release);
        let stale = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run("k", move || async move {
                        gate.notified().await;
                        Ok(1)
                    })
                    .await
            })
        };

        while !flights.in_flight("k") {
            tokio::task::yield_now().await;
        }
        flights.forget("k");
        assert!(!flights.in_flight("k"));

        let fresh = flights.run("k", || async { Ok(2) }).await.unwrap();
        assert_eq!(fresh, 2);

        release.notify_one();
        assert_eq!(stale.await.unwrap().unwrap(), 1);
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_work_reports_task_failure() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        let result = flights
            .run("k", || async {
                if true {
                    panic!("loader exploded");
                }
                Ok(0)
            })
            .await;

        assert!(matches!(result, Err(CacheError::TaskFailed(_))));
        assert!(flights.is_empty(), "panicked call must not linger");
    }
}
