//! Order-preserving parallel map with a worker limit.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{effective_workers, FailFast};
use crate::error::CacheError;

// == Run Parallel ==
/// Applies `f` to every item on at most `max_workers` tasks.
///
/// `results[i]` always corresponds to `items[i]`. The first error cancels
/// the shared scope, stops launching new units and is returned once every
/// launched unit has settled; no partial results are returned. If the
/// parent context is cancelled before every item was launched, the result
/// is [`CacheError::Cancelled`].
///
/// # Arguments
/// * `ctx` - Parent context; a child scope of it is handed to every unit
/// * `items` - Units of work, consumed in order
/// * `max_workers` - Concurrent unit limit, 0 = host parallelism
/// * `f` - Unit function
pub async fn run_parallel<T, R, E, F, Fut>(
    ctx: &CancellationToken,
    items: Vec<T>,
    max_workers: usize,
    f: F,
) -> Result<Vec<R>, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: From<CacheError> + Send + 'static,
    F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    let workers = effective_workers(max_workers, total);
    debug!(units = total, workers, "starting parallel fan-out");

    let group = Arc::new(FailFast::new(ctx));
    let limit = Arc::new(Semaphore::new(workers));
    let f = Arc::new(f);
    let mut tasks = JoinSet::new();
    let mut launched = 0;

    for (index, item) in items.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = group.scope().cancelled() => None,
            permit = Arc::clone(&limit).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            break;
        };

        let f = Arc::clone(&f);
        let group = Arc::clone(&group);
        tasks.spawn(async move {
            let _permit = permit;
            match (*f)(group.scope().clone(), item).await {
                Ok(value) => Some((index, value)),
                Err(err) => {
                    group.fail(err);
                    None
                }
            }
        });
        launched += 1;
    }

    let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some((index, value))) => results[index] = Some(value),
            Ok(None) => {}
            Err(err) => group.fail(CacheError::TaskFailed(err.to_string()).into()),
        }
    }

    if let Some(err) = group.take_error() {
        warn!(units = total, launched, "parallel fan-out failed");
        return Err(err);
    }
    if launched < total {
        return Err(CacheError::Cancelled.into());
    }
    results
        .into_iter()
        .collect::<Option<Vec<R>>>()
        .ok_or_else(|| CacheError::Cancelled.into())
}

// == Run Parallel Map ==
/// Same as [`run_parallel`] over a keyed collection.
///
/// The output holds one entry per input key; ordering is irrelevant.
pub async fn run_parallel_map<K, V, R, E, F, Fut>(
    ctx: &CancellationToken,
    items: HashMap<K, V>,
    max_workers: usize,
    f: F,
) -> Result<HashMap<K, R>, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
    R: Send + 'static,
    E: From<CacheError> + Send + 'static,
    F: Fn(CancellationToken, K, V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let pairs: Vec<(K, V)> = items.into_iter().collect();
    let keyed = run_parallel(ctx, pairs, max_workers, move |ctx, (key, value): (K, V)| {
        let pending = f(ctx, key.clone(), value);
        async move { pending.await.map(|result| (key, result)) }
    })
    .await?;
    Ok(keyed.into_iter().collect())
}

// == Worker Pool ==
/// A reusable [`run_parallel`] with a fixed worker limit and unit function.
pub struct WorkerPool<F> {
    max_workers: usize,
    process: Arc<F>,
}

impl<F> Clone for WorkerPool<F> {
    fn clone(&self) -> Self {
        Self {
            max_workers: self.max_workers,
            process: Arc::clone(&self.process),
        }
    }
}

impl<F> WorkerPool<F> {
    // == Constructor ==
    /// Creates a pool bound to one unit function.
    ///
    /// # Arguments
    /// * `max_workers` - Concurrent unit limit, 0 = host parallelism
    /// * `process` - Unit function applied to every item
    pub fn new(max_workers: usize, process: F) -> Self {
        Self {
            max_workers,
            process: Arc::new(process),
        }
    }

    /// Returns the configured worker limit.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    // == Process ==
    /// Processes all items, preserving input order in the output.
    pub async fn process<T, R, E, Fut>(
        &self,
        ctx: &CancellationToken,
        items: Vec<T>,
    ) -> Result<Vec<R>, E>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: From<CacheError> + Send + 'static,
        F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let process = Arc::clone(&self.process);
        run_parallel(ctx, items, self.max_workers, move |ctx, item| (*process)(ctx, item)).await
    }
}
