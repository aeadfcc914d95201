//! Fixed-size chunking, sequential or on a bounded number of tasks.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::parallel::run_parallel;
use crate::error::CacheError;

/// Chunk size used when a caller passes 0.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

fn resolve_batch_size(batch_size: usize) -> usize {
    if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size
    }
}

// == Run Batches ==
/// Calls `f` on consecutive chunks of `items` in order, stopping at the
/// first error. The last chunk may be shorter.
///
/// # Arguments
/// * `items` - Items to partition; empty input never calls `f`
/// * `batch_size` - Chunk length, 0 = [`DEFAULT_BATCH_SIZE`]
/// * `f` - Chunk handler
pub fn run_batches<T, E, F>(items: &[T], batch_size: usize, mut f: F) -> Result<(), E>
where
    F: FnMut(&[T]) -> Result<(), E>,
{
    for chunk in items.chunks(resolve_batch_size(batch_size)) {
        f(chunk)?;
    }
    Ok(())
}

// == Run Batches Concurrent ==
/// Runs chunks of `items` on up to `max_workers` tasks.
///
/// All chunks share one cancellation scope derived from `ctx`. The first
/// failing chunk cancels that scope, and its error is returned after every
/// started chunk has settled. Chunks are expected to watch the token they
/// receive; the runner never aborts one.
///
/// # Arguments
/// * `ctx` - Parent context; its cancellation reaches every chunk
/// * `items` - Items to partition; each chunk is an owned copy
/// * `batch_size` - Chunk length, 0 = [`DEFAULT_BATCH_SIZE`]
/// * `max_workers` - Concurrent chunk limit, 0 = host parallelism
/// * `f` - Chunk handler, given the shared scope token
pub async fn run_batches_concurrent<T, E, F, Fut>(
    ctx: &CancellationToken,
    items: &[T],
    batch_size: usize,
    max_workers: usize,
    f: F,
) -> Result<(), E>
where
    T: Clone + Send + 'static,
    E: From<CacheError> + Send + 'static,
    F: Fn(CancellationToken, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    if items.is_empty() {
        return Ok(());
    }

    let chunks: Vec<Vec<T>> = items
        .chunks(resolve_batch_size(batch_size))
        .map(<[T]>::to_vec)
        .collect();
    debug!(items = items.len(), chunks = chunks.len(), "running concurrent batches");

    run_parallel(ctx, chunks, max_workers, f).await.map(|_| ())
}
