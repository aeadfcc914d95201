//! Runner Module
//!
//! Bounded-concurrency helpers used to fan out loads.
//!
//! # Helpers
//! - `run_batches`: sequential fixed-size chunks
//! - `run_batches_concurrent`: chunks on a bounded number of tasks
//! - `run_parallel` / `WorkerPool`: order-preserving parallel map over a sequence
//! - `run_parallel_map`: parallel map over a keyed collection
//!
//! Every fan-out is fail-fast: the first error cancels a shared
//! [`CancellationToken`] scope and is the only error returned. Cancellation
//! is cooperative; units that ignore the token run to completion.

mod batch;
mod parallel;

use std::num::NonZeroUsize;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use batch::{run_batches, run_batches_concurrent, DEFAULT_BATCH_SIZE};
pub use parallel::{run_parallel, run_parallel_map, WorkerPool};

// == Worker Limit ==
/// Resolves a worker limit: 0 means host parallelism, and the result never
/// exceeds the number of units (but is at least 1).
pub fn effective_workers(max_workers: usize, units: usize) -> usize {
    let requested = if max_workers == 0 {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    } else {
        max_workers
    };
    requested.min(units).max(1)
}

// == Fail Fast ==
/// Shared cancellation scope that keeps only the first error.
pub(crate) struct FailFast<E> {
    scope: CancellationToken,
    first: Mutex<Option<E>>,
}

impl<E> FailFast<E> {
    /// Creates a scope that is also cancelled when `parent` is.
    pub(crate) fn new(parent: &CancellationToken) -> Self {
        Self {
            scope: parent.child_token(),
            first: Mutex::new(None),
        }
    }

    pub(crate) fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Records `err` if it is the first and cancels the scope.
    pub(crate) fn fail(&self, err: E) {
        let mut first = self.first.lock();
        if first.is_none() {
            *first = Some(err);
            drop(first);
            debug!("fan-out unit failed; cancelling siblings");
            self.scope.cancel();
        }
    }

    pub(crate) fn take_error(&self) -> Option<E> {
        self.first.lock().take()
    }
}
