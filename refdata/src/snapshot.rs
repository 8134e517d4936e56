use crate::metrics_defs::{RELOAD_DURATION, RELOAD_FAILURE, RELOAD_ROWS, RELOAD_SUCCESS};
use crate::source::SourceError;
use parking_lot::RwLock;
use shared::{counter, histogram};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{AcquireError, Semaphore};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("data source error: {0}")]
    DataSource(#[from] SourceError),
    #[error("reload lock closed")]
    ConcurrentLoad(#[from] AcquireError),
}

/// Implemented by the immutable per-table snapshots.
pub trait TableSnapshot: Send + Sync + 'static {
    /// Number of live entries, reported after each reload.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds the current snapshot of one table.
///
/// Readers clone the `Arc` under a read lock and then work on the immutable
/// snapshot, so lock hold time never depends on table size. Reloads are
/// serialized by `update_lock`; the new snapshot is built without holding
/// the `current` lock and published with a single pointer swap.
pub struct Snapshot<T> {
    table: &'static str,
    current: RwLock<Arc<T>>,
    update_lock: Semaphore,
    // Set once the first reload has been published.
    loaded: AtomicBool,
}

impl<T: TableSnapshot> Snapshot<T> {
    pub fn new(table: &'static str, initial: T) -> Self {
        Snapshot {
            table,
            current: RwLock::new(Arc::new(initial)),
            update_lock: Semaphore::new(1),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Builds a new snapshot with `build` and publishes it. `build` receives the
    /// snapshot that is live when the reload starts. On error the live snapshot
    /// is left untouched.
    pub async fn reload_with<F, Fut>(&self, build: F) -> Result<usize, LoadError>
    where
        F: FnOnce(Arc<T>) -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        // Hold permit for the duration of this function
        let _permit = self.update_lock.acquire().await?;
        let started = Instant::now();

        let next = match build(self.load()).await {
            Ok(next) => next,
            Err(err) => {
                tracing::error!(table = self.table, error = %err, "Reload failed, keeping previous snapshot");
                counter!(RELOAD_FAILURE, "table" => self.table).increment(1);
                return Err(err.into());
            }
        };

        let rows = next.len();
        *self.current.write() = Arc::new(next);
        self.loaded.store(true, Ordering::Release);

        counter!(RELOAD_SUCCESS, "table" => self.table).increment(1);
        histogram!(RELOAD_ROWS, "table" => self.table).record(rows as f64);
        histogram!(RELOAD_DURATION, "table" => self.table).record(started.elapsed().as_secs_f64());
        tracing::info!(table = self.table, rows, "Reloaded table");

        Ok(rows)
    }
}
