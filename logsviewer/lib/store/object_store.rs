use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::future;
use sqlx::{Pool, Sqlite};
use tokio::sync::{watch, OnceCell};
use typed_builder::TypedBuilder;

use crate::{
    management::{self, LOGSVIEWER_DB_MIGRATOR},
    models::{Record, RecordKey},
    LogsViewerError, LogsViewerResult,
};

use super::{ItemExponentialBackoff, Outcome, WorkQueue};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Tuning knobs of the persistence queue.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StoreOptions {
    /// Deadline for a single store operation, connecting included.
    #[builder(default = Duration::from_millis(1000))]
    pub timeout: Duration,

    /// How many times a failed item is retried before it is dropped.
    #[builder(default = 3)]
    pub max_retries: u32,

    /// First retry delay.
    #[builder(default = Duration::from_millis(5))]
    pub backoff_base: Duration,

    /// Upper bound of the retry delay.
    #[builder(default = Duration::from_secs(1000))]
    pub backoff_max: Duration,
}

/// The persistence queue.
///
/// Records are added without blocking and upserted into the record database by a pool of
/// workers started with [`run`](Self::run). Records with the same identity are de-duplicated
/// while they wait. Failed upserts are retried with per-item exponential backoff up to
/// [`StoreOptions::max_retries`] times and then dropped. [`drain`](Self::drain) waits until every
/// added record was stored or dropped.
///
/// The database connection is opened on first use. If opening it fails, the next item tries
/// again.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    inner: Arc<ObjectStoreInner>,
}

/// Counters of what the store did with the records it was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records upserted successfully.
    pub stored: u64,

    /// Records dropped after their last retry.
    pub dropped: u64,
}

#[derive(Debug)]
struct ObjectStoreInner {
    db_path: PathBuf,
    options: StoreOptions,
    queue: WorkQueue<RecordKey, Record>,
    limiter: ItemExponentialBackoff<RecordKey>,
    pool: OnceCell<Pool<Sqlite>>,
    stored: AtomicU64,
    dropped: AtomicU64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ObjectStore {
    /// Creates a store writing to the database at `db_path`. Nothing is opened yet.
    pub fn new(db_path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let limiter = ItemExponentialBackoff::new(options.backoff_base, options.backoff_max);
        Self {
            inner: Arc::new(ObjectStoreInner {
                db_path: db_path.into(),
                options,
                queue: WorkQueue::new(),
                limiter,
                pool: OnceCell::new(),
                stored: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Path of the record database.
    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }

    /// Enqueues a record. Returns `false` if it replaced a record with the same identity that was
    /// still waiting to be stored.
    pub fn add(&self, record: Record) -> bool {
        let key = record.key();
        tracing::trace!(%key, "Enqueued object");
        self.inner.queue.add(key, record)
    }

    /// Waits until every record added so far was stored or dropped.
    ///
    /// Workers must be running, see [`run`](Self::run).
    pub async fn drain(&self) {
        self.inner.queue.wait_idle().await;
    }

    /// Number of records added but not yet stored or dropped.
    pub fn outstanding(&self) -> usize {
        self.inner.queue.outstanding()
    }

    /// What happened to the records so far.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            stored: self.inner.stored.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Returns the connection pool, opening the database and applying the schema on first use.
    ///
    /// Once connected, the pool is returned without further synchronization. A failed attempt
    /// leaves the store unconnected, so the next call tries again.
    pub async fn pool(&self) -> LogsViewerResult<Pool<Sqlite>> {
        let pool = self
            .inner
            .pool
            .get_or_try_init(|| async {
                let pool = self
                    .with_timeout(management::init_db(
                        &self.inner.db_path,
                        &LOGSVIEWER_DB_MIGRATOR,
                    ))
                    .await?;
                tracing::info!(path = %self.inner.db_path.display(), "Connected to record database");
                Ok::<_, LogsViewerError>(pool)
            })
            .await?;

        Ok(pool.clone())
    }

    /// Runs `workers` workers until `stop` turns `true` or its sender is dropped.
    ///
    /// Workers finish the item they hold before exiting. Records still queued at that point
    /// stay outstanding.
    pub async fn run(&self, workers: usize, mut stop: watch::Receiver<bool>) -> LogsViewerResult<()> {
        let workers = workers.max(1);
        tracing::info!(workers, "Starting object store workers");

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let store = self.clone();
                tokio::spawn(async move { store.work(id).await })
            })
            .collect();

        // A dropped sender also means stop
        let _ = stop.wait_for(|stopped| *stopped).await;

        tracing::info!("Stopping object store workers");
        self.inner.queue.shut_down();

        for result in future::join_all(handles).await {
            result?;
        }

        Ok(())
    }

    async fn work(&self, id: usize) {
        while let Some((key, record)) = self.inner.queue.get().await {
            let outcome = self.process(&key, record).await;
            self.inner.queue.done(&key, outcome);
        }
        tracing::debug!(worker = id, "Object store worker exited");
    }

    async fn process(&self, key: &RecordKey, record: Record) -> Outcome<Record> {
        let inner = &self.inner;

        match self.store(&record).await {
            Ok(()) => {
                tracing::debug!(%key, "Stored object");
                inner.limiter.forget(key);
                inner.stored.fetch_add(1, Ordering::Relaxed);
                Outcome::Finished
            }
            Err(e) if inner.limiter.num_requeues(key) < inner.options.max_retries => {
                let delay = inner.limiter.when(key);
                tracing::error!(%key, error = %e, ?delay, "Failed to store object, retrying");
                Outcome::Retry(record, delay)
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Dropping object after its last retry");
                inner.limiter.forget(key);
                inner.dropped.fetch_add(1, Ordering::Relaxed);
                Outcome::Finished
            }
        }
    }

    async fn store(&self, record: &Record) -> LogsViewerResult<()> {
        let pool = self.pool().await?;
        self.with_timeout(management::upsert_record(&pool, record))
            .await
    }

    async fn with_timeout<T>(
        &self,
        operation: impl std::future::Future<Output = LogsViewerResult<T>>,
    ) -> LogsViewerResult<T> {
        let timeout = self.inner.options.timeout;
        tokio::time::timeout(timeout, operation)
            .await
            .map_err(|_| LogsViewerError::StoreTimeout(timeout.as_millis() as u64))?
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for StoreOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
