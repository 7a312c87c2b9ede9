//! # Persistence Pipeline
//!
//! **Snapshot on the mutation thread, write on the writer thread**
//!
//! Trade state must survive restarts without the disk ever stalling a
//! tick. The pipeline gets there in three steps:
//!
//! 1. The engine snapshots dirty shops on the mutation thread (cheap
//!    clones of plain data) and enqueues the snapshots
//! 2. A dedicated writer thread drains the queue and performs the
//!    temp-fsync-rename dance per record
//! 3. Failed writes are retried with backoff; shops whose writes keep
//!    failing are reported back so the engine can re-mark them dirty
//!
//! ```text
//!   Mutation Thread ──> [Bounded Queue] ──> [Writer Thread] ──> Disk
//!      (snapshots)        (Mutex+Condvar)     (single writer)
//! ```
//!
//! The loss window after a crash is bounded by the snapshot cadence:
//! at most `interval_ticks` worth of mutations (or fewer, when the dirty
//! count crosses `dirty_flush_threshold` first).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use tradepost_shared::{
    ShopId, DEFAULT_DIRTY_FLUSH_THRESHOLD, DEFAULT_PERSIST_INTERVAL_TICKS,
};

use crate::error::{TradeError, TradeResult};
use crate::persist::ShopStore;
use crate::shop::Shop;

/// Persistence tuning, loaded from the `[persist]` config section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Ticks between periodic dirty-shop snapshots.
    pub interval_ticks: u64,
    /// Dirty-shop count that forces an early snapshot.
    pub dirty_flush_threshold: usize,
    /// Bounded queue capacity (snapshots awaiting write).
    pub queue_capacity: usize,
    /// Write attempts per record before giving up and reporting.
    pub max_retries: u32,
    /// Backoff between retries, in milliseconds, doubled per attempt.
    pub retry_backoff_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            interval_ticks: DEFAULT_PERSIST_INTERVAL_TICKS,
            dirty_flush_threshold: DEFAULT_DIRTY_FLUSH_THRESHOLD,
            queue_capacity: 1024,
            max_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl PersistConfig {
    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on a zero interval or capacity.
    pub fn validate(&self) -> TradeResult<()> {
        if self.interval_ticks == 0 {
            return Err(TradeError::InvalidConfig(
                "persist.interval_ticks must be nonzero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(TradeError::InvalidConfig(
                "persist.queue_capacity must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One unit of work for the writer thread.
enum WriteJob {
    /// Write a shop snapshot.
    Save(Box<Shop>),
    /// Remove a shop's record (explicit teardown).
    Delete(ShopId),
    /// Barrier: signal when every job enqueued before it is done.
    Flush(Arc<FlushSignal>),
}

/// Condvar-backed completion signal for flush barriers.
struct FlushSignal {
    done: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl FlushSignal {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    fn signal(&self) {
        self.done.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    fn wait(&self) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.mutex.lock();
        while !self.done.load(Ordering::Acquire) {
            self.condvar.wait(&mut guard);
        }
    }
}

/// Bounded job queue between mutation and writer threads.
struct JobQueue {
    jobs: Mutex<VecDeque<WriteJob>>,
    not_empty: Condvar,
    capacity: usize,
}

impl JobQueue {
    fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Appends a job. Returns the job back on a full queue (backpressure).
    fn push(&self, job: WriteJob) -> Result<(), WriteJob> {
        let mut jobs = self.jobs.lock();
        if jobs.len() >= self.capacity {
            return Err(job);
        }
        jobs.push_back(job);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pops the next job, waiting up to `timeout` for one to arrive.
    fn pop(&self, timeout: Duration) -> Option<WriteJob> {
        let mut jobs = self.jobs.lock();
        if jobs.is_empty() {
            self.not_empty.wait_for(&mut jobs, timeout);
        }
        jobs.pop_front()
    }

    fn len(&self) -> usize {
        self.jobs.lock().len()
    }
}

/// Writer-side counters, readable from any thread.
#[derive(Clone, Debug, Default)]
pub struct PersistStats {
    /// Records written successfully.
    pub records_written: u64,
    /// Records deleted.
    pub records_deleted: u64,
    /// Individual write attempts that failed (before retry).
    pub write_failures: u64,
    /// Records abandoned after exhausting retries.
    pub records_abandoned: u64,
    /// Total time spent writing, in nanoseconds.
    pub total_write_time_ns: u64,
}

/// A record the writer gave up on; the engine re-marks it dirty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbandonedWrite {
    /// Shop whose snapshot could not be written.
    pub shop_id: ShopId,
    /// Attempts made.
    pub attempts: u32,
}

/// Off-thread shop record writer.
pub struct PersistencePipeline {
    config: PersistConfig,
    queue: Arc<JobQueue>,
    writer_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Mutex<PersistStats>>,
    abandoned: Arc<Mutex<Vec<AbandonedWrite>>>,
}

impl PersistencePipeline {
    /// Starts the writer thread over a store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the config fails validation.
    pub fn start(store: ShopStore, config: PersistConfig) -> TradeResult<Self> {
        config.validate()?;

        let queue = Arc::new(JobQueue::new(config.queue_capacity));
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(PersistStats::default()));
        let abandoned = Arc::new(Mutex::new(Vec::new()));

        let writer_queue = Arc::clone(&queue);
        let writer_shutdown = Arc::clone(&shutdown);
        let writer_stats = Arc::clone(&stats);
        let writer_abandoned = Arc::clone(&abandoned);
        let writer_config = config.clone();

        let writer_handle = thread::Builder::new()
            .name("tradepost-persist".to_string())
            .spawn(move || {
                Self::writer_loop(
                    &store,
                    &writer_queue,
                    &writer_shutdown,
                    &writer_stats,
                    &writer_abandoned,
                    &writer_config,
                );
            })
            .map_err(|e| TradeError::PersistenceFailure(format!("spawn writer thread: {e}")))?;

        Ok(Self {
            config,
            queue,
            writer_handle: Some(writer_handle),
            shutdown,
            stats,
            abandoned,
        })
    }

    fn writer_loop(
        store: &ShopStore,
        queue: &JobQueue,
        shutdown: &AtomicBool,
        stats: &Mutex<PersistStats>,
        abandoned: &Mutex<Vec<AbandonedWrite>>,
        config: &PersistConfig,
    ) {
        let idle_wait = Duration::from_millis(20);

        loop {
            let Some(job) = queue.pop(idle_wait) else {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                continue;
            };

            match job {
                WriteJob::Save(shop) => {
                    Self::write_with_retry(store, *shop, stats, abandoned, config);
                }
                WriteJob::Delete(shop_id) => match store.delete(shop_id) {
                    Ok(()) => stats.lock().records_deleted += 1,
                    Err(err) => {
                        error!(shop_id, %err, "record delete failed");
                        stats.lock().write_failures += 1;
                    }
                },
                WriteJob::Flush(signal) => signal.signal(),
            }
        }

        // Drain whatever is still queued before exiting.
        while let Some(job) = queue.pop(Duration::ZERO) {
            match job {
                WriteJob::Save(shop) => {
                    Self::write_with_retry(store, *shop, stats, abandoned, config);
                }
                WriteJob::Delete(shop_id) => {
                    if store.delete(shop_id).is_ok() {
                        stats.lock().records_deleted += 1;
                    }
                }
                WriteJob::Flush(signal) => signal.signal(),
            }
        }
    }

    fn write_with_retry(
        store: &ShopStore,
        shop: Shop,
        stats: &Mutex<PersistStats>,
        abandoned: &Mutex<Vec<AbandonedWrite>>,
        config: &PersistConfig,
    ) {
        let shop_id = shop.id;
        let start = Instant::now();
        let mut backoff = Duration::from_millis(config.retry_backoff_ms);
        let attempts = config.max_retries.max(1);

        for attempt in 1..=attempts {
            match store.write(shop.clone()) {
                Ok(()) => {
                    let mut s = stats.lock();
                    s.records_written += 1;
                    s.total_write_time_ns +=
                        u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
                    return;
                }
                Err(err) => {
                    stats.lock().write_failures += 1;
                    if attempt == attempts {
                        error!(shop_id, attempts, %err, "record write abandoned");
                        stats.lock().records_abandoned += 1;
                        abandoned.lock().push(AbandonedWrite { shop_id, attempts });
                    } else {
                        warn!(shop_id, attempt, %err, "record write failed, retrying");
                        thread::sleep(backoff);
                        backoff *= 2;
                    }
                }
            }
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Enqueues a shop snapshot for writing.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the queue is full; the caller keeps
    /// the shop marked dirty and retries next cycle.
    pub fn enqueue_save(&self, snapshot: Shop) -> TradeResult<()> {
        debug!(shop_id = snapshot.id, "snapshot enqueued");
        self.queue
            .push(WriteJob::Save(Box::new(snapshot)))
            .map_err(|_| TradeError::PersistenceFailure("persist queue full".to_string()))
    }

    /// Enqueues a record deletion (shop torn down).
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the queue is full.
    pub fn enqueue_delete(&self, shop_id: ShopId) -> TradeResult<()> {
        self.queue
            .push(WriteJob::Delete(shop_id))
            .map_err(|_| TradeError::PersistenceFailure("persist queue full".to_string()))
    }

    /// Blocks until every previously enqueued job has hit the disk.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the flush barrier cannot be queued.
    pub fn flush(&self) -> TradeResult<()> {
        let signal = Arc::new(FlushSignal::new());
        self.queue
            .push(WriteJob::Flush(Arc::clone(&signal)))
            .map_err(|_| TradeError::PersistenceFailure("persist queue full".to_string()))?;
        signal.wait();
        Ok(())
    }

    /// Number of jobs waiting for the writer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of the writer counters.
    #[must_use]
    pub fn stats(&self) -> PersistStats {
        self.stats.lock().clone()
    }

    /// Drains the abandoned-write reports accumulated since the last call.
    #[must_use]
    pub fn take_abandoned(&self) -> Vec<AbandonedWrite> {
        std::mem::take(&mut *self.abandoned.lock())
    }
}

impl Drop for PersistencePipeline {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // Wake the writer if it is parked on an empty queue.
        {
            let jobs = self.queue.jobs.lock();
            self.queue.not_empty.notify_all();
            drop(jobs);
        }

        if let Some(handle) = self.writer_handle.take() {
            let _ = handle.join();
        }
    }
}
