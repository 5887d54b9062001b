//! Background maintenance worker.
//!
//! One thread (`vecdb-compactor`) wakes on a fixed tick and, for each
//! collection:
//! - fsyncs the WAL if the Standard durability interval has elapsed
//! - once per compaction interval, compacts the collection if its WAL has
//!   passed the byte threshold
//!
//! A failed compaction aborts that cycle only; the collection keeps its
//! pre-compaction state and is retried on the next check. Shutdown sets
//! the cancel flag, which a snapshot in progress observes between sections.

use parking_lot::{Condvar, Mutex as ParkingMutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::collection::CompactionOutcome;
use crate::manager::CollectionManager;

/// Compaction worker metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactorStats {
    /// Completed compaction checks.
    pub cycles: u64,
    /// Snapshots written.
    pub compactions: u64,
    /// Compactions that failed or were cancelled.
    pub failures: u64,
}

/// When and how eagerly to sync and compact.
#[derive(Debug, Clone, Copy)]
pub struct CompactionPolicy {
    /// Time between compaction checks; `None` disables compaction.
    pub compaction_interval: Option<Duration>,
    /// Time between periodic WAL syncs; `None` when every append syncs.
    pub sync_interval: Option<Duration>,
    /// Compact once a collection's WAL holds this many bytes.
    pub wal_bytes_threshold: u64,
}

impl CompactionPolicy {
    /// Wake-up period, or `None` if there is nothing to do.
    pub fn tick(&self) -> Option<Duration> {
        match (self.compaction_interval, self.sync_interval) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

struct CompactorInner {
    manager: Arc<CollectionManager>,
    policy: CompactionPolicy,
    /// Guards the sleep; holds `true` once shutdown was requested.
    stop: ParkingMutex<bool>,
    wake: Condvar,
    cancel: AtomicBool,
    cycles: AtomicU64,
    compactions: AtomicU64,
    failures: AtomicU64,
}

/// Periodic compaction thread for one database.
pub struct CompactionWorker {
    inner: Arc<CompactorInner>,
    handle: ParkingMutex<Option<JoinHandle<()>>>,
}

impl CompactionWorker {
    /// Spawn the worker thread.
    ///
    /// Returns `None` when the policy has neither syncing nor compaction to
    /// do.
    pub fn start(
        manager: Arc<CollectionManager>,
        policy: CompactionPolicy,
    ) -> std::io::Result<Option<Self>> {
        let Some(tick) = policy.tick() else {
            return Ok(None);
        };
        let inner = Arc::new(CompactorInner {
            manager,
            policy,
            stop: ParkingMutex::new(false),
            wake: Condvar::new(),
            cancel: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        let inner_clone = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("vecdb-compactor".to_string())
            .spawn(move || worker_loop(&inner_clone, tick))?;

        Ok(Some(Self {
            inner,
            handle: ParkingMutex::new(Some(handle)),
        }))
    }

    /// Stop the worker: cancel any snapshot in progress and join the thread.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        self.inner.cancel.store(true, AtomicOrdering::Release);

        // Notify under the lock so a worker between its stop check and
        // wait() cannot miss the wake-up.
        {
            let mut stop = self.inner.stop.lock();
            *stop = true;
            self.inner.wake.notify_all();
        }

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Return a snapshot of worker metrics.
    pub fn stats(&self) -> CompactorStats {
        CompactorStats {
            cycles: self.inner.cycles.load(AtomicOrdering::Relaxed),
            compactions: self.inner.compactions.load(AtomicOrdering::Relaxed),
            failures: self.inner.failures.load(AtomicOrdering::Relaxed),
        }
    }
}

impl Drop for CompactionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &CompactorInner, tick: Duration) {
    let mut last_check = Instant::now();
    loop {
        {
            let mut stop = inner.stop.lock();
            if *stop {
                return;
            }
            inner.wake.wait_for(&mut stop, tick);
            if *stop {
                return;
            }
        }

        let compaction_due = inner
            .policy
            .compaction_interval
            .map(|interval| last_check.elapsed() >= interval)
            .unwrap_or(false);
        run_cycle(inner, compaction_due);
        if compaction_due {
            last_check = Instant::now();
            inner.cycles.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }
}

fn run_cycle(inner: &CompactorInner, compaction_due: bool) {
    for collection in inner.manager.collections() {
        if inner.cancel.load(AtomicOrdering::Acquire) {
            return;
        }

        if inner.policy.sync_interval.is_some() {
            if let Err(e) = collection.sync_if_overdue() {
                if !e.is_not_found() {
                    warn!(target: "vecdb::compaction", collection = collection.name(), error = %e, "Periodic WAL sync failed");
                }
            }
        }
        if !compaction_due {
            continue;
        }

        let wal_bytes = match collection.wal_bytes() {
            Ok(bytes) => bytes,
            // Dropped since the list was taken
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                warn!(target: "vecdb::compaction", collection = collection.name(), error = %e, "Cannot size WAL");
                continue;
            }
        };
        if wal_bytes < inner.policy.wal_bytes_threshold {
            continue;
        }

        debug!(target: "vecdb::compaction", collection = collection.name(), wal_bytes, "WAL over threshold, compacting");
        match collection.compact(&inner.cancel) {
            Ok(CompactionOutcome::Compacted { .. }) => {
                inner.compactions.fetch_add(1, AtomicOrdering::Relaxed);
            }
            Ok(CompactionOutcome::Skipped) => {}
            Err(e) => {
                inner.failures.fetch_add(1, AtomicOrdering::Relaxed);
                error!(target: "vecdb::compaction", collection = collection.name(), error = %e, "Background compaction failed");
            }
        }
    }
}
