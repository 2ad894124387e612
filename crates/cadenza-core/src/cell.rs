//! Configuration hot-swap cell.
//!
//! Control threads publish immutable snapshots through a [`ConfigPublisher`];
//! the real-time thread picks up the newest one at the start of every cycle
//! through its [`ConfigReader`]. Neither side blocks the other and the
//! real-time side never allocates or frees:
//!
//! - `publish` boxes the snapshot and swaps it into a single pending slot. A
//!   snapshot that was still pending is dropped right there, on the
//!   publishing thread, because the reader never saw it.
//! - `acquire` takes the pending snapshot (if any), makes it active and pushes
//!   the previously active one onto a bounded retirement queue.
//! - `reclaim` frees everything on the retirement queue.
//!
//! `acquire` borrows the reader mutably, so no reference it handed out can
//! survive the next swap. Whatever sits on the retirement queue is therefore
//! unreferenced and `reclaim` may run while audio keeps running.
//!
//! ```
//! use cadenza_core::ConfigCell;
//!
//! let (publisher, mut reader) = ConfigCell::new::<f32>();
//! assert!(reader.acquire().is_err());
//!
//! publisher.publish(0.5);
//! publisher.publish(0.25); // replaces 0.5, which is never observed
//! assert_eq!(*reader.acquire().unwrap(), 0.25);
//!
//! publisher.publish(1.0);
//! assert_eq!(*reader.acquire().unwrap(), 1.0);
//! assert_eq!(publisher.reclaim(), 1); // 0.25 retired, freed here
//! ```

use crate::spsc::{QueueConsumer, QueueProducer, SpscQueue};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;

/// Retirement queue length used by [`ConfigCell::new`].
pub const DEFAULT_RETIRE_CAPACITY: usize = 16;

/// Nothing has been published to the cell yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("configuration cell has no published snapshot")]
pub struct NotReady;

/// Outcome of [`ConfigPublisher::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// The pending slot was empty.
    Accepted,
    /// A pending snapshot that was never acquired got dropped.
    Replaced,
    /// The reader is gone; the snapshot was dropped.
    Closed,
}

/// Counter snapshot of a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellStats {
    pub published: u64,
    pub replaced: u64,
    pub activated: u64,
    pub reclaimed: u64,
    pub deferred: u64,
    /// Snapshots waiting on the retirement queue.
    pub retired: usize,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    replaced: AtomicU64,
    activated: AtomicU64,
    reclaimed: AtomicU64,
    deferred: AtomicU64,
}

struct Shared<T> {
    pending: AtomicPtr<T>,
    closed: AtomicBool,
    retired: Mutex<QueueConsumer<Box<T>>>,
    counters: Counters,
    _owns: PhantomData<Box<T>>,
}

// SAFETY: `pending` holds a `Box<T>` produced by `Box::into_raw`; ownership is
// transferred with an atomic swap, so exactly one thread owns it at a time and
// no `&T` is ever shared between threads. That only requires `T: Send`.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn take_pending(&self) -> Option<Box<T>> {
        let raw = self.pending.swap(ptr::null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            None
        } else {
            // SAFETY: non-null values in `pending` always come from `Box::into_raw`
            // and the swap above made this thread their only owner.
            Some(unsafe { Box::from_raw(raw) })
        }
    }

    #[inline]
    fn has_pending(&self) -> bool {
        !self.pending.load(Ordering::Acquire).is_null()
    }

    fn reclaim(&self) -> usize {
        let mut retired = self.retired.lock();
        let mut freed = 0;
        while let Some(snapshot) = retired.pop() {
            drop(snapshot);
            freed += 1;
        }
        self.counters
            .reclaimed
            .fetch_add(freed as u64, Ordering::Relaxed);
        freed
    }

    fn stats(&self) -> CellStats {
        CellStats {
            published: self.counters.published.load(Ordering::Relaxed),
            replaced: self.counters.replaced.load(Ordering::Relaxed),
            activated: self.counters.activated.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
            deferred: self.counters.deferred.load(Ordering::Relaxed),
            retired: self.retired.lock().fill_count(),
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        drop(self.take_pending());
    }
}

/// Constructor for a publisher/reader pair.
pub struct ConfigCell;

impl ConfigCell {
    /// Unconfigured cell with [`DEFAULT_RETIRE_CAPACITY`].
    pub fn new<T: Send>() -> (ConfigPublisher<T>, ConfigReader<T>) {
        Self::with_capacity(DEFAULT_RETIRE_CAPACITY)
    }

    /// Unconfigured cell whose retirement queue holds `retire_capacity` snapshots.
    ///
    /// When the queue is full the reader keeps its current snapshot until the
    /// control side reclaims (counted in [`CellStats::deferred`]).
    pub fn with_capacity<T: Send>(retire_capacity: usize) -> (ConfigPublisher<T>, ConfigReader<T>) {
        let (retire, retired) = SpscQueue::with_capacity(retire_capacity);
        let shared = Arc::new(Shared {
            pending: AtomicPtr::new(ptr::null_mut()),
            closed: AtomicBool::new(false),
            retired: Mutex::new(retired),
            counters: Counters::default(),
            _owns: PhantomData,
        });

        (
            ConfigPublisher {
                shared: Arc::clone(&shared),
            },
            ConfigReader {
                shared,
                active: None,
                retire,
            },
        )
    }

    /// Cell with `initial` already pending.
    pub fn with_initial<T: Send>(initial: T) -> (ConfigPublisher<T>, ConfigReader<T>) {
        let (publisher, reader) = Self::new();
        publisher.publish(initial);
        (publisher, reader)
    }
}

/// Control-side handle. Cheap to clone; any number of threads may publish.
pub struct ConfigPublisher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ConfigPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send> ConfigPublisher<T> {
    /// Make `snapshot` the next configuration the reader will pick up.
    pub fn publish(&self, snapshot: T) -> Published {
        if self.shared.closed.load(Ordering::Acquire) {
            tracing::warn!(
                snapshot = core::any::type_name::<T>(),
                "publish on a closed configuration cell ignored"
            );
            return Published::Closed;
        }

        let raw = Box::into_raw(Box::new(snapshot));
        let previous = self.shared.pending.swap(raw, Ordering::AcqRel);
        self.shared
            .counters
            .published
            .fetch_add(1, Ordering::Relaxed);

        if previous.is_null() {
            Published::Accepted
        } else {
            // SAFETY: `previous` came from `Box::into_raw` and the swap gave it to us.
            drop(unsafe { Box::from_raw(previous) });
            self.shared.counters.replaced.fetch_add(1, Ordering::Relaxed);
            Published::Replaced
        }
    }
}

impl<T> ConfigPublisher<T> {
    /// Free every retired snapshot. Returns how many were freed.
    pub fn reclaim(&self) -> usize {
        self.shared.reclaim()
    }

    /// A snapshot is waiting to be acquired.
    pub fn has_pending(&self) -> bool {
        self.shared.has_pending()
    }

    /// The reader has been dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of snapshots the reader has activated so far.
    pub fn generation(&self) -> u64 {
        self.shared.counters.activated.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CellStats {
        self.shared.stats()
    }
}

/// Real-time-side handle. Exactly one exists per cell.
pub struct ConfigReader<T> {
    shared: Arc<Shared<T>>,
    active: Option<Box<T>>,
    retire: QueueProducer<Box<T>>,
}

impl<T> ConfigReader<T> {
    /// Current configuration, switching to a newly published one first.
    ///
    /// O(1) when nothing new is pending. Never allocates or frees.
    #[inline]
    pub fn acquire(&mut self) -> Result<&T, NotReady> {
        self.refresh();
        self.active.as_deref().ok_or(NotReady)
    }

    /// As [`acquire`](Self::acquire), with exclusive access to the snapshot.
    #[inline]
    pub fn acquire_mut(&mut self) -> Result<&mut T, NotReady> {
        self.refresh();
        self.active.as_deref_mut().ok_or(NotReady)
    }

    /// Active snapshot without looking at the pending slot.
    pub fn current(&self) -> Option<&T> {
        self.active.as_deref()
    }

    pub fn is_configured(&self) -> bool {
        self.active.is_some() || self.shared.has_pending()
    }

    /// Remove the active snapshot (after picking up a pending one), leaving
    /// the cell unconfigured.
    ///
    /// Needs exclusive access to the reader, so it can only run while the
    /// real-time side is parked.
    pub fn take(&mut self) -> Option<T> {
        self.refresh();
        self.active.take().map(|snapshot| *snapshot)
    }

    /// Free retired snapshots. Control side; see [`ConfigPublisher::reclaim`].
    pub fn reclaim(&self) -> usize {
        self.shared.reclaim()
    }

    /// A new publisher handle for this cell.
    pub fn publisher(&self) -> ConfigPublisher<T> {
        ConfigPublisher {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn generation(&self) -> u64 {
        self.shared.counters.activated.load(Ordering::Acquire)
    }

    #[inline]
    fn refresh(&mut self) {
        if !self.shared.has_pending() {
            return;
        }
        // Retiring needs a free slot; otherwise keep the current snapshot and
        // try again next cycle. Only this side pushes, so the check holds.
        if self.active.is_some() && self.retire.is_full() {
            self.shared
                .counters
                .deferred
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(next) = self.shared.take_pending() else {
            return;
        };
        self.shared
            .counters
            .activated
            .fetch_add(1, Ordering::AcqRel);

        if let Some(previous) = self.active.replace(next) {
            if let Err(previous) = self.retire.push(previous) {
                // Unreachable: vacancy was checked above. Leaking beats freeing here.
                debug_assert!(false, "retirement queue overflow");
                std::mem::forget(previous);
            }
        }
    }
}

impl<T> Drop for ConfigReader<T> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        drop(self.shared.take_pending());
    }
}
