//! Bounded single-producer/single-consumer queue.
//!
//! Audio thread → queue → one auxiliary thread. The producer never blocks:
//! records that do not fit are dropped and counted.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Sleep between polls in [`QueueConsumer::read_blocking`].
const POLL_INTERVAL: Duration = Duration::from_micros(100);

#[derive(Debug, Default)]
struct QueueCounters {
    written: AtomicU64,
    dropped: AtomicU64,
    read: AtomicU64,
}

/// Constructor for a producer/consumer pair.
pub struct SpscQueue;

impl SpscQueue {
    /// Create a queue holding `capacity` records (at least one).
    pub fn with_capacity<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
        let rb = HeapRb::<T>::new(capacity.max(1));
        let (prod, cons) = rb.split();
        let counters = Arc::new(QueueCounters::default());

        (
            QueueProducer {
                prod,
                counters: Arc::clone(&counters),
            },
            QueueConsumer { cons, counters },
        )
    }
}

/// Producer half. Owned by the real-time side.
pub struct QueueProducer<T> {
    prod: HeapProd<T>,
    counters: Arc<QueueCounters>,
}

impl<T> QueueProducer<T> {
    /// Push one record, handing it back if the queue is full.
    #[inline]
    pub fn push(&mut self, record: T) -> Result<(), T> {
        match self.prod.try_push(record) {
            Ok(()) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(record) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(record)
            }
        }
    }

    /// Write as many whole records as fit. Returns how many were written;
    /// the remainder is counted in [`dropped`](Self::dropped).
    #[inline]
    pub fn write(&mut self, records: &[T]) -> usize
    where
        T: Copy,
    {
        let written = self.prod.push_slice(records);
        self.counters
            .written
            .fetch_add(written as u64, Ordering::Relaxed);
        let dropped = records.len() - written;
        if dropped > 0 {
            self.counters
                .dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        written
    }

    /// Like [`write`](Self::write), for records made of `stride` consecutive
    /// items (interleaved frames). Only whole records are written; a record
    /// that does not fit is dropped entirely and its items counted.
    #[inline]
    pub fn write_frames(&mut self, items: &[T], stride: usize) -> usize
    where
        T: Copy,
    {
        let stride = stride.max(1);
        let whole = items.len() / stride * stride;
        let fits = (self.prod.vacant_len() / stride * stride).min(whole);
        let written = self.prod.push_slice(&items[..fits]);
        self.counters
            .written
            .fetch_add(written as u64, Ordering::Relaxed);
        let dropped = items.len() - written;
        if dropped > 0 {
            self.counters
                .dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        written
    }

    #[inline]
    pub fn available_space(&self) -> usize {
        self.prod.vacant_len()
    }

    #[inline]
    pub fn fill_count(&self) -> usize {
        self.prod.occupied_len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.prod.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.prod.capacity().get()
    }

    /// Records rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }
}

/// Consumer half. Owned by the draining thread.
pub struct QueueConsumer<T> {
    cons: HeapCons<T>,
    counters: Arc<QueueCounters>,
}

impl<T> QueueConsumer<T> {
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let record = self.cons.try_pop();
        if record.is_some() {
            self.counters.read.fetch_add(1, Ordering::Relaxed);
        }
        record
    }

    /// Remove up to `max_count` records (bounded by `buffer.len()`) in FIFO order.
    pub fn read(&mut self, buffer: &mut [T], max_count: usize) -> usize
    where
        T: Copy,
    {
        let len = max_count.min(buffer.len());
        let read = self.cons.pop_slice(&mut buffer[..len]);
        self.counters.read.fetch_add(read as u64, Ordering::Relaxed);
        read
    }

    /// Like [`read`](Self::read), but sleep-polls until at least one record
    /// arrives or `timeout` elapses.
    pub fn read_blocking(&mut self, buffer: &mut [T], max_count: usize, timeout: Duration) -> usize
    where
        T: Copy,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let read = self.read(buffer, max_count);
            if read > 0 || Instant::now() >= deadline {
                return read;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Discard everything currently queued. Returns the number discarded.
    pub fn clear(&mut self) -> usize {
        let count = self.cons.occupied_len();
        for _ in 0..count {
            let _ = self.cons.try_pop();
        }
        self.counters.read.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    #[inline]
    pub fn fill_count(&self) -> usize {
        self.cons.occupied_len()
    }

    #[inline]
    pub fn available_space(&self) -> usize {
        self.cons.vacant_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cons.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cons.capacity().get()
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn read_total(&self) -> u64 {
        self.counters.read.load(Ordering::Relaxed)
    }
}
