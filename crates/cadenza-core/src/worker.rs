//! Drain worker: the consumer thread behind an SPSC queue.
//!
//! The worker polls its [`QueueConsumer`] in chunks, hands records to a
//! [`RecordSink`] and flushes the sink once enough records have accumulated.
//! Stopping sets an atomic flag and joins; the worker drains whatever is
//! still queued and flushes before it exits.

use crate::spsc::QueueConsumer;
use crate::{Error, Result};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Destination of drained records. Runs on the worker thread.
pub trait RecordSink<T>: Send {
    fn write(&mut self, records: &[T]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Copy + Send> RecordSink<T> for Vec<T> {
    fn write(&mut self, records: &[T]) -> io::Result<()> {
        self.extend_from_slice(records);
        Ok(())
    }
}

/// Drain worker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConfig {
    /// Records read from the queue per pass.
    pub chunk_len: usize,
    /// Records written since the last flush that trigger a flush.
    pub flush_threshold: usize,
    /// Wait when the queue is empty. `stop` cuts the wait short.
    pub poll_interval: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            chunk_len: 4096,
            flush_threshold: 44100,
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// What a worker did over its lifetime.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub records: u64,
    pub flushes: u64,
    /// Records the producer could not enqueue because the queue was full.
    pub dropped: u64,
    /// First sink error. Records arriving after it are discarded.
    pub error: Option<io::Error>,
}

/// Named thread draining one queue into one sink.
pub struct DrainWorker<T, S> {
    shutdown: Arc<AtomicBool>,
    drained: Arc<AtomicU64>,
    handle: Option<JoinHandle<(S, DrainReport)>>,
    name: String,
    _records: std::marker::PhantomData<fn() -> T>,
}

impl<T, S> DrainWorker<T, S>
where
    T: Copy + Default + Send + 'static,
    S: RecordSink<T> + 'static,
{
    pub fn spawn(
        name: impl Into<String>,
        consumer: QueueConsumer<T>,
        sink: S,
        config: DrainConfig,
    ) -> Result<Self> {
        let name = name.into();
        let shutdown = Arc::new(AtomicBool::new(false));
        let drained = Arc::new(AtomicU64::new(0));

        let handle = {
            let shutdown = Arc::clone(&shutdown);
            let drained = Arc::clone(&drained);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || drain_loop(consumer, sink, config, &shutdown, &drained))
                .map_err(Error::Spawn)?
        };
        tracing::debug!(worker = %name, ?config, "drain worker started");

        Ok(Self {
            shutdown,
            drained,
            handle: Some(handle),
            name,
            _records: std::marker::PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records handed to the sink so far.
    pub fn drained(&self) -> u64 {
        self.drained.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop, drain what is left and return the sink.
    pub fn stop(mut self) -> Result<(S, DrainReport)> {
        self.shutdown.store(true, Ordering::SeqCst);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::Driver(format!("{} already stopped", self.name)))?;
        handle.thread().unpark();
        let (sink, report) = handle
            .join()
            .map_err(|_| Error::Driver(format!("{} panicked", self.name)))?;
        tracing::debug!(
            worker = %self.name,
            records = report.records,
            flushes = report.flushes,
            "drain worker stopped"
        );
        Ok((sink, report))
    }
}

impl<T, S> Drop for DrainWorker<T, S> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

fn drain_loop<T, S>(
    mut consumer: QueueConsumer<T>,
    mut sink: S,
    config: DrainConfig,
    shutdown: &AtomicBool,
    drained: &AtomicU64,
) -> (S, DrainReport)
where
    T: Copy + Default,
    S: RecordSink<T>,
{
    let mut chunk = vec![T::default(); config.chunk_len.max(1)];
    let mut report = DrainReport::default();
    let mut unflushed = 0usize;

    loop {
        // Read the flag before draining so records pushed before the stop
        // request are still picked up by this pass.
        let stopping = shutdown.load(Ordering::SeqCst);

        let mut moved = 0;
        loop {
            let read = consumer.read(&mut chunk, config.chunk_len.max(1));
            if read == 0 {
                break;
            }
            moved += read;
            if report.error.is_none() {
                if let Err(err) = sink.write(&chunk[..read]) {
                    tracing::warn!(%err, "drain sink write failed");
                    report.error = Some(err);
                    continue;
                }
                report.records += read as u64;
                drained.fetch_add(read as u64, Ordering::Relaxed);
                unflushed += read;
            }
        }

        if unflushed > 0 && (stopping || unflushed >= config.flush_threshold) {
            match sink.flush() {
                Ok(()) => report.flushes += 1,
                Err(err) => {
                    tracing::warn!(%err, "drain sink flush failed");
                    report.error.get_or_insert(err);
                }
            }
            unflushed = 0;
        }

        if stopping {
            break;
        }
        if moved == 0 {
            thread::park_timeout(config.poll_interval);
        }
    }

    report.dropped = consumer.dropped();
    (sink, report)
}
