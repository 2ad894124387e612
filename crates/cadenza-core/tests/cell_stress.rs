//! Concurrent publish/acquire/reclaim on one configuration cell.

use cadenza_core::ConfigCell;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const SNAPSHOTS: usize = 20_000;

struct Snapshot {
    id: usize,
    payload: Vec<u64>,
    freed: Arc<Vec<AtomicBool>>,
    drops: Arc<AtomicUsize>,
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        assert!(
            !self.freed[self.id].swap(true, Ordering::SeqCst),
            "snapshot {} freed twice",
            self.id
        );
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn acquire_never_returns_freed_snapshot() {
    let freed: Arc<Vec<AtomicBool>> =
        Arc::new((0..SNAPSHOTS).map(|_| AtomicBool::new(false)).collect());
    let drops = Arc::new(AtomicUsize::new(0));
    let (publisher, mut reader) = ConfigCell::with_capacity::<Snapshot>(8);
    let done = Arc::new(AtomicBool::new(false));

    let audio = {
        let freed = Arc::clone(&freed);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut last_id = 0;
            let mut observed = 0usize;
            loop {
                let finished = done.load(Ordering::SeqCst);
                if let Ok(snapshot) = reader.acquire() {
                    assert!(!freed[snapshot.id].load(Ordering::SeqCst));
                    assert_eq!(snapshot.payload[0], snapshot.id as u64);
                    assert!(snapshot.id >= last_id, "snapshots went backwards");
                    last_id = snapshot.id;
                    observed += 1;
                }
                if finished {
                    break;
                }
            }
            (reader, last_id, observed)
        })
    };

    let reclaimer = {
        let publisher = publisher.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut reclaimed = 0;
            while !done.load(Ordering::SeqCst) {
                reclaimed += publisher.reclaim();
                thread::yield_now();
            }
            reclaimed
        })
    };

    let mut rng = rand::thread_rng();
    for id in 0..SNAPSHOTS {
        publisher.publish(Snapshot {
            id,
            payload: vec![id as u64; rng.gen_range(1..16)],
            freed: Arc::clone(&freed),
            drops: Arc::clone(&drops),
        });
        if rng.gen_ratio(1, 64) {
            thread::yield_now();
        }
    }
    done.store(true, Ordering::SeqCst);

    let (mut reader, last_id, observed) = audio.join().unwrap();
    reclaimer.join().unwrap();
    assert!(observed > 0);
    assert!(last_id < SNAPSHOTS);

    // With the retirement queue emptied, the next acquire sees the last publish.
    publisher.reclaim();
    assert_eq!(reader.acquire().unwrap().id, SNAPSHOTS - 1);

    publisher.reclaim();
    let stats = publisher.stats();
    assert_eq!(stats.retired, 0);
    assert_eq!(stats.published, SNAPSHOTS as u64);
    assert_eq!(stats.replaced + stats.activated, SNAPSHOTS as u64);

    drop(reader);
    drop(publisher);
    assert_eq!(drops.load(Ordering::SeqCst), SNAPSHOTS);
}

#[test]
fn back_to_back_publishes_collapse() {
    let drops = Arc::new(AtomicUsize::new(0));
    let freed: Arc<Vec<AtomicBool>> = Arc::new((0..2).map(|_| AtomicBool::new(false)).collect());
    let (publisher, mut reader) = ConfigCell::new::<Snapshot>();

    for id in 0..2 {
        publisher.publish(Snapshot {
            id,
            payload: vec![id as u64],
            freed: Arc::clone(&freed),
            drops: Arc::clone(&drops),
        });
    }

    assert!(freed[0].load(Ordering::SeqCst));
    assert_eq!(reader.acquire().unwrap().id, 1);
    assert_eq!(publisher.stats().activated, 1);
}
