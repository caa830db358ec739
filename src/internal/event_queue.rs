//! Asynchronous fan-in from recording threads to a single worker.
//!
//! Hot application threads hand [`EventEntry`] values to the queue and
//! return immediately; a dedicated consumer thread runs `process` on each
//! entry in FIFO order. Two profiles share the contract:
//!
//! * a channel-backed profile (`EventQueue::simple`), kept as the reference
//!   implementation and for tests, and
//! * a bounded lock-free ring (`EventQueue::with_capacity`) for hot paths,
//!   sized to a power of two and claimed with per-slot sequence numbers.
//!   On overflow the enqueue still succeeds: the oldest pending entry is
//!   discarded and counted in `dropped_count`.
//!
//! Panics inside an entry are caught and counted; they never reach a
//! producer. Shutdown interrupts the worker, which drains everything
//! already queued before exiting.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

const WORKER_THREAD_NAME: &str = "census-event-queue";
const IDLE_PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// A unit of deferred work moved across the queue.
pub trait EventEntry: Send {
    /// Run the entry on the queue's worker thread.
    fn process(self: Box<Self>);
}

impl<F: FnOnce() + Send> EventEntry for F {
    fn process(self: Box<Self>) {
        self()
    }
}

enum ChannelMessage {
    Entry(Box<dyn EventEntry>),
    Shutdown,
}

// Classic bounded MPMC ring: each slot carries a sequence number that
// encodes whether it is free for the producer lap or holds a value for the
// consumer lap.
struct Slot {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<Box<dyn EventEntry>>>,
}

struct Ring {
    buffer: Box<[Slot]>,
    mask: usize,
    enqueue_pos: AtomicUsize,
    dequeue_pos: AtomicUsize,
}

// Slots are only read by the claimant of their sequence number.
unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ring {
            buffer,
            mask: capacity - 1,
            enqueue_pos: AtomicUsize::new(0),
            dequeue_pos: AtomicUsize::new(0),
        }
    }

    fn push(&self, value: Box<dyn EventEntry>) -> Result<(), Box<dyn EventEntry>> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence as isize - pos as isize;
            if diff == 0 {
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return Err(value);
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    fn pop(&self) -> Option<Box<dyn EventEntry>> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence as isize - pos.wrapping_add(1) as isize;
            if diff == 0 {
                match self.dequeue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence
                            .store(pos.wrapping_add(self.mask + 1), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }

    fn is_empty(&self) -> bool {
        let dequeue = self.dequeue_pos.load(Ordering::Acquire);
        let enqueue = self.enqueue_pos.load(Ordering::Acquire);
        enqueue == dequeue
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

struct RingShared {
    ring: Ring,
    shutdown: AtomicBool,
    // Set by the worker just before parking so producers know to unpark it.
    idle: AtomicBool,
}

enum Pipe {
    Channel(crossbeam_channel::Sender<ChannelMessage>),
    Ring {
        shared: Arc<RingShared>,
        worker: thread::Thread,
    },
}

struct Counters {
    dropped: AtomicUsize,
    processed: AtomicUsize,
    failed: AtomicUsize,
}

/// The asynchronous pipe between recorder threads and the worker that runs
/// entry handlers.
pub struct EventQueue {
    pipe: Pipe,
    counters: Arc<Counters>,
    worker_handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
}

impl EventQueue {
    /// The channel-backed profile: unbounded, nothing is ever dropped.
    pub fn simple() -> Self {
        let counters = Arc::new(Counters {
            dropped: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker_counters = counters.clone();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    match message {
                        ChannelMessage::Entry(entry) => run_entry(entry, &worker_counters),
                        ChannelMessage::Shutdown => break,
                    }
                }
                // Drain whatever was enqueued before the shutdown message
                // was observed.
                while let Ok(ChannelMessage::Entry(entry)) = receiver.try_recv() {
                    run_entry(entry, &worker_counters);
                }
            })
            .expect("failed to spawn event queue worker");
        EventQueue {
            pipe: Pipe::Channel(sender),
            counters,
            worker_handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// The lock-free profile: a bounded ring with the given capacity,
    /// rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        let counters = Arc::new(Counters {
            dropped: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });
        let shared = Arc::new(RingShared {
            ring: Ring::with_capacity(capacity),
            shutdown: AtomicBool::new(false),
            idle: AtomicBool::new(false),
        });
        let worker_shared = shared.clone();
        let worker_counters = counters.clone();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || loop {
                while let Some(entry) = worker_shared.ring.pop() {
                    run_entry(entry, &worker_counters);
                }
                if worker_shared.shutdown.load(Ordering::Acquire) {
                    if worker_shared.ring.is_empty() {
                        break;
                    }
                    continue;
                }
                worker_shared.idle.store(true, Ordering::SeqCst);
                if worker_shared.ring.is_empty()
                    && !worker_shared.shutdown.load(Ordering::Acquire)
                {
                    thread::park_timeout(IDLE_PARK_TIMEOUT);
                }
                worker_shared.idle.store(false, Ordering::SeqCst);
            })
            .expect("failed to spawn event queue worker");
        let worker = handle.thread().clone();
        EventQueue {
            pipe: Pipe::Ring { shared, worker },
            counters,
            worker_handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Hand an entry to the worker. Never blocks.
    ///
    /// After shutdown the entry is discarded. On a full ring the oldest
    /// pending entry is discarded instead and counted as dropped.
    pub fn enqueue(&self, entry: Box<dyn EventEntry>) {
        if self.is_shutdown.load(Ordering::Acquire) {
            census_debug!(name: "EventQueue.EnqueueAfterShutdown");
            return;
        }
        match &self.pipe {
            Pipe::Channel(sender) => {
                if sender.send(ChannelMessage::Entry(entry)).is_err() {
                    census_debug!(name: "EventQueue.WorkerGone");
                }
            }
            Pipe::Ring { shared, worker } => {
                let mut entry = entry;
                loop {
                    match shared.ring.push(entry) {
                        Ok(()) => break,
                        Err(rejected) => {
                            // Make room by discarding the oldest pending
                            // entry; the caller's enqueue still succeeds.
                            if shared.ring.pop().is_some() {
                                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            entry = rejected;
                        }
                    }
                }
                if shared.idle.load(Ordering::SeqCst) {
                    worker.unpark();
                }
            }
        }
    }

    /// Entries discarded because the ring was full.
    pub fn dropped_count(&self) -> usize {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Entries whose `process` ran to completion.
    pub fn processed_count(&self) -> usize {
        self.counters.processed.load(Ordering::Relaxed)
    }

    /// Entries whose `process` panicked.
    pub fn failed_count(&self) -> usize {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Signal the worker, wait for it to drain everything already queued
    /// and exit. Idempotent.
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.pipe {
            Pipe::Channel(sender) => {
                let _ = sender.send(ChannelMessage::Shutdown);
            }
            Pipe::Ring { shared, worker } => {
                shared.shutdown.store(true, Ordering::Release);
                worker.unpark();
            }
        }
        let handle = self
            .worker_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                census_error!(name: "EventQueue.WorkerPanicked");
            }
        }
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field(
                "profile",
                match &self.pipe {
                    Pipe::Channel(_) => &"channel",
                    Pipe::Ring { .. } => &"ring",
                },
            )
            .field("dropped", &self.dropped_count())
            .field("processed", &self.processed_count())
            .finish()
    }
}

fn run_entry(entry: Box<dyn EventEntry>, counters: &Counters) {
    match catch_unwind(AssertUnwindSafe(|| entry.process())) {
        Ok(()) => {
            counters.processed.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            census_warn!(name: "EventQueue.EntryPanicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;

    fn wait_until(queue: &EventQueue, processed: usize) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.processed_count() + queue.failed_count() < processed {
            assert!(std::time::Instant::now() < deadline, "worker stalled");
            thread::yield_now();
        }
    }

    fn profiles() -> Vec<EventQueue> {
        vec![EventQueue::simple(), EventQueue::with_capacity(1024)]
    }

    #[test]
    fn entries_run_on_the_worker() {
        for queue in profiles() {
            let value = Arc::new(AtomicUsize::new(0));
            let seen = value.clone();
            queue.enqueue(Box::new(move || {
                seen.store(42, Ordering::SeqCst);
            }));
            wait_until(&queue, 1);
            assert_eq!(value.load(Ordering::SeqCst), 42);
        }
    }

    #[test]
    fn entries_run_in_fifo_order() {
        for queue in profiles() {
            let order = Arc::new(Mutex::new(Vec::new()));
            for i in 0..100 {
                let order = order.clone();
                queue.enqueue(Box::new(move || {
                    order.lock().unwrap().push(i);
                }));
            }
            wait_until(&queue, 100);
            assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn panicking_entries_are_counted_not_propagated() {
        for queue in profiles() {
            queue.enqueue(Box::new(|| panic!("boom")));
            let value = Arc::new(AtomicUsize::new(0));
            let seen = value.clone();
            queue.enqueue(Box::new(move || {
                seen.store(1, Ordering::SeqCst);
            }));
            wait_until(&queue, 2);
            assert_eq!(queue.failed_count(), 1);
            assert_eq!(value.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn shutdown_drains_pending_entries() {
        for queue in profiles() {
            let counter = Arc::new(AtomicU64::new(0));
            for _ in 0..500 {
                let counter = counter.clone();
                queue.enqueue(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }
            queue.shutdown();
            assert_eq!(counter.load(Ordering::SeqCst), 500);
            // Late entries are discarded without blocking.
            queue.enqueue(Box::new(|| unreachable!("enqueued after shutdown")));
            queue.shutdown();
        }
    }

    #[test]
    fn ring_overflow_drops_oldest_and_counts() {
        let queue = EventQueue::with_capacity(4);
        // Stall the worker so the ring fills up.
        let gate = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));
        let (release, running) = (gate.clone(), started.clone());
        queue.enqueue(Box::new(move || {
            running.store(true, Ordering::Release);
            while !release.load(Ordering::Acquire) {
                thread::yield_now();
            }
        }));
        while !started.load(Ordering::Acquire) {
            thread::yield_now();
        }

        let executed = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let executed = executed.clone();
            queue.enqueue(Box::new(move || {
                executed.lock().unwrap().push(i);
            }));
        }
        gate.store(true, Ordering::Release);
        queue.shutdown();

        let executed = executed.lock().unwrap();
        assert!(queue.dropped_count() >= 20 - 4);
        assert_eq!(executed.len(), 20 - queue.dropped_count());
        // Survivors are the newest entries, still in order.
        assert!(executed.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(executed.last(), Some(&19));
    }

    #[test]
    fn per_producer_order_is_preserved_across_threads() {
        let queue = Arc::new(EventQueue::with_capacity(4096));
        let log: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut producers = Vec::new();
        for producer in 0..2 {
            let queue = queue.clone();
            let log = log.clone();
            producers.push(thread::spawn(move || {
                for sequence in 0..1000 {
                    let log = log.clone();
                    queue.enqueue(Box::new(move || {
                        log.lock().unwrap().push((producer, sequence));
                    }));
                }
            }));
        }
        for producer in producers {
            producer.join().unwrap();
        }
        queue.shutdown();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2000);
        for producer in 0..2 {
            let sequence: Vec<usize> = log
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, s)| *s)
                .collect();
            assert_eq!(sequence, (0..1000).collect::<Vec<_>>());
        }
    }
}
