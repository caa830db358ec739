//! Cross-thread ordering guarantees of the event queue.

use std::sync::{Arc, Mutex};
use std::thread;

use census_core::EventQueue;

// Two producers, a thousand entries each: the worker must run all of them,
// and each producer's subsequence must come out in enqueue order.
fn run_two_producer_ordering(queue: EventQueue) {
    const PER_PRODUCER: usize = 1000;
    let queue = Arc::new(queue);
    let log: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..2)
        .map(|producer| {
            let queue = queue.clone();
            let log = log.clone();
            thread::spawn(move || {
                for sequence in 0..PER_PRODUCER {
                    let log = log.clone();
                    queue.enqueue(Box::new(move || {
                        log.lock().unwrap().push((producer, sequence));
                    }));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    queue.shutdown();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2 * PER_PRODUCER);
    for producer in 0..2 {
        let observed: Vec<usize> = log
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, sequence)| *sequence)
            .collect();
        assert_eq!(observed, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

#[test]
fn per_producer_fifo_on_the_channel_profile() {
    run_two_producer_ordering(EventQueue::simple());
}

#[test]
fn per_producer_fifo_on_the_ring_profile() {
    // Large enough that nothing is dropped under two producers.
    run_two_producer_ordering(EventQueue::with_capacity(4096));
}
