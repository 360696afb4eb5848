use meshview::task_queue::TaskQueue;
use meshview::Registry;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_producers_keep_their_own_order() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 50;

    let queue = TaskQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = queue.clone();
            let log = log.clone();
            thread::spawn(move || {
                (0..PER_PRODUCER)
                    .map(|seq| {
                        let log = log.clone();
                        queue.submit(move |_| log.lock().unwrap().push((producer, seq)))
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let handles: Vec<_> = producers.into_iter().flat_map(|p| p.join().expect("producer thread")).collect();

    let mut registry = Registry::headless();
    let ran = queue.drain_and_run(&mut registry, usize::MAX);
    assert_eq!(ran, PRODUCERS * PER_PRODUCER);
    assert!(queue.is_empty());
    assert!(handles.iter().all(|handle| handle.is_done()));

    let log = log.lock().unwrap();
    assert_eq!(log.len(), PRODUCERS * PER_PRODUCER);
    for producer in 0..PRODUCERS {
        let seqs: Vec<usize> = log.iter().filter(|(p, _)| *p == producer).map(|(_, seq)| *seq).collect();
        assert_eq!(seqs, (0..PER_PRODUCER).collect::<Vec<_>>(), "producer {producer} reordered");
    }
}

#[test]
fn counter_set_from_another_thread_is_visible_after_drain() {
    let queue = TaskQueue::new();
    let counter = Arc::new(AtomicU32::new(0));
    let submitter = {
        let queue = queue.clone();
        let counter = counter.clone();
        thread::spawn(move || queue.submit(move |_| counter.store(42, Ordering::SeqCst)))
    };
    let handle = submitter.join().expect("submitter thread");
    assert!(!handle.is_done());

    let mut registry = Registry::headless();
    assert_eq!(queue.drain_and_run(&mut registry, 10), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 42);
    assert!(handle.is_done());
}

#[test]
fn waiting_thread_observes_the_side_effects() {
    let queue = TaskQueue::new();
    let value = Arc::new(AtomicU32::new(0));
    let handle = {
        let value = value.clone();
        queue.submit(move |registry| {
            registry.create_entity();
            value.store(7, Ordering::SeqCst);
        })
    };
    let waiter = {
        let value = value.clone();
        thread::spawn(move || {
            handle.wait();
            value.load(Ordering::SeqCst)
        })
    };
    thread::sleep(Duration::from_millis(10));
    let mut registry = Registry::headless();
    queue.drain_and_run(&mut registry, 1);
    assert_eq!(waiter.join().expect("waiter thread"), 7);
}
