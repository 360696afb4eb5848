//! Cross-thread submission of work that must run on the frame thread.
//!
//! Producers on any thread call [`TaskQueue::submit`]; the frame driver is the
//! only consumer and drains a bounded number of tasks at the top of each frame.
//! Tasks still queued when the driver shuts down are dropped and their handles
//! are never signaled, so a thread blocked in [`TaskHandle::wait`] at that point
//! stays blocked.

use crate::registry::Registry;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

type Task = Box<dyn FnOnce(&mut Registry) + Send + 'static>;

struct QueuedTask {
    completion: Arc<Completion>,
    run: Task,
}

#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    fn finish(&self) {
        let mut done = lock_ignoring_poison(&self.done);
        *done = true;
        self.signal.notify_all();
    }
}

/// Completion handle returned by [`TaskQueue::submit`].
///
/// Observing `is_done() == true` guarantees the task's side effects are
/// visible: the flag flips only after the callable has returned.
#[derive(Clone)]
pub struct TaskHandle {
    completion: Arc<Completion>,
}

impl TaskHandle {
    pub fn is_done(&self) -> bool {
        *lock_ignoring_poison(&self.completion.done)
    }

    /// Blocks until the task has run. Never call this from the frame thread.
    pub fn wait(&self) {
        let mut done = lock_ignoring_poison(&self.completion.done);
        while !*done {
            done = self.completion.signal.wait(done).unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Returns `true` if the task finished within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = lock_ignoring_poison(&self.completion.done);
        let (done, _) = self
            .completion
            .signal
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *done
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("done", &self.is_done()).finish()
    }
}

/// FIFO of deferred callables. Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<VecDeque<QueuedTask>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `task`. Holds the lock only for the push.
    pub fn submit<F>(&self, task: F) -> TaskHandle
    where
        F: FnOnce(&mut Registry) + Send + 'static,
    {
        let completion = Arc::new(Completion::default());
        let queued = QueuedTask { completion: completion.clone(), run: Box::new(task) };
        lock_ignoring_poison(&self.inner).push_back(queued);
        TaskHandle { completion }
    }

    /// Pops and runs up to `max_items` tasks in submission order on the calling
    /// thread. Returns how many ran.
    pub fn drain_and_run(&self, registry: &mut Registry, max_items: usize) -> usize {
        let mut ran = 0;
        while ran < max_items {
            // The lock is released before the task runs so a task may submit more work.
            let Some(item) = lock_ignoring_poison(&self.inner).pop_front() else {
                break;
            };
            (item.run)(registry);
            item.completion.finish();
            ran += 1;
        }
        ran
    }

    pub fn len(&self) -> usize {
        lock_ignoring_poison(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.len()).finish()
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn drain_on_empty_queue_is_noop() {
        let queue = TaskQueue::new();
        let mut registry = Registry::headless();
        assert_eq!(queue.drain_and_run(&mut registry, 8), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_respects_max_items_and_fifo_order() {
        let queue = TaskQueue::new();
        let mut registry = Registry::headless();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let log = log.clone();
                queue.submit(move |_| log.lock().unwrap().push(i))
            })
            .collect();

        assert_eq!(queue.drain_and_run(&mut registry, 3), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(handles[2].is_done());
        assert!(!handles[3].is_done(), "bounded drain leaves later tasks pending");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.drain_and_run(&mut registry, 10), 2);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(handles.iter().all(TaskHandle::is_done));
    }

    #[test]
    fn task_submitted_from_a_task_runs_in_a_later_slot() {
        let queue = TaskQueue::new();
        let mut registry = Registry::headless();
        let counter = Arc::new(AtomicUsize::new(0));
        let inner_queue = queue.clone();
        let inner_counter = counter.clone();
        queue.submit(move |_| {
            let counter = inner_counter.clone();
            inner_queue.submit(move |_| {
                counter.fetch_add(10, Ordering::SeqCst);
            });
            inner_counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(queue.drain_and_run(&mut registry, 1), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(queue.drain_and_run(&mut registry, 1), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn wait_timeout_reports_pending_task() {
        let queue = TaskQueue::new();
        let handle = queue.submit(|_| {});
        assert!(!handle.wait_timeout(Duration::from_millis(5)));
    }
}
