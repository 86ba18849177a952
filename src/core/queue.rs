use bytes::BytesMut;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::core::model::{Chunk, Job, JobMessage};

/// FIFO shared between threads. Consumers may block (`pop`) or not (`try_pop`).
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    // Every critical section is a single deque call, so a poisoned lock still
    // guards a consistent deque.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.ready.notify_one();
    }

    /// Put an item ahead of everything already queued.
    pub fn push_front(&self, item: T) {
        self.lock().push_front(item);
        self.ready.notify_one();
    }

    /// Block until an item is available.
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self.ready.wait(items).unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The four channels between the coordinating thread and the workers.
#[derive(Debug, Default)]
pub struct Queues {
    /// coordinator -> worker
    pub jobs: WorkQueue<JobMessage>,
    /// worker -> coordinator, chunk by chunk
    pub progress: WorkQueue<Chunk>,
    /// worker -> coordinator, terminal jobs
    pub results: WorkQueue<Job>,
    /// coordinator -> worker, delivered buffers
    pub recycle: WorkQueue<BytesMut>,
}

impl Queues {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let q = WorkQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn push_front_jumps_the_line() {
        let q = WorkQueue::new();
        q.push("b");
        q.push("c");
        q.push_front("a");
        assert_eq!(q.drain(), vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn pop_blocks_until_push() {
        let q = Arc::new(WorkQueue::new());
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.push(42u32);
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn try_pop_on_empty_returns_immediately() {
        let q: WorkQueue<u8> = WorkQueue::new();
        assert_eq!(q.try_pop(), None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn single_producer_order_survives_threads() {
        let q = Arc::new(WorkQueue::new());
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..1000u32 {
                    q.push(i);
                }
            })
        };
        let mut seen = Vec::with_capacity(1000);
        while seen.len() < 1000 {
            seen.push(q.pop());
        }
        producer.join().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
