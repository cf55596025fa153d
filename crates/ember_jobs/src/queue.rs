//! Ready queue shared by the workers of one thread type.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::job::Job;

struct QueueState {
    jobs: VecDeque<Arc<Job>>,
    closed: bool,
}

/// FIFO of jobs whose dependencies are all done.
pub(crate) struct ReadyQueue {
    state: Mutex<QueueState>,
    /// Signalled on push and on close.
    available: Condvar,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    pub(crate) fn push(&self, job: Arc<Job>) {
        let mut state = self.state.lock();
        state.jobs.push_back(job);
        self.available.notify_one();
    }

    /// Pops without waiting.
    pub(crate) fn try_pop(&self) -> Option<Arc<Job>> {
        self.state.lock().jobs.pop_front()
    }

    /// Waits for a job. Returns `None` once the queue is closed and empty.
    pub(crate) fn pop_blocking(&self) -> Option<Arc<Job>> {
        let mut state = self.state.lock();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Wakes every waiting worker and lets them exit once the queue is empty.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_and_close() {
        let queue = ReadyQueue::new();
        let first = Job::new("first", || {});
        let second = Job::new("second", || {});
        queue.push(Arc::clone(&first));
        queue.push(Arc::clone(&second));
        queue.close();

        // Closing does not drop queued work.
        assert_eq!(queue.pop_blocking().map(|job| job.id()), Some(first.id()));
        assert_eq!(queue.pop_blocking().map(|job| job.id()), Some(second.id()));
        assert!(queue.pop_blocking().is_none());
    }

    #[test]
    fn test_close_wakes_waiters() {
        let queue = Arc::new(ReadyQueue::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop_blocking().is_none())
            })
            .collect();

        queue.close();
        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }
}
