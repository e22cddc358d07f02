//! Marshaling work onto the host's safe-mutation thread.
//!
//! The host is not internally thread-safe for structural mutation, so
//! anything that patches code or touches host-owned structures must run
//! on its frame tick. Background work enqueues a closure here; the frame
//! loop drains the queue each tick.

use std::sync::Mutex;

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct FrameQueue {
    jobs: Mutex<Vec<Job>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a closure from any thread. It runs on the next drain, not
    /// now.
    pub fn push(&self, job: impl FnOnce() + Send + 'static) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push(Box::new(job));
        }
    }

    /// Run every queued closure in FIFO order. Call only from the host's
    /// designated safe-mutation thread. Returns the number of jobs run.
    pub fn drain(&self) -> usize {
        let jobs = match self.jobs.lock() {
            Ok(mut jobs) => std::mem::take(&mut *jobs),
            Err(_) => return 0,
        };

        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run_on_drain_not_push() {
        let queue = FrameQueue::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            queue.push(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.drain(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..4 {
            let order = Arc::clone(&order);
            queue.push(move || order.lock().unwrap().push(i));
        }

        queue.drain();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_push_from_other_thread() {
        let queue = Arc::new(FrameQueue::new());
        let count = Arc::new(AtomicUsize::new(0));

        let handle = {
            let queue = Arc::clone(&queue);
            let count = Arc::clone(&count);
            std::thread::spawn(move || {
                queue.push(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                });
            })
        };
        handle.join().unwrap();

        assert_eq!(queue.drain(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
