//! Bounded FIFO hand-off between pipeline stages.
//!
//! Producers block while the queue is full instead of dropping items.
//! Every pushed item counts as in flight until the consumer calls
//! [`BoundedQueue::task_done`], which lets a caller wait for the
//! downstream stage to go idle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};

use super::lifecycle::CancelToken;

const IDLE_POLL: Duration = Duration::from_millis(10);

pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    in_flight: Arc<AtomicUsize>,
    capacity: usize,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            in_flight: Arc::clone(&self.in_flight),
            capacity: self.capacity,
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Push an item, blocking while the queue is full.
    #[cfg(test)]
    pub fn push(&self, item: T) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        // Both channel ends live in `self`, so the send cannot disconnect.
        if self.tx.send(item).is_err() {
            self.release();
        }
    }

    /// Push an item, blocking while the queue is full but giving up once
    /// `cancel` fires. Returns `false` when the item was abandoned.
    pub fn push_until(&self, item: T, cancel: &CancelToken, poll: Duration) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let mut item = item;
        loop {
            match self.tx.send_timeout(item, poll) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => {
                    if cancel.is_cancelled() {
                        self.release();
                        return false;
                    }
                    item = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    self.release();
                    return false;
                }
            }
        }
    }

    /// Pop the oldest item, waiting at most `timeout`.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Mark one popped item as fully processed.
    pub fn task_done(&self) {
        self.release();
    }

    /// Wait until every pushed item has been marked done.
    ///
    /// Returns `false` if `cancel` fired first.
    pub fn wait_idle(&self, cancel: &CancelToken) -> bool {
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return true;
            }
            if cancel.is_cancelled() {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(8);
        for i in 0..5 {
            queue.push(i);
        }
        let drained: Vec<i32> = std::iter::from_fn(|| queue.pop(SHORT)).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(1);
        let start = Instant::now();
        assert!(queue.pop(SHORT).is_none());
        assert!(start.elapsed() >= SHORT);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_push_blocks_until_consumer_makes_room() {
        let queue = BoundedQueue::new(1);
        queue.push(1);

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(2))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished(), "producer should block on a full queue");
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop(SHORT), Some(1));
        producer.join().unwrap();
        assert_eq!(queue.pop(SHORT), Some(2));
    }

    #[test]
    fn test_push_until_gives_up_on_cancel() {
        let queue = BoundedQueue::new(1);
        let cancel = CancelToken::new();
        queue.push(1);

        let producer = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            thread::spawn(move || queue.push_until(2, &cancel, SHORT))
        };

        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
        assert!(!producer.join().unwrap());

        assert_eq!(queue.pop(SHORT), Some(1));
        assert_eq!(queue.pop(SHORT), None);
        queue.task_done();
        assert!(queue.wait_idle(&CancelToken::new()));
    }

    #[test]
    fn test_wait_idle_tracks_task_done() {
        let queue = BoundedQueue::new(4);
        queue.push("a");
        queue.push("b");

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                while let Some(_item) = queue.pop(SHORT) {
                    thread::sleep(Duration::from_millis(10));
                    queue.task_done();
                }
            })
        };

        assert!(queue.wait_idle(&CancelToken::new()));
        consumer.join().unwrap();
    }

    #[test]
    fn test_wait_idle_returns_false_when_cancelled() {
        let queue = BoundedQueue::new(4);
        queue.push(1);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(!queue.wait_idle(&cancel));
    }

    #[test]
    fn test_task_done_never_underflows() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(2);
        queue.task_done();
        queue.push(7);
        assert!(!queue.wait_idle(&{
            let c = CancelToken::new();
            c.cancel();
            c
        }));
    }
}
