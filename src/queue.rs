//! Bounded FIFO with producer backpressure
//!
//! A full queue blocks the pushing thread until a slot frees up; nothing is
//! ever dropped or overwritten. Popping never blocks: an empty queue yields
//! `None` and the consumer is expected to back off and poll again.
//!
//! ```text
//!   producer ──push──► [ head ... tail ] ──pop──► consumer
//!        ▲                  (cap N)                 │
//!        └──── not_full.notify_one() ◄──────────────┘
//!              (only when pop frees the Nth slot)
//! ```

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Thread-safe bounded queue
///
/// All operations take the queue's single internal lock; separate queues
/// never contend with each other.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (0 is treated as 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Append an item at the tail, blocking while the queue is full
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        while items.len() >= self.capacity {
            self.not_full.wait(&mut items);
        }
        items.push_back(item);
    }

    /// Remove the head item, or `None` if the queue is empty
    ///
    /// Wakes one blocked producer if the queue was full before the removal.
    pub fn pop(&self) -> Option<T> {
        let mut items = self.items.lock();
        let was_full = items.len() >= self.capacity;
        let item = items.pop_front()?;
        if was_full {
            self.not_full.notify_one();
        }
        Some(item)
    }

    /// Discard all queued items and wake every blocked producer
    pub fn clear(&self) {
        let mut items = self.items.lock();
        items.clear();
        self.not_full.notify_all();
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Maximum number of items
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_coerced() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);

        queue.push(7);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(7));
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4);
        queue.push("a");
        queue.push("b");
        queue.push("c");

        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), Some("c"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let queue: BoundedQueue<Vec<u8>> = BoundedQueue::new(3);
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
        assert!(queue.pop().is_none());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_fill_to_capacity_does_not_block() {
        for capacity in 1..=8 {
            let queue = BoundedQueue::new(capacity);
            for i in 0..capacity {
                queue.push(i);
            }
            assert_eq!(queue.len(), capacity);
        }
    }

    #[test]
    fn test_push_blocks_until_pop() {
        let queue = Arc::new(BoundedQueue::new(2));
        queue.push('A');
        queue.push('B');

        let pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = Arc::clone(&queue);
            let pushed = Arc::clone(&pushed);
            thread::spawn(move || {
                queue.push('C');
                pushed.store(true, Ordering::SeqCst);
            })
        };

        // Producer must still be parked on the full queue
        thread::sleep(Duration::from_millis(50));
        assert!(!pushed.load(Ordering::SeqCst));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop(), Some('A'));
        producer.join().unwrap();
        assert!(pushed.load(Ordering::SeqCst));

        assert_eq!(queue.pop(), Some('B'));
        assert_eq!(queue.pop(), Some('C'));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_clear_wakes_blocked_producer() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };

        thread::sleep(Duration::from_millis(50));
        queue.clear();
        producer.join().unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_many_items_through_small_queue() {
        let queue = Arc::new(BoundedQueue::new(3));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..200u32 {
                    queue.push(i);
                }
            })
        };

        let mut received = Vec::with_capacity(200);
        while received.len() < 200 {
            match queue.pop() {
                Some(i) => received.push(i),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        assert_eq!(received, (0..200).collect::<Vec<_>>());
    }
}
