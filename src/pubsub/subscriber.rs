//! Packet subscriber
//!
//! A subscriber owns one bounded queue. The publisher's read thread pushes
//! into it (blocking when full) and the subscriber's own consumer thread pops
//! from it. Terminating a subscriber makes further enqueues no-ops and lets
//! the publisher sweep it out of its registry on the next pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::media::Packet;
use crate::queue::BoundedQueue;

/// Length of the random suffix appended to the subscriber name
pub const IDENTITY_SUFFIX_LEN: usize = 10;

/// Consumer endpoint registered with a publisher
pub struct Subscriber {
    name: String,
    identity: OnceLock<String>,
    active: AtomicBool,
    queue: BoundedQueue<Packet>,
}

impl Subscriber {
    /// Create a subscriber with a queue of `capacity` packets (minimum 1)
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            identity: OnceLock::new(),
            active: AtomicBool::new(true),
            queue: BoundedQueue::new(capacity),
        }
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identity: the name followed by a random alphanumeric suffix
    ///
    /// Generated on first call and memoized.
    pub fn identity(&self) -> &str {
        self.identity.get_or_init(|| {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(IDENTITY_SUFFIX_LEN)
                .map(char::from)
                .collect();
            format!("{}{}", self.name, suffix)
        })
    }

    /// Push a packet into the queue, blocking while it is full
    ///
    /// Dropped silently once the subscriber is terminated.
    pub fn enqueue(&self, packet: Packet) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        self.queue.push(packet);
    }

    /// Take the oldest queued packet without blocking
    pub fn dequeue(&self) -> Option<Packet> {
        self.queue.pop()
    }

    /// Mark the subscriber for removal; idempotent
    ///
    /// Queued packets stay in place until the owner clears them.
    pub fn terminate(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::debug!(subscriber = %self.identity(), "Subscriber terminated");
        }
    }

    pub fn is_terminated(&self) -> bool {
        !self.active.load(Ordering::Acquire)
    }

    /// Discard queued packets, releasing any blocked producer
    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("identity", &self.identity())
            .field("terminated", &self.is_terminated())
            .field("queued", &self.queue_len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
