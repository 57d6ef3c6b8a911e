//! Publisher and consumer configuration

use std::time::Duration;

/// Default thread name of the publisher's read loop
pub const DEFAULT_READER_THREAD_NAME: &str = "packet-reader";

/// Default thread name of a drain worker
pub const DEFAULT_DRAIN_THREAD_NAME: &str = "packet-drain";

/// Default subscriber queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Publisher configuration options
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Delay before retrying a read that returned nothing
    pub retry_delay: Duration,

    /// Forward audio units to subscribers (video only otherwise)
    pub forward_audio: bool,

    /// OS thread name of the read loop
    pub thread_name: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(10),
            forward_audio: false,
            thread_name: DEFAULT_READER_THREAD_NAME.to_string(),
        }
    }
}

impl PublisherConfig {
    /// Set the retry delay after an empty read
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Forward audio packets as well as video
    pub fn forward_audio(mut self, enabled: bool) -> Self {
        self.forward_audio = enabled;
        self
    }

    /// Set the read thread name
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Drain worker configuration options
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,

    /// Capacity of the worker's subscriber queue
    pub queue_capacity: usize,

    /// OS thread name of the drain loop
    pub thread_name: String,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            thread_name: DEFAULT_DRAIN_THREAD_NAME.to_string(),
        }
    }
}

impl DrainConfig {
    /// Set the poll interval for an empty queue
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the subscriber queue capacity (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the drain thread name
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
