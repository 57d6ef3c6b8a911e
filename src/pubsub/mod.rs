//! Publisher/subscriber fan-out
//!
//! One [`Publisher`] reads packets from a source on its own thread and hands
//! them to any number of [`Subscriber`]s. Each subscriber has a bounded queue
//! drained at its own pace, typically by a [`DrainWorker`].
//!
//! # Ownership
//!
//! A packet has one owner at a time. With a single subscriber the original is
//! handed over; with several, every subscriber except the last receives a
//! deep copy and the last one receives the original.

pub mod config;
pub mod consumer;
pub mod publisher;
pub mod subscriber;

pub use config::{DrainConfig, PublisherConfig};
pub use consumer::{DecodeHandler, DrainWorker, PacketHandler};
pub use publisher::Publisher;
pub use subscriber::Subscriber;
