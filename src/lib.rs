//! Media packet fan-out
//!
//! One producer reads media packets from a source and distributes them to any
//! number of independent consumers, each draining its own bounded queue at
//! its own pace.
//!
//! ```text
//!   PacketSource ──► Publisher (read thread) ──┬──► Subscriber ──► DrainWorker
//!                                              ├──► Subscriber ──► DrainWorker
//!                                              └──► Subscriber ──► ...
//! ```
//!
//! - [`queue`]: bounded FIFO whose producer blocks while it is full
//! - [`media`]: the [`Packet`] entity and H.264 frame classification
//! - [`task`]: cancellable background threads
//! - [`pubsub`]: publisher registry, fan-out and drain loops
//! - [`source`]: source and decoder collaborator traits
//!
//! # Example
//!
//! ```no_run
//! use media_fanout::{DrainWorker, DrainConfig, MemorySource, Publisher, StreamInfo};
//!
//! let publisher = Publisher::new();
//! let mut worker = DrainWorker::new("Printer", DrainConfig::default());
//! worker.start(|packet: media_fanout::Packet| -> media_fanout::Result<()> {
//!     println!("{:?}", packet);
//!     Ok(())
//! });
//! publisher.subscribe(worker.subscriber());
//!
//! let (source, _feeder) = MemorySource::new();
//! let source = source.with_video(StreamInfo::video(0, "h264", 1280, 720));
//! publisher.start(source, "mem://demo")?;
//! # Ok::<(), media_fanout::Error>(())
//! ```

pub mod error;
pub mod media;
pub mod pubsub;
pub mod queue;
pub mod source;
pub mod stats;
pub mod task;

pub use error::{DecodeError, Error, Result, SourceError};
pub use media::{MediaKind, NalUnitType, Packet, PacketFlags};
pub use pubsub::{
    DecodeHandler, DrainConfig, DrainWorker, PacketHandler, Publisher, PublisherConfig, Subscriber,
};
pub use queue::BoundedQueue;
pub use source::{MemoryFeeder, MemorySource, PacketSource, RawUnit, ReadOutcome, StreamInfo};
pub use stats::PublisherStatsSnapshot;
pub use task::{BackgroundTask, CancelToken};
