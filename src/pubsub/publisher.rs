//! Packet publisher
//!
//! The publisher opens a [`PacketSource`], runs a read loop on a background
//! thread and fans every packet out to its registered subscribers.
//!
//! # Fan-out
//!
//! ```text
//!   read thread                      registry (one lock)
//!   ───────────                      ───────────────────
//!   source.read_next_unit()
//!        │ Unit
//!        ▼
//!   Packet::from_unit(++id)  ──►  sweep terminated entries
//!                                      │
//!                     ┌────────────────┼──────────────────┐
//!                     ▼                ▼                  ▼
//!               0 subscribers    1 subscriber       K subscribers
//!               discard          original           K-1 clones + original
//! ```
//!
//! Subscriber queues are bounded; a full queue blocks the read thread (and
//! with it the registry lock) until its consumer catches up.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::config::PublisherConfig;
use super::subscriber::Subscriber;
use crate::error::{Error, Result};
use crate::media::{MediaKind, Packet};
use crate::source::{PacketSource, ReadOutcome, StreamInfo};
use crate::stats::{PublisherStats, PublisherStatsSnapshot};
use crate::task::{BackgroundTask, CancelToken};

/// Polling interval of [`Publisher::wait_for_exit`]
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State shared between the publisher handle and its read thread
struct Shared {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    /// Read loop is executing
    started: AtomicBool,
    /// Read thread spawned and not yet finished
    running: AtomicBool,
    stop_requested: AtomicBool,
    last_packet_id: AtomicI64,
    cancel: Mutex<CancelToken>,
    video: RwLock<Option<StreamInfo>>,
    audio: RwLock<Option<StreamInfo>>,
    uri: RwLock<Option<String>>,
    stats: PublisherStats,
}

impl Shared {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            last_packet_id: AtomicI64::new(0),
            cancel: Mutex::new(CancelToken::new()),
            video: RwLock::new(None),
            audio: RwLock::new(None),
            uri: RwLock::new(None),
            stats: PublisherStats::new(),
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn publish(&self, packet: Packet) -> usize {
        if self.stop_requested() || !self.started.load(Ordering::SeqCst) {
            return 0;
        }

        let mut subscribers = self.subscribers.lock();
        sweep_terminated(&mut subscribers);

        let size = packet.size();
        let keyframe = packet.is_keyframe();

        let delivered = match subscribers.len() {
            0 => {
                self.stats.record_discarded();
                tracing::trace!(packet_id = packet.id(), "No subscribers, packet discarded");
                return 0;
            }
            1 => {
                subscribers[0].enqueue(packet);
                1
            }
            count => {
                let mut delivered = 0;
                for subscriber in &subscribers[..count - 1] {
                    if self.stop_requested() {
                        break;
                    }
                    subscriber.enqueue(packet.clone());
                    delivered += 1;
                }
                if !self.stop_requested() {
                    subscribers[count - 1].enqueue(packet);
                    delivered += 1;
                }
                delivered
            }
        };

        if delivered > 0 {
            self.stats.record_published(size, keyframe);
        }
        delivered
    }

    fn read_loop(
        &self,
        source: &mut dyn PacketSource,
        token: &CancelToken,
        config: &PublisherConfig,
    ) -> Result<()> {
        let video_index = self.video.read().as_ref().map(|s| s.index);
        let audio_index = self.audio.read().as_ref().map(|s| s.index);

        self.started.store(true, Ordering::SeqCst);
        tracing::info!(uri = ?self.uri.read().as_deref(), "Reading packets started");

        let outcome = loop {
            if token.is_cancelled() || self.stop_requested() {
                break Ok(());
            }

            match source.read_next_unit() {
                ReadOutcome::Unit(unit) => {
                    self.stats.record_read();

                    let kind = if Some(unit.stream_index) == video_index {
                        MediaKind::Video
                    } else if config.forward_audio && Some(unit.stream_index) == audio_index {
                        MediaKind::Audio
                    } else {
                        continue;
                    };

                    let id = self.last_packet_id.fetch_add(1, Ordering::SeqCst) + 1;
                    match Packet::from_unit(id, &unit, kind) {
                        Some(packet) => {
                            self.publish(packet);
                        }
                        None => {
                            tracing::trace!(
                                stream = unit.stream_index,
                                len = unit.data.len(),
                                "Skipping short unit"
                            );
                        }
                    }
                }
                ReadOutcome::Pending => {
                    if token.sleep(config.retry_delay) {
                        break Ok(());
                    }
                }
                ReadOutcome::Eof => {
                    tracing::info!("End of stream");
                    break Ok(());
                }
                ReadOutcome::Failed(e) => {
                    tracing::error!(error = %e, "Source read failed");
                    break Err(e.into());
                }
            }
        };

        self.started.store(false, Ordering::SeqCst);
        tracing::info!(
            last_packet_id = self.last_packet_id.load(Ordering::SeqCst),
            "Reading packets stopped"
        );
        outcome
    }
}

fn sweep_terminated(subscribers: &mut Vec<Arc<Subscriber>>) {
    subscribers.retain(|s| {
        let keep = !s.is_terminated();
        if !keep {
            tracing::debug!(subscriber = %s.identity(), "Removing terminated subscriber");
        }
        keep
    });
}

/// Single-producer, multi-consumer packet distributor
pub struct Publisher {
    shared: Arc<Shared>,
    task: Mutex<BackgroundTask>,
    config: PublisherConfig,
}

impl Publisher {
    /// Create a publisher with default configuration
    pub fn new() -> Self {
        Self::with_config(PublisherConfig::default())
    }

    /// Create a publisher with custom configuration
    pub fn with_config(config: PublisherConfig) -> Self {
        let task = BackgroundTask::new(config.thread_name.clone());
        Self {
            shared: Arc::new(Shared::new()),
            task: Mutex::new(task),
            config,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Open `source` at `uri` and start the read loop
    ///
    /// Fails if the source cannot be opened or the read thread cannot be
    /// spawned. Starting clears an earlier stop request.
    ///
    /// Calling this while a read loop is still running, including a stopped
    /// one still blocked on a full subscriber queue, is logged and returns
    /// `Ok(())` without touching `source`. `Ok` therefore does not mean a
    /// new run is live; check [`is_running`](Self::is_running) and
    /// [`is_stop_requested`](Self::is_stop_requested) when that matters.
    ///
    /// Holds the task lock for the whole call, so a concurrent
    /// [`join`](Self::join) waits until the new run is spawned.
    pub fn start<S>(&self, mut source: S, uri: &str) -> Result<()>
    where
        S: PacketSource + 'static,
    {
        let mut task = self.task.lock();

        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if self.shared.stop_requested() {
                tracing::error!(uri = %uri, "Publisher still stopping, start ignored");
            } else {
                tracing::warn!(uri = %uri, "Publisher already running, start ignored");
            }
            return Ok(());
        }

        // A finishing previous run still holds the task briefly
        task.join();

        if let Err(e) = source.open(uri) {
            tracing::error!(uri = %uri, error = %e, "Failed to open source");
            self.shared.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let video = source.video_stream();
        let audio = source.audio_stream();
        if let Some(info) = &video {
            tracing::info!(index = info.index, codec = %info.codec, "Found video stream");
        }
        if let Some(info) = &audio {
            tracing::info!(index = info.index, codec = %info.codec, "Found audio stream");
        }
        *self.shared.video.write() = video;
        *self.shared.audio.write() = audio;
        *self.shared.uri.write() = Some(uri.to_string());
        self.shared.stop_requested.store(false, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let started = task.start(move |token| {
            let result = shared.read_loop(&mut source, &token, &config);
            shared.running.store(false, Ordering::SeqCst);
            result
        });

        if !started {
            self.shared.running.store(false, Ordering::SeqCst);
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "failed to spawn packet read thread",
            )));
        }
        *self.shared.cancel.lock() = task.token();
        Ok(())
    }

    /// Request the read loop to stop
    ///
    /// Subscribers blocked behind a full queue are not released; that is the
    /// consumer side's job.
    pub fn stop(&self) {
        if !self.shared.stop_requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Publisher stop requested");
        }
        self.shared.cancel.lock().cancel();
    }

    /// Block until the read thread has exited
    pub fn join(&self) {
        self.task.lock().join();
    }

    /// Poll until the read thread exits or `timeout` elapses
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
        true
    }

    /// Register a subscriber
    ///
    /// Returns `false` if a stop was requested or a subscriber with the same
    /// identity is already registered. Terminated entries are swept first.
    pub fn subscribe(&self, subscriber: Arc<Subscriber>) -> bool {
        if self.shared.stop_requested() {
            tracing::debug!(
                subscriber = %subscriber.identity(),
                "Subscribe rejected, publisher stopping"
            );
            return false;
        }

        let mut subscribers = self.shared.subscribers.lock();
        sweep_terminated(&mut subscribers);

        if subscribers
            .iter()
            .any(|s| s.identity() == subscriber.identity())
        {
            return false;
        }

        tracing::info!(
            subscriber = %subscriber.identity(),
            subscribers = subscribers.len() + 1,
            "Subscriber added"
        );
        subscribers.push(subscriber);
        true
    }

    /// Remove the subscriber with the same identity; true if one was removed
    pub fn unsubscribe(&self, subscriber: &Subscriber) -> bool {
        let mut subscribers = self.shared.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.identity() != subscriber.identity());
        let removed = subscribers.len() < before;
        sweep_terminated(&mut subscribers);

        if removed {
            tracing::info!(
                subscriber = %subscriber.identity(),
                subscribers = subscribers.len(),
                "Subscriber removed"
            );
        }
        removed
    }

    /// Deliver a packet to every live subscriber
    ///
    /// Returns the number of subscribers it reached. No-op (returning 0)
    /// unless the read loop is running and no stop was requested.
    pub fn publish(&self, packet: Packet) -> usize {
        self.shared.publish(packet)
    }

    /// Registered subscribers, including any not yet swept
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Whether the read loop is executing
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Whether the read thread is spawned and not yet finished
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }

    /// Id of the most recently produced packet (0 before the first)
    pub fn last_packet_id(&self) -> i64 {
        self.shared.last_packet_id.load(Ordering::SeqCst)
    }

    pub fn uri(&self) -> Option<String> {
        self.shared.uri.read().clone()
    }

    /// Video stream reported by the source at start
    pub fn video_stream(&self) -> Option<StreamInfo> {
        self.shared.video.read().clone()
    }

    /// Audio stream reported by the source at start
    pub fn audio_stream(&self) -> Option<StreamInfo> {
        self.shared.audio.read().clone()
    }

    pub fn stats(&self) -> PublisherStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.stop();
        // The task handle joins on drop
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("uri", &self.uri())
            .field("started", &self.is_started())
            .field("stop_requested", &self.is_stop_requested())
            .field("subscribers", &self.subscriber_count())
            .field("last_packet_id", &self.last_packet_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, SourceError};
    use crate::source::{MemorySource, RawUnit};

    const SPS: &[u8] = &[0, 0, 1, 0x67, 0x42];
    const IDR: &[u8] = &[0, 0, 1, 0x65, 0x88];
    const SLICE: &[u8] = &[0, 0, 1, 0x41, 0x9a];

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !cond() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    fn fast_config() -> PublisherConfig {
        PublisherConfig::default().retry_delay(Duration::from_millis(1))
    }

    fn live_source() -> (MemorySource, crate::source::MemoryFeeder) {
        let (source, feeder) = MemorySource::new();
        let source = source
            .with_video(StreamInfo::video(0, "h264", 640, 360))
            .with_audio(StreamInfo::audio(1, "aac", 48_000, 2));
        (source, feeder)
    }

    fn drain(sub: &Subscriber, count: usize) -> Vec<Packet> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while out.len() < count && Instant::now() < deadline {
            match sub.dequeue() {
                Some(p) => out.push(p),
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        out
    }

    #[test]
    fn test_publish_requires_started() {
        let publisher = Publisher::new();
        let sub = Arc::new(Subscriber::new("Early", 4));
        assert!(publisher.subscribe(Arc::clone(&sub)));

        assert_eq!(publisher.publish(Packet::video(1)), 0);
        assert_eq!(sub.queue_len(), 0);
    }

    #[test]
    fn test_subscribe_idempotent() {
        let publisher = Publisher::new();
        let sub = Arc::new(Subscriber::new("Twice", 4));

        assert!(publisher.subscribe(Arc::clone(&sub)));
        assert!(!publisher.subscribe(Arc::clone(&sub)));
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_subscribe_sweeps_terminated() {
        let publisher = Publisher::new();
        let a = Arc::new(Subscriber::new("A", 4));
        let b = Arc::new(Subscriber::new("B", 4));

        publisher.subscribe(Arc::clone(&a));
        a.terminate();
        publisher.subscribe(Arc::clone(&b));

        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let publisher = Publisher::new();
        let a = Arc::new(Subscriber::new("A", 4));
        let b = Arc::new(Subscriber::new("B", 4));
        publisher.subscribe(Arc::clone(&a));
        publisher.subscribe(Arc::clone(&b));

        assert!(publisher.unsubscribe(&a));
        assert!(!publisher.unsubscribe(&a));
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_subscribe_rejected_after_stop() {
        let publisher = Publisher::new();
        publisher.stop();
        assert!(publisher.is_stop_requested());

        let sub = Arc::new(Subscriber::new("Late", 4));
        assert!(!publisher.subscribe(sub));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_open_failure_is_fatal() {
        let publisher = Publisher::new();
        let (source, _feeder) = live_source();

        let err = publisher
            .start(source.fail_open("refused"), "rtsp://cam")
            .unwrap_err();
        assert!(matches!(err, Error::Source(SourceError::Open { .. })));
        assert!(!publisher.is_running());
        assert!(publisher.uri().is_none());
    }

    #[test]
    fn test_single_subscriber_receives_in_order() {
        let publisher = Publisher::with_config(fast_config());
        let sub = Arc::new(Subscriber::new("Solo", 16));
        publisher.subscribe(Arc::clone(&sub));

        let (source, feeder) = live_source();
        publisher.start(source, "mem://solo").unwrap();
        assert!(publisher.video_stream().is_some());
        assert_eq!(publisher.uri().as_deref(), Some("mem://solo"));

        feeder.push(RawUnit::new(0, SPS, 0));
        feeder.push(RawUnit::new(0, IDR, 3000));
        feeder.push(RawUnit::new(0, SLICE, 6000));

        let packets = drain(&sub, 3);
        let ids: Vec<i64> = packets.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(packets[1].is_keyframe());
        assert_eq!(packets[2].pts(), 6000);

        feeder.finish();
        assert!(publisher.wait_for_exit(Duration::from_secs(5)));
        assert!(!publisher.is_started());

        let stats = publisher.stats();
        assert_eq!(stats.units_read, 3);
        assert_eq!(stats.packets_published, 3);
        assert_eq!(stats.keyframes, 1);
    }

    #[test]
    fn test_fan_out_clones_are_independent() {
        let publisher = Publisher::with_config(fast_config());
        let a = Arc::new(Subscriber::new("A", 8));
        let b = Arc::new(Subscriber::new("B", 8));
        publisher.subscribe(Arc::clone(&a));
        publisher.subscribe(Arc::clone(&b));

        let (source, feeder) = live_source();
        publisher.start(source, "mem://fan").unwrap();
        feeder.push(RawUnit::new(0, IDR, 0));

        let mut from_a = drain(&a, 1);
        let from_b = drain(&b, 1);
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_b.len(), 1);

        from_a[0].data_mut()[4] = 0xff;
        assert_eq!(from_b[0].data(), IDR);
        assert_eq!(from_a[0].id(), from_b[0].id());

        publisher.stop();
        assert!(publisher.wait_for_exit(Duration::from_secs(5)));
    }

    #[test]
    fn test_audio_dropped_unless_forwarded() {
        let publisher = Publisher::with_config(fast_config());
        let sub = Arc::new(Subscriber::new("Video", 8));
        publisher.subscribe(Arc::clone(&sub));

        let (source, feeder) = live_source();
        publisher.start(source, "mem://av").unwrap();
        feeder.push(RawUnit::new(1, vec![0xff, 0xf1, 0x50], 0));
        feeder.push(RawUnit::new(0, SLICE, 0));
        feeder.finish();
        publisher.join();

        let packets = drain(&sub, 1);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is_video());
        assert!(sub.dequeue().is_none());
        assert_eq!(publisher.stats().units_read, 2);
    }

    #[test]
    fn test_audio_forwarded_when_enabled() {
        let publisher = Publisher::with_config(fast_config().forward_audio(true));
        let sub = Arc::new(Subscriber::new("AV", 8));
        publisher.subscribe(Arc::clone(&sub));

        let (source, feeder) = live_source();
        publisher.start(source, "mem://av").unwrap();
        feeder.push(RawUnit::new(1, vec![0xff, 0xf1, 0x50], 1024));
        feeder.finish();
        publisher.join();

        let packets = drain(&sub, 1);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is_audio());
        assert_eq!(packets[0].dts(), 1024);
    }

    #[test]
    fn test_zero_subscribers_discards() {
        let publisher = Publisher::with_config(fast_config());
        let (source, feeder) = live_source();
        publisher.start(source, "mem://none").unwrap();

        feeder.push(RawUnit::new(0, SLICE, 0));
        feeder.push(RawUnit::new(0, SLICE, 1));
        feeder.finish();
        publisher.join();

        let stats = publisher.stats();
        assert_eq!(stats.packets_discarded, 2);
        assert_eq!(stats.packets_published, 0);
    }

    #[test]
    fn test_start_while_running_is_ignored() {
        let publisher = Publisher::with_config(fast_config());
        let (source, feeder) = live_source();
        publisher.start(source, "mem://first").unwrap();
        assert!(wait_until(Duration::from_secs(5), || publisher.is_started()));

        let (second, _feeder2) = live_source();
        publisher.start(second, "mem://second").unwrap();
        assert_eq!(publisher.uri().as_deref(), Some("mem://first"));

        feeder.finish();
        assert!(publisher.wait_for_exit(Duration::from_secs(5)));
    }

    #[test]
    fn test_restart_after_stop() {
        let publisher = Publisher::with_config(fast_config());
        let first = Arc::new(Subscriber::new("First", 4));
        publisher.subscribe(Arc::clone(&first));

        let (source, feeder) = live_source();
        publisher.start(source, "mem://one").unwrap();
        feeder.push(RawUnit::new(0, SLICE, 0));
        feeder.push(RawUnit::new(0, SLICE, 3000));
        assert_eq!(drain(&first, 2).len(), 2);
        let first_last = publisher.last_packet_id();
        assert_eq!(first_last, 2);

        publisher.stop();
        publisher.join();
        assert!(!publisher.is_running());

        let again = Arc::new(Subscriber::new("Again", 4));
        let (source, feeder) = live_source();
        publisher.start(source, "mem://two").unwrap();
        assert!(!publisher.is_stop_requested());
        assert!(publisher.subscribe(Arc::clone(&again)));

        feeder.push(RawUnit::new(0, SLICE, 0));
        let packets = drain(&again, 1);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].id(), first_last + 1);
        assert_eq!(drain(&first, 1)[0].id(), first_last + 1);

        feeder.finish();
        publisher.join();
    }

    /// Delays `open` so two callers overlap inside `start`
    struct SlowOpen {
        inner: MemorySource,
        delay: Duration,
    }

    impl PacketSource for SlowOpen {
        fn open(&mut self, uri: &str) -> std::result::Result<(), SourceError> {
            thread::sleep(self.delay);
            self.inner.open(uri)
        }

        fn read_next_unit(&mut self) -> ReadOutcome {
            self.inner.read_next_unit()
        }

        fn video_stream(&self) -> Option<StreamInfo> {
            self.inner.video_stream()
        }

        fn audio_stream(&self) -> Option<StreamInfo> {
            self.inner.audio_stream()
        }
    }

    #[test]
    fn test_concurrent_start_runs_once() {
        let publisher = Arc::new(Publisher::with_config(fast_config()));
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let mut feeders = Vec::new();

        let callers: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|codec| {
                let (source, feeder) = MemorySource::new();
                feeders.push(feeder);
                let source = SlowOpen {
                    inner: source.with_video(StreamInfo::video(0, codec, 640, 360)),
                    delay: Duration::from_millis(100),
                };
                let publisher = Arc::clone(&publisher);
                let done_tx = done_tx.clone();
                thread::spawn(move || {
                    let uri = format!("mem://{}", codec);
                    let result = publisher.start(source, &uri);
                    let _ = done_tx.send(result.is_ok());
                })
            })
            .collect();

        for _ in 0..2 {
            let ok = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert!(ok);
        }
        for caller in callers {
            caller.join().unwrap();
        }

        assert!(publisher.is_running());
        let codec = publisher.video_stream().unwrap().codec;
        assert_eq!(publisher.uri(), Some(format!("mem://{}", codec)));

        // Only the winning source feeds the live run
        let sub = Arc::new(Subscriber::new("Watcher", 4));
        publisher.subscribe(Arc::clone(&sub));
        let winner = if codec == "first" { 0 } else { 1 };
        feeders[1 - winner].push(RawUnit::new(0, IDR, 0));
        feeders[winner].push(RawUnit::new(0, SLICE, 0));
        let packets = drain(&sub, 1);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data(), SLICE);
        assert_eq!(publisher.video_stream().unwrap().codec, codec);

        feeders[winner].finish();
        assert!(publisher.wait_for_exit(Duration::from_secs(5)));
    }

    #[test]
    fn test_start_while_stopping_keeps_stop_request() {
        let publisher = Publisher::with_config(fast_config());
        let stalled = Arc::new(Subscriber::new("Stalled", 1));
        publisher.subscribe(Arc::clone(&stalled));

        let (source, feeder) = live_source();
        publisher.start(source, "mem://stall").unwrap();
        feeder.push(RawUnit::new(0, SLICE, 0));
        feeder.push(RawUnit::new(0, SLICE, 1));
        feeder.push(RawUnit::new(0, SLICE, 2));

        // First packet fills the queue, the second blocks the read thread
        assert!(wait_until(Duration::from_secs(5), || feeder.pending() == 1));
        publisher.stop();

        let (second, _feeder2) = live_source();
        publisher.start(second, "mem://second").unwrap();
        assert!(publisher.is_running());
        assert!(publisher.is_stop_requested());
        assert_eq!(publisher.uri().as_deref(), Some("mem://stall"));

        stalled.terminate();
        stalled.clear_queue();
        assert!(publisher.wait_for_exit(Duration::from_secs(5)));
    }

    #[test]
    fn test_read_failure_ends_loop() {
        let publisher = Publisher::with_config(fast_config());
        let (source, feeder) = live_source();
        publisher.start(source, "mem://flaky").unwrap();

        feeder.fail("connection reset");
        assert!(publisher.wait_for_exit(Duration::from_secs(5)));
        assert!(!publisher.is_started());
    }
}
