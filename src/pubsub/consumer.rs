//! Subscriber drain loops
//!
//! A [`DrainWorker`] owns a subscriber and a background thread that polls its
//! queue, handing each packet to a [`PacketHandler`]. An empty queue is not
//! waited on; the loop sleeps for the poll interval and tries again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::config::DrainConfig;
use super::subscriber::Subscriber;
use crate::error::Result;
use crate::media::Packet;
use crate::source::{FrameCallback, StreamInfo, VideoDecoder};
use crate::task::{BackgroundTask, CancelToken};

/// Receives packets drained from a subscriber queue
///
/// Errors from `handle` are logged and the loop continues with the next
/// packet.
pub trait PacketHandler: Send + 'static {
    fn handle(&mut self, packet: Packet) -> Result<()>;

    /// Called once when the drain loop exits
    fn finish(&mut self) {}
}

impl<F> PacketHandler for F
where
    F: FnMut(Packet) -> Result<()> + Send + 'static,
{
    fn handle(&mut self, packet: Packet) -> Result<()> {
        self(packet)
    }
}

/// Owns a subscriber and drains it on a dedicated thread
pub struct DrainWorker {
    subscriber: Arc<Subscriber>,
    task: BackgroundTask,
    config: DrainConfig,
    handled: Arc<AtomicU64>,
}

impl DrainWorker {
    /// Create a worker whose subscriber is named `name`
    pub fn new(name: impl Into<String>, config: DrainConfig) -> Self {
        let subscriber = Arc::new(Subscriber::new(name, config.queue_capacity));
        let task = BackgroundTask::new(config.thread_name.clone());
        Self {
            subscriber,
            task,
            config,
            handled: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The subscriber to register with a publisher
    pub fn subscriber(&self) -> Arc<Subscriber> {
        Arc::clone(&self.subscriber)
    }

    /// Start draining into `handler`
    ///
    /// Returns `false` if already running or the subscriber was terminated.
    pub fn start<H: PacketHandler>(&mut self, mut handler: H) -> bool {
        if self.subscriber.is_terminated() {
            tracing::warn!(
                subscriber = %self.subscriber.identity(),
                "Cannot start drain, subscriber terminated"
            );
            return false;
        }

        let subscriber = Arc::clone(&self.subscriber);
        let handled = Arc::clone(&self.handled);
        let poll_interval = self.config.poll_interval;

        self.task.start(move |token: CancelToken| {
            tracing::info!(subscriber = %subscriber.identity(), "Drain started");
            loop {
                if token.is_cancelled() {
                    break;
                }
                match subscriber.dequeue() {
                    Some(packet) => {
                        let id = packet.id();
                        if let Err(e) = handler.handle(packet) {
                            tracing::warn!(packet_id = id, error = %e, "Packet handler failed");
                        }
                        handled.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        if token.sleep(poll_interval) {
                            break;
                        }
                    }
                }
            }
            handler.finish();
            tracing::info!(
                subscriber = %subscriber.identity(),
                handled = handled.load(Ordering::Relaxed),
                "Drain stopped"
            );
            Ok(())
        })
    }

    /// Stop draining and retire the subscriber
    ///
    /// Terminates the subscriber and clears its queue so a producer blocked
    /// on it is released, then joins the drain thread.
    pub fn stop(&mut self) {
        self.task.cancel();
        self.subscriber.terminate();
        self.subscriber.clear_queue();
        self.task.join();
        self.subscriber.clear_queue();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Packets handed to the handler so far
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }
}

impl Drop for DrainWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DrainWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainWorker")
            .field("subscriber", &self.subscriber)
            .field("task", &self.task)
            .field("handled", &self.handled())
            .finish()
    }
}

/// Handler that feeds video packets into a decoder
pub struct DecodeHandler<D> {
    decoder: D,
}

impl<D: VideoDecoder> DecodeHandler<D> {
    /// Open `decoder` for `stream`, sending decoded frames to `on_frame`
    pub fn open(mut decoder: D, stream: &StreamInfo, on_frame: FrameCallback) -> Result<Self> {
        decoder.open(stream, on_frame)?;
        tracing::info!(codec = %stream.codec, "Decoder opened");
        Ok(Self { decoder })
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }
}

impl<D: VideoDecoder + 'static> PacketHandler for DecodeHandler<D> {
    fn handle(&mut self, packet: Packet) -> Result<()> {
        if !packet.is_video() {
            return Ok(());
        }
        self.decoder.decode(&packet)?;
        Ok(())
    }

    fn finish(&mut self) {
        if self.decoder.is_open() {
            self.decoder.flush();
            self.decoder.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, Error};
    use crate::source::DecodedFrame;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

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

    fn fast_config() -> DrainConfig {
        DrainConfig::default()
            .poll_interval(Duration::from_millis(1))
            .queue_capacity(4)
    }

    fn video(id: i64, payload: &[u8]) -> Packet {
        let mut packet = Packet::video(id);
        packet.store(payload);
        packet
    }

    /// Emits one frame per key frame packet
    #[derive(Default)]
    struct KeyframeDecoder {
        on_frame: Option<FrameCallback>,
        flushed: Arc<Mutex<bool>>,
    }

    impl VideoDecoder for KeyframeDecoder {
        fn open(
            &mut self,
            _stream: &StreamInfo,
            on_frame: FrameCallback,
        ) -> std::result::Result<(), DecodeError> {
            self.on_frame = Some(on_frame);
            Ok(())
        }

        fn decode(&mut self, packet: &Packet) -> std::result::Result<(), DecodeError> {
            let cb = self.on_frame.as_mut().ok_or(DecodeError::NotOpen)?;
            if packet.is_keyframe() {
                cb(
                    640,
                    360,
                    DecodedFrame {
                        pts: packet.pts(),
                        is_key: true,
                        data: Bytes::new(),
                    },
                );
            }
            Ok(())
        }

        fn flush(&mut self) {
            *self.flushed.lock() = true;
        }

        fn close(&mut self) {
            self.on_frame = None;
        }

        fn is_open(&self) -> bool {
            self.on_frame.is_some()
        }
    }

    #[test]
    fn test_drain_handles_in_order() {
        let mut worker = DrainWorker::new("Collector", fast_config());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        assert!(worker.start(move |packet: Packet| -> Result<()> {
            sink.lock().push(packet.id());
            Ok(())
        }));

        let sub = worker.subscriber();
        for id in 1..=10 {
            sub.enqueue(video(id, &[0, 0, 1, 0x41]));
        }

        assert!(wait_until(Duration::from_secs(5), || worker.handled() == 10));
        assert_eq!(*seen.lock(), (1..=10).collect::<Vec<_>>());

        worker.stop();
        assert!(!worker.is_running());
        assert!(sub.is_terminated());
    }

    #[test]
    fn test_handler_error_does_not_stop_loop() {
        let mut worker = DrainWorker::new("Flaky", fast_config());
        assert!(worker.start(|packet: Packet| -> Result<()> {
            if packet.id() % 2 == 0 {
                Err(Error::Decode(DecodeError::Codec("bad slice".into())))
            } else {
                Ok(())
            }
        }));

        let sub = worker.subscriber();
        for id in 1..=4 {
            sub.enqueue(video(id, &[0, 0, 1, 0x41]));
        }
        assert!(wait_until(Duration::from_secs(5), || worker.handled() == 4));
        assert!(worker.is_running());
    }

    #[test]
    fn test_stop_releases_blocked_producer() {
        let mut worker = DrainWorker::new("Stalled", DrainConfig::default().queue_capacity(1));
        let sub = worker.subscriber();
        sub.enqueue(video(1, &[0, 0, 1, 0x41]));

        // No drain running: the second push blocks
        let producer = {
            let sub = Arc::clone(&sub);
            thread::spawn(move || sub.enqueue(video(2, &[0, 0, 1, 0x41])))
        };
        thread::sleep(Duration::from_millis(20));

        worker.stop();
        producer.join().unwrap();
        assert!(sub.is_terminated());
        assert!(!worker.start(|_: Packet| -> Result<()> { Ok(()) }));
    }

    #[test]
    fn test_decode_handler_emits_frames_and_closes() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let decoder = KeyframeDecoder::default();
        let flushed = Arc::clone(&decoder.flushed);

        let stream = StreamInfo::video(0, "h264", 640, 360);
        let handler = DecodeHandler::open(
            decoder,
            &stream,
            Box::new(move |w: u32, h: u32, frame: DecodedFrame| {
                sink.lock().push((w, h, frame.pts))
            }),
        )
        .unwrap();
        assert!(handler.decoder().is_open());

        let mut worker = DrainWorker::new("Decoder", fast_config());
        assert!(worker.start(handler));

        let sub = worker.subscriber();
        let mut idr = video(1, &[0, 0, 1, 0x65, 0x88]);
        idr.set_pts(9000);
        sub.enqueue(idr);
        sub.enqueue(video(2, &[0, 0, 1, 0x41, 0x9a]));
        sub.enqueue(Packet::audio(3));

        assert!(wait_until(Duration::from_secs(5), || worker.handled() == 3));
        worker.stop();

        assert_eq!(*frames.lock(), vec![(640, 360, 9000)]);
        assert!(*flushed.lock());
    }
}
