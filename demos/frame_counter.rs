//! Frame counter demo
//!
//! Feeds a synthetic 30 fps H.264 stream through a publisher into two
//! consumers: a frame counter that reports the frame rate from decoded
//! timestamps, and a keyframe logger.
//!
//! Run with: cargo run --example frame_counter [SECONDS]
//!
//! Examples:
//!   cargo run --example frame_counter        # runs until Ctrl+C
//!   cargo run --example frame_counter 5      # stops after 5 seconds
//!   RUST_LOG=media_fanout=debug cargo run --example frame_counter 3

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use media_fanout::error::DecodeError;
use media_fanout::media::NalUnitType;
use media_fanout::source::{DecodedFrame, FrameCallback, Rational, VideoDecoder};
use media_fanout::task::{BackgroundTask, CancelToken};
use media_fanout::{
    DecodeHandler, DrainConfig, DrainWorker, MemoryFeeder, MemorySource, Packet, Publisher,
    RawUnit, StreamInfo,
};

const FPS: i64 = 30;
const GOP: i64 = 30;
const TICKS_PER_FRAME: i64 = 90_000 / FPS;

/// Reporting window of the frame counter in milliseconds
const REPORT_WINDOW_MS: i64 = 2000;

/// Pretends to decode: one picture per I/P/B slice
struct SliceDecoder {
    on_frame: Option<FrameCallback>,
    width: u32,
    height: u32,
}

impl SliceDecoder {
    fn new() -> Self {
        Self {
            on_frame: None,
            width: 0,
            height: 0,
        }
    }
}

impl VideoDecoder for SliceDecoder {
    fn open(&mut self, stream: &StreamInfo, on_frame: FrameCallback) -> Result<(), DecodeError> {
        self.width = stream.width.unwrap_or(0);
        self.height = stream.height.unwrap_or(0);
        self.on_frame = Some(on_frame);
        Ok(())
    }

    fn decode(&mut self, packet: &Packet) -> Result<(), DecodeError> {
        let on_frame = self.on_frame.as_mut().ok_or(DecodeError::NotOpen)?;
        match packet.nal_unit_type() {
            NalUnitType::IFrame | NalUnitType::PFrame | NalUnitType::BFrame => {
                on_frame(
                    self.width,
                    self.height,
                    DecodedFrame {
                        pts: packet.pts(),
                        is_key: packet.is_keyframe(),
                        data: Bytes::new(),
                    },
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn close(&mut self) {
        self.on_frame = None;
    }

    fn is_open(&self) -> bool {
        self.on_frame.is_some()
    }
}

/// Frame-rate estimate over a fixed window of presentation time
struct FrameRate {
    time_base: Rational,
    frames: i64,
    last_ms: Option<i64>,
    window_ms: i64,
}

impl FrameRate {
    fn new(time_base: Rational) -> Self {
        Self {
            time_base,
            frames: 0,
            last_ms: None,
            window_ms: 0,
        }
    }

    fn on_frame(&mut self, width: u32, height: u32, frame: DecodedFrame) {
        let now_ms = self.time_base.ticks_to_millis(frame.pts);
        if let Some(last) = self.last_ms {
            self.window_ms += now_ms - last;
            self.frames += 1;
        }
        self.last_ms = Some(now_ms);

        if self.window_ms >= REPORT_WINDOW_MS {
            let fps = self.frames as f64 * 1000.0 / self.window_ms as f64;
            println!("Frame rate: {:.2} fps ({}x{})", fps, width, height);
            self.frames = 0;
            self.window_ms = 0;
        }
    }
}

/// Push one synthetic access unit per frame interval until cancelled
fn feed(feeder: MemoryFeeder, token: CancelToken) -> media_fanout::Result<()> {
    let interval = Duration::from_millis((1000 / FPS) as u64);
    let mut frame: i64 = 0;

    while !token.is_cancelled() {
        let pts = frame * TICKS_PER_FRAME;
        if frame % GOP == 0 {
            feeder.push(RawUnit::new(0, vec![0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f], pts));
            feeder.push(RawUnit::new(0, vec![0, 0, 0, 1, 0x68, 0xce, 0x3c, 0x80], pts));
            feeder.push(RawUnit::new(0, vec![0, 0, 1, 0x65, 0x88, 0x84, 0x00], pts).key());
        } else {
            feeder.push(RawUnit::new(0, vec![0, 0, 1, 0x41, 0x9a, 0x02, 0x00], pts));
        }
        frame += 1;
        if token.sleep(interval) {
            break;
        }
    }
    feeder.finish();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("media_fanout=info".parse()?)
                .add_directive("frame_counter=info".parse()?),
        )
        .init();

    let run_for = std::env::args()
        .nth(1)
        .map(|s| s.parse::<u64>())
        .transpose()?
        .map(Duration::from_secs);

    let stream = StreamInfo::video(0, "h264", 1280, 720);
    let (source, feeder) = MemorySource::new();
    let source = source.with_video(stream.clone());

    let publisher = Publisher::new();

    // Consumer 1: decode and count frames
    let rate = Arc::new(Mutex::new(FrameRate::new(stream.time_base)));
    let counter_rate = Arc::clone(&rate);
    let decode = DecodeHandler::open(
        SliceDecoder::new(),
        &stream,
        Box::new(move |w: u32, h: u32, frame: DecodedFrame| {
            counter_rate.lock().on_frame(w, h, frame)
        }),
    )?;
    let mut counter = DrainWorker::new(
        "FrameCounter",
        DrainConfig::default().thread_name("frame-counter"),
    );
    counter.start(decode);
    publisher.subscribe(counter.subscriber());

    // Consumer 2: log keyframes
    let mut keyframes = DrainWorker::new(
        "KeyframeLog",
        DrainConfig::default().thread_name("keyframe-log"),
    );
    keyframes.start(|packet: Packet| -> media_fanout::Result<()> {
        if packet.is_keyframe() {
            tracing::info!(packet_id = packet.id(), pts = packet.pts(), "Keyframe");
        }
        Ok(())
    });
    publisher.subscribe(keyframes.subscriber());

    publisher.start(source, "mem://synthetic")?;

    let mut producer = BackgroundTask::new("synthetic-feed");
    producer.start(move |token| feed(feeder, token));

    println!("Counting frames... press Ctrl+C to stop");

    let timer = async {
        match run_for {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = timer => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    producer.cancel();
    producer.join();
    publisher.stop();

    // Release the read thread if it is blocked on a consumer queue
    counter.stop();
    keyframes.stop();
    publisher.join();

    let stats = publisher.stats();
    println!(
        "Published {} packets ({} keyframes, {} bytes, {} discarded)",
        stats.packets_published, stats.keyframes, stats.bytes_published, stats.packets_discarded
    );
    Ok(())
}
