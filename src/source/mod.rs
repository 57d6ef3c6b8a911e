//! Source and decoder collaborators
//!
//! The publisher does not demux or decode anything itself. It pulls raw units
//! from a [`PacketSource`] and hands packets to consumers, some of which feed
//! a [`VideoDecoder`]. Real implementations wrap a demux/decode engine; the
//! [`memory`] module provides a scripted source for tests and demos.

pub mod memory;

use bytes::Bytes;

use crate::error::{DecodeError, SourceError};
use crate::media::Packet;

pub use memory::{MemoryFeeder, MemorySource};

/// Time base as a rational number (e.g. 1/90000)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Convert a tick count in this time base to milliseconds
    ///
    /// Saturates at the `i64` range; a zero denominator yields 0.
    pub fn ticks_to_millis(&self, ticks: i64) -> i64 {
        if self.den == 0 {
            return 0;
        }
        let millis = i128::from(ticks) * 1000 * i128::from(self.num) / i128::from(self.den);
        millis.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}

/// Description of one elementary stream inside a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Index of the stream in the container
    pub index: usize,
    /// Codec name (e.g. "h264", "aac")
    pub codec: String,
    /// Time base of pts/dts/duration values
    pub time_base: Rational,
    /// Frame width (video only)
    pub width: Option<u32>,
    /// Frame height (video only)
    pub height: Option<u32>,
    /// Sample rate in Hz (audio only)
    pub sample_rate: Option<u32>,
    /// Channel count (audio only)
    pub channels: Option<u16>,
}

impl StreamInfo {
    /// Describe a video stream
    pub fn video(index: usize, codec: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            index,
            codec: codec.into(),
            time_base: Rational::new(1, 90_000),
            width: Some(width),
            height: Some(height),
            sample_rate: None,
            channels: None,
        }
    }

    /// Describe an audio stream
    pub fn audio(index: usize, codec: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            index,
            codec: codec.into(),
            time_base: Rational::new(1, i32::try_from(sample_rate).unwrap_or(i32::MAX)),
            width: None,
            height: None,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }
}

/// One demuxed unit as delivered by a source
#[derive(Debug, Clone)]
pub struct RawUnit {
    /// Container stream this unit belongs to
    pub stream_index: usize,
    /// Encoded payload
    pub data: Bytes,
    /// Presentation timestamp (stream time base)
    pub pts: i64,
    /// Decode timestamp, if the container carries one
    pub dts: Option<i64>,
    /// Duration (stream time base)
    pub duration: i64,
    /// Container marked this unit as a key frame
    pub is_key: bool,
    /// Container marked this unit as corrupt
    pub is_corrupt: bool,
}

impl RawUnit {
    /// Create a unit with pts only
    pub fn new(stream_index: usize, data: impl Into<Bytes>, pts: i64) -> Self {
        Self {
            stream_index,
            data: data.into(),
            pts,
            dts: None,
            duration: 0,
            is_key: false,
            is_corrupt: false,
        }
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn corrupt(mut self) -> Self {
        self.is_corrupt = true;
        self
    }
}

/// Result of asking a source for its next unit
#[derive(Debug)]
pub enum ReadOutcome {
    /// A unit is available
    Unit(RawUnit),
    /// Nothing available right now; retry after a short delay
    Pending,
    /// End of stream
    Eof,
    /// Unrecoverable read error
    Failed(SourceError),
}

/// Demuxer collaborator
///
/// `open` is called once from the thread that starts the publisher; every
/// other call happens on the publisher's read thread.
pub trait PacketSource: Send {
    /// Open the resource identified by `uri`
    fn open(&mut self, uri: &str) -> Result<(), SourceError>;

    /// Read the next unit
    fn read_next_unit(&mut self) -> ReadOutcome;

    /// Best video stream, if any
    fn video_stream(&self) -> Option<StreamInfo>;

    /// Best audio stream, if any
    fn audio_stream(&self) -> Option<StreamInfo>;
}

/// A decoded picture handed to the frame callback
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub pts: i64,
    pub is_key: bool,
    /// Packed pixel data
    pub data: Bytes,
}

/// Called synchronously from inside [`VideoDecoder::decode`] with
/// `(width, height, frame)`. Must not block indefinitely.
pub type FrameCallback = Box<dyn FnMut(u32, u32, DecodedFrame) + Send>;

/// Decoder collaborator
pub trait VideoDecoder: Send {
    /// Prepare the decoder for `stream`; decoded frames go to `on_frame`
    fn open(&mut self, stream: &StreamInfo, on_frame: FrameCallback) -> Result<(), DecodeError>;

    /// Decode one packet, invoking the frame callback zero or more times
    fn decode(&mut self, packet: &Packet) -> Result<(), DecodeError>;

    /// Drain frames still buffered inside the codec
    fn flush(&mut self) {}

    /// Release codec resources
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
