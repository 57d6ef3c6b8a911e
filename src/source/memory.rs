//! In-memory packet source
//!
//! Units are queued through a [`MemoryFeeder`], which can be cloned and moved
//! to another thread to simulate a live feed. The source reports `Pending`
//! while its queue is empty and `Eof` once the feeder has called `finish`
//! and every queued unit has been read.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{PacketSource, RawUnit, ReadOutcome, StreamInfo};
use crate::error::SourceError;

#[derive(Debug, Default)]
struct FeedState {
    units: VecDeque<RawUnit>,
    finished: bool,
    failure: Option<SourceError>,
}

/// Scripted source backed by a shared queue
#[derive(Debug)]
pub struct MemorySource {
    state: Arc<Mutex<FeedState>>,
    video: Option<StreamInfo>,
    audio: Option<StreamInfo>,
    open_error: Option<String>,
    uri: Option<String>,
}

impl MemorySource {
    /// Create a source with no streams and its feeder
    pub fn new() -> (Self, MemoryFeeder) {
        let state = Arc::new(Mutex::new(FeedState::default()));
        let source = Self {
            state: Arc::clone(&state),
            video: None,
            audio: None,
            open_error: None,
            uri: None,
        };
        (source, MemoryFeeder { state })
    }

    /// Advertise a video stream
    pub fn with_video(mut self, info: StreamInfo) -> Self {
        self.video = Some(info);
        self
    }

    /// Advertise an audio stream
    pub fn with_audio(mut self, info: StreamInfo) -> Self {
        self.audio = Some(info);
        self
    }

    /// Make `open` fail with the given reason
    pub fn fail_open(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    /// URI passed to the last successful `open`
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }
}

impl PacketSource for MemorySource {
    fn open(&mut self, uri: &str) -> Result<(), SourceError> {
        if let Some(reason) = &self.open_error {
            return Err(SourceError::Open {
                uri: uri.to_string(),
                reason: reason.clone(),
            });
        }
        if self.video.is_none() && self.audio.is_none() {
            return Err(SourceError::NoStreams);
        }
        self.uri = Some(uri.to_string());
        Ok(())
    }

    fn read_next_unit(&mut self) -> ReadOutcome {
        let mut state = self.state.lock();
        if let Some(unit) = state.units.pop_front() {
            return ReadOutcome::Unit(unit);
        }
        if let Some(err) = state.failure.take() {
            return ReadOutcome::Failed(err);
        }
        if state.finished {
            ReadOutcome::Eof
        } else {
            ReadOutcome::Pending
        }
    }

    fn video_stream(&self) -> Option<StreamInfo> {
        self.video.clone()
    }

    fn audio_stream(&self) -> Option<StreamInfo> {
        self.audio.clone()
    }
}

/// Producer half of a [`MemorySource`]
#[derive(Debug, Clone)]
pub struct MemoryFeeder {
    state: Arc<Mutex<FeedState>>,
}

impl MemoryFeeder {
    /// Queue a unit for the source to return
    pub fn push(&self, unit: RawUnit) {
        self.state.lock().units.push_back(unit);
    }

    /// Queue several units
    pub fn extend(&self, units: impl IntoIterator<Item = RawUnit>) {
        self.state.lock().units.extend(units);
    }

    /// Signal end of stream once the queue drains
    pub fn finish(&self) {
        self.state.lock().finished = true;
    }

    /// Make the next read (after queued units) fail
    pub fn fail(&self, reason: impl Into<String>) {
        self.state.lock().failure = Some(SourceError::Read(reason.into()));
    }

    /// Units not yet read by the source
    pub fn pending(&self) -> usize {
        self.state.lock().units.len()
    }
}
