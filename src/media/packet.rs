//! Media packet
//!
//! A `Packet` owns its payload and a small amount of metadata. Every time the
//! payload is (re)populated through [`Packet::store`] or [`Packet::add`], video
//! packets are re-classified from their leading NAL unit and the key-frame
//! flag is recomputed. Audio packets are never inspected.
//!
//! Cloning is a deep copy: the clone gets its own payload buffer (with the
//! same capacity), so mutating one never shows through the other.

use std::fmt;

use bytes::{Bytes, BytesMut};

use super::h264::{self, NalUnitType, StartCode};
use crate::source::RawUnit;

/// Default payload capacity (240 KiB)
pub const DEFAULT_PACKET_CAPACITY: usize = 240 * 1024;

/// Extra room reserved when building a packet from a source unit
const UNIT_CAPACITY_SLACK: usize = 100;

/// Packet flag bitset
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketFlags(u32);

impl PacketFlags {
    pub const VIDEO: PacketFlags = PacketFlags(0x0001);
    pub const AUDIO: PacketFlags = PacketFlags(0x0002);
    pub const KEY_FRAME: PacketFlags = PacketFlags(0x0004);
    pub const CORRUPTED: PacketFlags = PacketFlags(0x0008);

    pub const fn empty() -> Self {
        PacketFlags(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: PacketFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PacketFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: PacketFlags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// These flags minus the bits of `other`
    pub const fn without(self, other: PacketFlags) -> Self {
        PacketFlags(self.0 & !other.0)
    }
}

/// Bits derived from a packet's [`MediaKind`]; never set or cleared by hand
const MEDIA_KIND_FLAGS: PacketFlags = PacketFlags(PacketFlags::VIDEO.0 | PacketFlags::AUDIO.0);

impl std::ops::BitOr for PacketFlags {
    type Output = PacketFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        PacketFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for PacketFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (PacketFlags::VIDEO, "VIDEO"),
            (PacketFlags::AUDIO, "AUDIO"),
            (PacketFlags::KEY_FRAME, "KEY_FRAME"),
            (PacketFlags::CORRUPTED, "CORRUPTED"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "PacketFlags({})", set.join(" | "))
    }
}

/// Media type of a packet, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    fn flag(&self) -> PacketFlags {
        match self {
            MediaKind::Video => PacketFlags::VIDEO,
            MediaKind::Audio => PacketFlags::AUDIO,
        }
    }
}

/// A media packet
pub struct Packet {
    id: i64,
    stream_id: i64,
    group_id: i64,
    pts: i64,
    dts: i64,
    duration: i64,
    kind: MediaKind,
    flags: PacketFlags,
    nal_unit: NalUnitType,
    start_code: StartCode,
    data: BytesMut,
    metadata: String,
}

impl Packet {
    /// Create an empty packet of the given kind and payload capacity
    pub fn with_capacity(id: i64, kind: MediaKind, capacity: usize) -> Self {
        Self {
            id,
            stream_id: 0,
            group_id: 0,
            pts: 0,
            dts: 0,
            duration: 0,
            kind,
            flags: kind.flag(),
            nal_unit: NalUnitType::Unknown,
            start_code: StartCode::None,
            data: BytesMut::with_capacity(capacity),
            metadata: String::new(),
        }
    }

    /// Create an empty video packet with the default capacity
    pub fn video(id: i64) -> Self {
        Self::with_capacity(id, MediaKind::Video, DEFAULT_PACKET_CAPACITY)
    }

    /// Create an empty audio packet with the default capacity
    pub fn audio(id: i64) -> Self {
        Self::with_capacity(id, MediaKind::Audio, DEFAULT_PACKET_CAPACITY)
    }

    /// Build a packet from a unit read off a source
    ///
    /// Returns `None` if the unit payload is too short to be a packet.
    /// The source's own key-frame and corruption markers are added on top
    /// of the classification result.
    pub fn from_unit(id: i64, unit: &RawUnit, kind: MediaKind) -> Option<Self> {
        if unit.data.len() < h264::MIN_CLASSIFIABLE_LEN {
            return None;
        }

        let mut packet =
            Self::with_capacity(id, kind, unit.data.len() + UNIT_CAPACITY_SLACK);
        packet.store(&unit.data);
        packet.set_pts(unit.pts);
        packet.set_dts(unit.dts.unwrap_or(unit.pts));
        packet.set_duration(unit.duration);
        packet.set_stream_id(unit.stream_index as i64);

        if unit.is_key {
            packet.add_flag(PacketFlags::KEY_FRAME);
        }
        if unit.is_corrupt {
            packet.add_flag(PacketFlags::CORRUPTED);
        }
        Some(packet)
    }

    /// Replace the payload with a copy of `data`
    pub fn store(&mut self, data: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.reclassify();
    }

    /// Append `data` to the payload, growing the buffer if needed
    pub fn add(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
        self.reclassify();
    }

    /// Recompute NAL type, start code and the key-frame flag
    ///
    /// All flags except the media-type flag are cleared first.
    pub fn reclassify(&mut self) {
        self.flags = self.kind.flag();

        match self.kind {
            MediaKind::Audio => {
                self.nal_unit = NalUnitType::Unknown;
                self.start_code = StartCode::None;
            }
            MediaKind::Video => {
                let c = h264::classify(&self.data);
                self.nal_unit = c.nal_unit;
                self.start_code = c.start_code;
                if c.is_keyframe() {
                    self.flags.insert(PacketFlags::KEY_FRAME);
                }
            }
        }
    }

    /// Reset payload, flags and identifiers
    ///
    /// The payload buffer keeps its capacity.
    pub fn clear(&mut self) {
        self.data.clear();
        self.nal_unit = NalUnitType::Unknown;
        self.start_code = StartCode::None;
        self.flags = PacketFlags::empty();
        self.stream_id = 0;
        self.group_id = 0;
        self.pts = 0;
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn stream_id(&self) -> i64 {
        self.stream_id
    }

    pub fn set_stream_id(&mut self, value: i64) {
        self.stream_id = value;
    }

    pub fn group_id(&self) -> i64 {
        self.group_id
    }

    pub fn set_group_id(&mut self, value: i64) {
        self.group_id = value;
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    /// Set the presentation timestamp (audio packets also take it as dts)
    pub fn set_pts(&mut self, value: i64) {
        self.pts = value;
        if self.kind == MediaKind::Audio {
            self.dts = value;
        }
    }

    pub fn dts(&self) -> i64 {
        self.dts
    }

    pub fn set_dts(&mut self, value: i64) {
        self.dts = value;
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn set_duration(&mut self, value: i64) {
        self.duration = value;
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn set_metadata(&mut self, value: impl Into<String>) {
        self.metadata = value.into();
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_video(&self) -> bool {
        self.has_flag(PacketFlags::VIDEO)
    }

    pub fn is_audio(&self) -> bool {
        self.has_flag(PacketFlags::AUDIO)
    }

    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: PacketFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Set `flag`; the VIDEO/AUDIO bits follow the media kind and are ignored
    pub fn add_flag(&mut self, flag: PacketFlags) {
        self.flags.insert(flag.without(MEDIA_KIND_FLAGS));
    }

    /// Clear `flag`; the VIDEO/AUDIO bits follow the media kind and are ignored
    pub fn remove_flag(&mut self, flag: PacketFlags) {
        self.flags.remove(flag.without(MEDIA_KIND_FLAGS));
    }

    pub fn is_keyframe(&self) -> bool {
        self.has_flag(PacketFlags::KEY_FRAME)
    }

    /// Payload bytes (logical length only)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable payload bytes
    ///
    /// Editing through this slice does not re-classify; call
    /// [`Packet::reclassify`] afterwards if the leading bytes changed.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Logical payload length
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Allocated payload length
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn nal_unit_type(&self) -> NalUnitType {
        self.nal_unit
    }

    pub fn start_code(&self) -> StartCode {
        self.start_code
    }

    pub fn start_code_len(&self) -> usize {
        self.start_code.len()
    }

    pub fn has_start_code(&self) -> bool {
        self.start_code.is_present()
    }

    /// Whether the packet is worth decoding
    pub fn is_valid(&self) -> bool {
        self.size() > 1 && !self.has_flag(PacketFlags::CORRUPTED) && self.pts >= 0
    }

    /// "Audio" for audio packets, else the NAL unit type name
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            MediaKind::Audio => "Audio",
            MediaKind::Video => self.nal_unit.as_str(),
        }
    }

    /// Consume the packet, returning its payload
    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }
}

impl Clone for Packet {
    fn clone(&self) -> Self {
        let mut data = BytesMut::with_capacity(self.data.capacity());
        data.extend_from_slice(&self.data);

        Self {
            id: self.id,
            stream_id: self.stream_id,
            group_id: self.group_id,
            pts: self.pts,
            dts: self.dts,
            duration: self.duration,
            kind: self.kind,
            flags: self.flags,
            nal_unit: self.nal_unit,
            start_code: self.start_code,
            data,
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("kind", &self.kind_label())
            .field("flags", &self.flags)
            .field("size", &self.size())
            .finish()
    }
}
