//! Media packets
//!
//! This module provides:
//! - The `Packet` entity with its flags and timing
//! - H.264 Annex-B start-code and NAL type classification

pub mod h264;
pub mod packet;

pub use h264::{Classification, NalUnitType, NaluType, StartCode};
pub use packet::{MediaKind, Packet, PacketFlags, DEFAULT_PACKET_CAPACITY};
