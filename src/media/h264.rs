//! H.264 Annex-B frame classification
//!
//! Packets coming off a demuxer carry Annex-B framed NAL units: a start code
//! followed by the NAL header byte.
//!
//! ```text
//! +-------------------+------------+-----------------+
//! | 00 00 01          | NAL header | payload ...     |   3-byte start code
//! | 00 00 00 01       | NAL header | payload ...     |   4-byte start code
//! +-------------------+------------+-----------------+
//!
//! NAL header: | F (1) | NRI (2) | Type (5) |
//! ```
//!
//! For RTP fragmentation units (FU-A = 28, FU-B = 29) the second byte is the
//! FU header, whose low 5 bits carry the type of the fragmented NAL and whose
//! top bit marks the first fragment:
//!
//! ```text
//! FU header: | S (1) | E (1) | R (1) | Type (5) |
//! ```
//!
//! Only the first NAL unit of a packet is inspected. This is enough to tell
//! parameter sets from IDR slices from non-IDR slices; anything else is left
//! as `Unknown` rather than flagged as corrupt.

use std::fmt;

/// Raw NAL unit type (low 5 bits of the NAL header)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
    /// Fragmentation unit A (RTP)
    FuA = 28,
    /// Fragmentation unit B (RTP)
    FuB = 29,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            28 => Some(NaluType::FuA),
            29 => Some(NaluType::FuB),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, NaluType::FuA | NaluType::FuB)
    }
}

/// Frame-level classification of a video packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NalUnitType {
    #[default]
    Unknown,
    Sei,
    Sps,
    Pps,
    IFrame,
    PFrame,
    /// Never produced by [`classify`]; slice types are not parsed
    BFrame,
}

impl NalUnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NalUnitType::Unknown => "Unknown",
            NalUnitType::Sei => "SEI",
            NalUnitType::Sps => "SPS",
            NalUnitType::Pps => "PPS",
            NalUnitType::IFrame => "I_Frame",
            NalUnitType::PFrame => "P_Frame",
            NalUnitType::BFrame => "B_Frame",
        }
    }
}

impl fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annex-B start code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartCode {
    /// No start code found at the head of the payload
    #[default]
    None,
    /// `00 00 01`
    Short,
    /// `00 00 00 01`
    Long,
}

impl StartCode {
    /// Detect the start code at the head of `data`
    ///
    /// Only the terminating `01` byte is checked, at offset 2 then 3.
    pub fn detect(data: &[u8]) -> Self {
        if data.get(2) == Some(&1) {
            StartCode::Short
        } else if data.get(3) == Some(&1) {
            StartCode::Long
        } else {
            StartCode::None
        }
    }

    /// Length in bytes (0, 3 or 4)
    pub fn len(&self) -> usize {
        match self {
            StartCode::None => 0,
            StartCode::Short => 3,
            StartCode::Long => 4,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, StartCode::None)
    }
}

/// Result of inspecting a video payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub nal_unit: NalUnitType,
    pub start_code: StartCode,
}

impl Classification {
    /// Whether the payload starts a keyframe
    pub fn is_keyframe(&self) -> bool {
        self.nal_unit == NalUnitType::IFrame
    }
}

/// Minimum payload length for classification
pub const MIN_CLASSIFIABLE_LEN: usize = 2;

/// FU header start bit
const FU_START_BIT: u8 = 0x80;

/// Classify a video payload by its leading NAL unit
pub fn classify(data: &[u8]) -> Classification {
    if data.len() < MIN_CLASSIFIABLE_LEN {
        return Classification::default();
    }

    let start_code = StartCode::detect(data);
    let offset = start_code.len();

    let Some(&header) = data.get(offset) else {
        return Classification {
            nal_unit: NalUnitType::Unknown,
            start_code,
        };
    };
    let second = data.get(offset + 1).copied().unwrap_or(0);

    // SEI (type 6) has no arm of its own and falls through to Unknown
    let nal_unit = match NaluType::from_byte(header) {
        Some(NaluType::Sps) => NalUnitType::Sps,
        Some(NaluType::Pps) => NalUnitType::Pps,
        Some(NaluType::Idr) => NalUnitType::IFrame,
        Some(fu) if fu.is_fragment() => {
            let fragmented = NaluType::from_byte(second);
            if fragmented == Some(NaluType::Idr) && second & FU_START_BIT != 0 {
                NalUnitType::IFrame
            } else {
                NalUnitType::Unknown
            }
        }
        Some(NaluType::Slice) => NalUnitType::PFrame,
        _ => NalUnitType::Unknown,
    };

    Classification {
        nal_unit,
        start_code,
    }
}
