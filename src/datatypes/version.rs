use std::fmt;

use num_enum::TryFromPrimitive;

pub const CMPP2_PACKET_MAX: u32 = 2477;
pub const CMPP2_PACKET_MIN: u32 = 12;
pub const CMPP3_PACKET_MAX: u32 = 3335;
pub const CMPP3_PACKET_MIN: u32 = 12;

/// CMPP protocol version negotiated for a session.
///
/// The version decides the legal packet length range and which V2/V3
/// record variant a shared command id unpacks to. The raw value is what
/// goes into the `version` field of a CONNECT request.
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Version {
    V20 = 0x20,
    V21 = 0x21,
    V30 = 0x30,
}

impl Version {
    /// True for the 3.0 wire layouts; 2.0 and 2.1 share the V2 layouts.
    pub fn is_v3(self) -> bool {
        self == Version::V30
    }

    pub fn min_packet_len(self) -> u32 {
        match self {
            Version::V20 | Version::V21 => CMPP2_PACKET_MIN,
            Version::V30 => CMPP3_PACKET_MIN,
        }
    }

    pub fn max_packet_len(self) -> u32 {
        match self {
            Version::V20 | Version::V21 => CMPP2_PACKET_MAX,
            Version::V30 => CMPP3_PACKET_MAX,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Version::V20 => "cmpp20",
            Version::V21 => "cmpp21",
            Version::V30 => "cmpp30",
        };
        f.write_str(s)
    }
}
