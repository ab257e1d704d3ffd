//! Wire protocol shared with the simulation engine.
//!
//! Every message exchanged with the engine starts with a one-byte [`MessageTag`].
//! The tag set is closed: a byte that does not map to a known tag means the two
//! sides disagree on framing, and decoding cannot continue.

pub mod codec;

pub use codec::{ByteOrder, WireReader, WireWriter};

use serde::{Deserialize, Serialize};

/// One-byte message discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageTag {
    /// Engine to client: calibration table follows.
    Configure = 0,
    /// Client to engine: requested sampling period follows.
    SetSamplingPeriod = 1,
    /// Engine to client: roll/pitch/yaw follows.
    InertialUnitData = 2,
    /// Engine to client: angular velocity follows.
    GyroData = 3,
}

impl MessageTag {
    /// Map a raw tag byte back to a tag, `None` if the byte is not part of the protocol.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MessageTag::Configure),
            1 => Some(MessageTag::SetSamplingPeriod),
            2 => Some(MessageTag::InertialUnitData),
            3 => Some(MessageTag::GyroData),
            _ => None,
        }
    }

    /// Raw tag byte as written on the wire.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags_map_back() {
        for tag in [
            MessageTag::Configure,
            MessageTag::SetSamplingPeriod,
            MessageTag::InertialUnitData,
            MessageTag::GyroData,
        ] {
            assert_eq!(MessageTag::from_u8(tag.as_u8()), Some(tag));
        }
    }

    #[test]
    fn test_unknown_byte_is_rejected() {
        assert_eq!(MessageTag::from_u8(4), None);
        assert_eq!(MessageTag::from_u8(0xff), None);
    }
}
