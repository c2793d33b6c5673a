//! NetBIOS session service framing
//!
//! SMB2 over direct TCP reuses the RFC 1002 session message header but
//! widens the length to 24 bits (MS-SMB2 2.1).

use crate::error::{Error, Result};
use bytes::BufMut;
use std::convert::TryFrom;

pub mod frame;

pub use frame::{encode_frame, FrameDecoder, Frames};

/// NetBIOS message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetBiosMessageType {
    SessionMessage = 0x00,
    SessionRequest = 0x81,
    PositiveResponse = 0x82,
    NegativeResponse = 0x83,
    RetargetResponse = 0x84,
    Keepalive = 0x85,
}

impl TryFrom<u8> for NetBiosMessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(NetBiosMessageType::SessionMessage),
            0x81 => Ok(NetBiosMessageType::SessionRequest),
            0x82 => Ok(NetBiosMessageType::PositiveResponse),
            0x83 => Ok(NetBiosMessageType::NegativeResponse),
            0x84 => Ok(NetBiosMessageType::RetargetResponse),
            0x85 => Ok(NetBiosMessageType::Keepalive),
            _ => Err(Error::InvalidMessage(format!(
                "Invalid NetBIOS message type: 0x{:02x}",
                value
            ))),
        }
    }
}

/// NetBIOS Session Service header (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetBiosHeader {
    /// Message type
    pub message_type: NetBiosMessageType,
    /// Length of the message payload (24 bits max)
    pub length: u32,
}

impl NetBiosHeader {
    /// Maximum payload length (24 bits)
    pub const MAX_LENGTH: u32 = 0x00FF_FFFF;

    /// Header size in bytes
    pub const SIZE: usize = 4;

    /// Create a new NetBIOS header
    pub fn new(message_type: NetBiosMessageType, length: u32) -> Result<Self> {
        if length > Self::MAX_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "NetBIOS length {} exceeds maximum {}",
                length,
                Self::MAX_LENGTH
            )));
        }
        Ok(Self {
            message_type,
            length,
        })
    }

    /// Create a session message header
    pub fn session_message(length: u32) -> Result<Self> {
        Self::new(NetBiosMessageType::SessionMessage, length)
    }

    /// Parse a NetBIOS header from bytes
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                need: Self::SIZE,
                have: buf.len(),
            });
        }

        let message_type = NetBiosMessageType::try_from(buf[0])?;

        // Byte 1 carries bits 16..24, bytes 2-3 the low 16 bits big-endian
        let length = (u32::from(buf[1]) << 16) | u32::from(u16::from_be_bytes([buf[2], buf[3]]));

        Ok(Self {
            message_type,
            length,
        })
    }

    /// Serialize the header to bytes
    pub fn to_bytes(&self) -> [u8; 4] {
        let low = (self.length & 0xFFFF) as u16;
        let mut bytes = [0u8; 4];
        bytes[0] = self.message_type as u8;
        bytes[1] = ((self.length >> 16) & 0xFF) as u8;
        bytes[2..4].copy_from_slice(&low.to_be_bytes());
        bytes
    }

    /// Write the header to a buffer
    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if buf.remaining_mut() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                need: Self::SIZE,
                have: buf.remaining_mut(),
            });
        }
        buf.put_slice(&self.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = NetBiosHeader::session_message(1234).unwrap();
        let bytes = header.to_bytes();
        let parsed = NetBiosHeader::parse(&bytes).unwrap();
        assert_eq!(header, parsed);
    }

    #[test]
    fn test_24_bit_length_layout() {
        let header = NetBiosHeader::session_message(0x01_2345).unwrap();
        assert_eq!(header.to_bytes(), [0x00, 0x01, 0x23, 0x45]);

        let parsed = NetBiosHeader::parse(&[0x00, 0xAB, 0xCD, 0xEF]).unwrap();
        assert_eq!(parsed.length, 0x00AB_CDEF);
        assert_eq!(parsed.message_type, NetBiosMessageType::SessionMessage);
    }

    #[test]
    fn test_max_length() {
        assert!(NetBiosHeader::session_message(NetBiosHeader::MAX_LENGTH).is_ok());
        assert!(NetBiosHeader::session_message(NetBiosHeader::MAX_LENGTH + 1).is_err());
    }

    #[test]
    fn test_unknown_message_type() {
        assert!(NetBiosHeader::parse(&[0x42, 0, 0, 0]).is_err());
        assert!(NetBiosHeader::parse(&[0x00, 0]).is_err());
    }
}
