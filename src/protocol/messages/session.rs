//! SMB2 Session Setup messages

use super::common::{ensure_len, expect_structure_size, header_relative, SmbMessage};
use crate::error::Result;
use crate::protocol::smb2_constants::{structure_size, SecurityMode, SMB2_HEADER_SIZE};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

bitflags! {
    /// SessionFlags of a session setup response
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionFlags: u16 {
        const IS_GUEST = 0x0001;
        const IS_NULL = 0x0002;
        const ENCRYPT_DATA = 0x0004;
    }
}

/// SMB2 SessionSetup Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2SessionSetupRequest {
    pub flags: u8,
    pub security_mode: SecurityMode,
    pub previous_session_id: u64,
    pub security_blob: Vec<u8>,
}

impl Smb2SessionSetupRequest {
    const SECURITY_BUFFER_OFFSET: u16 = (SMB2_HEADER_SIZE + 24) as u16;

    pub fn new(security_blob: Vec<u8>) -> Self {
        Self {
            flags: 0,
            security_mode: SecurityMode::SIGNING_ENABLED,
            previous_session_id: 0,
            security_blob,
        }
    }
}

impl SmbMessage for Smb2SessionSetupRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 24, "SessionSetup request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::SESSION_SETUP_REQUEST,
            "session setup request",
        )?;

        let flags = cursor.read_u8()?;
        let security_mode = SecurityMode::from_bits_truncate(u16::from(cursor.read_u8()?));
        let _capabilities = cursor.read_u32::<LittleEndian>()?;
        let _channel = cursor.read_u32::<LittleEndian>()?;
        let security_buffer_offset = cursor.read_u16::<LittleEndian>()?;
        let security_buffer_length = cursor.read_u16::<LittleEndian>()?;
        let previous_session_id = cursor.read_u64::<LittleEndian>()?;

        let security_blob = header_relative(
            buf,
            security_buffer_offset as usize,
            security_buffer_length as usize,
            "SessionSetup security",
        )?
        .to_vec();

        Ok(Self {
            flags,
            security_mode,
            previous_session_id,
            security_blob,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(24 + self.security_blob.len());
        buf.write_u16::<LittleEndian>(structure_size::SESSION_SETUP_REQUEST)?;
        buf.write_u8(self.flags)?;
        buf.write_u8(self.security_mode.bits() as u8)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(Self::SECURITY_BUFFER_OFFSET)?;
        buf.write_u16::<LittleEndian>(self.security_blob.len() as u16)?;
        buf.write_u64::<LittleEndian>(self.previous_session_id)?;
        buf.extend_from_slice(&self.security_blob);
        Ok(buf)
    }
}

/// SMB2 SessionSetup Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2SessionSetupResponse {
    pub session_flags: SessionFlags,
    pub security_blob: Vec<u8>,
}

impl Smb2SessionSetupResponse {
    const SECURITY_BUFFER_OFFSET: u16 = (SMB2_HEADER_SIZE + 8) as u16;

    pub fn new(security_blob: Vec<u8>) -> Self {
        Self {
            session_flags: SessionFlags::empty(),
            security_blob,
        }
    }
}

impl SmbMessage for Smb2SessionSetupResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 8, "SessionSetup response")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::SESSION_SETUP_RESPONSE,
            "session setup response",
        )?;

        let session_flags = SessionFlags::from_bits_truncate(cursor.read_u16::<LittleEndian>()?);
        let security_buffer_offset = cursor.read_u16::<LittleEndian>()?;
        let security_buffer_length = cursor.read_u16::<LittleEndian>()?;

        let security_blob = header_relative(
            buf,
            security_buffer_offset as usize,
            security_buffer_length as usize,
            "SessionSetup security",
        )?
        .to_vec();

        Ok(Self {
            session_flags,
            security_blob,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + self.security_blob.len());
        buf.write_u16::<LittleEndian>(structure_size::SESSION_SETUP_RESPONSE)?;
        buf.write_u16::<LittleEndian>(self.session_flags.bits())?;
        buf.write_u16::<LittleEndian>(Self::SECURITY_BUFFER_OFFSET)?;
        buf.write_u16::<LittleEndian>(self.security_blob.len() as u16)?;
        if self.security_blob.is_empty() {
            buf.push(0);
        } else {
            buf.extend_from_slice(&self.security_blob);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_setup_request_blob_offset() {
        let request = Smb2SessionSetupRequest::new(b"NTLMSSP\0blob".to_vec());
        let bytes = request.serialize().unwrap();
        assert_eq!(&bytes[12..14], &88u16.to_le_bytes());
        assert_eq!(&bytes[24..], b"NTLMSSP\0blob");
        assert_eq!(Smb2SessionSetupRequest::parse(&bytes).unwrap(), request);
    }

    #[test]
    fn test_session_setup_response_blob() {
        let response = Smb2SessionSetupResponse::new(vec![9, 8, 7]);
        let parsed = Smb2SessionSetupResponse::parse(&response.serialize().unwrap()).unwrap();
        assert_eq!(parsed.security_blob, vec![9, 8, 7]);
    }
}
