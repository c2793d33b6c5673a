//! SMB2 Negotiate messages

use super::common::{ensure_len, expect_structure_size, header_relative, SmbMessage};
use crate::error::Result;
use crate::protocol::smb2_constants::{
    structure_size, SecurityMode, Smb2Capabilities, Smb2Dialect, SMB2_HEADER_SIZE,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use uuid::Uuid;

/// SMB2 Negotiate Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2NegotiateRequest {
    pub security_mode: SecurityMode,
    pub capabilities: Smb2Capabilities,
    pub client_guid: Uuid,
    pub dialects: Vec<Smb2Dialect>,
}

impl Smb2NegotiateRequest {
    pub fn new(dialects: Vec<Smb2Dialect>, client_guid: Uuid) -> Self {
        Self {
            security_mode: SecurityMode::SIGNING_ENABLED,
            capabilities: Smb2Capabilities::empty(),
            client_guid,
            dialects,
        }
    }
}

impl SmbMessage for Smb2NegotiateRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 36, "Negotiate request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::NEGOTIATE_REQUEST,
            "negotiate request",
        )?;

        let dialect_count = cursor.read_u16::<LittleEndian>()?;
        let security_mode = SecurityMode::from_bits_truncate(cursor.read_u16::<LittleEndian>()?);
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let capabilities = Smb2Capabilities::from_bits_truncate(cursor.read_u32::<LittleEndian>()?);

        let mut guid_bytes = [0u8; 16];
        cursor.read_exact(&mut guid_bytes)?;
        let client_guid = Uuid::from_bytes(guid_bytes);
        let _client_start_time = cursor.read_u64::<LittleEndian>()?;

        // Unknown dialects are skipped rather than rejected
        let mut dialects = Vec::with_capacity(dialect_count as usize);
        for _ in 0..dialect_count {
            if let Ok(dialect) = Smb2Dialect::try_from(cursor.read_u16::<LittleEndian>()?) {
                dialects.push(dialect);
            }
        }

        Ok(Self {
            security_mode,
            capabilities,
            client_guid,
            dialects,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(36 + self.dialects.len() * 2);
        buf.write_u16::<LittleEndian>(structure_size::NEGOTIATE_REQUEST)?;
        buf.write_u16::<LittleEndian>(self.dialects.len() as u16)?;
        buf.write_u16::<LittleEndian>(self.security_mode.bits())?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.capabilities.bits())?;
        buf.extend_from_slice(self.client_guid.as_bytes());
        buf.write_u64::<LittleEndian>(0)?;
        for dialect in &self.dialects {
            buf.write_u16::<LittleEndian>(*dialect as u16)?;
        }
        Ok(buf)
    }
}

/// SMB2 Negotiate Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2NegotiateResponse {
    pub security_mode: SecurityMode,
    pub dialect_revision: Smb2Dialect,
    pub server_guid: Uuid,
    pub capabilities: Smb2Capabilities,
    pub max_transact_size: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
    pub system_time: u64,
    pub server_start_time: u64,
    pub security_blob: Vec<u8>,
}

impl Smb2NegotiateResponse {
    /// Security buffer starts right after the fixed part
    const SECURITY_BUFFER_OFFSET: u16 = (SMB2_HEADER_SIZE + 64) as u16;

    pub fn new(dialect: Smb2Dialect) -> Self {
        Self {
            security_mode: SecurityMode::SIGNING_ENABLED,
            dialect_revision: dialect,
            server_guid: Uuid::new_v4(),
            capabilities: Smb2Capabilities::empty(),
            max_transact_size: 65536,
            max_read_size: 65536,
            max_write_size: 65536,
            system_time: 0,
            server_start_time: 0,
            security_blob: Vec::new(),
        }
    }
}

impl SmbMessage for Smb2NegotiateResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 64, "Negotiate response")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::NEGOTIATE_RESPONSE,
            "negotiate response",
        )?;

        let security_mode = SecurityMode::from_bits_truncate(cursor.read_u16::<LittleEndian>()?);
        let dialect_revision = Smb2Dialect::try_from(cursor.read_u16::<LittleEndian>()?)?;
        let _negotiate_context_count = cursor.read_u16::<LittleEndian>()?;

        let mut guid_bytes = [0u8; 16];
        cursor.read_exact(&mut guid_bytes)?;
        let server_guid = Uuid::from_bytes(guid_bytes);

        let capabilities = Smb2Capabilities::from_bits_truncate(cursor.read_u32::<LittleEndian>()?);
        let max_transact_size = cursor.read_u32::<LittleEndian>()?;
        let max_read_size = cursor.read_u32::<LittleEndian>()?;
        let max_write_size = cursor.read_u32::<LittleEndian>()?;
        let system_time = cursor.read_u64::<LittleEndian>()?;
        let server_start_time = cursor.read_u64::<LittleEndian>()?;
        let security_buffer_offset = cursor.read_u16::<LittleEndian>()?;
        let security_buffer_length = cursor.read_u16::<LittleEndian>()?;

        let security_blob = header_relative(
            buf,
            security_buffer_offset as usize,
            security_buffer_length as usize,
            "Negotiate security",
        )?
        .to_vec();

        Ok(Self {
            security_mode,
            dialect_revision,
            server_guid,
            capabilities,
            max_transact_size,
            max_read_size,
            max_write_size,
            system_time,
            server_start_time,
            security_blob,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64 + self.security_blob.len());
        buf.write_u16::<LittleEndian>(structure_size::NEGOTIATE_RESPONSE)?;
        buf.write_u16::<LittleEndian>(self.security_mode.bits())?;
        buf.write_u16::<LittleEndian>(self.dialect_revision as u16)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.extend_from_slice(self.server_guid.as_bytes());
        buf.write_u32::<LittleEndian>(self.capabilities.bits())?;
        buf.write_u32::<LittleEndian>(self.max_transact_size)?;
        buf.write_u32::<LittleEndian>(self.max_read_size)?;
        buf.write_u32::<LittleEndian>(self.max_write_size)?;
        buf.write_u64::<LittleEndian>(self.system_time)?;
        buf.write_u64::<LittleEndian>(self.server_start_time)?;
        buf.write_u16::<LittleEndian>(Self::SECURITY_BUFFER_OFFSET)?;
        buf.write_u16::<LittleEndian>(self.security_blob.len() as u16)?;
        buf.write_u32::<LittleEndian>(0)?;
        if self.security_blob.is_empty() {
            buf.push(0);
        } else {
            buf.extend_from_slice(&self.security_blob);
        }
        Ok(buf)
    }
}
