//! SMB2 Tree Connect messages

use super::common::{
    ensure_len, expect_structure_size, header_relative, utf16le_decode, utf16le_encode,
    SmbMessage,
};
use crate::error::Result;
use crate::protocol::smb2_constants::{share_type, structure_size, SMB2_HEADER_SIZE};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// SMB2 TreeConnect Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2TreeConnectRequest {
    /// Full `\\server\share` path
    pub path: String,
}

impl Smb2TreeConnectRequest {
    const PATH_OFFSET: u16 = (SMB2_HEADER_SIZE + 8) as u16;

    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl SmbMessage for Smb2TreeConnectRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 8, "TreeConnect request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::TREE_CONNECT_REQUEST,
            "tree connect request",
        )?;

        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let path_offset = cursor.read_u16::<LittleEndian>()?;
        let path_length = cursor.read_u16::<LittleEndian>()?;
        let path = utf16le_decode(header_relative(
            buf,
            path_offset as usize,
            path_length as usize,
            "TreeConnect path",
        )?);

        Ok(Self { path })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let path_bytes = utf16le_encode(&self.path);
        let mut buf = Vec::with_capacity(8 + path_bytes.len());
        buf.write_u16::<LittleEndian>(structure_size::TREE_CONNECT_REQUEST)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(Self::PATH_OFFSET)?;
        buf.write_u16::<LittleEndian>(path_bytes.len() as u16)?;
        buf.extend_from_slice(&path_bytes);
        Ok(buf)
    }
}

/// SMB2 TreeConnect Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2TreeConnectResponse {
    pub share_type: u8,
    pub share_flags: u32,
    pub capabilities: u32,
    pub maximal_access: u32,
}

impl Smb2TreeConnectResponse {
    pub fn disk(maximal_access: u32) -> Self {
        Self {
            share_type: share_type::DISK,
            share_flags: 0,
            capabilities: 0,
            maximal_access,
        }
    }
}

impl SmbMessage for Smb2TreeConnectResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 16, "TreeConnect response")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::TREE_CONNECT_RESPONSE,
            "tree connect response",
        )?;

        let share_type = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        let share_flags = cursor.read_u32::<LittleEndian>()?;
        let capabilities = cursor.read_u32::<LittleEndian>()?;
        let maximal_access = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            share_type,
            share_flags,
            capabilities,
            maximal_access,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16);
        buf.write_u16::<LittleEndian>(structure_size::TREE_CONNECT_RESPONSE)?;
        buf.write_u8(self.share_type)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.share_flags)?;
        buf.write_u32::<LittleEndian>(self.capabilities)?;
        buf.write_u32::<LittleEndian>(self.maximal_access)?;
        Ok(buf)
    }
}
