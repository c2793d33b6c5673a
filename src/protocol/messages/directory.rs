//! SMB2 Query Directory messages

use super::common::{
    ensure_len, expect_structure_size, header_relative, utf16le_decode, utf16le_encode,
    FileId, SmbMessage,
};
use super::info::FileInfoClass;
use crate::error::Result;
use crate::protocol::smb2_constants::{structure_size, SMB2_HEADER_SIZE};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::Cursor;

/// SMB2 QUERY_DIRECTORY Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2QueryDirectoryRequest {
    pub file_information_class: FileInfoClass,
    pub flags: u8,
    pub file_index: u32,
    pub file_id: FileId,
    pub output_buffer_length: u32,
    /// Search pattern, `*` for everything
    pub file_name: String,
}

impl Smb2QueryDirectoryRequest {
    const NAME_OFFSET: u16 = (SMB2_HEADER_SIZE + 32) as u16;

    pub fn new(file_id: FileId, file_information_class: FileInfoClass, flags: u8) -> Self {
        Self {
            file_information_class,
            flags,
            file_index: 0,
            file_id,
            output_buffer_length: 0x10000,
            file_name: "*".to_string(),
        }
    }
}

impl SmbMessage for Smb2QueryDirectoryRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 32, "QueryDirectory request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::QUERY_DIRECTORY_REQUEST,
            "query directory request",
        )?;

        let file_information_class = FileInfoClass::try_from(cursor.read_u8()?)?;
        let flags = cursor.read_u8()?;
        let file_index = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let file_name_offset = cursor.read_u16::<LittleEndian>()?;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let output_buffer_length = cursor.read_u32::<LittleEndian>()?;

        let file_name = utf16le_decode(header_relative(
            buf,
            file_name_offset as usize,
            file_name_length as usize,
            "QueryDirectory pattern",
        )?);

        Ok(Self {
            file_information_class,
            flags,
            file_index,
            file_id,
            output_buffer_length,
            file_name,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let name_bytes = utf16le_encode(&self.file_name);
        let mut buf = Vec::with_capacity(32 + name_bytes.len());
        buf.write_u16::<LittleEndian>(structure_size::QUERY_DIRECTORY_REQUEST)?;
        buf.write_u8(self.file_information_class as u8)?;
        buf.write_u8(self.flags)?;
        buf.write_u32::<LittleEndian>(self.file_index)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u16::<LittleEndian>(Self::NAME_OFFSET)?;
        buf.write_u16::<LittleEndian>(name_bytes.len() as u16)?;
        buf.write_u32::<LittleEndian>(self.output_buffer_length)?;
        if name_bytes.is_empty() {
            buf.push(0);
        } else {
            buf.extend_from_slice(&name_bytes);
        }
        Ok(buf)
    }
}

/// SMB2 QUERY_DIRECTORY Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2QueryDirectoryResponse {
    /// Packed information-class entries
    pub output_buffer: Bytes,
}

impl Smb2QueryDirectoryResponse {
    const BUFFER_OFFSET: u16 = (SMB2_HEADER_SIZE + 8) as u16;

    pub fn new(output_buffer: impl Into<Bytes>) -> Self {
        Self {
            output_buffer: output_buffer.into(),
        }
    }

    /// Parse without copying the entries out of the received frame
    pub fn parse_shared(buf: &Bytes) -> Result<Self> {
        ensure_len(buf, 8, "QueryDirectory response")?;
        let mut cursor = Cursor::new(buf.as_ref());
        expect_structure_size(
            &mut cursor,
            structure_size::QUERY_DIRECTORY_RESPONSE,
            "query directory response",
        )?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        let length = cursor.read_u32::<LittleEndian>()?;

        let entries = header_relative(buf, offset as usize, length as usize, "QueryDirectory")?;
        Ok(Self {
            output_buffer: buf.slice_ref(entries),
        })
    }
}

impl SmbMessage for Smb2QueryDirectoryResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        Self::parse_shared(&Bytes::copy_from_slice(buf))
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + self.output_buffer.len());
        buf.write_u16::<LittleEndian>(structure_size::QUERY_DIRECTORY_RESPONSE)?;
        buf.write_u16::<LittleEndian>(Self::BUFFER_OFFSET)?;
        buf.write_u32::<LittleEndian>(self.output_buffer.len() as u32)?;
        if self.output_buffer.is_empty() {
            buf.push(0);
        } else {
            buf.extend_from_slice(&self.output_buffer);
        }
        Ok(buf)
    }
}
