//! SMB2 Set Info messages and the information classes the client sends

use super::common::{ensure_len, expect_structure_size, header_relative, FileId, SmbMessage};
use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{structure_size, SMB2_HEADER_SIZE};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Information type for Query/Set Info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InfoType {
    File = 0x01,
    Filesystem = 0x02,
    Security = 0x03,
    Quota = 0x04,
}

impl TryFrom<u8> for InfoType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(InfoType::File),
            0x02 => Ok(InfoType::Filesystem),
            0x03 => Ok(InfoType::Security),
            0x04 => Ok(InfoType::Quota),
            _ => Err(Error::InvalidParameter(format!(
                "Invalid info type: 0x{:02x}",
                value
            ))),
        }
    }
}

/// File information classes (MS-FSCC 2.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileInfoClass {
    DirectoryInformation = 0x01,
    FullDirectoryInformation = 0x02,
    BothDirectoryInformation = 0x03,
    BasicInformation = 0x04,
    StandardInformation = 0x05,
    DispositionInformation = 0x0D,
    EndOfFileInformation = 0x14,
}

impl TryFrom<u8> for FileInfoClass {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(FileInfoClass::DirectoryInformation),
            0x02 => Ok(FileInfoClass::FullDirectoryInformation),
            0x03 => Ok(FileInfoClass::BothDirectoryInformation),
            0x04 => Ok(FileInfoClass::BasicInformation),
            0x05 => Ok(FileInfoClass::StandardInformation),
            0x0D => Ok(FileInfoClass::DispositionInformation),
            0x14 => Ok(FileInfoClass::EndOfFileInformation),
            _ => Err(Error::InvalidParameter(format!(
                "Unsupported file info class: 0x{:02x}",
                value
            ))),
        }
    }
}

/// FileEndOfFileInformation: the new size as 8 little-endian bytes
pub fn end_of_file_information(size: u64) -> Vec<u8> {
    size.to_le_bytes().to_vec()
}

/// FileDispositionInformation: a single DeletePending byte
pub fn disposition_information(delete_pending: bool) -> Vec<u8> {
    vec![u8::from(delete_pending)]
}

/// SMB2 SET_INFO Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2SetInfoRequest {
    pub info_type: InfoType,
    pub file_info_class: FileInfoClass,
    pub additional_information: u32,
    pub file_id: FileId,
    pub buffer: Vec<u8>,
}

impl Smb2SetInfoRequest {
    const BUFFER_OFFSET: u16 = (SMB2_HEADER_SIZE + 32) as u16;

    pub fn file(file_id: FileId, file_info_class: FileInfoClass, buffer: Vec<u8>) -> Self {
        Self {
            info_type: InfoType::File,
            file_info_class,
            additional_information: 0,
            file_id,
            buffer,
        }
    }
}

impl SmbMessage for Smb2SetInfoRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 32, "SetInfo request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::SET_INFO_REQUEST, "set info request")?;

        let info_type = InfoType::try_from(cursor.read_u8()?)?;
        let file_info_class = FileInfoClass::try_from(cursor.read_u8()?)?;
        let buffer_length = cursor.read_u32::<LittleEndian>()?;
        let buffer_offset = cursor.read_u16::<LittleEndian>()?;
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let additional_information = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;

        let buffer = header_relative(
            buf,
            buffer_offset as usize,
            buffer_length as usize,
            "SetInfo buffer",
        )?
        .to_vec();

        Ok(Self {
            info_type,
            file_info_class,
            additional_information,
            file_id,
            buffer,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(32 + self.buffer.len());
        buf.write_u16::<LittleEndian>(structure_size::SET_INFO_REQUEST)?;
        buf.write_u8(self.info_type as u8)?;
        buf.write_u8(self.file_info_class as u8)?;
        buf.write_u32::<LittleEndian>(self.buffer.len() as u32)?;
        buf.write_u16::<LittleEndian>(Self::BUFFER_OFFSET)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.additional_information)?;
        self.file_id.write_to(&mut buf)?;
        buf.extend_from_slice(&self.buffer);
        Ok(buf)
    }
}

/// SMB2 SET_INFO Response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Smb2SetInfoResponse;

impl SmbMessage for Smb2SetInfoResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 2, "SetInfo response")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::SET_INFO_RESPONSE, "set info response")?;
        Ok(Self)
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(structure_size::SET_INFO_RESPONSE.to_le_bytes().to_vec())
    }
}
