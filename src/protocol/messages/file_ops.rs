//! SMB2 file operation messages (Create, Close, Read, Write)

use super::common::{
    ensure_len, expect_structure_size, header_relative, utf16le_decode, utf16le_encode,
    FileId, SmbMessage,
};
use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{
    create_action, impersonation_level, oplock_level, structure_size, CreateDisposition,
    CreateOptions, DesiredAccess, FileAttributes, ShareAccess, SMB2_HEADER_SIZE,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::Cursor;

/// SMB2 Create Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2CreateRequest {
    pub requested_oplock_level: u8,
    pub impersonation_level: u32,
    pub desired_access: DesiredAccess,
    pub file_attributes: FileAttributes,
    pub share_access: ShareAccess,
    pub create_disposition: CreateDisposition,
    pub create_options: CreateOptions,
    /// Share-relative path, backslash separated, empty for the share root
    pub file_name: String,
}

impl Smb2CreateRequest {
    const NAME_OFFSET: u16 = (SMB2_HEADER_SIZE + 56) as u16;

    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            requested_oplock_level: oplock_level::NONE,
            impersonation_level: impersonation_level::IMPERSONATION,
            desired_access: DesiredAccess::FILE_GENERIC_READ,
            file_attributes: FileAttributes::empty(),
            share_access: ShareAccess::FILE_SHARE_ALL,
            create_disposition: CreateDisposition::Open,
            create_options: CreateOptions::empty(),
            file_name: file_name.into(),
        }
    }
}

impl SmbMessage for Smb2CreateRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 56, "Create request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::CREATE_REQUEST, "create request")?;

        let _security_flags = cursor.read_u8()?;
        let requested_oplock_level = cursor.read_u8()?;
        let impersonation_level = cursor.read_u32::<LittleEndian>()?;
        let _smb_create_flags = cursor.read_u64::<LittleEndian>()?;
        let _reserved = cursor.read_u64::<LittleEndian>()?;
        let desired_access = DesiredAccess::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let file_attributes = FileAttributes::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let share_access = ShareAccess::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let create_disposition = CreateDisposition::try_from(cursor.read_u32::<LittleEndian>()?)?;
        let create_options = CreateOptions::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let name_offset = cursor.read_u16::<LittleEndian>()?;
        let name_length = cursor.read_u16::<LittleEndian>()?;

        let file_name = utf16le_decode(header_relative(
            buf,
            name_offset as usize,
            name_length as usize,
            "Create name",
        )?);

        Ok(Self {
            requested_oplock_level,
            impersonation_level,
            desired_access,
            file_attributes,
            share_access,
            create_disposition,
            create_options,
            file_name,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let name_bytes = utf16le_encode(&self.file_name);
        let mut buf = Vec::with_capacity(57 + name_bytes.len());
        buf.write_u16::<LittleEndian>(structure_size::CREATE_REQUEST)?;
        buf.write_u8(0)?;
        buf.write_u8(self.requested_oplock_level)?;
        buf.write_u32::<LittleEndian>(self.impersonation_level)?;
        buf.write_u64::<LittleEndian>(0)?;
        buf.write_u64::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.desired_access.bits())?;
        buf.write_u32::<LittleEndian>(self.file_attributes.bits())?;
        buf.write_u32::<LittleEndian>(self.share_access.bits())?;
        buf.write_u32::<LittleEndian>(self.create_disposition as u32)?;
        buf.write_u32::<LittleEndian>(self.create_options.bits())?;
        buf.write_u16::<LittleEndian>(Self::NAME_OFFSET)?;
        buf.write_u16::<LittleEndian>(name_bytes.len() as u16)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        // The variable part must be at least one byte, even for the share root
        if name_bytes.is_empty() {
            buf.push(0);
        } else {
            buf.extend_from_slice(&name_bytes);
        }
        Ok(buf)
    }
}

/// SMB2 Create Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2CreateResponse {
    pub oplock_level: u8,
    pub create_action: u32,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub allocation_size: u64,
    pub end_of_file: u64,
    pub file_attributes: FileAttributes,
    pub file_id: FileId,
}

impl Smb2CreateResponse {
    pub fn new(file_id: FileId) -> Self {
        Self {
            oplock_level: oplock_level::NONE,
            create_action: create_action::OPENED,
            creation_time: 0,
            last_access_time: 0,
            last_write_time: 0,
            change_time: 0,
            allocation_size: 0,
            end_of_file: 0,
            file_attributes: FileAttributes::NORMAL,
            file_id,
        }
    }
}

impl SmbMessage for Smb2CreateResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 88, "Create response")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::CREATE_RESPONSE, "create response")?;

        let oplock_level = cursor.read_u8()?;
        let _flags = cursor.read_u8()?;
        let create_action = cursor.read_u32::<LittleEndian>()?;
        let creation_time = cursor.read_u64::<LittleEndian>()?;
        let last_access_time = cursor.read_u64::<LittleEndian>()?;
        let last_write_time = cursor.read_u64::<LittleEndian>()?;
        let change_time = cursor.read_u64::<LittleEndian>()?;
        let allocation_size = cursor.read_u64::<LittleEndian>()?;
        let end_of_file = cursor.read_u64::<LittleEndian>()?;
        let file_attributes =
            FileAttributes::from_bits_truncate(cursor.read_u32::<LittleEndian>()?);
        let _reserved = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;

        Ok(Self {
            oplock_level,
            create_action,
            creation_time,
            last_access_time,
            last_write_time,
            change_time,
            allocation_size,
            end_of_file,
            file_attributes,
            file_id,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(89);
        buf.write_u16::<LittleEndian>(structure_size::CREATE_RESPONSE)?;
        buf.write_u8(self.oplock_level)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.create_action)?;
        buf.write_u64::<LittleEndian>(self.creation_time)?;
        buf.write_u64::<LittleEndian>(self.last_access_time)?;
        buf.write_u64::<LittleEndian>(self.last_write_time)?;
        buf.write_u64::<LittleEndian>(self.change_time)?;
        buf.write_u64::<LittleEndian>(self.allocation_size)?;
        buf.write_u64::<LittleEndian>(self.end_of_file)?;
        buf.write_u32::<LittleEndian>(self.file_attributes.bits())?;
        buf.write_u32::<LittleEndian>(0)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.push(0);
        Ok(buf)
    }
}

/// SMB2 Close Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2CloseRequest {
    pub flags: u16,
    pub file_id: FileId,
}

impl Smb2CloseRequest {
    pub fn new(file_id: FileId) -> Self {
        Self { flags: 0, file_id }
    }
}

impl SmbMessage for Smb2CloseRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 24, "Close request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::CLOSE_REQUEST, "close request")?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let _reserved = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        Ok(Self { flags, file_id })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(24);
        buf.write_u16::<LittleEndian>(structure_size::CLOSE_REQUEST)?;
        buf.write_u16::<LittleEndian>(self.flags)?;
        buf.write_u32::<LittleEndian>(0)?;
        self.file_id.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// SMB2 Close Response. Attributes are only filled in when the request
/// asked for them, so only the structure is checked on parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Smb2CloseResponse {
    pub flags: u16,
    pub end_of_file: u64,
}

impl SmbMessage for Smb2CloseResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 60, "Close response")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::CLOSE_RESPONSE, "close response")?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        cursor.set_position(48);
        let end_of_file = cursor.read_u64::<LittleEndian>()?;
        Ok(Self { flags, end_of_file })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; 60];
        buf[0..2].copy_from_slice(&structure_size::CLOSE_RESPONSE.to_le_bytes());
        buf[2..4].copy_from_slice(&self.flags.to_le_bytes());
        buf[48..56].copy_from_slice(&self.end_of_file.to_le_bytes());
        Ok(buf)
    }
}

/// SMB2 Read Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2ReadRequest {
    pub length: u32,
    pub offset: u64,
    pub file_id: FileId,
    pub minimum_count: u32,
}

impl Smb2ReadRequest {
    pub fn new(file_id: FileId, offset: u64, length: u32) -> Self {
        Self {
            length,
            offset,
            file_id,
            minimum_count: 0,
        }
    }
}

impl SmbMessage for Smb2ReadRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 48, "Read request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::READ_REQUEST, "read request")?;
        let _padding = cursor.read_u8()?;
        let _flags = cursor.read_u8()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u64::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let minimum_count = cursor.read_u32::<LittleEndian>()?;
        Ok(Self {
            length,
            offset,
            file_id,
            minimum_count,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(49);
        buf.write_u16::<LittleEndian>(structure_size::READ_REQUEST)?;
        buf.write_u8(0)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.length)?;
        buf.write_u64::<LittleEndian>(self.offset)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(self.minimum_count)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.push(0);
        Ok(buf)
    }
}

/// SMB2 Read Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2ReadResponse {
    pub data: Bytes,
}

impl Smb2ReadResponse {
    const DATA_OFFSET: u8 = (SMB2_HEADER_SIZE + 16) as u8;

    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Parse without copying the payload out of the received frame
    pub fn parse_shared(buf: &Bytes) -> Result<Self> {
        ensure_len(buf, 16, "Read response")?;
        let mut cursor = Cursor::new(buf.as_ref());
        expect_structure_size(&mut cursor, structure_size::READ_RESPONSE, "read response")?;
        let data_offset = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        let data_length = cursor.read_u32::<LittleEndian>()?;

        let data = header_relative(buf, data_offset as usize, data_length as usize, "Read data")?;
        Ok(Self {
            data: buf.slice_ref(data),
        })
    }
}

impl SmbMessage for Smb2ReadResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        Self::parse_shared(&Bytes::copy_from_slice(buf))
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16 + self.data.len());
        buf.write_u16::<LittleEndian>(structure_size::READ_RESPONSE)?;
        buf.write_u8(Self::DATA_OFFSET)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.data.len() as u32)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }
}

/// SMB2 Write Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2WriteRequest {
    pub offset: u64,
    pub file_id: FileId,
    pub data: Bytes,
}

impl Smb2WriteRequest {
    const DATA_OFFSET: u16 = (SMB2_HEADER_SIZE + 48) as u16;

    pub fn new(file_id: FileId, offset: u64, data: impl Into<Bytes>) -> Self {
        Self {
            offset,
            file_id,
            data: data.into(),
        }
    }
}

impl SmbMessage for Smb2WriteRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 48, "Write request")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::WRITE_REQUEST, "write request")?;
        let data_offset = cursor.read_u16::<LittleEndian>()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u64::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;

        let data = header_relative(buf, data_offset as usize, length as usize, "Write data")?;
        Ok(Self {
            offset,
            file_id,
            data: Bytes::copy_from_slice(data),
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let length = u32::try_from(self.data.len())
            .map_err(|_| Error::InvalidParameter("write payload too large".into()))?;
        let mut buf = Vec::with_capacity(48 + self.data.len());
        buf.write_u16::<LittleEndian>(structure_size::WRITE_REQUEST)?;
        buf.write_u16::<LittleEndian>(Self::DATA_OFFSET)?;
        buf.write_u32::<LittleEndian>(length)?;
        buf.write_u64::<LittleEndian>(self.offset)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }
}

/// SMB2 Write Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2WriteResponse {
    pub count: u32,
}

impl SmbMessage for Smb2WriteResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 16, "Write response")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::WRITE_RESPONSE, "write response")?;
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let count = cursor.read_u32::<LittleEndian>()?;
        Ok(Self { count })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(17);
        buf.write_u16::<LittleEndian>(structure_size::WRITE_RESPONSE)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.count)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.push(0);
        Ok(buf)
    }
}
