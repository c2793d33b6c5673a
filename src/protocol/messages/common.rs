//! Common types and helpers for SMB2 message bodies

use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{structure_size, SMB2_HEADER_SIZE};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// SMB2 message bodies that can be parsed from and serialized to bytes.
///
/// `buf` always starts right after the 64-byte header.
pub trait SmbMessage: Sized {
    /// Parse message from bytes
    fn parse(buf: &[u8]) -> Result<Self>;

    /// Serialize message to bytes
    fn serialize(&self) -> Result<Vec<u8>>;
}

/// Read the StructureSize field and reject anything unexpected
pub(crate) fn expect_structure_size(
    cursor: &mut Cursor<&[u8]>,
    expected: u16,
    what: &str,
) -> Result<()> {
    let found = cursor.read_u16::<LittleEndian>()?;
    if found != expected {
        return Err(Error::ParseError(format!(
            "Invalid {} structure size: {}",
            what, found
        )));
    }
    Ok(())
}

/// Require at least `need` body bytes
pub(crate) fn ensure_len(buf: &[u8], need: usize, what: &str) -> Result<()> {
    if buf.len() < need {
        return Err(Error::ParseError(format!(
            "{} too short: {} bytes, need {}",
            what,
            buf.len(),
            need
        )));
    }
    Ok(())
}

/// Variable-length buffer addressed by a header-relative offset
pub(crate) fn header_relative<'a>(
    buf: &'a [u8],
    offset: usize,
    length: usize,
    what: &str,
) -> Result<&'a [u8]> {
    if length == 0 {
        return Ok(&[]);
    }
    let start = offset.checked_sub(SMB2_HEADER_SIZE).ok_or_else(|| {
        Error::ParseError(format!("{} offset {} points into the header", what, offset))
    })?;
    let end = start + length;
    buf.get(start..end).ok_or_else(|| {
        Error::ParseError(format!(
            "{} buffer {}..{} outside body of {} bytes",
            what,
            start,
            end,
            buf.len()
        ))
    })
}

/// UTF-16LE encoding used for every SMB2 path
pub fn utf16le_encode(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

/// Lossy UTF-16LE decoding
pub fn utf16le_decode(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// File ID for SMB2 operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId {
    pub persistent: u64,
    pub volatile: u64,
}

impl FileId {
    pub fn new(persistent: u64, volatile: u64) -> Self {
        Self {
            persistent,
            volatile,
        }
    }

    pub(crate) fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let persistent = cursor.read_u64::<LittleEndian>()?;
        let volatile = cursor.read_u64::<LittleEndian>()?;
        Ok(Self::new(persistent, volatile))
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u64::<LittleEndian>(self.persistent)?;
        buf.write_u64::<LittleEndian>(self.volatile)?;
        Ok(())
    }
}

/// SMB2 ERROR response body sent with failure statuses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Smb2ErrorResponse {
    pub error_data: Vec<u8>,
}

impl SmbMessage for Smb2ErrorResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 8, "Error response")?;
        let mut cursor = Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::ERROR_RESPONSE, "error response")?;
        let _error_context_count = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        let byte_count = cursor.read_u32::<LittleEndian>()? as usize;
        let error_data = buf.get(8..8 + byte_count).unwrap_or_default().to_vec();
        Ok(Self { error_data })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(9 + self.error_data.len());
        buf.write_u16::<LittleEndian>(structure_size::ERROR_RESPONSE)?;
        buf.write_u8(0)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.error_data.len() as u32)?;
        if self.error_data.is_empty() {
            buf.push(0);
        } else {
            buf.extend_from_slice(&self.error_data);
        }
        Ok(buf)
    }
}
