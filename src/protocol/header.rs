//! SMB2 sync header and message correlation key

use super::smb2_constants::*;
use crate::error::{Error, NtStatus, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Read};

/// SMB2 Header structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2Header {
    pub credit_charge: u16,
    pub status: u32,
    pub command: Smb2Command,
    pub credit: u16,
    pub flags: Smb2HeaderFlags,
    pub next_command: u32,
    pub message_id: u64,
    /// Reserved/ProcessId in sync headers, low half of AsyncId otherwise
    pub process_id: u32,
    pub tree_id: u32,
    pub session_id: u64,
    pub signature: [u8; 16],
}

impl Smb2Header {
    pub const SIZE: usize = SMB2_HEADER_SIZE;

    pub fn new(command: Smb2Command) -> Self {
        Self {
            credit_charge: 0,
            status: 0,
            command,
            credit: 1,
            flags: Smb2HeaderFlags::empty(),
            next_command: 0,
            message_id: 0,
            process_id: 0,
            tree_id: 0,
            session_id: 0,
            signature: [0; 16],
        }
    }

    /// Header for a server reply to `request`
    pub fn response_to(request: &Smb2Header, status: NtStatus) -> Self {
        Self {
            status: status.to_u32(),
            flags: Smb2HeaderFlags::SERVER_TO_REDIR,
            credit: request.credit.max(1),
            ..request.clone()
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                need: Self::SIZE,
                have: buf.len(),
            });
        }

        if buf[0..4] != SMB2_MAGIC {
            return Err(Error::InvalidHeader(format!(
                "Invalid SMB2 magic: {:02x?}",
                &buf[0..4]
            )));
        }

        let mut cursor = Cursor::new(&buf[4..Self::SIZE]);
        let structure_size = cursor.read_u16::<LittleEndian>()?;
        if structure_size != structure_size::HEADER {
            return Err(Error::InvalidHeader(format!(
                "Invalid header structure size: {}",
                structure_size
            )));
        }

        let credit_charge = cursor.read_u16::<LittleEndian>()?;
        let status = cursor.read_u32::<LittleEndian>()?;
        let command = Smb2Command::try_from(cursor.read_u16::<LittleEndian>()?)?;
        let credit = cursor.read_u16::<LittleEndian>()?;
        let flags = Smb2HeaderFlags::from_bits_truncate(cursor.read_u32::<LittleEndian>()?);
        let next_command = cursor.read_u32::<LittleEndian>()?;
        let message_id = cursor.read_u64::<LittleEndian>()?;
        let process_id = cursor.read_u32::<LittleEndian>()?;
        let tree_id = cursor.read_u32::<LittleEndian>()?;
        let session_id = cursor.read_u64::<LittleEndian>()?;
        let mut signature = [0u8; 16];
        cursor.read_exact(&mut signature)?;

        Ok(Self {
            credit_charge,
            status,
            command,
            credit,
            flags,
            next_command,
            message_id,
            process_id,
            tree_id,
            session_id,
            signature,
        })
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&SMB2_MAGIC);
        buf.write_u16::<LittleEndian>(structure_size::HEADER)?;
        buf.write_u16::<LittleEndian>(self.credit_charge)?;
        buf.write_u32::<LittleEndian>(self.status)?;
        buf.write_u16::<LittleEndian>(self.command as u16)?;
        buf.write_u16::<LittleEndian>(self.credit)?;
        buf.write_u32::<LittleEndian>(self.flags.bits())?;
        buf.write_u32::<LittleEndian>(self.next_command)?;
        buf.write_u64::<LittleEndian>(self.message_id)?;
        buf.write_u32::<LittleEndian>(self.process_id)?;
        buf.write_u32::<LittleEndian>(self.tree_id)?;
        buf.write_u64::<LittleEndian>(self.session_id)?;
        buf.extend_from_slice(&self.signature);
        Ok(())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn status(&self) -> NtStatus {
        NtStatus::from_u32(self.status)
    }

    pub fn is_response(&self) -> bool {
        self.flags.contains(Smb2HeaderFlags::SERVER_TO_REDIR)
    }

    pub fn is_async(&self) -> bool {
        self.flags.contains(Smb2HeaderFlags::ASYNC_COMMAND)
    }

    /// Interim `STATUS_PENDING` reply; the final one reuses the message id
    pub fn is_interim(&self) -> bool {
        self.is_async() && self.status() == NtStatus::Pending
    }

    pub fn key(&self) -> MessageKey {
        MessageKey::from_message_id(self.message_id)
    }
}

/// Correlation key: the low 32 bits of a 64-bit message id.
///
/// Displays as the hex of its little-endian bytes, which is how the id
/// appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey(u32);

impl MessageKey {
    pub fn from_message_id(message_id: u64) -> Self {
        Self((message_id & 0xFFFF_FFFF) as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.to_le_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
