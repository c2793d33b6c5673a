//! A decoded SMB2 message: header plus the command body that follows it

use super::header::{MessageKey, Smb2Header};
use super::smb2_constants::Smb2Command;
use crate::error::{NtStatus, Result};
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Smb2Header,
    body: Bytes,
}

impl Message {
    pub fn new(header: Smb2Header, body: impl Into<Bytes>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// Split a frame payload into header and body without copying the body
    pub fn parse(frame: Bytes) -> Result<Self> {
        let header = Smb2Header::parse(&frame)?;
        let body = frame.slice(Smb2Header::SIZE..);
        Ok(Self { header, body })
    }

    pub fn header(&self) -> &Smb2Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Smb2Header {
        &mut self.header
    }

    /// Body bytes; offsets inside SMB2 bodies count from the header start
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn command(&self) -> Smb2Command {
        self.header.command
    }

    pub fn status(&self) -> NtStatus {
        self.header.status()
    }

    pub fn key(&self) -> MessageKey {
        self.header.key()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Smb2Header::SIZE + self.body.len());
        self.header.write_to(&mut buf)?;
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }
}
