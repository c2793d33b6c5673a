//! NTLMSSP message encoding and the client-side authentication context
//!
//! Tokens travel raw inside SESSION_SETUP security buffers (no SPNEGO
//! wrapping). Only NTLMv2 responses are produced.

use crate::auth::ntlm_crypto::{
    generate_client_challenge, lmv2_response, ntlmv2_hash, ntlmv2_response, windows_timestamp,
    NtlmV2Blob,
};
use crate::error::{Error, Result};
use crate::protocol::messages::common::{utf16le_decode, utf16le_encode};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use tracing::debug;

/// NTLM signature - "NTLMSSP\0"
pub const NTLMSSP_SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

/// NTLM message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NtlmMessageType {
    Negotiate = 0x00000001,
    Challenge = 0x00000002,
    Authenticate = 0x00000003,
}

impl TryFrom<u32> for NtlmMessageType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0x00000001 => Ok(Self::Negotiate),
            0x00000002 => Ok(Self::Challenge),
            0x00000003 => Ok(Self::Authenticate),
            _ => Err(Error::ParseError(format!(
                "Invalid NTLM message type: {}",
                value
            ))),
        }
    }
}

bitflags! {
    /// NTLM negotiation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NtlmFlags: u32 {
        const NEGOTIATE_UNICODE = 0x00000001;
        const NEGOTIATE_OEM = 0x00000002;
        const REQUEST_TARGET = 0x00000004;
        const NEGOTIATE_SIGN = 0x00000010;
        const NEGOTIATE_SEAL = 0x00000020;
        const NEGOTIATE_LM_KEY = 0x00000080;
        const NEGOTIATE_NTLM = 0x00000200;
        const NEGOTIATE_ANONYMOUS = 0x00000800;
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x00001000;
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x00002000;
        const NEGOTIATE_ALWAYS_SIGN = 0x00008000;
        const TARGET_TYPE_DOMAIN = 0x00010000;
        const TARGET_TYPE_SERVER = 0x00020000;
        const NEGOTIATE_EXTENDED_SESSIONSECURITY = 0x00080000;
        const NEGOTIATE_IDENTIFY = 0x00100000;
        const REQUEST_NON_NT_SESSION_KEY = 0x00400000;
        const NEGOTIATE_TARGET_INFO = 0x00800000;
        const NEGOTIATE_VERSION = 0x02000000;
        const NEGOTIATE_128 = 0x20000000;
        const NEGOTIATE_KEY_EXCH = 0x40000000;
        const NEGOTIATE_56 = 0x80000000;
    }
}

impl NtlmFlags {
    /// What this client asks for; no signing or sealing keys are derived
    pub fn client_default() -> Self {
        NtlmFlags::NEGOTIATE_UNICODE
            | NtlmFlags::REQUEST_TARGET
            | NtlmFlags::NEGOTIATE_NTLM
            | NtlmFlags::NEGOTIATE_ALWAYS_SIGN
            | NtlmFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY
            | NtlmFlags::NEGOTIATE_TARGET_INFO
            | NtlmFlags::NEGOTIATE_128
            | NtlmFlags::NEGOTIATE_56
    }
}

/// AV_PAIR ids inside the challenge target info
pub mod av_id {
    pub const EOL: u16 = 0x0000;
    pub const NB_COMPUTER_NAME: u16 = 0x0001;
    pub const NB_DOMAIN_NAME: u16 = 0x0002;
    pub const DNS_COMPUTER_NAME: u16 = 0x0003;
    pub const DNS_DOMAIN_NAME: u16 = 0x0004;
    pub const TIMESTAMP: u16 = 0x0007;
}

/// Walk the AV_PAIR list and return the value stored under `id`
pub fn find_av_pair(target_info: &[u8], id: u16) -> Option<&[u8]> {
    let mut rest = target_info;
    while rest.len() >= 4 {
        let av_id = u16::from_le_bytes([rest[0], rest[1]]);
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        if av_id == av_id::EOL {
            return None;
        }
        let value = rest.get(4..4 + len)?;
        if av_id == id {
            return Some(value);
        }
        rest = &rest[4 + len..];
    }
    None
}

/// Encode an AV_PAIR list terminated by MsvAvEOL
pub fn encode_av_pairs(pairs: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (id, value) in pairs {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
        out.extend_from_slice(value);
    }
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

/// Security buffer descriptor for NTLM messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityBuffer {
    pub length: u16,
    pub max_length: u16,
    /// Offset from the beginning of the NTLM message
    pub offset: u32,
}

impl SecurityBuffer {
    pub fn with_data(data_len: usize, offset: usize) -> Self {
        Self {
            length: data_len as u16,
            max_length: data_len as u16,
            offset: offset as u32,
        }
    }

    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let length = cursor.read_u16::<LittleEndian>()?;
        let max_length = cursor.read_u16::<LittleEndian>()?;
        let offset = cursor.read_u32::<LittleEndian>()?;
        Ok(Self {
            length,
            max_length,
            offset,
        })
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u16::<LittleEndian>(self.length)?;
        buf.write_u16::<LittleEndian>(self.max_length)?;
        buf.write_u32::<LittleEndian>(self.offset)?;
        Ok(())
    }

    pub fn extract_data<'a>(&self, message: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.offset as usize;
        let end = start + self.length as usize;
        message.get(start..end).ok_or_else(|| {
            Error::ParseError("Security buffer extends beyond message".into())
        })
    }
}

/// Lays out the payload section that follows a message's fixed part
struct PayloadWriter {
    fixed: Vec<u8>,
    payload: Vec<u8>,
    base: usize,
}

impl PayloadWriter {
    fn new(fixed_size: usize) -> Self {
        Self {
            fixed: Vec::with_capacity(fixed_size),
            payload: Vec::new(),
            base: fixed_size,
        }
    }

    fn buffer(&mut self, data: &[u8]) -> Result<()> {
        let descriptor = SecurityBuffer::with_data(data.len(), self.base + self.payload.len());
        self.payload.extend_from_slice(data);
        descriptor.write_to(&mut self.fixed)
    }

    fn finish(mut self) -> Vec<u8> {
        self.fixed.resize(self.base, 0);
        self.fixed.extend_from_slice(&self.payload);
        self.fixed
    }
}

fn read_header(cursor: &mut Cursor<&[u8]>, expected: NtlmMessageType) -> Result<()> {
    let mut signature = [0u8; 8];
    cursor.read_exact(&mut signature)?;
    if &signature != NTLMSSP_SIGNATURE {
        return Err(Error::ParseError("Invalid NTLM signature".into()));
    }
    let message_type = NtlmMessageType::try_from(cursor.read_u32::<LittleEndian>()?)?;
    if message_type != expected {
        return Err(Error::ParseError(format!(
            "Expected NTLM {:?} message, got {:?}",
            expected, message_type
        )));
    }
    Ok(())
}

/// NTLM Type 1 Message - Negotiate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtlmNegotiateMessage {
    pub flags: NtlmFlags,
}

impl NtlmNegotiateMessage {
    const FIXED_SIZE: usize = 32;

    pub fn new(flags: NtlmFlags) -> Self {
        Self { flags }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::FIXED_SIZE {
            return Err(Error::ParseError("NTLM negotiate message too short".into()));
        }
        let mut cursor = Cursor::new(data);
        read_header(&mut cursor, NtlmMessageType::Negotiate)?;
        let flags = NtlmFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        Ok(Self { flags })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = PayloadWriter::new(Self::FIXED_SIZE);
        writer.fixed.extend_from_slice(NTLMSSP_SIGNATURE);
        writer
            .fixed
            .write_u32::<LittleEndian>(NtlmMessageType::Negotiate as u32)?;
        writer.fixed.write_u32::<LittleEndian>(self.flags.bits())?;
        // Domain and workstation are not supplied
        writer.buffer(&[])?;
        writer.buffer(&[])?;
        Ok(writer.finish())
    }
}

/// NTLM Type 2 Message - Challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtlmChallengeMessage {
    pub flags: NtlmFlags,
    pub server_challenge: [u8; 8],
    pub target_name: String,
    pub target_info: Vec<u8>,
}

impl NtlmChallengeMessage {
    const FIXED_SIZE: usize = 48;

    pub fn new(target_name: impl Into<String>, server_challenge: [u8; 8]) -> Self {
        Self {
            flags: NtlmFlags::NEGOTIATE_UNICODE
                | NtlmFlags::NEGOTIATE_NTLM
                | NtlmFlags::TARGET_TYPE_DOMAIN
                | NtlmFlags::NEGOTIATE_TARGET_INFO
                | NtlmFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY,
            server_challenge,
            target_name: target_name.into(),
            target_info: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::FIXED_SIZE {
            return Err(Error::ParseError("NTLM challenge message too short".into()));
        }
        let mut cursor = Cursor::new(data);
        read_header(&mut cursor, NtlmMessageType::Challenge)?;

        let target_name = SecurityBuffer::parse(&mut cursor)?;
        // Servers set bits this client has no name for
        let flags = NtlmFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let mut server_challenge = [0u8; 8];
        cursor.read_exact(&mut server_challenge)?;
        let _reserved = cursor.read_u64::<LittleEndian>()?;
        let target_info = SecurityBuffer::parse(&mut cursor)?;

        let target_name = target_name.extract_data(data)?;
        let target_name = if flags.contains(NtlmFlags::NEGOTIATE_UNICODE) {
            utf16le_decode(target_name)
        } else {
            String::from_utf8_lossy(target_name).into_owned()
        };

        Ok(Self {
            flags,
            server_challenge,
            target_name,
            target_info: target_info.extract_data(data)?.to_vec(),
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = PayloadWriter::new(Self::FIXED_SIZE);
        writer.fixed.extend_from_slice(NTLMSSP_SIGNATURE);
        writer
            .fixed
            .write_u32::<LittleEndian>(NtlmMessageType::Challenge as u32)?;
        writer.buffer(&utf16le_encode(&self.target_name))?;
        writer.fixed.write_u32::<LittleEndian>(self.flags.bits())?;
        writer.fixed.extend_from_slice(&self.server_challenge);
        writer.fixed.write_u64::<LittleEndian>(0)?;
        writer.buffer(&self.target_info)?;
        Ok(writer.finish())
    }

    /// MsvAvTimestamp from the target info, if the server sent one
    pub fn timestamp(&self) -> Option<u64> {
        let raw = find_av_pair(&self.target_info, av_id::TIMESTAMP)?;
        let raw: [u8; 8] = raw.try_into().ok()?;
        Some(u64::from_le_bytes(raw))
    }
}

/// NTLM Type 3 Message - Authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtlmAuthenticateMessage {
    pub flags: NtlmFlags,
    pub lm_response: Vec<u8>,
    pub nt_response: Vec<u8>,
    pub domain: String,
    pub user_name: String,
    pub workstation: String,
    pub session_key: Vec<u8>,
}

impl NtlmAuthenticateMessage {
    const FIXED_SIZE: usize = 64;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::FIXED_SIZE {
            return Err(Error::ParseError(
                "NTLM authenticate message too short".into(),
            ));
        }
        let mut cursor = Cursor::new(data);
        read_header(&mut cursor, NtlmMessageType::Authenticate)?;

        let lm_response = SecurityBuffer::parse(&mut cursor)?;
        let nt_response = SecurityBuffer::parse(&mut cursor)?;
        let domain = SecurityBuffer::parse(&mut cursor)?;
        let user_name = SecurityBuffer::parse(&mut cursor)?;
        let workstation = SecurityBuffer::parse(&mut cursor)?;
        let session_key = SecurityBuffer::parse(&mut cursor)?;
        let flags = NtlmFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?);

        let text = |buffer: &SecurityBuffer| -> Result<String> {
            let bytes = buffer.extract_data(data)?;
            Ok(if flags.contains(NtlmFlags::NEGOTIATE_UNICODE) {
                utf16le_decode(bytes)
            } else {
                String::from_utf8_lossy(bytes).into_owned()
            })
        };

        Ok(Self {
            flags,
            lm_response: lm_response.extract_data(data)?.to_vec(),
            nt_response: nt_response.extract_data(data)?.to_vec(),
            domain: text(&domain)?,
            user_name: text(&user_name)?,
            workstation: text(&workstation)?,
            session_key: session_key.extract_data(data)?.to_vec(),
        })
    }

    /// Always encodes strings as UTF-16LE
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = PayloadWriter::new(Self::FIXED_SIZE);
        writer.fixed.extend_from_slice(NTLMSSP_SIGNATURE);
        writer
            .fixed
            .write_u32::<LittleEndian>(NtlmMessageType::Authenticate as u32)?;
        writer.buffer(&self.lm_response)?;
        writer.buffer(&self.nt_response)?;
        writer.buffer(&utf16le_encode(&self.domain))?;
        writer.buffer(&utf16le_encode(&self.user_name))?;
        writer.buffer(&utf16le_encode(&self.workstation))?;
        writer.buffer(&self.session_key)?;
        writer
            .fixed
            .write_u32::<LittleEndian>((self.flags | NtlmFlags::NEGOTIATE_UNICODE).bits())?;
        Ok(writer.finish())
    }
}

/// NTLM exchange progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtlmState {
    Initial,
    NegotiateSent,
    AuthenticateSent,
}

/// Client-side NTLM context carried through the handshake
#[derive(Debug, Clone)]
pub struct NtlmAuth {
    pub state: NtlmState,
    pub flags: NtlmFlags,
    pub username: String,
    pub domain: String,
    pub workstation: String,
}

impl NtlmAuth {
    pub fn new_client(
        username: impl Into<String>,
        domain: impl Into<String>,
        workstation: impl Into<String>,
    ) -> Self {
        Self {
            state: NtlmState::Initial,
            flags: NtlmFlags::client_default(),
            username: username.into(),
            domain: domain.into(),
            workstation: workstation.into(),
        }
    }

    /// Type 1 token for SESSION_SETUP step 1
    pub fn create_negotiate_message(&mut self) -> Result<Vec<u8>> {
        if self.state != NtlmState::Initial {
            return Err(Error::InvalidState(format!(
                "NTLM negotiate already sent ({:?})",
                self.state
            )));
        }
        let token = NtlmNegotiateMessage::new(self.flags).serialize()?;
        self.state = NtlmState::NegotiateSent;
        Ok(token)
    }

    /// Type 3 token answering the server's Type 2 challenge
    pub fn create_authenticate_message(
        &mut self,
        challenge_data: &[u8],
        password: &str,
    ) -> Result<Vec<u8>> {
        if self.state != NtlmState::NegotiateSent {
            return Err(Error::InvalidState(format!(
                "NTLM challenge received in state {:?}",
                self.state
            )));
        }

        let challenge = NtlmChallengeMessage::parse(challenge_data)?;
        debug!(
            "NTLM challenge from target '{}', flags {:?}",
            challenge.target_name, challenge.flags
        );

        let domain = if self.domain.is_empty() {
            challenge.target_name.clone()
        } else {
            self.domain.clone()
        };

        let hash = ntlmv2_hash(&self.username, &domain, password)?;
        let client_challenge = generate_client_challenge();
        let server_timestamp = challenge.timestamp();
        let blob = NtlmV2Blob::new(
            server_timestamp.unwrap_or_else(windows_timestamp),
            client_challenge,
            challenge.target_info.clone(),
        );

        let nt_response = ntlmv2_response(&hash, &challenge.server_challenge, &blob)?;
        // A server timestamp means the LMv2 response must be zeroed
        let lm_response = if server_timestamp.is_some() {
            vec![0u8; 24]
        } else {
            lmv2_response(&hash, &challenge.server_challenge, &client_challenge)?
        };

        let message = NtlmAuthenticateMessage {
            flags: challenge.flags & self.flags,
            lm_response,
            nt_response,
            domain,
            user_name: self.username.clone(),
            workstation: self.workstation.clone(),
            session_key: Vec::new(),
        };

        self.state = NtlmState::AuthenticateSent;
        message.serialize()
    }
}
