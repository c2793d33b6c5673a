//! One codec per SMB2 request the client issues

use super::codec::{CommandKind, SessionContext, SmbCommand};
use super::message::Message;
use super::messages::session::SessionFlags;
use super::messages::{
    FileId, FileInfoClass, Smb2CloseRequest, Smb2CloseResponse, Smb2CreateRequest,
    Smb2CreateResponse, Smb2NegotiateRequest, Smb2NegotiateResponse, Smb2QueryDirectoryRequest,
    Smb2QueryDirectoryResponse, Smb2ReadRequest, Smb2ReadResponse, Smb2SessionSetupRequest,
    Smb2SessionSetupResponse, Smb2SetInfoRequest, Smb2SetInfoResponse, Smb2TreeConnectRequest,
    Smb2TreeConnectResponse, Smb2WriteRequest, Smb2WriteResponse, SmbMessage,
};
use super::smb2_constants::{
    query_directory_flags, CreateDisposition, CreateOptions, DesiredAccess, FileAttributes,
    Smb2Dialect,
};
use crate::error::{Error, NtStatus, Result};
use bytes::Bytes;
use tracing::debug;

/// An open file or directory on the share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    pub file_id: FileId,
    pub end_of_file: u64,
    pub attributes: FileAttributes,
}

impl FileHandle {
    fn from_response(response: &Smb2CreateResponse) -> Self {
        Self {
            file_id: response.file_id,
            end_of_file: response.end_of_file,
            attributes: response.file_attributes,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

/// NEGOTIATE offering SMB 2.0.2 only
#[derive(Debug, Clone, Default)]
pub struct Negotiate;

impl SmbCommand for Negotiate {
    type Output = Smb2NegotiateResponse;
    const KIND: CommandKind = CommandKind::Negotiate;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let body = Smb2NegotiateRequest::new(vec![Smb2Dialect::Smb202], ctx.client_guid());
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[])?;
        let negotiated = Smb2NegotiateResponse::parse(response.body())?;
        if negotiated.dialect_revision != Smb2Dialect::Smb202 {
            return Err(Error::InvalidMessage(format!(
                "Server selected unsupported dialect {:?}",
                negotiated.dialect_revision
            )));
        }
        debug!(
            "Negotiated SMB 2.0.2, max read {} write {}",
            negotiated.max_read_size, negotiated.max_write_size
        );
        ctx.dialect = Some(negotiated.dialect_revision);
        ctx.max_read_size = negotiated.max_read_size;
        ctx.max_write_size = negotiated.max_write_size;
        Ok(negotiated)
    }
}

/// SESSION_SETUP carrying the NTLM NEGOTIATE token; yields the CHALLENGE token
#[derive(Debug, Clone)]
pub struct SessionSetupNegotiate {
    pub token: Vec<u8>,
}

impl SmbCommand for SessionSetupNegotiate {
    type Output = Vec<u8>;
    const KIND: CommandKind = CommandKind::SessionSetupNegotiate;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let body = Smb2SessionSetupRequest::new(self.token.clone());
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[NtStatus::MoreProcessingRequired])?;
        ctx.session_id = response.header().session_id;
        let setup = Smb2SessionSetupResponse::parse(response.body())?;
        if setup.security_blob.is_empty() {
            return Err(Error::AuthenticationFailed(
                "Server sent no NTLM challenge".into(),
            ));
        }
        debug!("Session id 0x{:016x} assigned", ctx.session_id);
        Ok(setup.security_blob)
    }
}

/// SESSION_SETUP carrying the NTLM AUTHENTICATE token
#[derive(Debug, Clone)]
pub struct SessionSetupAuthenticate {
    pub token: Vec<u8>,
}

impl SmbCommand for SessionSetupAuthenticate {
    type Output = SessionFlags;
    const KIND: CommandKind = CommandKind::SessionSetupAuthenticate;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let body = Smb2SessionSetupRequest::new(self.token.clone());
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, _ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[])?;
        Ok(Smb2SessionSetupResponse::parse(response.body())?.session_flags)
    }
}

/// TREE_CONNECT to the configured share
#[derive(Debug, Clone, Default)]
pub struct TreeConnect;

impl SmbCommand for TreeConnect {
    type Output = Smb2TreeConnectResponse;
    const KIND: CommandKind = CommandKind::TreeConnect;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let body = Smb2TreeConnectRequest::new(ctx.unc_path());
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[])?;
        ctx.tree_id = response.header().tree_id;
        Smb2TreeConnectResponse::parse(response.body())
    }
}

fn parse_create(kind: CommandKind, response: &Message) -> Result<FileHandle> {
    kind.check(response, &[])?;
    let created = Smb2CreateResponse::parse(response.body())?;
    Ok(FileHandle::from_response(&created))
}

/// CREATE with OPEN disposition on an existing file or directory
#[derive(Debug, Clone)]
pub struct Open {
    pub path: String,
    pub access: DesiredAccess,
    pub options: CreateOptions,
}

impl Open {
    /// Read access; works for files and directories alike
    pub fn read(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            access: DesiredAccess::FILE_GENERIC_READ,
            options: CreateOptions::empty(),
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            access: DesiredAccess::FILE_READ_DATA
                | DesiredAccess::FILE_READ_ATTRIBUTES
                | DesiredAccess::SYNCHRONIZE,
            options: CreateOptions::FILE_DIRECTORY_FILE,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            access: DesiredAccess::DELETE | DesiredAccess::FILE_READ_ATTRIBUTES,
            options: CreateOptions::empty(),
        }
    }
}

impl SmbCommand for Open {
    type Output = FileHandle;
    const KIND: CommandKind = CommandKind::Open;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let mut body = Smb2CreateRequest::new(self.path.as_str());
        body.desired_access = self.access;
        body.create_options = self.options;
        body.create_disposition = CreateDisposition::Open;
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, _ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        parse_create(Self::KIND, &response)
    }
}

/// CREATE with CREATE disposition: fails if the file exists
#[derive(Debug, Clone)]
pub struct Create {
    pub path: String,
}

impl Create {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl SmbCommand for Create {
    type Output = FileHandle;
    const KIND: CommandKind = CommandKind::Create;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let mut body = Smb2CreateRequest::new(self.path.as_str());
        body.desired_access = DesiredAccess::FILE_GENERIC_READ | DesiredAccess::FILE_GENERIC_WRITE;
        body.file_attributes = FileAttributes::NORMAL;
        body.create_disposition = CreateDisposition::Create;
        body.create_options = CreateOptions::FILE_NON_DIRECTORY_FILE;
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, _ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        parse_create(Self::KIND, &response)
    }
}

/// CLOSE a handle
#[derive(Debug, Clone)]
pub struct Close {
    pub file_id: FileId,
}

impl SmbCommand for Close {
    type Output = ();
    const KIND: CommandKind = CommandKind::Close;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let body = Smb2CloseRequest::new(self.file_id);
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, _ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[])?;
        Smb2CloseResponse::parse(response.body())?;
        Ok(())
    }
}

/// READ one packet
#[derive(Debug, Clone)]
pub struct Read {
    pub file_id: FileId,
    pub offset: u64,
    pub length: u32,
}

impl SmbCommand for Read {
    type Output = Bytes;
    const KIND: CommandKind = CommandKind::Read;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let body = Smb2ReadRequest::new(self.file_id, self.offset, self.length);
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, _ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[])?;
        Ok(Smb2ReadResponse::parse_shared(response.body())?.data)
    }
}

/// WRITE one packet; yields the byte count the server accepted
#[derive(Debug, Clone)]
pub struct Write {
    pub file_id: FileId,
    pub offset: u64,
    pub data: Bytes,
}

impl SmbCommand for Write {
    type Output = u32;
    const KIND: CommandKind = CommandKind::Write;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let body = Smb2WriteRequest::new(self.file_id, self.offset, self.data.clone());
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, _ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[])?;
        Ok(Smb2WriteResponse::parse(response.body())?.count)
    }
}

/// QUERY_DIRECTORY for every entry; `None` once the server has no more
#[derive(Debug, Clone)]
pub struct QueryDirectory {
    pub file_id: FileId,
    pub restart: bool,
}

impl SmbCommand for QueryDirectory {
    type Output = Option<Bytes>;
    const KIND: CommandKind = CommandKind::QueryDirectory;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let flags = if self.restart {
            query_directory_flags::RESTART_SCANS
        } else {
            0
        };
        let body = Smb2QueryDirectoryRequest::new(
            self.file_id,
            FileInfoClass::DirectoryInformation,
            flags,
        );
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, _ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[NtStatus::NoMoreFiles])?;
        if response.status() == NtStatus::NoMoreFiles {
            return Ok(None);
        }
        let listing = Smb2QueryDirectoryResponse::parse_shared(response.body())?;
        Ok(Some(listing.output_buffer))
    }
}

/// SET_INFO of one file information class
#[derive(Debug, Clone)]
pub struct SetInfo {
    pub file_id: FileId,
    pub class: FileInfoClass,
    pub buffer: Vec<u8>,
}

impl SmbCommand for SetInfo {
    type Output = ();
    const KIND: CommandKind = CommandKind::SetInfo;

    fn generate(&self, ctx: &mut SessionContext) -> Result<Message> {
        let body = Smb2SetInfoRequest::file(self.file_id, self.class, self.buffer.clone());
        Ok(ctx.request(Self::KIND.command(), body.serialize()?))
    }

    fn parse(&self, _ctx: &mut SessionContext, response: Message) -> Result<Self::Output> {
        Self::KIND.check(&response, &[])?;
        Smb2SetInfoResponse::parse(response.body())?;
        Ok(())
    }
}
