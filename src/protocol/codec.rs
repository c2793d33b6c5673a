//! Command codec contract shared by every SMB2 request the client issues

use super::header::Smb2Header;
use super::message::Message;
use super::smb2_constants::{Smb2Command, Smb2Dialect};
use crate::error::{Error, NtStatus, Result};
use std::fmt;
use uuid::Uuid;

/// Credits asked for on every request so pipelined transfers never stall
pub const CREDIT_REQUEST: u16 = 64;

/// Per-connection protocol state the codecs read and update.
#[derive(Debug, Clone)]
pub struct SessionContext {
    unc_path: String,
    client_guid: Uuid,
    next_message_id: u64,
    pub dialect: Option<Smb2Dialect>,
    /// Zero until the first session setup response assigns one
    pub session_id: u64,
    pub tree_id: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
}

impl SessionContext {
    pub fn new(unc_path: impl Into<String>) -> Self {
        Self {
            unc_path: unc_path.into(),
            client_guid: Uuid::new_v4(),
            next_message_id: 0,
            dialect: None,
            session_id: 0,
            tree_id: 0,
            max_read_size: 0,
            max_write_size: 0,
        }
    }

    /// `\\host\share` used for tree connect
    pub fn unc_path(&self) -> &str {
        &self.unc_path
    }

    pub fn client_guid(&self) -> Uuid {
        self.client_guid
    }

    /// Fresh request header carrying the next message id
    pub fn request_header(&mut self, command: Smb2Command) -> Smb2Header {
        let mut header = Smb2Header::new(command);
        header.message_id = self.next_message_id;
        header.credit = CREDIT_REQUEST;
        header.session_id = self.session_id;
        header.tree_id = self.tree_id;
        self.next_message_id += 1;
        header
    }

    pub fn request(&mut self, command: Smb2Command, body: Vec<u8>) -> Message {
        let header = self.request_header(command);
        Message::new(header, body)
    }
}

/// Name of every command codec, used in logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Negotiate,
    SessionSetupNegotiate,
    SessionSetupAuthenticate,
    TreeConnect,
    Open,
    Create,
    Close,
    Read,
    Write,
    QueryDirectory,
    SetInfo,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Negotiate => "negotiate",
            CommandKind::SessionSetupNegotiate => "session_setup_step1",
            CommandKind::SessionSetupAuthenticate => "session_setup_step2",
            CommandKind::TreeConnect => "tree_connect",
            CommandKind::Open => "open",
            CommandKind::Create => "create",
            CommandKind::Close => "close",
            CommandKind::Read => "read",
            CommandKind::Write => "write",
            CommandKind::QueryDirectory => "query_directory",
            CommandKind::SetInfo => "set_info",
        }
    }

    /// Wire opcode the command travels as
    pub fn command(self) -> Smb2Command {
        match self {
            CommandKind::Negotiate => Smb2Command::Negotiate,
            CommandKind::SessionSetupNegotiate | CommandKind::SessionSetupAuthenticate => {
                Smb2Command::SessionSetup
            }
            CommandKind::TreeConnect => Smb2Command::TreeConnect,
            CommandKind::Open | CommandKind::Create => Smb2Command::Create,
            CommandKind::Close => Smb2Command::Close,
            CommandKind::Read => Smb2Command::Read,
            CommandKind::Write => Smb2Command::Write,
            CommandKind::QueryDirectory => Smb2Command::QueryDirectory,
            CommandKind::SetInfo => Smb2Command::SetInfo,
        }
    }

    /// Reject a response for another opcode or with a failure status.
    ///
    /// `accepted` lists non-success statuses the caller handles itself.
    pub fn check(self, response: &Message, accepted: &[NtStatus]) -> Result<()> {
        if response.command() != self.command() {
            return Err(Error::InvalidMessage(format!(
                "{} answered with {:?}",
                self,
                response.command()
            )));
        }
        let status = response.status();
        if status.is_success() || accepted.contains(&status) {
            Ok(())
        } else {
            Err(Error::Status {
                command: self.command(),
                status,
            })
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encoder/decoder pair for one request type
pub trait SmbCommand: Send {
    type Output: Send;

    const KIND: CommandKind;

    /// Build the request, assigning its message id from `ctx`
    fn generate(&self, ctx: &mut SessionContext) -> Result<Message>;

    /// Interpret the correlated response
    fn parse(&self, ctx: &mut SessionContext, response: Message) -> Result<Self::Output>;
}
