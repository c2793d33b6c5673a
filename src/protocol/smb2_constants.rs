//! SMB2 protocol constants

use bitflags::bitflags;

/// SMB2 magic as bytes
pub const SMB2_MAGIC: [u8; 4] = [0xFE, b'S', b'M', b'B'];

/// SMB2 header size
pub const SMB2_HEADER_SIZE: usize = 64;

/// StructureSize field of every fixed message part
pub mod structure_size {
    pub const HEADER: u16 = 64;
    pub const ERROR_RESPONSE: u16 = 9;
    pub const NEGOTIATE_REQUEST: u16 = 36;
    pub const NEGOTIATE_RESPONSE: u16 = 65;
    pub const SESSION_SETUP_REQUEST: u16 = 25;
    pub const SESSION_SETUP_RESPONSE: u16 = 9;
    pub const TREE_CONNECT_REQUEST: u16 = 9;
    pub const TREE_CONNECT_RESPONSE: u16 = 16;
    pub const CREATE_REQUEST: u16 = 57;
    pub const CREATE_RESPONSE: u16 = 89;
    pub const CLOSE_REQUEST: u16 = 24;
    pub const CLOSE_RESPONSE: u16 = 60;
    pub const READ_REQUEST: u16 = 49;
    pub const READ_RESPONSE: u16 = 17;
    pub const WRITE_REQUEST: u16 = 49;
    pub const WRITE_RESPONSE: u16 = 17;
    pub const QUERY_DIRECTORY_REQUEST: u16 = 33;
    pub const QUERY_DIRECTORY_RESPONSE: u16 = 9;
    pub const SET_INFO_REQUEST: u16 = 33;
    pub const SET_INFO_RESPONSE: u16 = 2;
}

bitflags! {
    /// Header flags the client reads or sets
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Smb2HeaderFlags: u32 {
        /// Set on every server reply
        const SERVER_TO_REDIR = 0x0000_0001;
        /// Header carries an async id instead of a tree id
        const ASYNC_COMMAND = 0x0000_0002;
    }
}

bitflags! {
    /// MS-FSCC file attributes; unknown bits are kept as received
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const NORMAL = 0x0000_0080;
    }
}

bitflags! {
    /// Access mask requested in CREATE
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DesiredAccess: u32 {
        const FILE_READ_DATA = 0x0000_0001;
        const FILE_WRITE_DATA = 0x0000_0002;
        const FILE_APPEND_DATA = 0x0000_0004;
        const FILE_READ_EA = 0x0000_0008;
        const FILE_WRITE_EA = 0x0000_0010;
        const FILE_READ_ATTRIBUTES = 0x0000_0080;
        const FILE_WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const READ_CONTROL = 0x0002_0000;
        const SYNCHRONIZE = 0x0010_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;

        const FILE_GENERIC_READ = Self::FILE_READ_DATA.bits()
            | Self::FILE_READ_EA.bits()
            | Self::FILE_READ_ATTRIBUTES.bits()
            | Self::READ_CONTROL.bits()
            | Self::SYNCHRONIZE.bits();
        const FILE_GENERIC_WRITE = Self::FILE_WRITE_DATA.bits()
            | Self::FILE_APPEND_DATA.bits()
            | Self::FILE_WRITE_EA.bits()
            | Self::FILE_WRITE_ATTRIBUTES.bits()
            | Self::READ_CONTROL.bits()
            | Self::SYNCHRONIZE.bits();
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShareAccess: u32 {
        const FILE_SHARE_READ = 0x0000_0001;
        const FILE_SHARE_WRITE = 0x0000_0002;
        const FILE_SHARE_DELETE = 0x0000_0004;
        const FILE_SHARE_ALL = 0x0000_0007;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateOptions: u32 {
        const FILE_DIRECTORY_FILE = 0x0000_0001;
        const FILE_NON_DIRECTORY_FILE = 0x0000_0040;
    }
}

/// What CREATE does when the target does or does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CreateDisposition {
    Supersede = 0,
    /// Open only; fails when absent
    Open = 1,
    /// Create only; fails when present
    Create = 2,
    OpenIf = 3,
    Overwrite = 4,
    OverwriteIf = 5,
}

impl TryFrom<u32> for CreateDisposition {
    type Error = crate::Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Supersede,
            1 => Self::Open,
            2 => Self::Create,
            3 => Self::OpenIf,
            4 => Self::Overwrite,
            5 => Self::OverwriteIf,
            _ => {
                return Err(crate::Error::ParseError(format!(
                    "Invalid create disposition: {}",
                    value
                )))
            }
        })
    }
}

/// CreateAction in a CREATE response
pub mod create_action {
    pub const OPENED: u32 = 0x0000_0001;
}

pub mod impersonation_level {
    pub const IMPERSONATION: u32 = 0x0000_0002;
}

/// The client never requests an oplock
pub mod oplock_level {
    pub const NONE: u8 = 0x00;
}

pub mod query_directory_flags {
    pub const RESTART_SCANS: u8 = 0x01;
}

pub mod share_type {
    pub const DISK: u8 = 0x01;
}

/// SMB2 Commands (opcodes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Smb2Command {
    Negotiate = 0x00,
    SessionSetup = 0x01,
    Logoff = 0x02,
    TreeConnect = 0x03,
    TreeDisconnect = 0x04,
    Create = 0x05,
    Close = 0x06,
    Flush = 0x07,
    Read = 0x08,
    Write = 0x09,
    Lock = 0x0A,
    Ioctl = 0x0B,
    Cancel = 0x0C,
    Echo = 0x0D,
    QueryDirectory = 0x0E,
    ChangeNotify = 0x0F,
    QueryInfo = 0x10,
    SetInfo = 0x11,
    OplockBreak = 0x12,
}

impl TryFrom<u16> for Smb2Command {
    type Error = crate::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Negotiate),
            0x01 => Ok(Self::SessionSetup),
            0x02 => Ok(Self::Logoff),
            0x03 => Ok(Self::TreeConnect),
            0x04 => Ok(Self::TreeDisconnect),
            0x05 => Ok(Self::Create),
            0x06 => Ok(Self::Close),
            0x07 => Ok(Self::Flush),
            0x08 => Ok(Self::Read),
            0x09 => Ok(Self::Write),
            0x0A => Ok(Self::Lock),
            0x0B => Ok(Self::Ioctl),
            0x0C => Ok(Self::Cancel),
            0x0D => Ok(Self::Echo),
            0x0E => Ok(Self::QueryDirectory),
            0x0F => Ok(Self::ChangeNotify),
            0x10 => Ok(Self::QueryInfo),
            0x11 => Ok(Self::SetInfo),
            0x12 => Ok(Self::OplockBreak),
            _ => Err(crate::Error::InvalidHeader(format!(
                "Invalid SMB2 command: 0x{:04x}",
                value
            ))),
        }
    }
}

bitflags! {
    /// SMB2 negotiate security mode
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecurityMode: u16 {
        const SIGNING_ENABLED = 0x0001;
        const SIGNING_REQUIRED = 0x0002;
    }
}

bitflags! {
    /// Capabilities; the client advertises none
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Smb2Capabilities: u32 {
        const DFS = 0x0000_0001;
        const LARGE_MTU = 0x0000_0004;
    }
}

/// SMB2 dialect versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum Smb2Dialect {
    Smb202 = 0x0202,
    Smb210 = 0x0210,
    Smb300 = 0x0300,
    Smb302 = 0x0302,
    Smb311 = 0x0311,
    /// Multi-protocol negotiate answer
    Wildcard = 0x02FF,
}

impl TryFrom<u16> for Smb2Dialect {
    type Error = crate::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0202 => Ok(Self::Smb202),
            0x0210 => Ok(Self::Smb210),
            0x0300 => Ok(Self::Smb300),
            0x0302 => Ok(Self::Smb302),
            0x0311 => Ok(Self::Smb311),
            0x02FF => Ok(Self::Wildcard),
            _ => Err(crate::Error::ParseError(format!(
                "Unknown SMB2 dialect: 0x{:04x}",
                value
            ))),
        }
    }
}
