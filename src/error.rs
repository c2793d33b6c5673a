//! Error types for the SMB2 client

use crate::protocol::smb2_constants::Smb2Command;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for SMB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SMB client operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol parsing error
    #[error("Protocol parsing error: {0}")]
    ParseError(String),

    /// Invalid SMB header
    #[error("Invalid SMB header: {0}")]
    InvalidHeader(String),

    /// Well-formed frame carrying a message the client cannot accept
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Buffer too small
    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// The server answered a request with a failure status
    #[error("{command:?} failed: {status}")]
    Status {
        command: Smb2Command,
        status: NtStatus,
    },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Encryption/hashing error
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// Transport failed underneath a pending request
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// No response arrived in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed `\\host\share` address
    #[error("Invalid share address: {0}")]
    InvalidShare(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// File or directory already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Server status carried by this error, if it came from a response
    pub fn status(&self) -> Option<NtStatus> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the error means the connection itself is gone
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionClosed | Error::ConnectionError(_)
        )
    }
}

/// NTSTATUS codes the client interprets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NtStatus {
    Success,
    Pending,
    NoMoreFiles,
    InvalidHandle,
    InvalidParameter,
    EndOfFile,
    MoreProcessingRequired,
    AccessDenied,
    ObjectNameInvalid,
    ObjectNameNotFound,
    ObjectNameCollision,
    ObjectPathNotFound,
    SharingViolation,
    DeletePending,
    LogonFailure,
    InsufficientResources,
    FileIsADirectory,
    NotSupported,
    NetworkNameDeleted,
    BadNetworkName,
    NotADirectory,
    FileClosed,
    UserSessionDeleted,
    /// Any code without a dedicated variant
    Other(u32),
}

impl NtStatus {
    /// Map a raw status code
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0000_0000 => NtStatus::Success,
            0x0000_0103 => NtStatus::Pending,
            0x8000_0006 => NtStatus::NoMoreFiles,
            0xC000_0008 => NtStatus::InvalidHandle,
            0xC000_000D => NtStatus::InvalidParameter,
            0xC000_0011 => NtStatus::EndOfFile,
            0xC000_0016 => NtStatus::MoreProcessingRequired,
            0xC000_0022 => NtStatus::AccessDenied,
            0xC000_0033 => NtStatus::ObjectNameInvalid,
            0xC000_0034 => NtStatus::ObjectNameNotFound,
            0xC000_0035 => NtStatus::ObjectNameCollision,
            0xC000_003A => NtStatus::ObjectPathNotFound,
            0xC000_0043 => NtStatus::SharingViolation,
            0xC000_0056 => NtStatus::DeletePending,
            0xC000_006D => NtStatus::LogonFailure,
            0xC000_009A => NtStatus::InsufficientResources,
            0xC000_00BA => NtStatus::FileIsADirectory,
            0xC000_00BB => NtStatus::NotSupported,
            0xC000_00C9 => NtStatus::NetworkNameDeleted,
            0xC000_00CC => NtStatus::BadNetworkName,
            0xC000_0103 => NtStatus::NotADirectory,
            0xC000_0128 => NtStatus::FileClosed,
            0xC000_0203 => NtStatus::UserSessionDeleted,
            other => NtStatus::Other(other),
        }
    }

    /// Raw status code
    pub fn to_u32(self) -> u32 {
        match self {
            NtStatus::Success => 0x0000_0000,
            NtStatus::Pending => 0x0000_0103,
            NtStatus::NoMoreFiles => 0x8000_0006,
            NtStatus::InvalidHandle => 0xC000_0008,
            NtStatus::InvalidParameter => 0xC000_000D,
            NtStatus::EndOfFile => 0xC000_0011,
            NtStatus::MoreProcessingRequired => 0xC000_0016,
            NtStatus::AccessDenied => 0xC000_0022,
            NtStatus::ObjectNameInvalid => 0xC000_0033,
            NtStatus::ObjectNameNotFound => 0xC000_0034,
            NtStatus::ObjectNameCollision => 0xC000_0035,
            NtStatus::ObjectPathNotFound => 0xC000_003A,
            NtStatus::SharingViolation => 0xC000_0043,
            NtStatus::DeletePending => 0xC000_0056,
            NtStatus::LogonFailure => 0xC000_006D,
            NtStatus::InsufficientResources => 0xC000_009A,
            NtStatus::FileIsADirectory => 0xC000_00BA,
            NtStatus::NotSupported => 0xC000_00BB,
            NtStatus::NetworkNameDeleted => 0xC000_00C9,
            NtStatus::BadNetworkName => 0xC000_00CC,
            NtStatus::NotADirectory => 0xC000_0103,
            NtStatus::FileClosed => 0xC000_0128,
            NtStatus::UserSessionDeleted => 0xC000_0203,
            NtStatus::Other(value) => value,
        }
    }

    /// Check if this is a success status
    pub fn is_success(self) -> bool {
        self == NtStatus::Success
    }

    /// Check if this is an error status
    pub fn is_error(self) -> bool {
        self.to_u32() & 0xC000_0000 == 0xC000_0000
    }

    /// Check if this is a warning status
    pub fn is_warning(self) -> bool {
        self.to_u32() & 0x8000_0000 == 0x8000_0000 && !self.is_error()
    }
}

impl From<u32> for NtStatus {
    fn from(value: u32) -> Self {
        NtStatus::from_u32(value)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            NtStatus::Success => "Success",
            NtStatus::Pending => "Pending",
            NtStatus::NoMoreFiles => "No more files",
            NtStatus::InvalidHandle => "Invalid handle",
            NtStatus::InvalidParameter => "Invalid parameter",
            NtStatus::EndOfFile => "End of file",
            NtStatus::MoreProcessingRequired => "More processing required",
            NtStatus::AccessDenied => "Access denied",
            NtStatus::ObjectNameInvalid => "Object name invalid",
            NtStatus::ObjectNameNotFound => "Object name not found",
            NtStatus::ObjectNameCollision => "Object name collision",
            NtStatus::ObjectPathNotFound => "Object path not found",
            NtStatus::SharingViolation => "Sharing violation",
            NtStatus::DeletePending => "Delete pending",
            NtStatus::LogonFailure => "Logon failure",
            NtStatus::InsufficientResources => "Insufficient resources",
            NtStatus::FileIsADirectory => "File is a directory",
            NtStatus::NotSupported => "Not supported",
            NtStatus::NetworkNameDeleted => "Network name deleted",
            NtStatus::BadNetworkName => "Bad network name",
            NtStatus::NotADirectory => "Not a directory",
            NtStatus::FileClosed => "File closed",
            NtStatus::UserSessionDeleted => "User session deleted",
            NtStatus::Other(_) => "Unrecognized status",
        };
        write!(f, "{} (0x{:08X})", msg, self.to_u32())
    }
}
