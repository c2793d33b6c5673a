//! SMB2 protocol definitions

pub mod codec;
pub mod commands;
pub mod header;
pub mod message;
pub mod messages;
pub mod smb2_constants;

pub use codec::{CommandKind, SessionContext, SmbCommand};
pub use header::{MessageKey, Smb2Header};
pub use message::Message;
