//! SMB2 protocol messages organized by category

pub mod common;
pub mod directory;
pub mod file_ops;
pub mod info;
pub mod negotiate;
pub mod session;
pub mod tree;

pub use common::{utf16le_decode, utf16le_encode, FileId, Smb2ErrorResponse, SmbMessage};
pub use directory::{Smb2QueryDirectoryRequest, Smb2QueryDirectoryResponse};
pub use file_ops::{Smb2CloseRequest, Smb2CloseResponse, Smb2CreateRequest, Smb2CreateResponse};
pub use file_ops::{Smb2ReadRequest, Smb2ReadResponse, Smb2WriteRequest, Smb2WriteResponse};
pub use info::{FileInfoClass, InfoType, Smb2SetInfoRequest, Smb2SetInfoResponse};
pub use negotiate::{Smb2NegotiateRequest, Smb2NegotiateResponse};
pub use session::{Smb2SessionSetupRequest, Smb2SessionSetupResponse};
pub use tree::{Smb2TreeConnectRequest, Smb2TreeConnectResponse};
