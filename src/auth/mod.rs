//! NTLM authentication for SMB2 session setup

pub mod ntlm;
pub mod ntlm_crypto;

pub use ntlm::{NtlmAuth, NtlmFlags};
