//! Pipelining SMB2 client
//!
//! Connects to one share over NetBIOS-framed TCP, authenticates with
//! NTLMv2, and keeps many READ/WRITE requests in flight per transfer.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod error;
pub mod netbios;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod e2e_tests;

pub use client::{ClientConfig, DirEntry, ShareAddress, SmbClient};
pub use error::{Error, NtStatus, Result};
