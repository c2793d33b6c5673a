//! Transport layer for the SMB2 client
//!
//! Socket I/O only. Framing lives in [`crate::netbios`] and message
//! semantics in [`crate::protocol`], so both halves stay testable without
//! a network.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

pub mod tcp;

pub use tcp::{FrameReader, FrameWriter};

/// Open a TCP connection to `host:port`, giving up after `timeout`
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    debug!("Connecting to {}:{}", host, port);
    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(|e| Error::ConnectionError(format!("{}:{}: {}", host, port, e)))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Split a connected stream into its framed halves
pub fn split(stream: TcpStream) -> (FrameReader, FrameWriter) {
    let (read_half, write_half) = stream.into_split();
    (FrameReader::new(read_half), FrameWriter::new(write_half))
}
