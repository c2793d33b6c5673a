//! Framed halves of a TCP connection

use crate::error::{Error, Result};
use crate::netbios::{encode_frame, FrameDecoder};
use crate::protocol::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::trace;

const READ_CHUNK: usize = 64 * 1024;

/// Receiving half: turns socket reads into SMB2 messages
#[derive(Debug)]
pub struct FrameReader {
    stream: OwnedReadHalf,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl FrameReader {
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Read until at least one complete message is available.
    ///
    /// A clean EOF surfaces as [`Error::ConnectionClosed`].
    pub async fn read_messages(&mut self) -> Result<Vec<Message>> {
        loop {
            let n = self.stream.read(&mut self.chunk).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            trace!("Read {} bytes ({} buffered)", n, self.decoder.buffered());

            let messages = self
                .decoder
                .decode(&self.chunk[..n])
                .collect::<Result<Vec<_>>>()?;
            if !messages.is_empty() {
                return Ok(messages);
            }
        }
    }
}

/// Sending half: frames and writes one SMB2 message at a time
#[derive(Debug)]
pub struct FrameWriter {
    stream: OwnedWriteHalf,
}

impl FrameWriter {
    pub fn new(stream: OwnedWriteHalf) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = encode_frame(&message.to_bytes()?)?;
        trace!(
            "Sending {:?} id {} ({} bytes): {:02x?}",
            message.command(),
            message.header().message_id,
            frame.len(),
            &frame[..frame.len().min(96)]
        );
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
