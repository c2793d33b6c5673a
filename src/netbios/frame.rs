//! Stream reassembly for NetBIOS session messages

use crate::error::{Error, Result};
use crate::netbios::{NetBiosHeader, NetBiosMessageType};
use crate::protocol::Message;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

/// Wrap an SMB2 message in a session message header
pub fn encode_frame(body: &[u8]) -> Result<Bytes> {
    let length = u32::try_from(body.len())
        .map_err(|_| Error::InvalidParameter(format!("frame body of {} bytes", body.len())))?;
    let header = NetBiosHeader::session_message(length)?;

    let mut buf = BytesMut::with_capacity(NetBiosHeader::SIZE + body.len());
    header.write_to(&mut buf)?;
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Accumulates raw stream bytes and yields complete SMB2 messages.
///
/// Holds at most one partial frame between calls once the returned
/// [`Frames`] iterator has been drained.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` and iterate over every message it completes
    pub fn decode(&mut self, data: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(data);
        Frames { decoder: self }
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn next_frame(&mut self) -> Option<Result<Bytes>> {
        loop {
            if self.buffer.len() < NetBiosHeader::SIZE {
                return None;
            }

            let header = match NetBiosHeader::parse(&self.buffer) {
                Ok(header) => header,
                Err(e) => {
                    // Framing is lost, nothing after this point can be trusted
                    self.buffer.clear();
                    return Some(Err(e));
                }
            };

            let total = NetBiosHeader::SIZE + header.length as usize;
            if self.buffer.len() < total {
                return None;
            }

            let mut frame = self.buffer.split_to(total);
            frame.advance(NetBiosHeader::SIZE);

            match header.message_type {
                NetBiosMessageType::SessionMessage => return Some(Ok(frame.freeze())),
                NetBiosMessageType::Keepalive => {
                    trace!("Skipping NetBIOS keepalive");
                    continue;
                }
                other => {
                    return Some(Err(Error::InvalidMessage(format!(
                        "Unexpected NetBIOS message type {:?} on SMB2 session",
                        other
                    ))))
                }
            }
        }
    }
}

/// Lazy sequence of messages completed by one [`FrameDecoder::decode`] call
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder
            .next_frame()
            .map(|frame| frame.and_then(Message::parse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::smb2_constants::Smb2Command;
    use crate::protocol::Smb2Header;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn message_bytes(message_id: u64, body: &[u8]) -> Vec<u8> {
        let mut header = Smb2Header::new(Smb2Command::Read);
        header.message_id = message_id;
        Message::new(header, body.to_vec()).to_bytes().unwrap()
    }

    fn stream(count: u64) -> (Vec<u8>, Vec<Vec<u8>>) {
        let mut wire = Vec::new();
        let mut expected = Vec::new();
        for id in 0..count {
            let body = vec![id as u8; (id as usize * 37) % 300];
            let bytes = message_bytes(id, &body);
            wire.extend_from_slice(&encode_frame(&bytes).unwrap());
            expected.push(bytes);
        }
        (wire, expected)
    }

    fn collect(decoder: &mut FrameDecoder, chunk: &[u8]) -> Vec<Vec<u8>> {
        decoder
            .decode(chunk)
            .map(|m| m.unwrap().to_bytes().unwrap())
            .collect()
    }

    #[test]
    fn test_encode_frame_header() {
        let frame = encode_frame(&[0xAA; 300]).unwrap();
        assert_eq!(&frame[..4], &[0x00, 0x00, 0x01, 0x2C]);
        assert_eq!(frame.len(), 304);
    }

    #[test]
    fn test_single_chunk() {
        let (wire, expected) = stream(5);
        let mut decoder = FrameDecoder::new();
        assert_eq!(collect(&mut decoder, &wire), expected);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let (wire, expected) = stream(4);
        let mut decoder = FrameDecoder::new();
        let mut got = Vec::new();
        for byte in &wire {
            got.extend(collect(&mut decoder, std::slice::from_ref(byte)));
            assert!(decoder.buffered() < wire.len());
        }
        assert_eq!(got, expected);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_random_splits_match_single_chunk() {
        let (wire, expected) = stream(12);
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..50 {
            let mut decoder = FrameDecoder::new();
            let mut got = Vec::new();
            let mut pos = 0;
            while pos < wire.len() {
                let step = rng.gen_range(1..=(wire.len() - pos).min(200));
                got.extend(collect(&mut decoder, &wire[pos..pos + step]));
                pos += step;
            }
            assert_eq!(got, expected);
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn test_partial_frame_held_back() {
        let (wire, expected) = stream(2);
        let first_len = expected[0].len() + NetBiosHeader::SIZE;
        let mut decoder = FrameDecoder::new();

        let got = collect(&mut decoder, &wire[..first_len + 10]);
        assert_eq!(got, vec![expected[0].clone()]);
        assert_eq!(decoder.buffered(), 10);

        let got = collect(&mut decoder, &wire[first_len + 10..]);
        assert_eq!(got, vec![expected[1].clone()]);
    }

    #[test]
    fn test_keepalive_skipped() {
        let bytes = message_bytes(9, b"payload");
        let mut wire = vec![0x85, 0x00, 0x00, 0x00];
        wire.extend_from_slice(&encode_frame(&bytes).unwrap());
        wire.extend_from_slice(&[0x85, 0x00, 0x00, 0x00]);

        let mut decoder = FrameDecoder::new();
        assert_eq!(collect(&mut decoder, &wire), vec![bytes]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_garbage_type_is_an_error() {
        let mut decoder = FrameDecoder::new();
        let results: Vec<_> = decoder.decode(&[0x42, 0x00, 0x00, 0x01, 0xFF]).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
        assert_eq!(decoder.buffered(), 0);
    }
}
