//! RFC 2326 §10.12 interleaved-frame framing.
//!
//! `$` + 1-byte channel + 2-byte big-endian length + payload. The length
//! field bounds a single frame to 65535 bytes on the wire; the connection
//! still tracks a separate, larger cap ([`crate::protocol::request::MAX_BODY_SIZE`])
//! for Content-Length-declared request bodies, where no such wire limit
//! applies.

use std::io::{Read, Write};

use crate::error::Result;

pub const INTERLEAVED_MAGIC: u8 = b'$';

/// One interleaved RTP/RTCP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleavedFrame {
    pub channel: u8,
    pub payload: Vec<u8>,
}

impl InterleavedFrame {
    pub fn new(channel: u8, payload: Vec<u8>) -> Self {
        Self { channel, payload }
    }

    /// Serializes this frame including the leading `$` magic byte.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        buf.push(INTERLEAVED_MAGIC);
        buf.push(self.channel);
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.encode())?;
        Ok(())
    }

    /// Reads one frame from `r`, assuming the leading `$` magic byte has
    /// already been consumed by the caller (it's what the read loop peeks at
    /// to decide whether to enter this path at all).
    pub fn read_after_magic<R: Read>(r: &mut R) -> Result<InterleavedFrame> {
        let mut header = [0u8; 3];
        r.read_exact(&mut header)?;
        let channel = header[0];
        let len = u16::from_be_bytes([header[1], header[2]]) as usize;
        let mut payload = vec![0u8; len];
        r.read_exact(&mut payload)?;
        Ok(InterleavedFrame { channel, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_read() {
        let frame = InterleavedFrame::new(2, vec![1, 2, 3, 4]);
        let encoded = frame.encode();
        assert_eq!(encoded[0], INTERLEAVED_MAGIC);
        let mut rest = &encoded[1..];
        let decoded = InterleavedFrame::read_after_magic(&mut rest).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn empty_payload_round_trips() {
        let frame = InterleavedFrame::new(0, Vec::new());
        let encoded = frame.encode();
        assert_eq!(encoded.len(), 4);
        let mut rest = &encoded[1..];
        let decoded = InterleavedFrame::read_after_magic(&mut rest).unwrap();
        assert_eq!(decoded.payload.len(), 0);
    }
}
