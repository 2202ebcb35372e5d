//! RFC 3550 §5.1 fixed RTP header, read-only.
//!
//! This crate never originates RTP packets — tracks are opaque payload
//! streams handed to it by the publishing connection — so only a parser is
//! needed; sequence number, timestamp and SSRC are exactly the fields
//! [`crate::stream::ServerStream`] needs for its per-track sequencing
//! bookkeeping.

use crate::error::{ParseErrorKind, Result, RtspError};

pub const RTP_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeaderView {
    pub version: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeaderView {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < RTP_HEADER_LEN {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            });
        }
        Ok(Self {
            version: packet[0] >> 6,
            marker: packet[1] & 0x80 != 0,
            payload_type: packet[1] & 0x7f,
            sequence_number: u16::from_be_bytes([packet[2], packet[3]]),
            timestamp: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
            ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet(sequence: u16, timestamp: u32, ssrc: u32) -> Vec<u8> {
        let mut packet = vec![0x80, 0x60];
        packet.extend_from_slice(&sequence.to_be_bytes());
        packet.extend_from_slice(&timestamp.to_be_bytes());
        packet.extend_from_slice(&ssrc.to_be_bytes());
        packet.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        packet
    }

    #[test]
    fn parses_fixed_header_fields() {
        let packet = sample_packet(1000, 90000, 0xabcdef01);
        let header = RtpHeaderView::parse(&packet).unwrap();
        assert_eq!(header.version, 2);
        assert!(!header.marker);
        assert_eq!(header.payload_type, 0x60);
        assert_eq!(header.sequence_number, 1000);
        assert_eq!(header.timestamp, 90000);
        assert_eq!(header.ssrc, 0xabcdef01);
    }

    #[test]
    fn marker_bit_is_decoded() {
        let mut packet = sample_packet(1, 0, 0);
        packet[1] |= 0x80;
        let header = RtpHeaderView::parse(&packet).unwrap();
        assert!(header.marker);
    }

    #[test]
    fn rejects_short_packet() {
        assert!(RtpHeaderView::parse(&[0x80, 0x60, 0, 1]).is_err());
    }
}
