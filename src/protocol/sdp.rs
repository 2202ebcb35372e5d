//! SDP (Session Description Protocol, RFC 4566 / RFC 8866) codec.
//!
//! The wire format for ANNOUNCE bodies and DESCRIBE responses is pluggable —
//! an embedder that wants vendor-specific session-level attributes can
//! supply its own [`SdpCodec`]. [`BasicSdpCodec`] is the provided
//! implementation: a real parse/serialize pair, since tracks arrive over the
//! wire (via ANNOUNCE) instead of being constructed in-process.

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::track::TrackDescriptor;

/// Parses and serializes the list of [`TrackDescriptor`]s carried in an SDP
/// body.
pub trait SdpCodec: Send + Sync {
    fn parse(&self, body: &[u8]) -> Result<Vec<TrackDescriptor>>;
    fn serialize(&self, tracks: &[TrackDescriptor]) -> Vec<u8>;
}

/// Minimal SDP codec: understands `m=`/`a=` lines and ignores session-level
/// lines (`v=`, `o=`, `s=`, `c=`, `t=`) on parse, regenerating a fixed
/// session header on serialize.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicSdpCodec;

impl SdpCodec for BasicSdpCodec {
    fn parse(&self, body: &[u8]) -> Result<Vec<TrackDescriptor>> {
        let text = std::str::from_utf8(body).map_err(|_| RtspError::Parse {
            kind: ParseErrorKind::InvalidHeader,
        })?;

        let mut tracks = Vec::new();
        let mut current: Option<TrackDescriptor> = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(rest) = line.strip_prefix("m=") {
                if let Some(track) = current.take() {
                    tracks.push(track);
                }
                let mut fields = rest.split_whitespace();
                let media = fields.next().unwrap_or("application").to_string();
                let payload_type = fields.last().and_then(|p| p.parse().ok()).unwrap_or(0);
                current = Some(TrackDescriptor::new(media, payload_type));
            } else if let Some(rest) = line.strip_prefix("a=") {
                if let Some(track) = current.as_mut() {
                    track.attributes.push(rest.to_string());
                }
            }
        }
        if let Some(track) = current.take() {
            tracks.push(track);
        }

        if tracks.is_empty() {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            });
        }
        Ok(tracks)
    }

    fn serialize(&self, tracks: &[TrackDescriptor]) -> Vec<u8> {
        let mut lines = vec![
            "v=0".to_string(),
            "o=- 0 0 IN IP4 0.0.0.0".to_string(),
            "s=stream".to_string(),
            "t=0 0".to_string(),
        ];
        for track in tracks {
            lines.push(format!("m={} 0 RTP/AVP {}", track.media, track.payload_type));
            for attribute in &track.attributes {
                lines.push(format!("a={attribute}"));
            }
        }
        format!("{}\r\n", lines.join("\r\n")).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_tracks() {
        let sdp = b"v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\ns=stream\r\nt=0 0\r\n\
                    m=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\na=control:trackID=0\r\n\
                    m=audio 0 RTP/AVP 97\r\na=rtpmap:97 MPEG4-GENERIC/48000\r\na=control:trackID=1\r\n";
        let tracks = BasicSdpCodec.parse(sdp).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].media, "video");
        assert_eq!(tracks[0].payload_type, 96);
        assert_eq!(tracks[0].clock_rate(), Some(90000));
        assert_eq!(tracks[1].control(), Some("trackID=1"));
    }

    #[test]
    fn rejects_body_with_no_media_sections() {
        let sdp = b"v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\ns=stream\r\nt=0 0\r\n";
        assert!(BasicSdpCodec.parse(sdp).is_err());
    }

    #[test]
    fn round_trips_through_serialize_and_parse() {
        let tracks = vec![
            TrackDescriptor::new("video", 96)
                .with_attribute("rtpmap:96 H264/90000")
                .with_attribute("control:trackID=0"),
            TrackDescriptor::new("audio", 97).with_attribute("control:trackID=1"),
        ];
        let body = BasicSdpCodec.serialize(&tracks);
        let parsed = BasicSdpCodec.parse(&body).unwrap();
        assert_eq!(parsed, tracks);
    }
}
