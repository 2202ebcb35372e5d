//! The Stream (ST) component: a published media source and its reader
//! fan-out, independent of any particular RTSP connection or session.
//!
//! The stream owns the per-track sequencing state and fans packets out to
//! readers directly, behind a `parking_lot::RwLock`. Path-to-stream lookup
//! is an application (`Handler`) concern, not this crate's.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::error::{Result, RtspError};
use crate::protocol::rtp::RtpHeaderView;
use crate::protocol::track::TrackDescriptor;

/// Sequence numbers within this many units of `lastSequenceNumber` (going
/// backwards) are treated as reordering, not wraparound.
const WRAP_WINDOW: u16 = 0x0fff;

/// Largest RTP packet accepted for fan-out; anything bigger is dropped with
/// a warning rather than forwarded, since TCP interleaving carries no MTU
/// constraint of its own but downstream readers still expect RTP-sized units.
pub const MAX_PACKET_SIZE: usize = 1472;

/// What [`ServerStream`] calls to hand a packet to one active reader.
///
/// Implemented by the session type; kept as a trait so this module doesn't
/// need to know about sessions, connections, or rings.
pub trait ReaderSink: Send + Sync {
    fn write_packet_rtp(&self, track_id: usize, packet: &[u8]);
    /// Opaque identity used for reader-set membership (the session's secret ID).
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Default)]
struct TrackState {
    first_packet_sent: bool,
    last_sequence_number: u16,
    last_ssrc: u32,
    last_time_rtp: u32,
    last_time_ntp: Option<Instant>,
}

struct Inner {
    tracks: Vec<TrackDescriptor>,
    track_state: Vec<TrackState>,
    readers: HashMap<String, Arc<dyn ReaderSink>>,
    active: HashSet<String>,
    closed: bool,
}

/// A published stream: canonical track list plus reader fan-out.
///
/// Cheaply cloneable — clones share the same underlying state.
#[derive(Clone)]
pub struct ServerStream {
    inner: Arc<RwLock<Inner>>,
}

impl ServerStream {
    /// Creates a stream from an announced track list. Each track's
    /// `control:` attribute is rewritten to `trackID=<i>` for `i` in
    /// `0..tracks.len()` — the canonical list exposed by the stream never
    /// carries the publisher's original control URLs.
    pub fn new(tracks: Vec<TrackDescriptor>) -> Self {
        let tracks: Vec<TrackDescriptor> = tracks
            .into_iter()
            .enumerate()
            .map(|(i, track)| track.with_control(format!("trackID={i}")))
            .collect();
        let track_state = vec![TrackState::default(); tracks.len()];
        Self {
            inner: Arc::new(RwLock::new(Inner {
                tracks,
                track_state,
                readers: HashMap::new(),
                active: HashSet::new(),
                closed: false,
            })),
        }
    }

    pub fn tracks(&self) -> Vec<TrackDescriptor> {
        self.inner.read().tracks.clone()
    }

    pub fn track_count(&self) -> usize {
        self.inner.read().tracks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// The SSRC last observed on `track_id`, once at least one packet has
    /// been published on it.
    pub fn ssrc(&self, track_id: usize) -> Option<u32> {
        let inner = self.inner.read();
        let state = inner.track_state.get(track_id)?;
        state.first_packet_sent.then_some(state.last_ssrc)
    }

    /// `(seq, rtptime)` for the `RTP-Info` header sent on PLAY: the next
    /// expected sequence number, and an RTP timestamp extrapolated from
    /// the last published packet using the track's clock rate. `None` until
    /// the track has carried at least one packet, or if its clock rate is
    /// unknown (callers then omit that track's RTP-Info entry rather than
    /// guessing).
    pub fn rtp_info(&self, track_id: usize, now: Instant) -> Option<(u16, u32)> {
        let inner = self.inner.read();
        let track = inner.tracks.get(track_id)?;
        let state = inner.track_state.get(track_id)?;
        if !state.first_packet_sent {
            return None;
        }
        let clock_rate = track.clock_rate()?;
        let last_ntp = state.last_time_ntp?;
        let elapsed = now.saturating_duration_since(last_ntp).as_secs_f64();
        let advanced = (elapsed * clock_rate as f64).round() as i64;
        // The `- clock_rate/10` term guards against downstream consumers
        // that treat a PLAY RTP-Info timestamp as a DTS and choke if it
        // exceeds the first packet's actual PTS.
        let timestamp = (state.last_time_rtp as i64)
            .wrapping_add(advanced)
            .wrapping_sub(clock_rate as i64 / 10) as u32;
        Some((state.last_sequence_number.wrapping_add(1), timestamp))
    }

    pub fn reader_add(&self, reader: Arc<dyn ReaderSink>) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(RtspError::StreamClosed);
        }
        inner.readers.insert(reader.id().to_string(), reader);
        Ok(())
    }

    pub fn reader_remove(&self, id: &str) {
        let mut inner = self.inner.write();
        inner.readers.remove(id);
        inner.active.remove(id);
    }

    pub fn reader_set_active(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(RtspError::StreamClosed);
        }
        if inner.readers.contains_key(id) {
            inner.active.insert(id.to_string());
        }
        Ok(())
    }

    pub fn reader_set_inactive(&self, id: &str) {
        self.inner.write().active.remove(id);
    }

    /// Closes the stream: clears every reader so further `reader_add`/
    /// `reader_set_active` calls fail with [`RtspError::StreamClosed`].
    pub fn close(&self) {
        let mut inner = self.inner.write();
        inner.closed = true;
        inner.readers.clear();
        inner.active.clear();
    }

    /// Publishes one RTP packet on `track_id`, updating per-track sequencing
    /// state and fanning it out to every currently active reader.
    ///
    /// `pts_equals_dts` marks packets where presentation and decode order
    /// coincide (e.g. non-B-frame video, or audio) — on those the publisher
    /// is the sole source of truth for sequencing state regardless of the
    /// wrap window.
    pub fn write_packet_rtp(&self, track_id: usize, packet: &[u8], pts_equals_dts: bool) {
        if packet.len() > MAX_PACKET_SIZE {
            tracing::warn!(track_id, len = packet.len(), "dropping oversized RTP packet");
            return;
        }
        let header = match RtpHeaderView::parse(packet) {
            Ok(header) => header,
            Err(_) => {
                tracing::warn!(track_id, "dropping packet with malformed RTP header");
                return;
            }
        };

        let mut inner = self.inner.write();
        if inner.closed {
            return;
        }
        let Some(state) = inner.track_state.get_mut(track_id) else {
            tracing::warn!(track_id, "dropping packet for unknown track");
            return;
        };

        let diff = state.last_sequence_number.wrapping_sub(header.sequence_number);
        let update_sequence = !state.first_packet_sent
            || pts_equals_dts
            || header.sequence_number > state.last_sequence_number
            || diff > WRAP_WINDOW;
        if update_sequence {
            state.last_sequence_number = header.sequence_number;
            state.last_ssrc = header.ssrc;
        }
        if !state.first_packet_sent || pts_equals_dts {
            state.last_time_rtp = header.timestamp;
            state.last_time_ntp = Some(Instant::now());
        }
        state.first_packet_sent = true;

        for (id, reader) in inner.readers.iter() {
            if inner.active.contains(id) {
                reader.write_packet_rtp(track_id, packet);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingReader {
        id: String,
        received: Mutex<Vec<(usize, Vec<u8>)>>,
    }

    impl ReaderSink for RecordingReader {
        fn write_packet_rtp(&self, track_id: usize, packet: &[u8]) {
            self.received.lock().unwrap().push((track_id, packet.to_vec()));
        }
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn rtp_packet(sequence: u16, timestamp: u32, ssrc: u32) -> Vec<u8> {
        let mut packet = vec![0x80, 0x60];
        packet.extend_from_slice(&sequence.to_be_bytes());
        packet.extend_from_slice(&timestamp.to_be_bytes());
        packet.extend_from_slice(&ssrc.to_be_bytes());
        packet.extend_from_slice(b"payload");
        packet
    }

    fn stream_with_one_track() -> ServerStream {
        let track = TrackDescriptor::new("video", 96)
            .with_attribute("rtpmap:96 H264/90000")
            .with_attribute("control:whatever");
        ServerStream::new(vec![track])
    }

    #[test]
    fn new_rewrites_control_to_track_id() {
        let stream = stream_with_one_track();
        assert_eq!(stream.tracks()[0].control(), Some("trackID=0"));
    }

    #[test]
    fn fan_out_reaches_only_active_readers() {
        let stream = stream_with_one_track();
        let active = Arc::new(RecordingReader {
            id: "active".to_string(),
            received: Mutex::new(Vec::new()),
        });
        let inactive = Arc::new(RecordingReader {
            id: "inactive".to_string(),
            received: Mutex::new(Vec::new()),
        });
        stream.reader_add(active.clone()).unwrap();
        stream.reader_add(inactive.clone()).unwrap();
        stream.reader_set_active("active").unwrap();

        stream.write_packet_rtp(0, &rtp_packet(1, 1000, 42), true);

        assert_eq!(active.received.lock().unwrap().len(), 1);
        assert_eq!(inactive.received.lock().unwrap().len(), 0);
    }

    #[test]
    fn reader_add_fails_once_closed() {
        let stream = stream_with_one_track();
        stream.close();
        let reader = Arc::new(RecordingReader {
            id: "r".to_string(),
            received: Mutex::new(Vec::new()),
        });
        assert!(matches!(
            stream.reader_add(reader),
            Err(RtspError::StreamClosed)
        ));
    }

    #[test]
    fn small_backward_step_is_treated_as_reorder() {
        let stream = stream_with_one_track();
        stream.write_packet_rtp(0, &rtp_packet(1000, 1000, 1), false);
        // A small backward step (within the wrap window) without pts==dts
        // must not move lastSequenceNumber backward.
        stream.write_packet_rtp(0, &rtp_packet(998, 1000, 1), false);
        assert_eq!(stream.ssrc(0), Some(1));
        // Confirm via RTP-Info that lastSequenceNumber is still 1000, i.e.
        // next expected is 1001.
        let (seq, _) = stream.rtp_info(0, Instant::now()).unwrap();
        assert_eq!(seq, 1001);
    }

    #[test]
    fn large_backward_step_is_treated_as_wraparound() {
        let stream = stream_with_one_track();
        stream.write_packet_rtp(0, &rtp_packet(5, 1000, 1), false);
        // Sequence number far below lastSequenceNumber (65530) but the
        // wrapping difference exceeds the window, so this is forward progress.
        stream.write_packet_rtp(0, &rtp_packet(65530, 1000, 2), false);
        let (seq, _) = stream.rtp_info(0, Instant::now()).unwrap();
        assert_eq!(seq, 65531);
        assert_eq!(stream.ssrc(0), Some(2));
    }

    #[test]
    fn rtp_info_is_none_before_first_packet() {
        let stream = stream_with_one_track();
        assert_eq!(stream.rtp_info(0, Instant::now()), None);
    }

    #[test]
    fn oversized_packet_is_dropped() {
        let stream = stream_with_one_track();
        let mut packet = rtp_packet(1, 1, 1);
        packet.resize(MAX_PACKET_SIZE + 1, 0);
        stream.write_packet_rtp(0, &packet, true);
        assert_eq!(stream.ssrc(0), None);
    }
}
