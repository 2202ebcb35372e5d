//! Application handler interface.
//!
//! The core never knows about path routing, authentication, or disk
//! recording — it calls out to an embedding application through a single
//! `Handler` trait for every policy decision, modelled as a trait object
//! (`Arc<dyn Handler>`) for dynamic dispatch.
//!
//! A response with a non-200 status code, or a returned error, aborts the
//! state transition that would otherwise have fired; the connection stays
//! open unless the error is one of the fatal kinds in [`crate::error::RtspError::is_fatal`].

use std::net::SocketAddr;

use crate::error::RtspError;
use crate::protocol::{RtspResponse, TrackDescriptor};
use crate::stream::ServerStream;

/// Capability set the core calls into the embedding application with.
///
/// All operations are synchronous: the calling Session/Connection thread
/// blocks on them, matching the "no component dereferences another's
/// internal state directly" rule — the handler only ever sees immutable
/// snapshots (session ID, path, track list) passed by value.
pub trait Handler: Send + Sync {
    /// A connection has closed. `error` is `None` on a clean close.
    fn on_conn_close(&self, _conn_id: u64, _error: Option<&RtspError>) {}

    /// A session has just been created by `conn_id` for `path`.
    fn on_session_open(&self, _session_id: &str, _conn_id: u64, _path: &str) {}

    /// A session has ended. `error` is `None` on a clean TEARDOWN.
    fn on_session_close(&self, _session_id: &str, _error: Option<&RtspError>) {}

    /// DESCRIBE for `path`. Returns the response to send and, when it's a
    /// published stream, the stream's current track list used to build the
    /// SDP body.
    fn on_describe(&self, path: &str) -> (RtspResponse, Option<Vec<TrackDescriptor>>);

    /// ANNOUNCE of `tracks` at `path` by `session_id`. A non-200 response
    /// aborts the `Initial -> PreRecord` transition.
    fn on_announce(&self, session_id: &str, path: &str, tracks: &[TrackDescriptor]) -> RtspResponse;

    /// SETUP of `track_id` at `path` by `session_id`. On success returns the
    /// [`ServerStream`] the session should attach to as a reader (play) or
    /// publisher (record).
    fn on_setup(&self, session_id: &str, path: &str, track_id: usize) -> (RtspResponse, Option<ServerStream>);

    /// PLAY on `session_id`. A non-200 response aborts the transition to `Play`.
    fn on_play(&self, session_id: &str) -> RtspResponse {
        let _ = session_id;
        RtspResponse::ok()
    }

    /// RECORD on `session_id`. A non-200 response aborts the transition to `Record`.
    fn on_record(&self, session_id: &str) -> RtspResponse {
        let _ = session_id;
        RtspResponse::ok()
    }

    /// One RTP packet was received on `track_id` for `session_id`, already
    /// parsed down to a valid RTP header by the connection's record-mode
    /// read loop.
    fn on_packet_rtp(&self, _session_id: &str, _track_id: usize, _packet: &[u8]) {}
}

/// Handler that accepts every ANNOUNCE/SETUP/PLAY/RECORD and does nothing
/// else — useful for tests and as a starting point for embedders that only
/// need DESCRIBE/stream wiring, not auth.
#[derive(Default)]
pub struct PermissiveHandler;

impl Handler for PermissiveHandler {
    fn on_describe(&self, _path: &str) -> (RtspResponse, Option<Vec<TrackDescriptor>>) {
        (RtspResponse::not_found(), None)
    }

    fn on_announce(&self, _session_id: &str, _path: &str, _tracks: &[TrackDescriptor]) -> RtspResponse {
        RtspResponse::ok()
    }

    fn on_setup(&self, _session_id: &str, _path: &str, _track_id: usize) -> (RtspResponse, Option<ServerStream>) {
        (RtspResponse::ok(), None)
    }
}

/// Address pair used for the session-author IP/zone comparison.
/// `zone` distinguishes e.g. IPv6 scope IDs on link-local addresses; for the
/// plain IPv4/IPv6 sockets this crate deals in, it's always empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr {
    pub addr: SocketAddr,
    pub zone: &'static str,
}

impl RemoteAddr {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, zone: "" }
    }
}
