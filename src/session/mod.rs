//! The Session (SS) component: one RTSP session's state machine.
//!
//! Each session is held behind a `parking_lot::Mutex<SessionData>` with
//! `tracing::debug!` on every transition, and drives the full
//! ANNOUNCE/SETUP/PLAY/RECORD/TEARDOWN machine that publish and subscribe
//! sessions both go through.
//!
//! A session's request handlers (`announce`/`setup`/`play`/`record`/
//! `teardown`) are called synchronously by the connection thread that owns
//! the request, holding `SessionData`'s `Mutex` for the duration — this is
//! the realization of "exactly one task mutates a session's fields at a
//! time" the design calls for, without a dedicated session task and request
//! channel: the mutex *is* the single-writer invariant, and a session never
//! blocks inside it (no channel send/recv while holding the lock), so it
//! composes safely with [`crate::stream::ServerStream`]'s own lock.

pub mod setup_track;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::connection::{ConnHandle, ReadMode};
use crate::error::{Result, RtspError};
use crate::handler::{Handler, RemoteAddr};
use crate::protocol::{RtspResponse, TrackDescriptor, TransportHeader, TransportMode};
use crate::ring;
use crate::stream::{ReaderSink, ServerStream};

pub use setup_track::SetupTrack;

/// One outgoing interleaved frame, resolved to its channel.
type OutFrame = (u8, Vec<u8>);

/// Session state machine. `Terminal` is reached by TEARDOWN and is
/// not named in the data model as a distinct state, but every request after
/// it must still be rejected, so it gets its own variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initial,
    PrePlay,
    Play,
    PreRecord,
    Record,
    Terminal,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Initial => "Initial",
            SessionState::PrePlay => "PrePlay",
            SessionState::Play => "Play",
            SessionState::PreRecord => "PreRecord",
            SessionState::Record => "Record",
            SessionState::Terminal => "Terminal",
        }
    }
}

struct SessionData {
    state: SessionState,
    bound_conn_id: Option<u64>,
    setup_tracks: HashMap<usize, SetupTrack>,
    setup_by_channel: HashMap<u8, usize>,
    announced_tracks: Vec<TrackDescriptor>,
    announced_track_paths: Vec<String>,
    setupped_path: Option<String>,
    stream: Option<ServerStream>,
    out_tx: Option<Sender<OutFrame>>,
    last_activity: Instant,
}

/// One RTSP session, keyed by its server-assigned secret ID.
pub struct Session {
    pub id: String,
    pub author: RemoteAddr,
    data: Mutex<SessionData>,
}

impl Session {
    pub fn new(id: String, author: RemoteAddr, conn_id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            author,
            data: Mutex::new(SessionData {
                state: SessionState::Initial,
                bound_conn_id: Some(conn_id),
                setup_tracks: HashMap::new(),
                setup_by_channel: HashMap::new(),
                announced_tracks: Vec::new(),
                announced_track_paths: Vec::new(),
                setupped_path: None,
                stream: None,
                out_tx: None,
                last_activity: Instant::now(),
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        self.data.lock().state
    }

    pub fn last_activity(&self) -> Instant {
        self.data.lock().last_activity
    }

    fn touch(&self) {
        self.data.lock().last_activity = Instant::now();
    }

    /// Track ID for a SETUP'd even interleaved channel, if any. Used by the
    /// connection's record-mode frame lookup.
    pub fn track_id_for_channel(&self, channel: u8) -> Option<usize> {
        self.data.lock().setup_by_channel.get(&channel).copied()
    }

    pub fn bound_stream(&self) -> Option<ServerStream> {
        self.data.lock().stream.clone()
    }

    pub fn is_bound_to(&self, conn_id: u64) -> bool {
        self.data.lock().bound_conn_id == Some(conn_id)
    }

    /// Tears down internal state without notifying the handler — used when
    /// the owning connection disappears out from under the session. The
    /// caller is responsible for the
    /// `on_session_close` callback and removing the session from the table.
    pub fn force_terminate(&self) {
        let mut data = self.data.lock();
        if let Some(stream) = data.stream.take() {
            stream.reader_remove(&self.id);
        }
        data.out_tx = None;
        data.state = SessionState::Terminal;
    }

    /// Authorization invariant: a request must come from the
    /// connection that authored the session (same remote IP/zone), checked
    /// before the session even exists; and once a connection is bound to
    /// this session (after PLAY/RECORD), every later request must come from
    /// that same connection.
    fn check_conn(&self, conn_id: u64) -> Result<()> {
        let data = self.data.lock();
        if let Some(bound) = data.bound_conn_id {
            if bound != conn_id {
                return Err(RtspError::SessionLinkedToOtherConn);
            }
        }
        if matches!(data.state, SessionState::Terminal) {
            return Err(RtspError::InvalidState {
                current: "Terminal",
                allowed: &[],
            });
        }
        Ok(())
    }

    pub fn options(&self) -> RtspResponse {
        self.touch();
        RtspResponse::ok()
    }

    pub fn announce(
        &self,
        conn_id: u64,
        path: &str,
        tracks: Vec<TrackDescriptor>,
        handler: &Arc<dyn Handler>,
    ) -> Result<RtspResponse> {
        self.check_conn(conn_id)?;
        let mut data = self.data.lock();
        if data.state != SessionState::Initial {
            return Err(RtspError::InvalidState {
                current: data.state.name(),
                allowed: &["Initial"],
            });
        }

        let mut paths = Vec::with_capacity(tracks.len());
        for track in &tracks {
            paths.push(derive_track_path(path, track)?);
        }

        let response = handler.on_announce(&self.id, path, &tracks);
        if response.status_code != 200 {
            return Ok(response);
        }

        data.announced_tracks = tracks;
        data.announced_track_paths = paths;
        data.state = SessionState::PreRecord;
        data.last_activity = Instant::now();
        Ok(response)
    }

    pub fn setup(
        &self,
        conn_id: u64,
        path: &str,
        transport: &TransportHeader,
        handler: &Arc<dyn Handler>,
    ) -> Result<RtspResponse> {
        self.check_conn(conn_id)?;
        let (a, b) = transport.interleaved.ok_or(RtspError::NoInterleavedIds)?;
        if a % 2 != 0 || b != a + 1 {
            return Err(RtspError::InvalidInterleavedIds(a, b));
        }

        let mut data = self.data.lock();
        if data.setup_by_channel.contains_key(&a) {
            return Err(RtspError::InterleavedIdsAlreadyUsed(a));
        }

        match data.state {
            SessionState::Initial | SessionState::PrePlay => {
                if matches!(transport.mode, Some(TransportMode::Record)) {
                    return Err(RtspError::InvalidTransportMode);
                }
                let track_id = parse_play_track_id(path)?;
                let base = play_base_path(path);
                if let Some(setupped) = &data.setupped_path {
                    if setupped != base {
                        return Err(RtspError::TrackPathMismatch);
                    }
                }
                if data.setup_tracks.contains_key(&track_id) {
                    return Err(RtspError::TrackAlreadySetup(track_id));
                }

                let (response, stream) = handler.on_setup(&self.id, path, track_id);
                if response.status_code != 200 {
                    return Ok(response);
                }
                if let Some(stream) = stream {
                    stream.reader_add(self.clone_reader_sink())?;
                    data.stream = Some(stream);
                }

                let ssrc = data.stream.as_ref().and_then(|s| s.ssrc(track_id));
                data.setup_tracks.insert(track_id, SetupTrack::new((a, b)));
                data.setup_by_channel.insert(a, track_id);
                data.setupped_path = Some(base.to_string());
                data.state = SessionState::PrePlay;
                data.last_activity = Instant::now();

                Ok(build_setup_response(response, (a, b), transport.mode, ssrc))
            }
            SessionState::PreRecord => {
                if !matches!(transport.mode, Some(TransportMode::Record)) {
                    return Err(RtspError::InvalidTransportMode);
                }
                let track_id = data
                    .announced_track_paths
                    .iter()
                    .position(|p| p == path)
                    .ok_or_else(|| RtspError::InvalidPath(path.to_string()))?;
                if data.setup_tracks.contains_key(&track_id) {
                    return Err(RtspError::TrackAlreadySetup(track_id));
                }

                let (response, stream) = handler.on_setup(&self.id, path, track_id);
                if response.status_code != 200 {
                    return Ok(response);
                }
                if data.stream.is_none() {
                    data.stream = stream;
                }
                data.setup_tracks.insert(track_id, SetupTrack::new((a, b)));
                data.setup_by_channel.insert(a, track_id);
                data.last_activity = Instant::now();

                Ok(build_setup_response(response, (a, b), transport.mode, None))
            }
            other => Err(RtspError::InvalidState {
                current: other.name(),
                allowed: &["Initial", "PrePlay", "PreRecord"],
            }),
        }
    }

    pub fn play(
        &self,
        conn_id: u64,
        path: &str,
        conn: &Arc<ConnHandle>,
        config: &ServerConfig,
        handler: &Arc<dyn Handler>,
    ) -> Result<RtspResponse> {
        self.check_conn(conn_id)?;
        let mut data = self.data.lock();
        match data.state {
            SessionState::Play => return Ok(RtspResponse::ok()),
            SessionState::PrePlay => {}
            other => {
                return Err(RtspError::InvalidState {
                    current: other.name(),
                    allowed: &["PrePlay", "Play"],
                });
            }
        }
        match &data.setupped_path {
            Some(setupped) if setupped == play_base_path(path) => {}
            _ => return Err(RtspError::InvalidPath(path.to_string())),
        }

        let response = handler.on_play(&self.id);
        if response.status_code != 200 {
            return Ok(response);
        }

        let (out_tx, out_rx) = ring::new_ring(config.write_buffer_count)?;
        data.out_tx = Some(out_tx);
        data.state = SessionState::Play;
        data.bound_conn_id = Some(conn_id);
        data.last_activity = Instant::now();

        if let Some(stream) = &data.stream {
            stream.reader_set_active(&self.id)?;
        }
        let rtp_info = self.build_rtp_info(&data);

        conn.switch_read_mode(ReadMode::InterleavedPlay);
        spawn_writer(self.id.clone(), out_rx, conn.clone());

        drop(data);
        let mut response = response;
        if let Some(rtp_info) = rtp_info {
            response = response.add_header("RTP-Info", &rtp_info);
        }
        Ok(response)
    }

    pub fn record(
        &self,
        conn_id: u64,
        conn: &Arc<ConnHandle>,
        config: &ServerConfig,
        handler: &Arc<dyn Handler>,
    ) -> Result<RtspResponse> {
        self.check_conn(conn_id)?;
        let mut data = self.data.lock();
        if data.state != SessionState::PreRecord {
            return Err(RtspError::InvalidState {
                current: data.state.name(),
                allowed: &["PreRecord"],
            });
        }
        if data.setup_tracks.len() != data.announced_tracks.len() {
            return Err(RtspError::NotAllTracksSetup);
        }

        let response = handler.on_record(&self.id);
        if response.status_code != 200 {
            return Ok(response);
        }

        let (out_tx, out_rx) = ring::new_ring(config.write_buffer_count)?;
        data.out_tx = Some(out_tx);
        data.state = SessionState::Record;
        data.bound_conn_id = Some(conn_id);
        data.last_activity = Instant::now();

        conn.switch_read_mode(ReadMode::InterleavedRecord);
        spawn_writer(self.id.clone(), out_rx, conn.clone());

        Ok(response)
    }

    pub fn teardown(&self, conn_id: u64, conn: &Arc<ConnHandle>) -> Result<RtspResponse> {
        self.check_conn(conn_id)?;
        let mut data = self.data.lock();
        if !matches!(
            data.state,
            SessionState::Play | SessionState::Record | SessionState::PrePlay | SessionState::PreRecord
        ) {
            return Err(RtspError::InvalidState {
                current: data.state.name(),
                allowed: &["PrePlay", "Play", "PreRecord", "Record"],
            });
        }
        if let Some(stream) = data.stream.take() {
            stream.reader_remove(&self.id);
        }
        data.out_tx = None;
        data.state = SessionState::Terminal;
        conn.switch_read_mode(ReadMode::Standard);
        Ok(RtspResponse::ok())
    }

    /// Publishes `payload` on `channel` via this session's outgoing ring,
    /// dropping it silently if the ring is absent (no PLAY/RECORD yet) or
    /// full.
    fn publish(&self, channel: u8, payload: Vec<u8>) {
        let data = self.data.lock();
        if let Some(tx) = &data.out_tx {
            ring::try_publish(tx, (channel, payload));
        }
    }

    fn clone_reader_sink(self: &Arc<Self>) -> Arc<dyn ReaderSink> {
        self.clone()
    }

    fn build_rtp_info(&self, data: &SessionData) -> Option<String> {
        let stream = data.stream.as_ref()?;
        let base = data.setupped_path.as_deref().unwrap_or("");
        let now = Instant::now();
        let mut track_ids: Vec<usize> = data.setup_tracks.keys().copied().collect();
        track_ids.sort_unstable();
        let entries: Vec<String> = track_ids
            .into_iter()
            .filter_map(|track_id| {
                let (seq, rtptime) = stream.rtp_info(track_id, now)?;
                Some(format!("url={base}/trackID={track_id};seq={seq};rtptime={rtptime}"))
            })
            .collect();
        if entries.is_empty() {
            None
        } else {
            Some(entries.join(","))
        }
    }
}

impl ReaderSink for Session {
    fn write_packet_rtp(&self, track_id: usize, packet: &[u8]) {
        let channel = {
            let data = self.data.lock();
            data.setup_tracks.get(&track_id).map(|t| t.interleaved.0)
        };
        if let Some(channel) = channel {
            self.publish(channel, packet.to_vec());
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}

fn spawn_writer(session_id: String, rx: Receiver<OutFrame>, conn: Arc<ConnHandle>) {
    let builder = std::thread::Builder::new().name(format!("rtsp-writer-{session_id}"));
    let spawned = builder.spawn(move || {
        while let Ok((channel, payload)) = rx.recv() {
            if let Err(err) = conn.write_frame(channel, &payload) {
                tracing::warn!(session_id, error = %err, "writer thread stopping after write failure");
                return;
            }
        }
        tracing::debug!(session_id, "writer thread exiting, ring closed");
    });
    if let Err(err) = spawned {
        tracing::error!(error = %err, "failed to spawn session writer thread");
    }
}

/// Play-mode track ID derivation: an explicit `/trackID=<n>` suffix,
/// or (ffmpeg compatibility) a bare trailing slash meaning track 0.
fn parse_play_track_id(path: &str) -> Result<usize> {
    if let Some(idx) = path.rfind("/trackID=") {
        let digits = &path[idx + "/trackID=".len()..];
        return digits
            .parse()
            .map_err(|_| RtspError::InvalidPath(path.to_string()));
    }
    if path.ends_with('/') {
        return Ok(0);
    }
    Err(RtspError::InvalidPath(path.to_string()))
}

/// The common base path a play-mode SETUP and the aggregate PLAY request
/// compare against: the per-track `/trackID=<n>` suffix stripped (or, for the
/// bare-trailing-slash form, just the trailing slash), so a multi-track
/// session's second SETUP and its PLAY still match the first SETUP's path.
fn play_base_path(path: &str) -> &str {
    match path.rfind("/trackID=") {
        Some(idx) => path[..idx].trim_end_matches('/'),
        None => path.trim_end_matches('/'),
    }
}

/// Per-track URL derivation for ANNOUNCE: join the track's `control:`
/// attribute against the announce path, rejecting a result that escapes it.
fn derive_track_path(announce_path: &str, track: &TrackDescriptor) -> Result<String> {
    let control = track
        .control()
        .ok_or_else(|| RtspError::InvalidTrackUrl("missing control attribute".to_string()))?;
    let derived = if control.contains("://") {
        crate::protocol::url::parse_rtsp_url(control)?.path
    } else {
        format!("{}/{control}", announce_path.trim_end_matches('/'))
    };
    if !derived.starts_with(announce_path) {
        return Err(RtspError::InvalidTrackPrefix(derived));
    }
    Ok(derived)
}

fn build_setup_response(
    base: RtspResponse,
    interleaved: (u8, u8),
    mode: Option<TransportMode>,
    ssrc: Option<u32>,
) -> RtspResponse {
    let mode_str = match mode {
        Some(TransportMode::Record) => "record",
        _ => "play",
    };
    let mut value = format!(
        "RTP/AVP/TCP;unicast;interleaved={}-{};mode={mode_str}",
        interleaved.0, interleaved.1,
    );
    if let Some(ssrc) = ssrc {
        value.push_str(&format!(";ssrc={ssrc:08x}"));
    }
    base.add_header("Transport", &value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnHandle;
    use crate::handler::PermissiveHandler;
    use std::net::{TcpListener, TcpStream};

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn test_session() -> (Arc<Session>, Arc<ConnHandle>, ServerConfig, Arc<dyn Handler>) {
        let (_client, server) = loopback_pair();
        let conn = Arc::new(ConnHandle::new(server, std::time::Duration::from_secs(10)));
        let author = RemoteAddr::new(conn.remote_addr());
        let session = Session::new("1234".to_string(), author, 1);
        let config = ServerConfig::new("127.0.0.1:0");
        let handler: Arc<dyn Handler> = Arc::new(PermissiveHandler);
        (session, conn, config, handler)
    }

    #[test]
    fn announce_then_setup_then_record_requires_all_tracks() {
        let (session, conn, config, handler) = test_session();
        let tracks = vec![
            TrackDescriptor::new("video", 96)
                .with_attribute("control:trackID=0")
                .with_attribute("rtpmap:96 H264/90000"),
            TrackDescriptor::new("audio", 97).with_attribute("control:trackID=1"),
        ];
        let response = session.announce(1, "/cam", tracks, &handler).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(session.state(), SessionState::PreRecord);

        let transport = TransportHeader {
            interleaved: Some((0, 1)),
            mode: Some(TransportMode::Record),
        };
        let response = session.setup(1, "/cam/trackID=0", &transport, &handler).unwrap();
        assert_eq!(response.status_code, 200);

        let err = session.record(1, &conn, &config, &handler).unwrap_err();
        assert!(matches!(err, RtspError::NotAllTracksSetup));

        let transport2 = TransportHeader {
            interleaved: Some((2, 3)),
            mode: Some(TransportMode::Record),
        };
        session.setup(1, "/cam/trackID=1", &transport2, &handler).unwrap();
        let response = session.record(1, &conn, &config, &handler).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(session.state(), SessionState::Record);
    }

    #[test]
    fn double_setup_of_same_track_is_rejected() {
        let (session, _conn, _config, handler) = test_session();
        let transport = TransportHeader {
            interleaved: Some((0, 1)),
            mode: Some(TransportMode::Play),
        };
        let r1 = session.setup(1, "/cam/trackID=0", &transport, &handler).unwrap();
        assert_eq!(r1.status_code, 200);

        let transport2 = TransportHeader {
            interleaved: Some((2, 3)),
            mode: Some(TransportMode::Play),
        };
        let err = session.setup(1, "/cam/trackID=0", &transport2, &handler).unwrap_err();
        assert!(matches!(err, RtspError::TrackAlreadySetup(0)));
    }

    #[test]
    fn request_from_other_connection_once_bound_is_rejected() {
        let (session, conn, config, handler) = test_session();
        let transport = TransportHeader {
            interleaved: Some((0, 1)),
            mode: Some(TransportMode::Play),
        };
        session.setup(1, "/cam/", &transport, &handler).unwrap();
        session.play(1, "/cam/", &conn, &config, &handler).unwrap();

        let err = session.play(2, "/cam/", &conn, &config, &handler).unwrap_err();
        assert!(matches!(err, RtspError::SessionLinkedToOtherConn));
    }

    #[test]
    fn multi_track_play_setup_shares_a_base_path_for_the_aggregate_play() {
        let (session, conn, config, handler) = test_session();
        let transport0 = TransportHeader {
            interleaved: Some((0, 1)),
            mode: Some(TransportMode::Play),
        };
        session.setup(1, "/cam/trackID=0", &transport0, &handler).unwrap();

        let transport1 = TransportHeader {
            interleaved: Some((2, 3)),
            mode: Some(TransportMode::Play),
        };
        let response = session.setup(1, "/cam/trackID=1", &transport1, &handler).unwrap();
        assert_eq!(response.status_code, 200);

        let response = session.play(1, "/cam", &conn, &config, &handler).unwrap();
        assert_eq!(response.status_code, 200);
    }
}
