//! The Server (S) component: listens, accepts connections, and owns the
//! session table.
//!
//! A nonblocking `TcpListener` is polled against a shared `AtomicBool`, with
//! one OS thread spawned per accepted connection and `tracing::info!` on
//! bind. The session table is an `Arc<RwLock<HashMap<...>>>` keyed by
//! session ID.
//!
//! Session-scoped requests (ANNOUNCE/SETUP/PLAY/RECORD/TEARDOWN) are
//! resolved here rather than routed through a separate control-loop
//! channel: [`ServerHandle::dispatch_session_request`] does the
//! IP/zone authorization check and session lookup/creation directly,
//! called synchronously from the requesting [`crate::connection::Connection`]'s
//! own thread. This collapses the conceptual
//! connection -> server-control-loop -> session hop into one synchronous
//! call guarded by the session table's lock, which gives the same
//! per-session ordering guarantee (one session mutation at a time) without
//! a dedicated control-loop thread and envelope type — see DESIGN.md.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::RngCore;

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnHandle};
use crate::error::{Result, RtspError};
use crate::handler::{Handler, RemoteAddr};
use crate::protocol::{BasicSdpCodec, RtspRequest, RtspResponse, SdpCodec, TrackDescriptor, TransportHeader};
use crate::session::Session;

/// How long the accept loop sleeps between nonblocking `accept()` polls.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct ServerInner {
    config: ServerConfig,
    handler: Arc<dyn Handler>,
    sdp_codec: Arc<dyn SdpCodec>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    next_conn_id: AtomicU64,
}

/// Cheaply-cloneable handle to the server's shared state, held by every
/// [`Connection`] and passed into every [`Session`] call that needs the
/// handler or SDP codec.
#[derive(Clone)]
pub struct ServerHandle(Arc<ServerInner>);

impl ServerHandle {
    pub fn config(&self) -> &ServerConfig {
        &self.0.config
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.0.handler
    }

    pub fn sdp_codec(&self) -> &Arc<dyn SdpCodec> {
        &self.0.sdp_codec
    }

    pub fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        self.0.sessions.read().get(id).cloned()
    }

    /// A connection that was bound to `session_id` just closed. If it's
    /// still the session's bound connection, the session dies with it.
    pub fn detach_connection(&self, session_id: &str, conn_id: u64) {
        let Some(session) = self.get_session(session_id) else {
            return;
        };
        if !session.is_bound_to(conn_id) {
            return;
        }
        session.force_terminate();
        self.0.sessions.write().remove(session_id);
        self.handler().on_session_close(session_id, Some(&RtspError::Terminated));
    }

    /// Resolves and forwards one session-scoped request:
    /// - looks up `session_id`, or creates a session when `create_if_missing`
    ///   and none was given/found;
    /// - rejects with [`RtspError::SessionCreatedByOtherIp`] if the request's
    ///   remote doesn't match the session's author;
    /// - calls the matching [`Session`] method.
    ///
    /// Returns the response and the session's ID, so the caller (the
    /// connection) can remember it for subsequent requests on the same TCP
    /// connection even when the client omits the `Session` header.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch_session_request(
        &self,
        session_id: Option<String>,
        create_if_missing: bool,
        conn_id: u64,
        remote: RemoteAddr,
        request: &RtspRequest,
        transport: Option<TransportHeader>,
        tracks: Option<Vec<TrackDescriptor>>,
        conn: Arc<ConnHandle>,
    ) -> Result<(RtspResponse, String)> {
        let path = crate::protocol::url::parse_rtsp_url(&request.uri)?.path;

        let session = self.resolve_session(session_id, create_if_missing, remote, conn_id)?;
        let id = session.id.clone();
        let handler = self.handler();

        // TEARDOWN responses don't carry a `Session` header; every other
        // session response does, so the client can learn a server-assigned
        // ID from its very first ANNOUNCE/SETUP response.
        let response = match request.method.as_str() {
            "ANNOUNCE" => session
                .announce(conn_id, &path, tracks.unwrap_or_default(), handler)?
                .add_header("Session", &id),
            "SETUP" => {
                let transport = transport.ok_or(RtspError::NoInterleavedIds)?;
                session.setup(conn_id, &path, &transport, handler)?.add_header("Session", &id)
            }
            "PLAY" => session
                .play(conn_id, &path, &conn, self.config(), handler)?
                .add_header("Session", &id),
            "RECORD" => session
                .record(conn_id, &conn, self.config(), handler)?
                .add_header("Session", &id),
            "TEARDOWN" => {
                let response = session.teardown(conn_id, &conn)?;
                self.0.sessions.write().remove(&id);
                handler.on_session_close(&id, None);
                response
            }
            other => return Err(RtspError::UnknownMethod(other.to_string())),
        };
        Ok((response, id))
    }

    fn resolve_session(
        &self,
        session_id: Option<String>,
        create_if_missing: bool,
        remote: RemoteAddr,
        conn_id: u64,
    ) -> Result<Arc<Session>> {
        if let Some(id) = &session_id {
            if let Some(session) = self.get_session(id) {
                if session.author.addr != remote.addr || session.author.zone != remote.zone {
                    return Err(RtspError::SessionCreatedByOtherIp);
                }
                return Ok(session);
            }
            if !create_if_missing {
                return Err(RtspError::SessionNotFound(id.clone()));
            }
        } else if !create_if_missing {
            return Err(RtspError::SessionNotFound(String::new()));
        }
        self.create_session(remote, conn_id)
    }

    /// Secret-ID allocation: 4 random bytes read as a little-endian
    /// `u32`, formatted in decimal, retried on collision.
    fn create_session(&self, remote: RemoteAddr, conn_id: u64) -> Result<Arc<Session>> {
        let mut sessions = self.0.sessions.write();
        for _ in 0..8 {
            let mut bytes = [0u8; 4];
            rand::rng().fill_bytes(&mut bytes);
            let id = u32::from_le_bytes(bytes).to_string();
            if sessions.contains_key(&id) {
                continue;
            }
            let session = Session::new(id.clone(), remote, conn_id);
            sessions.insert(id.clone(), session.clone());
            drop(sessions);
            self.handler().on_session_open(&id, conn_id, "");
            return Ok(session);
        }
        Err(RtspError::ServerInternalError(
            "failed to allocate a unique session id after 8 attempts".to_string(),
        ))
    }

    fn next_conn_id(&self) -> u64 {
        self.0.next_conn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Scans the session table for sessions idle past `session_timeout`,
    /// tearing each one down and notifying the handler. Run periodically by
    /// [`Server`]'s timeout-sweep thread, every `check_stream_period`.
    fn sweep_timed_out_sessions(&self) {
        let timeout = self.0.config.session_timeout;
        let stale: Vec<String> = self
            .0
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| session.last_activity().elapsed() > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(session) = self.0.sessions.write().remove(&id) {
                session.force_terminate();
                self.handler().on_session_close(&id, Some(&RtspError::SessionTimeout));
            }
        }
    }
}

/// The embeddable RTSP server core. Owns the listener and the session
/// table; everything policy-specific (auth, storage, path routing) lives
/// behind the [`Handler`] passed to [`Server::new`].
pub struct Server {
    handle: ServerHandle,
    running: Arc<AtomicBool>,
    listener_addr: Mutex<Option<SocketAddr>>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    sweep_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    pub fn new(config: ServerConfig, handler: Arc<dyn Handler>) -> Self {
        Self::with_sdp_codec(config, handler, Arc::new(BasicSdpCodec))
    }

    pub fn with_sdp_codec(config: ServerConfig, handler: Arc<dyn Handler>, sdp_codec: Arc<dyn SdpCodec>) -> Self {
        Self {
            handle: ServerHandle(Arc::new(ServerInner {
                config,
                handler,
                sdp_codec,
                sessions: RwLock::new(HashMap::new()),
                next_conn_id: AtomicU64::new(1),
            })),
            running: Arc::new(AtomicBool::new(false)),
            listener_addr: Mutex::new(None),
            accept_thread: Mutex::new(None),
            sweep_thread: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.listener_addr.lock()
    }

    /// Binds the listener and spawns the accept and timeout-sweep threads.
    /// Returns once the listener is bound; the threads run in the
    /// background until [`Server::close`].
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }
        self.handle.config().validate()?;

        let listener = TcpListener::bind(&self.handle.config().rtsp_address)?;
        listener.set_nonblocking(true)?;
        *self.listener_addr.lock() = Some(listener.local_addr()?);

        tracing::info!(addr = %self.handle.config().rtsp_address, "RTSP server listening");

        let running = self.running.clone();
        let handle = self.handle.clone();
        *self.accept_thread.lock() = Some(std::thread::spawn(move || accept_loop(listener, handle, running)));

        let running = self.running.clone();
        let handle = self.handle.clone();
        *self.sweep_thread.lock() = Some(std::thread::spawn(move || sweep_loop(handle, running)));

        Ok(())
    }

    /// Requests shutdown; idempotent. Does not block — call [`Server::wait`]
    /// to join the background threads.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server shutting down");
    }

    /// Blocks until the accept and timeout-sweep threads have exited.
    pub fn wait(&self) {
        if let Some(handle) = self.accept_thread.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.sweep_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(listener: TcpListener, handle: ServerHandle, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let conn_id = handle.next_conn_id();
                let handle = handle.clone();
                tracing::debug!(conn_id, %addr, "accepted connection");
                std::thread::spawn(move || match Connection::new(conn_id, stream, handle) {
                    Ok(conn) => conn.run(),
                    Err(err) => tracing::warn!(conn_id, error = %err, "failed to set up connection"),
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                tracing::warn!(error = %err, "accept() failed");
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

fn sweep_loop(handle: ServerHandle, running: Arc<AtomicBool>) {
    let period = handle.config().check_stream_period;
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(period);
        handle.sweep_timed_out_sessions();
    }
}
