//! The Connection (SC) component: one TCP client, text requests and
//! interleaved media multiplexed on the same socket.
//!
//! One OS thread per accepted socket, with `set_read_timeout`/
//! `set_write_timeout` applied before each blocking call. The same stream
//! carries both plain RTSP request/response text and `$`-framed RTP/RTCP
//! interleaved binary data.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::handler::RemoteAddr;
use crate::protocol::frame::{InterleavedFrame, INTERLEAVED_MAGIC};
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::rtp::RtpHeaderView;
use crate::protocol::transport_header::TransportHeader;
use crate::ring::PacketPool;
use crate::server::ServerHandle;

/// Which framing the read loop expects on its next read, and (for
/// interleaved modes) which direction governs the per-read deadline.
///
/// An `AtomicU8` instead of a sentinel error on the read path, per the
/// Design Notes: a session's PLAY/RECORD handler flips this from its own
/// thread while the connection's read loop checks it at the top of every
/// iteration, with no unwinding required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Standard,
    InterleavedPlay,
    InterleavedRecord,
}

impl ReadMode {
    fn to_u8(self) -> u8 {
        match self {
            ReadMode::Standard => 0,
            ReadMode::InterleavedPlay => 1,
            ReadMode::InterleavedRecord => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReadMode::InterleavedPlay,
            2 => ReadMode::InterleavedRecord,
            _ => ReadMode::Standard,
        }
    }
}

/// The write-side handle to a connection, shared with the session(s) it
/// carries so a session's writer thread and PLAY/RECORD handler can reach
/// the socket without routing back through the connection's read loop.
pub struct ConnHandle {
    writer: Mutex<TcpStream>,
    remote_addr: SocketAddr,
    read_mode: AtomicU8,
    write_timeout: Duration,
}

impl ConnHandle {
    pub fn new(stream: TcpStream, write_timeout: Duration) -> Self {
        let remote_addr = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        Self {
            writer: Mutex::new(stream),
            remote_addr,
            read_mode: AtomicU8::new(ReadMode::Standard.to_u8()),
            write_timeout,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn switch_read_mode(&self, mode: ReadMode) {
        self.read_mode.store(mode.to_u8(), Ordering::SeqCst);
    }

    pub fn read_mode(&self) -> ReadMode {
        ReadMode::from_u8(self.read_mode.load(Ordering::SeqCst))
    }

    /// Writes one interleaved frame on `channel`, applying the write
    /// deadline first.
    pub fn write_frame(&self, channel: u8, payload: &[u8]) -> Result<()> {
        let frame = InterleavedFrame::new(channel, payload.to_vec());
        let mut stream = self.writer.lock();
        stream.set_write_timeout(Some(self.write_timeout))?;
        stream.write_all(&frame.encode())?;
        Ok(())
    }

    fn write_response(&self, response: &RtspResponse) -> Result<()> {
        let mut stream = self.writer.lock();
        stream.set_write_timeout(Some(self.write_timeout))?;
        stream.write_all(&response.serialize())?;
        Ok(())
    }
}

/// One accepted TCP connection. Owns the read half and runs entirely on its
/// own OS thread, started by [`crate::server::Server`]'s accept loop.
pub struct Connection {
    id: u64,
    reader: BufReader<TcpStream>,
    handle: Arc<ConnHandle>,
    server: ServerHandle,
    session_id: Option<String>,
    packet_pool: PacketPool,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, server: ServerHandle) -> Result<Self> {
        let write_timeout = server.config().write_timeout;
        let read_buffer_count = server.config().read_buffer_count;
        let read_clone = stream.try_clone()?;
        let handle = Arc::new(ConnHandle::new(stream, write_timeout));
        let packet_pool = PacketPool::new(read_buffer_count)?;
        Ok(Self {
            id,
            reader: BufReader::new(read_clone),
            handle,
            server,
            session_id: None,
            packet_pool,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.handle.remote_addr()
    }

    /// Runs the read loop until the connection closes, fatally or cleanly.
    pub fn run(mut self) {
        let remote = self.remote_addr();
        tracing::info!(conn_id = self.id, %remote, "connection accepted");
        loop {
            match self.step() {
                Ok(()) => continue,
                Err(err) => {
                    let clean = matches!(err, RtspError::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof);
                    if clean {
                        tracing::info!(conn_id = self.id, "connection closed");
                        self.server.handler().on_conn_close(self.id, None);
                    } else {
                        tracing::warn!(conn_id = self.id, error = %err, "connection closing");
                        self.server.handler().on_conn_close(self.id, Some(&err));
                    }
                    break;
                }
            }
        }
        if let Some(session_id) = self.session_id.take() {
            self.server.detach_connection(&session_id, self.id);
        }
    }

    fn step(&mut self) -> Result<()> {
        match self.handle.read_mode() {
            ReadMode::Standard => {
                self.reader.get_ref().set_read_timeout(None)?;
                self.read_one(false)
            }
            ReadMode::InterleavedRecord => {
                self.reader
                    .get_ref()
                    .set_read_timeout(Some(self.server.config().read_timeout))?;
                self.read_one(true)
            }
            ReadMode::InterleavedPlay => {
                self.reader.get_ref().set_read_timeout(None)?;
                self.read_one(true)
            }
        }
    }

    fn peek_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_one(&mut self, interleaved_allowed: bool) -> Result<()> {
        let first = self.peek_byte()?;
        if first == INTERLEAVED_MAGIC {
            if !interleaved_allowed {
                return Err(RtspError::UnexpectedInterleavedFrame);
            }
            let frame = InterleavedFrame::read_after_magic(&mut self.reader)?;
            return self.handle_interleaved_frame(frame);
        }
        self.handle_request_starting_with(first)
    }

    fn handle_request_starting_with(&mut self, first_byte: u8) -> Result<()> {
        let mut head = String::new();
        head.push(first_byte as char);
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                return Err(RtspError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-request",
                )));
            }
            head.push_str(&line);
            if line == "\r\n" || line == "\n" {
                break;
            }
        }

        let mut request = RtspRequest::parse_head(&head)?;
        if let Some(len) = request.content_length()? {
            let mut body = vec![0u8; len];
            self.reader.read_exact(&mut body)?;
            request = request.with_body(body);
        }

        let cseq = request.cseq().map(str::to_string);
        if cseq.is_none() {
            self.handle.write_response(&RtspResponse::bad_request())?;
            return Err(RtspError::CSeqMissing);
        }

        let (response, fatal) = self.dispatch(&request);
        self.handle.write_response(&response.with_cseq(cseq.as_deref()))?;
        if let Some(err) = fatal {
            return Err(err);
        }
        Ok(())
    }

    fn handle_interleaved_frame(&mut self, frame: InterleavedFrame) -> Result<()> {
        let Some(session_id) = self.session_id.clone() else {
            return Ok(());
        };
        let Some(session) = self.server.get_session(&session_id) else {
            return Ok(());
        };
        let Some(track_id) = session.track_id_for_channel(frame.channel) else {
            tracing::debug!(conn_id = self.id, channel = frame.channel, "dropping frame on unknown channel");
            return Ok(());
        };

        let slot = self.packet_pool.next_slot();
        slot.clear();
        slot.extend_from_slice(&frame.payload);
        RtpHeaderView::parse(slot)?;

        self.server.handler().on_packet_rtp(&session_id, track_id, slot);
        if let Some(stream) = session.bound_stream() {
            stream.write_packet_rtp(track_id, slot, true);
        }
        Ok(())
    }

    /// Dispatches one request to a response, plus the error that should
    /// close the connection after the response is written, if any.
    fn dispatch(&mut self, request: &RtspRequest) -> (RtspResponse, Option<RtspError>) {
        match self.try_dispatch(request) {
            Ok(response) => (response, None),
            Err(err) => {
                tracing::warn!(conn_id = self.id, method = %request.method, error = %err, "request failed");
                let response = RtspResponse::from_error(&err);
                let fatal = err.is_fatal().then_some(err);
                (response, fatal)
            }
        }
    }

    fn try_dispatch(&mut self, request: &RtspRequest) -> Result<RtspResponse> {
        match request.method.as_str() {
            "OPTIONS" => {
                if let Some(session_id) = &self.session_id {
                    if let Some(session) = self.server.get_session(session_id) {
                        session.options();
                    }
                }
                Ok(RtspResponse::ok().add_header(
                    "Public",
                    "DESCRIBE, ANNOUNCE, SETUP, PLAY, RECORD, TEARDOWN",
                ))
            }
            "DESCRIBE" => Ok(self.handle_describe(request)),
            "ANNOUNCE" | "SETUP" => self.forward_session_request(request, true),
            "PLAY" | "RECORD" | "TEARDOWN" => {
                if self.session_id.is_some() {
                    self.forward_session_request(request, false)
                } else {
                    Err(RtspError::InvalidState {
                        current: "none",
                        allowed: &[],
                    })
                }
            }
            other => Err(RtspError::UnknownMethod(other.to_string())),
        }
    }

    fn handle_describe(&self, request: &RtspRequest) -> RtspResponse {
        let parts = match crate::protocol::url::parse_rtsp_url(&request.uri) {
            Ok(parts) => parts,
            Err(_) => return RtspResponse::bad_request(),
        };
        let (response, tracks) = self.server.handler().on_describe(&parts.path);
        match tracks {
            Some(tracks) => {
                let body = self.server.sdp_codec().serialize(&tracks);
                response.with_body(body, "application/sdp")
            }
            None => response,
        }
    }

    fn forward_session_request(&mut self, request: &RtspRequest, create_if_missing: bool) -> Result<RtspResponse> {
        let session_id = self
            .session_id
            .clone()
            .or_else(|| request.get_header("Session").map(str::to_string));

        let transport = request.get_header("Transport").map(TransportHeader::parse);

        let tracks = if request.method == "ANNOUNCE" {
            let content_type = request.get_header("Content-Type").unwrap_or("");
            if content_type != "application/sdp" {
                return Err(RtspError::UnsupportedContentType(content_type.to_string()));
            }
            let body = request.body.as_deref().unwrap_or(&[]);
            Some(self.server.sdp_codec().parse(body)?)
        } else {
            None
        };

        let remote = RemoteAddr::new(self.handle.remote_addr());
        let (response, bound_session_id) = self.server.dispatch_session_request(
            session_id,
            create_if_missing,
            self.id,
            remote,
            request,
            transport,
            tracks,
            self.handle.clone(),
        )?;

        if request.method == "TEARDOWN" && response.status_code == 200 {
            self.session_id = None;
        } else {
            self.session_id = Some(bound_session_id);
        }
        Ok(response)
    }
}
