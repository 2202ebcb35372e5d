//! Error types for the RTSP server core.

use std::fmt;

/// Errors that can occur anywhere in the server core.
///
/// Variants map to the failure taxonomy used throughout the stack:
///
/// - **Framing**: [`Parse`](Self::Parse), [`CSeqMissing`](Self::CSeqMissing),
///   [`OversizedFrame`](Self::OversizedFrame), [`UnexpectedInterleavedFrame`](Self::UnexpectedInterleavedFrame),
///   [`UnsupportedContentType`](Self::UnsupportedContentType).
/// - **Protocol**: [`UnknownMethod`](Self::UnknownMethod), [`InvalidState`](Self::InvalidState),
///   [`SessionNotFound`](Self::SessionNotFound), [`SessionLinkedToOtherConn`](Self::SessionLinkedToOtherConn),
///   [`SessionCreatedByOtherIp`](Self::SessionCreatedByOtherIp).
/// - **Transport**: [`NoInterleavedIds`](Self::NoInterleavedIds), [`InvalidInterleavedIds`](Self::InvalidInterleavedIds),
///   [`InterleavedIdsAlreadyUsed`](Self::InterleavedIdsAlreadyUsed), [`InvalidTransportMode`](Self::InvalidTransportMode).
/// - **SETUP**: [`InvalidPath`](Self::InvalidPath), [`TrackAlreadySetup`](Self::TrackAlreadySetup),
///   [`TrackPathMismatch`](Self::TrackPathMismatch), [`InvalidTrackUrl`](Self::InvalidTrackUrl),
///   [`InvalidTrackPrefix`](Self::InvalidTrackPrefix).
/// - **RECORD**: [`NotAllTracksSetup`](Self::NotAllTracksSetup).
/// - **Resource**: [`StreamClosed`](Self::StreamClosed), [`ServerInternalError`](Self::ServerInternalError),
///   [`WriteBufferMisconfigured`](Self::WriteBufferMisconfigured).
/// - **Server**: [`NotStarted`](Self::NotStarted), [`AlreadyRunning`](Self::AlreadyRunning).
/// - **Lifecycle**: [`Terminated`](Self::Terminated), [`SessionTimeout`](Self::SessionTimeout),
///   [`Teardown`](Self::Teardown).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed RTSP request line, header, or interleaved frame (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Every RTSP request must carry a `CSeq` header; this one didn't.
    #[error("CSeq header missing")]
    CSeqMissing,

    /// Interleaved frame payload exceeded the 60 MiB safety cap.
    #[error("interleaved frame payload too large ({0} bytes)")]
    OversizedFrame(usize),

    /// An interleaved-frame magic byte `$` arrived while the connection was in standard mode.
    #[error("unexpected interleaved frame in standard read mode")]
    UnexpectedInterleavedFrame,

    /// ANNOUNCE body arrived with a `Content-Type` other than `application/sdp`.
    #[error("unsupported Content-Type header '[{0}]'")]
    UnsupportedContentType(String),

    /// Method not in {OPTIONS, DESCRIBE, ANNOUNCE, SETUP, PLAY, RECORD, TEARDOWN}.
    #[error("method not implemented: {0}")]
    UnknownMethod(String),

    /// Request not allowed in the session's current state.
    #[error("invalid state: current={current}, allowed={allowed:?}")]
    InvalidState {
        current: &'static str,
        allowed: &'static [&'static str],
    },

    /// No session exists with the given secret ID.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session already has a different bound connection.
    #[error("session is linked to another connection")]
    SessionLinkedToOtherConn,

    /// Session's author connection has a different remote IP/zone than the requester.
    #[error("session was created by a different IP")]
    SessionCreatedByOtherIp,

    /// `Transport` header carried no `interleaved=` parameter.
    #[error("no interleaved channel IDs in Transport header")]
    NoInterleavedIds,

    /// Interleaved channel IDs were not an even/odd consecutive pair.
    #[error("invalid interleaved channel IDs: {0}-{1}")]
    InvalidInterleavedIds(u8, u8),

    /// The requested even channel is already bound to another track.
    #[error("interleaved channel {0} already in use")]
    InterleavedIdsAlreadyUsed(u8),

    /// `Transport` header specified a mode invalid for the current state.
    #[error("invalid transport mode for current session state")]
    InvalidTransportMode,

    /// SETUP path did not match the session's announce/setup prefix.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// SETUP for a track ID that already has a `SetupTrack` entry.
    #[error("track {0} has already been setup")]
    TrackAlreadySetup(usize),

    /// Subsequent SETUP path differs from the first SETUP's path.
    #[error("track path has changed")]
    TrackPathMismatch,

    /// A track's generated control URL did not parse.
    #[error("invalid track URL: {0}")]
    InvalidTrackUrl(String),

    /// A track's derived path did not start with the announce path prefix.
    #[error("invalid track prefix: {0}")]
    InvalidTrackPrefix(String),

    /// RECORD requested before every announced track was set up.
    #[error("not all announced tracks have been setup")]
    NotAllTracksSetup,

    /// Reader admission/activation attempted on a closed stream.
    #[error("stream closed")]
    StreamClosed,

    /// Secret-ID RNG or other internal allocation failure.
    #[error("internal server error: {0}")]
    ServerInternalError(String),

    /// `read_buffer_count` / `write_buffer_count` was not a power of two, or was zero.
    #[error("write buffer misconfigured: {0} is not a non-zero power of two")]
    WriteBufferMisconfigured(usize),

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// Root cancellation signal fired; the owning task is shutting down.
    #[error("terminated")]
    Terminated,

    /// Session received no request or media frame within `session_timeout`.
    #[error("session timeout")]
    SessionTimeout,

    /// Session was torn down by an explicit TEARDOWN request from `remote`.
    #[error("teardown requested by {remote}")]
    Teardown { remote: String },
}

impl RtspError {
    /// Whether this error is fatal to the owning connection/session.
    ///
    /// Fatal kinds close the owning entity; everything else is a local,
    /// per-request 4xx/5xx that leaves the connection open.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RtspError::Io(_)
                | RtspError::Parse { .. }
                | RtspError::CSeqMissing
                | RtspError::OversizedFrame(_)
                | RtspError::UnexpectedInterleavedFrame
                | RtspError::UnsupportedContentType(_)
                | RtspError::Terminated
                | RtspError::SessionTimeout
                | RtspError::Teardown { .. }
        )
    }

    /// The RTSP status code this error maps to when turned into a response.
    pub fn status_code(&self) -> u16 {
        match self {
            RtspError::SessionNotFound(_) => 454,
            RtspError::UnknownMethod(_) => 501,
            RtspError::ServerInternalError(_) | RtspError::Io(_) | RtspError::Terminated => 500,
            _ => 400,
        }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` header value was not a valid integer.
    InvalidContentLength,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
