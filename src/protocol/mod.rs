//! RTSP protocol implementation (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol: request/
//! response parsing, interleaved-frame framing, transport negotiation, URL
//! parsing, and the pluggable SDP codec.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Key differences from HTTP:
//! - Stateful: sessions persist across requests (RFC 2326 §3).
//! - Different methods: OPTIONS, DESCRIBE, ANNOUNCE, SETUP, PLAY, RECORD, TEARDOWN.
//! - Session header carries a server-assigned ID (RFC 2326 §12.37).
//! - Media itself can travel over the same TCP connection as `$`-prefixed
//!   interleaved frames (§10.12), multiplexed with the text requests.
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | ANNOUNCE | §10.3 | Publish a session description (create a session) |
//! | SETUP | §10.4 | Negotiate the interleaved transport |
//! | PLAY | §10.5 | Start media delivery to the client |
//! | RECORD | §10.11 | Start accepting media from the client |
//! | TEARDOWN | §10.7 | Destroy a session |

pub mod frame;
pub mod headers;
pub mod request;
pub mod response;
pub mod rtp;
pub mod sdp;
pub mod track;
pub mod transport_header;
pub mod url;

pub use frame::InterleavedFrame;
pub use headers::Headers;
pub use request::RtspRequest;
pub use response::RtspResponse;
pub use sdp::{BasicSdpCodec, SdpCodec};
pub use track::TrackDescriptor;
pub use transport_header::{TransportHeader, TransportMode};
