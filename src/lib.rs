//! # rtsp-nvr-core — embeddable RTSP server core for live media streaming
//!
//! A Rust library implementing the server side of RTSP 1.0 signaling
//! (OPTIONS/DESCRIBE/ANNOUNCE/SETUP/PLAY/RECORD/TEARDOWN) plus `$`-framed
//! interleaved RTP/RTCP delivery, with no codec or storage opinions of its
//! own — every policy decision (auth, path routing, what a DESCRIBE returns,
//! where recorded packets go) is delegated to an embedding [`Handler`].
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response framing, session state machine, Transport/RTP-Info headers |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP | Fixed 12-byte header parsing (sequence number, timestamp, SSRC) |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | `m=`/`a=` line parsing and serialization for ANNOUNCE/DESCRIBE bodies |
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  Handler (embedding application)           │
//! ├───────────────────────────────────────────┤
//! │  Server   — listener, session table        │
//! │  Session  — ANNOUNCE/SETUP/PLAY/RECORD/... │
//! │  Stream   — per-path reader fan-out        │
//! ├───────────────────────────────────────────┤
//! │  Connection — one TCP socket, read loop     │
//! │  Protocol   — RTSP/SDP/RTP framing          │
//! │  Ring       — bounded channels, packet pool │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtsp_core::{Server, ServerConfig};
//! use rtsp_core::handler::PermissiveHandler;
//!
//! let server = Server::new(ServerConfig::new("0.0.0.0:8554"), Arc::new(PermissiveHandler));
//! server.start().unwrap();
//! server.wait();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — [`Server`] (listener + session table) and [`ServerHandle`](server::ServerHandle).
//! - [`session`] — [`Session`](session::Session) state machine.
//! - [`connection`] — [`Connection`](connection::Connection), one OS thread per TCP socket.
//! - [`stream`] — [`ServerStream`](stream::ServerStream), per-path reader fan-out.
//! - [`protocol`] — RTSP/SDP/RTP parsing and serialization.
//! - [`handler`] — [`Handler`] trait, the core's only seam into the embedding application.
//! - [`ring`] — bounded ring buffers and the per-connection packet pool.
//! - [`config`] — [`ServerConfig`].
//! - [`error`] — [`RtspError`] and [`Result`].

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod ring;
pub mod server;
pub mod session;
pub mod stream;

pub use config::ServerConfig;
pub use error::{Result, RtspError};
pub use handler::Handler;
pub use server::{Server, ServerHandle};
pub use session::Session;
pub use stream::ServerStream;
