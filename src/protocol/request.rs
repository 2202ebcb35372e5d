use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::headers::Headers;

/// Upper bound on a Content-Length-declared request body, independent of the
/// interleaved-frame wire format's own 65535-byte-per-frame limit (see
/// [`crate::protocol::frame`]). Guards against a malicious or broken client
/// declaring an enormous ANNOUNCE/SET_PARAMETER body.
pub const MAX_BODY_SIZE: usize = 60 * 1024 * 1024;

/// A parsed RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2; multiple values for
/// the same header name are preserved in order (e.g. repeated `Require`).
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, etc.).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    pub headers: Headers,
    /// Body bytes, present when `Content-Length` was non-zero.
    pub body: Option<Vec<u8>>,
}

impl RtspRequest {
    /// Parses the request line and headers from `raw` (everything up to and
    /// including the blank line that terminates the header block). The body,
    /// if any, is attached separately via [`with_body`](Self::with_body) once
    /// the connection has read `Content-Length` bytes off the wire.
    pub fn parse_head(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyRequest,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Headers::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim();
            let value = line[colon_pos + 1..].trim();
            headers.insert(name, value);
        }

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
            body: None,
        })
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    /// When a header repeats, returns the first occurrence.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the CSeq header value, which numbers and orders RTSP
    /// request/response pairs (RFC 2326 §12.17).
    ///
    /// Every RTSP request must include a CSeq, and the response must echo it.
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// Parses the `Content-Length` header, if present.
    pub fn content_length(&self) -> Result<Option<usize>> {
        match self.get_header("Content-Length") {
            None => Ok(None),
            Some(value) => {
                let len: usize = value.trim().parse().map_err(|_| RtspError::Parse {
                    kind: ParseErrorKind::InvalidContentLength,
                })?;
                if len > MAX_BODY_SIZE {
                    return Err(RtspError::OversizedFrame(len));
                }
                Ok(Some(len))
            }
        }
    }
}
