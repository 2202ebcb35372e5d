use crate::error::RtspError;

/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern — chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
/// `Content-Length` is computed automatically when a body is present.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// Server identification string included in every RTSP response
/// per RFC 2326 §12.36.
pub const SERVER_AGENT: &str = "gortsplib";

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: vec![("Server".to_string(), SERVER_AGENT.to_string())],
            body: None,
        }
    }

    /// 200 OK — success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 400 Bad Request — malformed or missing required header.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 404 Not Found — the requested resource does not exist.
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    /// 454 Session Not Found (RFC 2326 §11.3.23).
    pub fn session_not_found() -> Self {
        Self::new(454, "Session Not Found")
    }

    /// 455 Method Not Valid In This State (RFC 2326 §11.3.24).
    pub fn method_not_valid_in_state() -> Self {
        Self::new(455, "Method Not Valid In This State")
    }

    /// 459 Aggregate Operation Not Allowed (RFC 2326 §11.3.27).
    pub fn aggregate_not_allowed() -> Self {
        Self::new(459, "Aggregate Operation Not Allowed")
    }

    /// 461 Unsupported Transport (RFC 2326 §11.3.29).
    pub fn unsupported_transport() -> Self {
        Self::new(461, "Unsupported Transport")
    }

    /// 501 Not Implemented — unrecognized method.
    pub fn not_implemented() -> Self {
        Self::new(501, "Not Implemented")
    }

    /// 500 Internal Server Error.
    pub fn internal_server_error() -> Self {
        Self::new(500, "Internal Server Error")
    }

    /// Builds the response RTSP wire status for `err`, reusing
    /// [`RtspError::status_code`] for the numeric code and the error's own
    /// `Display` as the free-form reason phrase.
    pub fn from_error(err: &RtspError) -> Self {
        Self::new(err.status_code(), &err.to_string())
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_cseq(self, cseq: Option<&str>) -> Self {
        match cseq {
            Some(cseq) => self.add_header("CSeq", cseq),
            None => self,
        }
    }

    pub fn with_body(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.headers
            .push(("Content-Type".to_string(), content_type.to_string()));
        self.body = Some(body);
        self
    }

    /// Serialize to the RTSP wire format (header block is ASCII text; body
    /// bytes are appended verbatim).
    pub fn serialize(&self) -> Vec<u8> {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        let mut out = response.into_bytes();
        if let Some(body) = &self.body {
            out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
            out.extend_from_slice(body);
        } else {
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_no_body() {
        let resp = RtspResponse::ok()
            .add_header("CSeq", "1")
            .add_header("Public", "OPTIONS");
        let s = String::from_utf8(resp.serialize()).unwrap();
        assert!(s.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(s.contains("Server: gortsplib\r\n"));
        assert!(s.contains("CSeq: 1\r\n"));
        assert!(s.contains("Public: OPTIONS\r\n"));
        assert!(s.ends_with("\r\n"));
    }

    #[test]
    fn serialize_with_body() {
        let resp = RtspResponse::ok()
            .add_header("CSeq", "2")
            .with_body(b"v=0\r\n".to_vec(), "application/sdp");
        let s = String::from_utf8(resp.serialize()).unwrap();
        assert!(s.contains("Content-Type: application/sdp\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("v=0\r\n"));
    }

    #[test]
    fn not_found_response() {
        let resp = RtspResponse::not_found().add_header("CSeq", "5");
        assert_eq!(resp.status_code, 404);
        let s = String::from_utf8(resp.serialize()).unwrap();
        assert!(s.starts_with("RTSP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn from_error_maps_status_code() {
        let resp = RtspResponse::from_error(&RtspError::SessionNotFound("1".to_string()));
        assert_eq!(resp.status_code, 454);
    }
}
