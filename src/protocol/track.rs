//! Track descriptors.
//!
//! Concrete codec awareness (H.264 depacketization, AAC, etc.) is deliberately
//! out of scope for this crate — a [`TrackDescriptor`] is an opaque bag of SDP
//! media attributes. The core only ever needs two facts out of it: the
//! track's control URL (to match SETUP requests and to rewrite to a stream's
//! canonical form) and its clock rate (for RTP-Info extrapolation in PLAY).
//! Both are parsed
//! lazily from the raw `a=` attribute lines rather than promoted to typed
//! fields, so embedding applications can carry whatever codec-specific
//! attributes they need without this crate understanding them.

/// One elementary stream (video, audio, ...) announced by a publisher or
/// returned by DESCRIBE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    /// SDP media type, e.g. `"video"` or `"audio"` (the `m=` line's first field).
    pub media: String,
    /// RTP payload type number (the `m=` line's last field).
    pub payload_type: u8,
    /// Raw `a=` attribute lines for this track, each without the `a=` prefix,
    /// in the order they appeared in the SDP.
    pub attributes: Vec<String>,
}

impl TrackDescriptor {
    pub fn new(media: impl Into<String>, payload_type: u8) -> Self {
        Self {
            media: media.into(),
            payload_type,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    /// The track's `a=control:` value, if present.
    pub fn control(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find_map(|a| a.strip_prefix("control:"))
    }

    /// Clock rate in Hz, parsed from `a=rtpmap:<pt> <name>/<rate>`.
    ///
    /// Returns `None` when no rtpmap attribute is present or it doesn't
    /// parse — callers must not synthesise a fallback (see the Open Questions
    /// in DESIGN.md).
    pub fn clock_rate(&self) -> Option<u32> {
        self.attributes.iter().find_map(|a| {
            let rest = a.strip_prefix("rtpmap:")?;
            let codec = rest.split_whitespace().nth(1)?;
            codec.split('/').nth(1)?.parse().ok()
        })
    }

    /// Returns a copy of this track with its `control:` attribute replaced
    /// (or appended) to `control`.
    ///
    /// Used by [`crate::stream::ServerStream::new`] to rewrite announced
    /// tracks' control URLs to `trackID=<i>` on construction.
    pub fn with_control(&self, control: impl Into<String>) -> Self {
        let control = control.into();
        let mut attributes: Vec<String> = self
            .attributes
            .iter()
            .filter(|a| !a.starts_with("control:"))
            .cloned()
            .collect();
        attributes.insert(0, format!("control:{control}"));
        Self {
            media: self.media.clone(),
            payload_type: self.payload_type,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_and_clock_rate() {
        let t = TrackDescriptor::new("video", 96)
            .with_attribute("rtpmap:96 H264/90000")
            .with_attribute("control:trackID=0");
        assert_eq!(t.control(), Some("trackID=0"));
        assert_eq!(t.clock_rate(), Some(90000));
    }

    #[test]
    fn missing_clock_rate_is_none() {
        let t = TrackDescriptor::new("application", 98).with_attribute("control:trackID=2");
        assert_eq!(t.clock_rate(), None);
    }

    #[test]
    fn with_control_replaces_existing() {
        let t = TrackDescriptor::new("video", 96)
            .with_attribute("control:track1")
            .with_attribute("rtpmap:96 H264/90000");
        let rewritten = t.with_control("trackID=0");
        assert_eq!(rewritten.control(), Some("trackID=0"));
        assert_eq!(rewritten.clock_rate(), Some(90000));
        assert_eq!(
            rewritten.attributes.iter().filter(|a| a.starts_with("control:")).count(),
            1
        );
    }
}
