//! Bookkeeping for one SETUP'd track.

/// The interleaved channel pair a track was SETUP with, plus which track
/// index of the stream (play) or the announced list (record) it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupTrack {
    /// `(even, odd)` interleaved channel IDs this track's data/control frames
    /// travel on. The even channel is what a received interleaved frame's
    /// channel byte is looked up against.
    pub interleaved: (u8, u8),
}

impl SetupTrack {
    pub fn new(interleaved: (u8, u8)) -> Self {
        Self { interleaved }
    }
}
