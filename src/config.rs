//! Server configuration.
//!
//! A single struct of fields with documented defaults; validated by
//! [`ServerConfig::validate`], called from [`crate::Server::start`]. Invalid
//! configuration is always a returned [`RtspError`], never a panic.

use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::ring::validate_power_of_two;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen endpoint, e.g. `"0.0.0.0:8554"`. Required.
    pub rtsp_address: String,
    /// Per-read deadline. Default 10s.
    pub read_timeout: Duration,
    /// Per-write deadline. Default 10s.
    pub write_timeout: Duration,
    /// Pre-allocated RTP packet buffers per publishing connection. Must be a
    /// non-zero power of two. Default 16.
    pub read_buffer_count: usize,
    /// Ring-buffer capacity for a session's outgoing packets. Must be a
    /// non-zero power of two. Default 256.
    pub write_buffer_count: usize,
    /// Idle deadline for a session with no requests and no media frames.
    /// Default 60s.
    pub session_timeout: Duration,
    /// Wake period for session-timeout checks. Default 1s.
    pub check_stream_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rtsp_address: String::new(),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            read_buffer_count: 16,
            write_buffer_count: 256,
            session_timeout: Duration::from_secs(60),
            check_stream_period: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    pub fn new(rtsp_address: impl Into<String>) -> Self {
        Self {
            rtsp_address: rtsp_address.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rtsp_address.is_empty() {
            return Err(RtspError::ServerInternalError(
                "rtsp_address must not be empty".to_string(),
            ));
        }
        validate_power_of_two(self.read_buffer_count)?;
        validate_power_of_two(self.write_buffer_count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_with_address_validates() {
        let config = ServerConfig::new("127.0.0.1:8554");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_address_rejected() {
        let config = ServerConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_power_of_two_buffer_rejected() {
        let mut config = ServerConfig::new("127.0.0.1:8554");
        config.read_buffer_count = 10;
        assert!(matches!(
            config.validate(),
            Err(RtspError::WriteBufferMisconfigured(10))
        ));
    }
}
