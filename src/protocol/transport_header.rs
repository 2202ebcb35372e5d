//! Parsing for the `Transport` request header.
//!
//! Only the TCP-interleaved transport profile is in scope (UDP delivery is a
//! non-goal, see DESIGN.md); the grammar below covers the
//! `RTP/AVP/TCP;unicast;interleaved=<a>-<b>;mode=<play|record>` shape that
//! every client sends when negotiating interleaved delivery.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Play,
    Record,
}

#[derive(Debug, Clone, Default)]
pub struct TransportHeader {
    pub interleaved: Option<(u8, u8)>,
    pub mode: Option<TransportMode>,
}

impl TransportHeader {
    /// Parses a `Transport:` header value, permissively: unrecognized
    /// parameters are ignored rather than rejected — the caller is
    /// responsible for rejecting a `TransportHeader` that's missing the
    /// fields it needs.
    pub fn parse(value: &str) -> Self {
        let mut header = TransportHeader::default();
        for part in value.split(';') {
            let part = part.trim();
            if let Some(rest) = part.strip_prefix("interleaved=") {
                if let Some((a, b)) = rest.split_once('-') {
                    if let (Ok(a), Ok(b)) = (a.parse::<u8>(), b.parse::<u8>()) {
                        header.interleaved = Some((a, b));
                    }
                }
            } else if let Some(rest) = part.strip_prefix("mode=") {
                header.mode = match rest.trim_matches('"').to_ascii_uppercase().as_str() {
                    "RECORD" => Some(TransportMode::Record),
                    "PLAY" => Some(TransportMode::Play),
                    _ => None,
                };
            }
        }
        header
    }

    pub fn serialize(&self, interleaved: (u8, u8)) -> String {
        let mode = match self.mode {
            Some(TransportMode::Record) => ";mode=record",
            Some(TransportMode::Play) | None => ";mode=play",
        };
        format!(
            "RTP/AVP/TCP;unicast;interleaved={}-{}{}",
            interleaved.0, interleaved.1, mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_transport() {
        let header = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=0-1;mode=play");
        assert_eq!(header.interleaved, Some((0, 1)));
        assert_eq!(header.mode, Some(TransportMode::Play));
    }

    #[test]
    fn parses_record_transport_with_quoted_mode() {
        let header = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=2-3;mode=\"RECORD\"");
        assert_eq!(header.interleaved, Some((2, 3)));
        assert_eq!(header.mode, Some(TransportMode::Record));
    }

    #[test]
    fn missing_interleaved_leaves_none() {
        let header = TransportHeader::parse("RTP/AVP/UDP;unicast;client_port=8000-8001");
        assert_eq!(header.interleaved, None);
    }

    #[test]
    fn defaults_to_play_without_explicit_mode() {
        let header = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=4-5");
        assert_eq!(header.mode, None);
        assert_eq!(header.serialize((4, 5)), "RTP/AVP/TCP;unicast;interleaved=4-5;mode=play");
    }
}
