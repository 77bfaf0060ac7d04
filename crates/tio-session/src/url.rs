//! Session connect-target URLs (§6).
//!
//! `tcp://`/`udp://` parse through the `url` crate; serial targets are bare
//! platform paths (no scheme) recognized by a `COM\d+`/`/dev/...` heuristic,
//! since neither Windows nor Unix device paths are themselves valid URLs.

use crate::error::SessionError;

/// Default TCP/UDP port when the URL doesn't specify one (§6).
pub const DEFAULT_PORT: u16 = 7855;

/// A parsed connect target (§6).
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectTarget {
    /// `tcp://host[:port][/r1/r2/...]`.
    Tcp {
        /// Hostname or address.
        host: String,
        /// TCP port, defaulting to [`DEFAULT_PORT`].
        port: u16,
        /// Routing prefix, outermost byte first (§4.5).
        routing: Vec<u8>,
    },
    /// `udp://host[:port][/r1/r2/...]`.
    Udp {
        /// Hostname or address.
        host: String,
        /// UDP port, defaulting to [`DEFAULT_PORT`].
        port: u16,
        /// Routing prefix, outermost byte first.
        routing: Vec<u8>,
    },
    /// A platform serial device path, with optional trailing routing
    /// segments.
    Serial {
        /// The device node, e.g. `COM3` or `/dev/ttyUSB0`.
        device: String,
        /// Routing prefix, outermost byte first.
        routing: Vec<u8>,
    },
    /// `router://interthread/<routing>` — a child session attached to its
    /// parent's virtual transport rather than a real one (§4.5, §11.5).
    Router {
        /// Routing prefix, outermost byte first.
        routing: Vec<u8>,
    },
}

impl ConnectTarget {
    /// This target's routing prefix.
    #[must_use]
    pub fn routing(&self) -> &[u8] {
        match self {
            Self::Tcp { routing, .. }
            | Self::Udp { routing, .. }
            | Self::Serial { routing, .. }
            | Self::Router { routing } => routing,
        }
    }
}

/// Parse a session connect-target URL.
///
/// # Errors
///
/// [`SessionError::InvalidUrl`] if `url` is neither a well-formed
/// `tcp://`/`udp://`/`router://interthread/` URL nor a recognizable serial
/// device path, or if a routing segment isn't a valid byte.
pub fn parse(url: &str) -> Result<ConnectTarget, SessionError> {
    if url.starts_with("tcp://") || url.starts_with("udp://") {
        return parse_network(url);
    }
    if let Some(routing_path) = url.strip_prefix("router://interthread/") {
        let routing = routing_segments(routing_path)?;
        return Ok(ConnectTarget::Router { routing });
    }
    parse_serial(url)
}

fn parse_network(url: &str) -> Result<ConnectTarget, SessionError> {
    let parsed = url::Url::parse(url)
        .map_err(|_| SessionError::InvalidUrl { url: url.to_string(), reason: "malformed URL" })?;
    let host = parsed
        .host_str()
        .ok_or(SessionError::InvalidUrl { url: url.to_string(), reason: "missing host" })?
        .to_string();
    let port = parsed.port().unwrap_or(DEFAULT_PORT);
    let path = parsed.path().trim_start_matches('/');
    let routing = routing_segments(path)?;

    match parsed.scheme() {
        "tcp" => Ok(ConnectTarget::Tcp { host, port, routing }),
        "udp" => Ok(ConnectTarget::Udp { host, port, routing }),
        _ => Err(SessionError::InvalidUrl { url: url.to_string(), reason: "unsupported scheme" }),
    }
}

fn parse_serial(url: &str) -> Result<ConnectTarget, SessionError> {
    let segments: Vec<&str> = url.split('/').collect();

    if is_com_port(segments.first().copied().unwrap_or("")) {
        let device = segments[0].to_string();
        let routing = routing_segments(&segments[1..].join("/"))?;
        return Ok(ConnectTarget::Serial { device, routing });
    }

    if url.starts_with("/dev/") {
        if segments.len() < 3 {
            return Err(SessionError::InvalidUrl {
                url: url.to_string(),
                reason: "incomplete /dev path",
            });
        }
        let device = segments[..3].join("/");
        let routing = routing_segments(&segments[3..].join("/"))?;
        return Ok(ConnectTarget::Serial { device, routing });
    }

    Err(SessionError::InvalidUrl {
        url: url.to_string(),
        reason: "not tcp/udp/router and not a recognized serial path",
    })
}

/// `^COM\d+` (case-insensitive), written out by hand to avoid pulling in a
/// regex dependency for one check (§6).
fn is_com_port(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() > 3
        && bytes[..3].eq_ignore_ascii_case(b"COM")
        && bytes[3..].iter().all(u8::is_ascii_digit)
}

/// Parse `/`-joined decimal routing segments, reversed so the first URL-path
/// node becomes the outermost (last-applied) routing byte (§4.5: "the
/// session's routing list is the reverse of the URL-path order").
fn routing_segments(path: &str) -> Result<Vec<u8>, SessionError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let byte = segment.parse::<u8>().map_err(|_| SessionError::InvalidUrl {
            url: path.to_string(),
            reason: "routing segment is not a byte 0-255",
        })?;
        segments.push(byte);
    }
    segments.reverse();
    Ok(segments)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tcp_url_with_default_port() {
        let target = parse("tcp://192.168.1.5").unwrap();
        assert_eq!(
            target,
            ConnectTarget::Tcp { host: "192.168.1.5".to_string(), port: DEFAULT_PORT, routing: vec![] }
        );
    }

    #[test]
    fn tcp_url_with_explicit_port_and_routing_reversed() {
        let target = parse("tcp://host:9999/1/2").unwrap();
        assert_eq!(
            target,
            ConnectTarget::Tcp { host: "host".to_string(), port: 9999, routing: vec![2, 1] }
        );
    }

    #[test]
    fn udp_url() {
        let target = parse("udp://host").unwrap();
        assert!(matches!(target, ConnectTarget::Udp { port: DEFAULT_PORT, .. }));
    }

    #[test]
    fn windows_com_port() {
        let target = parse("COM3/0").unwrap();
        assert_eq!(
            target,
            ConnectTarget::Serial { device: "COM3".to_string(), routing: vec![0] }
        );
    }

    #[test]
    fn windows_com_port_case_insensitive() {
        let target = parse("com12").unwrap();
        assert_eq!(target, ConnectTarget::Serial { device: "com12".to_string(), routing: vec![] });
    }

    #[test]
    fn unix_serial_device_with_routing() {
        let target = parse("/dev/ttyUSB0/0/1").unwrap();
        assert_eq!(
            target,
            ConnectTarget::Serial { device: "/dev/ttyUSB0".to_string(), routing: vec![1, 0] }
        );
    }

    #[test]
    fn router_interthread_url() {
        let target = parse("router://interthread/0/1").unwrap();
        assert_eq!(target, ConnectTarget::Router { routing: vec![1, 0] });
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse("not-a-url-at-all").is_err());
    }
}
