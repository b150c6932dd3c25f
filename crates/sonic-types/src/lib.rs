//! Common SONiC types for the dual-ToR control plane.
//!
//! This crate provides type-safe representations of the network primitives
//! used by the MUX link manager:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses, including the
//!   locally-administered probe-cookie encoding used by heartbeat frames
//! - [`Ipv4Address`]: IPv4 addresses with SONiC config-style parsing
//!   (`"10.0.0.1"` or `"10.0.0.1/32"`)

mod ip;
mod mac;

pub use ip::Ipv4Address;
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid port name: {0}")]
    InvalidPortName(String),
}

/// Extracts the numeric server/blade id from a SONiC port name.
///
/// SONiC port names carry the front-panel index as a decimal suffix
/// (`"Ethernet4"` -> 4). The id is stamped into heartbeat payloads so the
/// server side can tell which port a probe belongs to.
pub fn server_id_from_port_name(name: &str) -> Result<u16, ParseError> {
    let digits = name.trim_end_matches(|c: char| !c.is_ascii_digit());
    let suffix = &name[digits.len()..];
    if suffix.is_empty() {
        return Err(ParseError::InvalidPortName(name.to_string()));
    }
    suffix
        .parse::<u16>()
        .map_err(|_| ParseError::InvalidPortName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_server_id_from_port_name() {
        assert_eq!(server_id_from_port_name("Ethernet4").unwrap(), 4);
        assert_eq!(server_id_from_port_name("Ethernet128").unwrap(), 128);
        assert_eq!(server_id_from_port_name("Ethernet0").unwrap(), 0);
    }

    #[test]
    fn test_server_id_rejects_missing_suffix() {
        assert!(server_id_from_port_name("Ethernet").is_err());
        assert!(server_id_from_port_name("").is_err());
    }

    #[test]
    fn test_server_id_rejects_overflow() {
        assert!(server_id_from_port_name("Ethernet65536").is_err());
    }
}
