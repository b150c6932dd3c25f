//! Heartbeat frame wire codec.
//!
//! A heartbeat is an ICMP echo request carried in a raw Ethernet frame:
//!
//! ```text
//! offset  size  field
//!      0     6  destination MAC (server MAC)
//!      6     6  source MAC (ToR MAC with the locally-administered cookie bit)
//!     12     2  ethertype 0x0800
//!     14    20  IPv4 header, no options, protocol 1, TTL 64
//!     34     8  ICMP echo request header (type 8, code 0)
//!               identifier = server id, sequence = low 16 bits of seq
//!     42    16  heartbeat payload:
//!               u32 magic 0x4d55584c  u16 version  u16 server id
//!               u32 session id        u32 sequence number
//! ```
//!
//! The sender cookie in the source MAC is the self/peer discriminator: a
//! receiver that sees its own cookie classifies the frame as self, any other
//! cookie with a valid payload as peer. All multi-byte fields are
//! big-endian.

use sonic_types::{Ipv4Address, MacAddress};

/// Payload magic, `"MUXL"` in ASCII.
pub const HEARTBEAT_MAGIC: u32 = 0x4d55_584c;

/// Payload format version.
pub const HEARTBEAT_VERSION: u16 = 1;

/// Total encoded frame length.
pub const FRAME_LEN: usize = 58;

const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_ICMP: u8 = 1;
const ICMP_ECHO_REQUEST: u8 = 8;

/// A decoded (or to-be-encoded) heartbeat frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatFrame {
    pub dst_mac: MacAddress,
    pub src_mac: MacAddress,
    pub src_ip: Ipv4Address,
    pub dst_ip: Ipv4Address,
    pub server_id: u16,
    pub session_id: u32,
    pub seq: u32,
}

impl HeartbeatFrame {
    /// Serializes the frame, computing IP and ICMP checksums.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];

        buf[0..6].copy_from_slice(self.dst_mac.as_bytes());
        buf[6..12].copy_from_slice(self.src_mac.as_bytes());
        buf[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

        // IPv4 header
        let ip = &mut buf[14..34];
        ip[0] = 0x45; // version 4, IHL 5
        let total_len = (FRAME_LEN - 14) as u16;
        ip[2..4].copy_from_slice(&total_len.to_be_bytes());
        ip[8] = 64; // TTL
        ip[9] = IPPROTO_ICMP;
        ip[12..16].copy_from_slice(&self.src_ip.octets());
        ip[16..20].copy_from_slice(&self.dst_ip.octets());
        let ip_csum = internet_checksum(ip);
        buf[24..26].copy_from_slice(&ip_csum.to_be_bytes());

        // ICMP echo request
        buf[34] = ICMP_ECHO_REQUEST;
        buf[38..40].copy_from_slice(&self.server_id.to_be_bytes());
        buf[40..42].copy_from_slice(&(self.seq as u16).to_be_bytes());

        // payload
        buf[42..46].copy_from_slice(&HEARTBEAT_MAGIC.to_be_bytes());
        buf[46..48].copy_from_slice(&HEARTBEAT_VERSION.to_be_bytes());
        buf[48..50].copy_from_slice(&self.server_id.to_be_bytes());
        buf[50..54].copy_from_slice(&self.session_id.to_be_bytes());
        buf[54..58].copy_from_slice(&self.seq.to_be_bytes());

        let icmp_csum = internet_checksum(&buf[34..]);
        buf[36..38].copy_from_slice(&icmp_csum.to_be_bytes());

        buf
    }

    /// Parses a received frame. Returns `None` for anything that is not a
    /// well-formed heartbeat (wrong ethertype, protocol, length, or magic);
    /// the receive path sees all traffic on the port and silently skips
    /// non-heartbeat frames.
    pub fn decode(buf: &[u8]) -> Option<HeartbeatFrame> {
        if buf.len() < FRAME_LEN {
            return None;
        }
        if u16::from_be_bytes([buf[12], buf[13]]) != ETHERTYPE_IPV4 {
            return None;
        }
        // require IHL 5 so the fixed offsets below hold
        if buf[14] != 0x45 || buf[23] != IPPROTO_ICMP {
            return None;
        }
        if buf[34] != ICMP_ECHO_REQUEST {
            return None;
        }
        if u32::from_be_bytes([buf[42], buf[43], buf[44], buf[45]]) != HEARTBEAT_MAGIC {
            return None;
        }

        let mut dst_mac = [0u8; 6];
        dst_mac.copy_from_slice(&buf[0..6]);
        let mut src_mac = [0u8; 6];
        src_mac.copy_from_slice(&buf[6..12]);

        Some(HeartbeatFrame {
            dst_mac: MacAddress::new(dst_mac),
            src_mac: MacAddress::new(src_mac),
            src_ip: Ipv4Address::new(buf[26], buf[27], buf[28], buf[29]),
            dst_ip: Ipv4Address::new(buf[30], buf[31], buf[32], buf[33]),
            server_id: u16::from_be_bytes([buf[48], buf[49]]),
            session_id: u32::from_be_bytes([buf[50], buf[51], buf[52], buf[53]]),
            seq: u32::from_be_bytes([buf[54], buf[55], buf[56], buf[57]]),
        })
    }
}

/// RFC 1071 internet checksum over `data` (checksum field assumed zero).
fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
