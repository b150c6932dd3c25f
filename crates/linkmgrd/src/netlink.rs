//! Kernel neighbor listener.
//!
//! Server MACs are learned lazily: the probe session defers transmission
//! until the kernel resolves the server IP, which this listener observes as
//! RTM_NEWNEIGH events on the routing netlink socket. Only IPv4 neighbors
//! are of interest; everything else is skipped during parsing.

#[cfg(target_os = "linux")]
pub use linux::{run_neighbor_listener, NeighborListener};

/// MAC learning requires routing netlink; elsewhere the listener idles
/// until shutdown so the daemon shape stays identical in tests on other
/// hosts.
#[cfg(not(target_os = "linux"))]
pub async fn run_neighbor_listener(
    _manager: std::sync::Weak<crate::manager::MuxManager>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> crate::error::Result<()> {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
mod linux {
    use crate::error::{LinkMgrError, Result};
    use crate::manager::MuxManager;
    use netlink_packet_core::{
        NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_DUMP, NLM_F_REQUEST,
    };
    use netlink_packet_route::neighbour::{
        NeighbourAddress, NeighbourAttribute, NeighbourMessage,
    };
    use netlink_packet_route::RouteNetlinkMessage;
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
    use sonic_types::{Ipv4Address, MacAddress};
    use std::os::fd::AsRawFd;
    use std::sync::Weak;
    use tracing::{debug, info, trace, warn};

    /// Netlink multicast group for neighbor notifications (RTNLGRP_NEIGH).
    const RTNLGRP_NEIGH: u32 = 3;

    /// Receive timeout so the listener thread can observe shutdown.
    const RECV_TIMEOUT_MS: i64 = 1_000;

    /// Netlink socket subscribed to neighbor events.
    pub struct NeighborListener {
        socket: Socket,
        buffer: Vec<u8>,
    }

    impl NeighborListener {
        pub fn new() -> Result<Self> {
            let mut socket = Socket::new(NETLINK_ROUTE)
                .map_err(|e| LinkMgrError::Netlink(format!("socket: {}", e)))?;
            let groups = 1 << (RTNLGRP_NEIGH - 1);
            socket
                .bind(&SocketAddr::new(0, groups))
                .map_err(|e| LinkMgrError::Netlink(format!("bind: {}", e)))?;

            // bounded blocking so shutdown remains responsive
            let timeout = libc::timeval {
                tv_sec: RECV_TIMEOUT_MS / 1_000,
                tv_usec: (RECV_TIMEOUT_MS % 1_000) * 1_000,
            };
            let rc = unsafe {
                libc::setsockopt(
                    socket.as_raw_fd(),
                    libc::SOL_SOCKET,
                    libc::SO_RCVTIMEO,
                    &timeout as *const libc::timeval as *const libc::c_void,
                    std::mem::size_of::<libc::timeval>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                return Err(LinkMgrError::Netlink(format!(
                    "SO_RCVTIMEO: {}",
                    std::io::Error::last_os_error()
                )));
            }

            debug!("neighbor netlink socket bound");
            Ok(Self {
                socket,
                buffer: vec![0u8; 65536],
            })
        }

        /// Requests a dump of the current neighbor table so MACs resolved
        /// before the daemon started are learned immediately.
        pub fn request_dump(&mut self) -> Result<()> {
            let mut header = NetlinkHeader::default();
            header.flags = NLM_F_REQUEST | NLM_F_DUMP;

            let payload = RouteNetlinkMessage::GetNeighbour(NeighbourMessage::default());
            let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(payload));
            packet.finalize();

            let mut buf = vec![0u8; packet.buffer_len()];
            packet.serialize(&mut buf);
            self.socket
                .send(&buf, 0)
                .map_err(|e| LinkMgrError::Netlink(format!("dump request: {}", e)))?;
            debug!("requested neighbor table dump");
            Ok(())
        }

        /// Receives one datagram and parses IPv4 neighbor updates out of it.
        /// Returns an empty batch on receive timeout.
        pub fn receive_events(&mut self) -> Result<Vec<(Ipv4Address, MacAddress)>> {
            let len = match self.socket.recv(&mut &mut self.buffer[..], 0) {
                Ok(len) => len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(Vec::new()),
                Err(e) => return Err(LinkMgrError::Netlink(format!("recv: {}", e))),
            };

            let mut events = Vec::new();
            let mut offset = 0;
            while offset < len {
                let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(
                    &self.buffer[offset..len],
                )
                .map_err(|e| LinkMgrError::Netlink(format!("parse: {}", e)))?;

                let msg_len = msg.header.length as usize;
                if msg_len == 0 {
                    break;
                }
                offset += (msg_len + 3) & !3;

                if let Some(event) = parse_neighbor(&msg) {
                    events.push(event);
                }
            }
            trace!(count = events.len(), "neighbor events");
            Ok(events)
        }
    }

    fn parse_neighbor(
        msg: &NetlinkMessage<RouteNetlinkMessage>,
    ) -> Option<(Ipv4Address, MacAddress)> {
        let neigh = match &msg.payload {
            NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewNeighbour(n)) => n,
            NetlinkPayload::InnerMessage(RouteNetlinkMessage::GetNeighbour(n)) => n,
            _ => return None,
        };

        let mut ip = None;
        let mut mac = None;
        for attr in &neigh.attributes {
            match attr {
                NeighbourAttribute::Destination(NeighbourAddress::Inet(addr)) => {
                    ip = Some(Ipv4Address::from(*addr));
                }
                NeighbourAttribute::LinkLocalAddress(bytes) if bytes.len() == 6 => {
                    let mut raw = [0u8; 6];
                    raw.copy_from_slice(bytes);
                    mac = Some(MacAddress::new(raw));
                }
                _ => {}
            }
        }

        let (ip, mac) = (ip?, mac?);
        if mac.is_zero() || mac.is_broadcast() {
            return None;
        }
        Some((ip, mac))
    }

    /// Dedicated listener thread: drains neighbor events and routes server
    /// MAC updates through the manager until shutdown.
    pub async fn run_neighbor_listener(
        manager: Weak<MuxManager>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<()> {
        let mut listener = NeighborListener::new()?;
        listener.request_dump()?;
        info!("neighbor listener started");

        tokio::task::spawn_blocking(move || {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let events = match listener.receive_events() {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(error = %e, "neighbor receive failed");
                        continue;
                    }
                };
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                for (ip, mac) in events {
                    manager.process_server_mac(ip, mac);
                }
            }
            info!("neighbor listener exiting");
        })
        .await
        .map_err(|e| LinkMgrError::Netlink(format!("listener thread: {}", e)))?;
        Ok(())
    }
}
