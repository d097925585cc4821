//! A single process-wide IPv6 UDP endpoint bound to port 546.
//!
//! Creation mirrors the teacher's `hr-ipv6::pd_client::create_dhcpv6_socket`
//! (`socket2` builder → `tokio::net::UdpSocket::from_std`), generalized from
//! a one-shot WAN client into the shared endpoint every subnet session
//! sends and receives through.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::TransportError;

pub const CLIENT_PORT: u16 = 546;
pub const SERVER_PORT: u16 = 547;
pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: &str = "ff02::1:2";

const SEND_TIMEOUT: Duration = Duration::from_secs(3);

/// Binds the IPv6 DHCPv6 client socket: `AF_INET6/SOCK_DGRAM`, `::546`,
/// `SO_REUSEADDR`, `SO_BROADCAST`, `IPV6_MULTICAST_HOPS=1`, optionally
/// bound to a physical interface via `SO_BINDTODEVICE`.
pub fn open_client_socket(interface: &str) -> Result<UdpSocket, TransportError> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))
        .map_err(TransportError::Bind)?;
    socket.set_reuse_address(true).map_err(TransportError::Bind)?;
    socket.set_broadcast(true).map_err(TransportError::Bind)?;
    socket
        .set_multicast_hops_v6(1)
        .map_err(TransportError::Bind)?;

    #[cfg(target_os = "linux")]
    if !interface.is_empty() {
        socket
            .bind_device(Some(interface.as_bytes()))
            .map_err(TransportError::Bind)?;
    }

    let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, CLIENT_PORT, 0, 0);
    socket.bind(&bind_addr.into()).map_err(TransportError::Bind)?;
    socket.set_nonblocking(true).map_err(TransportError::Bind)?;

    UdpSocket::from_std(socket.into()).map_err(TransportError::Bind)
}

/// All_DHCP_Relay_Agents_and_Servers, port 547 — SOLICIT destination.
pub fn multicast_dest() -> SocketAddrV6 {
    SocketAddrV6::new(
        ALL_DHCP_RELAY_AGENTS_AND_SERVERS.parse().unwrap(),
        SERVER_PORT,
        0,
        0,
    )
}

/// Unicast destination for REQUEST/RENEW/RELEASE once a server is known.
pub fn unicast_dest(server: Ipv6Addr) -> SocketAddrV6 {
    SocketAddrV6::new(server, SERVER_PORT, 0, 0)
}

/// Sends `frame` to `dest`, bounded by a 3s send timeout. On timeout or I/O
/// error the caller's own retry policy decides what happens next — this
/// function never retries.
pub async fn send(socket: &UdpSocket, frame: &[u8], dest: SocketAddrV6) -> Result<(), TransportError> {
    tokio::time::timeout(SEND_TIMEOUT, socket.send_to(frame, SocketAddr::V6(dest)))
        .await
        .map_err(|_| TransportError::SendTimeout(SEND_TIMEOUT))?
        .map_err(TransportError::Send)?;
    Ok(())
}
