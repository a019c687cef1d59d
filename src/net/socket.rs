//! UDP socket construction for the acquisition link. A plain two-party UDP
//! socket needs none of the multicast/interface-binding machinery the
//! teacher's AES67 sockets do; this keeps the `socket2` knobs (reuse-address,
//! non-blocking) that still apply.

use crate::{config::SocketConfig, error::IngestResult};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tracing::info;

pub fn create_acquisition_socket(config: &SocketConfig) -> IngestResult<UdpSocket> {
    info!(local = %config.local_addr, remote = %config.remote_addr, "binding acquisition socket");

    let domain = if config.local_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(config.local_addr))?;

    Ok(UdpSocket::from_std(socket.into())?)
}
