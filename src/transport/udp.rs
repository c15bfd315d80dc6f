use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, trace, warn};

use crate::transport::{DatagramHandler, MAX_DATAGRAM_SIZE, Transport};

/// UDP transport with a single socket that is used both for sending and receiving: relays and
///  servers reply to a datagram's observed source address, so that address must be the one the
///  receive loop listens on.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddrV4,
    cancel_sender: broadcast::Sender<()>,
}

impl UdpTransport {
    pub async fn bind(addr: Ipv4Addr, port: u16) -> anyhow::Result<UdpTransport> {
        let (cancel_sender, _) = broadcast::channel(1);

        let socket = UdpSocket::bind(SocketAddrV4::new(addr, port)).await?;
        let local_addr = match socket.local_addr()? {
            SocketAddr::V4(a) => a,
            SocketAddr::V6(a) => bail!("bound to IPv6 address {} - only IPv4 is supported", a),
        };
        debug!("bound UDP socket to {}", local_addr);

        Ok(UdpTransport {
            socket: Arc::new(socket),
            local_addr,
            cancel_sender,
        })
    }

    pub fn local_socket_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> anyhow::Result<Ipv4Addr> {
        if self.local_addr.ip().is_unspecified() {
            bail!("transport is bound to the unspecified address - configure the local address explicitly");
        }
        Ok(*self.local_addr.ip())
    }

    async fn send_to(&self, buf: &[u8], to: SocketAddrV4) -> anyhow::Result<()> {
        trace!("sending {} bytes to {}", buf.len(), to);
        self.socket.send_to(buf, to).await?;
        Ok(())
    }

    async fn recv_loop(&self, handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut cancel_receiver = self.cancel_sender.subscribe();

        trace!("starting UDP receive loop on {}", self.local_addr);

        loop {
            tokio::select! {
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, SocketAddr::V4(from))) => {
                            handler.on_datagram(&buf[..len], from);
                        }
                        Ok((_, from)) => {
                            debug!("ignoring datagram from non-IPv4 sender {}", from);
                        }
                        Err(e) => {
                            error!(error = ?e, "error receiving from datagram socket");
                            return Err(e.into());
                        }
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }

        trace!("UDP receive loop on {} ended", self.local_addr);
        Ok(())
    }

    fn cancel_recv_loop(&self) {
        if let Err(err) = self.cancel_sender.send(()) {
            warn!(?err, "error canceling receive loop");
        }
    }
}
