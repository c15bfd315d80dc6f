//! Datagram transport the overlay runs on.
//!
//! The transport abstraction is deliberately small: overlay nodes only ever send single
//!  datagrams to an IPv4 address, and consume received datagrams through a synchronous
//!  callback that is expected to hand them over to an event loop rather than process them.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

pub mod udp;

/// Maximum size of a received datagram - that is the maximum UDP payload
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Sync + Send {
    /// The IPv4 address this transport sends from, i.e. the address peers see as a packet's
    ///  source.
    fn local_addr(&self) -> anyhow::Result<Ipv4Addr>;

    async fn send_to(&self, buf: &[u8], to: SocketAddrV4) -> anyhow::Result<()>;

    /// Receives datagrams and passes them to `handler` until the loop is cancelled
    async fn recv_loop(&self, handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()>;

    fn cancel_recv_loop(&self);
}

pub trait DatagramHandler: Sync + Send {
    fn on_datagram(&self, buf: &[u8], from: SocketAddrV4);
}
