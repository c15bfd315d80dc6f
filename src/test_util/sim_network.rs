use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use crate::transport::{DatagramHandler, Transport};

type Inbox = mpsc::UnboundedSender<(Bytes, SocketAddrV4)>;

/// A datagram as it was handed to the simulated network, whether it was delivered or not
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SentDatagram {
    pub from: SocketAddrV4,
    pub to: SocketAddrV4,
    pub buf: Bytes,
    pub delivered: bool,
}

#[derive(Default)]
struct SimNetworkInner {
    inboxes: FxHashMap<Ipv4Addr, Inbox>,
    failed_links: FxHashSet<(Ipv4Addr, Ipv4Addr)>,
    unreachable: FxHashSet<Ipv4Addr>,
    sent: Vec<SentDatagram>,
}

/// An in-memory network connecting [SimTransport]s by IPv4 address. Links between pairs of
///  addresses can fail, silently dropping all datagrams between them in both directions.
///  Sending to an unreachable address fails with an error, the way a socket reports a missing
///  route. Delivery is immediate and in order otherwise.
#[derive(Clone, Default)]
pub struct SimNetwork {
    inner: Arc<Mutex<SimNetworkInner>>,
}

fn link_key(a: Ipv4Addr, b: Ipv4Addr) -> (Ipv4Addr, Ipv4Addr) {
    if a <= b { (a, b) } else { (b, a) }
}

impl SimNetwork {
    pub fn new() -> SimNetwork {
        Default::default()
    }

    /// Creates a transport for a node at `addr`. Datagrams sent to `addr` are buffered until
    ///  the transport's receive loop runs.
    pub fn transport(&self, addr: Ipv4Addr, port: u16) -> SimTransport {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().inboxes.insert(addr, sender);

        let (cancel_sender, _) = broadcast::channel(1);
        SimTransport {
            addr: SocketAddrV4::new(addr, port),
            network: self.clone(),
            receiver: tokio::sync::Mutex::new(receiver),
            cancel_sender,
        }
    }

    pub fn fail_link(&self, a: Ipv4Addr, b: Ipv4Addr) {
        self.inner.lock().unwrap().failed_links.insert(link_key(a, b));
    }

    pub fn restore_link(&self, a: Ipv4Addr, b: Ipv4Addr) {
        self.inner.lock().unwrap().failed_links.remove(&link_key(a, b));
    }

    pub fn set_unreachable(&self, addr: Ipv4Addr) {
        self.inner.lock().unwrap().unreachable.insert(addr);
    }

    pub fn sent(&self) -> Vec<SentDatagram> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn sent_from(&self, addr: Ipv4Addr) -> Vec<SentDatagram> {
        self.inner.lock().unwrap().sent.iter()
            .filter(|d| *d.from.ip() == addr)
            .cloned()
            .collect()
    }

    pub fn clear_sent(&self) {
        self.inner.lock().unwrap().sent.clear();
    }

    fn send(&self, buf: &[u8], from: SocketAddrV4, to: SocketAddrV4) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unreachable.contains(to.ip()) {
            bail!("network is unreachable: {}", to);
        }

        let buf = Bytes::copy_from_slice(buf);

        let delivered = if inner.failed_links.contains(&link_key(*from.ip(), *to.ip())) {
            debug!("link {} - {} is down, dropping datagram", from.ip(), to.ip());
            false
        }
        else if let Some(inbox) = inner.inboxes.get(to.ip()) {
            trace!("delivering {} bytes from {} to {}", buf.len(), from, to);
            inbox.send((buf.clone(), from)).is_ok()
        }
        else {
            debug!("no node at {}, dropping datagram", to);
            false
        };

        inner.sent.push(SentDatagram { from, to, buf, delivered });
        Ok(())
    }
}

pub struct SimTransport {
    addr: SocketAddrV4,
    network: SimNetwork,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Bytes, SocketAddrV4)>>,
    cancel_sender: broadcast::Sender<()>,
}

#[async_trait]
impl Transport for SimTransport {
    fn local_addr(&self) -> anyhow::Result<Ipv4Addr> {
        Ok(*self.addr.ip())
    }

    async fn send_to(&self, buf: &[u8], to: SocketAddrV4) -> anyhow::Result<()> {
        self.network.send(buf, self.addr, to)
    }

    async fn recv_loop(&self, handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()> {
        let mut cancel_receiver = self.cancel_sender.subscribe();
        let Ok(mut receiver) = self.receiver.try_lock() else {
            bail!("a receive loop is already running for {}", self.addr);
        };

        loop {
            tokio::select! {
                r = receiver.recv() => {
                    match r {
                        Some((buf, from)) => handler.on_datagram(&buf, from),
                        None => break,
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }
        Ok(())
    }

    fn cancel_recv_loop(&self) {
        self.cancel_sender.send(()).ok();
    }
}
