use std::net::SocketAddrV4;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::client_config::OverlayClientConfig;
use crate::packet::header::PacketHeader;
use crate::transport::{DatagramHandler, Transport};

#[derive(Debug, Clone)]
pub struct OverlayServerConfig {
    /// the port to receive on, and to send acknowledgements to
    pub listen_port: u16,
}
impl OverlayServerConfig {
    pub fn new() -> OverlayServerConfig {
        OverlayServerConfig {
            listen_port: OverlayClientConfig::DEFAULT_PORT,
        }
    }
}
impl Default for OverlayServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct ChannelHandler {
    sender: mpsc::UnboundedSender<(Bytes, SocketAddrV4)>,
}
impl DatagramHandler for ChannelHandler {
    fn on_datagram(&self, buf: &[u8], from: SocketAddrV4) {
        let _ = self.sender.send((Bytes::copy_from_slice(buf), from));
    }
}

/// Acknowledges every packet that arrives at it by sending it back along its route in
///  reverse, payload included
pub struct OverlayServer {
    config: OverlayServerConfig,
    transport: Arc<dyn Transport>,
    echo_count: u64,
}

impl OverlayServer {
    pub fn new(config: OverlayServerConfig, transport: Arc<dyn Transport>) -> OverlayServer {
        OverlayServer {
            config,
            transport,
            echo_count: 0,
        }
    }

    pub fn echo_count(&self) -> u64 {
        self.echo_count
    }

    /// Receives and acknowledges packets until the transport's receive loop is cancelled. A
    ///  packet that cannot be acknowledged is dropped.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let transport = self.transport.clone();
        let recv_loop = transport.recv_loop(Arc::new(ChannelHandler { sender }));
        tokio::pin!(recv_loop);

        info!("overlay server listening on port {}", self.config.listen_port);

        loop {
            select! {
                r = &mut recv_loop => {
                    info!("overlay server stopped after acknowledging {} packets", self.echo_count);
                    return r;
                }
                Some((buf, from)) = receiver.recv() => {
                    if let Err(e) = self.handle_datagram(&buf, from).await {
                        warn!("server: could not acknowledge datagram from {}: {}", from, e);
                    }
                }
            }
        }
    }

    pub fn stop(&self) {
        self.transport.cancel_recv_loop();
    }

    pub async fn handle_datagram(&mut self, buf: &[u8], from: SocketAddrV4) -> anyhow::Result<()> {
        let mut payload = buf;
        let mut header = match PacketHeader::deser(&mut payload) {
            Ok(header) => header,
            Err(e) => {
                warn!("server: discarding datagram from {}: {}", from, e);
                return Ok(());
            }
        };

        if !header.has_arrived() {
            debug!("server: dropping {} from {} - it is not at its final hop", header, from);
            return Ok(());
        }

        header.reverse_path();

        let mut out = BytesMut::with_capacity(header.serialized_len() + payload.len());
        header.ser(&mut out);
        out.put_slice(payload);

        let to = SocketAddrV4::new(header.next_dest(), self.config.listen_port);
        debug!("server: acknowledging {} via {}", header, to);
        self.transport.send_to(&out, to).await?;
        self.echo_count += 1;
        Ok(())
    }
}
