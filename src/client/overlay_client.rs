use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use bytes::{BufMut, Bytes, BytesMut};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::select;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tracing::{debug, error, info, trace, warn};

use crate::client::client_config::OverlayClientConfig;
use crate::client::scheduler::{ClientEvent, EventScheduler, TimerAction, TimerHandle, TimerId};
use crate::packet::header::PacketHeader;
use crate::path::heuristic::PathHeuristic;
use crate::peers::peer_entry::{Location, PeerEntry, PeerId};
use crate::peers::peer_registry::PeerRegistry;
use crate::trace::hooks::{PacketTrace, TraceHooks, TraceKind};
use crate::transport::{DatagramHandler, Transport};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClientState {
    Idle,
    AwaitingDirectAck,
    AwaitingOverlayAck,
    /// the client's event loop is over
    Stopped,
}

/// Turns received datagrams into events on the client's channel
struct DatagramForwarder {
    sender: mpsc::UnboundedSender<ClientEvent>,
}
impl DatagramHandler for DatagramForwarder {
    fn on_datagram(&self, buf: &[u8], from: SocketAddrV4) {
        let event = ClientEvent::Datagram {
            buf: Bytes::copy_from_slice(buf),
            from,
        };
        if self.sender.send(event).is_err() {
            debug!("client is gone, dropping datagram from {}", from);
        }
    }
}

/// An overlay node that sends packets to a server and relays packets for other nodes.
///
/// A client sends a packet directly to the server first. If that is not acknowledged within
///  the timeout, it retries once through a relay picked by its [PathHeuristic]. Any
///  acknowledgement ends the retry cycle, and the next packet is sent after the send interval
///  as long as the send budget lasts.
///
/// All of the client's work happens in [OverlayClient::handle_event], one event at a time:
///  timers and the transport's receive loop only post events to the client's channel.
pub struct OverlayClient {
    node_id: PeerId,
    config: OverlayClientConfig,
    transport: Arc<dyn Transport>,
    heuristic: Box<dyn PathHeuristic>,
    registry: Arc<RwLock<PeerRegistry>>,
    hooks: TraceHooks,

    scheduler: EventScheduler,
    event_sender: mpsc::UnboundedSender<ClientEvent>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    timers: FxHashMap<TimerId, TimerHandle>,
    recv_task: Option<JoinHandle<()>>,

    state: ClientState,
    local_addr: Option<Ipv4Addr>,
    source_peer: Option<Arc<PeerEntry>>,
    server_peer: Option<Arc<PeerEntry>>,
    sent: u32,
    outstanding: FxHashSet<u32>,
}

impl OverlayClient {
    pub fn new(
        node_id: PeerId,
        config: OverlayClientConfig,
        transport: Arc<dyn Transport>,
        heuristic: Box<dyn PathHeuristic>,
        registry: Arc<RwLock<PeerRegistry>>,
    ) -> anyhow::Result<OverlayClient> {
        config.validate()?;

        let (event_sender, events) = mpsc::unbounded_channel();
        let scheduler = EventScheduler::new(event_sender.clone());

        Ok(OverlayClient {
            node_id,
            config,
            transport,
            heuristic,
            registry,
            hooks: TraceHooks::new(),
            scheduler,
            event_sender,
            events,
            timers: Default::default(),
            recv_task: None,
            state: ClientState::Idle,
            local_addr: None,
            source_peer: None,
            server_peer: None,
            sent: 0,
            outstanding: Default::default(),
        })
    }

    pub fn node_id(&self) -> PeerId {
        self.node_id
    }

    pub fn config(&self) -> &OverlayClientConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// number of packets sent so far, retries included
    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn is_outstanding(&self, seq: u32) -> bool {
        self.outstanding.contains(&seq)
    }

    pub fn num_outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn pending_timer_count(&self) -> usize {
        self.timers.len()
    }

    /// the local address, known after the client was started
    pub fn local_addr(&self) -> Option<Ipv4Addr> {
        self.local_addr
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    pub fn hooks_mut(&mut self) -> &mut TraceHooks {
        &mut self.hooks
    }

    /// Sets the server explicitly instead of looking it up in the registry by address
    pub fn set_remote_peer(&mut self, peer: Arc<PeerEntry>) {
        self.config.remote_address = peer.address;
        self.server_peer = Some(peer);
    }

    pub fn set_heuristic(&mut self, mut heuristic: Box<dyn PathHeuristic>) {
        if let Some(source) = &self.source_peer {
            heuristic.set_source_peer(source.clone());
        }
        self.heuristic = heuristic;
    }

    pub async fn start(&mut self) -> anyhow::Result<()> {
        if self.config.is_empty_window() {
            info!("client {}: start at {:?} is not before stop at {:?} - not starting", self.node_id, self.config.start_at, self.config.stop_at);
            return Ok(());
        }

        let local_addr = match self.config.local_address {
            Some(addr) => addr,
            None => self.transport.local_addr()?,
        };
        self.local_addr = Some(local_addr);

        let source_peer = self.registry.read().await
            .get_peer(self.node_id)
            .unwrap_or_else(|| Arc::new(PeerEntry::new(self.node_id, local_addr, Location::default())));
        self.heuristic.set_source_peer(source_peer.clone());
        self.source_peer = Some(source_peer);

        if self.server_peer.is_none() {
            self.server_peer = self.registry.read().await
                .get_peer_by_address(self.config.remote_address);
        }

        if self.recv_task.is_none() {
            let transport = self.transport.clone();
            let handler = Arc::new(DatagramForwarder { sender: self.event_sender.clone() });
            let node_id = self.node_id;
            self.recv_task = Some(tokio::spawn(async move {
                if let Err(e) = transport.recv_loop(handler).await {
                    error!("client {}: receive loop terminated: {}", node_id, e);
                }
            }));
        }

        info!("client {} started on {}, sending to {}", self.node_id, local_addr, self.config.remote_address);

        if self.sent < self.config.max_packets {
            self.schedule(Duration::ZERO, TimerAction::Transmit { via_overlay: false });
        }
        Ok(())
    }

    fn schedule(&mut self, delay: Duration, action: TimerAction) {
        let handle = self.scheduler.schedule_after(delay, action);
        self.timers.insert(handle.id(), handle);
    }

    /// Cancels all pending timers. Events of cancelled timers that are already queued are
    ///  ignored when they are processed.
    pub fn cancel_events(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.cancel();
        }
    }

    fn fire_trace(&self, kind: TraceKind, packet: Bytes) {
        self.hooks.fire(PacketTrace {
            node_id: self.node_id,
            kind,
            packet,
            elapsed: self.scheduler.elapsed(),
        });
    }

    /// Sends the next packet to the server, either directly or through a relay
    pub async fn send(&mut self, via_overlay: bool) -> anyhow::Result<()> {
        let Some(local_addr) = self.local_addr else {
            bail!("client {} was not started", self.node_id);
        };
        let remote = self.config.remote_address;

        let mut header = if via_overlay {
            let Some(server_peer) = self.server_peer.clone() else {
                debug!("client {}: server {} is not a known peer - no relay to retry through", self.node_id, remote);
                self.cancel_events();
                self.state = ClientState::Idle;
                return Ok(());
            };
            match self.heuristic.get_next_peer_address(&server_peer).await {
                Ok(relay) => PacketHeader::via(remote, relay),
                Err(e) => {
                    debug!("client {}: giving up on retry: {}", self.node_id, e);
                    self.cancel_events();
                    self.state = ClientState::Idle;
                    return Ok(());
                }
            }
        }
        else {
            // a new packet starts a new retry cycle with all relays available again
            self.heuristic.reset_history();
            PacketHeader::new(remote)
        };

        let seq = self.sent;
        header.set_seq(seq);
        header.set_origin(local_addr);

        let mut buf = BytesMut::with_capacity(header.serialized_len() + self.config.payload.size());
        header.ser(&mut buf);
        self.config.payload.write(&mut buf);
        let packet = buf.freeze();

        let to = SocketAddrV4::new(header.next_dest(), self.config.listen_port);
        debug!("client {}: sending {} to {}", self.node_id, header, to);

        self.fire_trace(TraceKind::Sent, packet.clone());
        self.transport.send_to(&packet, to).await?;

        self.sent += 1;
        self.schedule(self.config.timeout, TimerAction::CheckTimeout { seq });
        self.outstanding.insert(seq);
        self.state = if via_overlay { ClientState::AwaitingOverlayAck } else { ClientState::AwaitingDirectAck };
        Ok(())
    }

    pub async fn check_timeout(&mut self, seq: u32) -> anyhow::Result<()> {
        if !self.outstanding.remove(&seq) {
            trace!("client {}: timeout for packet {} which is not outstanding", self.node_id, seq);
            return Ok(());
        }

        debug!("client {}: packet {} timed out", self.node_id, seq);
        if self.sent < self.config.max_packets {
            self.send(true).await
        }
        else {
            debug!("client {}: send budget of {} is used up, not retrying", self.node_id, self.config.max_packets);
            self.state = ClientState::Idle;
            Ok(())
        }
    }

    /// Processes a received datagram: either it is an acknowledgement for this client, or it
    ///  is relayed on to its next destination
    pub async fn handle_read(&mut self, buf: &[u8], from: SocketAddrV4) -> anyhow::Result<()> {
        let mut payload = buf;
        let header = match PacketHeader::deser(&mut payload) {
            Ok(header) => header,
            Err(e) => {
                warn!("client {}: discarding datagram from {}: {}", self.node_id, from, e);
                return Ok(());
            }
        };

        if header.has_arrived() {
            self.process_ack(&header, buf);
            Ok(())
        }
        else {
            self.forward_packet(header, payload, *from.ip()).await
        }
    }

    pub async fn forward_packet(&mut self, mut header: PacketHeader, payload: &[u8], source: Ipv4Addr) -> anyhow::Result<()> {
        // the sender does not know its egress address reliably, the first relay does
        if header.hops() == 0 {
            header.set_origin(source);
        }
        header.incr_hops()?;

        let mut buf = BytesMut::with_capacity(header.serialized_len() + payload.len());
        header.ser(&mut buf);
        buf.put_slice(payload);
        let packet = buf.freeze();

        let to = SocketAddrV4::new(header.next_dest(), self.config.listen_port);
        debug!("client {}: forwarding {} to {}", self.node_id, header, to);

        self.fire_trace(TraceKind::Forwarded, packet.clone());
        self.transport.send_to(&packet, to).await
    }

    /// Any acknowledgement ends the current retry cycle, whether it is for the latest packet
    ///  or not. Nothing stays outstanding after it, since all timeout timers are cancelled.
    pub fn process_ack(&mut self, header: &PacketHeader, packet: &[u8]) {
        let seq = header.seq();
        if self.outstanding.contains(&seq) {
            debug!("client {}: packet {} was acknowledged", self.node_id, seq);
        }
        else {
            debug!("client {}: acknowledgement for packet {} which is not outstanding", self.node_id, seq);
        }

        self.outstanding.clear();
        self.cancel_events();
        self.fire_trace(TraceKind::AckReceived, Bytes::copy_from_slice(packet));
        self.state = ClientState::Idle;

        if self.sent < self.config.max_packets {
            self.schedule(self.config.send_interval, TimerAction::Transmit { via_overlay: false });
        }
    }

    /// Closes the transport and resets the client, so that it can be started again
    pub fn stop(&mut self) {
        self.transport.cancel_recv_loop();
        if let Some(recv_task) = self.recv_task.take() {
            recv_task.abort();
        }

        self.cancel_events();
        self.sent = 0;
        self.outstanding.clear();
        self.state = ClientState::Idle;
        debug!("client {} stopped", self.node_id);
    }

    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    pub async fn handle_event(&mut self, event: ClientEvent) -> anyhow::Result<()> {
        trace!("client {}: handling {:?}", self.node_id, event);

        match event {
            ClientEvent::Timer { id, action } => {
                if self.timers.remove(&id).is_none() {
                    trace!("client {}: ignoring cancelled timer {}", self.node_id, id);
                    return Ok(());
                }
                match action {
                    TimerAction::Transmit { via_overlay } => self.send(via_overlay).await,
                    TimerAction::CheckTimeout { seq } => self.check_timeout(seq).await,
                }
            }
            ClientEvent::Datagram { buf, from } => {
                // a relay that cannot reach the next hop drops the packet and keeps running
                if let Err(e) = self.handle_read(&buf, from).await {
                    warn!("client {}: dropping datagram from {}: {}", self.node_id, from, e);
                }
                Ok(())
            }
        }
    }

    /// Runs the client for its configured activity window: waits for the start time, processes
    ///  events until the stop time (if any), and stops the client.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let epoch = self.scheduler.epoch();
        sleep_until(epoch + self.config.start_at).await;

        self.start().await?;

        let stop_deadline = self.config.stop_at.map(|stop_at| epoch + stop_at);
        loop {
            let event = match stop_deadline {
                Some(deadline) => select! {
                    e = self.events.recv() => e,
                    _ = sleep_until(deadline) => None,
                },
                None => self.events.recv().await,
            };

            match event {
                Some(event) => self.handle_event(event).await?,
                None => break,
            }
        }

        self.stop();
        self.state = ClientState::Stopped;
        info!("client {} finished after sending {} packets", self.node_id, self.sent);
        Ok(())
    }
}

impl Drop for OverlayClient {
    fn drop(&mut self) {
        if let Some(recv_task) = self.recv_task.take() {
            self.transport.cancel_recv_loop();
            recv_task.abort();
        }
    }
}
