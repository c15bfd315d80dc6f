use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::peers::peer_entry::PeerId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TraceKind {
    /// a client created a packet and sent it, directly or to a relay
    Sent,
    /// a relay passed on a packet that was not addressed to it
    Forwarded,
    /// a client received an acknowledgement from the server
    AckReceived,
}

/// A single trace event. `packet` is the complete datagram (header and payload) as it is
///  sent, forwarded or received.
#[derive(Clone)]
pub struct PacketTrace {
    pub node_id: PeerId,
    pub kind: TraceKind,
    pub packet: Bytes,
    pub elapsed: Duration,
}
impl Debug for PacketTrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?} by {} @{:?}: {} bytes]", self.kind, self.node_id, self.elapsed, self.packet.len())
    }
}

pub trait PacketTraceSink: Send + Sync {
    fn on_trace(&self, trace: &PacketTrace);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SinkId(u64);

/// Explicit subscriber lists, one per [TraceKind]. Sinks are called synchronously in
///  registration order.
#[derive(Default)]
pub struct TraceHooks {
    next_id: u64,
    sinks: FxHashMap<TraceKind, Vec<(SinkId, Arc<dyn PacketTraceSink>)>>,
}

impl TraceHooks {
    pub fn new() -> TraceHooks {
        Default::default()
    }

    pub fn register(&mut self, kind: TraceKind, sink: Arc<dyn PacketTraceSink>) -> SinkId {
        let id = SinkId(self.next_id);
        self.next_id += 1;

        self.sinks.entry(kind)
            .or_default()
            .push((id, sink));
        id
    }

    /// Registers the same sink for all kinds of trace events
    pub fn register_all(&mut self, sink: Arc<dyn PacketTraceSink>) -> Vec<(TraceKind, SinkId)> {
        [TraceKind::Sent, TraceKind::Forwarded, TraceKind::AckReceived].into_iter()
            .map(|kind| (kind, self.register(kind, sink.clone())))
            .collect()
    }

    pub fn deregister(&mut self, kind: TraceKind, id: SinkId) -> anyhow::Result<()> {
        let sinks = self.sinks.entry(kind).or_default();
        let Some(pos) = sinks.iter().position(|(sink_id, _)| *sink_id == id) else {
            return Err(anyhow!("deregistering a trace sink that was not previously registered: {:?} for {:?}", id, kind));
        };
        sinks.remove(pos);
        Ok(())
    }

    pub fn num_sinks(&self, kind: TraceKind) -> usize {
        self.sinks.get(&kind)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn fire(&self, trace: PacketTrace) {
        trace!("trace event {:?}", trace);
        if let Some(sinks) = self.sinks.get(&trace.kind) {
            for (_, sink) in sinks {
                sink.on_trace(&trace);
            }
        }
    }
}
