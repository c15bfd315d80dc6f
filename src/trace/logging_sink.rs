use tracing::info;

use crate::trace::hooks::{PacketTrace, PacketTraceSink};

/// Emits every trace event as a structured `tracing` event
pub struct LoggingTraceSink;

impl PacketTraceSink for LoggingTraceSink {
    fn on_trace(&self, trace: &PacketTrace) {
        info!(node = trace.node_id, kind = ?trace.kind, bytes = trace.packet.len(), elapsed = ?trace.elapsed, "packet trace");
    }
}
