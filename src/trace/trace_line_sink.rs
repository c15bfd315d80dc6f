use std::io::Write;
use std::sync::Mutex;

use tracing::warn;

use crate::packet::header::PacketHeader;
use crate::trace::hooks::{PacketTrace, PacketTraceSink, TraceKind};

/// Writes one line per trace event in the format the simulation trace analysis expects, e.g.
///
/// ```ascii
/// Node 3 sent 115 bytes at 1.000
/// Node 7 forwarded 119 bytes at 1.002
/// Node 3 received indirect ACK at 1.004
/// ```
pub struct TraceLineSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> TraceLineSink<W> {
    pub fn new(out: W) -> TraceLineSink<W> {
        TraceLineSink { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn format_line(trace: &PacketTrace) -> String {
        let secs = trace.elapsed.as_secs_f64();
        match trace.kind {
            TraceKind::Sent => format!("Node {} sent {} bytes at {:.3}", trace.node_id, trace.packet.len(), secs),
            TraceKind::Forwarded => format!("Node {} forwarded {} bytes at {:.3}", trace.node_id, trace.packet.len(), secs),
            TraceKind::AckReceived => {
                let mut buf: &[u8] = &trace.packet;
                let route = match PacketHeader::deser(&mut buf) {
                    Ok(header) if header.is_forward() => "indirect",
                    _ => "direct",
                };
                format!("Node {} received {} ACK at {:.3}", trace.node_id, route, secs)
            }
        }
    }
}

impl<W: Write + Send> PacketTraceSink for TraceLineSink<W> {
    fn on_trace(&self, trace: &PacketTrace) {
        let line = Self::format_line(trace);
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line) {
            warn!(error = ?e, "error writing trace line");
        }
    }
}
