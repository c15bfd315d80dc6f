use std::sync::Mutex;

use crate::trace::hooks::{PacketTrace, PacketTraceSink, TraceKind};

/// Records all trace events it receives
#[derive(Default)]
pub struct TrackingTraceSink {
    traces: Mutex<Vec<PacketTrace>>,
}

impl TrackingTraceSink {
    pub fn new() -> TrackingTraceSink {
        Default::default()
    }

    pub fn traces(&self) -> Vec<PacketTrace> {
        self.traces.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<TraceKind> {
        self.traces.lock().unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    pub fn count(&self, kind: TraceKind) -> usize {
        self.traces.lock().unwrap()
            .iter()
            .filter(|t| t.kind == kind)
            .count()
    }
}

impl PacketTraceSink for TrackingTraceSink {
    fn on_trace(&self, trace: &PacketTrace) {
        self.traces.lock().unwrap().push(trace.clone());
    }
}
