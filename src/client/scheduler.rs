use std::fmt::{Debug, Formatter};
use std::net::SocketAddrV4;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

pub type TimerId = u64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimerAction {
    Transmit { via_overlay: bool },
    CheckTimeout { seq: u32 },
}

/// Everything that makes a client do something arrives through its event channel, and the
///  client processes events one at a time.
pub enum ClientEvent {
    Timer { id: TimerId, action: TimerAction },
    Datagram { buf: Bytes, from: SocketAddrV4 },
}
impl Debug for ClientEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientEvent::Timer { id, action } => write!(f, "Timer#{}({:?})", id, action),
            ClientEvent::Datagram { buf, from } => write!(f, "Datagram({} bytes from {})", buf.len(), from),
        }
    }
}

/// Handle for a scheduled timer. Cancelling stops the timer if it did not fire yet; the
///  owner must additionally ignore events for timers it cancelled, since the event may already
///  be queued.
pub struct TimerHandle {
    id: TimerId,
    task: JoinHandle<()>,
}
impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}
impl Debug for TimerHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimerHandle#{}", self.id)
    }
}

/// Schedules timer events into a client's event channel, based on tokio's (possibly paused)
///  clock. The scheduler's epoch is the reference point for the client's configured activity
///  window and for trace timestamps.
pub struct EventScheduler {
    sender: mpsc::UnboundedSender<ClientEvent>,
    epoch: Instant,
    next_id: TimerId,
}

impl EventScheduler {
    pub fn new(sender: mpsc::UnboundedSender<ClientEvent>) -> EventScheduler {
        Self::with_epoch(sender, Instant::now())
    }

    pub fn with_epoch(sender: mpsc::UnboundedSender<ClientEvent>, epoch: Instant) -> EventScheduler {
        EventScheduler {
            sender,
            epoch,
            next_id: 0,
        }
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn elapsed(&self) -> Duration {
        self.now().saturating_duration_since(self.epoch)
    }

    pub fn schedule_after(&mut self, delay: Duration, action: TimerAction) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            // the receiver is gone when the client was dropped
            let _ = sender.send(ClientEvent::Timer { id, action });
        });

        TimerHandle { id, task }
    }
}
