use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::bail;

use crate::packet::payload::Payload;

#[derive(Debug, Clone)]
pub struct OverlayClientConfig {
    /// The port the client receives on. Datagrams to servers and relays are sent to the same
    ///  port.
    pub listen_port: u16,
    pub remote_address: Ipv4Addr,
    /// overrides the local address reported by the transport
    pub local_address: Option<Ipv4Addr>,

    /// delay before a send is considered lost
    pub timeout: Duration,
    /// total send budget, retries included
    pub max_packets: u32,
    /// spacing between independent logical packets (not between retries)
    pub send_interval: Duration,

    pub payload: Payload,

    /// start of the client's activity, relative to its scheduler's epoch
    pub start_at: Duration,
    pub stop_at: Option<Duration>,
}

impl OverlayClientConfig {
    pub const DEFAULT_PORT: u16 = 9;

    pub fn new(remote_address: Ipv4Addr) -> OverlayClientConfig {
        OverlayClientConfig {
            listen_port: Self::DEFAULT_PORT,
            remote_address,
            local_address: None,
            timeout: Duration::from_secs(3),
            max_packets: 100,
            send_interval: Duration::from_secs(1),
            payload: Payload::zeroed(100),
            start_at: Duration::ZERO,
            stop_at: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        if self.listen_port == 0 {
            bail!("listen port must not be 0");
        }
        Ok(())
    }

    /// true if the configured activity window is empty, i.e. the client should never start
    pub fn is_empty_window(&self) -> bool {
        match self.stop_at {
            Some(stop_at) => self.start_at >= stop_at,
            None => false,
        }
    }

    pub fn packet_size(&self) -> usize {
        self.payload.size()
    }

    /// zero payload of the given size, discarding fill data
    pub fn set_packet_size(&mut self, size: usize) {
        self.payload = Payload::zeroed(size);
    }

    pub fn set_fill_str(&mut self, fill: &str) {
        self.payload = Payload::nul_terminated(fill);
    }

    pub fn set_fill_byte(&mut self, fill: u8, size: usize) {
        self.payload = Payload::from_byte(fill, size);
    }

    pub fn set_fill_pattern(&mut self, pattern: &[u8], size: usize) {
        self.payload = Payload::from_pattern(pattern, size);
    }
}
