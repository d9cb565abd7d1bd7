use std::net::Ipv4Addr;

use crate::Error;

/// Maximum number of A-REQ entries a single outbound packet may carry,
/// bounded by the 6-bit count field in the A-REQ header.
pub const MAX_AREQ: usize = 63;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub send_timeout_ns: u64,
    pub reset_window_ns: u64,
    pub window_len: u32,
    pub peer_addr: Ipv4Addr,
    pub peer_port: u16,
}

impl EngineConfig {
    /// 20ms send timeout, 2s reset acceptance window, 256-entry window —
    /// reasonable datacenter defaults; callers needing something tighter
    /// should override with the `with_*` builders below.
    pub fn new(peer_addr: Ipv4Addr, peer_port: u16) -> Self {
        EngineConfig {
            send_timeout_ns: 20_000_000,
            reset_window_ns: 2_000_000_000,
            window_len: 256,
            peer_addr,
            peer_port,
        }
    }

    pub fn with_send_timeout(mut self, ns: u64) -> Self {
        self.send_timeout_ns = ns;
        self
    }

    pub fn with_reset_window(mut self, ns: u64) -> Self {
        self.reset_window_ns = ns;
        self
    }

    pub fn with_window_len(mut self, len: u32) -> Result<Self, Error> {
        if len == 0 || !len.is_power_of_two() {
            return Err(Error::InvalidWindowLen(len));
        }
        self.window_len = len;
        Ok(self)
    }
}
