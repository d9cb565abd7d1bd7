//! Transport contract: the engine requires `send_datagram`; it provides
//! `deliver_datagram`, which the transport calls on receipt. `NetStack`
//! hardcodes a single concrete transport (`tidy_tuntap::Tun`, read/written
//! directly in `segment_loop`, `src/lib.rs`) rather than a trait, since it
//! only ever targets one real device; this crate lifts that into an
//! explicit trait so the background poller in `lib.rs` can drive either a
//! real UDP socket or, in tests, an in-memory loopback — while keeping the
//! same blocking-call, no-async style.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// A datagram sink/source bound to exactly one peer — one engine instance
/// serves one peer. Implementations are expected to be blocking, matching
/// `segment_loop`'s direct `tun.read`/`tun.write` calls — there is no async
/// runtime anywhere in this crate.
pub trait Transport: Send {
    fn send_datagram(&self, bytes: &[u8]) -> io::Result<()>;

    /// Blocks for up to `timeout` waiting for a datagram. `Ok(None)` means
    /// the timeout elapsed with nothing received — the poller loop
    /// (`lib.rs`) uses this to wake up and recheck the retransmission
    /// deadline, mirroring `segment_loop`'s 1ms `poll()` timeout.
    fn recv_datagram(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>>;
}

/// In-memory transport double for tests: an mpsc channel pair standing in
/// for a socket. `send_datagram` hands bytes to whichever `LoopbackPeer`
/// this one is wired to; `recv_datagram` drains this side's inbox.
pub struct LoopbackTransport {
    outbox: std::sync::mpsc::Sender<Vec<u8>>,
    inbox: std::sync::Mutex<std::sync::mpsc::Receiver<Vec<u8>>>,
}

impl LoopbackTransport {
    /// Builds a connected pair: bytes sent on one side arrive on the
    /// other's `recv_datagram`.
    pub fn pair() -> (LoopbackTransport, LoopbackTransport) {
        let (tx_a, rx_a) = std::sync::mpsc::channel();
        let (tx_b, rx_b) = std::sync::mpsc::channel();
        (
            LoopbackTransport {
                outbox: tx_b,
                inbox: std::sync::Mutex::new(rx_a),
            },
            LoopbackTransport {
                outbox: tx_a,
                inbox: std::sync::Mutex::new(rx_b),
            },
        )
    }
}

impl Transport for LoopbackTransport {
    fn send_datagram(&self, bytes: &[u8]) -> io::Result<()> {
        self.outbox
            .send(bytes.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))
    }

    fn recv_datagram(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        let inbox = self.inbox.lock().unwrap();
        match inbox.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

/// Real `Transport` over a connected UDP socket — the demo binaries' stand-in
/// for a deployed endpoint, since this crate has no raw-socket or TUN
/// dependency of its own. A UDP datagram is the idiomatic userspace
/// substitute for the raw IP framing FastPass rides over in production.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds `bind_addr` and connects to `peer_addr`, so `send`/`recv`
    /// don't need to pass an address on every call.
    pub fn connect(bind_addr: SocketAddr, peer_addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(peer_addr)?;
        Ok(UdpTransport { socket })
    }
}

impl Transport for UdpTransport {
    fn send_datagram(&self, bytes: &[u8]) -> io::Result<()> {
        self.socket.send(bytes)?;
        Ok(())
    }

    fn recv_datagram(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        self.socket.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; 1500];
        match self.socket.recv(&mut buf) {
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_pair_delivers_in_both_directions() {
        let (a, b) = LoopbackTransport::pair();
        a.send_datagram(&[1, 2, 3]).unwrap();
        assert_eq!(b.recv_datagram(Duration::from_millis(50)).unwrap(), Some(vec![1, 2, 3]));

        b.send_datagram(&[4, 5]).unwrap();
        assert_eq!(a.recv_datagram(Duration::from_millis(50)).unwrap(), Some(vec![4, 5]));
    }

    #[test]
    fn recv_times_out_with_no_traffic() {
        let (a, _b) = LoopbackTransport::pair();
        assert_eq!(a.recv_datagram(Duration::from_millis(10)).unwrap(), None);
    }
}
