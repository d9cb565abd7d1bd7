//! Crate root: owns the engine, the background receive/timer threads, and
//! the upper-layer callback handle — shaped after `NetStack` (`src/lib.rs`):
//! an `Arc<Mutex<_>>`-protected core plus `thread::spawn`ed workers draining
//! an `Action`-shaped event queue, generalized from one TUN-reading
//! `segment_loop` into a receive-path thread and a timer thread, matching
//! three independent entry points (receive / send / timer) instead of a
//! single loop that serviced both segment I/O and per-connection
//! retransmit ticks.

mod error;
pub use error::Error;

pub mod callbacks;
pub mod config;
pub mod engine;
pub mod transport;

pub use callbacks::EngineCallbacks;
pub use config::EngineConfig;
pub use engine::window::{AreqEntry, PktDesc};
pub use engine::{Engine, EngineEvent, Stats};
pub use transport::{LoopbackTransport, Transport, UdpTransport};

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timeout the receive thread polls at while idle — mirrors `segment_loop`'s
/// 1ms `poll()` timeout, widened since there's no raw fd to multiplex here
/// and the thread just needs to notice shutdown promptly.
const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Fallback wake interval for the timer thread when no deadline is armed,
/// so it still notices shutdown without a dedicated wake on every path.
const IDLE_TIMER_POLL: Duration = Duration::from_millis(200);

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_nanos() as u64
}

struct Inner<T: Transport> {
    engine: Mutex<Engine>,
    callbacks: Mutex<Option<Box<dyn EngineCallbacks + Send>>>,
    transport: T,
    src_addr: Ipv4Addr,
    /// Set while the timer thread is inside its fire-and-rearm critical
    /// section. Shaped after the `Arc<AtomicBool>` fields (`reset`,
    /// `write_closed`) on `StreamEntry`/`EstabElement`, and implements the
    /// "cancel; if already running, do nothing" rearm rule: a rearm that
    /// observes this set skips waking the timer thread early, since the
    /// in-flight fire will rearm on its way out anyway.
    timer_firing: AtomicBool,
    shutdown: AtomicBool,
    wake: Condvar,
    wake_guard: Mutex<()>,
}

fn dispatch_all<T: Transport>(inner: &Inner<T>, events: Vec<EngineEvent>) {
    if events.is_empty() {
        return;
    }
    let mut callbacks = inner.callbacks.lock().unwrap();
    // Detached: no callback, no recovery — descriptors are simply dropped
    // along with the engine's own teardown.
    let Some(callbacks) = callbacks.as_mut() else {
        return;
    };
    for event in events {
        match event {
            EngineEvent::Ack(pd) => callbacks.handle_ack(pd),
            EngineEvent::NegAck(pd) => callbacks.handle_neg_ack(pd),
            EngineEvent::Reset => callbacks.handle_reset(),
            EngineEvent::Alloc { base_tslot, dsts, slot_bytes } => {
                callbacks.handle_alloc(base_tslot, &dsts, &slot_bytes)
            }
        }
    }
}

fn recv_loop<T: Transport>(inner: Arc<Inner<T>>) {
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        match inner.transport.recv_datagram(RECV_POLL_TIMEOUT) {
            Ok(Some(bytes)) => {
                let events = inner.engine.lock().unwrap().deliver_datagram(&bytes, now_ns());
                dispatch_all(&inner, events);
                wake_timer(&inner);
            }
            Ok(None) => {}
            Err(e) => log::warn!("transport recv error: {e}"),
        }
    }
}

fn wake_timer<T: Transport>(inner: &Inner<T>) {
    if inner.timer_firing.load(Ordering::Acquire) {
        return;
    }
    let _guard = inner.wake_guard.lock().unwrap();
    inner.wake.notify_one();
}

fn timer_loop<T: Transport>(inner: Arc<Inner<T>>) {
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let wait = {
            let engine = inner.engine.lock().unwrap();
            match engine.timer_deadline() {
                Some(deadline) => {
                    let now = now_ns();
                    if deadline <= now {
                        Duration::ZERO
                    } else {
                        Duration::from_nanos(deadline - now)
                    }
                }
                None => IDLE_TIMER_POLL,
            }
        };

        if wait > Duration::ZERO {
            let guard = inner.wake_guard.lock().unwrap();
            let _ = inner.wake.wait_timeout(guard, wait).unwrap();
        }
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        inner.timer_firing.store(true, Ordering::Release);
        let events = {
            let mut engine = inner.engine.lock().unwrap();
            let now = now_ns();
            if engine.timer_deadline().map_or(false, |d| d <= now) {
                engine.fire_timer(now)
            } else {
                Vec::new()
            }
        };
        inner.timer_firing.store(false, Ordering::Release);
        dispatch_all(&inner, events);
    }
}

/// Owner of one FastPass engine bound to one peer. Construct with a
/// `Transport` and an `EngineCallbacks` implementation; `send` and
/// `shutdown` are the only entry points the upper layer calls directly —
/// everything inbound is driven by the background receive thread.
pub struct FastpassEngine<T: Transport + 'static> {
    inner: Arc<Inner<T>>,
    recv_thread: Option<thread::JoinHandle<()>>,
    timer_thread: Option<thread::JoinHandle<()>>,
}

impl<T: Transport + 'static> FastpassEngine<T> {
    pub fn new(
        config: EngineConfig,
        bind_addr: Ipv4Addr,
        transport: T,
        callbacks: Box<dyn EngineCallbacks + Send>,
    ) -> Self {
        let inner = Arc::new(Inner {
            engine: Mutex::new(Engine::new(config)),
            callbacks: Mutex::new(Some(callbacks)),
            transport,
            src_addr: bind_addr,
            timer_firing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            wake: Condvar::new(),
            wake_guard: Mutex::new(()),
        });

        let recv_thread = {
            let inner = inner.clone();
            thread::spawn(move || recv_loop(inner))
        };
        let timer_thread = {
            let inner = inner.clone();
            thread::spawn(move || timer_loop(inner))
        };

        FastpassEngine {
            inner,
            recv_thread: Some(recv_thread),
            timer_thread: Some(timer_thread),
        }
    }

    /// `prepare_to_send` → `commit_packet` → `send_packet`, under the
    /// engine lock, followed by handing the encoded datagram to the
    /// transport outside the lock.
    pub fn send(&self, pd: PktDesc) -> Result<(), Error> {
        let (bytes, events) = {
            let mut engine = self.inner.engine.lock().unwrap();
            let events: Vec<EngineEvent> = engine.prepare_to_send().into_iter().collect();
            let seqno = engine.commit_packet(pd, now_ns());
            let bytes = engine
                .send_packet(seqno, self.inner.src_addr)
                .expect("just-committed seqno must still be in the window");
            (bytes, events)
        };
        dispatch_all(&self.inner, events);
        self.inner.transport.send_datagram(&bytes)?;
        wake_timer(&self.inner);
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        self.inner.engine.lock().unwrap().stats()
    }

    pub fn in_sync(&self) -> bool {
        self.inner.engine.lock().unwrap().in_sync()
    }

    /// Detach the upper-layer handle first (so any in-flight callback
    /// dispatch becomes a no-op), then stop and join both background
    /// threads.
    pub fn shutdown(mut self) {
        *self.inner.callbacks.lock().unwrap() = None;
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _guard = self.inner.wake_guard.lock().unwrap();
            self.inner.wake.notify_all();
        }
        if let Some(jh) = self.recv_thread.take() {
            let _ = jh.join();
        }
        if let Some(jh) = self.timer_thread.take() {
            let _ = jh.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct RecordingCallbacks {
        acks: mpsc::Sender<u64>,
        neg_acks: mpsc::Sender<u64>,
    }

    impl EngineCallbacks for RecordingCallbacks {
        fn handle_ack(&mut self, pd: PktDesc) {
            let _ = self.acks.send(pd.seqno);
        }
        fn handle_neg_ack(&mut self, pd: PktDesc) {
            let _ = self.neg_acks.send(pd.seqno);
        }
        fn handle_reset(&mut self) {}
        fn handle_alloc(&mut self, _base_tslot: u16, _dsts: &[u16], _slot_bytes: &[u8]) {}
    }

    #[test]
    fn send_then_retransmit_on_timeout() {
        let (client_transport, arbiter_transport) = LoopbackTransport::pair();
        let config = EngineConfig::new(Ipv4Addr::new(10, 0, 0, 2), 9999)
            .with_send_timeout(20_000_000) // 20ms, keeps the test fast but well above scheduling noise
            .with_window_len(8)
            .unwrap();

        let (acks_tx, _acks_rx) = mpsc::channel();
        let (neg_tx, neg_rx) = mpsc::channel();
        let callbacks = Box::new(RecordingCallbacks { acks: acks_tx, neg_acks: neg_tx });

        let client = FastpassEngine::new(config, Ipv4Addr::new(10, 0, 0, 1), client_transport, callbacks);

        let pd = PktDesc::new(vec![AreqEntry { src_dst_key: 1, tslots: 1 }]);
        client.send(pd).unwrap();

        // The arbiter side of the loopback should see exactly one datagram
        // land, with no response sent back — confirming the retransmit
        // fires from the timer thread rather than a second `send` call.
        let datagram = arbiter_transport
            .recv_datagram(Duration::from_millis(200))
            .unwrap()
            .expect("client should have sent a datagram");
        assert!(datagram.len() >= engine::codec::HEADER_LEN);

        let seqno = neg_rx.recv_timeout(Duration::from_secs(2)).expect("timer should fire a neg-ack");
        assert_eq!(seqno, 0);

        client.shutdown();
    }
}
