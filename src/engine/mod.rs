//! Wires the five FastPass components together: `prepare_to_send` →
//! `commit_packet` (OW.add, RT.arm) → `send_packet` (FCD.encode); inbound
//! datagrams through `deliver_datagram` (FCD.decode → per-payload
//! dispatch); timer expiry through `fire_timer`.
//!
//! `Engine` itself holds no thread, no lock, and no transport handle — it is
//! the same kind of plain, lock-free state object `TCB` (`src/tcp/mod.rs`)
//! is; the engine lock and background polling thread live in `crate::lib`
//! instead, the same way `TCB` stays free of concurrency concerns and the
//! `Arc<Mutex<Manager>>` / `thread::spawn` machinery sits in `segment_loop`.

pub mod ack;
pub mod codec;
pub mod hash;
pub mod seq;
pub mod timer;
pub mod window;

use std::net::Ipv4Addr;

use crate::config::EngineConfig;
use codec::{Frame, ParseStat, Payload};
use seq::{ResetOutcome, SequenceResetState};
use timer::RetransmitTimer;
use window::{AreqEntry, OutstandingWindow, PktDesc};

/// Everything the engine needs to hand back to the caller so it can be
/// dispatched to `EngineCallbacks` — kept as data rather than invoked
/// re-entrantly from inside `Engine`'s methods, since the engine has no
/// opinion on what lock the callback trait object sits behind.
#[derive(Debug)]
pub enum EngineEvent {
    Ack(PktDesc),
    NegAck(PktDesc),
    Reset,
    Alloc {
        base_tslot: u16,
        dsts: Vec<u16>,
        slot_bytes: Vec<u8>,
    },
}

/// Statistic counters for every non-fatal protocol outcome. Nothing here is
/// ever surfaced as an `Err` — see `error.rs`'s doc comment for why these
/// stay plain counters instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub too_short_packet: u64,
    pub unknown_payload_type: u64,
    pub incomplete_payload: u64,
    pub too_early_ack: u64,
    pub out_of_window_reset: u64,
    pub outdated_reset: u64,
    pub redundant_reset: u64,
    pub fall_off: u64,
    pub areq_received_inbound: u64,
}

#[derive(Debug)]
pub struct Engine {
    ow: OutstandingWindow,
    srs: SequenceResetState,
    timer: RetransmitTimer,
    config: EngineConfig,
    stats: Stats,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine {
            ow: OutstandingWindow::new(config.window_len),
            srs: SequenceResetState::new(config.reset_window_ns),
            timer: RetransmitTimer::new(),
            config,
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn next_seqno(&self) -> u64 {
        self.srs.next_seqno()
    }

    pub fn in_sync(&self) -> bool {
        self.srs.in_sync()
    }

    /// Evicts the descriptor that is about to fall off the window's
    /// trailing edge, if any, treating it as lost. Call this before
    /// assigning a new sequence number.
    pub fn prepare_to_send(&mut self) -> Option<EngineEvent> {
        let next_seqno = self.srs.next_seqno();
        let falling_off = next_seqno.wrapping_sub(self.config.window_len as u64);
        if next_seqno < self.config.window_len as u64 || !self.ow.is_unacked(falling_off) {
            return None;
        }
        let pd = self.ow.pop(falling_off);
        self.stats.fall_off += 1;
        log::warn!("fall-off: seqno {falling_off} evicted before window advance");
        self.timer.rearm(&self.ow, self.srs.next_seqno(), self.config.send_timeout_ns);
        Some(EngineEvent::NegAck(pd))
    }

    /// Assigns a sequence number and hands the descriptor to the window.
    /// Returns the assigned seqno — use it with [`Self::send_packet`] to
    /// get the wire bytes.
    pub fn commit_packet(&mut self, mut pd: PktDesc, now: u64) -> u64 {
        let seqno = self.srs.advance_next_seqno();
        pd.sent_timestamp = now;
        pd.send_reset = self.srs.owes_local_reset();
        pd.reset_timestamp = self.srs.last_reset_time();
        self.ow.add(seqno, pd);

        if self.ow.num_unacked() == 1 {
            self.timer.rearm(&self.ow, self.srs.next_seqno(), self.config.send_timeout_ns);
        }
        seqno
    }

    /// Encodes the committed descriptor at `seqno` for the transport.
    /// Returns `None` if `seqno` is no longer in the window (already acked,
    /// fallen off, or never committed).
    pub fn send_packet(&self, seqno: u64, src: Ipv4Addr) -> Option<Vec<u8>> {
        let pd = self.ow.peek(seqno)?;
        Some(codec::encode_packet(pd, src, self.config.peer_addr))
    }

    /// Walks the window for descriptors whose deadline has passed,
    /// negative-acking each, and re-arms at the new earliest entry. The
    /// caller owns the "must not hold the engine lock from
    /// hardware-callback context" requirement — by the time this runs, the
    /// deferred-work thread already holds the lock.
    pub fn fire_timer(&mut self, now: u64) -> Vec<EngineEvent> {
        let expired = self.timer.fire(&mut self.ow, self.srs.next_seqno(), self.config.send_timeout_ns, now);
        if !expired.is_empty() {
            log::debug!("retransmission timer fired, {} descriptor(s) expired", expired.len());
        }
        expired.into_iter().map(EngineEvent::NegAck).collect()
    }

    pub fn timer_deadline(&self) -> Option<u64> {
        self.timer.deadline()
    }

    /// Parses an inbound datagram and dispatches every payload found, in
    /// order, to the matching component.
    pub fn deliver_datagram(&mut self, buf: &[u8], now: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let mut stats = &mut self.stats;
        let frame: Option<Frame> = codec::parse_datagram(buf, |stat| match stat {
            ParseStat::TooShortHeader => stats.too_short_packet += 1,
            ParseStat::TruncatedPayload => stats.incomplete_payload += 1,
            ParseStat::UnknownPayloadType(t) => {
                stats.unknown_payload_type += 1;
                log::warn!("unknown payload type {t:#x}, dropping remainder of datagram");
            }
        });
        let Some(frame) = frame else {
            return events;
        };

        for payload in frame.payloads {
            match payload {
                Payload::Reset { partial_epoch } => self.handle_reset_payload(partial_epoch, now, &mut events),
                Payload::Ack { ack_runlen, ack_seq } => self.handle_ack_payload(ack_seq, ack_runlen, &mut events),
                Payload::Alloc { base_tslot, dsts, slot_bytes } => {
                    events.push(EngineEvent::Alloc { base_tslot, dsts, slot_bytes });
                }
                Payload::Areq(_) => {
                    self.stats.areq_received_inbound += 1;
                    log::warn!("received outbound-only A-REQ payload on the receive path, ignoring");
                }
            }
        }
        events
    }

    fn handle_reset_payload(&mut self, partial: u64, now: u64, events: &mut Vec<EngineEvent>) {
        match self.srs.handle_reset(partial, now) {
            ResetOutcome::Redundant => {
                self.stats.redundant_reset += 1;
            }
            ResetOutcome::BecameInSync => {
                log::debug!("reset became in-sync without changing epoch");
            }
            ResetOutcome::OutOfWindow => {
                self.stats.out_of_window_reset += 1;
                log::warn!("out-of-window reset ignored (partial={partial:#x})");
            }
            ResetOutcome::Outdated => {
                self.stats.outdated_reset += 1;
                log::warn!("outdated reset ignored (partial={partial:#x})");
            }
            ResetOutcome::Accepted { full, next_seqno } => {
                log::debug!("reset accepted, full epoch={full} next_seqno={next_seqno}");
                for pd in self.ow.reset(self.srs.next_seqno()) {
                    events.push(EngineEvent::NegAck(pd));
                }
                self.srs.apply_reset(full, next_seqno);
                self.timer.disarm();
                events.push(EngineEvent::Reset);
            }
        }
    }

    fn handle_ack_payload(&mut self, ack_seq: u16, ack_runlen: u32, events: &mut Vec<EngineEvent>) {
        let next_seqno = self.srs.next_seqno();
        let window_len = self.ow.window_len();
        let outcome = ack::decode(ack_seq, ack_runlen, next_seqno, window_len, &mut self.ow, |pd| {
            events.push(EngineEvent::Ack(pd));
        });
        if outcome.too_early {
            self.stats.too_early_ack += 1;
        }
        if outcome.any_acked {
            self.timer.rearm(&self.ow, self.srs.next_seqno(), self.config.send_timeout_ns);
        }
    }

    /// Builds a fresh [`PktDesc`] carrying the given A-REQ entries, ready to
    /// pass to [`Self::commit_packet`]. `commit_packet` overwrites the
    /// reliability fields (`seqno`, `sent_timestamp`, `send_reset`,
    /// `reset_timestamp`); only `areq` survives from what's passed in here.
    pub fn new_packet(areq: Vec<AreqEntry>) -> Result<PktDesc, crate::Error> {
        if areq.len() > crate::config::MAX_AREQ {
            return Err(crate::Error::TooManyAreq {
                max: crate::config::MAX_AREQ,
                actual: areq.len(),
            });
        }
        Ok(PktDesc::new(areq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EngineConfig {
        EngineConfig::new(Ipv4Addr::new(10, 0, 0, 2), 9999).with_window_len(8).unwrap()
    }

    #[test]
    fn commit_then_ack_full_round_trip() {
        let mut engine = Engine::new(cfg());
        let pd = Engine::new_packet(vec![AreqEntry { src_dst_key: 1, tslots: 2 }]).unwrap();
        let seqno = engine.commit_packet(pd, 1_000);
        assert_eq!(seqno, 0);
        assert_eq!(engine.timer_deadline(), Some(1_000 + engine.config.send_timeout_ns));

        let bytes = engine.send_packet(seqno, Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        assert!(bytes.len() >= codec::HEADER_LEN);

        // ack_seq = 0, ack_runlen = 0: acks only seqno 0, no runs.
        let mut ack_buf = vec![0u8, 0, 0, 0]; // header: seq_low16=0, checksum=0 (unverified here)
        ack_buf.push(0x30); // type nibble 0x3 (ACK) in high nibble
        ack_buf.extend_from_slice(&[0x00, 0x00, 0x00]); // rest of ack_runlen
        ack_buf.extend_from_slice(&0u16.to_be_bytes()); // ack_seq

        let events = engine.deliver_datagram(&ack_buf, 1_500);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], EngineEvent::Ack(pd) if pd.seqno == 0));
        assert!(engine.timer_deadline().is_none());
    }

    #[test]
    fn prepare_to_send_is_noop_before_window_fills() {
        let mut engine = Engine::new(cfg());
        for i in 0..7u64 {
            let pd = Engine::new_packet(Vec::new()).unwrap();
            assert_eq!(engine.commit_packet(pd, i), i);
        }
        assert!(engine.prepare_to_send().is_none());
    }

    #[test]
    fn prepare_to_send_evicts_fallen_off_descriptor() {
        let mut engine = Engine::new(cfg());
        // window_len = 8: committing seqnos 0..7 exactly fills the window,
        // so assigning seqno 8 next requires evicting seqno 0 first.
        for i in 0..8u64 {
            let pd = Engine::new_packet(Vec::new()).unwrap();
            assert_eq!(engine.commit_packet(pd, i), i);
        }

        match engine.prepare_to_send() {
            Some(EngineEvent::NegAck(pd)) => assert_eq!(pd.seqno, 0),
            other => panic!("expected a fall-off neg-ack, got {other:?}"),
        }
        assert_eq!(engine.stats().fall_off, 1);

        let pd = Engine::new_packet(Vec::new()).unwrap();
        assert_eq!(engine.commit_packet(pd, 8), 8);
    }

    #[test]
    fn new_packet_rejects_too_many_areq_entries() {
        let areq = vec![AreqEntry { src_dst_key: 0, tslots: 0 }; crate::config::MAX_AREQ + 1];
        assert!(matches!(
            Engine::new_packet(areq),
            Err(crate::Error::TooManyAreq { .. })
        ));
    }
}
