//! Scenario tests (S1-S6) driven against the public `Engine` API rather
//! than individual component internals — grounded on the pack's
//! `#[cfg(test)]`-per-module convention, generalized to a crate-level
//! `tests/` directory for end-to-end coverage instead of per-module only.

use fastpass::{Engine, EngineConfig, EngineEvent, PktDesc};
use std::net::Ipv4Addr;

fn cfg(window_len: u32) -> EngineConfig {
    EngineConfig::new(Ipv4Addr::new(192, 168, 1, 2), 9000)
        .with_window_len(window_len)
        .unwrap()
}

fn empty_packet() -> PktDesc {
    PktDesc::new(Vec::new())
}

fn acked_seqnos(events: &[EngineEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Ack(pd) => Some(pd.seqno),
            _ => None,
        })
        .collect()
}

/// S1: basic window cycle, `W=128`: filling the window exactly makes its
/// oldest entry immediately eligible for fall-off on the next send.
#[test]
fn s1_basic_window_cycle() {
    let mut engine = Engine::new(cfg(128));
    for i in 0..128u64 {
        let seqno = engine.commit_packet(empty_packet(), 1_000_000 + i);
        assert_eq!(seqno, i);
    }
    assert_eq!(engine.next_seqno(), 128);

    match engine.prepare_to_send() {
        Some(EngineEvent::NegAck(pd)) => assert_eq!(pd.seqno, 0),
        other => panic!("expected fall-off neg-ack for seqno 0, got {other:?}"),
    }
    let seqno = engine.commit_packet(empty_packet(), 1_000_128);
    assert_eq!(seqno, 128);
}

/// S2: ACK decode round-trip. Window holds unacked seqnos `[100..131]`,
/// `next_seqno = 132`; an inbound ACK naming `ack_seq = 131` with a
/// positive run acks 131, 130, 129, 128 and rearms the timer to seqno 100.
#[test]
fn s2_ack_decode_round_trip() {
    let mut engine = Engine::new(cfg(64));
    for s in 100u64..132 {
        engine.commit_packet(empty_packet(), s);
    }
    assert_eq!(engine.next_seqno(), 132);

    // Wire bytes: header (unverified checksum) + ACK payload. The top
    // nibble of ack_runlen is the FCD type tag (0x3 = ACK) and is always
    // discarded unread by the decoder; the next nibble (0x3) is the actual
    // positive-run-length control that yields the scenario's 4 acks.
    let mut datagram = vec![0u8, 0, 0, 0];
    datagram.extend_from_slice(&0x3300_0000u32.to_be_bytes());
    datagram.extend_from_slice(&131u16.to_be_bytes());

    let events = engine.deliver_datagram(&datagram, 2_000_000);
    assert_eq!(acked_seqnos(&events), vec![131, 130, 129, 128]);

    let send_timeout_ns = EngineConfig::new(Ipv4Addr::LOCALHOST, 0).send_timeout_ns;
    assert_eq!(engine.timer_deadline(), Some(100 + send_timeout_ns));
}

fn reset_datagram(partial_epoch: u64) -> Vec<u8> {
    let mut buf = vec![0u8, 0, 0, 0];
    let word1 = (partial_epoch >> 32) as u32 & 0x00FF_FFFF; // type nibble 0x0
    let word2 = (partial_epoch & 0xFFFF_FFFF) as u32;
    buf.extend_from_slice(&word1.to_be_bytes());
    buf.extend_from_slice(&word2.to_be_bytes());
    buf
}

/// S3: reset window. An accepted reset, followed by an outdated one and
/// an out-of-window one, both ignored.
#[test]
fn s3_reset_window() {
    let mut engine = Engine::new(cfg(16).with_reset_window(1_000_000_000));
    let now: u64 = 1_000_000_000_000;

    let accepted_partial = (now + 4 * 100_000_000) & ((1u64 << 56) - 1);
    let events = engine.deliver_datagram(&reset_datagram(accepted_partial), now);
    assert!(matches!(events.as_slice(), [EngineEvent::Reset]));
    assert!(engine.in_sync());
    let resynced_next_seqno = engine.next_seqno();

    let outdated_partial = (now - 4 * 100_000_000) & ((1u64 << 56) - 1);
    let events = engine.deliver_datagram(&reset_datagram(outdated_partial), now);
    assert!(events.is_empty());
    assert_eq!(engine.next_seqno(), resynced_next_seqno);
    assert_eq!(engine.stats().outdated_reset, 1);

    let oow_partial = (now + 10 * 1_000_000_000) & ((1u64 << 56) - 1);
    let events = engine.deliver_datagram(&reset_datagram(oow_partial), now);
    assert!(events.is_empty());
    assert_eq!(engine.next_seqno(), resynced_next_seqno);
    assert_eq!(engine.stats().out_of_window_reset, 1);
}

/// S4: retransmission timeout with a single committed packet and an empty
/// window; the timer fires exactly once and disarms.
#[test]
fn s4_retransmission_timeout() {
    let mut engine = Engine::new(cfg(4).with_send_timeout(1_000_000));
    let seqno = engine.commit_packet(empty_packet(), 0);
    assert_eq!(seqno, 0);
    assert_eq!(engine.timer_deadline(), Some(1_000_000));

    let events = engine.fire_timer(1_000_001);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], EngineEvent::NegAck(pd) if pd.seqno == 0));
    assert_eq!(engine.timer_deadline(), None);
}

/// S5: window fall-off. `W=4`, four descriptors committed, none acked;
/// `prepare_to_send` evicts seqno 0 before the fifth commit.
#[test]
fn s5_window_fall_off() {
    let mut engine = Engine::new(cfg(4));
    for s in 0u64..4 {
        assert_eq!(engine.commit_packet(empty_packet(), s), s);
    }

    match engine.prepare_to_send() {
        Some(EngineEvent::NegAck(pd)) => assert_eq!(pd.seqno, 0),
        other => panic!("expected fall-off neg-ack, got {other:?}"),
    }
    assert_eq!(engine.stats().fall_off, 1);

    assert_eq!(engine.commit_packet(empty_packet(), 4), 4);
}

/// S6: cross-epoch sequence recovery. `next_seqno = 0x0001_0005`; an ACK
/// naming the low 16 bits of a still-in-window seqno reconstructs the full
/// value and acks it, while one naming a seqno from the previous 16-bit
/// cycle is rejected as too-early.
#[test]
fn s6_cross_epoch_sequence_recovery() {
    let mut engine = Engine::new(cfg(4));
    let target = 0x0001_0005u64;
    while engine.next_seqno() < target {
        engine.prepare_to_send();
        let next = engine.next_seqno();
        assert_eq!(engine.commit_packet(empty_packet(), next), next);
    }
    assert_eq!(engine.next_seqno(), target);

    // ack_seq = 0x0001 names seqno 0x0001_0001, the oldest entry still in
    // the 4-wide window ([0x1_0001..0x1_0005)).
    let mut datagram = vec![0u8, 0, 0, 0];
    datagram.extend_from_slice(&0x3000_0000u32.to_be_bytes());
    datagram.extend_from_slice(&0x0001u16.to_be_bytes());
    let events = engine.deliver_datagram(&datagram, target);
    assert_eq!(acked_seqnos(&events), vec![0x0001_0001]);

    // ack_seq = 0xFFFF names seqno 0x0000_FFFF, the previous 16-bit cycle
    // and well below the window — rejected as too-early.
    let mut datagram = vec![0u8, 0, 0, 0];
    datagram.extend_from_slice(&0x3000_0000u32.to_be_bytes());
    datagram.extend_from_slice(&0xFFFFu16.to_be_bytes());
    let events = engine.deliver_datagram(&datagram, target);
    assert!(acked_seqnos(&events).is_empty());
    assert_eq!(engine.stats().too_early_ack, 1);
}
