//! ACK Decoder: turns a (short sequence, run-length bitmap) pair into a set
//! of positive acknowledgments applied against the outstanding window.
//! The cumulative-ack half is shaped after `TCB::on_segment`'s ack walk
//! (`src/tcp/mod.rs`, comparing an incoming `ackno` against each
//! outstanding segment's `segno`/`end()`), generalized from a single
//! cumulative ack number to a compressed run-length encoding — the closest
//! analogue for the *bitmap* half is `aeronet_transport`'s
//! `Acknowledge::ack`/`is_acked`
//! (`examples/other_examples/..._aeronet_transport-src-packet-ack.rs.rs`),
//! which informed the "walk down from the high end, stop once no more bits
//! are set" decoding shape used in [`decode`]'s inner loop.

use super::window::{OutstandingWindow, PktDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckOutcome {
    /// Whether at least one positive ack was applied — tells the caller
    /// whether to rearm the retransmission timer.
    pub any_acked: bool,
    /// The named seqno fell below `next_seqno - window_len` and was
    /// rejected outright.
    pub too_early: bool,
}

/// Recovers the full sequence number named by a 16-bit short sequence,
/// given that it names something `< next_seqno`: `cur = (next_seqno -
/// 2^16) + ((ack_seq - (next_seqno - 2^16)) mod 2^16)`.
pub fn reconstruct_seqno(ack_seq: u16, next_seqno: u64) -> u64 {
    let base = next_seqno.wrapping_sub(1u64 << 16);
    base.wrapping_add((ack_seq as u64).wrapping_sub(base) & 0xFFFF)
}

/// Decodes one inbound ACK payload against the outstanding window,
/// invoking `on_ack` with the descriptor of every sequence number popped as
/// positively acknowledged (highest to lowest) — the descriptor is handed
/// over so the caller can forward it to `handle_ack(pd)` without a second
/// lookup. Returns whether any ack was applied, which tells the caller
/// whether to rearm the retransmission timer.
pub fn decode(
    ack_seq: u16,
    mut ack_runlen: u32,
    next_seqno: u64,
    window_len: u32,
    ow: &mut OutstandingWindow,
    mut on_ack: impl FnMut(PktDesc),
) -> AckOutcome {
    let mut any_acked = false;
    let cur0 = reconstruct_seqno(ack_seq, next_seqno);

    if cur0 < next_seqno.saturating_sub(window_len as u64) {
        log::warn!("too-early ack: cur={cur0} next_seqno={next_seqno} window_len={window_len}");
        return AckOutcome { any_acked, too_early: true };
    }

    if ow.is_unacked(cur0) {
        on_ack(ow.pop(cur0));
        any_acked = true;
    }

    let mut end = cur0.wrapping_sub(1);
    // Discard the positive-run nibble already accounted for by the explicit
    // check on `cur0` above.
    ack_runlen <<= 4;

    while ack_runlen != 0 {
        let mut cur = end;
        end = end.wrapping_sub((ack_runlen >> 28) as u64);
        ack_runlen <<= 4;

        // Positive run (end, cur]: hop to successive unacked seqnos at or
        // below `cur` using the same query repeatedly — each pop makes the
        // next `at_or_before` call land on the next lower candidate.
        loop {
            if cur >= next_seqno {
                break;
            }
            let dist = ow.at_or_before(cur, next_seqno);
            if dist < 0 {
                break;
            }
            let found = cur - dist as u64;
            if found <= end {
                break;
            }
            on_ack(ow.pop(found));
            any_acked = true;
            cur = found;
        }

        // Negative run: pure skip, no window interaction.
        end = end.wrapping_sub((ack_runlen >> 28) as u64);
        ack_runlen <<= 4;
    }

    AckOutcome { any_acked, too_early: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::window::PktDesc;

    fn fill_window(ow: &mut OutstandingWindow, seqnos: std::ops::Range<u64>) {
        for s in seqnos {
            let mut pd = PktDesc::new(Vec::new());
            pd.sent_timestamp = s;
            ow.add(s, pd);
        }
    }

    #[test]
    fn s2_ack_decode_round_trip() {
        let mut ow = OutstandingWindow::new(64);
        fill_window(&mut ow, 100..132);
        let next_seqno = 132u64;

        // The expected result here is 131,130,129,128 acked, 126 and below
        // untouched (see DESIGN.md's Open Questions for how this value was
        // derived). nibble 0 is always discarded unread by the decode loop
        // (it doubles as the FCD type tag on the wire), so one positive run
        // of length 4 is nibble1 = 3 (three more acks after the explicit
        // check on `cur`), the rest zero.
        let ack_runlen = 0x0300_0000u32;
        let mut acked = Vec::new();
        let outcome = decode(131, ack_runlen, next_seqno, 64, &mut ow, |pd| acked.push(pd.seqno));

        assert!(outcome.any_acked);
        assert_eq!(acked, vec![131, 130, 129, 128]);
        assert!(ow.is_unacked(127));
        assert!(ow.is_unacked(100));
    }

    #[test]
    fn negative_run_skips_without_acking() {
        let mut ow = OutstandingWindow::new(64);
        fill_window(&mut ow, 100..132);
        let next_seqno = 132u64;

        // positive run of 1 (just cur=131), negative run of 2 (skip 130,
        // 129), positive run of 1 (128). nibble1=0 (no extra positive
        // beyond cur), nibble2=2 (skip 2), nibble3=1 (one more positive).
        let ack_runlen: u32 = (0x2 << 20) | (0x1 << 16);
        let mut acked = Vec::new();
        decode(131, ack_runlen, next_seqno, 64, &mut ow, |pd| acked.push(pd.seqno));

        assert_eq!(acked, vec![131, 128]);
        assert!(ow.is_unacked(130));
        assert!(ow.is_unacked(129));
        assert!(!ow.is_unacked(128));
    }

    #[test]
    fn too_early_ack_is_ignored() {
        let mut ow = OutstandingWindow::new(4);
        fill_window(&mut ow, 10..14);
        let next_seqno = 14u64;

        let outcome = decode(0, 0, next_seqno, 4, &mut ow, |_: PktDesc| panic!("should not ack"));
        assert!(!outcome.any_acked);
        assert!(outcome.too_early);
        assert_eq!(ow.num_unacked(), 4);
    }

    #[test]
    fn s6_cross_epoch_sequence_recovery() {
        let next_seqno = 0x0001_0005u64;
        assert_eq!(reconstruct_seqno(0x0001, next_seqno), 0x0001_0001);
        assert_eq!(reconstruct_seqno(0xFFFF, next_seqno), 0x0000_FFFF);
    }
}
