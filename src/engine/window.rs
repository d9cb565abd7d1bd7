//! Outstanding Window: the fixed-capacity ring of
//! in-flight packet descriptors, indexed by a sign-reversed modulo mapping
//! so that slots fill back-to-front as sequence numbers increase, and a
//! "double bitmap" (`bin_mask`, two mirrored copies of the occupancy bits)
//! that lets `find_next_bit`/`find_last_bit` scan a contiguous range without
//! special-casing wraparound.
//!
//! Shaped after the plain-struct-plus-wrapping-arithmetic style for
//! sequence spaces in `src/tcp/mod.rs::SendSpace`/`RecvSpace` (`wrapping_lt`),
//! generalized from a 32-bit TCP sequence space to a 64-bit one.

/// One transmitted datagram, owned by the window until popped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PktDesc {
    pub seqno: u64,
    pub sent_timestamp: u64,
    pub send_reset: bool,
    pub reset_timestamp: u64,
    pub areq: Vec<AreqEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreqEntry {
    pub src_dst_key: u16,
    pub tslots: u16,
}

impl PktDesc {
    pub fn new(areq: Vec<AreqEntry>) -> Self {
        PktDesc {
            seqno: 0,
            sent_timestamp: 0,
            send_reset: false,
            reset_timestamp: 0,
            areq,
        }
    }
}

#[derive(Debug)]
pub struct OutstandingWindow {
    w: u32,
    bins: Vec<Option<PktDesc>>,
    // Mirrored occupancy bits: mask[i] == mask[i + w] for i in [0, w).
    mask: Vec<bool>,
    num_unacked: u32,
}

/// `pos(s) = ((-s) as u32) & (w - 1)`. Valid only for `w` a
/// power of two; relies on wrapping subtraction to make the formula work
/// for differences computed "before" the window's left edge too, since
/// congruence mod a power of two survives the cast to u32.
fn pos(s: u64, w: u32) -> u32 {
    let w_mask = w - 1;
    let s_mod = (s as u32) & w_mask;
    w.wrapping_sub(s_mod) & w_mask
}

impl OutstandingWindow {
    pub fn new(window_len: u32) -> Self {
        assert!(window_len.is_power_of_two(), "window_len must be power of two");
        OutstandingWindow {
            w: window_len,
            bins: (0..window_len).map(|_| None).collect(),
            mask: vec![false; (window_len * 2) as usize],
            num_unacked: 0,
        }
    }

    pub fn window_len(&self) -> u32 {
        self.w
    }

    pub fn num_unacked(&self) -> u32 {
        self.num_unacked
    }

    fn set_bit(&mut self, i: u32, v: bool) {
        self.mask[i as usize] = v;
        self.mask[(i + self.w) as usize] = v;
    }

    /// `is_unacked(s)`. Caller must ensure `s` is within the
    /// current window; out-of-range lookups are a programming error.
    pub fn is_unacked(&self, s: u64) -> bool {
        self.mask[pos(s, self.w) as usize]
    }

    /// `add(pd)`. `seqno` is the sequence number this
    /// descriptor is being assigned — the caller (the engine, coordinating
    /// with sequence state) is responsible for bumping `next_seqno`
    /// afterwards; the window itself does not own that counter.
    pub fn add(&mut self, seqno: u64, mut pd: PktDesc) {
        let i = pos(seqno, self.w);
        debug_assert!(
            self.bins[i as usize].is_none(),
            "add() precondition violated: slot for seqno {seqno} still occupied"
        );
        pd.seqno = seqno;
        self.set_bit(i, true);
        self.bins[i as usize] = Some(pd);
        self.num_unacked += 1;
    }

    /// `pop(s)`. Precondition: `is_unacked(s)`.
    pub fn pop(&mut self, s: u64) -> PktDesc {
        let i = pos(s, self.w);
        debug_assert!(self.mask[i as usize], "pop() precondition violated: seqno {s} not unacked");
        self.set_bit(i, false);
        self.num_unacked -= 1;
        self.bins[i as usize]
            .take()
            .expect("bin_mask and bins disagree on occupancy")
    }

    pub fn peek(&self, s: u64) -> Option<&PktDesc> {
        self.bins[pos(s, self.w) as usize].as_ref()
    }

    /// Smallest set bit index in `[start, limit)`, or `None`.
    fn find_next_bit(&self, start: u32, limit: u32) -> Option<u32> {
        (start..limit).find(|&i| self.mask[i as usize])
    }

    /// Greatest set bit index in `[0, limit)`, or `None`.
    fn find_last_bit(&self, limit: u32) -> Option<u32> {
        (0..limit).rev().find(|&i| self.mask[i as usize])
    }

    /// `at_or_before(s)`: returns `s - t` where `t` is the
    /// greatest unacked sequence `<= s`, or `-1` if none exists in-window.
    /// `s` must be `< next_seqno` (a precondition violation is a
    /// programming error, asserted in debug builds).
    pub fn at_or_before(&self, s: u64, next_seqno: u64) -> i64 {
        debug_assert!(s < next_seqno, "at_or_before called with s >= next_seqno");
        let h = pos(next_seqno.wrapping_sub(1), self.w);
        let seqno_index = h + pos(s.wrapping_sub(next_seqno.wrapping_sub(1)), self.w);
        match self.find_next_bit(seqno_index, h + self.w) {
            Some(found) => (found - seqno_index) as i64,
            None => -1,
        }
    }

    /// `earliest_unacked_hint(hint)`. `hint` must lie in
    /// `[next_seqno - W, next_seqno)` and there must be at least one
    /// unacked entry at or after it.
    pub fn earliest_unacked_hint(&self, hint: u64) -> u64 {
        let limit = pos(hint, self.w) + self.w + 1;
        let found = self
            .find_last_bit(limit)
            .expect("earliest_unacked_hint called with no unacked entry at or after hint");
        hint.wrapping_add((limit - 1 - found) as u64)
    }

    pub fn earliest_unacked(&self, next_seqno: u64) -> u64 {
        self.earliest_unacked_hint(next_seqno.wrapping_sub(self.w as u64))
    }

    pub fn is_empty(&self) -> bool {
        self.num_unacked == 0
    }

    /// `reset()`: pops every unacked descriptor, returning
    /// them from most-recent to least-recent (the order `at_or_before`
    /// walks in).
    pub fn reset(&mut self, next_seqno: u64) -> Vec<PktDesc> {
        let mut out = Vec::with_capacity(self.num_unacked as usize);
        if next_seqno == 0 {
            return out;
        }
        let mut cur = next_seqno - 1;
        loop {
            let dist = self.at_or_before(cur, next_seqno);
            if dist < 0 {
                break;
            }
            let found = cur - dist as u64;
            out.push(self.pop(found));
            if found == 0 {
                break;
            }
            cur = found - 1;
        }
        out
    }
}
