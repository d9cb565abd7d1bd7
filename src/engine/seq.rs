//! Sequence & Reset State: owns `next_seqno` and the shared reset epoch,
//! and runs the reset handshake that derives one from the other. Shaped
//! after `SendSpace`/`RecvSpace` (`src/tcp/mod.rs`) in spirit — a small
//! plain struct of counters mutated by one state-transition method per
//! inbound event — but the handshake itself (deriving a 64-bit seqno
//! space from a wall-clock epoch) has no TCP analogue; it is built
//! directly from the reconstruction and acceptance-window arithmetic this
//! protocol requires.

use super::hash::keyed_hash;

/// Width of the truncated wire epoch field: 56 bits.
const EPOCH_BITS: u32 = 56;
const EPOCH_MASK: u64 = (1u64 << EPOCH_BITS) - 1;
const HALF_RANGE: u64 = 1u64 << 55;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// `full` matched the agreed epoch and we were already in sync: a
    /// redundant reset, counted as a statistic only.
    Redundant,
    /// `full` matched the agreed epoch and resynchronized us.
    BecameInSync,
    /// `full` fell outside the acceptance window around `now`.
    OutOfWindow,
    /// `full` named an epoch older than one we already hold inside the
    /// window — an outdated, out-of-order RESET.
    Outdated,
    /// A new epoch was accepted; carries the reconstructed full epoch and
    /// the `next_seqno` derived from it, so the caller can apply both
    /// without recomputing `reconstruct_epoch`.
    Accepted { full: u64, next_seqno: u64 },
}

#[derive(Debug, Clone)]
pub struct SequenceResetState {
    next_seqno: u64,
    last_reset_time: u64,
    in_sync: bool,
    reset_window_ns: u64,
}

impl SequenceResetState {
    pub fn new(reset_window_ns: u64) -> Self {
        SequenceResetState {
            next_seqno: 0,
            last_reset_time: 0,
            in_sync: false,
            reset_window_ns,
        }
    }

    pub fn next_seqno(&self) -> u64 {
        self.next_seqno
    }

    pub fn last_reset_time(&self) -> u64 {
        self.last_reset_time
    }

    pub fn in_sync(&self) -> bool {
        self.in_sync
    }

    pub fn advance_next_seqno(&mut self) -> u64 {
        let assigned = self.next_seqno;
        self.next_seqno += 1;
        assigned
    }

    /// `next_seqno = epoch + H(epoch) + (H(epoch) << 32)`.
    pub fn derive_next_seqno(epoch: u64) -> u64 {
        let h = keyed_hash(epoch) as u64;
        epoch.wrapping_add(h).wrapping_add(h << 32)
    }

    /// Recovers the full 64-bit epoch from its low-56-bit wire
    /// representation: `candidate = now - 2^55; full = candidate +
    /// ((partial - candidate) mod 2^56)`. Places `full` in
    /// `[now - 2^55, now + 2^55)`, the widest unambiguous range for a
    /// 56-bit partial.
    pub fn reconstruct_epoch(partial: u64, now: u64) -> u64 {
        let candidate = now.wrapping_sub(HALF_RANGE);
        candidate.wrapping_add(partial.wrapping_sub(candidate) & EPOCH_MASK)
    }

    /// Truncates a full epoch to the 56-bit wire field.
    pub fn truncate_epoch(full: u64) -> u64 {
        full & EPOCH_MASK
    }

    fn within_window(&self, full: u64, now: u64) -> bool {
        full.abs_diff(now) < self.reset_window_ns / 2
    }

    /// Runs the reset handshake for an inbound partial epoch timestamp.
    /// Does *not* mutate `self` for the
    /// `Accepted` case — the caller applies `do_proto_reset` (clearing the
    /// outstanding window is the engine's job, not this module's) and then
    /// calls [`Self::apply_reset`].
    pub fn handle_reset(&mut self, partial: u64, now: u64) -> ResetOutcome {
        let full = Self::reconstruct_epoch(partial, now);

        if full == self.last_reset_time {
            if !self.in_sync {
                self.in_sync = true;
                return ResetOutcome::BecameInSync;
            }
            return ResetOutcome::Redundant;
        }

        if !self.within_window(full, now) {
            return ResetOutcome::OutOfWindow;
        }

        if self.within_window(self.last_reset_time, now) && full < self.last_reset_time {
            return ResetOutcome::Outdated;
        }

        ResetOutcome::Accepted {
            full,
            next_seqno: Self::derive_next_seqno(full),
        }
    }

    /// Commits an accepted reset: sets the new epoch/seqno space and marks
    /// in sync. Called by the engine after it has cleared the outstanding
    /// window for the old epoch.
    pub fn apply_reset(&mut self, full: u64, next_seqno: u64) {
        self.last_reset_time = full;
        self.next_seqno = next_seqno;
        self.in_sync = true;
    }

    /// A local reset is owed to the peer whenever we are not yet in sync
    /// with them: a locally-originated reset is sent by setting
    /// `send_reset = true` on the next outbound packet whenever `!in_sync`.
    pub fn owes_local_reset(&self) -> bool {
        !self.in_sync
    }

    #[cfg(test)]
    pub fn set_next_seqno_for_test(&mut self, v: u64) {
        self.next_seqno = v;
    }
}
