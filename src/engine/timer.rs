//! Retransmission Timer: exactly one scheduled deadline at any moment,
//! computed from the outstanding window's earliest unacked entry. This
//! module holds the deterministic arm/fire bookkeeping only; the thread
//! that actually sleeps until the deadline and the in-flight guard that
//! makes `rearm` safe against a concurrently-running fire are the
//! engine's job, shaped after the single `timeout: Option<Instant>` field
//! and re-arm-on-exit pattern in `TCB::on_tick` (`src/tcp/tcb.rs`).

use super::window::{OutstandingWindow, PktDesc};

#[derive(Debug, Default)]
pub struct RetransmitTimer {
    deadline: Option<u64>,
    earliest_unacked: Option<u64>,
}

impl RetransmitTimer {
    pub fn new() -> Self {
        RetransmitTimer::default()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn earliest_unacked(&self) -> Option<u64> {
        self.earliest_unacked
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
        self.earliest_unacked = None;
    }

    /// Arming rule. The "cancel; if already-running, do
    /// nothing" half of the rule is the caller's responsibility (it needs
    /// the in-flight flag, which lives with the background thread, not
    /// here) — this computes what the new deadline *would* be.
    pub fn rearm(&mut self, ow: &OutstandingWindow, next_seqno: u64, send_timeout_ns: u64) {
        if ow.is_empty() {
            self.disarm();
            return;
        }
        let earliest = ow.earliest_unacked(next_seqno);
        let sent_ts = ow
            .peek(earliest)
            .expect("earliest_unacked names an occupied slot")
            .sent_timestamp;
        self.earliest_unacked = Some(earliest);
        self.deadline = Some(sent_ts + send_timeout_ns);
    }

    /// Fire walk: starting from the recorded hint, pop every
    /// descriptor whose deadline has already passed (ascending sequence
    /// order), then re-arm at the new
    /// earliest entry. Returns the popped descriptors for `handle_neg_ack`.
    pub fn fire(
        &mut self,
        ow: &mut OutstandingWindow,
        next_seqno: u64,
        send_timeout_ns: u64,
        now: u64,
    ) -> Vec<PktDesc> {
        let mut expired = Vec::new();
        let Some(mut s) = self.earliest_unacked else {
            return expired;
        };

        loop {
            if ow.is_empty() {
                break;
            }
            s = ow.earliest_unacked_hint(s);
            let sent_ts = ow.peek(s).expect("hint names an occupied slot").sent_timestamp;
            if sent_ts + send_timeout_ns <= now {
                expired.push(ow.pop(s));
            } else {
                break;
            }
        }

        if ow.is_empty() {
            self.disarm();
        } else {
            self.earliest_unacked = Some(s);
            let sent_ts = ow.peek(s).expect("hint names an occupied slot").sent_timestamp;
            self.deadline = Some(sent_ts + send_timeout_ns);
        }

        expired
    }
}
