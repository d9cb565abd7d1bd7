//! Upper-layer callback contract: the engine's one dependency on the code
//! around it. Shaped after `src/tcp/mod.rs`'s `Action` enum in spirit — a
//! small, explicit vocabulary of things the engine asks its owner to do —
//! but expressed as a trait with named methods rather than a returned enum
//! for a dispatch loop to match on.

use crate::engine::window::PktDesc;

/// Implemented by the queueing discipline / scheduler that owns this
/// engine. Every method takes `&mut self` rather than `&self` since all
/// four represent state transitions in the caller, not read-only queries.
pub trait EngineCallbacks {
    /// `pd` was positively acknowledged; the implementation takes
    /// ownership and may reclaim its resources.
    fn handle_ack(&mut self, pd: PktDesc);

    /// `pd` is presumed lost (timer expiry or window fall-off); ownership
    /// transfers to the implementation, which typically resubmits the
    /// request it represents.
    fn handle_neg_ack(&mut self, pd: PktDesc);

    /// The reset epoch changed; any scheduler state staked on the previous
    /// epoch (in-flight allocation assumptions, etc.) must be cleared.
    fn handle_reset(&mut self);

    /// An ALLOC payload arrived: `dsts[i]` received allocations starting
    /// at `base_tslot`, and `slot_bytes` is the per-slot allocation code
    /// array, opaque to the engine.
    fn handle_alloc(&mut self, base_tslot: u16, dsts: &[u16], slot_bytes: &[u8]);
}
