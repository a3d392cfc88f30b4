//! # Connect/Disconnect Coordination
//!
//! Two small primitives guarding the recent-block window:
//!
//! - [`DisconnectGate`]: counts disconnects in flight. Connects wait for the
//!   count to reach zero before touching the window, so they never observe a
//!   half-unwound reorg.
//! - [`GapFillSlot`]: single-flight flag for gap filling, with a pending
//!   target that deferred callers hand to the running filler.
//!
//! Both release themselves on drop, so every error path unblocks waiters.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counter of in-flight disconnects with a wake-up for waiting connects.
#[derive(Debug, Default)]
pub(crate) struct DisconnectGate {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl DisconnectGate {
    /// Register a disconnect. The count drops when the guard does.
    pub(crate) fn enter(&self) -> DisconnectGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        DisconnectGuard { gate: self }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no disconnect is in flight.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a wake between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Holds one unit of the disconnect count.
pub(crate) struct DisconnectGuard<'a> {
    gate: &'a DisconnectGate,
}

impl Drop for DisconnectGuard<'_> {
    fn drop(&mut self) {
        if self.gate.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.gate.idle.notify_waiters();
        }
    }
}

#[derive(Debug, Default)]
struct GapFillState {
    active: bool,
    pending_target: Option<u64>,
}

/// Single-flight gap-fill flag.
#[derive(Debug, Default)]
pub(crate) struct GapFillSlot {
    state: Mutex<GapFillState>,
}

impl GapFillSlot {
    /// Become the filler, or record `target` for the running one.
    pub(crate) fn try_begin(&self, target: u64) -> Option<GapFillGuard<'_>> {
        let mut state = self.state.lock();
        if state.active {
            state.pending_target = Some(state.pending_target.map_or(target, |t| t.max(target)));
            return None;
        }
        state.active = true;
        Some(GapFillGuard {
            slot: self,
            armed: true,
        })
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.lock().active
    }
}

/// Ownership of the gap-fill flag.
pub(crate) struct GapFillGuard<'a> {
    slot: &'a GapFillSlot,
    armed: bool,
}

impl GapFillGuard<'_> {
    /// Take a target deferred to this filler, or release the flag.
    ///
    /// Both happen under one lock, so a caller deferring concurrently either
    /// lands in the returned target or finds the flag clear.
    pub(crate) fn next_target(&mut self) -> Option<u64> {
        let mut state = self.slot.state.lock();
        if let Some(target) = state.pending_target.take() {
            return Some(target);
        }
        state.active = false;
        self.armed = false;
        None
    }
}

impl Drop for GapFillGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.slot.state.lock();
            state.active = false;
            state.pending_target = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_idle() {
        let gate = DisconnectGate::default();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_idle())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_after_last_guard() {
        let gate = Arc::new(DisconnectGate::default());
        let first = gate.enter();
        let second = gate.enter();
        assert_eq!(gate.in_flight(), 2);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_idle().await })
        };
        tokio::task::yield_now().await;
        drop(first);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn test_gap_fill_single_flight() {
        let slot = GapFillSlot::default();
        let mut guard = slot.try_begin(15).unwrap();
        assert!(slot.is_active());

        assert!(slot.try_begin(20).is_none());
        assert!(slot.try_begin(18).is_none());
        assert_eq!(guard.next_target(), Some(20));
        assert_eq!(guard.next_target(), None);
        assert!(!slot.is_active());
        drop(guard);
        assert!(!slot.is_active());
    }

    #[test]
    fn test_gap_fill_released_on_drop() {
        let slot = GapFillSlot::default();
        {
            let _guard = slot.try_begin(5).unwrap();
            assert!(slot.try_begin(6).is_none());
        }
        assert!(!slot.is_active());
        assert!(slot.try_begin(7).is_some());
    }
}
