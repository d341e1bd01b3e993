//! Cancellable timers and injectable clocks.
//!
//! Scheduled work is data: a [`TimerQueue`] holds `(deadline, event)` pairs
//! and the event loop pops whatever is due. Nothing here sleeps or reads the
//! wall clock, so dwell and backoff logic can be tested step by step with a
//! [`ManualClock`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::types::TargetId;

// ─── Clocks ───────────────────────────────────────────────────────

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Milliseconds elapsed since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ─── Timers ───────────────────────────────────────────────────────

/// Opaque handle returned by [`Scheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Delayed work known to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// The dwell window for `target` has elapsed.
    HoldExpired { target: TargetId },
    /// Reconnect attempt `attempt` (1-based) is due.
    Reconnect { attempt: u32 },
}

pub trait Scheduler {
    /// Schedule `event` to fire `delay_ms` after `now_ms`.
    fn schedule(&mut self, now_ms: u64, delay_ms: u64, event: TimerEvent) -> TimerHandle;

    /// Cancel a pending timer. Returns `false` if it already fired or was
    /// cancelled.
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

/// Deadline-ordered timer set. Equal deadlines fire in scheduling order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    entries: BTreeMap<(u64, TimerHandle), TimerEvent>,
    deadlines: HashMap<TimerHandle, u64>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest pending deadline.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.entries.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Remove and return the earliest timer whose deadline is `<= now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerHandle, TimerEvent)> {
        let &(deadline, handle) = self.entries.keys().next()?;
        if deadline > now_ms {
            return None;
        }
        let event = self.entries.remove(&(deadline, handle))?;
        self.deadlines.remove(&handle);
        Some((handle, event))
    }

    pub fn deadline_of(&self, handle: TimerHandle) -> Option<u64> {
        self.deadlines.get(&handle).copied()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle)
    }

    /// Number of timers not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Iterate pending events in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &TimerEvent)> {
        self.entries.iter().map(|(&(deadline, _), ev)| (deadline, ev))
    }
}

impl Scheduler for TimerQueue {
    fn schedule(&mut self, now_ms: u64, delay_ms: u64, event: TimerEvent) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        let deadline = now_ms.saturating_add(delay_ms);
        self.entries.insert((deadline, handle), event);
        self.deadlines.insert(handle, deadline);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle) {
            Some(deadline) => self.entries.remove(&(deadline, handle)).is_some(),
            None => false,
        }
    }
}
