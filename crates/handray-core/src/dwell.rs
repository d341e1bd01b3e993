//! Dwell/hold selection state machine.
//!
//! Turns noisy per-frame hit/miss observations into a stable selection:
//!
//! - **Acquire**: the first hit on a target enters `Pointing` and arms a hold
//!   timer (`hold_ms`, default 3000). Further hits on the same target never
//!   restart it.
//! - **Hold**: losing the intersection (miss or no hand) while the timer is
//!   live moves to `Held`; the target keeps being reported.
//! - **Switch**: a hit on a different target replaces the active target
//!   immediately and re-arms the timer.
//! - **Expire**: when the timer fires the selection returns to `Idle`, unless
//!   the target is still under the finger, in which case it stays `Pointing`
//!   with no hold left.

use serde::{Deserialize, Serialize};

use crate::timer::{Scheduler, TimerEvent, TimerHandle};
use crate::types::{FingerTip, HitResult, SelectionPhase, SelectionState};

/// Default dwell window in milliseconds.
pub const DEFAULT_HOLD_MS: u64 = 3_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DwellPolicy {
    pub hold_ms: u64,
}

impl Default for DwellPolicy {
    fn default() -> Self {
        Self {
            hold_ms: DEFAULT_HOLD_MS,
        }
    }
}

/// Per-frame observation fed to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum DwellInput {
    /// Live intersection this frame.
    Hit(HitResult),
    /// Hand visible, nothing under the ray.
    Miss,
    /// The tracker reported no hand.
    NoHand,
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DwellOutput {
    pub state: SelectionState,
    pub previous: SelectionState,
    /// Whether phase, target or hold expiry changed.
    pub changed: bool,
}

#[derive(Debug)]
pub struct DwellMachine {
    policy: DwellPolicy,
    state: SelectionState,
    hold_timer: Option<TimerHandle>,
    last_hit: Option<HitResult>,
    last_finger: Option<FingerTip>,
    live: bool,
}

impl DwellMachine {
    pub fn new(policy: DwellPolicy) -> Self {
        Self {
            policy,
            state: SelectionState::idle(),
            hold_timer: None,
            last_hit: None,
            last_finger: None,
            live: false,
        }
    }

    pub fn policy(&self) -> &DwellPolicy {
        &self.policy
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// True only while the last observation was a live hit on the active target.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Most recent intersection with the active target.
    pub fn active_hit(&self) -> Option<&HitResult> {
        self.last_hit.as_ref()
    }

    /// Last known fingertip while a target is active.
    pub fn last_finger(&self) -> Option<FingerTip> {
        self.last_finger
    }

    pub fn hold_timer(&self) -> Option<TimerHandle> {
        self.hold_timer
    }

    pub fn hold_remaining_ms(&self, now_ms: u64) -> u64 {
        self.state
            .hold_expiry_ms
            .map_or(0, |expiry| expiry.saturating_sub(now_ms))
    }

    /// Apply one frame's observation.
    pub fn observe<S: Scheduler + ?Sized>(
        &mut self,
        input: DwellInput,
        finger: Option<FingerTip>,
        now_ms: u64,
        timers: &mut S,
    ) -> DwellOutput {
        let previous = self.state.clone();
        self.expire_lapsed(now_ms, timers);

        match input {
            DwellInput::Hit(hit) => self.acquire(hit, now_ms, timers),
            DwellInput::Miss | DwellInput::NoHand => self.lose(timers),
        }

        if !self.state.is_idle() && finger.is_some() {
            self.last_finger = finger;
        }

        self.output(previous)
    }

    /// Handle a fired hold timer. Returns `None` for stale handles.
    pub fn on_hold_expired<S: Scheduler + ?Sized>(
        &mut self,
        handle: TimerHandle,
        timers: &mut S,
    ) -> Option<DwellOutput> {
        if self.hold_timer != Some(handle) {
            return None;
        }
        let previous = self.state.clone();
        self.hold_timer = None;
        self.state.hold_expiry_ms = None;

        let still_pointing = self.live && self.state.phase == SelectionPhase::Pointing;
        if !still_pointing {
            self.clear(timers);
        }
        Some(self.output(previous))
    }

    /// Drop any selection and cancel the hold timer.
    pub fn reset<S: Scheduler + ?Sized>(&mut self, timers: &mut S) -> DwellOutput {
        let previous = self.state.clone();
        self.clear(timers);
        self.output(previous)
    }

    fn acquire<S: Scheduler + ?Sized>(&mut self, hit: HitResult, now_ms: u64, timers: &mut S) {
        let same_target = self.state.active_target.as_ref() == Some(&hit.target_id);
        if !same_target {
            self.cancel_hold(timers);
            let handle = timers.schedule(
                now_ms,
                self.policy.hold_ms,
                TimerEvent::HoldExpired {
                    target: hit.target_id.clone(),
                },
            );
            self.hold_timer = Some(handle);
            self.state.hold_expiry_ms = Some(now_ms.saturating_add(self.policy.hold_ms));
            self.state.active_target = Some(hit.target_id.clone());
        }
        self.state.phase = SelectionPhase::Pointing;
        self.last_hit = Some(hit);
        self.live = true;
    }

    /// Apply a hold deadline that passed before its timer was delivered.
    fn expire_lapsed<S: Scheduler + ?Sized>(&mut self, now_ms: u64, timers: &mut S) {
        if !self.state.hold_expiry_ms.is_some_and(|expiry| expiry <= now_ms) {
            return;
        }
        self.cancel_hold(timers);
        if !(self.live && self.state.phase == SelectionPhase::Pointing) {
            self.clear(timers);
        }
    }

    fn lose<S: Scheduler + ?Sized>(&mut self, timers: &mut S) {
        self.live = false;
        if self.hold_timer.is_some() && self.state.active_target.is_some() {
            self.state.phase = SelectionPhase::Held;
        } else {
            self.clear(timers);
        }
    }

    fn clear<S: Scheduler + ?Sized>(&mut self, timers: &mut S) {
        self.cancel_hold(timers);
        self.state = SelectionState::idle();
        self.last_hit = None;
        self.last_finger = None;
        self.live = false;
    }

    fn cancel_hold<S: Scheduler + ?Sized>(&mut self, timers: &mut S) {
        if let Some(handle) = self.hold_timer.take() {
            timers.cancel(handle);
        }
        self.state.hold_expiry_ms = None;
    }

    fn output(&self, previous: SelectionState) -> DwellOutput {
        DwellOutput {
            changed: previous != self.state,
            state: self.state.clone(),
            previous,
        }
    }
}
