//! Per-frame composition of hit-testing and dwell selection.

use serde::{Deserialize, Serialize};

use crate::dwell::{DwellInput, DwellMachine, DwellOutput, DwellPolicy};
use crate::geometry::{Camera, hit_test, mirror_x, to_ndc};
use crate::timer::{Scheduler, TimerEvent, TimerHandle};
use crate::types::{FingerTip, HitResult, LandmarkFrame, SelectableTarget, SelectionState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Flip the fingertip horizontally before unprojecting. Needed when the
    /// physical camera feed is mirrored relative to the rendered scene.
    pub mirror_x: bool,
    pub dwell: DwellPolicy,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            mirror_x: true,
            dwell: DwellPolicy::default(),
        }
    }
}

/// What consumers see after every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSignal {
    pub selection: SelectionState,
    /// Corrected fingertip; the last known one while a hold outlives the hand.
    pub finger_position: Option<FingerTip>,
    /// True only while a live intersection exists, independent of hold.
    pub pointing: bool,
    /// Live or held intersection with the active target.
    pub hit: Option<HitResult>,
    pub hold_remaining_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionUpdate {
    pub signal: SelectionSignal,
    pub transition: DwellOutput,
}

#[derive(Debug)]
pub struct SelectionOrchestrator {
    config: SelectionConfig,
    dwell: DwellMachine,
}

impl SelectionOrchestrator {
    pub fn new(config: SelectionConfig) -> Self {
        let dwell = DwellMachine::new(config.dwell.clone());
        Self { config, dwell }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    pub fn selection(&self) -> &SelectionState {
        self.dwell.state()
    }

    /// Mirror-corrected fingertip for `frame`.
    pub fn fingertip(&self, frame: &LandmarkFrame) -> FingerTip {
        let tip = frame.fingertip();
        let x = if self.config.mirror_x {
            mirror_x(tip.x)
        } else {
            tip.x
        };
        FingerTip {
            x,
            y: tip.y,
            z: tip.z,
        }
    }

    /// Process one frame (or its absence) against the current target snapshot.
    pub fn process_frame<C, S>(
        &mut self,
        frame: Option<&LandmarkFrame>,
        camera: &C,
        targets: &[SelectableTarget],
        now_ms: u64,
        timers: &mut S,
    ) -> SelectionUpdate
    where
        C: Camera + ?Sized,
        S: Scheduler + ?Sized,
    {
        let Some(frame) = frame else {
            let transition = self.dwell.observe(DwellInput::NoHand, None, now_ms, timers);
            let signal = self.signal(None, now_ms);
            return SelectionUpdate { signal, transition };
        };

        let finger = self.fingertip(frame);
        let input = match hit_test(camera, to_ndc(finger.x, finger.y), targets) {
            Some(hit) => DwellInput::Hit(hit),
            None => DwellInput::Miss,
        };
        let transition = self.dwell.observe(input, Some(finger), now_ms, timers);
        let signal = self.signal(Some(finger), now_ms);
        SelectionUpdate { signal, transition }
    }

    /// Route a fired timer. Returns `None` for events that are not ours or
    /// are stale.
    pub fn on_timer<S: Scheduler + ?Sized>(
        &mut self,
        handle: TimerHandle,
        event: &TimerEvent,
        now_ms: u64,
        timers: &mut S,
    ) -> Option<SelectionUpdate> {
        if !matches!(event, TimerEvent::HoldExpired { .. }) {
            return None;
        }
        let transition = self.dwell.on_hold_expired(handle, timers)?;
        let finger = self.dwell.last_finger();
        Some(SelectionUpdate {
            signal: self.signal(finger, now_ms),
            transition,
        })
    }

    /// Clear the selection and cancel its timer (shutdown, disconnect).
    pub fn reset<S: Scheduler + ?Sized>(&mut self, now_ms: u64, timers: &mut S) -> SelectionUpdate {
        let transition = self.dwell.reset(timers);
        SelectionUpdate {
            signal: self.signal(None, now_ms),
            transition,
        }
    }

    /// Current signal without touching the dwell state.
    pub fn snapshot(&self, now_ms: u64) -> SelectionSignal {
        self.signal(self.dwell.last_finger(), now_ms)
    }

    fn signal(&self, current_finger: Option<FingerTip>, now_ms: u64) -> SelectionSignal {
        let selection = self.dwell.state().clone();
        let finger_position = if selection.is_idle() {
            current_finger
        } else {
            current_finger.or(self.dwell.last_finger())
        };
        let hit = if selection.is_idle() {
            None
        } else {
            self.dwell.active_hit().cloned()
        };
        SelectionSignal {
            selection,
            finger_position,
            pointing: self.dwell.is_live(),
            hit,
            hold_remaining_ms: self.dwell.hold_remaining_ms(now_ms),
        }
    }
}
