//! handray-core: pure gesture-selection logic.
//! Hit-testing, dwell/hold selection, timers, reconnect policy and the
//! per-frame orchestrator. No IO, no async, no wall clock.

pub mod dwell;
pub mod error;
pub mod geometry;
pub mod orchestrator;
pub mod protocol;
pub mod reconnect;
pub mod targets;
pub mod timer;
pub mod types;

pub use dwell::{DEFAULT_HOLD_MS, DwellInput, DwellMachine, DwellOutput, DwellPolicy};
pub use error::{CoreError, ProtocolError};
pub use geometry::{
    Camera, PerspectiveCamera, Ray, hit_test, hit_test_ray, mirror_x, ray_sphere, to_ndc,
};
pub use orchestrator::{SelectionConfig, SelectionOrchestrator, SelectionSignal, SelectionUpdate};
pub use protocol::{Inbound, decode_message};
pub use reconnect::{
    CloseDecision, CloseKind, NORMAL_CLOSE_CODE, RETRIES_EXHAUSTED, ReconnectPolicy,
    ReconnectTracker,
};
pub use targets::TargetSet;
pub use timer::{Clock, ManualClock, MonotonicClock, Scheduler, TimerEvent, TimerHandle, TimerQueue};
pub use types::{
    BoundingSphere, ConnectionState, FINGERTIP_INDEX, LANDMARK_COUNT, FingerTip, HitResult, Landmark, LandmarkFrame,
    SelectableTarget, SelectionPhase, SelectionState, TargetId,
};
