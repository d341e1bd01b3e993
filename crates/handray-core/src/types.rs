use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ─── Landmarks ────────────────────────────────────────────────────

/// Number of joints in one tracked hand.
pub const LANDMARK_COUNT: usize = 21;

/// Index of the index-finger tip, used as the pointing origin.
pub const FINGERTIP_INDEX: usize = 8;

/// One tracked hand joint in normalized camera coordinates.
///
/// `x` and `y` are nominally in `[0, 1]` (the tracker may report values
/// slightly outside when the hand leaves the frame); `z` is relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A complete hand observation. Superseded by the next frame, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    landmarks: [Landmark; LANDMARK_COUNT],
    frame_count: u64,
    timestamp: Option<f64>,
}

impl LandmarkFrame {
    /// Build a frame from decoded joints, rejecting wrong counts and
    /// non-finite coordinates.
    pub fn new(
        landmarks: Vec<Landmark>,
        frame_count: u64,
        timestamp: Option<f64>,
    ) -> Result<Self, ProtocolError> {
        if let Some(index) = landmarks.iter().position(|lm| !lm.is_finite()) {
            return Err(ProtocolError::NonFinite { index });
        }
        let actual = landmarks.len();
        let landmarks: [Landmark; LANDMARK_COUNT] =
            landmarks
                .try_into()
                .map_err(|_| ProtocolError::LandmarkCount {
                    expected: LANDMARK_COUNT,
                    actual,
                })?;
        Ok(Self {
            landmarks,
            frame_count,
            timestamp,
        })
    }

    pub fn landmarks(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.landmarks
    }

    pub fn fingertip(&self) -> Landmark {
        self.landmarks[FINGERTIP_INDEX]
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Producer-side timestamp in seconds, when the tracker sends one.
    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }
}

/// Fingertip after mirror correction, published for ray visualization.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FingerTip {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

// ─── Connection ───────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Targets & hits ───────────────────────────────────────────────

/// Identity of a selectable object, assigned by the scene owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// World-space hit volume. Closed: points on the surface are inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Degenerate spheres never take part in hit-testing.
    pub fn is_selectable(&self) -> bool {
        self.radius.is_finite() && self.radius > 0.0 && self.center.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectableTarget {
    pub id: TargetId,
    pub volume: BoundingSphere,
}

impl SelectableTarget {
    pub fn new(id: impl Into<TargetId>, center: Vec3, radius: f32) -> Self {
        Self {
            id: id.into(),
            volume: BoundingSphere::new(center, radius),
        }
    }
}

/// Nearest intersection found this frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitResult {
    pub target_id: TargetId,
    pub point: Vec3,
    pub distance: f32,
}

// ─── Selection ────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPhase {
    #[default]
    Idle,
    /// A live intersection with the active target exists.
    Pointing,
    /// Intersection lost, active target kept until the hold timer expires.
    Held,
}

/// Stable selection signal. `active_target` is `Some` iff the phase is
/// `Pointing` or `Held`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub phase: SelectionPhase,
    pub active_target: Option<TargetId>,
    pub hold_expiry_ms: Option<u64>,
}

impl SelectionState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == SelectionPhase::Idle
    }
}
