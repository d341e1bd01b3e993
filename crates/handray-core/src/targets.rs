//! Ordered registry of selectable targets.
//!
//! Owned by the scene side; the orchestrator only reads [`TargetSet::targets`]
//! once at the start of each frame. Registration order breaks hit-test ties.

use glam::Vec3;

use crate::error::CoreError;
use crate::types::{SelectableTarget, TargetId};

#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    targets: Vec<SelectableTarget>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a target. Ids must be unique and coordinates finite.
    ///
    /// Non-positive radii are accepted; such targets are simply never hit.
    pub fn register(&mut self, target: SelectableTarget) -> Result<(), CoreError> {
        if !target.volume.center.is_finite() || target.volume.radius.is_nan() {
            return Err(CoreError::InvalidTarget {
                id: target.id,
                detail: "non-finite bounding sphere".to_string(),
            });
        }
        if self.get(&target.id).is_some() {
            return Err(CoreError::DuplicateTarget(target.id));
        }
        self.targets.push(target);
        Ok(())
    }

    pub fn unregister(&mut self, id: &TargetId) -> Option<SelectableTarget> {
        let index = self.targets.iter().position(|t| &t.id == id)?;
        Some(self.targets.remove(index))
    }

    /// Move a target's hit volume. Takes effect from the next frame.
    pub fn move_to(&mut self, id: &TargetId, center: Vec3) -> Result<(), CoreError> {
        let target = self
            .targets
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| CoreError::UnknownTarget(id.clone()))?;
        target.volume.center = center;
        Ok(())
    }

    pub fn get(&self, id: &TargetId) -> Option<&SelectableTarget> {
        self.targets.iter().find(|t| &t.id == id)
    }

    /// Snapshot for one frame of hit-testing.
    pub fn targets(&self) -> &[SelectableTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
