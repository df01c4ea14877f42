//! Optional diagnostics for individual joints during import and retargeting.
//!
//! Functions that support tracing take a `&dyn Trace` argument.
//! Pass [NoTrace] to disable tracing or a [JointTrace] to log selected joints with [tracing::debug].
use ahash::AHashSet;
use glam::Quat;

use gla_lib::Transform;

/// Callbacks for inspecting intermediate values.
/// All methods do nothing by default.
pub trait Trace: Sync {
    /// The rest pose computed for a skeleton joint.
    fn bind_pose(&self, _joint: &str, _index: usize, _rest: &Transform) {}

    /// The converted root relative world transform and final local transform of an imported joint.
    fn import_joint(
        &self,
        _clip: &str,
        _frame: usize,
        _joint: &str,
        _world: &Transform,
        _local: &Transform,
    ) {
    }

    /// The rotations used to compute a retargeted joint's local rotation.
    fn retarget_joint(&self, _frame: usize, _joint: &str, _values: &RetargetTrace<'_>) {}
}

/// Intermediate rotations for one retargeted joint.
#[derive(Debug, Clone, PartialEq)]
pub struct RetargetTrace<'a> {
    pub sources: &'a [String],
    pub source_world: Quat,
    pub target_parent_world: Quat,
    pub local: Quat,
}

/// A [Trace] that ignores all callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrace;

impl Trace for NoTrace {}

/// A [Trace] that logs values for selected joints.
#[derive(Debug, Default, Clone)]
pub struct JointTrace {
    joints: AHashSet<String>,
    frame: Option<usize>,
}

impl JointTrace {
    /// Logs the joints in `joints` for every frame.
    pub fn new<I, S>(joints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            joints: joints.into_iter().map(Into::into).collect(),
            frame: None,
        }
    }

    /// Only log values for `frame`.
    pub fn with_frame(mut self, frame: usize) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Returns `true` if values for `joint` at `frame` should be logged.
    pub fn is_traced(&self, joint: &str, frame: Option<usize>) -> bool {
        let frame_matches = match (self.frame, frame) {
            (Some(expected), Some(frame)) => expected == frame,
            _ => true,
        };
        frame_matches && self.joints.contains(joint)
    }
}

impl Trace for JointTrace {
    fn bind_pose(&self, joint: &str, index: usize, rest: &Transform) {
        if self.is_traced(joint, None) {
            tracing::debug!(
                joint,
                index,
                translation = ?rest.translation,
                rotation = ?rest.rotation,
                "rest pose"
            );
        }
    }

    fn import_joint(
        &self,
        clip: &str,
        frame: usize,
        joint: &str,
        world: &Transform,
        local: &Transform,
    ) {
        if self.is_traced(joint, Some(frame)) {
            tracing::debug!(
                clip,
                frame,
                joint,
                world_translation = ?world.translation,
                world_rotation = ?world.rotation,
                local_translation = ?local.translation,
                local_rotation = ?local.rotation,
                "imported joint"
            );
        }
    }

    fn retarget_joint(&self, frame: usize, joint: &str, values: &RetargetTrace<'_>) {
        if self.is_traced(joint, Some(frame)) {
            tracing::debug!(
                frame,
                joint,
                sources = ?values.sources,
                source_world = ?values.source_world,
                target_parent_world = ?values.target_parent_world,
                local = ?values.local,
                "retargeted joint"
            );
        }
    }
}
