//! Staged modifiers for the next emitted motion.
//!
//! Offsets, timed post-move calls, and speed-register overrides do not become
//! their own program lines; they decorate the next motion that reaches the
//! sink. The buffer stages them until that motion arrives, then resets. Each
//! field is independent: setting one never touches another, and clearing a
//! field that is not set is a no-op.

use crate::ids::RegisterId;
use crate::sink::{SpeedSpec, Zone};

/// Target of a timed post-move call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CallTarget {
    /// A named controller routine.
    Routine(String),
    /// A sensor trigger addressed by register.
    Sensor(RegisterId),
}

/// A call scheduled to fire after the decorated motion completes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PostMoveCall {
    pub delay_ms: u32,
    pub target: CallTarget,
}

/// The one-shot modifiers attached to a single motion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotation {
    /// Register holding a position correction for the motion target.
    pub position_offset: Option<RegisterId>,
    /// Register holding a tool-frame correction.
    pub tool_offset: Option<RegisterId>,
    /// Timed call fired after the motion completes.
    pub post_move_call: Option<PostMoveCall>,
    /// Register that supplies the motion speed instead of the cruise value.
    pub speed_override: Option<RegisterId>,
}

impl Annotation {
    /// True when no modifier is staged.
    pub fn is_empty(&self) -> bool {
        self.position_offset.is_none()
            && self.tool_offset.is_none()
            && self.post_move_call.is_none()
            && self.speed_override.is_none()
    }
}

/// Holds the staged [`Annotation`] plus the persistent motion styling.
///
/// All four annotation fields live for exactly one motion; zone and cruise
/// speed persist until something changes them.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationBuffer {
    staged: Annotation,
    zone: Zone,
    speed: SpeedSpec,
}

impl AnnotationBuffer {
    /// New buffer with nothing staged, blending enabled, and the given
    /// initial cruise speed.
    pub fn new(cruise: SpeedSpec) -> Self {
        AnnotationBuffer {
            staged: Annotation::default(),
            zone: Zone::Blend(100),
            speed: cruise,
        }
    }

    /// The modifiers currently staged for the next motion.
    pub fn staged(&self) -> &Annotation {
        &self.staged
    }

    pub fn set_position_offset(&mut self, register: RegisterId) {
        self.staged.position_offset = Some(register);
    }

    pub fn clear_position_offset(&mut self) {
        self.staged.position_offset = None;
    }

    pub fn set_tool_offset(&mut self, register: RegisterId) {
        self.staged.tool_offset = Some(register);
    }

    pub fn clear_tool_offset(&mut self) {
        self.staged.tool_offset = None;
    }

    pub fn set_post_move_call(&mut self, call: PostMoveCall) {
        self.staged.post_move_call = Some(call);
    }

    pub fn clear_post_move_call(&mut self) {
        self.staged.post_move_call = None;
    }

    pub fn set_speed_override(&mut self, register: RegisterId) {
        self.staged.speed_override = Some(register);
    }

    pub fn clear_speed_override(&mut self) {
        self.staged.speed_override = None;
    }

    /// Path blending currently in effect.
    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn set_zone(&mut self, zone: Zone) {
        self.zone = zone;
    }

    /// Cruise speed currently in effect for linear motions.
    pub fn speed(&self) -> SpeedSpec {
        self.speed
    }

    pub fn set_speed(&mut self, speed: SpeedSpec) {
        self.speed = speed;
    }

    /// Takes the staged annotation for a motion being emitted, resetting all
    /// one-shot fields. Zone and cruise speed are unaffected.
    pub fn drain(&mut self) -> Annotation {
        std::mem::take(&mut self.staged)
    }
}
