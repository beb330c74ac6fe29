//! The deposition-pass state machine.
//!
//! One pass runs Travel → Approach → Deposit → Depart → Travel. Transitions
//! are free functions over a [`ProcessContext`], each a deterministic
//! sequence of annotation-buffer mutations plus zero or more sink emissions.
//! The composite start/stop sequences additionally replay the previous
//! motion so that each staged offset activation is visible to the controller
//! as its own discrete position: a single motion cannot carry both the
//! ignition offset and the path offset.

use bitflags::bitflags;
use log::debug;
use thiserror::Error;

use crate::annotation::{AnnotationBuffer, CallTarget, PostMoveCall};
use crate::classify::SpeedEvent;
use crate::config::{DepositStartStyle, WorkcellConfig};
use crate::passloop::PassLoopContext;
use crate::sink::{InstructionSink, Motion, SpeedSpec, TimerAction, Zone};

/// Where in the pass lifecycle the process currently is.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Phase {
    /// Linking between passes.
    #[default]
    Travel,
    /// Creeping toward the deposit start point.
    Approach,
    /// On the deposit path.
    Deposit,
    /// Pulling away from the deposit end point.
    Depart,
}

bitflags! {
    /// Process condition flags.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct ProcessFlags: u8 {
        /// The tool is actively depositing. Set only while the phase is
        /// `Deposit`.
        const TOOL_ON = 0b001;

        /// Set strictly between a deposit-start sequence and its matching
        /// stop sequence; gates re-entrant classifier events.
        const RETRACT = 0b010;

        /// Deposit motions run in coordinated-motion mode.
        const COORD = 0b100;
    }
}

/// Mutable process state owned by one generation session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessState {
    pub phase: Phase,
    pub flags: ProcessFlags,
    /// Number of approach entries so far; mirrors the pass-label counter.
    pub passes_started: u32,
}

impl ProcessState {
    pub fn tool_on(&self) -> bool {
        self.flags.contains(ProcessFlags::TOOL_ON)
    }

    pub fn retracted(&self) -> bool {
        self.flags.contains(ProcessFlags::RETRACT)
    }
}

/// Errors raised by state-machine transitions.
///
/// A precondition violation is fatal to the session: continuing would emit a
/// program that drives the controller into an unreachable or unsafe state.
/// The failed transition mutates nothing.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProcessError {
    #[error("`{transition}` requires {required}")]
    PreconditionViolation {
        transition: &'static str,
        required: &'static str,
    },

    #[error("`{transition}` must replay the previous motion, but none was emitted yet")]
    NoMotionToReplay { transition: &'static str },
}

/// Access to the session pieces the transition functions operate on.
pub trait ProcessContext {
    type Sink: InstructionSink;

    fn config(&self) -> &WorkcellConfig;
    fn state(&self) -> &ProcessState;
    fn state_mut(&mut self) -> &mut ProcessState;
    fn buffer(&self) -> &AnnotationBuffer;
    fn buffer_mut(&mut self) -> &mut AnnotationBuffer;
    fn pass_loop(&self) -> &PassLoopContext;
    fn pass_loop_mut(&mut self) -> &mut PassLoopContext;
    fn sink(&mut self) -> &mut Self::Sink;

    /// The most recent motion, available for sequence replay.
    fn last_motion(&self) -> Option<&Motion>;

    /// Re-emits the last motion as a linear move, draining whatever is
    /// staged in the buffer onto it.
    fn replay_last_motion(&mut self, transition: &'static str) -> Result<(), ProcessError>;
}

/// Begin the approach move of the next pass.
///
/// Allocates and emits the pass label, switches to exact-stop positioning,
/// and drops any stale speed override or post-move call from the previous
/// pass.
pub fn enter_approach(ctx: &mut impl ProcessContext) -> Result<(), ProcessError> {
    let approach_speed = ctx.config().speeds.approach_mm_s;
    let approach_offset = ctx.config().offsets.approach;

    let label = ctx.pass_loop_mut().next_pass_label();
    debug!("approach: pass label {}", label.id);
    ctx.sink().emit_label(&label);

    let state = ctx.state_mut();
    state.phase = Phase::Approach;
    state.passes_started += 1;

    let buffer = ctx.buffer_mut();
    buffer.set_zone(Zone::ExactStop);
    buffer.set_position_offset(approach_offset);
    buffer.clear_speed_override();
    buffer.clear_post_move_call();
    buffer.set_speed(SpeedSpec::MmPerSec(approach_speed));
    Ok(())
}

/// Ignite the tool. The ignition offset and the timed start-tool call ride
/// on the next motion.
pub fn tool_on(ctx: &mut impl ProcessContext) -> Result<(), ProcessError> {
    let phase = ctx.state().phase;
    if phase != Phase::Approach && phase != Phase::Deposit {
        return Err(ProcessError::PreconditionViolation {
            transition: "toolOn",
            required: "phase Approach or Deposit",
        });
    }

    let settle = ctx.config().tool_settle_ms;
    let timer = ctx.config().process_timer;
    let start_offset = ctx.config().offsets.start;
    let speed_register = ctx.config().speed_register;
    let coordinated = ctx.config().coordinated_motion;
    let start_tool = ctx.config().routines.start_tool.clone();

    let sink = ctx.sink();
    sink.emit_wait(settle);
    sink.emit_timer(timer, TimerAction::Start);

    let state = ctx.state_mut();
    state.phase = Phase::Deposit;
    state.flags.insert(ProcessFlags::TOOL_ON);
    state.flags.set(ProcessFlags::COORD, coordinated);

    let buffer = ctx.buffer_mut();
    buffer.set_zone(Zone::Blend(100));
    buffer.set_position_offset(start_offset);
    buffer.set_post_move_call(PostMoveCall {
        delay_ms: 0,
        target: CallTarget::Routine(start_tool),
    });
    if let Some(register) = speed_register {
        buffer.set_speed_override(register);
    }
    debug!("tool on");
    Ok(())
}

/// Switch the staged offset from the ignition correction to the path
/// correction, arming the height sensor where the cell has one.
pub fn enter_deposit_path(ctx: &mut impl ProcessContext) -> Result<(), ProcessError> {
    if !ctx.state().tool_on() {
        return Err(ProcessError::PreconditionViolation {
            transition: "moveLaserOn",
            required: "tool on",
        });
    }

    let path_offset = ctx.config().offsets.path;
    let sensor = ctx.config().height_sensor;

    let buffer = ctx.buffer_mut();
    buffer.set_position_offset(path_offset);
    match sensor {
        Some(register) => buffer.set_post_move_call(PostMoveCall {
            delay_ms: 0,
            target: CallTarget::Sensor(register),
        }),
        None => buffer.clear_post_move_call(),
    }
    Ok(())
}

/// Extinguish the tool. The stop offset and the timed stop-tool call ride
/// on the next motion.
pub fn tool_off(ctx: &mut impl ProcessContext) -> Result<(), ProcessError> {
    if !ctx.state().tool_on() {
        return Err(ProcessError::PreconditionViolation {
            transition: "toolOff",
            required: "tool on",
        });
    }

    let stop_offset = ctx.config().offsets.stop;
    let stop_tool = ctx.config().routines.stop_tool.clone();

    ctx.state_mut().flags.remove(ProcessFlags::TOOL_ON);
    let buffer = ctx.buffer_mut();
    buffer.set_position_offset(stop_offset);
    buffer.set_post_move_call(PostMoveCall {
        delay_ms: 0,
        target: CallTarget::Routine(stop_tool),
    });
    debug!("tool off");
    Ok(())
}

/// Pull away from the deposit end point.
pub fn enter_depart(ctx: &mut impl ProcessContext) -> Result<(), ProcessError> {
    if ctx.state().tool_on() {
        return Err(ProcessError::PreconditionViolation {
            transition: "moveDepart",
            required: "tool off",
        });
    }

    let depart_offset = ctx.config().offsets.depart;

    ctx.state_mut().phase = Phase::Depart;
    let buffer = ctx.buffer_mut();
    buffer.set_zone(Zone::ExactStop);
    buffer.set_position_offset(depart_offset);
    buffer.clear_post_move_call();
    Ok(())
}

/// Return to travel between passes: timer off, blending back on, offsets and
/// overrides dropped, travel cruise speed restored.
pub fn enter_link(ctx: &mut impl ProcessContext) -> Result<(), ProcessError> {
    if ctx.state().phase != Phase::Depart {
        return Err(ProcessError::PreconditionViolation {
            transition: "moveLink",
            required: "phase Depart",
        });
    }

    let timer = ctx.config().process_timer;
    let travel_speed = ctx.config().speeds.travel_mm_s;

    ctx.sink().emit_timer(timer, TimerAction::Stop);

    let state = ctx.state_mut();
    state.phase = Phase::Travel;
    state.flags.remove(ProcessFlags::COORD);

    let buffer = ctx.buffer_mut();
    buffer.set_zone(Zone::Blend(100));
    buffer.clear_position_offset();
    buffer.clear_speed_override();
    buffer.set_speed(SpeedSpec::MmPerSec(travel_speed));
    debug!("link: back to travel");
    Ok(())
}

/// Composite deposit-start: ignite, replay the held position to carry the
/// ignition annotation, switch to the path offset, replay again to carry it.
///
/// `start_speed`, when given, fixes the cruise speed for the replayed
/// motions without passing back through the classifier.
pub fn deposit_start_sequence(
    ctx: &mut impl ProcessContext,
    start_speed: Option<f64>,
) -> Result<(), ProcessError> {
    if ctx.state().retracted() {
        return Err(ProcessError::PreconditionViolation {
            transition: "laserStartSeq",
            required: "retract clear",
        });
    }
    if ctx.last_motion().is_none() {
        return Err(ProcessError::NoMotionToReplay {
            transition: "laserStartSeq",
        });
    }

    tool_on(ctx)?;
    if let Some(speed) = start_speed {
        ctx.buffer_mut().set_speed(SpeedSpec::MmPerSec(speed));
    }
    ctx.replay_last_motion("laserStartSeq")?;
    enter_deposit_path(ctx)?;
    ctx.replay_last_motion("laserStartSeq")?;

    ctx.state_mut().flags.insert(ProcessFlags::RETRACT);
    Ok(())
}

/// Composite deposit-stop: extinguish, replay to carry the stop annotation,
/// depart, replay to carry the depart offset, then link back to travel.
pub fn deposit_stop_sequence(
    ctx: &mut impl ProcessContext,
    stop_speed: Option<f64>,
    depart_speed: Option<f64>,
) -> Result<(), ProcessError> {
    if !ctx.state().retracted() {
        return Err(ProcessError::PreconditionViolation {
            transition: "laserStopSeq",
            required: "retract set",
        });
    }
    if ctx.last_motion().is_none() {
        return Err(ProcessError::NoMotionToReplay {
            transition: "laserStopSeq",
        });
    }

    tool_off(ctx)?;
    if let Some(speed) = stop_speed {
        ctx.buffer_mut().set_speed(SpeedSpec::MmPerSec(speed));
    }
    ctx.replay_last_motion("laserStopSeq")?;
    enter_depart(ctx)?;
    ctx.replay_last_motion("laserStopSeq")?;
    enter_link(ctx)?;
    if let Some(speed) = depart_speed {
        ctx.buffer_mut().set_speed(SpeedSpec::MmPerSec(speed));
    }

    ctx.state_mut().flags.remove(ProcessFlags::RETRACT);
    Ok(())
}

/// Runs the transition a classifier event stands for.
pub fn apply_speed_event(
    ctx: &mut impl ProcessContext,
    event: SpeedEvent,
) -> Result<(), ProcessError> {
    match event {
        SpeedEvent::Approach => enter_approach(ctx),
        SpeedEvent::DepositStart => {
            if ctx.config().deposit_start == DepositStartStyle::ApproachFirst {
                enter_approach(ctx)?;
            }
            deposit_start_sequence(ctx, None)
        }
        SpeedEvent::DepositStop => deposit_stop_sequence(ctx, None, None),
    }
}
