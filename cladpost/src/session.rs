//! One generation session: a strict left-to-right fold over the incoming
//! instruction/motion stream.
//!
//! The session owns the annotation buffer, the process state, and the
//! pass-loop context for exactly one output program; nothing is shared
//! across sessions and nothing survives past [`Session::finish`]. Replaying
//! the same stream through two fresh sessions produces identical output.

use log::warn;

use crate::annotation::AnnotationBuffer;
use crate::classify;
use crate::config::{ConfigError, WorkcellConfig};
use crate::dispatch::{self, DispatchError};
use crate::passloop::PassLoopContext;
use crate::process::{self, Phase, ProcessContext, ProcessError, ProcessFlags, ProcessState};
use crate::sink::{InstructionSink, Motion, MotionDecor, MotionKind, Pose, SpeedSpec};

/// Drives generation of one program against one workcell.
#[derive(Debug)]
pub struct Session<S: InstructionSink> {
    config: WorkcellConfig,
    state: ProcessState,
    buffer: AnnotationBuffer,
    pass_loop: PassLoopContext,
    last_motion: Option<Motion>,
    sink: S,
}

impl<S: InstructionSink> Session<S> {
    /// Creates a session after validating the workcell table.
    pub fn new(config: WorkcellConfig, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let buffer = AnnotationBuffer::new(SpeedSpec::MmPerSec(config.speeds.travel_mm_s));
        let pass_loop = PassLoopContext::new(config.pass_loop);
        Ok(Session {
            config,
            state: ProcessState::default(),
            buffer,
            pass_loop,
            last_motion: None,
            sink,
        })
    }

    /// Feeds a joint-interpolated motion.
    pub fn move_joint(&mut self, pose: Pose, joints: Vec<f64>) {
        self.emit_motion(Motion {
            kind: MotionKind::Joint,
            pose,
            joints,
        });
    }

    /// Feeds a linear-interpolated motion.
    pub fn move_linear(&mut self, pose: Pose, joints: Vec<f64>) {
        self.emit_motion(Motion {
            kind: MotionKind::Linear,
            pose,
            joints,
        });
    }

    /// Feeds a commanded speed change.
    ///
    /// The classifier sees the value first and may inject a process event;
    /// the composite sequence for that event runs before the literal value
    /// is recorded as the new cruise speed, so the sequence's replayed
    /// motions still travel at the speed in effect when the event fired.
    pub fn set_speed(&mut self, mm_per_sec: f64) -> Result<(), ProcessError> {
        let retracted = self.state.retracted();
        if let Some(event) = classify::classify(mm_per_sec, &self.config.bands, retracted) {
            process::apply_speed_event(self, event)?;
        }
        self.buffer.set_speed(SpeedSpec::MmPerSec(mm_per_sec));
        Ok(())
    }

    /// Feeds a named instruction call.
    pub fn run_instruction(&mut self, text: &str) -> Result<(), DispatchError> {
        dispatch::dispatch(self, text)
    }

    /// Passes a pre-formatted program line straight through to the sink.
    pub fn emit_line(&mut self, text: &str) {
        self.sink.emit_line(text);
    }

    /// Current process state.
    pub fn process(&self) -> &ProcessState {
        &self.state
    }

    /// The workcell table this session generates against.
    pub fn config(&self) -> &WorkcellConfig {
        &self.config
    }

    /// Ends the session and returns the sink.
    pub fn finish(self) -> S {
        if self.state.phase != Phase::Travel || self.state.retracted() {
            warn!(
                "session finished mid-pass: phase {:?}, retract {}",
                self.state.phase,
                self.state.retracted()
            );
        }
        self.sink
    }

    /// Returns the sink without the end-of-program checks. Test helper.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn emit_motion(&mut self, motion: Motion) {
        let annotation = self.buffer.drain();
        let speed = match (motion.kind, annotation.speed_override) {
            (MotionKind::Joint, _) => SpeedSpec::Percent(self.config.speeds.joint_pct),
            (MotionKind::Linear, Some(register)) => SpeedSpec::Register(register),
            (MotionKind::Linear, None) => self.buffer.speed(),
        };
        let decor = MotionDecor {
            annotation,
            zone: self.buffer.zone(),
            speed,
            coordinated: self.state.flags.contains(ProcessFlags::COORD),
        };
        self.sink.emit_motion(&motion, &decor);
        self.last_motion = Some(motion);
    }
}

impl<S: InstructionSink> ProcessContext for Session<S> {
    type Sink = S;

    fn config(&self) -> &WorkcellConfig {
        &self.config
    }

    fn state(&self) -> &ProcessState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProcessState {
        &mut self.state
    }

    fn buffer(&self) -> &AnnotationBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut AnnotationBuffer {
        &mut self.buffer
    }

    fn pass_loop(&self) -> &PassLoopContext {
        &self.pass_loop
    }

    fn pass_loop_mut(&mut self) -> &mut PassLoopContext {
        &mut self.pass_loop
    }

    fn sink(&mut self) -> &mut S {
        &mut self.sink
    }

    fn last_motion(&self) -> Option<&Motion> {
        self.last_motion.as_ref()
    }

    fn replay_last_motion(&mut self, transition: &'static str) -> Result<(), ProcessError> {
        let motion = match self.last_motion.clone() {
            Some(motion) => Motion {
                kind: MotionKind::Linear,
                ..motion
            },
            None => return Err(ProcessError::NoMotionToReplay { transition }),
        };
        self.emit_motion(motion);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::ids::RegisterId;
    use crate::sink::{RecordingSink, SinkOp, TimerAction, Zone};

    fn session() -> Session<RecordingSink> {
        Session::new(test_config(), RecordingSink::new()).unwrap()
    }

    fn motions(ops: &[SinkOp]) -> Vec<&MotionDecor> {
        ops.iter()
            .filter_map(|op| match op {
                SinkOp::Motion { decor, .. } => Some(decor),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn speed_band_lifecycle() {
        let mut s = session();
        s.move_joint(Pose::default(), vec![0.0; 6]);

        s.set_speed(10.0).unwrap();
        assert_eq!(s.process().phase, Phase::Travel);

        s.set_speed(16.0).unwrap();
        assert_eq!(s.process().phase, Phase::Approach);

        s.move_linear(Pose::new(200.0, 250.0, 348.7, 180.0, 0.0, -150.0), vec![0.0; 6]);
        s.set_speed(34.0).unwrap();
        assert_eq!(s.process().phase, Phase::Deposit);
        assert!(s.process().retracted());
        assert!(s.process().tool_on());

        s.move_linear(Pose::new(250.0, 300.0, 278.0, 180.0, 0.0, -150.0), vec![0.0; 6]);
        s.set_speed(60.0).unwrap();
        assert_eq!(s.process().phase, Phase::Travel);
        assert!(!s.process().retracted());
        assert!(!s.process().tool_on());
    }

    #[test]
    fn start_band_fires_once_while_retracted() {
        let mut s = session();
        s.move_joint(Pose::default(), vec![0.0; 6]);
        s.set_speed(16.0).unwrap();
        s.move_linear(Pose::default(), vec![0.0; 6]);

        s.set_speed(34.0).unwrap();
        s.set_speed(35.0).unwrap();
        s.set_speed(36.0).unwrap();

        // the ignition dwell is emitted exactly once
        let waits = s
            .into_sink()
            .ops
            .iter()
            .filter(|op| matches!(op, SinkOp::Wait(_)))
            .count();
        assert_eq!(waits, 1);
    }

    #[test]
    fn literal_speed_recorded_after_sequence() {
        let mut s = session();
        s.move_joint(Pose::default(), vec![0.0; 6]);
        s.set_speed(16.0).unwrap();
        s.move_linear(Pose::default(), vec![0.0; 6]);
        s.set_speed(34.0).unwrap();
        // deposit path motion after the sequence: override was drained by the
        // replays, so the literal band speed applies
        s.move_linear(Pose::default(), vec![0.0; 6]);

        let ops = s.into_sink().ops;
        let decors = motions(&ops);
        // joint move, approach move, two replays, path move
        assert_eq!(decors.len(), 5);
        let path = decors.last().unwrap();
        assert_eq!(path.speed, SpeedSpec::MmPerSec(34.0));
        assert_eq!(path.annotation.position_offset, None);

        // the first replay carries the speed-register override staged by
        // tool-on, already resolved into the motion speed
        assert_eq!(decors[2].annotation.speed_override, Some(RegisterId(157)));
        assert_eq!(decors[2].speed, SpeedSpec::Register(RegisterId(157)));
        // the override is one-shot: the second replay reverts to the cruise
        // speed recorded before the start band fired
        assert_eq!(decors[3].speed, SpeedSpec::MmPerSec(16.0));
    }

    #[test]
    fn joint_moves_use_percent_speed() {
        let mut s = session();
        s.move_joint(Pose::default(), vec![0.0; 6]);
        s.move_linear(Pose::default(), vec![0.0; 6]);
        let ops = s.into_sink().ops;
        let decors = motions(&ops);
        assert_eq!(decors[0].speed, SpeedSpec::Percent(20.0));
        assert_eq!(decors[1].speed, SpeedSpec::MmPerSec(75.0));
    }

    #[test]
    fn approach_switches_zone_and_link_restores_it() {
        let mut s = session();
        s.move_joint(Pose::default(), vec![0.0; 6]);
        s.run_instruction("moveApproach").unwrap();
        s.move_linear(Pose::default(), vec![0.0; 6]);
        s.run_instruction("laserStartSeq").unwrap();
        s.move_linear(Pose::default(), vec![0.0; 6]);
        s.run_instruction("laserStopSeq").unwrap();
        s.move_linear(Pose::default(), vec![0.0; 6]);

        let ops = s.into_sink().ops;
        let decors = motions(&ops);
        // approach move is exact-stop
        assert_eq!(decors[1].zone, Zone::ExactStop);
        // final travel move blends again at travel speed
        let last = decors.last().unwrap();
        assert_eq!(last.zone, Zone::Blend(100));
        assert_eq!(last.speed, SpeedSpec::MmPerSec(75.0));
    }

    #[test]
    fn process_timer_brackets_the_deposit() {
        let mut s = session();
        s.move_joint(Pose::default(), vec![0.0; 6]);
        s.run_instruction("moveApproach").unwrap();
        s.move_linear(Pose::default(), vec![0.0; 6]);
        s.run_instruction("laserStartSeq").unwrap();
        s.run_instruction("laserStopSeq").unwrap();

        let timer_ops: Vec<_> = s
            .into_sink()
            .ops
            .iter()
            .filter_map(|op| match op {
                SinkOp::Timer { action, .. } => Some(*action),
                _ => None,
            })
            .collect();
        assert_eq!(timer_ops, vec![TimerAction::Start, TimerAction::Stop]);
    }
}
