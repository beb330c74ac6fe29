//! Controller-native pass looping.
//!
//! Repeated passes are not unrolled into the output text. Each approach
//! entry emits a numbered label, and the loop header computes the label to
//! re-enter from the pass counter register, so the controller itself walks
//! the passes: `label_register = BASE + counter`, bail to the end label when
//! the counter is exhausted, otherwise jump to the computed label while more
//! passes remain.

use log::debug;

use crate::config::PassRegisters;
use crate::process::ProcessContext;
use crate::sink::{
    Comparison, Condition, InstructionSink, JumpTarget, Label, RegisterExpr, TimerAction,
};

/// Numeric base of the generated pass labels: pass `i` gets label `BASE + i`.
pub const PASS_LABEL_BASE: u16 = 100;

/// Pass-label allocation state for one generation session.
#[derive(Clone, Debug, PartialEq)]
pub struct PassLoopContext {
    regs: Option<PassRegisters>,
    pass_index: u32,
}

impl PassLoopContext {
    pub fn new(regs: Option<PassRegisters>) -> Self {
        PassLoopContext {
            regs,
            pass_index: 0,
        }
    }

    /// Loop registers, or `None` for single-pass cells without the header.
    pub fn regs(&self) -> Option<PassRegisters> {
        self.regs
    }

    /// Passes allocated so far.
    pub fn pass_index(&self) -> u32 {
        self.pass_index
    }

    /// Allocates the label for the next pass. Labels are numbered
    /// `PASS_LABEL_BASE + i` and named `pass<i>` in allocation order.
    pub fn next_pass_label(&mut self) -> Label {
        let index = self.pass_index;
        self.pass_index += 1;
        Label {
            id: crate::ids::LabelId(PASS_LABEL_BASE + index as u16),
            name: Some(format!("pass{index}")),
        }
    }
}

/// Emits the program prologue and the loop header.
///
/// The prologue enables the cell, resets the process timer, and starts the
/// feedstock supply; cells without loop registers skip the feed call and the
/// header.
pub fn start_pass_loop(ctx: &mut impl ProcessContext) {
    let start_cell = ctx.config().routines.start_cell.clone();
    let start_feed = ctx.config().routines.start_feed.clone();
    let timer = ctx.config().process_timer;
    let regs = ctx.pass_loop().regs();

    let sink = ctx.sink();
    sink.emit_call(&start_cell);
    sink.emit_timer(timer, TimerAction::Reset);

    let Some(regs) = regs else {
        debug!("pass loop: no loop registers, prologue only");
        return;
    };
    sink.emit_call(&start_feed);
    sink.emit_register_assignment(
        regs.label,
        &RegisterExpr::RegisterPlus {
            register: regs.counter,
            offset: PASS_LABEL_BASE as i64,
        },
    );
    sink.emit_conditional_jump(
        &Condition {
            register: regs.counter,
            cmp: Comparison::Greater,
            value: regs.exhaust_sentinel,
        },
        JumpTarget::Label(regs.end_label),
    );
    sink.emit_conditional_jump(
        &Condition {
            register: regs.counter,
            cmp: Comparison::Less,
            value: regs.pass_count as i64,
        },
        JumpTarget::Register(regs.label),
    );
    debug!("pass loop: header for {} passes", regs.pass_count);
}

/// Emits the end-of-program label and the shutdown calls.
///
/// The label comes first so that a program that bails on an exhausted
/// counter still runs the feed-stop and cell-disable calls.
pub fn stop_pass_loop(ctx: &mut impl ProcessContext) {
    let stop_cell = ctx.config().routines.stop_cell.clone();
    let stop_feed = ctx.config().routines.stop_feed.clone();
    let regs = ctx.pass_loop().regs();

    let sink = ctx.sink();
    if let Some(regs) = regs {
        sink.emit_label(&Label {
            id: regs.end_label,
            name: Some("endProg".to_owned()),
        });
        sink.emit_call(&stop_feed);
    }
    sink.emit_call(&stop_cell);
}
