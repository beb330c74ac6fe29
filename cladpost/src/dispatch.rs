//! Instruction dispatch.
//!
//! The host delivers named instructions interleaved with motions, either
//! bare (`toolOn`) or parameterized (`TIMEAFTER(0,50)`). Dispatch parses the
//! name and a typed argument list, then routes: modifier built-ins mutate
//! the annotation buffer, transition built-ins drive the state machine, and
//! any unrecognized name is emitted as a literal subroutine call. Input text
//! is never evaluated; an argument list that does not parse for a recognized
//! built-in is a typed error and mutates nothing.

use log::trace;
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::annotation::{CallTarget, PostMoveCall};
use crate::ids::{RegisterId, TimerId};
use crate::passloop;
use crate::process::{self, ProcessContext, ProcessError};
use crate::sink::{InstructionSink, TimerAction, Zone};

/// Reserved modifier-name prefixes. A name starting with one of these is
/// always treated as the corresponding modifier built-in.
const MODIFIER_PREFIXES: &[&str] = &[
    "P_OFFSET",
    "TOOL_OFFSET",
    "TIMEAFTER",
    "REG_SPEED",
    "CNT_VALUE",
    "resetTimer",
];

/// Reserved transition names, matched exactly.
static TRANSITIONS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "toolOn",
        "toolOff",
        "moveLaserOn",
        "moveApproach",
        "moveDepart",
        "moveLink",
        "startExtrud",
        "stopExtrud",
        "startPassLoop",
        "stopPassLoop",
        "laserStartSeq",
        "laserStopSeq",
    ]
    .into_iter()
    .collect()
});

/// True when the name would be captured by a built-in and can never reach
/// the sink as a user subroutine call.
pub fn is_reserved(name: &str) -> bool {
    MODIFIER_PREFIXES.iter().any(|p| name.starts_with(p)) || TRANSITIONS.contains(name)
}

/// One parsed instruction argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Errors raised while routing an instruction.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DispatchError {
    /// A recognized built-in received an argument list it cannot use.
    #[error("malformed arguments for `{name}`: `{args}`")]
    MalformedArguments { name: String, args: String },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

fn malformed(name: &str, args: &str) -> DispatchError {
    DispatchError::MalformedArguments {
        name: name.to_owned(),
        args: args.to_owned(),
    }
}

/// Splits the leading identifier from whatever follows it.
fn split_name(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    text.split_at(end)
}

/// Parses the text after the name: nothing, or a parenthesized
/// comma-separated list of numbers and quoted strings.
fn parse_args(rest: &str) -> Result<Option<Vec<Arg>>, ()> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(None);
    }
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or(())?;
    if inner.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    inner
        .split(',')
        .map(|raw| parse_arg(raw.trim()))
        .collect::<Result<Vec<_>, ()>>()
        .map(Some)
}

fn parse_arg(raw: &str) -> Result<Arg, ()> {
    if raw.len() >= 2 {
        for quote in ['\'', '"'] {
            if raw.starts_with(quote) && raw.ends_with(quote) {
                return Ok(Arg::Str(raw[1..raw.len() - 1].to_owned()));
            }
        }
    }
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(Arg::Int(value));
    }
    if let Ok(value) = raw.parse::<f64>() {
        return Ok(Arg::Float(value));
    }
    Err(())
}

fn arg_register(arg: &Arg) -> Option<RegisterId> {
    match *arg {
        Arg::Int(value) if (0..=u16::MAX as i64).contains(&value) => {
            Some(RegisterId(value as u16))
        }
        _ => None,
    }
}

fn arg_speed(arg: &Arg) -> Option<f64> {
    match *arg {
        Arg::Int(value) => Some(value as f64),
        Arg::Float(value) => Some(value),
        Arg::Str(_) => None,
    }
}

/// Routes one named instruction.
///
/// `text` is the raw instruction as received from the host, e.g.
/// `P_OFFSET(24)`, `laserStartSeq(10)`, or `MY_SUBPROGRAM`.
pub fn dispatch(ctx: &mut impl ProcessContext, text: &str) -> Result<(), DispatchError> {
    let text = text.trim();
    let (name, rest) = split_name(text);

    if let Some(&prefix) = MODIFIER_PREFIXES.iter().find(|p| name.starts_with(**p)) {
        if name != prefix {
            return Err(malformed(name, rest));
        }
        let args = parse_args(rest).map_err(|()| malformed(name, rest))?;
        return apply_modifier(ctx, prefix, args, rest);
    }

    if TRANSITIONS.contains(name) {
        let args = parse_args(rest)
            .map_err(|()| malformed(name, rest))?
            .unwrap_or_default();
        return apply_transition(ctx, name, &args, rest);
    }

    // Unknown names are user subroutines by design; spaces are not legal in
    // controller program names.
    let call = text.replace(' ', "_");
    trace!("dispatch: passthrough call {call}");
    ctx.sink().emit_call(&call);
    Ok(())
}

/// Applies a modifier built-in. An empty or absent argument list clears the
/// modifier where a clear is meaningful.
fn apply_modifier(
    ctx: &mut impl ProcessContext,
    name: &str,
    args: Option<Vec<Arg>>,
    raw: &str,
) -> Result<(), DispatchError> {
    let args = match args {
        None => Vec::new(),
        Some(args) => args,
    };
    match name {
        "P_OFFSET" => match args.as_slice() {
            [] => ctx.buffer_mut().clear_position_offset(),
            [arg] => {
                let register = arg_register(arg).ok_or_else(|| malformed(name, raw))?;
                ctx.buffer_mut().set_position_offset(register);
            }
            _ => return Err(malformed(name, raw)),
        },
        "TOOL_OFFSET" => match args.as_slice() {
            [] => ctx.buffer_mut().clear_tool_offset(),
            [arg] => {
                let register = arg_register(arg).ok_or_else(|| malformed(name, raw))?;
                ctx.buffer_mut().set_tool_offset(register);
            }
            _ => return Err(malformed(name, raw)),
        },
        "TIMEAFTER" => match args.as_slice() {
            [] => ctx.buffer_mut().clear_post_move_call(),
            [Arg::Int(delay), target] if *delay >= 0 => {
                let target = match target {
                    Arg::Int(_) => CallTarget::Sensor(
                        arg_register(target).ok_or_else(|| malformed(name, raw))?,
                    ),
                    Arg::Str(routine) => CallTarget::Routine(routine.clone()),
                    Arg::Float(_) => return Err(malformed(name, raw)),
                };
                ctx.buffer_mut().set_post_move_call(PostMoveCall {
                    delay_ms: *delay as u32,
                    target,
                });
            }
            _ => return Err(malformed(name, raw)),
        },
        "REG_SPEED" => match args.as_slice() {
            [] => ctx.buffer_mut().clear_speed_override(),
            [arg] => {
                let register = arg_register(arg).ok_or_else(|| malformed(name, raw))?;
                ctx.buffer_mut().set_speed_override(register);
            }
            _ => return Err(malformed(name, raw)),
        },
        "CNT_VALUE" => match args.as_slice() {
            // bare CNT_VALUE has no clear semantics; ignore it
            [] => trace!("dispatch: CNT_VALUE without a value ignored"),
            [Arg::Int(value)] if *value < 0 => ctx.buffer_mut().set_zone(Zone::ExactStop),
            [Arg::Int(value)] if (0..=100).contains(value) => {
                ctx.buffer_mut().set_zone(Zone::Blend(*value as u8));
            }
            _ => return Err(malformed(name, raw)),
        },
        "resetTimer" => match args.as_slice() {
            [] => trace!("dispatch: resetTimer without a timer ignored"),
            [Arg::Int(value)] if (0..=u8::MAX as i64).contains(value) => {
                ctx.sink().emit_timer(TimerId(*value as u8), TimerAction::Reset);
            }
            _ => return Err(malformed(name, raw)),
        },
        _ => unreachable!("modifier prefix table out of sync"),
    }
    Ok(())
}

/// Applies a transition built-in.
fn apply_transition(
    ctx: &mut impl ProcessContext,
    name: &str,
    args: &[Arg],
    raw: &str,
) -> Result<(), DispatchError> {
    // Only the sequences take arguments.
    match name {
        "laserStartSeq" | "laserStopSeq" => {}
        _ if !args.is_empty() => return Err(malformed(name, raw)),
        _ => {}
    }
    match name {
        "toolOn" => process::tool_on(ctx)?,
        "toolOff" => process::tool_off(ctx)?,
        "moveLaserOn" => process::enter_deposit_path(ctx)?,
        "moveApproach" => process::enter_approach(ctx)?,
        "moveDepart" => process::enter_depart(ctx)?,
        "moveLink" => process::enter_link(ctx)?,
        "startExtrud" => {
            let routine = ctx.config().routines.start_feed.clone();
            ctx.sink().emit_call(&routine);
        }
        "stopExtrud" => {
            let routine = ctx.config().routines.stop_feed.clone();
            ctx.sink().emit_call(&routine);
        }
        "startPassLoop" => passloop::start_pass_loop(ctx),
        "stopPassLoop" => passloop::stop_pass_loop(ctx),
        "laserStartSeq" => {
            let speed = sequence_speeds(name, args, raw, 1)?;
            process::deposit_start_sequence(ctx, speed[0])?;
        }
        "laserStopSeq" => {
            let speeds = sequence_speeds(name, args, raw, 2)?;
            process::deposit_stop_sequence(ctx, speeds[0], speeds[1])?;
        }
        _ => unreachable!("transition name table out of sync"),
    }
    Ok(())
}

/// Up to `max` optional speed arguments for a sequence call; zero and
/// negative values mean "keep the current speed", as does omission.
fn sequence_speeds(
    name: &str,
    args: &[Arg],
    raw: &str,
    max: usize,
) -> Result<Vec<Option<f64>>, DispatchError> {
    if args.len() > max {
        return Err(malformed(name, raw));
    }
    let mut speeds = vec![None; max];
    for (slot, arg) in speeds.iter_mut().zip(args) {
        let value = arg_speed(arg).ok_or_else(|| malformed(name, raw))?;
        if value > 0.0 {
            *slot = Some(value);
        }
    }
    Ok(speeds)
}
