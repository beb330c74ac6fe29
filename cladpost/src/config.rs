//! Per-workcell configuration.
//!
//! Every deployed cell differs only in constants: register numbers, speed
//! bands, routine names, timers. The whole table is passed into a session as
//! one record and validated before any output is produced, so a bad table can
//! never produce a partially-written program.

use thiserror::Error;

use crate::classify::SpeedBand;
use crate::dispatch;
use crate::ids::{LabelId, RegisterId, TimerId};

/// Position-register assignments for the offset kinds the process uses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OffsetRegisters {
    /// Correction applied while igniting the tool.
    pub start: RegisterId,
    /// Correction applied while extinguishing the tool.
    pub stop: RegisterId,
    /// Correction applied along the deposit path.
    pub path: RegisterId,
    /// Correction for the approach move.
    pub approach: RegisterId,
    /// Correction for the depart move.
    pub depart: RegisterId,
    /// Scratch register reserved for controller-side calculations.
    pub spare: RegisterId,
    /// Register holding the user tool frame.
    pub user_tool: RegisterId,
    /// Register holding the user coordinate frame.
    pub user_frame: RegisterId,
}

/// Cruise speeds for the non-deposit portions of a pass.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Speeds {
    /// Linear speed between passes, mm/s.
    pub travel_mm_s: f64,
    /// Creep speed for the approach move, mm/s.
    pub approach_mm_s: f64,
    /// Joint-move speed as a percentage of maximum.
    pub joint_pct: f64,
}

/// Controller routine names invoked by the process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Routines {
    /// Fired after the motion that ignites the tool.
    pub start_tool: String,
    /// Fired after the motion that extinguishes the tool.
    pub stop_tool: String,
    /// Enables the cell (interlocks, source) at program start.
    pub start_cell: String,
    /// Disables the cell at program end.
    pub stop_cell: String,
    /// Starts the feedstock supply.
    pub start_feed: String,
    /// Stops the feedstock supply.
    pub stop_feed: String,
}

/// Registers and limits for the controller-native pass loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PassRegisters {
    /// Register the controller increments once per completed pass.
    pub counter: RegisterId,
    /// Register receiving the computed pass-label number.
    pub label: RegisterId,
    /// Label marking the end of the looped program body.
    pub end_label: LabelId,
    /// Total number of passes to execute.
    pub pass_count: u32,
    /// Counter value past which the program bails to the end label.
    pub exhaust_sentinel: i64,
}

/// How a deposit-start event enters the pass lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DepositStartStyle {
    /// The band table has its own approach band; deposit-start fires alone.
    Direct,
    /// Approach and deposit-start are folded into a single band, so the
    /// start event runs the approach transition first.
    ApproachFirst,
}

/// The complete constant table for one workcell.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkcellConfig {
    pub offsets: OffsetRegisters,
    /// Active user frame id, used by the host when emitting the prologue.
    pub active_frame: u8,
    /// Active user tool id, used by the host when emitting the prologue.
    pub active_tool: u8,
    /// Register supplying the deposit speed, when the cell overrides speed
    /// from the controller side.
    pub speed_register: Option<RegisterId>,
    /// Height-sensor trigger register; `None` for cells without the sensor.
    pub height_sensor: Option<RegisterId>,
    pub speeds: Speeds,
    /// Dwell before igniting the tool, ms.
    pub tool_settle_ms: u32,
    /// Timer accumulating tool-on time.
    pub process_timer: TimerId,
    /// Timer accumulating feedstock time; reserved for the host.
    pub feed_timer: TimerId,
    pub routines: Routines,
    /// Classification bands, evaluated in order. Empty for cells driven by
    /// explicit instructions only.
    pub bands: Vec<SpeedBand>,
    pub deposit_start: DepositStartStyle,
    /// `None` for cells that run a single pass without the loop header.
    pub pass_loop: Option<PassRegisters>,
    /// Whether deposit motions run in coordinated-motion mode.
    pub coordinated_motion: bool,
}

/// Configuration-table validation failures.
///
/// All of these must be caught before a session starts; none can occur once
/// generation is underway.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Two bands under the same retract guard intersect, making
    /// classification ambiguous.
    #[error("speed bands {first} and {second} overlap under the same retract guard")]
    OverlappingSpeedBands { first: usize, second: usize },

    /// A configured routine name would be shadowed by a built-in dispatch
    /// name and could never be called.
    #[error("routine name `{name}` collides with a built-in instruction name")]
    ReservedRoutineName { name: String },
}

impl WorkcellConfig {
    /// Checks the table for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, a) in self.bands.iter().enumerate() {
            for (j, b) in self.bands.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    return Err(ConfigError::OverlappingSpeedBands { first: i, second: j });
                }
            }
        }
        let names = [
            &self.routines.start_tool,
            &self.routines.stop_tool,
            &self.routines.start_cell,
            &self.routines.stop_cell,
            &self.routines.start_feed,
            &self.routines.stop_feed,
        ];
        for name in names {
            if dispatch::is_reserved(name) {
                return Err(ConfigError::ReservedRoutineName { name: name.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> WorkcellConfig {
    use crate::classify::SpeedEvent;

    WorkcellConfig {
        offsets: OffsetRegisters {
            start: RegisterId(25),
            stop: RegisterId(26),
            path: RegisterId(24),
            approach: RegisterId(78),
            depart: RegisterId(76),
            spare: RegisterId(9),
            user_tool: RegisterId(56),
            user_frame: RegisterId(16),
        },
        active_frame: 5,
        active_tool: 3,
        speed_register: Some(RegisterId(157)),
        height_sensor: Some(RegisterId(50)),
        speeds: Speeds {
            travel_mm_s: 75.0,
            approach_mm_s: 25.0,
            joint_pct: 20.0,
        },
        tool_settle_ms: 200,
        process_timer: TimerId(4),
        feed_timer: TimerId(3),
        routines: Routines {
            start_tool: "RUN_LASER_START".to_owned(),
            stop_tool: "RUN_LASER_STOP".to_owned(),
            start_cell: "G0_LASER_ENABLE".to_owned(),
            stop_cell: "G0_LASER_DISABLE".to_owned(),
            start_feed: "G0_POWDER_START".to_owned(),
            stop_feed: "G0_POWDER_STOP".to_owned(),
        },
        bands: vec![
            SpeedBand {
                low: 50.0,
                high: None,
                when_retracted: true,
                event: SpeedEvent::DepositStop,
            },
            SpeedBand {
                low: 15.0,
                high: Some(18.0),
                when_retracted: false,
                event: SpeedEvent::Approach,
            },
            SpeedBand {
                low: 33.0,
                high: Some(38.0),
                when_retracted: false,
                event: SpeedEvent::DepositStart,
            },
        ],
        deposit_start: DepositStartStyle::Direct,
        pass_loop: Some(PassRegisters {
            counter: RegisterId(180),
            label: RegisterId(215),
            end_label: LabelId(999),
            pass_count: 3,
            exhaust_sentinel: 99,
        }),
        coordinated_motion: false,
    }
}
