//! Configuration tables for the deployed cladding workcells.
//!
//! Every cell shares the same process logic and differs only in constants:
//! register assignments, speed-band thresholds, timers, sensors, and motion
//! flags. Band units are whatever the cell's upstream tooling emits and are
//! deliberately not reconciled across cells; the only structural rule is
//! that live bands must not overlap, which
//! [`WorkcellConfig::validate`] enforces when a session starts.

use cladpost::classify::{SpeedBand, SpeedEvent};
use cladpost::config::{
    DepositStartStyle, OffsetRegisters, PassRegisters, Routines, Speeds, WorkcellConfig,
};
use cladpost::ids::{LabelId, RegisterId, TimerId};

/// Shared defaults for the cladding cells; every cell constructor starts
/// from this table and overrides what differs.
fn base() -> WorkcellConfig {
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
        bands: Vec::new(),
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

/// Cell 1 with the part positioner: explicit-instruction programs only.
pub fn cell1_positioner() -> WorkcellConfig {
    WorkcellConfig {
        offsets: OffsetRegisters {
            path: RegisterId(69),
            approach: RegisterId(58),
            depart: RegisterId(59),
            user_tool: RegisterId(45),
            user_frame: RegisterId(43),
            ..base().offsets
        },
        active_frame: 4,
        active_tool: 5,
        process_timer: TimerId(3),
        feed_timer: TimerId(4),
        ..base()
    }
}

/// Cell 1 shaft-rebuild jobs: coordinated motion with the turntable and
/// track, sequences driven by explicit `laserStartSeq`/`laserStopSeq` calls.
pub fn cell1_rebuild() -> WorkcellConfig {
    WorkcellConfig {
        active_frame: 5,
        coordinated_motion: true,
        pass_loop: Some(PassRegisters {
            counter: RegisterId(180),
            label: RegisterId(215),
            end_label: LabelId(999),
            pass_count: 6,
            exhaust_sentinel: 99,
        }),
        ..cell1_positioner()
    }
}

/// Cell 2 additive jobs: slicer output encodes approach and deposit-start
/// in a single speed band, so the start event runs the approach first.
/// The cell has no height sensor.
pub fn cell2_additive() -> WorkcellConfig {
    WorkcellConfig {
        offsets: OffsetRegisters {
            spare: RegisterId(290),
            ..base().offsets
        },
        active_frame: 9,
        height_sensor: None,
        process_timer: TimerId(1),
        bands: vec![
            SpeedBand {
                low: 130.0,
                high: Some(140.0),
                when_retracted: true,
                event: SpeedEvent::DepositStop,
            },
            SpeedBand {
                low: 30.0,
                high: Some(40.0),
                when_retracted: false,
                event: SpeedEvent::DepositStart,
            },
        ],
        deposit_start: DepositStartStyle::ApproachFirst,
        ..base()
    }
}

/// Cell 2 hard-facing jobs: separate approach/start/stop bands in the
/// slicer's mm/s scale, coordinated motion on the turntable.
pub fn cell2_hardfacing() -> WorkcellConfig {
    WorkcellConfig {
        offsets: OffsetRegisters {
            spare: RegisterId(290),
            ..base().offsets
        },
        active_frame: 6,
        process_timer: TimerId(1),
        coordinated_motion: true,
        bands: vec![
            SpeedBand {
                low: 50.0,
                high: None,
                when_retracted: true,
                event: SpeedEvent::DepositStop,
            },
            SpeedBand {
                low: 0.6,
                high: Some(0.8),
                when_retracted: false,
                event: SpeedEvent::Approach,
            },
            SpeedBand {
                low: 1.3,
                high: Some(1.5),
                when_retracted: false,
                event: SpeedEvent::DepositStart,
            },
        ],
        ..base()
    }
}

/// Cell 2 hard-facing rebuild jobs: same cell as [`cell2_hardfacing`] but
/// driven by explicit sequence calls instead of speed bands.
pub fn cell2_hardfacing_rebuild() -> WorkcellConfig {
    WorkcellConfig {
        bands: Vec::new(),
        pass_loop: Some(PassRegisters {
            counter: RegisterId(180),
            label: RegisterId(215),
            end_label: LabelId(999),
            pass_count: 6,
            exhaust_sentinel: 99,
        }),
        ..cell2_hardfacing()
    }
}

/// Cell 2 heat-treat jobs: no sensor, no bands, single tool path.
pub fn cell2_heat_treat() -> WorkcellConfig {
    WorkcellConfig {
        offsets: OffsetRegisters {
            spare: RegisterId(290),
            ..base().offsets
        },
        active_frame: 2,
        height_sensor: None,
        process_timer: TimerId(1),
        ..base()
    }
}

/// Cell 2 cutting jobs: fast approach, slow travel, no feedstock and no
/// pass loop; the program runs front to back once.
pub fn cell2_cut() -> WorkcellConfig {
    WorkcellConfig {
        offsets: OffsetRegisters {
            spare: RegisterId(290),
            ..base().offsets
        },
        active_frame: 9,
        height_sensor: None,
        process_timer: TimerId(1),
        speeds: Speeds {
            travel_mm_s: 25.0,
            approach_mm_s: 100.0,
            joint_pct: 20.0,
        },
        pass_loop: None,
        ..base()
    }
}

/// Every shipped cell table, by name.
pub fn all_cells() -> Vec<(&'static str, WorkcellConfig)> {
    vec![
        ("cell1_positioner", cell1_positioner()),
        ("cell1_rebuild", cell1_rebuild()),
        ("cell2_additive", cell2_additive()),
        ("cell2_hardfacing", cell2_hardfacing()),
        ("cell2_hardfacing_rebuild", cell2_hardfacing_rebuild()),
        ("cell2_heat_treat", cell2_heat_treat()),
        ("cell2_cut", cell2_cut()),
    ]
}
