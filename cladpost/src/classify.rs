//! Speed-band classification.
//!
//! Upstream tooling has no notion of process phases; it encodes them as
//! otherwise-unused commanded speeds. Each workcell defines bands of speed
//! values that stand for "begin approach", "start depositing", and "stop
//! depositing". A band only fires when the process retract flag matches its
//! guard, which is what keeps a band from re-firing on every path speed
//! inside the same range once the event has been taken.

use log::trace;

/// Semantic process event recovered from a commanded speed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpeedEvent {
    /// Begin the approach move of the next pass.
    Approach,
    /// Run the deposit-start sequence.
    DepositStart,
    /// Run the deposit-stop sequence.
    DepositStop,
}

/// One classification band: an open interval of speeds plus a retract guard.
///
/// Bands are evaluated in table order; units and thresholds are opaque
/// per-workcell configuration. `high: None` leaves the band unbounded above.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpeedBand {
    /// Lower bound, exclusive.
    pub low: f64,
    /// Upper bound, exclusive; `None` for no upper bound.
    pub high: Option<f64>,
    /// Required state of the retract flag for the band to fire.
    pub when_retracted: bool,
    /// Event injected when the band fires.
    pub event: SpeedEvent,
}

impl SpeedBand {
    /// True when the speed value falls inside the open interval.
    pub fn contains(&self, speed: f64) -> bool {
        speed > self.low && self.high.map_or(true, |h| speed < h)
    }

    /// True when two bands can both fire for some speed value, which makes
    /// classification ambiguous. Bands under opposite retract guards can
    /// never both be live at once.
    pub fn overlaps(&self, other: &SpeedBand) -> bool {
        if self.when_retracted != other.when_retracted {
            return false;
        }
        let low = self.low.max(other.low);
        let high = match (self.high, other.high) {
            (Some(a), Some(b)) => a.min(b),
            (Some(h), None) | (None, Some(h)) => h,
            (None, None) => f64::INFINITY,
        };
        low < high
    }
}

/// Maps a commanded speed to at most one process event.
///
/// Linear scan in table order; the first band whose interval contains the
/// value and whose guard matches the current retract flag wins. `None` means
/// the speed is an ordinary cruise-speed change.
pub fn classify(speed: f64, bands: &[SpeedBand], retracted: bool) -> Option<SpeedEvent> {
    for band in bands {
        if band.when_retracted == retracted && band.contains(speed) {
            trace!("speed {speed} fires {:?}", band.event);
            return Some(band.event);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> Vec<SpeedBand> {
        vec![
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
        ]
    }

    #[test]
    fn out_of_band_speed_is_no_event() {
        assert_eq!(classify(10.0, &bands(), false), None);
        assert_eq!(classify(18.0, &bands(), false), None); // bounds exclusive
    }

    #[test]
    fn band_fires_only_under_matching_guard() {
        assert_eq!(classify(34.0, &bands(), false), Some(SpeedEvent::DepositStart));
        assert_eq!(classify(34.0, &bands(), true), None);
        assert_eq!(classify(60.0, &bands(), true), Some(SpeedEvent::DepositStop));
        assert_eq!(classify(60.0, &bands(), false), None);
    }

    #[test]
    fn unbounded_band_has_no_ceiling() {
        assert_eq!(classify(1.0e6, &bands(), true), Some(SpeedEvent::DepositStop));
    }

    #[test]
    fn overlap_detection_respects_guards() {
        let a = SpeedBand {
            low: 30.0,
            high: Some(40.0),
            when_retracted: false,
            event: SpeedEvent::DepositStart,
        };
        let b = SpeedBand {
            low: 35.0,
            high: None,
            when_retracted: false,
            event: SpeedEvent::DepositStop,
        };
        let c = SpeedBand {
            when_retracted: true,
            ..b
        };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));

        let disjoint = SpeedBand {
            low: 40.0,
            high: Some(45.0),
            when_retracted: false,
            event: SpeedEvent::Approach,
        };
        assert!(!a.overlaps(&disjoint));
    }
}
