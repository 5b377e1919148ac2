//! Quantities computed on demand from an interval's raw variables.
//!
//! Each [`DerivedKind`] reads what it needs through [`Interval::get`] and is
//! evaluated at most once per interval; the result is held in a
//! [`DerivedCache`] owned by that interval.

use std::cell::OnceCell;
use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::{Interval, IntervalError};

const UNIX_EPOCH_JULIAN_DATE: f64 = 2_440_587.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivedKind {
    JulianDate,
    Borovsky,
    Newell,
    KnippJouleHeating,
}

impl DerivedKind {
    pub const ALL: [DerivedKind; 4] = [
        Self::JulianDate,
        Self::Borovsky,
        Self::Newell,
        Self::KnippJouleHeating,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::JulianDate => "juliandate",
            Self::Borovsky => "borovsky",
            Self::Newell => "newell",
            Self::KnippJouleHeating => "knippjh",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::JulianDate => "Julian date",
            Self::Borovsky => "Borovsky Solar Wind Coupling Function",
            Self::Newell => "Newell Solar Wind Coupling Function",
            Self::KnippJouleHeating => "Knipp Joule Heating Index",
        }
    }

    pub fn units(self) -> &'static str {
        match self {
            Self::JulianDate => "days",
            Self::Borovsky => "nT km/s",
            Self::Newell => "m/s^(4/3) T^(2/3)",
            Self::KnippJouleHeating => "GW",
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::JulianDate => 0,
            Self::Borovsky => 1,
            Self::Newell => 2,
            Self::KnippJouleHeating => 3,
        }
    }

    pub(crate) fn evaluate(self, interval: &Interval) -> Result<Vec<f64>, IntervalError> {
        let low_res = interval.cadence().is_low_resolution();
        match self {
            Self::JulianDate => Ok(interval.epochs().into_iter().map(julian_date).collect()),
            Self::Borovsky => {
                let (density_var, speed_var) = if low_res {
                    ("N", "V")
                } else {
                    ("proton_density", "flow_speed")
                };
                let by = interval.get("BY_GSM")?;
                let bz = interval.get("BZ_GSM")?;
                let density = interval.get(density_var)?;
                let speed = interval.get(speed_var)?;
                let mach = interval.get("Mach_num")?;
                Ok(borovsky_coupling(&by, &bz, &density, &speed, &mach))
            }
            Self::Newell => {
                let speed_var = if low_res { "V" } else { "flow_speed" };
                let by = interval.get("BY_GSM")?;
                let bz = interval.get("BZ_GSM")?;
                let speed = interval.get(speed_var)?;
                Ok(newell_coupling(&by, &bz, &speed))
            }
            Self::KnippJouleHeating => {
                let epochs = interval.epochs();
                let doy: Vec<f64> = epochs.iter().copied().map(fractional_day_of_year).collect();
                // One leap modifier for the whole interval, taken from its first sample.
                let leap = epochs.first().map(|ts| ts.year() % 4 == 0).unwrap_or(false);
                let pc = interval.get("PC_N_INDEX")?;
                let dst = interval.get(if low_res { "DST" } else { "SYM_H" })?;
                Ok(knipp_joule_heating(&doy, &pc, &dst, leap))
            }
        }
    }
}

/// Memoized derived results, one slot per [`DerivedKind`].
#[derive(Debug, Default)]
pub struct DerivedCache {
    slots: [OnceCell<Vec<f64>>; 4],
}

impl DerivedCache {
    pub fn get_or_compute(
        &self,
        kind: DerivedKind,
        compute: impl FnOnce() -> Result<Vec<f64>, IntervalError>,
    ) -> Result<Vec<f64>, IntervalError> {
        let slot = &self.slots[kind.slot()];
        if let Some(values) = slot.get() {
            return Ok(values.clone());
        }
        let values = compute()?;
        Ok(slot.get_or_init(|| values).clone())
    }

    pub fn is_computed(&self, kind: DerivedKind) -> bool {
        self.slots[kind.slot()].get().is_some()
    }
}

/// Continuous Julian date (days since noon, 1 January 4713 BC).
pub fn julian_date(ts: DateTime<Utc>) -> f64 {
    let seconds = ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) * 1e-9;
    UNIX_EPOCH_JULIAN_DATE + seconds / SECONDS_PER_DAY
}

/// Day of year with the time of day as a fraction; 1 January 00:00 is 1.0.
pub fn fractional_day_of_year(ts: DateTime<Utc>) -> f64 {
    let seconds_into_day = f64::from(ts.num_seconds_from_midnight())
        + f64::from(ts.timestamp_subsec_nanos()) * 1e-9;
    f64::from(ts.ordinal()) + seconds_into_day / SECONDS_PER_DAY
}

pub fn borovsky_coupling(
    by: &[f64],
    bz: &[f64],
    density: &[f64],
    speed: &[f64],
    mach: &[f64],
) -> Vec<f64> {
    by.iter()
        .zip(bz)
        .zip(density)
        .zip(speed)
        .zip(mach)
        .map(|((((&by, &bz), &n), &v), &m)| {
            let clock_angle = by.atan2(bz);
            3.29e-2
                * (clock_angle / 2.0).sin().powi(2)
                * n.sqrt()
                * v.powi(2)
                * m.powf(-0.18)
                * (m / 3.42).sqrt().exp()
        })
        .collect()
}

pub fn newell_coupling(by: &[f64], bz: &[f64], speed: &[f64]) -> Vec<f64> {
    by.iter()
        .zip(bz)
        .zip(speed)
        .map(|((&by, &bz), &v)| {
            let bt = (by * by + bz * bz).sqrt();
            let mut clock_angle = by.atan2(bz);
            if bt * clock_angle.cos() * bz < 0.0 {
                clock_angle += PI;
            }
            let sin_ca = (clock_angle / 2.0).sin().abs();
            (v * 1000.0).powf(4.0 / 3.0) * (bt * 1.0e-9).powf(2.0 / 3.0) * sin_ca.powf(8.0 / 3.0)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Annual,
    Winter,
    Summer,
    Equinox,
}

impl Season {
    /// `(pc, pc^2, dst, dst^2)` coefficients of the Joule heating fit.
    fn coefficients(self) -> [f64; 4] {
        match self {
            Self::Annual => [24.89, 3.41, 0.41, 0.0015],
            Self::Winter => [13.36, 5.08, 0.47, 0.0011],
            Self::Summer => [29.27, 8.18, -0.04, 0.0126],
            Self::Equinox => [29.14, 2.54, 0.21, 0.0023],
        }
    }

    pub fn joule_heating(self, pc: f64, dst: f64) -> f64 {
        let [a, b, c, d] = self.coefficients();
        a * pc + b * pc * pc + c * dst + d * dst * dst
    }
}

/// Season window for a fractional day of year. Windows are tested in the
/// order annual, winter, summer, equinox; the first match wins. Days on the
/// window boundaries belong to no season.
pub fn knipp_season(doy: f64, leap: bool) -> Option<Season> {
    let ly = if leap { 1.0 } else { 0.0 };
    if doy > 335.0 + ly || doy < 31.0 {
        Some(Season::Annual)
    } else if doy > 294.0 + ly || doy < 51.0 {
        Some(Season::Winter)
    } else if doy > 111.0 + ly && doy < 232.0 + ly {
        Some(Season::Summer)
    } else if (doy > 51.0 + ly && doy < 110.0 + ly) || (doy > 233.0 + ly && doy < 293.0 + ly) {
        Some(Season::Equinox)
    } else {
        None
    }
}

/// Knipp Joule heating index from |PC-N| and |Dst|; samples outside every
/// season window are NaN.
pub fn knipp_joule_heating(doy: &[f64], pc: &[f64], dst: &[f64], leap: bool) -> Vec<f64> {
    doy.iter()
        .zip(pc)
        .zip(dst)
        .map(|((&doy, &pc), &dst)| match knipp_season(doy, leap) {
            Some(season) => season.joule_heating(pc.abs(), dst.abs()),
            None => f64::NAN,
        })
        .collect()
}
