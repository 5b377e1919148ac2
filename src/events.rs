//! Superposed epoch statistics over a set of event intervals.
//!
//! Each event owns one [`Interval`] spanning `center ± ndays`. Variables are
//! interpolated onto offsets from the event center (in days) with a monotone
//! cubic interpolant built from the finite samples only, then summarized
//! across events by NaN-ignoring quartiles.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::SourceAcquirer;
use crate::cadence::Cadence;
use crate::derived::{julian_date, DerivedKind};
use crate::interval::{Interval, IntervalError};
use crate::pchip::{Pchip, PchipError};
use crate::table::{AttrValue, TableAttrs, VarAttr};

pub const DEFAULT_NDAYS: i64 = 3;
/// Roughly one hour, in days.
pub const DEFAULT_OFFSET_STEP_DAYS: f64 = 0.042;
const DEFAULT_SET_NAME: &str = "event_set";
const FILE_NAME_REPLACED: [char; 5] = [' ', ',', '/', ':', ';'];

#[derive(Debug, Error)]
pub enum EventError {
    #[error("interval error: {0}")]
    Interval(#[from] IntervalError),
    #[error("event {label}: {variable} has {points} finite samples, interpolation needs at least 2")]
    InsufficientData {
        label: String,
        variable: String,
        points: usize,
    },
    #[error("event {label}: cannot interpolate {variable}: {source}")]
    Interpolant {
        label: String,
        variable: String,
        source: PchipError,
    },
    #[error("event set has no events")]
    NoEvents,
    #[error("invalid event center '{0}', expected YYYY-MM-DDTHH:MM")]
    InvalidCenter(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSetConfig {
    pub name: Option<String>,
    pub ndays: i64,
    pub cadence: Cadence,
}

impl Default for EventSetConfig {
    fn default() -> Self {
        Self {
            name: None,
            ndays: DEFAULT_NDAYS,
            cadence: Cadence::FiveMinute,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCenter {
    pub center: DateTime<Utc>,
    pub label: Option<String>,
}

impl EventCenter {
    pub fn new(center: DateTime<Utc>) -> Self {
        Self {
            center,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn from_ymdhm(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let at = date.and_hms_opt(hour, 0, 0)? + Duration::minutes(i64::from(minute));
        Some(Self::new(at.and_utc()))
    }
}

/// Parses `YYYY-MM-DDTHH:MM` (a space also separates date and time).
pub fn parse_event_center(raw: &str) -> Result<EventCenter, EventError> {
    let trimmed = raw.trim();
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| EventCenter::new(naive.and_utc()))
        .ok_or_else(|| EventError::InvalidCenter(trimmed.to_string()))
}

#[derive(Debug)]
pub struct Event {
    center: DateTime<Utc>,
    center_jd: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    label: String,
    interval: Interval,
    jd: Vec<f64>,
    interpolants: RefCell<HashMap<String, Rc<Pchip>>>,
}

impl Event {
    pub fn open(
        acquirer: &dyn SourceAcquirer,
        center: &EventCenter,
        ndays: i64,
        cadence: Cadence,
    ) -> Result<Self, EventError> {
        let start = center.center - Duration::days(ndays);
        let end = center.center + Duration::days(ndays);
        let interval = Interval::open(acquirer, start, end, cadence)?;
        let jd = interval.get(DerivedKind::JulianDate.name())?;
        let label = center.label.clone().unwrap_or_else(|| {
            format!("{}-{}", start.format("%m-%d-%Y"), end.format("%m-%d-%Y"))
        });

        Ok(Self {
            center: center.center,
            center_jd: julian_date(center.center),
            start,
            end,
            label,
            interval,
            jd,
            interpolants: RefCell::new(HashMap::new()),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn center(&self) -> DateTime<Utc> {
        self.center
    }

    pub fn center_jd(&self) -> f64 {
        self.center_jd
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn jd(&self) -> &[f64] {
        &self.jd
    }

    pub fn get(&self, var: &str) -> Result<Vec<f64>, EventError> {
        Ok(self.interval.get(var)?)
    }

    pub fn get_var_attr(&self, var: &str, attr: VarAttr) -> Result<Option<AttrValue>, EventError> {
        Ok(self.interval.get_attr(var, attr)?)
    }

    pub fn has_interpolant(&self, var: &str) -> bool {
        self.interpolants.borrow().contains_key(var)
    }

    /// Interpolant of `var` over julian date, built on first use.
    pub fn interpolant(&self, var: &str) -> Result<Rc<Pchip>, EventError> {
        if let Some(existing) = self.interpolants.borrow().get(var) {
            return Ok(Rc::clone(existing));
        }

        let values = self.interval.get(var)?;
        let (x, y): (Vec<f64>, Vec<f64>) = self
            .jd
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_finite())
            .map(|(jd, value)| (*jd, *value))
            .unzip();
        debug!(
            component = "events",
            event = "events.interpolant.build",
            label = %self.label,
            variable = var,
            points = x.len(),
            samples = values.len()
        );

        let pchip = Pchip::new(x, y).map_err(|err| match err {
            PchipError::TooFewPoints { found } => EventError::InsufficientData {
                label: self.label.clone(),
                variable: var.to_string(),
                points: found,
            },
            source => EventError::Interpolant {
                label: self.label.clone(),
                variable: var.to_string(),
                source,
            },
        })?;

        let pchip = Rc::new(pchip);
        self.interpolants
            .borrow_mut()
            .insert(var.to_string(), Rc::clone(&pchip));
        Ok(pchip)
    }

    /// Values of `var` at julian dates `jd`.
    pub fn interpolate(&self, var: &str, jd: &[f64]) -> Result<Vec<f64>, EventError> {
        Ok(self.interpolant(var)?.eval_many(jd))
    }

    /// Values of `var` at `offsets` days from the event center.
    pub fn interpolate_offsets(&self, var: &str, offsets: &[f64]) -> Result<Vec<f64>, EventError> {
        let jd: Vec<f64> = offsets.iter().map(|offset| self.center_jd + offset).collect();
        self.interpolate(var, &jd)
    }

    pub fn close(self) {
        self.interval.close();
    }
}

/// Quartiles of one variable across events, per offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeaStats {
    pub variable: String,
    pub offsets: Vec<f64>,
    pub lower_quartile: Vec<f64>,
    pub median: Vec<f64>,
    pub upper_quartile: Vec<f64>,
    pub events: usize,
}

#[derive(Debug)]
pub struct EventSet {
    config: EventSetConfig,
    events: Vec<Event>,
}

impl EventSet {
    pub fn build(
        acquirer: &dyn SourceAcquirer,
        centers: &[EventCenter],
        config: EventSetConfig,
    ) -> Result<Self, EventError> {
        if centers.is_empty() {
            return Err(EventError::NoEvents);
        }
        info!(
            component = "events",
            event = "events.build.start",
            name = config.name.as_deref().unwrap_or(DEFAULT_SET_NAME),
            cadence = config.cadence.as_str(),
            ndays = config.ndays,
            events = centers.len()
        );

        let mut events = Vec::with_capacity(centers.len());
        for center in centers {
            let event = Event::open(acquirer, center, config.ndays, config.cadence)?;
            debug!(
                component = "events",
                event = "events.event.open",
                label = %event.label(),
                rows = event.interval().len()
            );
            events.push(event);
        }

        info!(
            component = "events",
            event = "events.build.finish",
            events = events.len()
        );
        Ok(Self { config, events })
    }

    pub fn config(&self) -> &EventSetConfig {
        &self.config
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Global attributes of the first event's last period table.
    pub fn attrs(&self) -> Option<&TableAttrs> {
        self.events.first().and_then(|event| event.interval().attrs())
    }

    pub fn get_var_attr(&self, var: &str, attr: VarAttr) -> Result<Option<AttrValue>, EventError> {
        match self.events.first() {
            Some(event) => event.get_var_attr(var, attr),
            None => Err(EventError::NoEvents),
        }
    }

    pub fn default_offsets(&self) -> Vec<f64> {
        default_offsets(self.config.ndays as f64, DEFAULT_OFFSET_STEP_DAYS)
    }

    /// One row per event of `var` interpolated at `offsets`. An event with
    /// fewer than two finite samples contributes a row of NaN.
    pub fn interpolated(&self, var: &str, offsets: &[f64]) -> Result<Vec<Vec<f64>>, EventError> {
        let mut rows = Vec::with_capacity(self.events.len());
        for event in &self.events {
            match event.interpolate_offsets(var, offsets) {
                Ok(row) => rows.push(row),
                Err(EventError::InsufficientData { label, points, .. }) => {
                    warn!(
                        component = "events",
                        event = "events.interpolant.insufficient",
                        label = %label,
                        variable = var,
                        points
                    );
                    rows.push(vec![f64::NAN; offsets.len()]);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(rows)
    }

    pub fn stats(&self, var: &str, offsets: &[f64]) -> Result<SeaStats, EventError> {
        let rows = self.interpolated(var, offsets)?;

        let mut lower_quartile = Vec::with_capacity(offsets.len());
        let mut median = Vec::with_capacity(offsets.len());
        let mut upper_quartile = Vec::with_capacity(offsets.len());
        for col in 0..offsets.len() {
            let column: Vec<f64> = rows.iter().map(|row| row[col]).collect();
            lower_quartile.push(nan_percentile(&column, 25.0));
            median.push(nan_median(&column));
            upper_quartile.push(nan_percentile(&column, 75.0));
        }

        Ok(SeaStats {
            variable: var.to_string(),
            offsets: offsets.to_vec(),
            lower_quartile,
            median,
            upper_quartile,
            events: self.events.len(),
        })
    }

    /// Writes quartile statistics of `var` under `dir`. Returns the written
    /// path. Offsets default to [`EventSet::default_offsets`].
    pub fn dump_stats(
        &self,
        var: &str,
        dir: &Path,
        file_name: Option<&str>,
        offsets: Option<&[f64]>,
    ) -> Result<PathBuf, EventError> {
        let (first, last) = match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(EventError::NoEvents),
        };
        let default_offsets;
        let offsets = match offsets {
            Some(offsets) => offsets,
            None => {
                default_offsets = self.default_offsets();
                &default_offsets
            }
        };
        let stats = self.stats(var, offsets)?;

        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => format!(
                "{}_{}_stats.csv",
                self.name().unwrap_or(DEFAULT_SET_NAME),
                var
            ),
        };
        let path = dir.join(sanitize_file_name(&file_name));

        let mut header = String::new();
        if let Some(name) = self.name() {
            header.push_str(&format!("# {name}: \n"));
        }
        header.push_str(&format!("# Omni Cadence: {}\n", self.config.cadence));
        header.push_str(&format!("# First Event: {}\n", first.label()));
        header.push_str(&format!("# Last Event: {}\n", last.label()));
        header.push_str(&format!("# Generated: {}\n", Local::now().format("%c")));
        header.push_str("# Column 1: Time since center time / zero epoch hour [days] \n");
        header.push_str(&format!("# Column 2: 25th Percentile / 1st Quartile of {var} \n"));
        header.push_str(&format!("# Column 3: 50th Percentile / Median of {var} \n"));
        header.push_str(&format!("# Column 4: 75th Percentile / 3rd Quartile of {var} \n"));

        let mut file = fs::File::create(&path)?;
        file.write_all(header.as_bytes())?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for (idx, offset) in stats.offsets.iter().enumerate() {
            writer.write_record([
                format!("{offset:.5}"),
                format_scientific(stats.lower_quartile[idx]),
                format_scientific(stats.median[idx]),
                format_scientific(stats.upper_quartile[idx]),
            ])?;
        }
        writer.flush()?;

        info!(
            component = "events",
            event = "events.stats.dump",
            variable = var,
            path = %path.display(),
            rows = stats.offsets.len(),
            events = self.events.len()
        );
        Ok(path)
    }

    pub fn close(self) {
        let count = self.events.len();
        for event in self.events {
            event.close();
        }
        info!(component = "events", event = "events.close", events = count);
    }
}

/// `-ndays, -ndays + step, ...` up to but excluding `ndays + step`.
pub fn default_offsets(ndays: f64, step: f64) -> Vec<f64> {
    if step.is_nan() || step <= 0.0 || !ndays.is_finite() {
        return Vec::new();
    }
    let start = -ndays;
    let stop = ndays + step;
    let count = ((stop - start) / step).ceil().max(0.0) as usize;
    (0..count).map(|i| start + i as f64 * step).collect()
}

pub fn nan_median(values: &[f64]) -> f64 {
    nan_percentile(values, 50.0)
}

/// Linear-interpolated percentile of the non-NaN values; NaN when none remain.
pub fn nan_percentile(values: &[f64], percentile: f64) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.sort_by(f64::total_cmp);

    let rank = percentile.clamp(0.0, 100.0) / 100.0 * (finite.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    finite[lo] + (finite[hi] - finite[lo]) * (rank - lo as f64)
}

/// `1.234500e+01` style: six mantissa decimals, signed exponent of at least
/// two digits.
pub fn format_scientific(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let raw = format!("{value:.6e}");
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => raw,
    }
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|ch| if FILE_NAME_REPLACED.contains(&ch) { '_' } else { ch })
        .collect()
}
