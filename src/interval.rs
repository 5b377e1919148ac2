//! Seamless time-bounded access across consecutive OMNI period tables.
//!
//! An [`Interval`] owns the ordered period tables covering `[start, end)` at
//! one cadence and presents them as a single array per variable:
//!
//! - `start_index` is the first row of the first table at or after `start`
//! - `end_index` is the first row of the last table at or after `end`
//! - raw reads are concatenated across tables, fill sentinels become NaN,
//!   and cadence-specific unit corrections are applied
//! - derived quantities are computed once and memoized
//!
//! Construction checks the core IMF fields for missing data near the end of
//! the window. A trailing run of missing records either narrows the served
//! window or, when too little valid data remains, moves the whole window to
//! just before the affected period file and builds once more. Both outcomes
//! are reported as [`WindowAdjustment`]s.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveError, SourceAcquirer};
use crate::cadence::Cadence;
use crate::catalog::{UnitTransform, VariableCatalog, VariableRef};
use crate::derived::{DerivedCache, DerivedKind};
use crate::table::{AttrValue, TableAttrs, TableError, TableSource, VarAttr};

/// Fields whose missing values trigger window repair.
pub const GAP_REPAIR_VARIABLES: [&str; 3] = ["BX_GSE", "BY_GSM", "BZ_GSM"];
const GAP_SHIFT_BUFFER_DAYS: i64 = 2;
const NEXT_PERIOD_LOOKAHEAD_DAYS: i64 = 1;

#[derive(Debug, Error)]
pub enum IntervalError {
    #[error("invalid range: start {start} is not before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("data unavailable: {0}")]
    DataUnavailable(#[from] ArchiveError),
    #[error("period table {label} has no records")]
    EmptySource { label: String },
    #[error(
        "period tables {previous} and {next} are not contiguous (last record {previous_last}, next record {next_first})"
    )]
    DiscontinuousSources {
        previous: String,
        next: String,
        previous_last: DateTime<Utc>,
        next_first: DateTime<Utc>,
    },
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("degenerate timebase: median sample spacing is {spacing_minutes} minutes")]
    DegenerateTimebase { spacing_minutes: f64 },
    #[error("table error: {0}")]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IntervalError> {
        if start >= end {
            return Err(IntervalError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// A change between the window a caller asked for and the one served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowAdjustment {
    /// Moved to lie inside the archive's published range.
    ArchiveClamp { requested: Window, served: Window },
    /// Trailing missing records in `variable` moved the window earlier inside
    /// the same period table, keeping its row count.
    TrailingGapShrink {
        variable: String,
        requested: Window,
        served: Window,
    },
    /// Too little valid data in `variable`; the window was moved to end two
    /// days before the affected period table and rebuilt.
    GapShift {
        variable: String,
        requested: Window,
        served: Window,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapCheck {
    Enabled,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapShift {
    pub variable: String,
    pub window: Window,
}

#[derive(Debug)]
pub enum BuildOutcome {
    Ready(Interval),
    NeedsShift(GapShift),
}

pub struct Interval {
    cadence: Cadence,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    sources: Vec<Box<dyn TableSource>>,
    start_index: usize,
    end_index: usize,
    catalog: VariableCatalog,
    derived: DerivedCache,
    adjustments: Vec<WindowAdjustment>,
}

impl Interval {
    /// Builds the interval for `[start, end)`, performing at most one
    /// gap-repair rebuild.
    pub fn open(
        acquirer: &dyn SourceAcquirer,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cadence: Cadence,
    ) -> Result<Self, IntervalError> {
        let requested = Window::new(start, end)?;
        let (adjusted_start, adjusted_end) =
            acquirer.adjust_requested_window(start, end, cadence);
        let window = Window::new(adjusted_start, adjusted_end)?;

        let mut adjustments = Vec::new();
        if window != requested {
            warn!(
                component = "interval",
                event = "interval.window.archive_clamp",
                cadence = cadence.as_str(),
                requested_start = %requested.start,
                requested_end = %requested.end,
                start = %window.start,
                end = %window.end
            );
            adjustments.push(WindowAdjustment::ArchiveClamp {
                requested,
                served: window,
            });
        }

        info!(
            component = "interval",
            event = "interval.build.start",
            cadence = cadence.as_str(),
            start = %window.start,
            end = %window.end
        );

        let mut interval = match Self::try_build(acquirer, cadence, window, GapCheck::Enabled, false)?
        {
            BuildOutcome::Ready(interval) => interval,
            BuildOutcome::NeedsShift(shift) => {
                warn!(
                    component = "interval",
                    event = "interval.gap_repair.shift",
                    cadence = cadence.as_str(),
                    variable = %shift.variable,
                    requested_start = %window.start,
                    requested_end = %window.end,
                    start = %shift.window.start,
                    end = %shift.window.end
                );
                let mut interval = Self::assemble(acquirer, cadence, shift.window, true)?;
                let served = interval.window();
                interval.adjustments.push(WindowAdjustment::GapShift {
                    variable: shift.variable,
                    requested: window,
                    served,
                });
                interval
            }
        };

        adjustments.append(&mut interval.adjustments);
        interval.adjustments = adjustments;

        info!(
            component = "interval",
            event = "interval.build.finish",
            cadence = cadence.as_str(),
            start = %interval.start,
            end = %interval.end,
            sources = interval.sources.len(),
            start_index = interval.start_index,
            end_index = interval.end_index,
            rows = interval.len()
        );

        Ok(interval)
    }

    /// One construction attempt. With [`GapCheck::Enabled`], a window that
    /// cannot be repaired in place yields [`BuildOutcome::NeedsShift`] with
    /// the window the caller should retry.
    pub fn try_build(
        acquirer: &dyn SourceAcquirer,
        cadence: Cadence,
        window: Window,
        gap_check: GapCheck,
        force_refresh: bool,
    ) -> Result<BuildOutcome, IntervalError> {
        let interval = Self::assemble(acquirer, cadence, window, force_refresh)?;
        match gap_check {
            GapCheck::Enabled => interval.repair_trailing_gap(),
            GapCheck::Skip => Ok(BuildOutcome::Ready(interval)),
        }
    }

    fn assemble(
        acquirer: &dyn SourceAcquirer,
        cadence: Cadence,
        window: Window,
        force_refresh: bool,
    ) -> Result<Self, IntervalError> {
        let first = acquire_nonempty(acquirer, cadence, window.start, force_refresh)?;
        let start_index = first.epochs().partition_point(|ts| *ts < window.start);
        let mut sources = vec![first];

        loop {
            let previous = &sources[sources.len() - 1];
            let previous_last = match previous.epochs().last() {
                Some(ts) if *ts < window.end => *ts,
                _ => break,
            };

            let next_at = previous_last + Duration::days(NEXT_PERIOD_LOOKAHEAD_DAYS);
            let next = acquire_nonempty(acquirer, cadence, next_at, force_refresh)?;
            let (next_first, next_last) = match (next.epochs().first(), next.epochs().last()) {
                (Some(first), Some(last)) => (*first, *last),
                _ => {
                    return Err(IntervalError::EmptySource {
                        label: next.label().to_string(),
                    })
                }
            };
            // Nothing newer than the last record: the product is only partly published.
            if next_last <= previous_last {
                warn!(
                    component = "interval",
                    event = "interval.source.exhausted",
                    cadence = cadence.as_str(),
                    source = next.label(),
                    last_record = %previous_last,
                    end = %window.end
                );
                return Err(IntervalError::DataUnavailable(ArchiveError::NotPublished {
                    cadence,
                    at: next_at,
                }));
            }
            if next_first - cadence.step() > previous_last {
                return Err(IntervalError::DiscontinuousSources {
                    previous: previous.label().to_string(),
                    next: next.label().to_string(),
                    previous_last,
                    next_first,
                });
            }

            debug!(
                component = "interval",
                event = "interval.source.append",
                previous = previous.label(),
                next = next.label()
            );
            sources.push(next);
        }

        let end_index = match sources.last() {
            Some(last) => last.epochs().partition_point(|ts| *ts < window.end),
            None => 0,
        };
        let catalog = VariableCatalog::build(cadence, &sources);

        Ok(Self {
            cadence,
            start: window.start,
            end: window.end,
            sources,
            start_index,
            end_index,
            catalog,
            derived: DerivedCache::default(),
            adjustments: Vec::new(),
        })
    }

    fn repair_trailing_gap(mut self) -> Result<BuildOutcome, IntervalError> {
        let Some(variable) = self.first_gappy_variable()? else {
            return Ok(BuildOutcome::Ready(self));
        };

        if self.sources.len() != 1 {
            debug!(
                component = "interval",
                event = "interval.gap_repair.skipped",
                variable = %variable,
                sources = self.sources.len()
            );
            return Ok(BuildOutcome::Ready(self));
        }

        let source = &self.sources[0];
        let mut column = source.read_column(&variable, 0..source.len())?;
        if let Ok(meta) = source.column_meta(&variable) {
            normalize_fill(&mut column, meta.fill);
        }

        let span_rows = self.end_index - self.start_index;
        let mut last_valid = self.end_index.min(column.len().saturating_sub(1));
        while last_valid > 0 && !column[last_valid].is_finite() {
            last_valid -= 1;
        }

        if last_valid < span_rows {
            let end = source.epochs()[0] - Duration::days(GAP_SHIFT_BUFFER_DAYS);
            let window = Window {
                start: end - self.window().span(),
                end,
            };
            return Ok(BuildOutcome::NeedsShift(GapShift { variable, window }));
        }

        let start_index = last_valid - span_rows;
        if (start_index, last_valid) != (self.start_index, self.end_index) {
            let requested = self.window();
            let served = Window {
                start: source.epochs()[start_index],
                end: source.epochs()[last_valid],
            };
            warn!(
                component = "interval",
                event = "interval.gap_repair.shrink",
                variable = %variable,
                requested_start = %requested.start,
                requested_end = %requested.end,
                start = %served.start,
                end = %served.end
            );

            self.start_index = start_index;
            self.end_index = last_valid;
            self.start = served.start;
            self.end = served.end;
            self.derived = DerivedCache::default();
            self.adjustments.push(WindowAdjustment::TrailingGapShrink {
                variable,
                requested,
                served,
            });
        }

        Ok(BuildOutcome::Ready(self))
    }

    fn first_gappy_variable(&self) -> Result<Option<String>, IntervalError> {
        for variable in GAP_REPAIR_VARIABLES {
            if !self.catalog.contains(variable) {
                continue;
            }
            if self.get(variable)?.iter().any(|value| !value.is_finite()) {
                return Ok(Some(variable.to_string()));
            }
        }
        Ok(None)
    }

    pub fn resolve(&self, name: &str) -> Result<VariableRef, IntervalError> {
        self.catalog
            .resolve(name)
            .cloned()
            .ok_or_else(|| IntervalError::UnknownVariable(name.to_string()))
    }

    /// Values of `name` over the interval, one per row.
    pub fn get(&self, name: &str) -> Result<Vec<f64>, IntervalError> {
        match self.catalog.resolve(name) {
            Some(variable) => self.read(variable),
            None => Err(IntervalError::UnknownVariable(name.to_string())),
        }
    }

    /// Reads an already resolved variable. The Epoch column is returned as
    /// POSIX seconds; use [`Interval::epochs`] for typed timestamps.
    pub fn read(&self, variable: &VariableRef) -> Result<Vec<f64>, IntervalError> {
        match variable {
            VariableRef::Epoch => Ok(self
                .epochs()
                .into_iter()
                .map(|ts| ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) * 1e-9)
                .collect()),
            VariableRef::Raw { column, transform } => self.read_raw(column, transform.as_ref()),
            VariableRef::Derived(kind) => self.read_derived(*kind),
        }
    }

    fn read_derived(&self, kind: DerivedKind) -> Result<Vec<f64>, IntervalError> {
        self.derived.get_or_compute(kind, || {
            debug!(
                component = "interval",
                event = "interval.derived.compute",
                variable = kind.name()
            );
            kind.evaluate(self)
        })
    }

    fn read_raw(
        &self,
        column: &str,
        transform: Option<&UnitTransform>,
    ) -> Result<Vec<f64>, IntervalError> {
        let mut data = Vec::with_capacity(self.len());
        for (source, rows) in self.sources.iter().zip(self.row_ranges()) {
            data.extend(source.read_column(column, rows)?);
        }

        if let Some(last) = self.sources.last() {
            match last.column_meta(column) {
                Ok(meta) => {
                    normalize_fill(&mut data, meta.fill);
                }
                Err(err) => warn!(
                    component = "interval",
                    event = "interval.fill.unreadable",
                    variable = column,
                    error = %err
                ),
            }
        }

        if let Some(transform) = transform {
            debug!(
                component = "interval",
                event = "interval.transform.apply",
                variable = column,
                cadence = self.cadence.as_str(),
                description = transform.description
            );
            transform.apply(&mut data);
        }

        Ok(data)
    }

    /// Row range read from each source, in source order.
    fn row_ranges(&self) -> Vec<Range<usize>> {
        let last = self.sources.len().saturating_sub(1);
        self.sources
            .iter()
            .enumerate()
            .map(|(idx, source)| {
                let lo = if idx == 0 { self.start_index } else { 0 };
                let hi = if idx == last {
                    self.end_index
                } else {
                    source.len()
                };
                lo..hi.max(lo)
            })
            .collect()
    }

    /// Typed timestamps of every row.
    pub fn epochs(&self) -> Vec<DateTime<Utc>> {
        let mut out = Vec::with_capacity(self.len());
        for (source, rows) in self.sources.iter().zip(self.row_ranges()) {
            out.extend_from_slice(&source.epochs()[rows]);
        }
        out
    }

    /// Attribute of a variable. Derived variables answer from their own
    /// metadata; raw variables from the last period table. Missing
    /// attributes are `None`.
    pub fn get_attr(&self, name: &str, attr: VarAttr) -> Result<Option<AttrValue>, IntervalError> {
        match self.resolve(name)? {
            VariableRef::Epoch => Ok(None),
            VariableRef::Derived(kind) => Ok(match attr {
                VarAttr::FillVal => None,
                VarAttr::Description => Some(AttrValue::Text(kind.description().to_string())),
                VarAttr::Units => Some(AttrValue::Text(kind.units().to_string())),
            }),
            VariableRef::Raw { column, .. } => {
                let meta = match self.sources.last().map(|last| last.column_meta(&column)) {
                    Some(Ok(meta)) => meta,
                    _ => return Ok(None),
                };
                Ok(match attr {
                    VarAttr::FillVal => meta.fill.map(AttrValue::Number),
                    VarAttr::Description => meta.description.map(AttrValue::Text),
                    VarAttr::Units => meta.units.map(AttrValue::Text),
                })
            }
        }
    }

    /// Registers an extra unit correction. Returns whether it applies to
    /// this interval's cadence and column set.
    pub fn add_transform(&mut self, transform: UnitTransform) -> bool {
        self.catalog.add_transform(transform)
    }

    pub fn len(&self) -> usize {
        self.row_ranges().iter().map(|rows| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn window(&self) -> Window {
        Window {
            start: self.start,
            end: self.end,
        }
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn end_index(&self) -> usize {
        self.end_index
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source_labels(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.label()).collect()
    }

    /// Global attributes of the last period table.
    pub fn attrs(&self) -> Option<&TableAttrs> {
        self.sources.last().map(|source| source.attrs())
    }

    pub fn catalog(&self) -> &VariableCatalog {
        &self.catalog
    }

    pub fn adjustments(&self) -> &[WindowAdjustment] {
        &self.adjustments
    }

    pub fn is_derived_computed(&self, kind: DerivedKind) -> bool {
        self.derived.is_computed(kind)
    }

    /// Releases every period table.
    pub fn close(self) {
        let count = self.sources.len();
        for mut source in self.sources {
            source.close();
        }
        info!(
            component = "interval",
            event = "interval.close",
            cadence = self.cadence.as_str(),
            sources = count
        );
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interval")
            .field("cadence", &self.cadence)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("start_index", &self.start_index)
            .field("end_index", &self.end_index)
            .field("sources", &self.source_labels())
            .field("adjustments", &self.adjustments)
            .finish()
    }
}

/// Replaces values equal to a finite `fill` with NaN. Returns how many were
/// replaced.
pub fn normalize_fill(values: &mut [f64], fill: Option<f64>) -> usize {
    let Some(fill) = fill.filter(|fill| fill.is_finite()) else {
        return 0;
    };
    let mut replaced = 0;
    for value in values.iter_mut() {
        if *value == fill {
            *value = f64::NAN;
            replaced += 1;
        }
    }
    replaced
}

fn acquire_nonempty(
    acquirer: &dyn SourceAcquirer,
    cadence: Cadence,
    at: DateTime<Utc>,
    force_refresh: bool,
) -> Result<Box<dyn TableSource>, IntervalError> {
    let source = acquirer.acquire(cadence, at, force_refresh)?;
    if source.is_empty() {
        return Err(IntervalError::EmptySource {
            label: source.label().to_string(),
        });
    }
    Ok(source)
}
