#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::io::Write;
use std::ops::Range;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Timelike, Utc};
use omni::{
    layout_for, resolve_period_file, shift_into_window, ArchiveError, Cadence, ColumnMeta,
    MemoryTable, SourceAcquirer, TableAttrs, TableError, TableSource,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

pub const HOURLY_COLUMNS: &[&str] = &[
    "BX_GSE",
    "BY_GSM",
    "BZ_GSM",
    "N",
    "V",
    "Mach_num",
    "KP",
    "DST",
    "PC_N_INDEX",
];

pub const HIGH_RES_COLUMNS: &[&str] = &[
    "BX_GSE",
    "BY_GSM",
    "BZ_GSM",
    "proton_density",
    "flow_speed",
    "Mach_num",
    "SYM_H",
    "PC_N_INDEX",
];

pub fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Deterministic value of a synthetic column at `at`.
pub fn synthetic_value(column: &str, at: DateTime<Utc>) -> f64 {
    match column {
        "BX_GSE" => 1.5,
        "BY_GSM" => 3.0,
        "BZ_GSM" => -4.0 + (at.timestamp() / 300).rem_euclid(7) as f64 * 0.5,
        "N" | "proton_density" => 5.0,
        "V" | "flow_speed" => 400.0 + f64::from(at.hour()),
        "Mach_num" => 8.0,
        "KP" => f64::from(at.hour() * 3),
        "DST" | "SYM_H" => -20.0,
        "PC_N_INDEX" => 2.0,
        _ => 0.0,
    }
}

pub fn fill_value(cadence: Cadence, column: &str) -> f64 {
    layout_for(cadence)
        .column(column)
        .map(|spec| spec.fill)
        .unwrap_or(999.9)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub cadence: Cadence,
    pub at: DateTime<Utc>,
    pub force_refresh: bool,
}

/// In-memory period tables generated on demand, one row per cadence step.
#[derive(Default)]
pub struct SyntheticArchive {
    /// Half-open time ranges where a column holds its fill value.
    fills: Vec<(String, DateTime<Utc>, DateTime<Utc>)>,
    /// Leading rows removed from the period starting at the given instant.
    trimmed_heads: Vec<(DateTime<Utc>, usize)>,
    broken_meta: Vec<String>,
    earliest: Option<DateTime<Utc>>,
    available_until: Option<DateTime<Utc>>,
    pub acquisitions: RefCell<Vec<Acquisition>>,
    pub reads: Rc<RefCell<HashMap<String, usize>>>,
}

impl SyntheticArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fill(mut self, column: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.fills.push((column.to_string(), from, to));
        self
    }

    pub fn with_trimmed_head(mut self, period_start: DateTime<Utc>, rows: usize) -> Self {
        self.trimmed_heads.push((period_start, rows));
        self
    }

    pub fn with_broken_meta(mut self, column: &str) -> Self {
        self.broken_meta.push(column.to_string());
        self
    }

    pub fn with_earliest(mut self, earliest: DateTime<Utc>) -> Self {
        self.earliest = Some(earliest);
        self
    }

    pub fn with_available_until(mut self, until: DateTime<Utc>) -> Self {
        self.available_until = Some(until);
        self
    }

    pub fn reads_of(&self, column: &str) -> usize {
        self.reads.borrow().get(column).copied().unwrap_or(0)
    }

    pub fn acquisitions(&self) -> Vec<Acquisition> {
        self.acquisitions.borrow().clone()
    }

    fn is_filled(&self, column: &str, at: DateTime<Utc>) -> bool {
        self.fills
            .iter()
            .any(|(name, from, to)| name == column && *from <= at && at < *to)
    }

    fn build_table(&self, cadence: Cadence, at: DateTime<Utc>) -> Result<MemoryTable, ArchiveError> {
        let period = resolve_period_file(cadence, at, "synthetic://omni")?;
        let skip = self
            .trimmed_heads
            .iter()
            .find(|(start, _)| *start == period.period_start)
            .map(|(_, rows)| *rows)
            .unwrap_or(0);

        let mut epochs = Vec::new();
        let mut cursor = period.period_start;
        while cursor < period.period_end_exclusive {
            epochs.push(cursor);
            cursor += cadence.step();
        }
        let epochs: Vec<DateTime<Utc>> = epochs.into_iter().skip(skip).collect();

        let columns = if cadence == Cadence::Hourly {
            HOURLY_COLUMNS
        } else {
            HIGH_RES_COLUMNS
        };
        let mut table = MemoryTable::new(period.label(), epochs.clone()).with_attrs(TableAttrs {
            title: Some(format!("synthetic {cadence}")),
            product: Some("synthetic".to_string()),
            period: Some(period.period_start.format("%Y-%m").to_string()),
        });
        for column in columns {
            let fill = fill_value(cadence, column);
            let values = epochs
                .iter()
                .map(|at| {
                    if self.is_filled(column, *at) {
                        fill
                    } else {
                        synthetic_value(column, *at)
                    }
                })
                .collect();
            let meta = layout_for(cadence)
                .column(column)
                .map(|spec| spec.meta())
                .unwrap_or_else(|| ColumnMeta::new(*column).with_fill(fill));
            table.push_column(meta, values)?;
        }
        Ok(table)
    }
}

impl SourceAcquirer for SyntheticArchive {
    fn acquire(
        &self,
        cadence: Cadence,
        at: DateTime<Utc>,
        force_refresh: bool,
    ) -> Result<Box<dyn TableSource>, ArchiveError> {
        self.acquisitions.borrow_mut().push(Acquisition {
            cadence,
            at,
            force_refresh,
        });
        if self.available_until.is_some_and(|until| at >= until) {
            return Err(ArchiveError::NotPublished { cadence, at });
        }

        let table = self.build_table(cadence, at)?;
        Ok(Box::new(InstrumentedTable {
            inner: table,
            reads: Rc::clone(&self.reads),
            broken_meta: self.broken_meta.clone(),
        }))
    }

    fn adjust_requested_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _cadence: Cadence,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        match self.earliest {
            Some(earliest) => shift_into_window(start, end, earliest, self.available_until),
            None => (start, end),
        }
    }
}

/// Counts column reads and can refuse metadata for chosen columns.
pub struct InstrumentedTable {
    inner: MemoryTable,
    reads: Rc<RefCell<HashMap<String, usize>>>,
    broken_meta: Vec<String>,
}

impl TableSource for InstrumentedTable {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn epochs(&self) -> &[DateTime<Utc>] {
        self.inner.epochs()
    }

    fn column_names(&self) -> Vec<String> {
        self.inner.column_names()
    }

    fn has_column(&self, name: &str) -> bool {
        self.inner.has_column(name)
    }

    fn read_column(&self, name: &str, rows: Range<usize>) -> Result<Vec<f64>, TableError> {
        *self.reads.borrow_mut().entry(name.to_string()).or_insert(0) += 1;
        self.inner.read_column(name, rows)
    }

    fn column_meta(&self, name: &str) -> Result<ColumnMeta, TableError> {
        if self.broken_meta.iter().any(|column| column == name) {
            return Err(TableError::Metadata {
                column: name.to_string(),
                message: "attribute block truncated".to_string(),
            });
        }
        self.inner.column_meta(name)
    }

    fn attrs(&self) -> &TableAttrs {
        self.inner.attrs()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[derive(Clone, Default)]
pub struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

pub struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` under a JSON subscriber and returns everything it logged.
pub fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}
