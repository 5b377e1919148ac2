//! Random-access period tables.
//!
//! A [`TableSource`] is one physical period file: an ordered Epoch column plus
//! named numeric columns, each with typed metadata. [`MemoryTable`] is the
//! in-memory implementation produced by the text parser.

use std::collections::HashMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Sentinel marking missing data in raw storage. `None` when the column
    /// has no tabulated fill value.
    pub fill: Option<f64>,
    pub description: Option<String>,
    pub units: Option<String>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fill: None,
            description: None,
            units: None,
        }
    }

    pub fn with_fill(mut self, fill: f64) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}

/// Column attributes addressable through [`crate::Interval::get_attr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarAttr {
    FillVal,
    Description,
    Units,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

/// Global attributes of a period file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAttrs {
    pub title: Option<String>,
    pub product: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },
    #[error("rows {start}..{end} out of bounds for column {column} with {len} rows")]
    SliceOutOfBounds {
        column: String,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("column {column} has {found} values, table has {expected} rows")]
    LengthMismatch {
        column: String,
        found: usize,
        expected: usize,
    },
    #[error("metadata for column {column} is unreadable: {message}")]
    Metadata { column: String, message: String },
    #[error("table {0} is closed")]
    Closed(String),
}

pub trait TableSource {
    /// Human readable identity, usually the period file name.
    fn label(&self) -> &str;

    /// Row timestamps, sorted ascending.
    fn epochs(&self) -> &[DateTime<Utc>];

    fn len(&self) -> usize {
        self.epochs().len()
    }

    fn is_empty(&self) -> bool {
        self.epochs().is_empty()
    }

    fn column_names(&self) -> Vec<String>;

    fn has_column(&self, name: &str) -> bool;

    fn read_column(&self, name: &str, rows: Range<usize>) -> Result<Vec<f64>, TableError>;

    fn column_meta(&self, name: &str) -> Result<ColumnMeta, TableError>;

    fn attrs(&self) -> &TableAttrs;

    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
struct MemoryColumn {
    meta: ColumnMeta,
    values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    label: String,
    epochs: Vec<DateTime<Utc>>,
    columns: Vec<MemoryColumn>,
    index: HashMap<String, usize>,
    attrs: TableAttrs,
    closed: bool,
}

impl MemoryTable {
    pub fn new(label: impl Into<String>, epochs: Vec<DateTime<Utc>>) -> Self {
        Self {
            label: label.into(),
            epochs,
            columns: Vec::new(),
            index: HashMap::new(),
            attrs: TableAttrs::default(),
            closed: false,
        }
    }

    pub fn with_attrs(mut self, attrs: TableAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_column(mut self, meta: ColumnMeta, values: Vec<f64>) -> Result<Self, TableError> {
        self.push_column(meta, values)?;
        Ok(self)
    }

    pub fn push_column(&mut self, meta: ColumnMeta, values: Vec<f64>) -> Result<(), TableError> {
        if values.len() != self.epochs.len() {
            return Err(TableError::LengthMismatch {
                column: meta.name,
                found: values.len(),
                expected: self.epochs.len(),
            });
        }

        match self.index.get(&meta.name) {
            Some(&existing) => self.columns[existing] = MemoryColumn { meta, values },
            None => {
                self.index.insert(meta.name.clone(), self.columns.len());
                self.columns.push(MemoryColumn { meta, values });
            }
        }
        Ok(())
    }

    /// Keeps only rows with `start <= epoch < end_exclusive`.
    pub fn retain_window(&mut self, start: DateTime<Utc>, end_exclusive: DateTime<Utc>) {
        let lo = self.epochs.partition_point(|ts| *ts < start);
        let hi = self.epochs.partition_point(|ts| *ts < end_exclusive).max(lo);

        self.epochs = self.epochs[lo..hi].to_vec();
        for column in &mut self.columns {
            column.values = column.values[lo..hi].to_vec();
        }
    }

    fn column(&self, name: &str) -> Result<&MemoryColumn, TableError> {
        if self.closed {
            return Err(TableError::Closed(self.label.clone()));
        }
        self.index
            .get(name)
            .map(|&idx| &self.columns[idx])
            .ok_or_else(|| TableError::UnknownColumn {
                table: self.label.clone(),
                column: name.to_string(),
            })
    }
}

impl TableSource for MemoryTable {
    fn label(&self) -> &str {
        &self.label
    }

    fn epochs(&self) -> &[DateTime<Utc>] {
        &self.epochs
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.meta.name.clone()).collect()
    }

    fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn read_column(&self, name: &str, rows: Range<usize>) -> Result<Vec<f64>, TableError> {
        let column = self.column(name)?;
        if rows.start > rows.end || rows.end > column.values.len() {
            return Err(TableError::SliceOutOfBounds {
                column: name.to_string(),
                start: rows.start,
                end: rows.end,
                len: column.values.len(),
            });
        }
        Ok(column.values[rows].to_vec())
    }

    fn column_meta(&self, name: &str) -> Result<ColumnMeta, TableError> {
        self.column(name).map(|col| col.meta.clone())
    }

    fn attrs(&self) -> &TableAttrs {
        &self.attrs
    }

    fn close(&mut self) {
        self.closed = true;
        self.epochs.clear();
        self.columns.clear();
        self.index.clear();
    }
}
