//! OMNI solar wind data access.
//!
//! - period file acquisition and local caching of the NASA SPDF OMNI archive
//! - seamless interval reads across period files with fill normalization,
//!   unit corrections and trailing-gap repair
//! - derived coupling functions and Joule heating
//! - delayed/backward-smoothed views and superposed epoch statistics

mod archive;
mod cadence;
mod catalog;
mod derived;
mod events;
mod interval;
mod lagged;
mod observability;
mod omni_text;
mod pchip;
mod table;

pub use archive::{
    archive_config_from_env, earliest_published, resolve_period_file, shift_into_window,
    ArchiveConfig, ArchiveError, LocalProduct, LocalProductSource, OmniArchive, PeriodFile,
    PeriodKind, SourceAcquirer,
};
pub use cadence::{parse_cadence, Cadence, CadenceError, ALL_CADENCES};
pub use catalog::{
    UnitTransform, VariableCatalog, VariableRef, EPOCH, KP_HOURLY_SCALE, STANDARD_TRANSFORMS,
};
pub use derived::{
    borovsky_coupling, fractional_day_of_year, julian_date, knipp_joule_heating, knipp_season,
    newell_coupling, DerivedCache, DerivedKind, Season,
};
pub use events::{
    default_offsets, format_scientific, nan_median, nan_percentile, parse_event_center,
    sanitize_file_name, Event, EventCenter, EventError, EventSet, EventSetConfig, SeaStats,
    DEFAULT_NDAYS, DEFAULT_OFFSET_STEP_DAYS,
};
pub use interval::{
    normalize_fill, BuildOutcome, GapCheck, GapShift, Interval, IntervalError, Window,
    WindowAdjustment, GAP_REPAIR_VARIABLES,
};
pub use lagged::{
    backward_smooth, delay_samples, lookback, median_spacing_minutes, minutes_to_samples,
    LaggedSmoothedView, DEFAULT_AVERAGE_MINUTES, DEFAULT_DELAY_MINUTES,
};
pub use observability::{
    init_logging, log_app_start, log_archive_config, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use omni_text::{
    layout_for, parse_omni_text, ColumnSpec, TextLayout, HIGH_RES_COLUMNS, HIGH_RES_LAYOUT,
    HOURLY_COLUMNS, HOURLY_LAYOUT,
};
pub use pchip::{Pchip, PchipError};
pub use table::{
    AttrValue, ColumnMeta, MemoryTable, TableAttrs, TableError, TableSource, VarAttr,
};
