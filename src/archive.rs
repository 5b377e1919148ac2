//! OMNI period file acquisition.
//!
//! Hourly data is served in half-year periods and high-resolution data in
//! calendar months. The published text products are yearly (hourly, 5-min)
//! or monthly (1-min), so each product is cached once under `data_root` and
//! every acquired table is cut down to exactly one period.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cadence::Cadence;
use crate::observability::env_value;
use crate::omni_text::{layout_for, parse_omni_text};
use crate::table::{TableAttrs, TableError, TableSource};

const OMNI_DATA_BASE_URL: &str = "https://spdf.gsfc.nasa.gov/pub/data/omni";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    HalfYear,
    Month,
}

impl PeriodKind {
    pub fn for_cadence(cadence: Cadence) -> Self {
        if cadence.is_low_resolution() {
            Self::HalfYear
        } else {
            Self::Month
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodFile {
    pub cadence: Cadence,
    pub kind: PeriodKind,
    pub period_start: DateTime<Utc>,
    pub period_end_exclusive: DateTime<Utc>,
    pub url: String,
    /// Cache location of the containing product, relative to `data_root`.
    pub relative_path: PathBuf,
}

impl PeriodFile {
    pub fn product_name(&self) -> String {
        self.relative_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// `omni2_2006.dat@2006-07`, `omni_5min2006.asc@2006-03`, ...
    pub fn label(&self) -> String {
        format!(
            "{}@{}",
            self.product_name(),
            self.period_start.format("%Y-%m")
        )
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.period_start <= at && at < self.period_end_exclusive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalProductSource {
    Cached,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalProduct {
    pub period: PeriodFile,
    pub local_path: PathBuf,
    pub source: LocalProductSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub data_root: PathBuf,
    pub base_url: String,
    pub http_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Last instant the archive is known to cover. Unbounded when `None`.
    pub latest_available: Option<DateTime<Utc>>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data/omni"),
            base_url: OMNI_DATA_BASE_URL.to_string(),
            http_timeout_ms: 12_750,
            max_retries: 1,
            retry_backoff_ms: 200,
            latest_available: None,
        }
    }
}

/// Applies `OMNI_DATA_ROOT`, `OMNI_BASE_URL`, `OMNI_HTTP_TIMEOUT_MS` and
/// `OMNI_MAX_RETRIES` over the defaults.
pub fn archive_config_from_env() -> ArchiveConfig {
    let mut config = ArchiveConfig::default();
    if let Some(root) = env_value("OMNI_DATA_ROOT") {
        config.data_root = PathBuf::from(root);
    }
    if let Some(base_url) = env_value("OMNI_BASE_URL") {
        let trimmed = base_url.trim_end_matches('/');
        if !trimmed.is_empty() {
            config.base_url = trimmed.to_string();
        }
    }
    if let Some(timeout) =
        env_value("OMNI_HTTP_TIMEOUT_MS").and_then(|raw| raw.parse::<u64>().ok())
    {
        config.http_timeout_ms = timeout;
    }
    if let Some(retries) = env_value("OMNI_MAX_RETRIES").and_then(|raw| raw.parse::<u32>().ok())
    {
        config.max_retries = retries;
    }
    config
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid archive configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("HTTP request timed out for {url}")]
    HttpTimeout { url: String },
    #[error("no {cadence} data is published for {at}")]
    NotPublished { cadence: Cadence, at: DateTime<Utc> },
    #[error("line {line}: record has {found} words, expected at least {expected}")]
    InvalidRecordColumns {
        line: usize,
        found: usize,
        expected: usize,
    },
    #[error("line {line}: failed to parse field {field} value '{value}'")]
    ParseField {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("line {line}: year/day/time fields do not form a valid timestamp")]
    InvalidEpoch { line: usize },
    #[error("line {line}: record is not after the previous record")]
    UnorderedRecord { line: usize },
    #[error("period {label} has no records")]
    EmptyPeriod { label: String },
    #[error("table error: {0}")]
    Table(#[from] TableError),
}

impl ArchiveError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HttpRequest { .. } | Self::HttpTimeout { .. })
    }
}

/// Supplies period tables to an interval.
pub trait SourceAcquirer {
    /// Table of the period containing `at`. With `force_refresh` any local
    /// copy is discarded and fetched again.
    fn acquire(
        &self,
        cadence: Cadence,
        at: DateTime<Utc>,
        force_refresh: bool,
    ) -> Result<Box<dyn TableSource>, ArchiveError>;

    /// Moves a requested window inside the published range, keeping its span.
    fn adjust_requested_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cadence: Cadence,
    ) -> (DateTime<Utc>, DateTime<Utc>);
}

pub fn earliest_published(cadence: Cadence) -> DateTime<Utc> {
    let year = if cadence.is_low_resolution() { 1963 } else { 1981 };
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Shifts `[start, end)` forward so it starts no earlier than `earliest`, or
/// back so it ends no later than `latest`.
pub fn shift_into_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    earliest: DateTime<Utc>,
    latest: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    if start < earliest {
        let shortfall = earliest - start;
        return (start + shortfall, end + shortfall);
    }
    match latest {
        Some(latest) if end > latest => {
            let overshoot = end - latest;
            (start - overshoot, end - overshoot)
        }
        _ => (start, end),
    }
}

pub fn resolve_period_file(
    cadence: Cadence,
    at: DateTime<Utc>,
    base_url: &str,
) -> Result<PeriodFile, ArchiveError> {
    let not_published = || ArchiveError::NotPublished { cadence, at };
    let year = at.year();
    let kind = PeriodKind::for_cadence(cadence);

    let (start_date, end_date) = match kind {
        PeriodKind::HalfYear => {
            if at.month() < 7 {
                (
                    NaiveDate::from_ymd_opt(year, 1, 1),
                    NaiveDate::from_ymd_opt(year, 7, 1),
                )
            } else {
                (
                    NaiveDate::from_ymd_opt(year, 7, 1),
                    NaiveDate::from_ymd_opt(year + 1, 1, 1),
                )
            }
        }
        PeriodKind::Month => {
            let start = NaiveDate::from_ymd_opt(year, at.month(), 1);
            (start, start.and_then(next_month))
        }
    };
    let period_start = start_date.ok_or_else(not_published)?;
    let period_end = end_date.ok_or_else(not_published)?;

    let relative = match cadence {
        Cadence::Hourly => format!("low_res_omni/omni2_{year}.dat"),
        Cadence::FiveMinute => format!("high_res_omni/omni_5min{year}.asc"),
        Cadence::OneMinute => format!(
            "high_res_omni/monthly_1min/omni_min{year}{:02}.asc",
            at.month()
        ),
    };
    let file_name = relative.rsplit('/').next().unwrap_or(&relative).to_string();

    Ok(PeriodFile {
        cadence,
        kind,
        period_start: period_start.and_time(chrono::NaiveTime::MIN).and_utc(),
        period_end_exclusive: period_end.and_time(chrono::NaiveTime::MIN).and_utc(),
        url: format!("{}/{relative}", base_url.trim_end_matches('/')),
        relative_path: PathBuf::from(cadence.as_str()).join(file_name),
    })
}

fn next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

/// NASA SPDF backed [`SourceAcquirer`] with a local product cache.
pub struct OmniArchive {
    cfg: ArchiveConfig,
    fetcher: Box<dyn HttpFetcher>,
}

impl OmniArchive {
    pub fn new(cfg: ArchiveConfig) -> Result<Self, ArchiveError> {
        if cfg.base_url.trim().is_empty() {
            return Err(ArchiveError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        let fetcher = ReqwestBlockingFetcher::new(cfg.http_timeout_ms)?;
        Ok(Self::with_fetcher(cfg, Box::new(fetcher)))
    }

    fn with_fetcher(cfg: ArchiveConfig, fetcher: Box<dyn HttpFetcher>) -> Self {
        Self { cfg, fetcher }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.cfg
    }

    pub fn period_file(&self, cadence: Cadence, at: DateTime<Utc>) -> Result<PeriodFile, ArchiveError> {
        if at < earliest_published(cadence)
            || self.cfg.latest_available.is_some_and(|latest| at > latest)
        {
            return Err(ArchiveError::NotPublished { cadence, at });
        }
        resolve_period_file(cadence, at, &self.cfg.base_url)
    }

    /// Makes the product containing `period` available locally.
    pub fn sync_period(
        &self,
        period: &PeriodFile,
        force_refresh: bool,
    ) -> Result<LocalProduct, ArchiveError> {
        let local_path = self.cfg.data_root.join(&period.relative_path);
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if local_path.exists() && !force_refresh {
            info!(
                component = "archive",
                event = "archive.sync.file.cached",
                cadence = period.cadence.as_str(),
                path = %local_path.display()
            );
            return Ok(LocalProduct {
                period: period.clone(),
                local_path,
                source: LocalProductSource::Cached,
            });
        }

        if force_refresh && local_path.exists() {
            info!(
                component = "archive",
                event = "archive.sync.file.refresh",
                cadence = period.cadence.as_str(),
                path = %local_path.display()
            );
        }

        let bytes = retry(&self.cfg, &period.url, || self.fetcher.get_bytes(&period.url))?;
        write_atomic(&local_path, &bytes)?;

        info!(
            component = "archive",
            event = "archive.sync.file.downloaded",
            cadence = period.cadence.as_str(),
            path = %local_path.display(),
            bytes = bytes.len()
        );
        debug!(
            component = "archive",
            event = "archive.sync.file.downloaded.debug",
            url = %period.url
        );

        Ok(LocalProduct {
            period: period.clone(),
            local_path,
            source: LocalProductSource::Downloaded,
        })
    }
}

impl SourceAcquirer for OmniArchive {
    fn acquire(
        &self,
        cadence: Cadence,
        at: DateTime<Utc>,
        force_refresh: bool,
    ) -> Result<Box<dyn TableSource>, ArchiveError> {
        let period = self.period_file(cadence, at)?;
        let local = self.sync_period(&period, force_refresh)?;
        let text = String::from_utf8_lossy(&fs::read(&local.local_path)?).into_owned();

        let label = period.label();
        let mut table = parse_omni_text(cadence, &label, &text)?;
        table.retain_window(period.period_start, period.period_end_exclusive);
        if table.is_empty() {
            return Err(ArchiveError::EmptyPeriod { label });
        }

        info!(
            component = "archive",
            event = "archive.acquire.finish",
            cadence = cadence.as_str(),
            period = %label,
            rows = table.len(),
            source = ?local.source
        );

        let attrs = TableAttrs {
            title: Some(format!("OMNI {cadence} {}", period.period_start.format("%Y-%m"))),
            product: Some(layout_for(cadence).product.to_string()),
            period: Some(format!(
                "{}/{}",
                period.period_start.format("%Y-%m-%d"),
                period.period_end_exclusive.format("%Y-%m-%d")
            )),
        };
        Ok(Box::new(table.with_attrs(attrs)))
    }

    fn adjust_requested_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cadence: Cadence,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        shift_into_window(
            start,
            end,
            earliest_published(cadence),
            self.cfg.latest_available,
        )
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            ArchiveError::InvalidConfig(format!("invalid cache path: {}", path.display()))
        })?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

trait HttpFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ArchiveError>;
}

struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingFetcher {
    fn new(timeout_ms: u64) -> Result<Self, ArchiveError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| ArchiveError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

fn request_error(url: &str, err: reqwest::Error) -> ArchiveError {
    if err.is_timeout() {
        ArchiveError::HttpTimeout {
            url: url.to_string(),
        }
    } else {
        ArchiveError::HttpRequest {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

impl HttpFetcher for ReqwestBlockingFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ArchiveError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| request_error(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::HttpRequest {
                url: url.to_string(),
                message: format!("unexpected HTTP status {status}"),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| request_error(url, err))
    }
}

fn retry<T>(
    cfg: &ArchiveConfig,
    url: &str,
    mut f: impl FnMut() -> Result<T, ArchiveError>,
) -> Result<T, ArchiveError> {
    let mut attempt: u32 = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= cfg.max_retries || !err.is_retryable() => return Err(err),
            Err(err) => {
                attempt = attempt.saturating_add(1);
                let shift = attempt.saturating_sub(1).min(10);
                let sleep_ms = cfg.retry_backoff_ms.saturating_mul(1u64 << shift);
                warn!(
                    component = "archive",
                    event = "archive.fetch.retry",
                    url,
                    attempt,
                    sleep_ms,
                    error = %err
                );
                std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{Interval, IntervalError};
    use crate::omni_text::HOURLY_LAYOUT;
    use std::cell::Cell;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MockFetcher {
        responses: HashMap<String, Vec<u8>>,
        times_out: bool,
        calls: Cell<usize>,
    }

    impl MockFetcher {
        fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.responses.insert(url.to_string(), body.to_vec());
            self
        }

        fn timing_out() -> Self {
            Self {
                times_out: true,
                ..Self::default()
            }
        }
    }

    impl HttpFetcher for MockFetcher {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ArchiveError> {
            self.calls.set(self.calls.get() + 1);
            if self.times_out {
                return Err(ArchiveError::HttpTimeout {
                    url: url.to_string(),
                });
            }
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| ArchiveError::HttpRequest {
                    url: url.to_string(),
                    message: "missing mock response".to_string(),
                })
        }
    }

    struct SharedMock(std::rc::Rc<MockFetcher>);

    impl HttpFetcher for SharedMock {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ArchiveError> {
            self.0.get_bytes(url)
        }
    }

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn acquire_err(archive: &OmniArchive, cadence: Cadence, at: DateTime<Utc>) -> ArchiveError {
        match archive.acquire(cadence, at, false) {
            Ok(table) => panic!("expected acquisition of {} to fail", table.label()),
            Err(err) => err,
        }
    }

    fn hourly_line(at: DateTime<Utc>, bz: f64) -> String {
        let mut words = vec!["0".to_string(); HOURLY_LAYOUT.min_fields()];
        words[0] = at.year().to_string();
        words[1] = at.ordinal().to_string();
        words[2] = chrono::Timelike::hour(&at).to_string();
        words[16] = format!("{bz:.1}");
        words.join(" ")
    }

    /// One record at 00:00 on the 1st and 15th of every month of 2006.
    fn hourly_product() -> String {
        (1..=12)
            .flat_map(|month| [ts(2006, month, 1, 0), ts(2006, month, 15, 0)])
            .map(|at| hourly_line(at, -1.5))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cfg(root: &Path) -> ArchiveConfig {
        ArchiveConfig {
            data_root: root.to_path_buf(),
            retry_backoff_ms: 0,
            ..ArchiveConfig::default()
        }
    }

    #[test]
    fn periods_follow_cadence() {
        let hourly = resolve_period_file(Cadence::Hourly, ts(2006, 9, 3, 0), OMNI_DATA_BASE_URL).unwrap();
        assert_eq!(hourly.kind, PeriodKind::HalfYear);
        assert_eq!(hourly.period_start, ts(2006, 7, 1, 0));
        assert_eq!(hourly.period_end_exclusive, ts(2007, 1, 1, 0));
        assert_eq!(
            hourly.url,
            "https://spdf.gsfc.nasa.gov/pub/data/omni/low_res_omni/omni2_2006.dat"
        );
        assert_eq!(hourly.label(), "omni2_2006.dat@2006-07");

        let five = resolve_period_file(Cadence::FiveMinute, ts(2006, 12, 31, 23), OMNI_DATA_BASE_URL).unwrap();
        assert_eq!(five.period_start, ts(2006, 12, 1, 0));
        assert_eq!(five.period_end_exclusive, ts(2007, 1, 1, 0));
        assert!(five.url.ends_with("high_res_omni/omni_5min2006.asc"));

        let one = resolve_period_file(Cadence::OneMinute, ts(2006, 2, 10, 0), "http://mirror/omni/").unwrap();
        assert_eq!(one.url, "http://mirror/omni/high_res_omni/monthly_1min/omni_min200602.asc");
        assert_eq!(one.relative_path, PathBuf::from("1min/omni_min200602.asc"));
        assert!(one.contains(ts(2006, 2, 28, 23)));
        assert!(!one.contains(ts(2006, 3, 1, 0)));
    }

    #[test]
    fn window_is_shifted_into_published_range() {
        let earliest = earliest_published(Cadence::Hourly);
        let (start, end) = shift_into_window(ts(1962, 12, 30, 0), ts(1963, 1, 2, 0), earliest, None);
        assert_eq!((start, end), (ts(1963, 1, 1, 0), ts(1963, 1, 4, 0)));

        let latest = Some(ts(2020, 1, 1, 0));
        let (start, end) = shift_into_window(ts(2019, 12, 31, 0), ts(2020, 1, 3, 0), earliest, latest);
        assert_eq!((start, end), (ts(2019, 12, 29, 0), ts(2020, 1, 1, 0)));

        let inside = (ts(2006, 3, 10, 0), ts(2006, 3, 11, 0));
        assert_eq!(shift_into_window(inside.0, inside.1, earliest, latest), inside);
    }

    #[test]
    fn acquire_restricts_rows_to_period_and_caches_product() {
        let temp = tempdir().unwrap();
        let period = resolve_period_file(Cadence::Hourly, ts(2006, 3, 1, 0), OMNI_DATA_BASE_URL).unwrap();
        let mock = std::rc::Rc::new(MockFetcher::default().with(&period.url, hourly_product().as_bytes()));
        let archive = OmniArchive::with_fetcher(cfg(temp.path()), Box::new(SharedMock(mock.clone())));

        let first_half = archive.acquire(Cadence::Hourly, ts(2006, 3, 1, 0), false).unwrap();
        assert_eq!(first_half.len(), 12);
        assert_eq!(first_half.epochs()[0], ts(2006, 1, 1, 0));
        assert_eq!(first_half.epochs()[11], ts(2006, 6, 15, 0));
        assert_eq!(first_half.label(), "omni2_2006.dat@2006-01");
        assert_eq!(mock.calls.get(), 1);

        let second_half = archive.acquire(Cadence::Hourly, ts(2006, 8, 1, 0), false).unwrap();
        assert_eq!(second_half.epochs()[0], ts(2006, 7, 1, 0));
        assert_eq!(mock.calls.get(), 1, "same product served from cache");
        assert_eq!(
            second_half.attrs().period.as_deref(),
            Some("2006-07-01/2007-01-01")
        );

        archive.acquire(Cadence::Hourly, ts(2006, 8, 1, 0), true).unwrap();
        assert_eq!(mock.calls.get(), 2, "force refresh downloads again");
    }

    #[test]
    fn cache_hit_skips_download() {
        let temp = tempdir().unwrap();
        let archive = OmniArchive::with_fetcher(cfg(temp.path()), Box::new(MockFetcher::default()));
        let period = archive.period_file(Cadence::Hourly, ts(2006, 3, 1, 0)).unwrap();
        let path = temp.path().join(&period.relative_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, hourly_product()).unwrap();

        let local = archive.sync_period(&period, false).unwrap();
        assert_eq!(local.source, LocalProductSource::Cached);
        assert_eq!(local.local_path, path);
    }

    #[test]
    fn failed_fetch_is_retried_then_reported() {
        let temp = tempdir().unwrap();
        let mock = std::rc::Rc::new(MockFetcher::default());
        let archive = OmniArchive::with_fetcher(
            ArchiveConfig {
                max_retries: 2,
                ..cfg(temp.path())
            },
            Box::new(SharedMock(mock.clone())),
        );

        let err = acquire_err(&archive, Cadence::FiveMinute, ts(2006, 3, 1, 0));
        assert!(matches!(err, ArchiveError::HttpRequest { .. }));
        assert_eq!(mock.calls.get(), 3);
    }

    #[test]
    fn timeouts_are_retried_then_surface_as_data_unavailable() {
        let temp = tempdir().unwrap();
        let mock = std::rc::Rc::new(MockFetcher::timing_out());
        let max_retries = 2;
        let archive = OmniArchive::with_fetcher(
            ArchiveConfig {
                max_retries,
                ..cfg(temp.path())
            },
            Box::new(SharedMock(mock.clone())),
        );

        let err = Interval::open(&archive, ts(2006, 3, 10, 0), ts(2006, 3, 11, 0), Cadence::Hourly)
            .unwrap_err();
        assert!(matches!(
            err,
            IntervalError::DataUnavailable(ArchiveError::HttpTimeout { .. })
        ));
        assert_eq!(mock.calls.get(), max_retries as usize + 1);
        assert!(!temp.path().join("hourly/omni2_2006.dat").exists());
    }

    #[test]
    fn request_past_the_last_published_record_is_data_unavailable() {
        let temp = tempdir().unwrap();
        let period = resolve_period_file(Cadence::Hourly, ts(2026, 9, 1, 0), OMNI_DATA_BASE_URL).unwrap();
        // Current-year product that stops at 2026-09-30 23:00.
        let partial_year = (0..24)
            .map(|hour| hourly_line(ts(2026, 9, 30, hour), -2.0))
            .collect::<Vec<_>>()
            .join("\n");
        let archive = OmniArchive::with_fetcher(
            cfg(temp.path()),
            Box::new(MockFetcher::default().with(&period.url, partial_year.as_bytes())),
        );

        let err = Interval::open(&archive, ts(2026, 9, 30, 12), ts(2026, 10, 2, 0), Cadence::Hourly)
            .unwrap_err();
        match err {
            IntervalError::DataUnavailable(ArchiveError::NotPublished { cadence, at }) => {
                assert_eq!(cadence, Cadence::Hourly);
                assert_eq!(at, ts(2026, 10, 1, 23));
            }
            other => panic!("expected data unavailable, got {other:?}"),
        }

        let served = Interval::open(&archive, ts(2026, 9, 30, 0), ts(2026, 9, 30, 12), Cadence::Hourly)
            .unwrap();
        assert_eq!(served.len(), 12);
    }

    #[test]
    fn unpublished_periods_are_rejected() {
        let temp = tempdir().unwrap();
        let archive = OmniArchive::with_fetcher(
            ArchiveConfig {
                latest_available: Some(ts(2010, 1, 1, 0)),
                ..cfg(temp.path())
            },
            Box::new(MockFetcher::default()),
        );

        assert!(matches!(
            acquire_err(&archive, Cadence::FiveMinute, ts(1980, 6, 1, 0)),
            ArchiveError::NotPublished { .. }
        ));
        assert!(matches!(
            acquire_err(&archive, Cadence::Hourly, ts(2011, 6, 1, 0)),
            ArchiveError::NotPublished { .. }
        ));
    }

    #[test]
    fn period_without_records_is_an_error() {
        let temp = tempdir().unwrap();
        let period = resolve_period_file(Cadence::Hourly, ts(2006, 3, 1, 0), OMNI_DATA_BASE_URL).unwrap();
        let only_july = hourly_line(ts(2006, 7, 1, 0), 1.0);
        let archive = OmniArchive::with_fetcher(
            cfg(temp.path()),
            Box::new(MockFetcher::default().with(&period.url, only_july.as_bytes())),
        );

        assert!(matches!(
            acquire_err(&archive, Cadence::Hourly, ts(2006, 3, 1, 0)),
            ArchiveError::EmptyPeriod { .. }
        ));
    }

    #[test]
    fn config_reads_env_overrides() {
        std::env::set_var("OMNI_DATA_ROOT", "/tmp/omni-cache");
        std::env::set_var("OMNI_BASE_URL", "http://mirror.example/omni/");
        std::env::set_var("OMNI_HTTP_TIMEOUT_MS", "500");
        std::env::set_var("OMNI_MAX_RETRIES", "not-a-number");
        let cfg = archive_config_from_env();
        for key in [
            "OMNI_DATA_ROOT",
            "OMNI_BASE_URL",
            "OMNI_HTTP_TIMEOUT_MS",
            "OMNI_MAX_RETRIES",
        ] {
            std::env::remove_var(key);
        }

        assert_eq!(cfg.data_root, PathBuf::from("/tmp/omni-cache"));
        assert_eq!(cfg.base_url, "http://mirror.example/omni");
        assert_eq!(cfg.http_timeout_ms, 500);
        assert_eq!(cfg.max_retries, ArchiveConfig::default().max_retries);
    }
}
