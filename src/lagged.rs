//! Causally delayed and backward-smoothed reads over an [`Interval`].

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::archive::SourceAcquirer;
use crate::cadence::Cadence;
use crate::catalog::EPOCH;
use crate::interval::{Interval, IntervalError};

pub const DEFAULT_DELAY_MINUTES: i64 = 10;
pub const DEFAULT_AVERAGE_MINUTES: i64 = 45;

/// Wraps an interval opened `delay + average + 1` minutes before the caller's
/// start so that the delayed, smoothed series covers `[start, end]`.
///
/// Returned arrays keep the wrapped interval's length, lookback included.
#[derive(Debug)]
pub struct LaggedSmoothedView {
    interval: Interval,
    requested_start: DateTime<Utc>,
    requested_end: DateTime<Utc>,
    delay_minutes: i64,
    average_minutes: i64,
}

impl LaggedSmoothedView {
    pub fn open(
        acquirer: &dyn SourceAcquirer,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cadence: Cadence,
        delay_minutes: i64,
        average_minutes: i64,
    ) -> Result<Self, IntervalError> {
        Self::open_with(start, end, cadence, delay_minutes, average_minutes, |s, e, c| {
            Interval::open(acquirer, s, e, c)
        })
    }

    /// Like [`LaggedSmoothedView::open`] with a caller supplied interval
    /// constructor.
    pub fn open_with<F>(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cadence: Cadence,
        delay_minutes: i64,
        average_minutes: i64,
        factory: F,
    ) -> Result<Self, IntervalError>
    where
        F: FnOnce(DateTime<Utc>, DateTime<Utc>, Cadence) -> Result<Interval, IntervalError>,
    {
        if start >= end {
            return Err(IntervalError::InvalidRange { start, end });
        }
        let lookback = lookback(delay_minutes, average_minutes);
        let interval = factory(start - lookback, end, cadence)?;

        info!(
            component = "lagged",
            event = "lagged.open",
            cadence = cadence.as_str(),
            start = %start,
            end = %end,
            delay_minutes,
            average_minutes,
            rows = interval.len()
        );

        Ok(Self {
            interval,
            requested_start: start,
            requested_end: end,
            delay_minutes,
            average_minutes,
        })
    }

    /// `Epoch` passes through untouched; every other variable is delayed and
    /// then backward smoothed.
    pub fn get(&self, name: &str) -> Result<Vec<f64>, IntervalError> {
        let raw = self.interval.get(name)?;
        if name == EPOCH {
            return Ok(raw);
        }

        let spacing = self.sample_spacing_minutes()?;
        let delay = minutes_to_samples(self.delay_minutes, spacing);
        let average = minutes_to_samples(self.average_minutes, spacing);
        debug!(
            component = "lagged",
            event = "lagged.get",
            variable = name,
            spacing_minutes = spacing,
            delay_samples = delay,
            average_samples = average
        );

        Ok(backward_smooth(&delay_samples(&raw, delay), average))
    }

    pub fn epochs(&self) -> Vec<DateTime<Utc>> {
        self.interval.epochs()
    }

    pub fn sample_spacing_minutes(&self) -> Result<f64, IntervalError> {
        median_spacing_minutes(&self.interval.epochs())
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn requested_start(&self) -> DateTime<Utc> {
        self.requested_start
    }

    pub fn requested_end(&self) -> DateTime<Utc> {
        self.requested_end
    }

    pub fn delay_minutes(&self) -> i64 {
        self.delay_minutes
    }

    pub fn average_minutes(&self) -> i64 {
        self.average_minutes
    }

    pub fn close(self) {
        self.interval.close();
    }
}

pub fn lookback(delay_minutes: i64, average_minutes: i64) -> Duration {
    Duration::minutes(delay_minutes + average_minutes + 1)
}

/// Median gap between consecutive timestamps, in minutes.
pub fn median_spacing_minutes(epochs: &[DateTime<Utc>]) -> Result<f64, IntervalError> {
    let mut diffs: Vec<f64> = epochs
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 60_000.0)
        .collect();
    if diffs.is_empty() {
        return Err(IntervalError::DegenerateTimebase {
            spacing_minutes: 0.0,
        });
    }

    diffs.sort_by(f64::total_cmp);
    let mid = diffs.len() / 2;
    let median = if diffs.len() % 2 == 0 {
        (diffs[mid - 1] + diffs[mid]) / 2.0
    } else {
        diffs[mid]
    };

    if median <= 0.0 {
        return Err(IntervalError::DegenerateTimebase {
            spacing_minutes: median,
        });
    }
    Ok(median)
}

/// Sample count covering `minutes`, rounding half to even.
pub fn minutes_to_samples(minutes: i64, spacing_minutes: f64) -> usize {
    let samples = (minutes as f64 / spacing_minutes).round_ties_even();
    if samples.is_finite() && samples > 0.0 {
        samples as usize
    } else {
        0
    }
}

/// Circular shift by `n`: sample `i` takes the value of sample
/// `(i + n) % len`, so the last `n` samples wrap around to the start. The
/// first `n` samples are missing.
pub fn delay_samples(values: &[f64], n: usize) -> Vec<f64> {
    let len = values.len();
    if len == 0 {
        return Vec::new();
    }
    let shift = n % len;
    let mut out: Vec<f64> = (0..len).map(|i| values[(i + shift) % len]).collect();
    for value in out.iter_mut().take(n) {
        *value = f64::NAN;
    }
    out
}

/// NaN-ignoring mean of each sample and its `k - 1` predecessors. The first
/// `k` samples are missing; `k == 0` returns the input unchanged.
pub fn backward_smooth(values: &[f64], k: usize) -> Vec<f64> {
    let len = values.len();
    if k == 0 || len == 0 {
        return values.to_vec();
    }

    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        if i < k {
            out.push(f64::NAN);
            continue;
        }
        let (sum, count) = (0..k)
            .map(|lag| values[i - lag])
            .filter(|value| !value.is_nan())
            .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
        out.push(if count == 0 { f64::NAN } else { sum / count as f64 });
    }
    out
}
