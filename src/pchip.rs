//! Piecewise cubic Hermite interpolation with Fritsch-Carlson slopes.
//!
//! Interior slopes are the weighted harmonic mean of neighbouring secants,
//! zero at local extrema. End slopes use the one-sided three-point rule,
//! limited to keep the end segments monotone. Points outside the knots are
//! extrapolated with the nearest end polynomial.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PchipError {
    #[error("need at least 2 points, found {found}")]
    TooFewPoints { found: usize },
    #[error("x has {x} values, y has {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("x must be finite and strictly increasing (index {index})")]
    NotIncreasing { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pchip {
    x: Vec<f64>,
    y: Vec<f64>,
    slopes: Vec<f64>,
}

impl Pchip {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, PchipError> {
        if x.len() != y.len() {
            return Err(PchipError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(PchipError::TooFewPoints { found: x.len() });
        }
        if let Some(index) = x.iter().position(|value| !value.is_finite()) {
            return Err(PchipError::NotIncreasing { index });
        }
        if let Some(index) = x.windows(2).position(|pair| pair[1] <= pair[0]) {
            return Err(PchipError::NotIncreasing { index: index + 1 });
        }

        let slopes = slopes(&x, &y);
        Ok(Self { x, y, slopes })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn eval(&self, at: f64) -> f64 {
        if at.is_nan() {
            return f64::NAN;
        }
        let last_segment = self.x.len() - 2;
        let k = self
            .x
            .partition_point(|knot| *knot <= at)
            .saturating_sub(1)
            .min(last_segment);

        let h = self.x[k + 1] - self.x[k];
        let secant = (self.y[k + 1] - self.y[k]) / h;
        let (d0, d1) = (self.slopes[k], self.slopes[k + 1]);
        let c2 = (3.0 * secant - 2.0 * d0 - d1) / h;
        let c3 = (d0 + d1 - 2.0 * secant) / (h * h);

        let t = at - self.x[k];
        self.y[k] + t * (d0 + t * (c2 + t * c3))
    }

    pub fn eval_many(&self, at: &[f64]) -> Vec<f64> {
        at.iter().map(|value| self.eval(*value)).collect()
    }
}

fn slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let m: Vec<f64> = y
        .windows(2)
        .zip(&h)
        .map(|(pair, h)| (pair[1] - pair[0]) / h)
        .collect();

    if n == 2 {
        return vec![m[0], m[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        let (m_prev, m_next) = (m[k - 1], m[k]);
        if m_prev.signum() != m_next.signum() || m_prev == 0.0 || m_next == 0.0 {
            continue;
        }
        let w1 = 2.0 * h[k] + h[k - 1];
        let w2 = h[k] + 2.0 * h[k - 1];
        d[k] = (w1 + w2) / (w1 / m_prev + w2 / m_next);
    }

    d[0] = end_slope(h[0], h[1], m[0], m[1]);
    d[n - 1] = end_slope(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    d
}

fn end_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if sign(d) != sign(m0) {
        0.0
    } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}
