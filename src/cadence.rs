//! Sampling cadences published by the OMNI archive.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cadence {
    Hourly,
    FiveMinute,
    OneMinute,
}

pub const ALL_CADENCES: [Cadence; 3] = [Cadence::Hourly, Cadence::FiveMinute, Cadence::OneMinute];

impl Cadence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::FiveMinute => "5min",
            Self::OneMinute => "1min",
        }
    }

    /// Nominal spacing between consecutive records.
    pub fn step(self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::FiveMinute => Duration::minutes(5),
            Self::OneMinute => Duration::minutes(1),
        }
    }

    /// Hourly records use the low-resolution OMNI2 names (`N`, `V`, `DST`),
    /// the high-resolution products use `proton_density`, `flow_speed`, `SYM_H`.
    pub fn is_low_resolution(self) -> bool {
        matches!(self, Self::Hourly)
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CadenceError {
    #[error("invalid cadence: {0}")]
    InvalidCadence(String),
}

pub fn parse_cadence(input: &str) -> Result<Cadence, CadenceError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "hourly" | "1h" => Ok(Cadence::Hourly),
        "5min" | "5m" => Ok(Cadence::FiveMinute),
        "1min" | "1m" => Ok(Cadence::OneMinute),
        _ => Err(CadenceError::InvalidCadence(input.to_string())),
    }
}
