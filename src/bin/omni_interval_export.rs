use std::io;

use chrono::{DateTime, NaiveDateTime, Utc};
use omni::{
    archive_config_from_env, init_logging, log_app_start, log_archive_config,
    logging_config_from_env, parse_cadence, Cadence, Interval, LaggedSmoothedView, OmniArchive,
    DEFAULT_AVERAGE_MINUTES, DEFAULT_DELAY_MINUTES,
};

const COMPONENT: &str = "omni_interval_export";

/// Writes `Epoch` plus the requested variables as CSV on stdout.
///
/// `OMNI_EXPORT_START` / `OMNI_EXPORT_END` bound the window,
/// `OMNI_EXPORT_VARIABLES` lists variables, `OMNI_EXPORT_CADENCE` selects the
/// cadence and `OMNI_EXPORT_LAGGED=1` switches to the delayed, smoothed view
/// (`OMNI_EXPORT_DELAY_MINUTES`, `OMNI_EXPORT_AVERAGE_MINUTES`).
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg, COMPONENT);

    let start = parse_time_var("OMNI_EXPORT_START")?;
    let end = parse_time_var("OMNI_EXPORT_END")?;
    let cadence = match std::env::var("OMNI_EXPORT_CADENCE") {
        Ok(raw) => parse_cadence(&raw)?,
        Err(_) => Cadence::Hourly,
    };
    let variables: Vec<String> = std::env::var("OMNI_EXPORT_VARIABLES")
        .unwrap_or_else(|_| "BZ_GSM,V,newell".to_string())
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    let lagged = std::env::var("OMNI_EXPORT_LAGGED")
        .map(|raw| matches!(raw.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);

    let archive_cfg = archive_config_from_env();
    log_archive_config(&archive_cfg, COMPONENT);
    let archive = OmniArchive::new(archive_cfg)?;

    let (epochs, columns) = if lagged {
        let delay = parse_minutes_var("OMNI_EXPORT_DELAY_MINUTES", DEFAULT_DELAY_MINUTES)?;
        let average = parse_minutes_var("OMNI_EXPORT_AVERAGE_MINUTES", DEFAULT_AVERAGE_MINUTES)?;
        let view = LaggedSmoothedView::open(&archive, start, end, cadence, delay, average)?;
        let columns = variables
            .iter()
            .map(|name| view.get(name))
            .collect::<Result<Vec<_>, _>>()?;
        let epochs = view.epochs();
        view.close();
        (epochs, columns)
    } else {
        let interval = Interval::open(&archive, start, end, cadence)?;
        for adjustment in interval.adjustments() {
            eprintln!("window adjusted: {}", serde_json::to_string(adjustment)?);
        }
        let columns = variables
            .iter()
            .map(|name| interval.get(name))
            .collect::<Result<Vec<_>, _>>()?;
        let epochs = interval.epochs();
        interval.close();
        (epochs, columns)
    };

    let mut writer = csv::Writer::from_writer(io::stdout().lock());
    let mut header = vec!["Epoch".to_string()];
    header.extend(variables.iter().cloned());
    writer.write_record(&header)?;
    for (row, epoch) in epochs.iter().enumerate() {
        let mut record = vec![epoch.format("%Y-%m-%dT%H:%M:%SZ").to_string()];
        record.extend(columns.iter().map(|values| values[row].to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_time_var(key: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let raw = std::env::var(key).map_err(|_| format!("{key} is required (YYYY-MM-DDTHH:MM)"))?;
    let parsed = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M")
        .map_err(|err| format!("{key}: invalid timestamp '{raw}': {err}"))?;
    Ok(parsed.and_utc())
}

fn parse_minutes_var(key: &str, default: i64) -> Result<i64, Box<dyn std::error::Error>> {
    match std::env::var(key) {
        Ok(raw) => Ok(raw
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("{key} must be whole minutes, got '{raw}'"))?),
        Err(_) => Ok(default),
    }
}
