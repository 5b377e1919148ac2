use std::path::PathBuf;

use omni::{
    archive_config_from_env, init_logging, log_app_start, log_archive_config,
    logging_config_from_env, parse_cadence, parse_event_center, EventCenter, EventSet,
    EventSetConfig, OmniArchive, VarAttr, DEFAULT_NDAYS,
};

const COMPONENT: &str = "omni_sea_stats";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg, COMPONENT);

    let centers = parse_centers()?;
    let variable = std::env::var("OMNI_SEA_VARIABLE").unwrap_or_else(|_| "BZ_GSM".to_string());
    let cadence = match std::env::var("OMNI_SEA_CADENCE") {
        Ok(raw) => parse_cadence(&raw)?,
        Err(_) => EventSetConfig::default().cadence,
    };
    let ndays = match std::env::var("OMNI_SEA_NDAYS") {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("OMNI_SEA_NDAYS must be a whole number of days, got '{raw}'"))?,
        Err(_) => DEFAULT_NDAYS,
    };
    let out_dir = std::env::var("OMNI_SEA_OUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let name = std::env::var("OMNI_SEA_NAME").ok().filter(|name| !name.trim().is_empty());

    let archive_cfg = archive_config_from_env();
    log_archive_config(&archive_cfg, COMPONENT);
    let archive = OmniArchive::new(archive_cfg)?;

    let set = EventSet::build(
        &archive,
        &centers,
        EventSetConfig {
            name,
            ndays,
            cadence,
        },
    )?;

    std::fs::create_dir_all(&out_dir)?;
    let path = set.dump_stats(&variable, &out_dir, None, None)?;
    let stats = set.stats(&variable, &set.default_offsets())?;
    let units = set.get_var_attr(&variable, VarAttr::Units)?;

    let summary = serde_json::json!({
        "variable": variable,
        "units": units,
        "cadence": cadence.as_str(),
        "events": set.len(),
        "first_event": set.events().first().map(|event| event.label().to_string()),
        "last_event": set.events().last().map(|event| event.label().to_string()),
        "offsets": stats.offsets.len(),
        "output": path.display().to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    set.close();
    Ok(())
}

/// `OMNI_SEA_CENTERS` holds comma separated `YYYY-MM-DDTHH:MM` timestamps.
fn parse_centers() -> Result<Vec<EventCenter>, Box<dyn std::error::Error>> {
    let raw = std::env::var("OMNI_SEA_CENTERS")
        .map_err(|_| "OMNI_SEA_CENTERS is required (e.g. 2006-12-14T14:00,2003-10-29T06:00)")?;
    let centers = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_event_center)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(centers)
}
