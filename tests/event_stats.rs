mod common;

use std::fs;

use common::{ts, SyntheticArchive};
use omni::{
    AttrValue, Cadence, EventCenter, EventError, EventSet, EventSetConfig, VarAttr,
};

fn hourly_config(name: Option<&str>) -> EventSetConfig {
    EventSetConfig {
        name: name.map(str::to_string),
        ndays: 1,
        cadence: Cadence::Hourly,
    }
}

fn storm_centers() -> Vec<EventCenter> {
    vec![
        EventCenter::new(ts(2006, 3, 10, 6, 0)),
        EventCenter::new(ts(2006, 3, 20, 12, 0)),
        EventCenter::new(ts(2006, 4, 5, 18, 0)),
    ]
}

#[test]
fn events_span_center_plus_minus_ndays_with_date_labels() {
    let archive = SyntheticArchive::new();
    let set = EventSet::build(&archive, &storm_centers(), hourly_config(None)).unwrap();

    assert_eq!(set.len(), 3);
    let first = &set.events()[0];
    assert_eq!(first.label(), "03-09-2006-03-11-2006");
    assert_eq!(first.start(), ts(2006, 3, 9, 6, 0));
    assert_eq!(first.end(), ts(2006, 3, 11, 6, 0));
    assert_eq!(first.interval().len(), 48);
    assert_eq!(first.jd().len(), 48);

    let labelled = EventCenter::new(ts(2006, 3, 10, 6, 0)).with_label("cme-a");
    let set = EventSet::build(&archive, &[labelled], hourly_config(None)).unwrap();
    assert_eq!(set.events()[0].label(), "cme-a");
}

#[test]
fn quartiles_across_events_at_the_center() {
    let archive = SyntheticArchive::new();
    let set = EventSet::build(&archive, &storm_centers(), hourly_config(None)).unwrap();

    // V is 400 + hour, so the three centers read 406, 412 and 418.
    let stats = set.stats("V", &[0.0]).unwrap();
    assert_eq!(stats.events, 3);
    assert!((stats.lower_quartile[0] - 409.0).abs() < 1e-9);
    assert!((stats.median[0] - 412.0).abs() < 1e-9);
    assert!((stats.upper_quartile[0] - 415.0).abs() < 1e-9);

    let rows = set.interpolated("V", &[0.0, 0.25]).unwrap();
    assert_eq!(rows.len(), 3);
    assert!((rows[0][1] - 412.0).abs() < 1e-6);
}

#[test]
fn event_without_usable_samples_contributes_missing_row() {
    let blanked = ts(2006, 5, 10, 12, 0);
    let archive =
        SyntheticArchive::new().with_fill("V", ts(2006, 5, 9, 0, 0), ts(2006, 5, 12, 0, 0));
    let mut centers = storm_centers();
    centers.push(EventCenter::new(blanked));
    let set = EventSet::build(&archive, &centers, hourly_config(None)).unwrap();

    let err = set.events()[3].interpolant("V").unwrap_err();
    assert!(matches!(
        err,
        EventError::InsufficientData { points: 0, .. }
    ));

    let rows = set.interpolated("V", &[0.0]).unwrap();
    assert!(rows[3][0].is_nan());
    let stats = set.stats("V", &[0.0]).unwrap();
    assert_eq!(stats.events, 4);
    assert!((stats.median[0] - 412.0).abs() < 1e-9);
}

#[test]
fn interpolants_are_cached_per_variable() {
    let archive = SyntheticArchive::new();
    let set = EventSet::build(&archive, &storm_centers(), hourly_config(None)).unwrap();
    let event = &set.events()[0];

    assert!(!event.has_interpolant("V"));
    let reads_before = archive.reads_of("V");
    let first = event.interpolant("V").unwrap();
    let reads_after = archive.reads_of("V");
    let second = event.interpolant("V").unwrap();

    assert!(event.has_interpolant("V"));
    assert!(!event.has_interpolant("BZ_GSM"));
    assert!(reads_after > reads_before);
    assert_eq!(archive.reads_of("V"), reads_after);
    assert!(std::rc::Rc::ptr_eq(&first, &second));
}

#[test]
fn dump_stats_writes_header_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let archive = SyntheticArchive::new();
    let set =
        EventSet::build(&archive, &storm_centers(), hourly_config(Some("storms 2006"))).unwrap();

    let path = set.dump_stats("V", dir.path(), None, Some(&[0.0])).unwrap();
    assert_eq!(path, dir.path().join("storms_2006_V_stats.csv"));

    let written = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines[0], "# storms 2006: ");
    assert_eq!(lines[1], "# Omni Cadence: hourly");
    assert_eq!(lines[2], "# First Event: 03-09-2006-03-11-2006");
    assert_eq!(lines[3], "# Last Event: 04-04-2006-04-06-2006");
    assert!(lines[4].starts_with("# Generated: "));
    assert_eq!(
        lines[5],
        "# Column 1: Time since center time / zero epoch hour [days] "
    );
    assert_eq!(lines[7], "# Column 3: 50th Percentile / Median of V ");
    assert_eq!(lines[9], "0.00000,4.090000e+02,4.120000e+02,4.150000e+02");
    assert_eq!(lines.len(), 10);
}

#[test]
fn dump_stats_defaults_name_and_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let archive = SyntheticArchive::new();
    let set = EventSet::build(&archive, &storm_centers(), hourly_config(None)).unwrap();

    let path = set.dump_stats("BZ_GSM", dir.path(), None, None).unwrap();
    assert_eq!(path, dir.path().join("event_set_BZ_GSM_stats.csv"));

    let written = fs::read_to_string(&path).unwrap();
    let rows: Vec<&str> = written
        .lines()
        .filter(|line| !line.starts_with('#'))
        .collect();
    assert_eq!(rows.len(), set.default_offsets().len());
    assert!(rows[0].starts_with("-1.00000,"));
    assert!(!written.contains("event_set: "));

    let custom = set
        .dump_stats("BZ_GSM", dir.path(), Some("bz quick.csv"), Some(&[-0.5, 0.5]))
        .unwrap();
    assert_eq!(custom, dir.path().join("bz_quick.csv"));
}

#[test]
fn empty_center_list_is_rejected() {
    let archive = SyntheticArchive::new();
    let err = EventSet::build(&archive, &[], hourly_config(None)).unwrap_err();
    assert!(matches!(err, EventError::NoEvents));
}

#[test]
fn attributes_come_from_the_first_event() {
    let archive = SyntheticArchive::new();
    let set = EventSet::build(&archive, &storm_centers(), hourly_config(None)).unwrap();

    assert_eq!(
        set.get_var_attr("V", VarAttr::Units).unwrap(),
        Some(AttrValue::Text("km/s".to_string()))
    );
    assert_eq!(
        set.attrs().and_then(|attrs| attrs.period.clone()).as_deref(),
        Some("2006-01")
    );
    set.close();
}
