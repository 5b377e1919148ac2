//! OMNI ASCII record parsing.
//!
//! Low-resolution hourly files (`omni2_YYYY.dat`) and high-resolution
//! 5-minute/1-minute files (`omni_5minYYYY.asc`, `omni_minYYYYMM.asc`) are
//! whitespace-delimited with fixed word positions. Each named column carries
//! the fill sentinel tabulated in the OMNI format description.

use chrono::{DateTime, NaiveDate, Utc};

use crate::archive::ArchiveError;
use crate::cadence::Cadence;
use crate::table::{ColumnMeta, MemoryTable};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// Zero-based word position in a record.
    pub index: usize,
    pub fill: f64,
    pub units: Option<&'static str>,
    pub description: &'static str,
}

impl ColumnSpec {
    const fn new(
        name: &'static str,
        index: usize,
        fill: f64,
        units: Option<&'static str>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            index,
            fill,
            units,
            description,
        }
    }

    pub fn meta(&self) -> ColumnMeta {
        let meta = ColumnMeta::new(self.name)
            .with_fill(self.fill)
            .with_description(self.description);
        match self.units {
            Some(units) => meta.with_units(units),
            None => meta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLayout {
    pub product: &'static str,
    /// Word position of the minute field; hourly records have none.
    pub minute_field: Option<usize>,
    pub columns: &'static [ColumnSpec],
}

impl TextLayout {
    pub fn min_fields(&self) -> usize {
        let data = self.columns.iter().map(|spec| spec.index + 1).max();
        let time = self.minute_field.map(|idx| idx + 1).unwrap_or(3);
        data.unwrap_or(0).max(time)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|spec| spec.name == name)
    }
}

const NT: Option<&str> = Some("nT");

pub const HOURLY_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("ABS_B", 8, 999.9, NT, "Field magnitude average"),
    ColumnSpec::new("F", 9, 999.9, NT, "Magnitude of average field vector"),
    ColumnSpec::new("THETA_AV", 10, 999.9, Some("deg"), "Latitude angle of average field vector"),
    ColumnSpec::new("PHI_AV", 11, 999.9, Some("deg"), "Longitude angle of average field vector"),
    ColumnSpec::new("BX_GSE", 12, 999.9, NT, "Bx, GSE/GSM"),
    ColumnSpec::new("BY_GSE", 13, 999.9, NT, "By, GSE"),
    ColumnSpec::new("BZ_GSE", 14, 999.9, NT, "Bz, GSE"),
    ColumnSpec::new("BY_GSM", 15, 999.9, NT, "By, GSM"),
    ColumnSpec::new("BZ_GSM", 16, 999.9, NT, "Bz, GSM"),
    ColumnSpec::new("T", 22, 9_999_999.0, Some("K"), "Proton temperature"),
    ColumnSpec::new("N", 23, 999.9, Some("n/cc"), "Proton density"),
    ColumnSpec::new("V", 24, 9999.0, Some("km/s"), "Plasma flow speed"),
    ColumnSpec::new("Ratio", 27, 9.999, None, "Alpha/proton ratio"),
    ColumnSpec::new("Pressure", 28, 99.99, Some("nPa"), "Flow pressure"),
    ColumnSpec::new("E", 35, 999.99, Some("mV/m"), "Electric field"),
    ColumnSpec::new("Beta", 36, 999.99, None, "Plasma beta"),
    ColumnSpec::new("Mach_num", 37, 999.9, None, "Alfven Mach number"),
    ColumnSpec::new("KP", 38, 99.0, None, "Kp*10"),
    ColumnSpec::new("R", 39, 999.0, None, "Sunspot number"),
    ColumnSpec::new("DST", 40, 99_999.0, NT, "Dst index"),
    ColumnSpec::new("AE", 41, 9999.0, NT, "AE index"),
    ColumnSpec::new("AP_INDEX", 49, 999.0, NT, "ap index"),
    ColumnSpec::new("F10_INDEX", 50, 999.9, Some("sfu"), "F10.7 index"),
    ColumnSpec::new("PC_N_INDEX", 51, 999.9, None, "Polar cap (North) index"),
    ColumnSpec::new("AL_INDEX", 52, 99_999.0, NT, "AL index"),
    ColumnSpec::new("AU_INDEX", 53, 99_999.0, NT, "AU index"),
    ColumnSpec::new("Mgs_mach_num", 54, 99.9, None, "Magnetosonic Mach number"),
];

pub const HIGH_RES_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("F", 13, 9999.99, NT, "Field magnitude average"),
    ColumnSpec::new("BX_GSE", 14, 9999.99, NT, "Bx, GSE/GSM"),
    ColumnSpec::new("BY_GSE", 15, 9999.99, NT, "By, GSE"),
    ColumnSpec::new("BZ_GSE", 16, 9999.99, NT, "Bz, GSE"),
    ColumnSpec::new("BY_GSM", 17, 9999.99, NT, "By, GSM"),
    ColumnSpec::new("BZ_GSM", 18, 9999.99, NT, "Bz, GSM"),
    ColumnSpec::new("flow_speed", 21, 99_999.9, Some("km/s"), "Flow speed"),
    ColumnSpec::new("Vx", 22, 99_999.9, Some("km/s"), "Vx velocity, GSE"),
    ColumnSpec::new("Vy", 23, 99_999.9, Some("km/s"), "Vy velocity, GSE"),
    ColumnSpec::new("Vz", 24, 99_999.9, Some("km/s"), "Vz velocity, GSE"),
    ColumnSpec::new("proton_density", 25, 999.99, Some("n/cc"), "Proton density"),
    ColumnSpec::new("T", 26, 9_999_999.0, Some("K"), "Temperature"),
    ColumnSpec::new("Pressure", 27, 99.99, Some("nPa"), "Flow pressure"),
    ColumnSpec::new("E", 28, 999.99, Some("mV/m"), "Electric field"),
    ColumnSpec::new("Beta", 29, 999.99, None, "Plasma beta"),
    ColumnSpec::new("Mach_num", 30, 999.9, None, "Alfven Mach number"),
    ColumnSpec::new("AE_INDEX", 37, 99_999.0, NT, "AE index"),
    ColumnSpec::new("AL_INDEX", 38, 99_999.0, NT, "AL index"),
    ColumnSpec::new("AU_INDEX", 39, 99_999.0, NT, "AU index"),
    ColumnSpec::new("SYM_D", 40, 99_999.0, NT, "SYM/D index"),
    ColumnSpec::new("SYM_H", 41, 99_999.0, NT, "SYM/H index"),
    ColumnSpec::new("ASY_D", 42, 99_999.0, NT, "ASY/D index"),
    ColumnSpec::new("ASY_H", 43, 99_999.0, NT, "ASY/H index"),
    ColumnSpec::new("PC_N_INDEX", 44, 999.99, None, "Polar cap (North) index"),
    ColumnSpec::new("Mgs_mach_num", 45, 99.9, None, "Magnetosonic Mach number"),
];

pub const HOURLY_LAYOUT: TextLayout = TextLayout {
    product: "OMNI2 hourly",
    minute_field: None,
    columns: HOURLY_COLUMNS,
};

pub const HIGH_RES_LAYOUT: TextLayout = TextLayout {
    product: "OMNI HRO",
    minute_field: Some(3),
    columns: HIGH_RES_COLUMNS,
};

pub fn layout_for(cadence: Cadence) -> &'static TextLayout {
    match cadence {
        Cadence::Hourly => &HOURLY_LAYOUT,
        Cadence::FiveMinute | Cadence::OneMinute => &HIGH_RES_LAYOUT,
    }
}

/// Parses every record of an OMNI ASCII file. Blank lines are skipped;
/// records must be in time order.
pub fn parse_omni_text(
    cadence: Cadence,
    label: &str,
    text: &str,
) -> Result<MemoryTable, ArchiveError> {
    let layout = layout_for(cadence);
    let min_fields = layout.min_fields();

    let mut epochs: Vec<DateTime<Utc>> = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); layout.columns.len()];

    for (line_idx, line) in text.lines().enumerate() {
        let line_no = line_idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < min_fields {
            return Err(ArchiveError::InvalidRecordColumns {
                line: line_no,
                found: fields.len(),
                expected: min_fields,
            });
        }

        let epoch = record_epoch(&fields, layout.minute_field, line_no)?;
        if epochs.last().is_some_and(|prev| *prev >= epoch) {
            return Err(ArchiveError::UnorderedRecord { line: line_no });
        }
        epochs.push(epoch);

        for (spec, values) in layout.columns.iter().zip(columns.iter_mut()) {
            values.push(parse_field::<f64>(fields[spec.index], spec.name, line_no)?);
        }
    }

    let mut table = MemoryTable::new(label, epochs);
    for (spec, values) in layout.columns.iter().zip(columns) {
        table.push_column(spec.meta(), values)?;
    }
    Ok(table)
}

fn record_epoch(
    fields: &[&str],
    minute_field: Option<usize>,
    line: usize,
) -> Result<DateTime<Utc>, ArchiveError> {
    let year = parse_field::<i32>(fields[0], "year", line)?;
    let day = parse_field::<u32>(fields[1], "day", line)?;
    let hour = parse_field::<u32>(fields[2], "hour", line)?;
    let minute = match minute_field {
        Some(idx) => parse_field::<u32>(fields[idx], "minute", line)?,
        None => 0,
    };

    NaiveDate::from_yo_opt(year, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .map(|naive| naive.and_utc())
        .ok_or(ArchiveError::InvalidEpoch { line })
}

fn parse_field<T: std::str::FromStr>(
    raw: &str,
    field: &'static str,
    line: usize,
) -> Result<T, ArchiveError> {
    raw.parse::<T>().map_err(|_| ArchiveError::ParseField {
        line,
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableSource;
    use chrono::TimeZone;

    fn record(layout: &TextLayout, time: &[&str], values: &[(&str, &str)]) -> String {
        let mut words = vec!["0".to_string(); layout.min_fields()];
        for (idx, word) in time.iter().enumerate() {
            words[idx] = (*word).to_string();
        }
        for (name, value) in values {
            let spec = layout.column(name).expect("column in layout");
            words[spec.index] = (*value).to_string();
        }
        words.join("  ")
    }

    #[test]
    fn hourly_records_build_epochs_and_columns() {
        let text = [
            record(&HOURLY_LAYOUT, &["2006", "69", "0"], &[("BZ_GSM", "-4.2"), ("KP", "37")]),
            String::new(),
            record(&HOURLY_LAYOUT, &["2006", "69", "1"], &[("BZ_GSM", "999.9"), ("KP", "40")]),
        ]
        .join("\n");

        let table = parse_omni_text(Cadence::Hourly, "omni2_2006.dat", &text).unwrap();
        assert_eq!(
            table.epochs(),
            &[
                Utc.with_ymd_and_hms(2006, 3, 10, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2006, 3, 10, 1, 0, 0).unwrap(),
            ]
        );
        assert_eq!(table.read_column("BZ_GSM", 0..2).unwrap(), vec![-4.2, 999.9]);
        assert_eq!(table.read_column("KP", 0..2).unwrap(), vec![37.0, 40.0]);
        assert_eq!(table.column_meta("BZ_GSM").unwrap().fill, Some(999.9));
        assert_eq!(table.column_meta("N").unwrap().units.as_deref(), Some("n/cc"));
    }

    #[test]
    fn high_res_records_use_minute_field() {
        let text = record(
            &HIGH_RES_LAYOUT,
            &["2006", "1", "23", "55"],
            &[("SYM_H", "-12"), ("flow_speed", "401.5")],
        );
        let table = parse_omni_text(Cadence::FiveMinute, "omni_5min2006.asc", &text).unwrap();

        assert_eq!(
            table.epochs()[0],
            Utc.with_ymd_and_hms(2006, 1, 1, 23, 55, 0).unwrap()
        );
        assert_eq!(table.read_column("SYM_H", 0..1).unwrap(), vec![-12.0]);
        assert_eq!(table.read_column("flow_speed", 0..1).unwrap(), vec![401.5]);
        assert!(table.has_column("PC_N_INDEX"));
        assert!(!table.has_column("DST"));
    }

    #[test]
    fn short_and_malformed_records_are_rejected() {
        let err = parse_omni_text(Cadence::Hourly, "x", "2006 1 0 1 2").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::InvalidRecordColumns {
                line: 1,
                found: 5,
                ..
            }
        ));

        let bad = record(&HOURLY_LAYOUT, &["2006", "1", "0"], &[("N", "abc")]);
        let err = parse_omni_text(Cadence::Hourly, "x", &bad).unwrap_err();
        assert!(matches!(err, ArchiveError::ParseField { field: "N", .. }));

        let bad_day = record(&HOURLY_LAYOUT, &["2006", "366", "0"], &[]);
        let err = parse_omni_text(Cadence::Hourly, "x", &bad_day).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidEpoch { line: 1 }));
    }

    #[test]
    fn out_of_order_records_are_rejected() {
        let text = [
            record(&HOURLY_LAYOUT, &["2006", "2", "0"], &[]),
            record(&HOURLY_LAYOUT, &["2006", "1", "0"], &[]),
        ]
        .join("\n");
        let err = parse_omni_text(Cadence::Hourly, "x", &text).unwrap_err();
        assert!(matches!(err, ArchiveError::UnorderedRecord { line: 2 }));
    }

    #[test]
    fn layouts_require_every_tabulated_word() {
        assert_eq!(HOURLY_LAYOUT.min_fields(), 55);
        assert_eq!(HIGH_RES_LAYOUT.min_fields(), 46);
    }
}
