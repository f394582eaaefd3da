//! Column layout of the PWC batch CSV.
//!
//! The layout is fixed by the downstream model. Every run occupies one row;
//! the fixed block is followed by one group of [`APPLICATION_COLUMNS`] cells
//! per application, as many groups as the longest run in the file needs.

pub use crate::models::{MAX_YEAR, MIN_YEAR};

/// Identifier of the column layout produced by this crate.
pub const FORMAT_VERSION: &str = "pwc-batch-csv/1";

/// Chemical fate parameter headers, in file order.
pub const FATE_COLUMNS: [&str; 18] = [
    "SorptionCoefficient(mL/g)",
    "kocflag",
    "WaterColumnMetabolismHalflife(day)",
    "WaterReferenceTemperature(C) ",
    "BenthicMetabolismHalflife(day)",
    "BenthicReferenceTemperature(C) ",
    "AqueousPhotolysisHalflife(day)",
    "PhotolysisReferenceLatitude(?)",
    "HydrolysisHalflife(days)",
    "SoilHalflife(days)",
    "SoilReferencerTemperature(C) ",
    "FoliarHalflife(day)",
    "MolecularWeight(g/mol)",
    "VaporPressure(torr)",
    "Solubility(mg/L)",
    "Henry's Constant (unitless)",
    "Air Diffusion (cm3/d)",
    "Heat of Henry (J/mol)",
];

pub const BLANK_COLUMNS: usize = 10;

pub const WATERBODY_COLUMNS: [&str; 9] = [
    "AquaticBin",
    "FlowAvgTime",
    "Field Size (m2)",
    "Waterbody Area (m2)",
    "Init Depth (m)",
    "Max Depth (m)",
    "HL (m)",
    "PUA",
    "Baseflow",
];

pub const IRF_COLUMNS: usize = 31;

/// Cells per application group.
pub const APPLICATION_COLUMNS: usize = 8;

/// Position of `Run Descriptor`.
pub const COL_DESCRIPTOR: usize = 0;
pub const COL_RUN_NAME: usize = 1;
pub const COL_FATE: usize = 2;
pub const COL_HUC2: usize = COL_FATE + FATE_COLUMNS.len();
pub const COL_SCENARIO: usize = COL_HUC2 + 1;
pub const COL_WEATHER: usize = COL_SCENARIO + 1;
pub const COL_WATERBODY: usize = COL_WEATHER + 1 + BLANK_COLUMNS;
pub const COL_DAYSHEDS: usize = COL_WATERBODY + WATERBODY_COLUMNS.len();
pub const COL_NUM_APPS: usize = COL_DAYSHEDS + 1 + IRF_COLUMNS;
pub const COL_ABSOLUTE: usize = COL_NUM_APPS + 1;
pub const COL_RELATIVE: usize = COL_ABSOLUTE + 1;

/// Number of columns before the first application group.
pub const FIXED_COLUMNS: usize = COL_RELATIVE + 1;

/// Largest rate representable with four decimals in the rate field.
pub const MAX_RATE_KG_HA: f64 = 9999.9999;

pub const RATE_DECIMALS: usize = 4;
pub const DRIFT_DECIMALS: usize = 4;
pub const EFFICIENCY_DECIMALS: usize = 2;
pub const TBAND_DECIMALS: usize = 2;

/// Fate and waterbody parameters are written with at most this many significant digits.
pub const PARAMETER_SIGNIFICANT_DIGITS: usize = 6;

/// Non-zero fate and waterbody parameters must have a magnitude within these bounds.
pub const PARAMETER_MIN_MAGNITUDE: f64 = 1e-12;
pub const PARAMETER_MAX_MAGNITUDE: f64 = 1e12;

/// Plain decimal text for a fate or waterbody parameter, rounded to
/// [`PARAMETER_SIGNIFICANT_DIGITS`].
pub fn format_parameter(value: f64) -> String {
    format!("{:.*e}", PARAMETER_SIGNIFICANT_DIGITS - 1, value)
        .parse::<f64>()
        .unwrap_or(value)
        .to_string()
}

/// Header row for a file whose longest run has `max_applications` applications.
pub fn header(max_applications: usize) -> Vec<String> {
    let mut cols: Vec<String> =
        Vec::with_capacity(FIXED_COLUMNS + max_applications * APPLICATION_COLUMNS);
    cols.push("Run Descriptor".into());
    cols.push("Run Name".into());
    cols.extend(FATE_COLUMNS.iter().map(|c| c.to_string()));
    cols.push("HUC2".into());
    cols.push("Scenario".into());
    cols.push("weather overide".into());
    cols.extend((1..=BLANK_COLUMNS).map(|i| format!("blank {}", i)));
    cols.extend(WATERBODY_COLUMNS.iter().map(|c| c.to_string()));
    cols.push("Num_Daysheds".into());
    cols.extend((1..=IRF_COLUMNS).map(|i| format!("IRF{}", i)));
    cols.push("NumberofApplications".into());
    cols.push("Absolute Dates?".into());
    cols.push("Relative Dates?".into());
    for n in 1..=max_applications {
        cols.push(format!("Day{}", n));
        cols.push(format!("Month{}", n));
        cols.push(format!("AppRate (kg/ha){}", n));
        cols.push(format!("ApplicationMethod{}", n));
        cols.push(format!("Depth(cm){}", n));
        cols.push(format!("T-BandSplit{}", n));
        cols.push(format!("Eff.{}", n));
        cols.push(format!("Drift{}", n));
    }
    cols
}
