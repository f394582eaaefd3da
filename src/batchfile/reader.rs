use super::layout::{
    APPLICATION_COLUMNS, COL_DESCRIPTOR, COL_FATE, COL_HUC2, COL_NUM_APPS, COL_RUN_NAME,
    COL_SCENARIO, COL_WATERBODY, FATE_COLUMNS, FIXED_COLUMNS, WATERBODY_COLUMNS,
};
use crate::error::{PwcBatchError, Result};
use csv::StringRecord;
use std::path::Path;

/// One application group of a parsed row.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedApplication {
    pub day: u32,
    pub month: u32,
    pub rate: f64,
    pub method: u8,
    pub depth_cm: Option<u32>,
    pub tband_split: Option<f64>,
    pub efficiency: f64,
    pub drift: f64,
}

/// One row of a batch file, decoded positionally.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRun {
    pub row: usize,
    pub descriptor: String,
    pub run_name: String,
    pub koc_flag: bool,
    /// Numeric fate parameters, Koc flag excluded.
    pub fate: Vec<f64>,
    pub huc2: String,
    pub scenario: String,
    pub aquatic_bin: u8,
    /// FlowAvgTime through Baseflow.
    pub waterbody: Vec<f64>,
    pub number_of_applications: usize,
    pub applications: Vec<ParsedApplication>,
}

pub fn parse_batch(bytes: &[u8]) -> Result<Vec<ParsedRun>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    parse_records(reader)
}

pub fn parse_batch_file(path: &Path) -> Result<Vec<ParsedRun>> {
    if !path.exists() {
        return Err(PwcBatchError::NotFound(path.display().to_string()));
    }
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    parse_records(reader)
}

fn parse_records<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<ParsedRun>> {
    let width = reader.headers()?.len();
    if width < FIXED_COLUMNS || (width - FIXED_COLUMNS) % APPLICATION_COLUMNS != 0 {
        return Err(PwcBatchError::InvalidData(format!(
            "batch header has {} columns; expected {} plus groups of {}",
            width, FIXED_COLUMNS, APPLICATION_COLUMNS
        )));
    }

    let mut runs = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        // header is row 1
        runs.push(parse_row(&record, idx + 2)?);
    }
    Ok(runs)
}

fn parse_row(record: &StringRecord, row: usize) -> Result<ParsedRun> {
    let field = |col: usize| record.get(col).unwrap_or("").trim();

    let fate = (COL_FATE..COL_FATE + FATE_COLUMNS.len())
        .filter(|col| *col != COL_FATE + 1)
        .map(|col| parse_num(field(col), row, col))
        .collect::<Result<Vec<f64>>>()?;
    let koc_flag = matches!(field(COL_FATE + 1).to_ascii_uppercase().as_str(), "TRUE" | "1");

    let waterbody = (COL_WATERBODY + 1..COL_WATERBODY + WATERBODY_COLUMNS.len())
        .map(|col| parse_num(field(col), row, col))
        .collect::<Result<Vec<f64>>>()?;

    let number_of_applications = parse_num::<usize>(field(COL_NUM_APPS), row, COL_NUM_APPS)?;

    let mut applications = Vec::new();
    let mut start = FIXED_COLUMNS;
    while start + APPLICATION_COLUMNS <= record.len() {
        if field(start).is_empty() {
            break;
        }
        applications.push(ParsedApplication {
            day: parse_num(field(start), row, start)?,
            month: parse_num(field(start + 1), row, start + 1)?,
            rate: parse_num(field(start + 2), row, start + 2)?,
            method: parse_num(field(start + 3), row, start + 3)?,
            depth_cm: parse_opt(field(start + 4), row, start + 4)?,
            tband_split: parse_opt(field(start + 5), row, start + 5)?,
            efficiency: parse_num(field(start + 6), row, start + 6)?,
            drift: parse_num(field(start + 7), row, start + 7)?,
        });
        start += APPLICATION_COLUMNS;
    }

    Ok(ParsedRun {
        row,
        descriptor: field(COL_DESCRIPTOR).to_string(),
        run_name: field(COL_RUN_NAME).to_string(),
        koc_flag,
        fate,
        huc2: field(COL_HUC2).to_string(),
        scenario: field(COL_SCENARIO).to_string(),
        aquatic_bin: parse_num(field(COL_WATERBODY), row, COL_WATERBODY)?,
        waterbody,
        number_of_applications,
        applications,
    })
}

fn parse_num<T: std::str::FromStr>(raw: &str, row: usize, col: usize) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        PwcBatchError::InvalidData(format!(
            "row {}, column {}: cannot parse '{}'",
            row,
            col + 1,
            raw
        ))
    })
}

fn parse_opt<T: std::str::FromStr>(raw: &str, row: usize, col: usize) -> Result<Option<T>> {
    if raw.is_empty() {
        Ok(None)
    } else {
        parse_num(raw, row, col).map(Some)
    }
}
