use crate::error::{PwcBatchError, Result};
use crate::models::ClimateReference;
use std::path::Path;
use tracing::debug;

/// Load a wettest-month table into a daily climate reference.
///
/// Expected layout: a header row, then one row per region with the region
/// code (`HUC2`/`Region`) followed by twelve month numbers, wettest first.
pub fn load_wettest_months(path: &Path) -> Result<ClimateReference> {
    if !path.exists() {
        return Err(PwcBatchError::NotFound(format!(
            "wettest month table {}",
            path.display()
        )));
    }
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    read_table(reader)
}

pub fn parse_wettest_months(content: &str) -> Result<ClimateReference> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    read_table(reader)
}

fn read_table<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<ClimateReference> {
    let mut climate = ClimateReference::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = idx + 2;
        let region = record.get(0).unwrap_or("");
        if region.is_empty() {
            return Err(PwcBatchError::InvalidData(format!(
                "wettest month table row {} has no region",
                row
            )));
        }
        if record.len() < 13 {
            return Err(PwcBatchError::InvalidData(format!(
                "wettest month table row {} ({}) lists {} months, expected 12",
                row,
                region,
                record.len().saturating_sub(1)
            )));
        }

        let months = record
            .iter()
            .skip(1)
            .take(12)
            .map(|cell| {
                cell.parse::<f64>()
                    .ok()
                    .filter(|m| m.fract() == 0.0)
                    .map(|m| m as u32)
                    .ok_or_else(|| {
                        PwcBatchError::InvalidData(format!(
                            "wettest month table row {}: '{}' is not a month number",
                            row, cell
                        ))
                    })
            })
            .collect::<Result<Vec<u32>>>()?;

        climate = climate.with_ranked_months(region, &months)?;
    }

    if climate.is_empty() {
        return Err(PwcBatchError::InvalidData(
            "wettest month table has no regions".into(),
        ));
    }
    debug!(
        regions = ?climate.regions().collect::<Vec<_>>(),
        "loaded wettest month table"
    );
    Ok(climate)
}
