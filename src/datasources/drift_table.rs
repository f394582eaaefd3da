use crate::error::{PwcBatchError, Result};
use crate::models::DriftReductionTable;
use std::path::Path;
use tracing::debug;

/// Load a drift reduction table.
///
/// Expected layout: a `Profile` column keyed `"{bin}-{profile}"` (e.g.
/// `4-GROUND_VF`), one column per buffer distance in feet (`0`, `100ft`, ...)
/// holding the drift fraction, and an `Efficiency` column. Blank cells mean
/// the profile has no value at that distance.
pub fn load_drift_table(path: &Path) -> Result<DriftReductionTable> {
    if !path.exists() {
        return Err(PwcBatchError::NotFound(format!(
            "drift reduction table {}",
            path.display()
        )));
    }
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    read_table(reader)
}

pub fn parse_drift_table(content: &str) -> Result<DriftReductionTable> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    read_table(reader)
}

enum Column {
    Profile,
    Efficiency,
    Distance(f64),
}

fn classify(header: &str) -> Result<Column> {
    if header.eq_ignore_ascii_case("profile") {
        return Ok(Column::Profile);
    }
    if header.eq_ignore_ascii_case("efficiency") {
        return Ok(Column::Efficiency);
    }
    let number = header
        .strip_suffix("ft")
        .or_else(|| header.strip_suffix("FT"))
        .unwrap_or(header)
        .trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(Column::Distance)
        .ok_or_else(|| {
            PwcBatchError::InvalidData(format!(
                "drift reduction table column '{}' is not Profile, Efficiency or a distance",
                header
            ))
        })
}

fn parse_cell(value: &str, row: usize, column: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| {
        PwcBatchError::InvalidData(format!(
            "drift reduction table row {} column '{}': '{}' is not a number",
            row, column, value
        ))
    })
}

fn read_table<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<DriftReductionTable> {
    let headers = reader.headers()?.clone();
    let columns = headers
        .iter()
        .map(classify)
        .collect::<Result<Vec<Column>>>()?;
    if !columns.iter().any(|c| matches!(c, Column::Profile)) {
        return Err(PwcBatchError::InvalidData(
            "drift reduction table needs a 'Profile' column".into(),
        ));
    }
    if !columns.iter().any(|c| matches!(c, Column::Efficiency)) {
        return Err(PwcBatchError::InvalidData(
            "drift reduction table needs an 'Efficiency' column".into(),
        ));
    }

    let mut table = DriftReductionTable::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = idx + 2;
        let mut profile = "";
        let mut efficiency = None;
        let mut by_distance = Vec::new();

        for ((column, header), cell) in columns.iter().zip(headers.iter()).zip(record.iter()) {
            match column {
                Column::Profile => profile = cell,
                Column::Efficiency => efficiency = Some(parse_cell(cell, row, header)?),
                Column::Distance(_) if cell.is_empty() => {}
                Column::Distance(distance) => {
                    by_distance.push((*distance, parse_cell(cell, row, header)?))
                }
            }
        }

        if profile.is_empty() {
            return Err(PwcBatchError::InvalidData(format!(
                "drift reduction table row {} has no profile",
                row
            )));
        }
        let efficiency = efficiency.ok_or_else(|| {
            PwcBatchError::InvalidData(format!(
                "drift reduction table row {} ({}) has no efficiency",
                row, profile
            ))
        })?;
        table = table.with_profile(profile, efficiency, &by_distance)?;
    }

    if table.is_empty() {
        return Err(PwcBatchError::InvalidData(
            "drift reduction table has no profiles".into(),
        ));
    }
    debug!(
        count = table.len(),
        profiles = ?table.profiles().collect::<Vec<_>>(),
        "loaded drift reduction table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AquaticBin;

    const TABLE: &str = "\
Profile,0,100ft,300,Efficiency
4-GROUND_VF,0.062,0.012,0.004,0.99
7-GROUND_VF,0.041,,0.003,0.99
4-AERIAL_M,0.125,0.05,0.02,0.95
";

    #[test]
    fn parses_profiles_and_distances() {
        let table = parse_drift_table(TABLE).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.lookup(AquaticBin::Static, "GROUND_VF", 100.0),
            Some((0.012, 0.99))
        );
        assert_eq!(
            table.lookup(AquaticBin::Static, "AERIAL_M", 300.0),
            Some((0.02, 0.95))
        );
    }

    #[test]
    fn blank_cell_means_no_entry() {
        let table = parse_drift_table(TABLE).unwrap();
        assert_eq!(table.lookup(AquaticBin::Flowing, "GROUND_VF", 100.0), None);
        assert_eq!(
            table.lookup(AquaticBin::Flowing, "GROUND_VF", 300.0),
            Some((0.003, 0.99))
        );
    }

    #[test]
    fn malformed_tables_are_rejected() {
        assert!(parse_drift_table("Name,0,Efficiency\n4-X,0.1,1\n").is_err());
        assert!(parse_drift_table("Profile,0\n4-X,0.1\n").is_err());
        assert!(parse_drift_table("Profile,0,Efficiency\n4-X,abc,1\n").is_err());
        assert!(parse_drift_table("Profile,0,Efficiency\n,0.1,1\n").is_err());
        assert!(parse_drift_table("Profile,0,Efficiency\n4-X,1.4,1\n").is_err());
        assert!(parse_drift_table("Profile,0,Efficiency\n").is_err());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_drift_table(Path::new("/nonexistent/drt.csv")).unwrap_err();
        assert!(matches!(err, PwcBatchError::NotFound(_)));
    }
}
