use super::reader::ParsedRun;
use crate::error::Result;
use crate::models::{LabelRestriction, MonthDay, RATE_EPSILON};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::{info, warn};

/// Slack (kg/ha) on the annual amount check, covering the file's four-decimal rates.
pub const ANNUAL_AMOUNT_TOLERANCE: f64 = 0.002;

/// Label compliance of one batch row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcResult {
    #[serde(rename = "RunIsValid")]
    pub run_is_valid: bool,
    #[serde(rename = "RunDescriptor")]
    pub descriptor: String,
    #[serde(rename = "RunName")]
    pub run_name: String,
    #[serde(rename = "HUC")]
    pub huc2: String,
    #[serde(rename = "NumApps")]
    pub num_apps: usize,
    #[serde(rename = "NumAppsValid")]
    pub num_apps_valid: bool,
    #[serde(rename = "NumberofApplicationsMatches")]
    pub count_field_matches: bool,
    #[serde(rename = "AnnualAmount")]
    pub annual_amount: f64,
    #[serde(rename = "AnnualAmountValid")]
    pub annual_amount_valid: bool,
    #[serde(rename = "MaxRate")]
    pub max_rate: f64,
    #[serde(rename = "MaxRateValid")]
    pub max_rate_valid: bool,
    #[serde(rename = "MinInterval")]
    pub min_interval: Option<u32>,
    #[serde(rename = "MRIValid")]
    pub interval_valid: bool,
    #[serde(rename = "DatesUnique")]
    pub dates_unique: bool,
    #[serde(rename = "DatesInWindow")]
    pub dates_in_window: bool,
}

/// Check one parsed row against its label.
pub fn check_against_label(run: &ParsedRun, label: &LabelRestriction) -> QcResult {
    let num_apps = run.applications.len();
    let num_apps_valid = num_apps <= label.max_applications as usize;
    let count_field_matches = run.number_of_applications == num_apps;

    let annual_amount: f64 = run.applications.iter().map(|a| a.rate).sum();
    let annual_amount_valid =
        annual_amount <= label.max_annual_rate_kg_ha() + ANNUAL_AMOUNT_TOLERANCE;
    let max_rate = run.applications.iter().map(|a| a.rate).fold(0.0, f64::max);
    let max_rate_valid = max_rate <= label.max_single_rate_kg_ha() + RATE_EPSILON;

    let mut days: Vec<Option<MonthDay>> = run
        .applications
        .iter()
        .map(|a| MonthDay::new(a.month, a.day).ok())
        .collect();
    let dates_in_window = days.iter().all(|d| match d {
        Some(md) => label.earliest_date <= *md && *md <= label.latest_date,
        None => false,
    });

    days.sort();
    let valid_days: Vec<MonthDay> = days.iter().flatten().copied().collect();
    let dates_unique = valid_days.windows(2).all(|w| w[0] != w[1]);
    let min_interval = valid_days
        .windows(2)
        .map(|w| w[1].reference_ordinal() - w[0].reference_ordinal())
        .min();
    let interval_valid = min_interval.map_or(true, |gap| gap >= label.min_interval_days);

    QcResult {
        run_is_valid: num_apps_valid
            && count_field_matches
            && annual_amount_valid
            && max_rate_valid
            && interval_valid
            && dates_unique
            && dates_in_window,
        descriptor: run.descriptor.clone(),
        run_name: run.run_name.clone(),
        huc2: run.huc2.clone(),
        num_apps,
        num_apps_valid,
        count_field_matches,
        annual_amount,
        annual_amount_valid,
        max_rate,
        max_rate_valid,
        min_interval,
        interval_valid,
        dates_unique,
        dates_in_window,
    }
}

/// Check every row whose descriptor names a known label; unknown descriptors are skipped.
pub fn check_batch(
    runs: &[ParsedRun],
    labels: &BTreeMap<String, LabelRestriction>,
) -> Vec<QcResult> {
    runs.iter()
        .filter_map(|run| match labels.get(&run.descriptor) {
            Some(label) => Some(check_against_label(run, label)),
            None => {
                warn!(
                    row = run.row,
                    "run descriptor '{}' has no matching label; skipped",
                    run.descriptor
                );
                None
            }
        })
        .collect()
}

pub fn write_report(results: &[QcResult], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(path)?));
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;

    let failed = results.iter().filter(|r| !r.run_is_valid).count();
    info!(
        path = %path.display(),
        checked = results.len(),
        failed,
        "wrote QC report"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batchfile::reader::ParsedApplication;

    fn app(month: u32, day: u32, rate: f64) -> ParsedApplication {
        ParsedApplication {
            day,
            month,
            rate,
            method: 2,
            depth_cm: None,
            tband_split: None,
            efficiency: 0.95,
            drift: 0.125,
        }
    }

    fn parsed(apps: Vec<ParsedApplication>) -> ParsedRun {
        ParsedRun {
            row: 2,
            descriptor: "corn".into(),
            run_name: "corn_run".into(),
            koc_flag: true,
            fate: vec![0.0; 17],
            huc2: "05".into(),
            scenario: "ILCornSTD".into(),
            aquatic_bin: 4,
            waterbody: vec![0.0; 8],
            number_of_applications: apps.len(),
            applications: apps,
        }
    }

    fn label() -> LabelRestriction {
        LabelRestriction::new(
            "corn",
            MonthDay::new(4, 1).unwrap(),
            MonthDay::new(6, 30).unwrap(),
            3,
            1.0,
            2.5,
        )
        .with_min_interval(14)
    }

    #[test]
    fn compliant_run_passes() {
        let run = parsed(vec![app(5, 1, 1.0), app(5, 15, 1.0), app(5, 29, 0.5)]);
        let result = check_against_label(&run, &label());
        assert!(result.run_is_valid);
        assert_eq!(result.min_interval, Some(14));
    }

    #[test]
    fn rounding_within_tolerance_passes() {
        let run = parsed(vec![app(5, 1, 1.0), app(5, 15, 1.0), app(5, 29, 0.5015)]);
        assert!(check_against_label(&run, &label()).annual_amount_valid);
    }

    #[test]
    fn violations_are_flagged() {
        let run = parsed(vec![
            app(5, 29, 1.0),
            app(5, 1, 1.0),
            app(5, 10, 1.0),
            app(7, 4, 1.0),
        ]);
        let result = check_against_label(&run, &label());
        assert!(!result.run_is_valid);
        assert!(!result.num_apps_valid);
        assert!(!result.annual_amount_valid);
        assert!(!result.interval_valid);
        assert!(!result.dates_in_window);
        assert!(result.dates_unique);
    }

    #[test]
    fn rate_above_single_maximum_is_flagged() {
        let run = parsed(vec![app(5, 1, 1.0001), app(5, 15, 0.5)]);
        let result = check_against_label(&run, &label());
        assert_eq!(result.max_rate, 1.0001);
        assert!(!result.max_rate_valid);
        assert!(result.annual_amount_valid);
        assert!(!result.run_is_valid);

        let lb = label().with_rate_unit(crate::models::RateUnit::LbPerAcre);
        let run = parsed(vec![app(5, 1, 1.1208), app(5, 15, 1.1209)]);
        let result = check_against_label(&run, &lb);
        assert!(!result.max_rate_valid);
    }

    #[test]
    fn duplicate_dates_and_count_mismatch_flagged() {
        let mut run = parsed(vec![app(5, 1, 1.0), app(5, 1, 1.0)]);
        run.number_of_applications = 3;
        let result = check_against_label(&run, &label());
        assert!(!result.dates_unique);
        assert!(!result.count_field_matches);
        assert!(!result.run_is_valid);
    }

    #[test]
    fn unknown_descriptor_skipped_and_report_written() {
        let mut other = parsed(vec![app(5, 1, 1.0)]);
        other.descriptor = "soy".into();
        let runs = vec![parsed(vec![app(5, 1, 1.0)]), other];
        let labels: BTreeMap<String, LabelRestriction> =
            [("corn".to_string(), label())].into_iter().collect();

        let results = check_batch(&runs, &labels);
        assert_eq!(results.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atz QC Results.csv");
        write_report(&results, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("RunIsValid,RunDescriptor"));
        assert!(text.contains("corn_run"));
    }
}
