use super::layout::{
    self, format_parameter, BLANK_COLUMNS, DRIFT_DECIMALS, EFFICIENCY_DECIMALS, FATE_COLUMNS,
    IRF_COLUMNS, MAX_RATE_KG_HA, MAX_YEAR, MIN_YEAR, PARAMETER_MAX_MAGNITUDE,
    PARAMETER_MIN_MAGNITUDE, RATE_DECIMALS, TBAND_DECIMALS, WATERBODY_COLUMNS,
};
use crate::error::{PwcBatchError, Result};
use crate::logic::solver::MAX_MODEL_APPLICATIONS;
use crate::models::{normalize_region, Batch, ChemicalProperties, RunDefinition};
use chrono::Datelike;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Encodes a [`Batch`] into the PWC batch CSV, one row per run in input order.
#[derive(Debug, Default)]
pub struct BatchSerializer;

impl BatchSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Serialize every run; any unrepresentable run fails the whole batch.
    pub fn serialize(&self, batch: &Batch) -> Result<Vec<u8>> {
        check_chemical(&batch.metadata.chemical)?;
        for run in &batch.runs {
            check_run(run)?;
        }
        let runs: Vec<&RunDefinition> = batch.runs.iter().collect();
        self.encode(&batch.metadata.chemical, &runs)
    }

    /// Serialize the representable runs and return the rejected ones' errors alongside.
    ///
    /// Chemical properties are shared by every row, so an unrepresentable
    /// chemical still fails the whole batch.
    pub fn serialize_partitioned(&self, batch: &Batch) -> Result<(Vec<u8>, Vec<PwcBatchError>)> {
        check_chemical(&batch.metadata.chemical)?;
        let mut kept = Vec::with_capacity(batch.runs.len());
        let mut errors = Vec::new();
        for run in &batch.runs {
            match check_run(run) {
                Ok(()) => kept.push(run),
                Err(e) => {
                    warn!("{}", e);
                    errors.push(e);
                }
            }
        }
        let bytes = self.encode(&batch.metadata.chemical, &kept)?;
        Ok((bytes, errors))
    }

    fn encode(&self, chemical: &ChemicalProperties, runs: &[&RunDefinition]) -> Result<Vec<u8>> {
        let width = runs
            .iter()
            .map(|r| r.schedule().first_year_events().len())
            .max()
            .unwrap_or(0);

        let mut writer = csv::WriterBuilder::new()
            .flexible(false)
            .from_writer(Vec::new());
        writer.write_record(layout::header(width))?;
        for run in runs {
            debug!(
                run = %run.id(),
                chemical = run.chemical(),
                schedule = run.schedule_index(),
                landscape = run.landscape_index(),
                "encoding row"
            );
            writer.write_record(encode_row(chemical, run, width))?;
        }
        debug!(runs = runs.len(), width, "encoded batch rows");

        writer.into_inner().map_err(|e| {
            PwcBatchError::Io(std::io::Error::new(e.error().kind(), e.to_string()))
        })
    }
}

/// Fate columns that may be negative: reference temperatures, latitude and heat of Henry.
const SIGNED_FATE_FIELDS: [usize; 5] = [2, 4, 6, 9, 16];
const LATITUDE_FIELD: usize = 6;

fn check_parameter(name: &str, value: f64, signed: bool) -> std::result::Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{} is not a finite number ({})", name.trim(), value));
    }
    if !signed && value < 0.0 {
        return Err(format!("{} must not be negative, got {}", name.trim(), value));
    }
    let magnitude = value.abs();
    if magnitude != 0.0
        && !(PARAMETER_MIN_MAGNITUDE..=PARAMETER_MAX_MAGNITUDE).contains(&magnitude)
    {
        return Err(format!(
            "{} = {} is outside the writable magnitude {:e}..{:e}",
            name.trim(),
            value,
            PARAMETER_MIN_MAGNITUDE,
            PARAMETER_MAX_MAGNITUDE
        ));
    }
    Ok(())
}

/// Verify the chemical's fate parameters fit the batch file's numeric columns.
///
/// The chemical is written into every row, so the error names all runs (`*`).
pub fn check_chemical(chemical: &ChemicalProperties) -> Result<()> {
    let reject = |reason: String| {
        Err(PwcBatchError::Serialization {
            run: "*".into(),
            reason: format!("chemical '{}': {}", chemical.name, reason),
        })
    };
    for (idx, value) in chemical.numeric_fields().into_iter().enumerate() {
        // The Koc flag column sits between the first two numeric fields
        let name = FATE_COLUMNS[if idx == 0 { 0 } else { idx + 1 }];
        if let Err(reason) = check_parameter(name, value, SIGNED_FATE_FIELDS.contains(&idx)) {
            return reject(reason);
        }
        if idx == LATITUDE_FIELD && !(-90.0..=90.0).contains(&value) {
            return reject(format!("latitude {} is outside [-90, 90]", value));
        }
    }
    Ok(())
}

/// Verify a run fits the batch format's representable ranges.
pub fn check_run(run: &RunDefinition) -> Result<()> {
    let reject = |reason: String| {
        Err(PwcBatchError::Serialization {
            run: run.id().to_string(),
            reason,
        })
    };
    let schedule = run.schedule();
    let site = &schedule.site;

    let last_year = site.first_year as i64 + site.num_years as i64 - 1;
    if site.first_year < MIN_YEAR || last_year > MAX_YEAR as i64 {
        return reject(format!(
            "simulated years {}-{} fall outside {}-{}",
            site.first_year, last_year, MIN_YEAR, MAX_YEAR
        ));
    }
    if let Some(event) = schedule
        .events
        .iter()
        .find(|e| !(MIN_YEAR..=MAX_YEAR).contains(&e.date.year()))
    {
        return reject(format!("application date {} is out of range", event.date));
    }
    if !schedule.repeats_annually() {
        return reject("application dates differ between simulated years".into());
    }

    let annual = schedule.first_year_events();
    if annual.is_empty() {
        return reject("no applications to write".into());
    }
    if schedule.max_annual_count() > MAX_MODEL_APPLICATIONS {
        return reject(format!(
            "{} applications per year exceed the model limit of {}",
            schedule.max_annual_count(),
            MAX_MODEL_APPLICATIONS
        ));
    }
    if let Some(event) = annual
        .iter()
        .find(|e| !e.rate.is_finite() || e.rate <= 0.0 || e.rate > MAX_RATE_KG_HA)
    {
        return reject(format!(
            "rate {} kg/ha on {} does not fit the rate field",
            event.rate, event.date
        ));
    }

    for (name, value) in WATERBODY_COLUMNS[1..].iter().zip(waterbody_fields(run)) {
        if let Err(reason) = check_parameter(name, value, false) {
            return reject(format!("waterbody {}", reason));
        }
    }

    let landscape = run.landscape();
    if !(0.0..=1.0).contains(&landscape.drift_reduction_factor) {
        return reject(format!(
            "drift {} is outside [0, 1]",
            landscape.drift_reduction_factor
        ));
    }
    if !(0.0..=1.0).contains(&landscape.application_efficiency) {
        return reject(format!(
            "efficiency {} is outside [0, 1]",
            landscape.application_efficiency
        ));
    }
    if let Some(split) = run.tband_split() {
        if !(0.0..=1.0).contains(&split) {
            return reject(format!("T-band split {} is outside [0, 1]", split));
        }
    }
    Ok(())
}

fn waterbody_fields(run: &RunDefinition) -> [f64; 8] {
    let waterbody = run.waterbody();
    [
        waterbody.flow_avg_time,
        waterbody.field_size_m2,
        waterbody.waterbody_area_m2,
        waterbody.init_depth_m,
        waterbody.max_depth_m,
        waterbody.hydraulic_length_m,
        waterbody.pua,
        waterbody.baseflow,
    ]
}

fn encode_row(chemical: &ChemicalProperties, run: &RunDefinition, width: usize) -> Vec<String> {
    let mut row =
        Vec::with_capacity(layout::FIXED_COLUMNS + width * layout::APPLICATION_COLUMNS);
    let site = &run.schedule().site;
    let landscape = run.landscape();

    row.push(run.descriptor().to_string());
    row.push(run.name().to_string());

    let fate = chemical.numeric_fields();
    row.push(format_parameter(fate[0]));
    row.push(if chemical.koc_flag { "TRUE" } else { "FALSE" }.to_string());
    row.extend(fate[1..].iter().map(|v| format_parameter(*v)));

    row.push(normalize_region(&site.region));
    row.push(site.scenario.clone());
    row.push(String::new());
    row.extend(std::iter::repeat(String::new()).take(BLANK_COLUMNS));

    row.push(landscape.aquatic_bin.code().to_string());
    row.extend(waterbody_fields(run).into_iter().map(format_parameter));

    row.push("1".into());
    row.push("1".into());
    row.extend(std::iter::repeat("0".to_string()).take(IRF_COLUMNS - 1));

    let annual = run.schedule().first_year_events();
    row.push(annual.len().to_string());
    row.push("TRUE".into());
    row.push(String::new());

    let method = run.application_method().code().to_string();
    let depth = run.depth_cm().map(|d| d.to_string()).unwrap_or_default();
    let tband = run
        .tband_split()
        .map(|t| format!("{:.*}", TBAND_DECIMALS, t))
        .unwrap_or_default();
    let efficiency = format!("{:.*}", EFFICIENCY_DECIMALS, landscape.application_efficiency);
    let drift = format!("{:.*}", DRIFT_DECIMALS, landscape.drift_reduction_factor);

    for event in &annual {
        row.push(event.date.day().to_string());
        row.push(event.date.month().to_string());
        row.push(format!("{:.*}", RATE_DECIMALS, event.rate));
        row.push(method.clone());
        row.push(depth.clone());
        row.push(tband.clone());
        row.push(efficiency.clone());
        row.push(drift.clone());
    }
    let padding = (width - annual.len()) * layout::APPLICATION_COLUMNS;
    row.extend(std::iter::repeat(String::new()).take(padding));

    row
}

/// Write serialized batch bytes to `path`, creating parent directories.
///
/// The file handle is released on every exit path; a failed flush is reported.
pub fn write_to_path(bytes: &[u8], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(bytes)?;
    out.flush()?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote batch file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batchfile::reader::parse_batch;
    use crate::models::{
        ApplicationEvent, ApplicationMethod, ApplicationSchedule, AquaticBin, BatchMetadata,
        DatePrioritization, LabelRestriction, LandscapeParams, ModelOptions, MonthDay, RunId,
        RunParts, SiteParams, TransportMechanism, WaterbodyParams,
    };
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(idx: usize, events: Vec<ApplicationEvent>, years: u32) -> RunDefinition {
        RunDefinition::from_parts(parts(idx, events, years))
    }

    fn parts(idx: usize, events: Vec<ApplicationEvent>, years: u32) -> RunParts {
        let label = LabelRestriction::new(
            "corn_atrazine",
            MonthDay::new(4, 1).unwrap(),
            MonthDay::new(6, 30).unwrap(),
            3,
            1.0,
            2.5,
        );
        let schedule = ApplicationSchedule {
            label,
            site: SiteParams::new("ILCornSTD", "05").with_years(1961, years),
            prioritization: DatePrioritization::WettestPeriod,
            events,
            request_index: idx,
        };
        let landscape = LandscapeParams::new(
            100.0,
            0.0512,
            TransportMechanism::RunoffAndDrift,
            AquaticBin::Flowing,
        )
        .with_efficiency(0.95);
        RunParts {
            id: RunId::derive("atrazine", "ILCornSTD", idx, 0),
            name: format!("run{}", idx),
            chemical: "atrazine".into(),
            schedule,
            landscape,
            waterbody: WaterbodyParams {
                flow_avg_time: 1.0,
                field_size_m2: 1728000.0,
                waterbody_area_m2: 5260.0,
                init_depth_m: 1.0,
                max_depth_m: 1.0,
                hydraulic_length_m: 5.0,
                pua: 0.0,
                baseflow: 0.0,
            },
            application_method: ApplicationMethod::Foliar,
            depth_cm: None,
            tband_split: None,
            schedule_index: idx,
            landscape_index: 0,
        }
    }

    fn batch(runs: Vec<RunDefinition>) -> Batch {
        Batch::new(
            BatchMetadata {
                run_id: "atz".into(),
                chemical: ChemicalProperties::new("atrazine"),
                output_dir: PathBuf::from("out"),
                options: ModelOptions::default(),
            },
            runs,
        )
    }

    fn three_events() -> Vec<ApplicationEvent> {
        vec![
            ApplicationEvent::new(date(1961, 5, 1), 1.0),
            ApplicationEvent::new(date(1961, 5, 15), 1.0),
            ApplicationEvent::new(date(1961, 5, 29), 0.5),
        ]
    }

    #[test]
    fn rows_preserve_input_order_and_pad_short_runs() {
        let b = batch(vec![
            run(1, vec![ApplicationEvent::new(date(1961, 5, 15), 0.8)], 1),
            run(0, three_events(), 1),
        ]);
        let bytes = BatchSerializer::new().serialize(&b).unwrap();
        let parsed = parse_batch(&bytes).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].run_name, "run1");
        assert_eq!(parsed[1].run_name, "run0");
        assert_eq!(parsed[0].applications.len(), 1);
        assert_eq!(parsed[0].number_of_applications, 1);
        assert_eq!(parsed[1].applications.len(), 3);
    }

    #[test]
    fn round_trip_recovers_run_fields() {
        let b = batch(vec![run(0, three_events(), 1)]);
        let bytes = BatchSerializer::new().serialize(&b).unwrap();
        let parsed = parse_batch(&bytes).unwrap();
        let row = &parsed[0];

        assert_eq!(row.descriptor, "corn_atrazine");
        assert_eq!(row.huc2, "05");
        assert_eq!(row.scenario, "ILCornSTD");
        assert_eq!(row.aquatic_bin, 7);
        assert!(row.koc_flag);
        assert_eq!(row.fate, ChemicalProperties::new("atrazine").numeric_fields().to_vec());
        assert_eq!(row.fate[2], 25.0);
        assert_eq!(row.waterbody[1], 1728000.0);
        assert_eq!(row.number_of_applications, 3);

        let rates: Vec<f64> = row.applications.iter().map(|a| a.rate).collect();
        assert_eq!(rates, vec![1.0, 1.0, 0.5]);
        let first = &row.applications[0];
        assert_eq!((first.day, first.month), (1, 5));
        assert_eq!(first.method, 2);
        assert_eq!(first.depth_cm, None);
        assert_eq!(first.efficiency, 0.95);
        assert_eq!(first.drift, 0.0512);
    }

    #[test]
    fn multi_year_schedule_writes_one_annual_pattern() {
        let mut events = three_events();
        events.extend(three_events().into_iter().map(|e| {
            ApplicationEvent::new(date(1962, e.date.month(), e.date.day()), e.rate)
        }));
        let b = batch(vec![run(0, events, 2)]);
        let parsed = parse_batch(&BatchSerializer::new().serialize(&b).unwrap()).unwrap();
        assert_eq!(parsed[0].applications.len(), 3);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let huge = run(0, vec![ApplicationEvent::new(date(1961, 5, 1), 12000.0)], 1);
        let err = BatchSerializer::new()
            .serialize(&batch(vec![huge]))
            .unwrap_err();
        assert!(matches!(err, PwcBatchError::Serialization { .. }));

        let early = run(
            0,
            vec![ApplicationEvent::new(date(1850, 5, 1), 1.0)],
            1,
        );
        assert!(check_run(&early).is_err());

        let uneven = run(
            0,
            vec![
                ApplicationEvent::new(date(1961, 5, 1), 1.0),
                ApplicationEvent::new(date(1962, 5, 2), 1.0),
            ],
            2,
        );
        assert!(check_run(&uneven).is_err());
    }

    #[test]
    fn partitioned_serialization_skips_bad_runs() {
        let good = run(0, three_events(), 1);
        let bad = run(1, vec![ApplicationEvent::new(date(1961, 5, 1), 12000.0)], 1);
        let (bytes, errors) = BatchSerializer::new()
            .serialize_partitioned(&batch(vec![bad, good]))
            .unwrap();
        assert_eq!(errors.len(), 1);
        let parsed = parse_batch(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].run_name, "run0");
    }

    #[test]
    fn write_to_path_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("atz_new_batch_file.csv");
        let bytes = BatchSerializer::new()
            .serialize(&batch(vec![run(0, three_events(), 1)]))
            .unwrap();
        write_to_path(&bytes, &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn unwritable_chemical_fails_the_batch() {
        let mut chemical = ChemicalProperties::new("atrazine");
        chemical.soil_halflife_days = f64::NAN;
        assert!(check_chemical(&chemical).is_err());

        chemical.soil_halflife_days = 1e300;
        let mut b = batch(vec![run(0, three_events(), 1)]);
        b.metadata.chemical = chemical.clone();
        let err = BatchSerializer::new().serialize_partitioned(&b).unwrap_err();
        assert!(matches!(err, PwcBatchError::Serialization { .. }));
        assert!(err.to_string().contains("SoilHalflife"));

        chemical.soil_halflife_days = -3.0;
        assert!(check_chemical(&chemical).is_err());

        chemical.soil_halflife_days = 10.0;
        chemical.photolysis_reference_latitude = 120.0;
        assert!(check_chemical(&chemical).is_err());

        chemical.photolysis_reference_latitude = -33.0;
        chemical.water_reference_temp_c = -2.0;
        assert!(check_chemical(&chemical).is_ok());
    }

    #[test]
    fn small_parameters_written_without_exponent() {
        let mut b = batch(vec![run(0, three_events(), 1)]);
        b.metadata.chemical.vapor_pressure_torr = 2.89e-7;
        b.metadata.chemical.sorption_coefficient = 100.123456789;
        let bytes = BatchSerializer::new().serialize(&b).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains(",0.000000289,"));
        assert!(!text.lines().nth(1).unwrap().contains("e-"));

        let parsed = parse_batch(&bytes).unwrap();
        assert_eq!(parsed[0].fate[0], 100.123);
        assert_eq!(parsed[0].fate[12], 2.89e-7);
    }

    #[test]
    fn unwritable_waterbody_rejects_the_run() {
        let mut broken = parts(0, three_events(), 1);
        broken.waterbody.field_size_m2 = f64::INFINITY;
        let bad = RunDefinition::from_parts(broken);
        let err = check_run(&bad).unwrap_err();
        assert!(matches!(err, PwcBatchError::Serialization { .. }));
        assert!(err.to_string().contains("Field Size"));
    }
}
