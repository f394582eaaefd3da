use crate::batchfile::{self, qc, BatchSerializer};
use crate::config::Config;
use crate::datasources::{load_drift_table, load_wettest_months, AssessmentInput};
use crate::error::{PwcBatchError, Result};
use crate::logic::{AssemblyOptions, BatchAssembler, Pairing, ScheduleSolver};
use crate::models::{
    ApplicationSchedule, Batch, BatchMetadata, ClimateReference, DatePrioritization,
    DriftReductionTable, RunId,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of one `generate` request.
#[derive(Debug)]
pub struct GenerateReport {
    /// Written batch file, or None when no run survived.
    pub batch_path: Option<PathBuf>,
    pub runs_written: usize,
    /// Identifiers of the written runs, in file order.
    pub run_ids: Vec<RunId>,
    /// Per-run failures; none of them stopped the rest of the batch.
    pub failures: Vec<PwcBatchError>,
}

/// Outcome of one `check` request.
#[derive(Debug)]
pub struct CheckReport {
    pub report_path: PathBuf,
    pub checked: usize,
    pub invalid: usize,
}

/// One user request: configuration plus the resolved output directory.
pub struct App {
    pub config: Config,
    pub output_dir: PathBuf,
}

impl App {
    pub fn new(config: Config, output_dir: PathBuf) -> Self {
        Self { config, output_dir }
    }

    fn metadata(&self) -> BatchMetadata {
        BatchMetadata {
            run_id: self.config.run_id.clone(),
            chemical: self.config.chemical.clone(),
            output_dir: self.output_dir.clone(),
            options: self.config.model,
        }
    }

    /// Load inputs named by the configuration (or the overrides) and generate the batch.
    pub fn generate(
        &self,
        labels_override: Option<&Path>,
        climate_override: Option<&Path>,
    ) -> Result<GenerateReport> {
        let labels_path = labels_override.unwrap_or(self.config.inputs.labels.as_path());
        let input = AssessmentInput::load(labels_path)?;

        let climate_path = climate_override.or(self.config.inputs.wettest_months.as_deref());
        let climate = match (self.config.model.date_prioritization, climate_path) {
            (_, Some(path)) => load_wettest_months(path)?,
            (DatePrioritization::Calendar, None) => ClimateReference::new(),
            (DatePrioritization::WettestPeriod, None) => {
                return Err(PwcBatchError::Config(
                    "wettest-period prioritization needs inputs.wettest_months".into(),
                ))
            }
        };

        let drift_table = self
            .config
            .inputs
            .drift_reduction_table
            .as_deref()
            .map(load_drift_table)
            .transpose()?;

        self.generate_from(&input, &climate, drift_table.as_ref())
    }

    /// Solve, assemble, serialize and write. Per-run failures are collected, never fatal.
    ///
    /// Each label/site request keeps the index `label * sites + site`, so a run's
    /// identifier does not depend on which other requests failed.
    pub fn generate_from(
        &self,
        input: &AssessmentInput,
        climate: &ClimateReference,
        drift_table: Option<&DriftReductionTable>,
    ) -> Result<GenerateReport> {
        let mut failures = Vec::new();
        let solver = ScheduleSolver::new(self.config.model.date_prioritization);

        let mut schedules: Vec<ApplicationSchedule> = Vec::new();
        let mut positions: HashMap<(&str, &str), usize> = HashMap::new();
        for (label_idx, label) in input.labels.iter().enumerate() {
            for (site_idx, site) in input.sites.iter().enumerate() {
                match solver.solve(label, climate, site) {
                    Ok(schedule) => {
                        positions.insert(
                            (label.descriptor.as_str(), site.scenario.as_str()),
                            schedules.len(),
                        );
                        let request = label_idx * input.sites.len() + site_idx;
                        schedules.push(schedule.with_request_index(request));
                    }
                    Err(e) if e.is_per_run() => {
                        warn!("{}", e);
                        failures.push(e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        info!(
            solved = schedules.len(),
            failed = failures.len(),
            prioritization = %solver.prioritization(),
            "solved application schedules"
        );

        let pairing = match &input.pairs {
            None => Pairing::CrossProduct,
            Some(pairs) => {
                let mut explicit = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    match positions.get(&(pair.label.as_str(), pair.site.as_str())) {
                        Some(pos) => explicit.push((*pos, pair.landscape)),
                        None => {
                            let known = input.labels.iter().any(|l| l.descriptor == pair.label)
                                && input.sites.iter().any(|s| s.scenario == pair.site);
                            // a known pair whose schedule failed was already reported
                            if !known {
                                failures.push(PwcBatchError::AssemblyValidation {
                                    run: format!("{}@{}", pair.label, pair.site),
                                    reason: "pairing names an unknown label or site".into(),
                                });
                            }
                        }
                    }
                }
                Pairing::Explicit(explicit)
            }
        };

        let mut options =
            AssemblyOptions::new(&self.config.chemical.name, self.config.waterbodies.clone())
                .with_assessment(self.config.model.assessment)
                .with_pairing(pairing);
        if let Some(table) = drift_table {
            options = options.with_drift_table(table.clone());
        }
        let (runs, assembly_failures) =
            BatchAssembler::new(options).assemble_partitioned(&schedules, &input.landscapes);
        failures.extend(assembly_failures);

        let batch = Batch::new(self.metadata(), runs);
        if batch.is_empty() {
            warn!("no runs left to write; batch file not created");
            return Ok(GenerateReport {
                batch_path: None,
                runs_written: 0,
                run_ids: Vec::new(),
                failures,
            });
        }

        let (bytes, serialization_failures) =
            BatchSerializer::new().serialize_partitioned(&batch)?;
        let rejected: HashSet<&str> = serialization_failures
            .iter()
            .filter_map(|e| match e {
                PwcBatchError::Serialization { run, .. } => Some(run.as_str()),
                _ => None,
            })
            .collect();
        let run_ids: Vec<RunId> = batch
            .runs
            .iter()
            .map(|r| r.id().clone())
            .filter(|id| !rejected.contains(id.to_string().as_str()))
            .collect();
        let runs_written = run_ids.len();
        failures.extend(serialization_failures);

        if runs_written == 0 {
            warn!("every run failed serialization; batch file not created");
            return Ok(GenerateReport {
                batch_path: None,
                runs_written,
                run_ids,
                failures,
            });
        }

        let path = batch.metadata.batch_file_path();
        batchfile::write_to_path(&bytes, &path)?;
        info!(
            runs = runs_written,
            failed = failures.len(),
            format = batchfile::FORMAT_VERSION,
            "batch complete"
        );

        Ok(GenerateReport {
            batch_path: Some(path),
            runs_written,
            run_ids,
            failures,
        })
    }

    /// Quality-check an existing batch file against the configured label set.
    pub fn check(&self, batch_csv: &Path, labels_override: Option<&Path>) -> Result<CheckReport> {
        let labels_path = labels_override.unwrap_or(self.config.inputs.labels.as_path());
        let labels = AssessmentInput::load(labels_path)?.label_map();
        let runs = batchfile::parse_batch_file(batch_csv)?;

        let results = qc::check_batch(&runs, &labels);
        let report_path = self.metadata().qc_report_path();
        qc::write_report(&results, &report_path)?;

        Ok(CheckReport {
            report_path,
            checked: results.len(),
            invalid: results.iter().filter(|r| !r.run_is_valid).count(),
        })
    }
}
