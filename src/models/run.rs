use crate::models::label::ApplicationMethod;
use crate::models::landscape::{LandscapeParams, WaterbodyParams};
use crate::models::schedule::{ApplicationSchedule, DatePrioritization};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentType {
    #[default]
    Fifra,
    Esa,
}

impl AssessmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentType::Fifra => "FIFRA",
            AssessmentType::Esa => "ESA",
        }
    }
}

impl std::fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_reference_temp() -> f64 {
    25.0
}

/// Chemical fate inputs written verbatim into every run.
///
/// Half-lives of 0 mean "stable" to the external model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChemicalProperties {
    pub name: String,
    #[serde(default)]
    pub sorption_coefficient: f64,
    /// true when the sorption coefficient is a Koc rather than a Kd
    #[serde(default = "default_koc_flag")]
    pub koc_flag: bool,
    #[serde(default)]
    pub water_column_halflife_days: f64,
    #[serde(default = "default_reference_temp")]
    pub water_reference_temp_c: f64,
    #[serde(default)]
    pub benthic_halflife_days: f64,
    #[serde(default = "default_reference_temp")]
    pub benthic_reference_temp_c: f64,
    #[serde(default)]
    pub photolysis_halflife_days: f64,
    #[serde(default = "default_photolysis_latitude")]
    pub photolysis_reference_latitude: f64,
    #[serde(default)]
    pub hydrolysis_halflife_days: f64,
    #[serde(default)]
    pub soil_halflife_days: f64,
    #[serde(default = "default_reference_temp")]
    pub soil_reference_temp_c: f64,
    #[serde(default)]
    pub foliar_halflife_days: f64,
    #[serde(default)]
    pub molecular_weight: f64,
    #[serde(default)]
    pub vapor_pressure_torr: f64,
    #[serde(default)]
    pub solubility_mg_l: f64,
    #[serde(default)]
    pub henry_constant: f64,
    #[serde(default)]
    pub air_diffusion_cm3_d: f64,
    #[serde(default)]
    pub heat_of_henry_j_mol: f64,
}

fn default_koc_flag() -> bool {
    true
}

fn default_photolysis_latitude() -> f64 {
    40.0
}

impl ChemicalProperties {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sorption_coefficient: 0.0,
            koc_flag: default_koc_flag(),
            water_column_halflife_days: 0.0,
            water_reference_temp_c: default_reference_temp(),
            benthic_halflife_days: 0.0,
            benthic_reference_temp_c: default_reference_temp(),
            photolysis_halflife_days: 0.0,
            photolysis_reference_latitude: default_photolysis_latitude(),
            hydrolysis_halflife_days: 0.0,
            soil_halflife_days: 0.0,
            soil_reference_temp_c: default_reference_temp(),
            foliar_halflife_days: 0.0,
            molecular_weight: 0.0,
            vapor_pressure_torr: 0.0,
            solubility_mg_l: 0.0,
            henry_constant: 0.0,
            air_diffusion_cm3_d: 0.0,
            heat_of_henry_j_mol: 0.0,
        }
    }

    /// Numeric fate parameters in batch column order (the Koc flag sits between the first two).
    pub fn numeric_fields(&self) -> [f64; 17] {
        [
            self.sorption_coefficient,
            self.water_column_halflife_days,
            self.water_reference_temp_c,
            self.benthic_halflife_days,
            self.benthic_reference_temp_c,
            self.photolysis_halflife_days,
            self.photolysis_reference_latitude,
            self.hydrolysis_halflife_days,
            self.soil_halflife_days,
            self.soil_reference_temp_c,
            self.foliar_halflife_days,
            self.molecular_weight,
            self.vapor_pressure_torr,
            self.solubility_mg_l,
            self.henry_constant,
            self.air_diffusion_cm3_d,
            self.heat_of_henry_j_mol,
        ]
    }
}

/// Global model switches shared by every run in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default)]
    pub assessment: AssessmentType,
    #[serde(default)]
    pub date_prioritization: DatePrioritization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub run_id: String,
    pub chemical: ChemicalProperties,
    pub output_dir: PathBuf,
    pub options: ModelOptions,
}

impl BatchMetadata {
    /// `<output_dir>/<run_id>_new_batch_file.csv`
    pub fn batch_file_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_new_batch_file.csv", self.run_id))
    }

    /// `<output_dir>/<run_id> QC Results.csv`
    pub fn qc_report_path(&self) -> PathBuf {
        self.output_dir.join(format!("{} QC Results.csv", self.run_id))
    }
}

/// Stable identifier derived from chemical, site and variant indices.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn derive(
        chemical: &str,
        scenario: &str,
        schedule_index: usize,
        landscape_index: usize,
    ) -> Self {
        Self(format!(
            "{}_{}_s{:02}_l{:02}",
            sanitize(chemical),
            sanitize(scenario),
            schedule_index,
            landscape_index
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collapse every run of non-alphanumeric characters into a single `-`.
fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// One fully resolved simulation run. Immutable once assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDefinition {
    id: RunId,
    name: String,
    chemical: String,
    schedule: ApplicationSchedule,
    landscape: LandscapeParams,
    waterbody: WaterbodyParams,
    application_method: ApplicationMethod,
    depth_cm: Option<u32>,
    tband_split: Option<f64>,
    schedule_index: usize,
    landscape_index: usize,
}

/// Fields resolved by the assembler for a single run.
pub struct RunParts {
    pub id: RunId,
    pub name: String,
    pub chemical: String,
    pub schedule: ApplicationSchedule,
    pub landscape: LandscapeParams,
    pub waterbody: WaterbodyParams,
    pub application_method: ApplicationMethod,
    pub depth_cm: Option<u32>,
    pub tband_split: Option<f64>,
    pub schedule_index: usize,
    pub landscape_index: usize,
}

impl RunDefinition {
    pub fn from_parts(parts: RunParts) -> Self {
        Self {
            id: parts.id,
            name: parts.name,
            chemical: parts.chemical,
            schedule: parts.schedule,
            landscape: parts.landscape,
            waterbody: parts.waterbody,
            application_method: parts.application_method,
            depth_cm: parts.depth_cm,
            tband_split: parts.tband_split,
            schedule_index: parts.schedule_index,
            landscape_index: parts.landscape_index,
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chemical(&self) -> &str {
        &self.chemical
    }

    pub fn descriptor(&self) -> &str {
        &self.schedule.label.descriptor
    }

    pub fn schedule(&self) -> &ApplicationSchedule {
        &self.schedule
    }

    pub fn landscape(&self) -> &LandscapeParams {
        &self.landscape
    }

    pub fn waterbody(&self) -> &WaterbodyParams {
        &self.waterbody
    }

    /// Method written to the batch file; drift-only runs differ from the label's method.
    pub fn application_method(&self) -> ApplicationMethod {
        self.application_method
    }

    pub fn depth_cm(&self) -> Option<u32> {
        self.depth_cm
    }

    pub fn tband_split(&self) -> Option<f64> {
        self.tband_split
    }

    pub fn schedule_index(&self) -> usize {
        self.schedule_index
    }

    pub fn landscape_index(&self) -> usize {
        self.landscape_index
    }
}

/// Ordered runs plus the metadata shared by all of them; the unit handed to the serializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub metadata: BatchMetadata,
    pub runs: Vec<RunDefinition>,
}

impl Batch {
    pub fn new(metadata: BatchMetadata, runs: Vec<RunDefinition>) -> Self {
        Self { metadata, runs }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
