pub mod climate;
pub mod label;
pub mod landscape;
pub mod run;
pub mod schedule;

pub use climate::{normalize_region, ClimateReference, WetnessLookup, WetnessRank};
pub use label::{
    ApplicationMethod, LabelRestriction, MonthDay, RateUnit, TransportMechanism, REFERENCE_YEAR,
};
pub use landscape::{AquaticBin, DriftReductionTable, LandscapeParams, WaterbodyParams};
pub use run::{
    AssessmentType, Batch, BatchMetadata, ChemicalProperties, ModelOptions, RunDefinition,
    RunId, RunParts,
};
pub use schedule::{
    ApplicationEvent, ApplicationSchedule, DatePrioritization, SiteParams, MAX_YEAR, MIN_YEAR,
    RATE_EPSILON,
};
