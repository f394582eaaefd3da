pub mod drift_table;
pub mod labels;
pub mod wettest_month;

pub use drift_table::load_drift_table;
pub use labels::AssessmentInput;
pub use wettest_month::load_wettest_months;
