use thiserror::Error;

#[derive(Error, Debug)]
pub enum PwcBatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Infeasible schedule for label '{label}' at site '{site}': {constraint}")]
    InfeasibleSchedule {
        label: String,
        site: String,
        constraint: String,
    },

    #[error("Assembly validation error for run '{run}': {reason}")]
    AssemblyValidation { run: String, reason: String },

    #[error("Serialization error for run '{run}': {reason}")]
    Serialization { run: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl PwcBatchError {
    /// True for failures scoped to a single run; the rest of the batch can proceed.
    pub fn is_per_run(&self) -> bool {
        matches!(
            self,
            PwcBatchError::Validation(_)
                | PwcBatchError::InfeasibleSchedule { .. }
                | PwcBatchError::AssemblyValidation { .. }
                | PwcBatchError::Serialization { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PwcBatchError>;
