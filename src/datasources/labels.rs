use crate::error::{PwcBatchError, Result};
use crate::models::{LabelRestriction, LandscapeParams, SiteParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One explicitly requested run: a label at a site, joined with a landscape variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSpec {
    /// Label descriptor
    pub label: String,
    /// Site scenario
    pub site: String,
    /// Position in `landscapes`
    pub landscape: usize,
}

/// Structured label, site and landscape records for one assessment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInput {
    pub labels: Vec<LabelRestriction>,
    pub sites: Vec<SiteParams>,
    pub landscapes: Vec<LandscapeParams>,
    #[serde(default)]
    pub pairs: Option<Vec<PairSpec>>,
}

impl AssessmentInput {
    /// Load from YAML, or JSON when the file extension is `.json`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PwcBatchError::NotFound(format!(
                "assessment input {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let input: AssessmentInput = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        input.check_shape()?;
        debug!(
            labels = input.labels.len(),
            sites = input.sites.len(),
            landscapes = input.landscapes.len(),
            "loaded assessment input from {}",
            path.display()
        );
        Ok(input)
    }

    /// Request-level checks; per-label and per-landscape validation happens per run.
    fn check_shape(&self) -> Result<()> {
        if self.labels.is_empty() || self.sites.is_empty() || self.landscapes.is_empty() {
            return Err(PwcBatchError::InvalidData(
                "assessment input needs at least one label, site and landscape".into(),
            ));
        }
        let mut descriptors = std::collections::HashSet::new();
        if let Some(dup) = self
            .labels
            .iter()
            .find(|l| !descriptors.insert(l.descriptor.as_str()))
        {
            return Err(PwcBatchError::InvalidData(format!(
                "label descriptor '{}' appears more than once",
                dup.descriptor
            )));
        }
        let mut scenarios = std::collections::HashSet::new();
        if let Some(dup) = self
            .sites
            .iter()
            .find(|s| !scenarios.insert(s.scenario.as_str()))
        {
            return Err(PwcBatchError::InvalidData(format!(
                "site scenario '{}' appears more than once",
                dup.scenario
            )));
        }
        Ok(())
    }

    /// Labels keyed by descriptor, as the batch file quality check looks them up.
    pub fn label_map(&self) -> BTreeMap<String, LabelRestriction> {
        self.labels
            .iter()
            .map(|l| (l.descriptor.clone(), l.clone()))
            .collect()
    }
}
