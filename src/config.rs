use crate::error::{PwcBatchError, Result};
use crate::models::{
    AquaticBin, AssessmentType, ChemicalProperties, DatePrioritization, ModelOptions,
    WaterbodyParams,
};
use dialoguer::{Input, Select};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Prefix of every output file name.
    pub run_id: String,
    pub output_dir: PathBuf,
    pub chemical: ChemicalProperties,
    #[serde(default)]
    pub model: ModelOptions,
    pub inputs: InputsConfig,
    /// Waterbody parameters per aquatic bin (4, 7, 10).
    #[serde(default = "default_waterbodies")]
    pub waterbodies: BTreeMap<AquaticBin, WaterbodyParams>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputsConfig {
    /// Label, site and landscape records (YAML or JSON).
    pub labels: PathBuf,
    /// Wettest-month table (CSV); required for wettest-period prioritization.
    #[serde(default)]
    pub wettest_months: Option<PathBuf>,
    /// Drift reduction table (CSV); required when a landscape names a drift profile.
    #[serde(default)]
    pub drift_reduction_table: Option<PathBuf>,
}

/// Standard EPA waterbodies: farm pond (4), flowing stream (7) and wetland (10).
fn default_waterbodies() -> BTreeMap<AquaticBin, WaterbodyParams> {
    BTreeMap::from([
        (
            AquaticBin::Static,
            WaterbodyParams {
                flow_avg_time: 0.0,
                field_size_m2: 100000.0,
                waterbody_area_m2: 10000.0,
                init_depth_m: 2.0,
                max_depth_m: 2.0,
                hydraulic_length_m: 356.8,
                pua: 1.0,
                baseflow: 0.0,
            },
        ),
        (
            AquaticBin::Flowing,
            WaterbodyParams {
                flow_avg_time: 1.0,
                field_size_m2: 1728000.0,
                waterbody_area_m2: 5260.0,
                init_depth_m: 1.0,
                max_depth_m: 1.0,
                hydraulic_length_m: 5.0,
                pua: 0.0,
                baseflow: 0.0,
            },
        ),
        (
            AquaticBin::Wetland,
            WaterbodyParams {
                flow_avg_time: 1.0,
                field_size_m2: 1728000.0,
                waterbody_area_m2: 52600.0,
                init_depth_m: 0.15,
                max_depth_m: 0.15,
                hydraulic_length_m: 229.3,
                pua: 1.0,
                baseflow: 0.0,
            },
        ),
    ])
}

impl Config {
    pub fn load(config_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_override {
            Some(p) => p,
            None => Self::find_config_path()?,
        };

        if !config_path.exists() {
            return Err(PwcBatchError::Config(format!(
                "Config file not found at {:?}. Run `pwc-batch init` to set up.",
                config_path
            )));
        }

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| PwcBatchError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = Self::substitute_env_vars(content);

        let config: Config = serde_yaml::from_str(&config_str)
            .map_err(|e| PwcBatchError::Config(format!("Failed to parse config: {}", e)))?;

        if config.run_id.trim().is_empty() {
            return Err(PwcBatchError::Config("run_id must not be empty".into()));
        }
        for (bin, waterbody) in &config.waterbodies {
            waterbody
                .validate(*bin)
                .map_err(|e| PwcBatchError::Config(e.to_string()))?;
        }
        Ok(config)
    }

    /// Search for config.yaml in standard locations.
    /// Returns the path of the first found config, or the XDG default path if none found.
    fn find_config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("config/config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let default_path = Self::default_config_path()?;
        Ok(default_path)
    }

    /// Returns true if a config file can be found in any standard location.
    pub fn exists(config_override: Option<&PathBuf>) -> bool {
        match config_override {
            Some(p) => p.exists(),
            None => Self::find_config_path()
                .map(|p| p.exists())
                .unwrap_or(false),
        }
    }

    /// Default path for writing new config files (~/.config/pwc-batch/config.yaml).
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| PwcBatchError::Config("Cannot determine config directory".into()))?
            .join("pwc-batch");
        Ok(config_dir.join("config.yaml"))
    }

    /// Run interactive setup prompts and write config to disk.
    /// Returns the new Config and the path it was written to.
    pub fn setup_interactive() -> Result<(Self, PathBuf)> {
        let input_err = |e: dialoguer::Error| PwcBatchError::Config(format!("Input error: {}", e));

        println!();
        println!("Let's set up pwc-batch.");
        println!();

        println!("Run");
        let run_id: String = Input::new()
            .with_prompt("  Run ID (output file prefix)")
            .default("pwc_run".into())
            .interact_text()
            .map_err(input_err)?;

        let output_dir: String = Input::new()
            .with_prompt("  Output directory")
            .default("output".into())
            .interact_text()
            .map_err(input_err)?;

        println!();
        println!("Chemical");
        let chemical_name: String = Input::new()
            .with_prompt("  Name")
            .interact_text()
            .map_err(input_err)?;

        let koc: f64 = Input::new()
            .with_prompt("  Koc (mL/g)")
            .default(100.0)
            .interact_text()
            .map_err(input_err)?;

        let soil_halflife: f64 = Input::new()
            .with_prompt("  Soil half-life (days, 0 = stable)")
            .default(0.0)
            .interact_text()
            .map_err(input_err)?;

        println!();
        println!("Model");
        let assessment = match Select::new()
            .with_prompt("  Assessment")
            .items(&["FIFRA", "ESA"])
            .default(0)
            .interact()
            .map_err(input_err)?
        {
            0 => AssessmentType::Fifra,
            _ => AssessmentType::Esa,
        };

        let date_prioritization = match Select::new()
            .with_prompt("  Date prioritization")
            .items(&["Wettest period", "Calendar"])
            .default(0)
            .interact()
            .map_err(input_err)?
        {
            0 => DatePrioritization::WettestPeriod,
            _ => DatePrioritization::Calendar,
        };

        println!();
        println!("Inputs");
        let labels: String = Input::new()
            .with_prompt("  Label/site/landscape file")
            .default("inputs/assessment.yaml".into())
            .interact_text()
            .map_err(input_err)?;

        let wettest_months: String = Input::new()
            .with_prompt("  Wettest month table (blank to skip)")
            .default("inputs/wettest_months.csv".into())
            .allow_empty(true)
            .interact_text()
            .map_err(input_err)?;

        let drift_table: String = Input::new()
            .with_prompt("  Drift reduction table (blank to skip)")
            .allow_empty(true)
            .interact_text()
            .map_err(input_err)?;

        println!();

        let mut chemical = ChemicalProperties::new(&chemical_name);
        chemical.sorption_coefficient = koc;
        chemical.soil_halflife_days = soil_halflife;

        let config = Config {
            run_id,
            output_dir: PathBuf::from(output_dir),
            chemical,
            model: ModelOptions {
                assessment,
                date_prioritization,
            },
            inputs: InputsConfig {
                labels: PathBuf::from(labels),
                wettest_months: (!wettest_months.is_empty())
                    .then(|| PathBuf::from(wettest_months)),
                drift_reduction_table: (!drift_table.is_empty())
                    .then(|| PathBuf::from(drift_table)),
            },
            waterbodies: default_waterbodies(),
        };

        let config_path = Self::default_config_path()?;
        config.write_to(&config_path)?;

        println!("Configuration saved to {}", config_path.display());
        println!();

        Ok((config, config_path))
    }

    /// Write as YAML with a header comment, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)
            .map_err(|e| PwcBatchError::Config(format!("Failed to serialize config: {}", e)))?;

        let content = format!(
            "# pwc-batch Configuration\n# Generated by `pwc-batch init`\n# Environment variable substitution (${{VAR}}) is supported.\n\n{}",
            yaml
        );
        std::fs::write(path, content)?;
        Ok(())
    }

    fn substitute_env_vars(content: &str) -> String {
        let mut result = content.to_string();

        let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") else {
            return result;
        };

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];
            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(placeholder, &value);
            }
        }

        result
    }

    /// Output directory: CLI override, then `PWC_BATCH_OUTPUT_DIR`, then the configured one.
    pub fn resolve_output_dir(&self, override_dir: Option<&PathBuf>) -> Result<PathBuf> {
        let dir = match override_dir {
            Some(dir) => dir.clone(),
            None => match std::env::var("PWC_BATCH_OUTPUT_DIR") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => self.output_dir.clone(),
            },
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_id: "pwc_run".into(),
            output_dir: PathBuf::from("output"),
            chemical: ChemicalProperties::new("chemical"),
            model: ModelOptions::default(),
            inputs: InputsConfig {
                labels: PathBuf::from("inputs/assessment.yaml"),
                wettest_months: Some(PathBuf::from("inputs/wettest_months.csv")),
                drift_reduction_table: Some(PathBuf::from("inputs/drift_reduction.csv")),
            },
            waterbodies: default_waterbodies(),
        }
    }
}
