use crate::error::{PwcBatchError, Result};
use crate::models::label::TransportMechanism;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Receiving water body class used by the external model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AquaticBin {
    Static,
    Flowing,
    Wetland,
}

impl AquaticBin {
    pub fn code(&self) -> u8 {
        match self {
            AquaticBin::Static => 4,
            AquaticBin::Flowing => 7,
            AquaticBin::Wetland => 10,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            4 => Some(AquaticBin::Static),
            7 => Some(AquaticBin::Flowing),
            10 => Some(AquaticBin::Wetland),
            _ => None,
        }
    }
}

impl TryFrom<u8> for AquaticBin {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        AquaticBin::from_code(value)
            .ok_or_else(|| format!("unknown aquatic bin {} (expected 4, 7 or 10)", value))
    }
}

impl From<AquaticBin> for u8 {
    fn from(value: AquaticBin) -> Self {
        value.code()
    }
}

impl std::fmt::Display for AquaticBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Water body geometry and hydrology for one aquatic bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaterbodyParams {
    pub flow_avg_time: f64,
    pub field_size_m2: f64,
    pub waterbody_area_m2: f64,
    pub init_depth_m: f64,
    pub max_depth_m: f64,
    pub hydraulic_length_m: f64,
    pub pua: f64,
    pub baseflow: f64,
}

impl WaterbodyParams {
    pub fn validate(&self, bin: AquaticBin) -> Result<()> {
        let fields = [
            ("flow_avg_time", self.flow_avg_time),
            ("field_size_m2", self.field_size_m2),
            ("waterbody_area_m2", self.waterbody_area_m2),
            ("init_depth_m", self.init_depth_m),
            ("max_depth_m", self.max_depth_m),
            ("hydraulic_length_m", self.hydraulic_length_m),
            ("pua", self.pua),
            ("baseflow", self.baseflow),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(PwcBatchError::Validation(format!(
                "waterbody for bin {}: {} must be a non-negative number, got {}",
                bin, name, value
            )));
        }
        Ok(())
    }
}

fn default_efficiency() -> f64 {
    1.0
}

/// Landscape refinement for one run: buffer distance, drift mitigation and pathway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandscapeParams {
    pub distance_ft: f64,
    /// Fraction of applied mass reaching the water body by drift after mitigation.
    #[serde(default)]
    pub drift_reduction_factor: f64,
    pub transport_mechanism: TransportMechanism,
    pub aquatic_bin: AquaticBin,
    /// Fraction of applied mass reaching the field.
    #[serde(default = "default_efficiency")]
    pub application_efficiency: f64,
    /// Drift table profile; when set, drift and efficiency come from the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_profile: Option<String>,
}

impl LandscapeParams {
    pub fn new(
        distance_ft: f64,
        drift_reduction_factor: f64,
        transport_mechanism: TransportMechanism,
        aquatic_bin: AquaticBin,
    ) -> Self {
        Self {
            distance_ft,
            drift_reduction_factor,
            transport_mechanism,
            aquatic_bin,
            application_efficiency: default_efficiency(),
            drift_profile: None,
        }
    }

    pub fn with_efficiency(mut self, efficiency: f64) -> Self {
        self.application_efficiency = efficiency;
        self
    }

    pub fn with_drift_profile(mut self, profile: &str) -> Self {
        self.drift_profile = Some(profile.trim().to_string());
        self
    }

    /// Copy with drift and efficiency filled from `table` when a profile is named.
    ///
    /// Runoff-only landscapes keep a drift factor of 0 and only take the
    /// profile's efficiency.
    pub fn resolved(&self, table: Option<&DriftReductionTable>) -> Result<LandscapeParams> {
        let Some(profile) = self.drift_profile.as_deref() else {
            return Ok(self.clone());
        };
        let table = table.ok_or_else(|| {
            PwcBatchError::Validation(format!(
                "landscape names drift profile '{}' but no drift reduction table is configured",
                profile
            ))
        })?;
        let (drift, efficiency) = table
            .lookup(self.aquatic_bin, profile, self.distance_ft)
            .ok_or_else(|| {
                PwcBatchError::Validation(format!(
                    "drift profile '{}' has no entry for {} ft",
                    profile_key(self.aquatic_bin, profile),
                    self.distance_ft
                ))
            })?;

        let mut resolved = self.clone();
        resolved.drift_reduction_factor = match self.transport_mechanism {
            TransportMechanism::Runoff => 0.0,
            _ => drift,
        };
        resolved.application_efficiency = efficiency;
        Ok(resolved)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.distance_ft.is_finite() || self.distance_ft < 0.0 {
            return Err(PwcBatchError::Validation(format!(
                "landscape distance {} ft must be a non-negative number",
                self.distance_ft
            )));
        }
        if !(0.0..=1.0).contains(&self.drift_reduction_factor) {
            return Err(PwcBatchError::Validation(format!(
                "drift reduction factor {} must be within [0, 1]",
                self.drift_reduction_factor
            )));
        }
        if !(self.application_efficiency > 0.0 && self.application_efficiency <= 1.0) {
            return Err(PwcBatchError::Validation(format!(
                "application efficiency {} must be within (0, 1]",
                self.application_efficiency
            )));
        }
        if self.transport_mechanism == TransportMechanism::Runoff
            && self.drift_reduction_factor != 0.0
        {
            return Err(PwcBatchError::Validation(format!(
                "runoff-only landscape at {} ft must have a drift factor of 0, got {}",
                self.distance_ft, self.drift_reduction_factor
            )));
        }
        Ok(())
    }
}

/// Key of a drift table row: aquatic bin code and profile name.
pub fn profile_key(bin: AquaticBin, profile: &str) -> String {
    format!("{}-{}", bin.code(), profile.trim())
}

#[derive(Debug, Clone, PartialEq)]
struct DriftProfileRow {
    efficiency: f64,
    /// (distance ft, drift fraction), ascending by distance.
    by_distance: Vec<(f64, f64)>,
}

/// Drift fractions by bin/profile and buffer distance, plus each profile's efficiency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftReductionTable {
    rows: BTreeMap<String, DriftProfileRow>,
}

impl DriftReductionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one row keyed `"{bin}-{profile}"`, e.g. `"4-GROUND_VF"`.
    pub fn with_profile(
        mut self,
        key: &str,
        efficiency: f64,
        by_distance: &[(f64, f64)],
    ) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(PwcBatchError::Validation(
                "drift table profile must not be empty".into(),
            ));
        }
        if !(efficiency > 0.0 && efficiency <= 1.0) {
            return Err(PwcBatchError::Validation(format!(
                "drift profile '{}': efficiency {} must be within (0, 1]",
                key, efficiency
            )));
        }
        if let Some((distance, drift)) = by_distance
            .iter()
            .find(|(d, f)| !d.is_finite() || *d < 0.0 || !(0.0..=1.0).contains(f))
        {
            return Err(PwcBatchError::Validation(format!(
                "drift profile '{}': drift {} at {} ft is out of range",
                key, drift, distance
            )));
        }

        let mut by_distance = by_distance.to_vec();
        by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.rows.insert(
            key.to_string(),
            DriftProfileRow {
                efficiency,
                by_distance,
            },
        );
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// (drift fraction, efficiency) for an exact distance column; no interpolation.
    pub fn lookup(&self, bin: AquaticBin, profile: &str, distance_ft: f64) -> Option<(f64, f64)> {
        let row = self.rows.get(&profile_key(bin, profile))?;
        row.by_distance
            .iter()
            .find(|(d, _)| (d - distance_ft).abs() < 1e-9)
            .map(|(_, drift)| (*drift, row.efficiency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aquatic_bin_codes() {
        assert_eq!(AquaticBin::from_code(4), Some(AquaticBin::Static));
        assert_eq!(AquaticBin::from_code(7), Some(AquaticBin::Flowing));
        assert_eq!(AquaticBin::from_code(10), Some(AquaticBin::Wetland));
        assert_eq!(AquaticBin::from_code(5), None);
        assert_eq!(AquaticBin::Wetland.to_string(), "10");
    }

    #[test]
    fn landscape_validation() {
        let ok = LandscapeParams::new(
            0.0,
            0.125,
            TransportMechanism::RunoffAndDrift,
            AquaticBin::Static,
        );
        assert!(ok.validate().is_ok());

        let bad_drift = LandscapeParams {
            drift_reduction_factor: 1.5,
            ..ok.clone()
        };
        assert!(bad_drift.validate().is_err());

        let negative_distance = LandscapeParams {
            distance_ft: -10.0,
            ..ok.clone()
        };
        assert!(negative_distance.validate().is_err());

        let runoff_with_drift = LandscapeParams {
            transport_mechanism: TransportMechanism::Runoff,
            ..ok.clone()
        };
        assert!(runoff_with_drift.validate().is_err());

        let zero_efficiency = ok.with_efficiency(0.0);
        assert!(zero_efficiency.validate().is_err());
    }

    #[test]
    fn landscape_deserializes_with_default_efficiency() {
        let yaml = r#"
distance_ft: 100
drift_reduction_factor: 0.05
transport_mechanism: RD
aquatic_bin: 7
"#;
        let landscape: LandscapeParams = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(landscape.aquatic_bin, AquaticBin::Flowing);
        assert_eq!(landscape.application_efficiency, 1.0);
        assert_eq!(
            landscape.transport_mechanism,
            TransportMechanism::RunoffAndDrift
        );
    }

    #[test]
    fn waterbody_rejects_negative_values() {
        let wb = WaterbodyParams {
            flow_avg_time: 1.0,
            field_size_m2: 100000.0,
            waterbody_area_m2: 10000.0,
            init_depth_m: 2.0,
            max_depth_m: 2.0,
            hydraulic_length_m: 356.8,
            pua: 1.0,
            baseflow: -1.0,
        };
        assert!(wb.validate(AquaticBin::Static).is_err());
        let fixed = WaterbodyParams {
            baseflow: 0.0,
            ..wb
        };
        assert!(fixed.validate(AquaticBin::Static).is_ok());
    }

    fn drift_table() -> DriftReductionTable {
        DriftReductionTable::new()
            .with_profile("4-GROUND_VF", 0.99, &[(0.0, 0.062), (100.0, 0.012)])
            .unwrap()
            .with_profile("7-GROUND_VF", 0.99, &[(0.0, 0.041)])
            .unwrap()
    }

    #[test]
    fn drift_profile_fills_drift_and_efficiency() {
        let landscape =
            LandscapeParams::new(100.0, 0.0, TransportMechanism::RunoffAndDrift, AquaticBin::Static)
                .with_drift_profile("GROUND_VF");
        let resolved = landscape.resolved(Some(&drift_table())).unwrap();
        assert_eq!(resolved.drift_reduction_factor, 0.012);
        assert_eq!(resolved.application_efficiency, 0.99);
        assert!(resolved.validate().is_ok());
    }

    #[test]
    fn runoff_landscape_takes_only_efficiency() {
        let landscape =
            LandscapeParams::new(0.0, 0.0, TransportMechanism::Runoff, AquaticBin::Static)
                .with_drift_profile("GROUND_VF");
        let resolved = landscape.resolved(Some(&drift_table())).unwrap();
        assert_eq!(resolved.drift_reduction_factor, 0.0);
        assert_eq!(resolved.application_efficiency, 0.99);
    }

    #[test]
    fn unknown_profile_or_distance_is_rejected() {
        let table = drift_table();
        let missing_distance =
            LandscapeParams::new(100.0, 0.0, TransportMechanism::Drift, AquaticBin::Flowing)
                .with_drift_profile("GROUND_VF");
        let err = missing_distance.resolved(Some(&table)).unwrap_err();
        assert!(err.to_string().contains("7-GROUND_VF"));

        let missing_profile =
            LandscapeParams::new(0.0, 0.0, TransportMechanism::Drift, AquaticBin::Static)
                .with_drift_profile("AERIAL_F");
        assert!(missing_profile.resolved(Some(&table)).is_err());
        assert!(missing_profile.resolved(None).is_err());
    }

    #[test]
    fn landscape_without_profile_is_unchanged() {
        let landscape =
            LandscapeParams::new(25.0, 0.2, TransportMechanism::Drift, AquaticBin::Static);
        assert_eq!(landscape.resolved(None).unwrap(), landscape);
    }

    #[test]
    fn drift_table_rejects_out_of_range_values() {
        assert!(DriftReductionTable::new()
            .with_profile("4-X", 1.5, &[(0.0, 0.1)])
            .is_err());
        assert!(DriftReductionTable::new()
            .with_profile("4-X", 1.0, &[(0.0, 1.1)])
            .is_err());
        assert!(DriftReductionTable::new()
            .with_profile(" ", 1.0, &[(0.0, 0.1)])
            .is_err());
    }
}
