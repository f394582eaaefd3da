use crate::error::{PwcBatchError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Non-leap year used to resolve month/day pairs to a day of year.
pub const REFERENCE_YEAR: i32 = 2021;

/// kg/ha per lb/acre
pub const LBS_ACRE_TO_KG_HA: f64 = 1.120851;

/// A calendar day without a year, e.g. a label's "apply after April 1".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Result<Self> {
        // Feb 29 is rejected so every window resolves in every simulated year
        NaiveDate::from_ymd_opt(REFERENCE_YEAR, month, day).ok_or_else(|| {
            PwcBatchError::Validation(format!(
                "invalid label date {:02}-{:02} (must exist in a non-leap year)",
                month, day
            ))
        })?;
        Ok(Self { month, day })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    /// This month/day in the given year.
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }

    /// Day of year in the non-leap reference year (1..=365).
    pub fn reference_ordinal(&self) -> u32 {
        NaiveDate::from_ymd_opt(REFERENCE_YEAR, self.month, self.day)
            .map(|d| d.ordinal())
            .unwrap_or(59)
    }
}

impl std::str::FromStr for MonthDay {
    type Err = PwcBatchError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (m, d) = trimmed
            .split_once(['-', '/'])
            .ok_or_else(|| PwcBatchError::Validation(format!("expected MM-DD, got '{}'", s)))?;
        let month = m
            .trim()
            .parse::<u32>()
            .map_err(|_| PwcBatchError::Validation(format!("invalid month in '{}'", s)))?;
        let day = d
            .trim()
            .parse::<u32>()
            .map_err(|_| PwcBatchError::Validation(format!("invalid day in '{}'", s)))?;
        MonthDay::new(month, day)
    }
}

impl TryFrom<String> for MonthDay {
    type Error = PwcBatchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MonthDay> for String {
    fn from(value: MonthDay) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for MonthDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    #[default]
    KgPerHa,
    LbPerAcre,
}

impl RateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateUnit::KgPerHa => "kg/ha",
            RateUnit::LbPerAcre => "lb/acre",
        }
    }

    pub fn to_kg_ha(&self, value: f64) -> f64 {
        match self {
            RateUnit::KgPerHa => value,
            RateUnit::LbPerAcre => value * LBS_ACRE_TO_KG_HA,
        }
    }
}

impl std::fmt::Display for RateUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// PWC application method codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ApplicationMethod {
    SoilSurface,
    #[default]
    Foliar,
    UniformIncorporation,
    AtDepth,
    TBand,
    IncreasingWithDepth,
    DecreasingWithDepth,
}

impl ApplicationMethod {
    pub fn code(&self) -> u8 {
        match self {
            ApplicationMethod::SoilSurface => 1,
            ApplicationMethod::Foliar => 2,
            ApplicationMethod::UniformIncorporation => 3,
            ApplicationMethod::AtDepth => 4,
            ApplicationMethod::TBand => 5,
            ApplicationMethod::IncreasingWithDepth => 6,
            ApplicationMethod::DecreasingWithDepth => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ApplicationMethod::SoilSurface),
            2 => Some(ApplicationMethod::Foliar),
            3 => Some(ApplicationMethod::UniformIncorporation),
            4 => Some(ApplicationMethod::AtDepth),
            5 => Some(ApplicationMethod::TBand),
            6 => Some(ApplicationMethod::IncreasingWithDepth),
            7 => Some(ApplicationMethod::DecreasingWithDepth),
            _ => None,
        }
    }

    /// Soil-incorporated methods (3-7) place the chemical below the surface.
    pub fn is_incorporated(&self) -> bool {
        self.code() >= 3
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationMethod::SoilSurface => "Soil Surface",
            ApplicationMethod::Foliar => "Foliar",
            ApplicationMethod::UniformIncorporation => "Uniform Incorporation",
            ApplicationMethod::AtDepth => "At Depth",
            ApplicationMethod::TBand => "T-Band",
            ApplicationMethod::IncreasingWithDepth => "Increasing With Depth",
            ApplicationMethod::DecreasingWithDepth => "Decreasing With Depth",
        }
    }
}

impl TryFrom<u8> for ApplicationMethod {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        ApplicationMethod::from_code(value)
            .ok_or_else(|| format!("unknown application method {} (expected 1-7)", value))
    }
}

impl From<ApplicationMethod> for u8 {
    fn from(value: ApplicationMethod) -> Self {
        value.code()
    }
}

impl std::fmt::Display for ApplicationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pathway by which the chemical reaches the water body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransportMechanism {
    #[serde(rename = "R", alias = "runoff")]
    Runoff,
    #[serde(rename = "D", alias = "drift")]
    Drift,
    #[serde(rename = "RD", alias = "runoff_drift")]
    RunoffAndDrift,
}

impl TransportMechanism {
    pub fn code(&self) -> &'static str {
        match self {
            TransportMechanism::Runoff => "R",
            TransportMechanism::Drift => "D",
            TransportMechanism::RunoffAndDrift => "RD",
        }
    }

    pub fn has_drift(&self) -> bool {
        matches!(
            self,
            TransportMechanism::Drift | TransportMechanism::RunoffAndDrift
        )
    }
}

impl std::fmt::Display for TransportMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Structured use restrictions for one pesticide label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRestriction {
    pub descriptor: String,
    pub earliest_date: MonthDay,
    pub latest_date: MonthDay,
    #[serde(default)]
    pub min_interval_days: u32,
    pub max_applications: u32,
    pub max_single_rate: f64,
    pub max_annual_rate: f64,
    #[serde(default)]
    pub rate_unit: RateUnit,
    pub allowed_transport_mechanisms: BTreeSet<TransportMechanism>,
    #[serde(default)]
    pub application_method: ApplicationMethod,
    #[serde(default)]
    pub incorporation_depth_cm: Option<u32>,
    #[serde(default)]
    pub tband_split: Option<f64>,
}

impl LabelRestriction {
    pub fn new(
        descriptor: &str,
        earliest_date: MonthDay,
        latest_date: MonthDay,
        max_applications: u32,
        max_single_rate: f64,
        max_annual_rate: f64,
    ) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            earliest_date,
            latest_date,
            min_interval_days: 0,
            max_applications,
            max_single_rate,
            max_annual_rate,
            rate_unit: RateUnit::KgPerHa,
            allowed_transport_mechanisms: [
                TransportMechanism::Runoff,
                TransportMechanism::Drift,
                TransportMechanism::RunoffAndDrift,
            ]
            .into_iter()
            .collect(),
            application_method: ApplicationMethod::Foliar,
            incorporation_depth_cm: None,
            tband_split: None,
        }
    }

    pub fn with_min_interval(mut self, days: u32) -> Self {
        self.min_interval_days = days;
        self
    }

    pub fn with_rate_unit(mut self, unit: RateUnit) -> Self {
        self.rate_unit = unit;
        self
    }

    pub fn with_transport(mut self, mechanisms: &[TransportMechanism]) -> Self {
        self.allowed_transport_mechanisms = mechanisms.iter().copied().collect();
        self
    }

    pub fn with_method(
        mut self,
        method: ApplicationMethod,
        depth_cm: Option<u32>,
        tband_split: Option<f64>,
    ) -> Self {
        self.application_method = method;
        self.incorporation_depth_cm = depth_cm;
        self.tband_split = tband_split;
        self
    }

    /// Reject contradictory or malformed restrictions before solving.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| {
            Err(PwcBatchError::Validation(format!(
                "label '{}': {}",
                self.descriptor, msg
            )))
        };

        if self.descriptor.trim().is_empty() {
            return Err(PwcBatchError::Validation(
                "label descriptor must not be empty".into(),
            ));
        }
        if self.earliest_date > self.latest_date {
            return fail(format!(
                "earliest date {} is after latest date {}",
                self.earliest_date, self.latest_date
            ));
        }
        if self.max_applications < 1 {
            return fail("max_applications must be at least 1".into());
        }
        for (name, value) in [
            ("max_single_rate", self.max_single_rate),
            ("max_annual_rate", self.max_annual_rate),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return fail(format!("{} must be a positive number, got {}", name, value));
            }
        }
        if self.allowed_transport_mechanisms.is_empty() {
            return fail("at least one transport mechanism must be allowed".into());
        }

        let method = self.application_method;
        if method.is_incorporated() {
            if let Some(mech) = self
                .allowed_transport_mechanisms
                .iter()
                .find(|m| m.has_drift())
            {
                return fail(format!(
                    "incorporated method {} cannot use drift-bearing transport {}",
                    method.code(),
                    mech
                ));
            }
            match self.incorporation_depth_cm {
                Some(depth) if depth > 0 => {}
                _ => {
                    return fail(format!(
                        "application method {} requires a positive incorporation depth",
                        method.code()
                    ))
                }
            }
        } else if self.incorporation_depth_cm.is_some() {
            return fail(format!(
                "application method {} does not take an incorporation depth",
                method.code()
            ));
        }

        match (method, self.tband_split) {
            (ApplicationMethod::TBand, Some(split)) if (0.0..=1.0).contains(&split) => {}
            (ApplicationMethod::TBand, Some(split)) => {
                return fail(format!("T-band split {} must be within [0, 1]", split))
            }
            (ApplicationMethod::TBand, None) => {
                return fail("T-band method requires a T-band split fraction".into())
            }
            (_, Some(_)) => return fail("T-band split is only valid for method 5".into()),
            (_, None) => {}
        }

        Ok(())
    }

    pub fn max_single_rate_kg_ha(&self) -> f64 {
        self.rate_unit.to_kg_ha(self.max_single_rate)
    }

    pub fn max_annual_rate_kg_ha(&self) -> f64 {
        self.rate_unit.to_kg_ha(self.max_annual_rate)
    }

    /// Whether a calendar date falls inside the seasonal window, in any year.
    pub fn window_contains(&self, date: NaiveDate) -> bool {
        let md = MonthDay::of(date);
        self.earliest_date <= md && md <= self.latest_date
    }

    pub fn allows(&self, mechanism: TransportMechanism) -> bool {
        self.allowed_transport_mechanisms.contains(&mechanism)
    }
}
