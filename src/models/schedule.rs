use crate::error::{PwcBatchError, Result};
use crate::models::label::LabelRestriction;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance for floating-point comparisons of application amounts (kg/ha).
pub const RATE_EPSILON: f64 = 1e-9;

/// Simulated years the model's weather files can cover.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// How candidate dates are ordered within a label's window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrioritization {
    /// Wettest days first, ties broken by calendar order.
    #[default]
    WettestPeriod,
    /// Earliest permitted days first; climate data is ignored.
    Calendar,
}

impl DatePrioritization {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePrioritization::WettestPeriod => "Wettest Period",
            DatePrioritization::Calendar => "Calendar",
        }
    }

    /// Short tag used in run names.
    pub fn tag(&self) -> &'static str {
        match self {
            DatePrioritization::WettestPeriod => "pr-wetmonth",
            DatePrioritization::Calendar => "pr-calendar",
        }
    }
}

impl std::fmt::Display for DatePrioritization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a schedule is simulated: the model scenario, its region, and the simulated years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteParams {
    pub scenario: String,
    pub region: String,
    #[serde(default = "default_first_year")]
    pub first_year: i32,
    #[serde(default = "default_num_years")]
    pub num_years: u32,
}

fn default_first_year() -> i32 {
    1961
}

fn default_num_years() -> u32 {
    1
}

impl SiteParams {
    pub fn new(scenario: &str, region: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            region: region.to_string(),
            first_year: default_first_year(),
            num_years: default_num_years(),
        }
    }

    pub fn with_years(mut self, first_year: i32, num_years: u32) -> Self {
        self.first_year = first_year;
        self.num_years = num_years;
        self
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        let first = self.first_year;
        (0..self.num_years as i32).map(move |offset| first + offset)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scenario.trim().is_empty() {
            return Err(PwcBatchError::Validation(
                "site scenario must not be empty".into(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(PwcBatchError::Validation(format!(
                "site '{}': region must not be empty",
                self.scenario
            )));
        }
        if self.num_years == 0 {
            return Err(PwcBatchError::Validation(format!(
                "site '{}': at least one simulated year is required",
                self.scenario
            )));
        }
        let last_year = self.first_year as i64 + self.num_years as i64 - 1;
        if self.first_year < MIN_YEAR || last_year > MAX_YEAR as i64 {
            return Err(PwcBatchError::Validation(format!(
                "site '{}': simulated years {}-{} fall outside {}-{}",
                self.scenario, self.first_year, last_year, MIN_YEAR, MAX_YEAR
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApplicationEvent {
    pub date: NaiveDate,
    /// kg/ha
    pub rate: f64,
}

impl ApplicationEvent {
    pub fn new(date: NaiveDate, rate: f64) -> Self {
        Self { date, rate }
    }
}

/// Ordered application events for one label/site combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSchedule {
    pub label: LabelRestriction,
    pub site: SiteParams,
    pub prioritization: DatePrioritization,
    pub events: Vec<ApplicationEvent>,
    /// Position of the label/site request in the input; names the run's schedule.
    #[serde(default)]
    pub request_index: usize,
}

impl ApplicationSchedule {
    pub fn with_request_index(mut self, index: usize) -> Self {
        self.request_index = index;
        self
    }

    pub fn events_in_year(&self, year: i32) -> impl Iterator<Item = &ApplicationEvent> {
        self.events.iter().filter(move |e| e.date.year() == year)
    }

    pub fn annual_total(&self, year: i32) -> f64 {
        self.events_in_year(year).map(|e| e.rate).sum()
    }

    pub fn annual_count(&self, year: i32) -> usize {
        self.events_in_year(year).count()
    }

    /// Largest number of events placed in any one simulated year.
    pub fn max_annual_count(&self) -> usize {
        self.by_year().values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn by_year(&self) -> BTreeMap<i32, Vec<&ApplicationEvent>> {
        let mut years: BTreeMap<i32, Vec<&ApplicationEvent>> = BTreeMap::new();
        for event in &self.events {
            years.entry(event.date.year()).or_default().push(event);
        }
        years
    }

    /// Events of the first simulated year; the annual pattern written to the batch file.
    pub fn first_year_events(&self) -> Vec<&ApplicationEvent> {
        self.events_in_year(self.site.first_year).collect()
    }

    /// True when every simulated year carries the same month/day/rate pattern.
    pub fn repeats_annually(&self) -> bool {
        let pattern = |events: &Vec<&ApplicationEvent>| -> Vec<(u32, u32, u64)> {
            events
                .iter()
                .map(|e| (e.date.month(), e.date.day(), e.rate.to_bits()))
                .collect()
        };
        let years = self.by_year();
        if years.is_empty() {
            return true;
        }
        let mut patterns = years.values().map(pattern);
        let first = patterns.next();
        years.len() == self.site.num_years as usize && patterns.all(|p| Some(p) == first)
    }

    /// Check every label constraint on the placed events.
    pub fn check_invariants(&self) -> Result<()> {
        let label = &self.label;
        let fail = |reason: String| {
            Err(PwcBatchError::Validation(format!(
                "schedule '{}' at '{}': {}",
                label.descriptor, self.site.scenario, reason
            )))
        };

        for pair in self.events.windows(2) {
            if pair[1].date <= pair[0].date {
                return fail("events are not in strictly increasing date order".into());
            }
        }

        let max_single = label.max_single_rate_kg_ha();
        let max_annual = label.max_annual_rate_kg_ha();
        for event in &self.events {
            if !label.window_contains(event.date) {
                return fail(format!("{} is outside the label window", event.date));
            }
            if event.rate <= 0.0 || event.rate > max_single + RATE_EPSILON {
                return fail(format!(
                    "rate {} on {} exceeds max single rate {}",
                    event.rate, event.date, max_single
                ));
            }
        }

        for (year, events) in self.by_year() {
            if events.len() > label.max_applications as usize {
                return fail(format!(
                    "{} applications in {} exceed the maximum of {}",
                    events.len(),
                    year,
                    label.max_applications
                ));
            }
            for pair in events.windows(2) {
                let gap = (pair[1].date - pair[0].date).num_days();
                if gap < label.min_interval_days as i64 {
                    return fail(format!(
                        "{} and {} are {} days apart (minimum {})",
                        pair[0].date, pair[1].date, gap, label.min_interval_days
                    ));
                }
            }
            let total: f64 = events.iter().map(|e| e.rate).sum();
            if total > max_annual + RATE_EPSILON {
                return fail(format!(
                    "annual total {} in {} exceeds {}",
                    total, year, max_annual
                ));
            }
        }

        Ok(())
    }
}
