use super::calculations::{floor_to, reference_gap, window_days};
use super::ranking::ranker_for;
use crate::batchfile::layout::RATE_DECIMALS;
use crate::error::{PwcBatchError, Result};
use crate::models::{
    ApplicationEvent, ApplicationSchedule, DatePrioritization, LabelRestriction, MonthDay,
    SiteParams, WetnessLookup,
};
use tracing::{debug, warn};

/// Most applications the external model accepts in one run.
pub const MAX_MODEL_APPLICATIONS: usize = 50;

/// Shortfall (kg/ha) below the annual maximum that is reported as a warning.
pub const UNMET_ANNUAL_TOLERANCE: f64 = 0.01;

/// Smallest rate the batch file can carry at its rate precision.
pub const MIN_WRITTEN_RATE: f64 = 0.0001;

/// Conservative, label-compliant application scheduler.
///
/// Candidates in the label window are ranked (wettest first, or calendar
/// order) and placed greedily while honouring the minimum interval. Each
/// placement takes the full single rate until the annual maximum would be
/// exceeded; the last placement is cut to meet it. Rates are rounded down to
/// the batch file's precision before placement, so the written values never
/// exceed the label. The resulting month/day pattern is applied to every
/// simulated year.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleSolver {
    prioritization: DatePrioritization,
}

impl ScheduleSolver {
    pub fn new(prioritization: DatePrioritization) -> Self {
        Self { prioritization }
    }

    pub fn prioritization(&self) -> DatePrioritization {
        self.prioritization
    }

    pub fn solve<C: WetnessLookup + ?Sized>(
        &self,
        label: &LabelRestriction,
        climate: &C,
        site: &SiteParams,
    ) -> Result<ApplicationSchedule> {
        label.validate()?;
        site.validate()?;

        if self.prioritization == DatePrioritization::WettestPeriod
            && !climate.has_region(&site.region)
        {
            return Err(PwcBatchError::Validation(format!(
                "no wettest-period climate reference for region '{}' (site '{}')",
                site.region, site.scenario
            )));
        }

        let pattern = self.annual_pattern(label, climate, site)?;

        let mut events = Vec::new();
        for year in site.years() {
            let mut placed = Vec::with_capacity(pattern.len());
            for (day, rate) in &pattern {
                let date = day.in_year(year).ok_or_else(|| PwcBatchError::InfeasibleSchedule {
                    label: label.descriptor.clone(),
                    site: site.scenario.clone(),
                    constraint: format!("{} does not exist in {}", day, year),
                })?;
                placed.push(ApplicationEvent::new(date, *rate));
            }
            placed.sort_by_key(|e| e.date);
            events.extend(placed);
        }

        let schedule = ApplicationSchedule {
            label: label.clone(),
            site: site.clone(),
            prioritization: self.prioritization,
            events,
            request_index: 0,
        };
        schedule.check_invariants()?;
        Ok(schedule)
    }

    /// One year's placements as (month/day, kg/ha), in placement order.
    fn annual_pattern<C: WetnessLookup + ?Sized>(
        &self,
        label: &LabelRestriction,
        climate: &C,
        site: &SiteParams,
    ) -> Result<Vec<(MonthDay, f64)>> {
        let ranker = ranker_for(self.prioritization, climate, &site.region);

        // Stable sort keeps calendar order among equal ranks
        let mut candidates = window_days(label);
        candidates.sort_by_key(|day| ranker.key(*day));

        let max_single = label.max_single_rate_kg_ha();
        let max_annual = label.max_annual_rate_kg_ha();
        let mut limit = label.max_applications as usize;
        if limit > MAX_MODEL_APPLICATIONS {
            warn!(
                label = %label.descriptor,
                site = %site.scenario,
                "label allows {} applications; capped at {}",
                limit,
                MAX_MODEL_APPLICATIONS
            );
            limit = MAX_MODEL_APPLICATIONS;
        }

        let mut picks: Vec<(MonthDay, f64)> = Vec::new();
        let mut remaining = max_annual;
        for day in candidates {
            if picks.len() >= limit || remaining < MIN_WRITTEN_RATE {
                break;
            }
            let blocked = picks.iter().any(|(placed, _)| {
                *placed == day || reference_gap(*placed, day) < label.min_interval_days
            });
            if blocked {
                continue;
            }
            let rate = floor_to(max_single.min(remaining), RATE_DECIMALS);
            if rate < MIN_WRITTEN_RATE {
                break;
            }
            remaining -= rate;
            debug!(
                label = %label.descriptor,
                site = %site.scenario,
                ranker = ranker.id(),
                "placed {} at {:.4} kg/ha",
                day,
                rate
            );
            picks.push((day, rate));
        }

        if picks.is_empty() {
            let first_rate = max_single.min(max_annual);
            let constraint = if floor_to(first_rate, RATE_DECIMALS) < MIN_WRITTEN_RATE {
                format!("rate {} kg/ha rounds to zero in the batch file", first_rate)
            } else {
                format!(
                    "no permitted date between {} and {}",
                    label.earliest_date, label.latest_date
                )
            };
            return Err(PwcBatchError::InfeasibleSchedule {
                label: label.descriptor.clone(),
                site: site.scenario.clone(),
                constraint,
            });
        }

        if remaining > UNMET_ANNUAL_TOLERANCE {
            warn!(
                label = %label.descriptor,
                site = %site.scenario,
                "scheduled {:.4} of {:.4} kg/ha per year; check the label's rates, interval and count",
                max_annual - remaining,
                max_annual
            );
        }

        Ok(picks)
    }
}
