use crate::error::{PwcBatchError, Result};
use crate::models::label::REFERENCE_YEAR;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wetness ordinal within a region; 1 is the wettest period of the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WetnessRank(pub u16);

impl std::fmt::Display for WetnessRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Canonical region key: trimmed, with numeric codes zero-padded to two digits ("5" -> "05").
pub fn normalize_region(region: &str) -> String {
    let trimmed = region.trim();
    match trimmed.parse::<u32>() {
        Ok(code) if trimmed.chars().all(|c| c.is_ascii_digit()) => format!("{:02}", code),
        _ => trimmed.to_string(),
    }
}

/// Lookup used by the schedule solver to order candidate dates.
pub trait WetnessLookup {
    fn wetness_rank(&self, region: &str, day_of_year: u32) -> Option<WetnessRank>;

    fn has_region(&self, region: &str) -> bool;
}

/// Regionally representative wetness ranking over one 365-day year.
///
/// Immutable once built and passed explicitly to the solver; it carries no
/// ambient state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClimateReference {
    regions: BTreeMap<String, Vec<(u32, WetnessRank)>>,
}

impl ClimateReference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region from (day-of-year, rank) tuples. Days must be unique and in 1..=365.
    pub fn with_region(mut self, region: &str, mut days: Vec<(u32, WetnessRank)>) -> Result<Self> {
        days.sort_by_key(|(doy, _)| *doy);
        for pair in days.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(PwcBatchError::InvalidData(format!(
                    "climate region '{}' lists day {} more than once",
                    region, pair[0].0
                )));
            }
        }
        if let Some((doy, _)) = days.iter().find(|(doy, _)| !(1..=365).contains(doy)) {
            return Err(PwcBatchError::InvalidData(format!(
                "climate region '{}' has day of year {} outside 1-365",
                region, doy
            )));
        }
        self.regions.insert(normalize_region(region), days);
        Ok(self)
    }

    /// Expand a wettest-month ranking (month numbers, wettest first) into daily ranks.
    pub fn with_ranked_months(self, region: &str, months_wettest_first: &[u32]) -> Result<Self> {
        if months_wettest_first.len() != 12 {
            return Err(PwcBatchError::InvalidData(format!(
                "climate region '{}': expected all 12 months ranked, got {}",
                region,
                months_wettest_first.len()
            )));
        }
        let mut seen = [false; 12];
        for &month in months_wettest_first {
            if !(1..=12).contains(&month) || seen[(month - 1) as usize] {
                return Err(PwcBatchError::InvalidData(format!(
                    "climate region '{}': months must be a permutation of 1-12, got {:?}",
                    region, months_wettest_first
                )));
            }
            seen[(month - 1) as usize] = true;
        }

        let mut days = Vec::with_capacity(365);
        for (idx, &month) in months_wettest_first.iter().enumerate() {
            let rank = WetnessRank(idx as u16 + 1);
            let mut date = NaiveDate::from_ymd_opt(REFERENCE_YEAR, month, 1).ok_or_else(|| {
                PwcBatchError::InvalidData(format!("invalid month {}", month))
            })?;
            while date.month() == month {
                days.push((date.ordinal(), rank));
                match date.succ_opt() {
                    Some(next) => date = next,
                    None => break,
                }
            }
        }

        self.with_region(region, days)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl WetnessLookup for ClimateReference {
    fn wetness_rank(&self, region: &str, day_of_year: u32) -> Option<WetnessRank> {
        let days = self.regions.get(&normalize_region(region))?;
        days.binary_search_by_key(&day_of_year, |(doy, _)| *doy)
            .ok()
            .map(|idx| days[idx].1)
    }

    fn has_region(&self, region: &str) -> bool {
        self.regions.contains_key(&normalize_region(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONTHS: [u32; 12] = [5, 6, 4, 7, 3, 8, 9, 2, 10, 1, 11, 12];

    #[test]
    fn ranked_months_expand_to_days() {
        let climate = ClimateReference::new()
            .with_ranked_months("05", &MONTHS)
            .unwrap();
        // May 15 is day 135 in a non-leap year
        assert_eq!(climate.wetness_rank("05", 135), Some(WetnessRank(1)));
        // June 1 is day 152
        assert_eq!(climate.wetness_rank("05", 152), Some(WetnessRank(2)));
        // December 31
        assert_eq!(climate.wetness_rank("05", 365), Some(WetnessRank(12)));
    }

    #[test]
    fn unknown_region_or_day_is_none() {
        let climate = ClimateReference::new()
            .with_region("07", vec![(100, WetnessRank(3))])
            .unwrap();
        assert!(climate.has_region("07"));
        assert!(!climate.has_region("08"));
        assert_eq!(climate.wetness_rank("08", 100), None);
        assert_eq!(climate.wetness_rank("07", 101), None);
        assert_eq!(climate.wetness_rank(" 07 ", 100), Some(WetnessRank(3)));
    }

    #[test]
    fn ranked_months_must_be_permutation() {
        let result = ClimateReference::new().with_ranked_months("05", &[1, 1, 2]);
        assert!(result.is_err());
        let result = ClimateReference::new().with_ranked_months("05", &[13]);
        assert!(result.is_err());
    }

    #[test]
    fn partial_month_ranking_rejected() {
        let err = ClimateReference::new()
            .with_ranked_months("05", &[5, 6, 4])
            .unwrap_err();
        assert!(err.to_string().contains("12 months"));
        let mut months: Vec<u32> = (1..=12).collect();
        months.push(1);
        assert!(ClimateReference::new().with_ranked_months("05", &months).is_err());
    }

    #[test]
    fn duplicate_days_rejected() {
        let result = ClimateReference::new().with_region(
            "05",
            vec![(10, WetnessRank(1)), (10, WetnessRank(2))],
        );
        assert!(result.is_err());
        let result = ClimateReference::new().with_region("05", vec![(366, WetnessRank(1))]);
        assert!(result.is_err());
    }

    #[test]
    fn numeric_regions_are_zero_padded() {
        assert_eq!(normalize_region(" 5 "), "05");
        assert_eq!(normalize_region("17"), "17");
        assert_eq!(normalize_region("R5a"), "R5a");
        let climate = ClimateReference::new()
            .with_region("5", vec![(1, WetnessRank(1))])
            .unwrap();
        assert!(climate.has_region("05"));
        assert_eq!(climate.regions().collect::<Vec<_>>(), vec!["05"]);
    }

    #[test]
    fn wetness_rank_orders_wettest_first() {
        assert!(WetnessRank(1) < WetnessRank(2));
    }
}
