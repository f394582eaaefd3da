use crate::models::{LabelRestriction, MonthDay, REFERENCE_YEAR};

/// Month/days inside a label window, in calendar order, resolved on the reference year.
///
/// Feb 29 never appears so that every simulated year sees the same candidates.
pub fn window_days(label: &LabelRestriction) -> Vec<MonthDay> {
    let (Some(start), Some(end)) = (
        label.earliest_date.in_year(REFERENCE_YEAR),
        label.latest_date.in_year(REFERENCE_YEAR),
    ) else {
        return Vec::new();
    };

    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(MonthDay::of)
        .collect()
}

/// Days between two month/days on the non-leap reference year.
pub fn reference_gap(a: MonthDay, b: MonthDay) -> u32 {
    a.reference_ordinal().abs_diff(b.reference_ordinal())
}

/// Rounds down to `decimals` places, so the written value never exceeds `value`.
///
/// A float that lands a hair under a representable value (0.79999999999 for
/// 0.8) is snapped up to it rather than losing a whole unit in the last place.
pub fn floor_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    ((value * factor) + 1e-6).floor() / factor
}
