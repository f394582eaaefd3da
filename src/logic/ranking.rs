use crate::models::{DatePrioritization, MonthDay, WetnessLookup, WetnessRank};

/// Orders candidate application days; lower keys are placed first.
pub trait DateRanker {
    /// Short identifier, used in logs
    fn id(&self) -> &'static str;

    /// Sort key for one candidate; ties fall back to calendar order in the solver.
    fn key(&self, day: MonthDay) -> RankKey;
}

/// Candidate ordering key. Unranked days sort after every ranked day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RankKey {
    Ranked(WetnessRank),
    Unranked,
}

/// Wettest days first, according to a regional climate reference.
pub struct WettestPeriodRanker<'a, C: WetnessLookup + ?Sized> {
    climate: &'a C,
    region: &'a str,
}

impl<'a, C: WetnessLookup + ?Sized> WettestPeriodRanker<'a, C> {
    pub fn new(climate: &'a C, region: &'a str) -> Self {
        Self { climate, region }
    }
}

impl<C: WetnessLookup + ?Sized> DateRanker for WettestPeriodRanker<'_, C> {
    fn id(&self) -> &'static str {
        "wettest_period"
    }

    fn key(&self, day: MonthDay) -> RankKey {
        self.climate
            .wetness_rank(self.region, day.reference_ordinal())
            .map(RankKey::Ranked)
            .unwrap_or(RankKey::Unranked)
    }
}

/// Every day ranks equally, so calendar order decides.
pub struct CalendarRanker;

impl DateRanker for CalendarRanker {
    fn id(&self) -> &'static str {
        "calendar"
    }

    fn key(&self, _day: MonthDay) -> RankKey {
        RankKey::Ranked(WetnessRank(1))
    }
}

/// Build the ranker for a prioritization mode.
pub fn ranker_for<'a, C: WetnessLookup + ?Sized>(
    prioritization: DatePrioritization,
    climate: &'a C,
    region: &'a str,
) -> Box<dyn DateRanker + 'a> {
    match prioritization {
        DatePrioritization::WettestPeriod => Box::new(WettestPeriodRanker::new(climate, region)),
        DatePrioritization::Calendar => Box::new(CalendarRanker),
    }
}
