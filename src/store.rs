//! Read/write access to the record collections.
//!
//! [`PredictionStore`] is the only seam between the resolution engine and
//! persistence. Lookups take small filter values instead of SQL so the engine
//! can compose its queries without knowing the backing store.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::db::models::{
    ClassificationPrediction, League, MetricBundle, PlayerStat, RegressionPrediction,
    ScheduleEntry,
};
use crate::teams::Matchup;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Restriction on a prediction record's calendar date
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DateFilter {
    #[default]
    Any,
    /// Same month and day, any year
    MonthDay { month: u32, day: u32 },
    On(NaiveDate),
    OnOrAfter(NaiveDate),
    Before(NaiveDate),
    /// Inclusive range
    Between(NaiveDate, NaiveDate),
    /// Any of the given YYMMDD codes
    DateCodes(Vec<String>),
}

/// Which team-code columns a [`TeamFilter`] matches against
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TeamFilter {
    #[default]
    Any,
    /// Normalized codes
    Normalized(Matchup),
    /// Codes as exported
    Raw(Matchup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateOrder {
    #[default]
    Ascending,
    Descending,
}

/// Filter shared by classification, regression and metric lookups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictionFilter {
    pub dates: DateFilter,
    pub teams: TeamFilter,
    /// Regression lookups only: require a classification record with the
    /// same (date, away_norm, home_norm)
    pub paired_only: bool,
    pub order: DateOrder,
}

impl PredictionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dates(mut self, dates: DateFilter) -> Self {
        self.dates = dates;
        self
    }

    pub fn normalized(mut self, matchup: Matchup) -> Self {
        self.teams = TeamFilter::Normalized(matchup);
        self
    }

    pub fn raw(mut self, matchup: Matchup) -> Self {
        self.teams = TeamFilter::Raw(matchup);
        self
    }

    pub fn paired_only(mut self) -> Self {
        self.paired_only = true;
        self
    }

    pub fn order(mut self, order: DateOrder) -> Self {
        self.order = order;
        self
    }
}

/// Filter for schedule entries. Matches are ordered by year, month, day and
/// then insertion order, all in the direction given by `order`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScheduleFilter {
    pub league: Option<League>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub month_day: Option<(u32, u32)>,
    /// Strictly later (month, day) within the year
    pub after: Option<(u32, u32)>,
    pub main_event_only: bool,
    pub order: DateOrder,
}

impl ScheduleFilter {
    pub fn league(league: League) -> Self {
        ScheduleFilter {
            league: Some(league),
            ..Default::default()
        }
    }

    /// Every league
    pub fn all() -> Self {
        Self::default()
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn in_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn on(mut self, month: u32, day: u32) -> Self {
        self.month_day = Some((month, day));
        self
    }

    pub fn after(mut self, month: u32, day: u32) -> Self {
        self.after = Some((month, day));
        self
    }

    pub fn main_event(mut self) -> Self {
        self.main_event_only = true;
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = DateOrder::Descending;
        self
    }
}

/// Leaderboard sort keys. Anything else sorts by WAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatSort {
    #[default]
    War,
    OpsPlus,
    Ops,
    Hr,
    Rbi,
    Sb,
    Ba,
    Obp,
    Slg,
    Tb,
    So,
    Bb,
    R,
    H,
    Pa,
    Rank,
}

impl StatSort {
    pub const ALL: [StatSort; 16] = [
        StatSort::War,
        StatSort::OpsPlus,
        StatSort::Ops,
        StatSort::Hr,
        StatSort::Rbi,
        StatSort::Sb,
        StatSort::Ba,
        StatSort::Obp,
        StatSort::Slg,
        StatSort::Tb,
        StatSort::So,
        StatSort::Bb,
        StatSort::R,
        StatSort::H,
        StatSort::Pa,
        StatSort::Rank,
    ];

    /// Column label as shown on the stat sheet
    pub fn key(&self) -> &'static str {
        match self {
            StatSort::War => "WAR",
            StatSort::OpsPlus => "OPS+",
            StatSort::Ops => "OPS",
            StatSort::Hr => "HR",
            StatSort::Rbi => "RBI",
            StatSort::Sb => "SB",
            StatSort::Ba => "BA",
            StatSort::Obp => "OBP",
            StatSort::Slg => "SLG",
            StatSort::Tb => "TB",
            StatSort::So => "SO",
            StatSort::Bb => "BB",
            StatSort::R => "R",
            StatSort::H => "H",
            StatSort::Pa => "PA",
            StatSort::Rank => "Rank",
        }
    }

    pub fn from_key(key: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.key() == key.trim())
            .unwrap_or_default()
    }
}

/// Filter for one league-season of player stats.
#[derive(Debug, Clone, PartialEq)]
pub struct StatFilter {
    pub league: League,
    pub season: i32,
    /// Case-insensitive substring of the player name
    pub name: Option<String>,
    /// Normalized team code
    pub team: Option<String>,
    pub sort: StatSort,
}

/// Outcome of a delete-then-insert replacement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Replaced {
    pub removed: usize,
    pub written: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Upserted {
    pub created: usize,
    pub updated: usize,
}

/// Record store behind the resolution engine and the import pipeline.
///
/// `find_*` return the first match in filter order and `list_*` all matches.
/// `replace_*` delete every record matching the filter and insert the batch
/// as one unit: either both happen or neither does. Batch rows violating a
/// uniqueness constraint are ignored.
pub trait PredictionStore {
    // ── Schedule ─────────────────────────────────────────────────────────────

    fn find_schedule(&self, filter: &ScheduleFilter) -> StoreResult<Option<ScheduleEntry>>;
    fn list_schedule(&self, filter: &ScheduleFilter) -> StoreResult<Vec<ScheduleEntry>>;
    fn replace_schedule(
        &self,
        filter: &ScheduleFilter,
        entries: &[ScheduleEntry],
    ) -> StoreResult<Replaced>;
    /// Set or clear the main-event flag; false when no entry has that id.
    fn set_main_event(&self, id: i64, is_main_event: bool) -> StoreResult<bool>;

    // ── Classification predictions ───────────────────────────────────────────

    fn find_classification(
        &self,
        filter: &PredictionFilter,
    ) -> StoreResult<Option<ClassificationPrediction>>;
    fn list_classifications(
        &self,
        filter: &PredictionFilter,
    ) -> StoreResult<Vec<ClassificationPrediction>>;
    fn replace_classifications(
        &self,
        filter: &PredictionFilter,
        records: &[ClassificationPrediction],
    ) -> StoreResult<Replaced>;

    // ── Regression predictions ───────────────────────────────────────────────

    fn find_regression(
        &self,
        filter: &PredictionFilter,
    ) -> StoreResult<Option<RegressionPrediction>>;
    fn list_regressions(&self, filter: &PredictionFilter) -> StoreResult<Vec<RegressionPrediction>>;
    fn replace_regressions(
        &self,
        filter: &PredictionFilter,
        records: &[RegressionPrediction],
    ) -> StoreResult<Replaced>;

    // ── Metric bundles ───────────────────────────────────────────────────────

    fn find_metric(&self, filter: &PredictionFilter) -> StoreResult<Option<MetricBundle>>;
    /// Insert or update by (date_code, away, home); true when newly created.
    fn upsert_metric(&self, bundle: &MetricBundle) -> StoreResult<bool>;

    // ── Player stats ─────────────────────────────────────────────────────────

    /// One page of matches in `filter.sort` order.
    fn list_player_stats(
        &self,
        filter: &StatFilter,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<PlayerStat>>;
    fn count_player_stats(&self, filter: &StatFilter) -> StoreResult<usize>;
    /// Distinct normalized team codes of a league-season, sorted.
    fn player_teams(&self, league: League, season: i32) -> StoreResult<Vec<String>>;
    fn latest_season(&self, league: League) -> StoreResult<Option<i32>>;
    /// Insert or update by (season, league, player, team_norm) as one unit.
    fn upsert_player_stats(&self, stats: &[PlayerStat]) -> StoreResult<Upserted>;
}
