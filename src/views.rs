//! Read paths behind the pages: the weekly classification board, a single
//! game's inning lines, the regression report, the classifier metrics and the
//! schedule calendar. All lookups by path segment upper-case the team codes.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;

use crate::db::models::{League, MetricBundle, RegressionPrediction, ScheduleEntry};
use crate::store::{
    DateFilter, DateOrder, PredictionFilter, PredictionStore, ScheduleFilter, StoreResult,
};
use crate::teams::Matchup;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardItem {
    pub date: NaiveDate,
    pub month: u32,
    pub day: u32,
    pub date_code: String,
    pub away: String,
    pub home: String,
    pub away_pct: i32,
    pub home_pct: i32,
    /// An inning-line detail page exists for this game
    pub has_detail: bool,
}

/// Board items of one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardDay {
    /// "MM/DD"
    pub key: String,
    pub date: NaiveDate,
    pub items: Vec<BoardItem>,
}

/// One Monday-to-Sunday week of classification predictions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyBoard {
    pub league: String,
    /// Days with predictions, in date order
    pub schedule_by_date: Vec<BoardDay>,
    /// e.g. "Mar 24 - 30, 2025"
    pub week_range: String,
    /// "MM/DD" of the previous week's Monday
    pub prev_week: String,
    pub next_week: String,
}

impl WeeklyBoard {
    fn empty(league: &str) -> Self {
        WeeklyBoard {
            league: league.to_string(),
            schedule_by_date: Vec::new(),
            week_range: String::new(),
            prev_week: String::new(),
            next_week: String::new(),
        }
    }
}

/// Classification board for the week containing `selected`, or the week of
/// the latest prediction (falling back to `today`) when nothing is selected.
pub fn weekly_board<S: PredictionStore + ?Sized>(
    store: &S,
    league: &str,
    selected: Option<NaiveDate>,
    today: NaiveDate,
) -> StoreResult<WeeklyBoard> {
    let league = league.trim().to_lowercase();
    if league.parse::<League>().ok() != Some(League::Mlb) {
        return Ok(WeeklyBoard::empty(&league));
    }

    let anchor = match selected {
        Some(d) => d,
        None => store
            .find_classification(&PredictionFilter::new().order(DateOrder::Descending))?
            .map(|c| c.date)
            .unwrap_or(today),
    };
    let start = anchor - Duration::days(i64::from(anchor.weekday().num_days_from_monday()));
    let end = start + Duration::days(6);

    let week = DateFilter::Between(start, end);
    let rows = store.list_classifications(
        &PredictionFilter::new()
            .dates(week.clone())
            .order(DateOrder::Ascending),
    )?;
    let details: HashSet<(String, Matchup)> = store
        .list_regressions(&PredictionFilter::new().dates(week))?
        .into_iter()
        .map(|r| (r.date_code.clone(), r.matchup()))
        .collect();

    let mut by_date: Vec<BoardDay> = Vec::new();
    for c in rows {
        let item = BoardItem {
            date: c.date,
            month: c.date.month(),
            day: c.date.day(),
            date_code: c.date_code.clone(),
            away: c.away_norm.clone(),
            home: c.home_norm.clone(),
            away_pct: c.away_pct(),
            home_pct: c.home_pct(),
            has_detail: details.contains(&(c.date_code.clone(), c.matchup())),
        };
        match by_date.last_mut() {
            Some(last) if last.date == c.date => last.items.push(item),
            _ => by_date.push(BoardDay {
                key: c.date.format("%m/%d").to_string(),
                date: c.date,
                items: vec![item],
            }),
        }
    }

    Ok(WeeklyBoard {
        league,
        schedule_by_date: by_date,
        week_range: format!("{} - {}", start.format("%b %d"), end.format("%d, %Y")),
        prev_week: (start - Duration::days(7)).format("%m/%d").to_string(),
        next_week: (start + Duration::days(7)).format("%m/%d").to_string(),
    })
}

/// Predicted and actual inning lines of one game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionDetail {
    pub league: String,
    pub date_code: String,
    pub date: NaiveDate,
    pub away: String,
    pub home: String,
    pub predicted_away: Vec<i32>,
    pub predicted_home: Vec<i32>,
    /// Empty until the game has been played
    pub actual_away: Vec<i32>,
    pub actual_home: Vec<i32>,
}

fn find_game<S: PredictionStore + ?Sized>(
    store: &S,
    date_code: &str,
    away: &str,
    home: &str,
) -> StoreResult<Option<RegressionPrediction>> {
    store.find_regression(
        &PredictionFilter::new()
            .dates(DateFilter::DateCodes(vec![date_code.to_string()]))
            .normalized(Matchup::upper(away, home)),
    )
}

pub fn prediction_detail<S: PredictionStore + ?Sized>(
    store: &S,
    league: &str,
    date_code: &str,
    away: &str,
    home: &str,
) -> StoreResult<Option<PredictionDetail>> {
    let Some(reg) = find_game(store, date_code, away, home)? else {
        return Ok(None);
    };
    Ok(Some(PredictionDetail {
        league: league.trim().to_lowercase(),
        date_code: date_code.to_string(),
        date: reg.date,
        away: reg.away_norm,
        home: reg.home_norm,
        predicted_away: reg.predicted_away.into_inner(),
        predicted_home: reg.predicted_home.into_inner(),
        actual_away: reg.actual_away.unwrap_or_default().into_inner(),
        actual_home: reg.actual_home.unwrap_or_default().into_inner(),
    }))
}

/// Pitching detail and totals of one game, totals as (away, home).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionReport {
    pub league: String,
    pub date_code: String,
    pub date: NaiveDate,
    pub away: String,
    pub home: String,
    pub actual_starters: Option<String>,
    pub predicted_starters: Option<String>,
    pub pitching_changes: Vec<String>,
    pub game_pk: Option<String>,
    pub predicted_total: (Option<i32>, Option<i32>),
    pub actual_total: (Option<i32>, Option<i32>),
}

pub fn regression_report<S: PredictionStore + ?Sized>(
    store: &S,
    league: &str,
    date_code: &str,
    away: &str,
    home: &str,
) -> StoreResult<Option<RegressionReport>> {
    let Some(reg) = find_game(store, date_code, away, home)? else {
        return Ok(None);
    };
    let pitching_changes = reg.pitching_change_list();
    Ok(Some(RegressionReport {
        league: league.trim().to_lowercase(),
        date_code: date_code.to_string(),
        date: reg.date,
        away: reg.away_norm,
        home: reg.home_norm,
        actual_starters: reg.actual_starters,
        predicted_starters: reg.predicted_starters,
        pitching_changes,
        game_pk: reg.game_pk,
        predicted_total: (reg.predicted_total_away, reg.predicted_total_home),
        actual_total: (reg.actual_total_away, reg.actual_total_home),
    }))
}

/// Evaluation split of the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSplit {
    Valid,
    Test,
}

impl MetricSplit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricSplit::Valid => "valid",
            MetricSplit::Test => "test",
        }
    }
}

impl FromStr for MetricSplit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(MetricSplit::Valid),
            "test" => Ok(MetricSplit::Test),
            other => Err(format!("unknown split: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReport {
    pub league: String,
    pub date_code: String,
    pub away: String,
    pub home: String,
    pub valid_report: Option<String>,
    pub test_report: Option<String>,
    pub valid_image_url: Option<String>,
    pub test_image_url: Option<String>,
    #[serde(skip)]
    pub bundle: MetricBundle,
}

impl MetricReport {
    pub fn confmat_path(&self, split: MetricSplit) -> Option<&str> {
        match split {
            MetricSplit::Valid => self.bundle.valid_confmat_path.as_deref(),
            MetricSplit::Test => self.bundle.test_confmat_path.as_deref(),
        }
    }
}

/// Metric bundle by normalized codes, falling back to the codes used in the
/// artifact file names.
pub fn metric_report<S: PredictionStore + ?Sized>(
    store: &S,
    league: &str,
    date_code: &str,
    away: &str,
    home: &str,
) -> StoreResult<Option<MetricReport>> {
    let dates = DateFilter::DateCodes(vec![date_code.to_string()]);
    let matchup = Matchup::upper(away, home);
    let bundle = match store.find_metric(
        &PredictionFilter::new()
            .dates(dates.clone())
            .normalized(matchup.clone()),
    )? {
        Some(b) => Some(b),
        None => store.find_metric(&PredictionFilter::new().dates(dates).raw(matchup))?,
    };
    let Some(bundle) = bundle else {
        return Ok(None);
    };

    let league = league.trim().to_lowercase();
    let image_url = |split: MetricSplit, path: &Option<String>| {
        path.as_ref().map(|_| {
            format!(
                "/api/{}/predictions/{}/{}/{}/metrics/{}/image",
                league,
                date_code,
                bundle.away_norm,
                bundle.home_norm,
                split.as_str()
            )
        })
    };
    Ok(Some(MetricReport {
        league: league.clone(),
        date_code: date_code.to_string(),
        away: bundle.away_norm.clone(),
        home: bundle.home_norm.clone(),
        valid_report: bundle.valid_report.clone(),
        test_report: bundle.test_report.clone(),
        valid_image_url: image_url(MetricSplit::Valid, &bundle.valid_confmat_path),
        test_image_url: image_url(MetricSplit::Test, &bundle.test_confmat_path),
        bundle,
    }))
}

/// Schedule entries of one calendar day, in insertion order.
pub fn schedule_for_day<S: PredictionStore + ?Sized>(
    store: &S,
    league: League,
    date: NaiveDate,
) -> StoreResult<Vec<ScheduleEntry>> {
    store.list_schedule(
        &ScheduleFilter::league(league)
            .year(date.year())
            .on(date.month(), date.day()),
    )
}

/// Days per page of the schedule calendar strip.
pub const CALENDAR_CHUNK: usize = 13;

/// Calendar page of one league around a selected day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulePage {
    pub league: String,
    /// "YYYY.M"
    pub year_month: String,
    /// "MM/DD"
    pub selected_date: String,
    /// The run of days in the selected day's chunk of the month
    pub date_range: Vec<NaiveDate>,
    /// "MM/DD" of the first day of the previous chunk, or the last day of
    /// the previous month
    pub prev_chunk_date: String,
    /// "MM/DD" of the first day of the next chunk, or the first day of the
    /// next month
    pub next_chunk_date: String,
    pub games: Vec<ScheduleEntry>,
    /// "MM/DD" of every day of the month with at least one game
    pub available_dates: Vec<String>,
}

fn days_of_month(any_day: NaiveDate) -> Vec<NaiveDate> {
    let first = any_day.with_day(1).unwrap_or(any_day);
    first
        .iter_days()
        .take_while(|d| d.month() == first.month())
        .collect()
}

pub fn schedule_page<S: PredictionStore + ?Sized>(
    store: &S,
    league: League,
    selected: NaiveDate,
) -> StoreResult<SchedulePage> {
    let days = days_of_month(selected);
    let chunks: Vec<&[NaiveDate]> = days.chunks(CALENDAR_CHUNK).collect();
    let index = chunks
        .iter()
        .position(|c| c.contains(&selected))
        .unwrap_or(0);

    let first_of_month = days[0];
    let prev = match index.checked_sub(1) {
        Some(i) => chunks[i][0],
        None => first_of_month.pred_opt().unwrap_or(first_of_month),
    };
    let next = match chunks.get(index + 1) {
        Some(c) => c[0],
        None => days[days.len() - 1].succ_opt().unwrap_or(first_of_month),
    };

    let mut available: Vec<u32> = store
        .list_schedule(
            &ScheduleFilter::league(league)
                .year(selected.year())
                .in_month(selected.month()),
        )?
        .into_iter()
        .map(|e| e.day)
        .collect();
    available.sort_unstable();
    available.dedup();

    Ok(SchedulePage {
        league: league.to_string(),
        year_month: format!("{}.{}", selected.year(), selected.month()),
        selected_date: selected.format("%m/%d").to_string(),
        date_range: chunks[index].to_vec(),
        prev_chunk_date: prev.format("%m/%d").to_string(),
        next_chunk_date: next.format("%m/%d").to_string(),
        games: schedule_for_day(store, league, selected)?,
        available_dates: available
            .into_iter()
            .map(|d| format!("{:02}/{:02}", selected.month(), d))
            .collect(),
    })
}

/// Landing page: today's games across every league, or the next game day's.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeView {
    /// "MM/DD" of the games shown; absent when none remain this year
    pub display_date: Option<String>,
    pub date: Option<NaiveDate>,
    pub games: Vec<ScheduleEntry>,
}

pub fn home<S: PredictionStore + ?Sized>(store: &S, today: NaiveDate) -> StoreResult<HomeView> {
    let year = ScheduleFilter::all().year(today.year());
    let todays = store.list_schedule(&year.clone().on(today.month(), today.day()))?;
    let (date, games) = if !todays.is_empty() {
        (Some(today), todays)
    } else {
        match store.find_schedule(&year.clone().after(today.month(), today.day()))? {
            Some(next) => (
                NaiveDate::from_ymd_opt(next.year, next.month, next.day),
                store.list_schedule(&year.on(next.month, next.day))?,
            ),
            None => (None, Vec::new()),
        }
    };
    Ok(HomeView {
        display_date: date.map(|d| d.format("%m/%d").to_string()),
        date,
        games,
    })
}
