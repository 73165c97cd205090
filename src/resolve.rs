//! Main-event resolution.
//!
//! For a league, find the one classification + regression prediction pair to
//! feature, trying an ordered chain of lookup strategies:
//!
//! 1. the administrator-selected schedule entry, as listed
//! 2. the same entry with home and away swapped
//! 3. the nearest game on or after today
//! 4. the most recent game before today
//!
//! A strategy only yields regression records that have a classification
//! partner with the same (date, away_norm, home_norm). When every strategy
//! comes up empty the result is [`ResolvedMainEvent::empty`]; missing data is
//! never an error. Store failures are passed through unchanged.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::models::{ClassificationPrediction, League, RegressionPrediction, ScheduleEntry};
use crate::store::{
    DateFilter, DateOrder, PredictionFilter, PredictionStore, ScheduleFilter, StoreResult,
};
use crate::teams::Matchup;

/// Inputs shared by every strategy for one resolution call.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub league: League,
    pub today: NaiveDate,
    /// Latest schedule entry flagged as the league's main event
    pub schedule: Option<ScheduleEntry>,
}

/// One step of the resolution chain.
pub trait LookupStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// A regression record with a classification partner, or `None` to defer
    /// to the next strategy.
    fn lookup(
        &self,
        store: &dyn PredictionStore,
        ctx: &ResolveContext,
    ) -> StoreResult<Option<RegressionPrediction>>;
}

/// The administrator-selected game, matched on month/day and normalized codes.
/// With `swapped` the schedule's team order is reversed.
pub struct SelectedMatchup {
    pub swapped: bool,
}

impl LookupStrategy for SelectedMatchup {
    fn name(&self) -> &'static str {
        if self.swapped {
            "selected-swapped"
        } else {
            "selected"
        }
    }

    fn lookup(
        &self,
        store: &dyn PredictionStore,
        ctx: &ResolveContext,
    ) -> StoreResult<Option<RegressionPrediction>> {
        let Some(sched) = &ctx.schedule else {
            debug!("{}: no main event selected", ctx.league);
            return Ok(None);
        };
        let listed = Matchup::normalized(&sched.team1, &sched.team2);
        let matchup = if self.swapped { listed.swapped() } else { listed };
        let filter = PredictionFilter::new()
            .dates(DateFilter::MonthDay {
                month: sched.month,
                day: sched.day,
            })
            .normalized(matchup)
            .paired_only()
            .order(DateOrder::Descending);
        store.find_regression(&filter)
    }
}

/// Soonest game on or after today.
pub struct NearestUpcoming;

impl LookupStrategy for NearestUpcoming {
    fn name(&self) -> &'static str {
        "nearest-upcoming"
    }

    fn lookup(
        &self,
        store: &dyn PredictionStore,
        ctx: &ResolveContext,
    ) -> StoreResult<Option<RegressionPrediction>> {
        store.find_regression(
            &PredictionFilter::new()
                .dates(DateFilter::OnOrAfter(ctx.today))
                .paired_only()
                .order(DateOrder::Ascending),
        )
    }
}

/// Latest game strictly before today.
pub struct MostRecentPast;

impl LookupStrategy for MostRecentPast {
    fn name(&self) -> &'static str {
        "most-recent-past"
    }

    fn lookup(
        &self,
        store: &dyn PredictionStore,
        ctx: &ResolveContext,
    ) -> StoreResult<Option<RegressionPrediction>> {
        store.find_regression(
            &PredictionFilter::new()
                .dates(DateFilter::Before(ctx.today))
                .paired_only()
                .order(DateOrder::Descending),
        )
    }
}

/// Selected game first, then nearest upcoming, then most recent past.
pub fn default_chain() -> Vec<Box<dyn LookupStrategy>> {
    vec![
        Box::new(SelectedMatchup { swapped: false }),
        Box::new(SelectedMatchup { swapped: true }),
        Box::new(NearestUpcoming),
        Box::new(MostRecentPast),
    ]
}

/// The featured game for a league, or an empty view when nothing qualifies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMainEvent {
    pub league: String,
    pub has_prediction: bool,
    pub team_away: Option<String>,
    pub team_home: Option<String>,
    pub win_prob_away: Option<i32>,
    pub win_prob_home: Option<i32>,
    pub predicted_innings_away: Vec<i32>,
    pub predicted_innings_home: Vec<i32>,
    pub actual_innings_away: Vec<i32>,
    pub actual_innings_home: Vec<i32>,
    pub predicted_total_away: Option<i32>,
    pub predicted_total_home: Option<i32>,
    pub date: Option<NaiveDate>,
    pub date_code: Option<String>,
    /// From the selected schedule entry, blank without one
    pub time: String,
    pub stadium: String,
    /// Name of the strategy that produced the pair
    pub resolved_by: Option<&'static str>,
}

impl ResolvedMainEvent {
    pub fn empty(league: &str) -> Self {
        ResolvedMainEvent {
            league: league.trim().to_lowercase(),
            has_prediction: false,
            team_away: None,
            team_home: None,
            win_prob_away: None,
            win_prob_home: None,
            predicted_innings_away: Vec::new(),
            predicted_innings_home: Vec::new(),
            actual_innings_away: Vec::new(),
            actual_innings_home: Vec::new(),
            predicted_total_away: None,
            predicted_total_home: None,
            date: None,
            date_code: None,
            time: String::new(),
            stadium: String::new(),
            resolved_by: None,
        }
    }

    fn assemble(
        league: League,
        reg: RegressionPrediction,
        cls: &ClassificationPrediction,
        schedule: Option<&ScheduleEntry>,
        resolved_by: &'static str,
    ) -> Self {
        ResolvedMainEvent {
            league: league.as_str().to_string(),
            has_prediction: true,
            team_away: Some(reg.away_norm),
            team_home: Some(reg.home_norm),
            win_prob_away: Some(cls.away_pct()),
            win_prob_home: Some(cls.home_pct()),
            predicted_innings_away: reg.predicted_away.into_inner(),
            predicted_innings_home: reg.predicted_home.into_inner(),
            actual_innings_away: reg.actual_away.unwrap_or_default().into_inner(),
            actual_innings_home: reg.actual_home.unwrap_or_default().into_inner(),
            predicted_total_away: reg.predicted_total_away,
            predicted_total_home: reg.predicted_total_home,
            date: Some(reg.date),
            date_code: Some(reg.date_code),
            time: schedule.map(|s| s.time.clone()).unwrap_or_default(),
            stadium: schedule.map(|s| s.stadium.clone()).unwrap_or_default(),
            resolved_by: Some(resolved_by),
        }
    }
}

/// Stateless resolver over a [`PredictionStore`].
pub struct ResolutionEngine<S> {
    store: S,
    chains: Vec<(League, Vec<Box<dyn LookupStrategy>>)>,
}

impl<S: PredictionStore> ResolutionEngine<S> {
    /// Engine with the default chain wired for MLB only.
    pub fn new(store: S) -> Self {
        ResolutionEngine {
            store,
            chains: vec![(League::Mlb, default_chain())],
        }
    }

    /// Replace (or add) the strategy chain for a league.
    /// Only MLB has a prediction source today; a KBO feed would be wired here.
    #[allow(dead_code)]
    pub fn with_chain(mut self, league: League, chain: Vec<Box<dyn LookupStrategy>>) -> Self {
        self.chains.retain(|(l, _)| *l != league);
        self.chains.push((league, chain));
        self
    }

    /// Resolve the main event of `league` as of `today`.
    ///
    /// Unknown leagues and leagues without a prediction source resolve to an
    /// empty view.
    pub fn resolve(&self, league: &str, today: NaiveDate) -> StoreResult<ResolvedMainEvent> {
        let Ok(parsed) = league.parse::<League>() else {
            debug!("No prediction source for unknown league {:?}", league);
            return Ok(ResolvedMainEvent::empty(league));
        };
        let Some((_, chain)) = self.chains.iter().find(|(l, _)| *l == parsed) else {
            debug!("No prediction source wired for {}", parsed);
            return Ok(ResolvedMainEvent::empty(parsed.as_str()));
        };

        let schedule = self.store.find_schedule(
            &ScheduleFilter::league(parsed).main_event().newest_first(),
        )?;
        let ctx = ResolveContext {
            league: parsed,
            today,
            schedule,
        };

        for strategy in chain {
            let Some(reg) = strategy.lookup(&self.store, &ctx)? else {
                debug!("{}: strategy {} found nothing", parsed, strategy.name());
                continue;
            };
            let cls = self.store.find_classification(
                &PredictionFilter::new()
                    .dates(DateFilter::On(reg.date))
                    .normalized(reg.matchup()),
            )?;
            let Some(cls) = cls else {
                warn!(
                    "{}: classification for {} on {} vanished between reads",
                    parsed,
                    reg.matchup(),
                    reg.date
                );
                continue;
            };
            info!(
                "{} main event: {} on {} ({}% / {}%) via {}",
                parsed,
                reg.matchup(),
                reg.date,
                cls.away_pct(),
                cls.home_pct(),
                strategy.name()
            );
            return Ok(ResolvedMainEvent::assemble(
                parsed,
                reg,
                &cls,
                ctx.schedule.as_ref(),
                strategy.name(),
            ));
        }

        debug!("{}: no complete prediction pair available", parsed);
        Ok(ResolvedMainEvent::empty(parsed.as_str()))
    }
}
