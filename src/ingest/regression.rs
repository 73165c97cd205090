use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use super::{cell_text, Cell, ImportSummary};
use crate::codec::{decode_inning_block, decode_total_pair, InningLine};
use crate::db::models::{date_code, RegressionPrediction};
use crate::store::{DateFilter, PredictionFilter, PredictionStore, StoreResult};
use crate::teams::normalize;

/// One row of the regression export
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegressionRow {
    /// YYYY-MM-DD
    #[serde(default)]
    pub date: Option<Cell>,
    /// "HOME vs AWAY"
    #[serde(default)]
    pub matchup: Option<Cell>,
    /// "SF: 0|1|... || CIN: 0|0|..."
    #[serde(default)]
    pub actual_inning_scores: Option<Cell>,
    #[serde(default)]
    pub predicted_inning_scores: Option<Cell>,
    /// "SF 2 : 3 CIN"
    #[serde(default)]
    pub actual_total: Option<Cell>,
    #[serde(default)]
    pub predicted_total: Option<Cell>,
    #[serde(default)]
    pub actual_starters: Option<Cell>,
    #[serde(default)]
    pub predicted_starters: Option<Cell>,
    #[serde(default)]
    pub pitching_changes: Option<Cell>,
    #[serde(default)]
    pub game_pk: Option<Cell>,
}

fn parse_game_date(cell: &Option<Cell>) -> Option<NaiveDate> {
    let text = cell_text(cell)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .ok()
}

/// "HOME vs AWAY" → (home, away), upper-cased.
fn parse_matchup(cell: &Option<Cell>) -> Option<(String, String)> {
    let text = cell_text(cell)?;
    let (left, right) = text.split_once("vs")?;
    let (home, away) = (left.trim().to_uppercase(), right.trim().to_uppercase());
    if home.is_empty() || away.is_empty() {
        return None;
    }
    Some((home, away))
}

/// Integer ids render without a fraction; anything else is kept as text.
fn parse_game_pk(cell: &Option<Cell>) -> Option<String> {
    let cell = cell.as_ref()?;
    match cell.as_i64() {
        Some(n) => Some(n.to_string()),
        None => Some(cell.text()).filter(|s| !s.is_empty()),
    }
}

/// Interpret one row, or `None` when its date or matchup is unusable.
pub fn parse_regression_row(row: &RegressionRow) -> Option<RegressionPrediction> {
    let date = parse_game_date(&row.date)?;
    let (home, away) = parse_matchup(&row.matchup)?;
    let (home_norm, away_norm) = (normalize(&home), normalize(&away));

    let text = |cell: &Option<Cell>| cell_text(cell).unwrap_or_default();
    let predicted = decode_inning_block(&text(&row.predicted_inning_scores));
    let actual = decode_inning_block(&text(&row.actual_inning_scores));
    let predicted_totals = decode_total_pair(&text(&row.predicted_total));
    let actual_totals = decode_total_pair(&text(&row.actual_total));

    let actual_line = |code: &str| actual.get(code).filter(|l| !l.is_empty()).cloned();

    Some(RegressionPrediction {
        id: None,
        date_code: date_code(date),
        date,
        predicted_away: predicted.get(&away_norm).cloned().unwrap_or_else(InningLine::default),
        predicted_home: predicted.get(&home_norm).cloned().unwrap_or_else(InningLine::default),
        actual_away: actual_line(&away_norm),
        actual_home: actual_line(&home_norm),
        predicted_total_away: predicted_totals.get(&away_norm).copied(),
        predicted_total_home: predicted_totals.get(&home_norm).copied(),
        actual_total_away: actual_totals.get(&away_norm).copied(),
        actual_total_home: actual_totals.get(&home_norm).copied(),
        actual_starters: cell_text(&row.actual_starters),
        predicted_starters: cell_text(&row.predicted_starters),
        pitching_changes: cell_text(&row.pitching_changes),
        game_pk: parse_game_pk(&row.game_pk),
        away,
        home,
        away_norm,
        home_norm,
    })
}

/// Replace every regression record sharing a date with the batch.
/// Within the batch the last row for a (date, away_norm, home_norm) key wins.
pub fn import_regressions<S: PredictionStore + ?Sized>(
    store: &S,
    rows: &[RegressionRow],
) -> StoreResult<ImportSummary> {
    let mut records: Vec<RegressionPrediction> = Vec::new();
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();
    let mut dates: BTreeSet<String> = BTreeSet::new();
    let mut skipped = 0;

    for row in rows {
        let Some(record) = parse_regression_row(row) else {
            debug!("Skipping regression row {:?}", row);
            skipped += 1;
            continue;
        };
        let key = (
            record.date_code.clone(),
            record.away_norm.clone(),
            record.home_norm.clone(),
        );
        dates.insert(record.date_code.clone());
        match index.get(&key) {
            Some(&i) => records[i] = record,
            None => {
                index.insert(key, records.len());
                records.push(record);
            }
        }
    }

    let replaced = store.replace_regressions(
        &PredictionFilter::new().dates(DateFilter::DateCodes(dates.iter().cloned().collect())),
        &records,
    )?;
    debug!("Removed {} regression records", replaced.removed);
    let saved = replaced.written;

    let summary = ImportSummary {
        rows_read: rows.len(),
        rows_skipped: skipped,
        saved,
        dates: dates.len(),
    };
    info!(
        "Regression import: read {} rows, saved {} ({} dates, {} skipped)",
        summary.rows_read, summary.saved, summary.dates, summary.rows_skipped
    );
    Ok(summary)
}
