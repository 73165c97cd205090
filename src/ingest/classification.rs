use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use super::{cell_text, Cell, ImportSummary};
use crate::db::models::{parse_date_code, ClassificationPrediction};
use crate::store::{DateFilter, PredictionFilter, PredictionStore, StoreResult};
use crate::teams::normalize;

/// One row of the classification export's `predictions` sheet
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassificationRow {
    /// YYMMDD
    #[serde(default)]
    pub date_str: Option<Cell>,
    /// "AWAY@HOME"
    #[serde(default)]
    pub match_id: Option<Cell>,
    #[serde(default)]
    pub proba_sigmoid: Option<Cell>,
    #[serde(default)]
    pub proba_isotonic: Option<Cell>,
    #[serde(default)]
    pub label: Option<Cell>,
}

fn date_code_text(cell: &Option<Cell>) -> Option<String> {
    match cell {
        // numeric cells lose leading zeros
        Some(Cell::Int(n)) => Some(format!("{n:06}")),
        other => cell_text(other),
    }
}

/// Interpret one row, or `None` when it can't be used.
pub fn parse_classification_row(row: &ClassificationRow) -> Option<ClassificationPrediction> {
    let date_code = date_code_text(&row.date_str)?;
    let match_id = cell_text(&row.match_id)?;
    let (away, home) = match_id.split_once('@')?;
    let (away, home) = (away.trim().to_uppercase(), home.trim().to_uppercase());
    if away.is_empty() || home.is_empty() {
        return None;
    }
    let date = parse_date_code(&date_code)?;
    let proba_sigmoid = row
        .proba_sigmoid
        .as_ref()
        .and_then(Cell::as_f64)
        .filter(|p| (0.0..=1.0).contains(p))?;

    Some(ClassificationPrediction {
        id: None,
        date_code,
        date,
        away_norm: normalize(&away),
        home_norm: normalize(&home),
        away,
        home,
        proba_sigmoid,
        proba_isotonic: row.proba_isotonic.as_ref().and_then(Cell::as_f64),
        label: row
            .label
            .as_ref()
            .and_then(Cell::as_i64)
            .and_then(|v| i32::try_from(v).ok()),
    })
}

/// Replace every classification record sharing a date with the batch.
/// Within the batch the last row for a (date, away, home) key wins.
pub fn import_classifications<S: PredictionStore + ?Sized>(
    store: &S,
    rows: &[ClassificationRow],
) -> StoreResult<ImportSummary> {
    let mut records: Vec<ClassificationPrediction> = Vec::new();
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();
    let mut dates: BTreeSet<String> = BTreeSet::new();
    let mut skipped = 0;

    for row in rows {
        let Some(record) = parse_classification_row(row) else {
            debug!("Skipping classification row {:?}", row);
            skipped += 1;
            continue;
        };
        let key = (
            record.date_code.clone(),
            record.away.clone(),
            record.home.clone(),
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

    let replaced = store.replace_classifications(
        &PredictionFilter::new().dates(DateFilter::DateCodes(dates.iter().cloned().collect())),
        &records,
    )?;
    debug!("Removed {} classification records", replaced.removed);
    let saved = replaced.written;

    let summary = ImportSummary {
        rows_read: rows.len(),
        rows_skipped: skipped,
        saved,
        dates: dates.len(),
    };
    info!(
        "Classification import: read {} rows, saved {} ({} dates, {} skipped)",
        summary.rows_read, summary.saved, summary.dates, summary.rows_skipped
    );
    Ok(summary)
}
