//! Import of upstream model exports into the store.
//!
//! Each exporter produces rows of loosely typed cells. Rows that can't be
//! interpreted are skipped and counted; the rest replace whatever the store
//! holds for the same dates. Stat sheets are upserted instead.

pub mod classification;
pub mod metrics;
pub mod player_stats;
pub mod regression;
pub mod schedule;

pub use classification::{import_classifications, ClassificationRow};
pub use metrics::{collect_metric_bundles, import_metric_bundles};
pub use player_stats::{import_player_stats, PlayerStatRow};
pub use regression::{import_regressions, RegressionRow};
pub use schedule::{import_schedule, ScheduleRow};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A spreadsheet cell as exported: numbers may arrive as numbers or as text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Trimmed text; whole floats print without a fraction.
    pub fn text(&self) -> String {
        match self {
            Cell::Int(n) => n.to_string(),
            Cell::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", *f as i64),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.trim().to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(n) => Some(*n as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Integer value, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(n) => Some(*n),
            Cell::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Cell::Float(_) => None,
            Cell::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
            }
        }
    }
}

/// Non-blank trimmed text of an optional cell.
pub(crate) fn cell_text(cell: &Option<Cell>) -> Option<String> {
    cell.as_ref().map(Cell::text).filter(|s| !s.is_empty())
}

/// Outcome of one import batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub rows_read: usize,
    pub rows_skipped: usize,
    /// Records written after in-batch de-duplication
    pub saved: usize,
    /// Distinct dates replaced
    pub dates: usize,
}

/// Read a JSON array of rows.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse rows in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_deserialize_from_numbers_and_text() {
        let cells: Vec<Cell> = serde_json::from_str(r#"[250329, 0.63, " SF@CIN "]"#).unwrap();
        assert_eq!(cells[0], Cell::Int(250329));
        assert_eq!(cells[1], Cell::Float(0.63));
        assert_eq!(cells[2].text(), "SF@CIN");
    }

    #[test]
    fn whole_floats_render_as_integers() {
        assert_eq!(Cell::Float(745123.0).text(), "745123");
        assert_eq!(Cell::Float(0.5).text(), "0.5");
    }

    #[test]
    fn integer_view_truncates_and_parses_text() {
        assert_eq!(Cell::Float(1.9).as_i64(), Some(1));
        assert_eq!(Cell::Text(" 7 ".into()).as_i64(), Some(7));
        assert_eq!(Cell::Text("7.0".into()).as_i64(), Some(7));
        assert_eq!(Cell::Text("seven".into()).as_i64(), None);
    }

    #[test]
    fn blank_cells_have_no_text() {
        assert_eq!(cell_text(&Some(Cell::Text("  ".into()))), None);
        assert_eq!(cell_text(&None), None);
        assert_eq!(cell_text(&Some(Cell::Int(3))), Some("3".into()));
    }
}
