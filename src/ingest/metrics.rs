use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::db::models::MetricBundle;
use crate::store::{PredictionStore, StoreResult};
use crate::teams::normalize;
use crate::views::MetricSplit;

/// e.g. `250329_ATH@SEA_valid_report.txt`, `250329_ATH@SEA_test_confmat_Sigmoid.png`
static METRIC_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<date>\d{6})_(?P<away>[A-Za-z]+)@(?P<home>[A-Za-z]+)_(?P<split>valid|test)_(?P<kind>report|confmat)(?:_[A-Za-z0-9]+)?\.(?P<ext>txt|png)$",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Text classification report
    Report,
    /// Confusion-matrix image
    ConfusionMatrix,
}

/// What a metric artifact's file name says about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFile {
    pub date_code: String,
    pub away: String,
    pub home: String,
    pub split: MetricSplit,
    pub kind: ArtifactKind,
}

/// Parse an artifact file name. Reports must be `.txt` and confusion
/// matrices `.png`.
pub fn classify_metric_file(name: &str) -> Option<MetricFile> {
    let caps = METRIC_FILE.captures(name)?;
    let split = caps["split"].parse::<MetricSplit>().ok()?;
    let kind = match (&caps["kind"], &caps["ext"]) {
        ("report", "txt") => ArtifactKind::Report,
        ("confmat", "png") => ArtifactKind::ConfusionMatrix,
        _ => return None,
    };
    Some(MetricFile {
        date_code: caps["date"].to_string(),
        away: caps["away"].to_uppercase(),
        home: caps["home"].to_uppercase(),
        split,
        kind,
    })
}

/// Scan a directory for metric artifacts and group them into one bundle per
/// (date, away, home). Report text is read eagerly; images are recorded by
/// path.
pub fn collect_metric_bundles(dir: &Path) -> Result<Vec<MetricBundle>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut buckets: BTreeMap<(String, String, String), MetricBundle> = BTreeMap::new();
    let mut matched = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file) = entry.file_name().to_str().and_then(classify_metric_file) else {
            continue;
        };
        matched += 1;

        let key = (file.date_code.clone(), file.away.clone(), file.home.clone());
        let bundle = buckets.entry(key).or_insert_with(|| MetricBundle {
            id: None,
            date_code: file.date_code.clone(),
            away_norm: normalize(&file.away),
            home_norm: normalize(&file.home),
            away: file.away.clone(),
            home: file.home.clone(),
            valid_report: None,
            test_report: None,
            valid_confmat_path: None,
            test_confmat_path: None,
            updated_at: Utc::now(),
        });

        match file.kind {
            ArtifactKind::Report => {
                let bytes = match std::fs::read(&path) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("Failed to read {}: {}", path.display(), e);
                        continue;
                    }
                };
                let text = String::from_utf8_lossy(&bytes).into_owned();
                match file.split {
                    MetricSplit::Valid => bundle.valid_report = Some(text),
                    MetricSplit::Test => bundle.test_report = Some(text),
                }
            }
            ArtifactKind::ConfusionMatrix => {
                let p = path.to_string_lossy().into_owned();
                match file.split {
                    MetricSplit::Valid => bundle.valid_confmat_path = Some(p),
                    MetricSplit::Test => bundle.test_confmat_path = Some(p),
                }
            }
        }
    }

    info!(
        "Scanned {}: {} metric files in {} bundles",
        dir.display(),
        matched,
        buckets.len()
    );
    Ok(buckets.into_values().collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricImportSummary {
    pub created: usize,
    pub updated: usize,
}

/// Upsert each bundle. Bundles are never bulk-deleted.
pub fn import_metric_bundles<S: PredictionStore + ?Sized>(
    store: &S,
    bundles: &[MetricBundle],
) -> StoreResult<MetricImportSummary> {
    let mut summary = MetricImportSummary::default();
    for bundle in bundles {
        if store.upsert_metric(bundle)? {
            summary.created += 1;
        } else {
            summary.updated += 1;
        }
    }
    info!(
        "Metric import: {} created, {} updated",
        summary.created, summary.updated
    );
    Ok(summary)
}
