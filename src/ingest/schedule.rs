use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{info, warn};

use super::{cell_text, Cell, ImportSummary};
use crate::db::models::{League, ScheduleEntry};
use crate::store::{PredictionStore, Replaced, ScheduleFilter, StoreResult};

/// "3.29(Sat)"
static SCHEDULE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\.(\d+)\((.+)\)").unwrap());

/// One row of a league schedule export
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleRow {
    /// "M.D(weekday)"
    #[serde(default)]
    pub date: Option<Cell>,
    #[serde(default)]
    pub time: Option<Cell>,
    /// "TEAM1 vs TEAM2"
    #[serde(default)]
    pub matchup: Option<Cell>,
    #[serde(default)]
    pub stadium: Option<Cell>,
    #[serde(default)]
    pub score_team1: Option<Cell>,
    #[serde(default)]
    pub score_team2: Option<Cell>,
}

fn score(cell: &Option<Cell>) -> Option<i32> {
    cell.as_ref()
        .and_then(Cell::as_i64)
        .and_then(|v| i32::try_from(v).ok())
}

pub fn parse_schedule_row(league: League, year: i32, row: &ScheduleRow) -> Option<ScheduleEntry> {
    let date = cell_text(&row.date)?;
    let caps = SCHEDULE_DATE.captures(&date)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(year, month, day)?;

    let matchup = cell_text(&row.matchup)?;
    let teams: Vec<&str> = matchup.split("vs").map(str::trim).collect();
    let [team1, team2] = teams.as_slice() else {
        return None;
    };
    if team1.is_empty() || team2.is_empty() {
        return None;
    }

    Some(ScheduleEntry {
        id: None,
        league,
        year,
        month,
        day,
        weekday: caps[3].trim().to_string(),
        time: cell_text(&row.time).unwrap_or_default(),
        stadium: cell_text(&row.stadium).unwrap_or_default(),
        team1: team1.to_string(),
        team2: team2.to_string(),
        score_team1: score(&row.score_team1),
        score_team2: score(&row.score_team2),
        is_main_event: false,
    })
}

/// Replace a league's schedule for one year. Main-event flags are not
/// carried over. A batch with rows but none usable leaves the stored
/// schedule alone.
pub fn import_schedule<S: PredictionStore + ?Sized>(
    store: &S,
    league: League,
    year: i32,
    rows: &[ScheduleRow],
) -> StoreResult<ImportSummary> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_schedule_row(league, year, row) {
            Some(e) => entries.push(e),
            None => warn!("Skipping malformed {} schedule row: {:?}", league, row),
        }
    }

    if entries.is_empty() && !rows.is_empty() {
        warn!(
            "No usable {} {} schedule rows; keeping the stored schedule",
            league, year
        );
        return Ok(ImportSummary {
            rows_read: rows.len(),
            rows_skipped: rows.len(),
            ..Default::default()
        });
    }

    let Replaced {
        removed,
        written: saved,
    } = store.replace_schedule(&ScheduleFilter::league(league).year(year), &entries)?;
    let mut days: Vec<(u32, u32)> = entries.iter().map(|e| (e.month, e.day)).collect();
    days.sort_unstable();
    days.dedup();

    info!(
        "{} {} schedule: replaced {} entries with {}",
        league, year, removed, saved
    );
    Ok(ImportSummary {
        rows_read: rows.len(),
        rows_skipped: rows.len() - entries.len(),
        saved,
        dates: days.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn make_row(date: &str, matchup: &str) -> ScheduleRow {
        ScheduleRow {
            date: Some(Cell::Text(date.into())),
            time: Some(Cell::Text("18:30".into())),
            matchup: Some(Cell::Text(matchup.into())),
            stadium: Some(Cell::Text(" Jamsil ".into())),
            score_team1: Some(Cell::Int(4)),
            score_team2: Some(Cell::Text("".into())),
        }
    }

    #[test]
    fn parses_published_date_format() {
        let e = parse_schedule_row(League::Kbo, 2025, &make_row("3.29(Sat)", "LG vs KT")).unwrap();
        assert_eq!((e.month, e.day), (3, 29));
        assert_eq!(e.weekday, "Sat");
        assert_eq!(e.team1, "LG");
        assert_eq!(e.team2, "KT");
        assert_eq!(e.stadium, "Jamsil");
        assert_eq!(e.score_team1, Some(4));
        assert_eq!(e.score_team2, None);
        assert!(!e.is_main_event);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(parse_schedule_row(League::Kbo, 2025, &make_row("03/29", "LG vs KT")).is_none());
        assert!(parse_schedule_row(League::Kbo, 2025, &make_row("2.30(Sun)", "LG vs KT")).is_none());
        assert!(parse_schedule_row(League::Kbo, 2025, &make_row("3.29(Sat)", "LG KT")).is_none());
        assert!(
            parse_schedule_row(League::Kbo, 2025, &make_row("3.29(Sat)", "LG vs KT vs NC")).is_none()
        );
    }

    #[test]
    fn import_replaces_only_the_same_league_and_year() {
        let db = Database::open_in_memory().unwrap();
        import_schedule(&db, League::Kbo, 2024, &[make_row("9.1(Sun)", "LG vs KT")]).unwrap();
        import_schedule(&db, League::Mlb, 2025, &[make_row("4.1(Tue)", "SF vs CIN")]).unwrap();
        import_schedule(&db, League::Kbo, 2025, &[make_row("4.1(Tue)", "LG vs KT")]).unwrap();

        let summary = import_schedule(
            &db,
            League::Kbo,
            2025,
            &[
                make_row("4.2(Wed)", "NC vs SSG"),
                make_row("4.2(Wed)", "LG vs KT"),
                make_row("bad", "LG vs KT"),
            ],
        )
        .unwrap();
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(summary.dates, 1);

        let kbo = db.list_schedule(&ScheduleFilter::league(League::Kbo)).unwrap();
        assert_eq!(kbo.len(), 3);
        assert!(kbo.iter().all(|e| e.year == 2024 || (e.month, e.day) == (4, 2)));
        assert_eq!(db.list_schedule(&ScheduleFilter::league(League::Mlb)).unwrap().len(), 1);
    }

    #[test]
    fn all_malformed_rows_keep_the_stored_schedule() {
        let db = Database::open_in_memory().unwrap();
        import_schedule(&db, League::Kbo, 2025, &[make_row("4.1(Tue)", "LG vs KT")]).unwrap();
        let entry = db
            .find_schedule(&ScheduleFilter::league(League::Kbo))
            .unwrap()
            .unwrap();
        db.set_main_event(entry.id.unwrap(), true).unwrap();

        let summary = import_schedule(
            &db,
            League::Kbo,
            2025,
            &[make_row("bad", "LG vs KT"), make_row("4.2(Wed)", "LG KT")],
        )
        .unwrap();
        assert_eq!(summary.saved, 0);
        assert_eq!(summary.rows_skipped, 2);

        let kept = db
            .list_schedule(&ScheduleFilter::league(League::Kbo).main_event())
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, entry.id);
    }

    #[test]
    fn empty_batch_clears_the_year() {
        let db = Database::open_in_memory().unwrap();
        import_schedule(&db, League::Kbo, 2025, &[make_row("4.1(Tue)", "LG vs KT")]).unwrap();
        import_schedule(&db, League::Kbo, 2025, &[]).unwrap();
        assert!(db
            .list_schedule(&ScheduleFilter::league(League::Kbo))
            .unwrap()
            .is_empty());
    }
}
