use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{cell_text, Cell};
use crate::db::models::{League, PlayerStat};
use crate::store::{PredictionStore, StoreResult};
use crate::teams::normalize;

/// One row of a season stat sheet, keyed by the sheet's column headers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerStatRow {
    #[serde(rename = "Rank", default)]
    pub rank: Option<Cell>,
    #[serde(rename = "Player", default)]
    pub player: Option<Cell>,
    #[serde(rename = "Age", default)]
    pub age: Option<Cell>,
    #[serde(rename = "Team", default)]
    pub team: Option<Cell>,
    #[serde(rename = "Lg", default)]
    pub lg: Option<Cell>,
    #[serde(rename = "WAR", default)]
    pub war: Option<Cell>,
    #[serde(rename = "G", default)]
    pub games: Option<Cell>,
    #[serde(rename = "PA", default)]
    pub pa: Option<Cell>,
    #[serde(rename = "AB", default)]
    pub ab: Option<Cell>,
    #[serde(rename = "R", default)]
    pub runs: Option<Cell>,
    #[serde(rename = "H", default)]
    pub hits: Option<Cell>,
    #[serde(rename = "2B", default)]
    pub doubles: Option<Cell>,
    #[serde(rename = "3B", default)]
    pub triples: Option<Cell>,
    #[serde(rename = "HR", default)]
    pub hr: Option<Cell>,
    #[serde(rename = "RBI", default)]
    pub rbi: Option<Cell>,
    #[serde(rename = "SB", default)]
    pub sb: Option<Cell>,
    #[serde(rename = "CS", default)]
    pub cs: Option<Cell>,
    #[serde(rename = "BB", default)]
    pub bb: Option<Cell>,
    #[serde(rename = "SO", default)]
    pub so: Option<Cell>,
    #[serde(rename = "BA", default)]
    pub ba: Option<Cell>,
    #[serde(rename = "OBP", default)]
    pub obp: Option<Cell>,
    #[serde(rename = "SLG", default)]
    pub slg: Option<Cell>,
    #[serde(rename = "OPS", default)]
    pub ops: Option<Cell>,
    #[serde(rename = "OPS+", default)]
    pub ops_plus: Option<Cell>,
    #[serde(rename = "rOBA", default)]
    pub roba: Option<Cell>,
    #[serde(rename = "Rbat+", default)]
    pub rbat_plus: Option<Cell>,
    #[serde(rename = "TB", default)]
    pub tb: Option<Cell>,
    #[serde(rename = "GIDP", default)]
    pub gidp: Option<Cell>,
    #[serde(rename = "HBP", default)]
    pub hbp: Option<Cell>,
    #[serde(rename = "SH", default)]
    pub sh: Option<Cell>,
    #[serde(rename = "SF", default)]
    pub sf: Option<Cell>,
    #[serde(rename = "IBB", default)]
    pub ibb: Option<Cell>,
    #[serde(rename = "Pos", default)]
    pub pos: Option<Cell>,
    #[serde(rename = "Awards", default)]
    pub awards: Option<Cell>,
}

fn int(cell: &Option<Cell>) -> Option<i32> {
    cell.as_ref()
        .and_then(Cell::as_i64)
        .and_then(|v| i32::try_from(v).ok())
}

fn float(cell: &Option<Cell>) -> Option<f64> {
    cell.as_ref().and_then(Cell::as_f64).filter(|f| f.is_finite())
}

/// A stat row needs a player name and a rank; every stat column is optional.
pub fn parse_player_stat_row(league: League, season: i32, row: &PlayerStatRow) -> Option<PlayerStat> {
    let player = cell_text(&row.player)?;
    let rank = int(&row.rank)?;
    let team = cell_text(&row.team).unwrap_or_default();
    Some(PlayerStat {
        id: None,
        season,
        league,
        rank,
        player,
        age: int(&row.age),
        team_norm: normalize(&team),
        team,
        lg: cell_text(&row.lg).unwrap_or_default(),
        war: float(&row.war),
        games: int(&row.games),
        pa: int(&row.pa),
        ab: int(&row.ab),
        runs: int(&row.runs),
        hits: int(&row.hits),
        doubles: int(&row.doubles),
        triples: int(&row.triples),
        hr: int(&row.hr),
        rbi: int(&row.rbi),
        sb: int(&row.sb),
        cs: int(&row.cs),
        bb: int(&row.bb),
        so: int(&row.so),
        ba: float(&row.ba),
        obp: float(&row.obp),
        slg: float(&row.slg),
        ops: float(&row.ops),
        ops_plus: int(&row.ops_plus),
        roba: float(&row.roba),
        rbat_plus: int(&row.rbat_plus),
        tb: int(&row.tb),
        gidp: int(&row.gidp),
        hbp: int(&row.hbp),
        sh: int(&row.sh),
        sf: int(&row.sf),
        ibb: int(&row.ibb),
        pos: cell_text(&row.pos),
        awards: cell_text(&row.awards),
        updated_at: Utc::now(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStatSummary {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub created: usize,
    pub updated: usize,
}

/// Upsert a season's stat sheet by (season, league, player, team_norm).
/// Rows already stored but missing from the sheet are kept.
pub fn import_player_stats<S: PredictionStore + ?Sized>(
    store: &S,
    league: League,
    season: i32,
    rows: &[PlayerStatRow],
) -> StoreResult<PlayerStatSummary> {
    let mut stats = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_player_stat_row(league, season, row) {
            Some(stat) => stats.push(stat),
            None => debug!("Skipping player stat row {:?}", row),
        }
    }

    let counts = store.upsert_player_stats(&stats)?;
    let summary = PlayerStatSummary {
        rows_read: rows.len(),
        rows_skipped: rows.len() - stats.len(),
        created: counts.created,
        updated: counts.updated,
    };
    info!(
        "{} {} player stats: {} created, {} updated ({} skipped)",
        league, season, summary.created, summary.updated, summary.rows_skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::{StatFilter, StatSort};
    use approx::assert_relative_eq;

    fn sheet() -> Vec<PlayerStatRow> {
        serde_json::from_str(
            r#"[
                {"Rank": 1, "Player": "Aaron Judge", "Age": 33, "Team": "NYY", "Lg": "AL",
                 "WAR": 9.7, "HR": 53, "2B": "30", "OPS+": 215, "BA": ".331", "Pos": "*9/DH"},
                {"Rank": "2", "Player": " Brent Rooker ", "Team": "ATH", "Lg": "AL",
                 "WAR": "", "HR": 30.0, "Awards": ""},
                {"Rank": "Rk", "Player": "Player", "Team": "Team"},
                {"Rank": 4, "Team": "SEA"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn sheet_rows_map_to_stat_columns() {
        let rows = sheet();
        let judge = parse_player_stat_row(League::Mlb, 2025, &rows[0]).unwrap();
        assert_eq!(judge.rank, 1);
        assert_eq!(judge.hr, Some(53));
        assert_eq!(judge.doubles, Some(30));
        assert_eq!(judge.ops_plus, Some(215));
        assert_relative_eq!(judge.ba.unwrap(), 0.331);
        assert_eq!(judge.pos.as_deref(), Some("*9/DH"));

        let rooker = parse_player_stat_row(League::Mlb, 2025, &rows[1]).unwrap();
        assert_eq!(rooker.player, "Brent Rooker");
        assert_eq!(rooker.team, "ATH");
        assert_eq!(rooker.team_norm, "OAK");
        assert_eq!(rooker.war, None);
        assert_eq!(rooker.hr, Some(30));
        assert_eq!(rooker.awards, None);
    }

    #[test]
    fn repeated_header_and_nameless_rows_are_skipped() {
        let rows = sheet();
        assert!(parse_player_stat_row(League::Mlb, 2025, &rows[2]).is_none());
        assert!(parse_player_stat_row(League::Mlb, 2025, &rows[3]).is_none());
    }

    #[test]
    fn reimport_updates_in_place() {
        let db = Database::open_in_memory().unwrap();
        let summary = import_player_stats(&db, League::Mlb, 2025, &sheet()).unwrap();
        assert_eq!(summary.created, 2);
        assert_eq!(summary.rows_skipped, 2);

        let mut rows = sheet();
        rows[0].war = Some(Cell::Float(10.1));
        let summary = import_player_stats(&db, League::Mlb, 2025, &rows[..1]).unwrap();
        assert_eq!(summary.created, 0);
        assert_eq!(summary.updated, 1);

        let filter = StatFilter {
            league: League::Mlb,
            season: 2025,
            name: None,
            team: None,
            sort: StatSort::War,
        };
        let stored = db.list_player_stats(&filter, 10, 0).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].war, Some(10.1));
    }
}
