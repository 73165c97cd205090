//! Season batting leaderboards read from imported stat sheets.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::db::models::{League, PlayerStat};
use crate::store::{PredictionStore, StatFilter, StatSort, StoreResult};
use crate::teams::normalize;

pub const PAGE_SIZE: usize = 50;

/// Query parameters of a leaderboard page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub season: Option<i32>,
    /// Player name search
    pub q: Option<String>,
    pub team: Option<String>,
    /// Sort key, see [`StatSort::key`]
    pub order: Option<String>,
    /// 1-based; anything unparseable is page 1
    pub page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub league: League,
    pub season: i32,
    pub q: String,
    pub team: String,
    pub order: &'static str,
    /// Normalized team codes with stats this season
    pub teams: Vec<String>,
    pub order_options: Vec<&'static str>,
    pub page: usize,
    pub num_pages: usize,
    pub total: usize,
    pub players: Vec<PlayerStat>,
}

/// Page numbers below 1 or past the end land on the last page.
fn clamp_page(requested: Option<&str>, num_pages: usize) -> usize {
    match requested.map(|p| p.trim().parse::<i64>()) {
        None | Some(Err(_)) => 1,
        Some(Ok(n)) if n >= 1 && (n as usize) <= num_pages => n as usize,
        Some(Ok(_)) => num_pages,
    }
}

pub fn leaderboard<S: PredictionStore + ?Sized>(
    store: &S,
    league: League,
    query: &LeaderboardQuery,
    today: NaiveDate,
) -> StoreResult<Leaderboard> {
    let season = match query.season {
        Some(s) => s,
        None => store.latest_season(league)?.unwrap_or(today.year()),
    };
    let q = query.q.as_deref().unwrap_or("").trim().to_string();
    let team = query
        .team
        .as_deref()
        .map(normalize)
        .unwrap_or_default();
    let sort = query
        .order
        .as_deref()
        .map(StatSort::from_key)
        .unwrap_or_default();

    let filter = StatFilter {
        league,
        season,
        name: Some(q.clone()).filter(|s| !s.is_empty()),
        team: Some(team.clone()).filter(|s| !s.is_empty()),
        sort,
    };
    let total = store.count_player_stats(&filter)?;
    let num_pages = total.div_ceil(PAGE_SIZE).max(1);
    let page = clamp_page(query.page.as_deref(), num_pages);
    let players = store.list_player_stats(&filter, PAGE_SIZE, (page - 1) * PAGE_SIZE)?;

    Ok(Leaderboard {
        league,
        season,
        q,
        team,
        order: sort.key(),
        teams: store.player_teams(league, season)?,
        order_options: StatSort::ALL.iter().map(StatSort::key).collect(),
        page,
        num_pages,
        total,
        players,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::*;
    use crate::db::Database;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        let mut players: Vec<PlayerStat> = (1..=120)
            .map(|i| make_player(2025, i, &format!("Player {i:03}"), "NYY", 10.0 - f64::from(i) / 20.0))
            .collect();
        players.push(make_player(2025, 121, "Brent Rooker", "ATH", 3.0));
        players.push(make_player(2024, 1, "Shohei Ohtani", "LAD", 9.2));
        db.upsert_player_stats(&players).unwrap();
        db
    }

    fn query() -> LeaderboardQuery {
        LeaderboardQuery::default()
    }

    #[test]
    fn pages_hold_fifty_players() {
        let db = seeded();
        let board = leaderboard(&db, League::Mlb, &query(), day(2026, 1, 1)).unwrap();
        assert_eq!(board.season, 2025);
        assert_eq!(board.total, 121);
        assert_eq!(board.num_pages, 3);
        assert_eq!(board.page, 1);
        assert_eq!(board.players.len(), PAGE_SIZE);
        assert_eq!(board.players[0].player, "Player 001");
        assert_eq!(board.order, "WAR");
        assert_eq!(board.teams, ["NYY", "OAK"]);
        assert_eq!(board.order_options.len(), 16);

        let last = leaderboard(
            &db,
            League::Mlb,
            &LeaderboardQuery {
                page: Some("3".into()),
                ..query()
            },
            day(2026, 1, 1),
        )
        .unwrap();
        assert_eq!(last.players.len(), 21);
    }

    #[test]
    fn out_of_range_pages_clamp() {
        assert_eq!(clamp_page(None, 3), 1);
        assert_eq!(clamp_page(Some("abc"), 3), 1);
        assert_eq!(clamp_page(Some("2"), 3), 2);
        assert_eq!(clamp_page(Some("99"), 3), 3);
        assert_eq!(clamp_page(Some("0"), 3), 3);
        assert_eq!(clamp_page(Some("-1"), 1), 1);
    }

    #[test]
    fn team_filter_accepts_aliases_and_search_ignores_case() {
        let db = seeded();
        let by_team = leaderboard(
            &db,
            League::Mlb,
            &LeaderboardQuery {
                team: Some("ath".into()),
                ..query()
            },
            day(2026, 1, 1),
        )
        .unwrap();
        assert_eq!(by_team.team, "OAK");
        assert_eq!(by_team.total, 1);
        assert_eq!(by_team.players[0].player, "Brent Rooker");

        let by_name = leaderboard(
            &db,
            League::Mlb,
            &LeaderboardQuery {
                q: Some(" ROOKER ".into()),
                ..query()
            },
            day(2026, 1, 1),
        )
        .unwrap();
        assert_eq!(by_name.q, "ROOKER");
        assert_eq!(by_name.total, 1);
    }

    #[test]
    fn unknown_sort_falls_back_to_war_and_rank_sorts_ascending() {
        let db = seeded();
        let board = leaderboard(
            &db,
            League::Mlb,
            &LeaderboardQuery {
                order: Some("id; DROP TABLE player_stats".into()),
                ..query()
            },
            day(2026, 1, 1),
        )
        .unwrap();
        assert_eq!(board.order, "WAR");

        let by_rank = leaderboard(
            &db,
            League::Mlb,
            &LeaderboardQuery {
                order: Some("Rank".into()),
                page: Some("3".into()),
                ..query()
            },
            day(2026, 1, 1),
        )
        .unwrap();
        assert_eq!(by_rank.players.last().map(|p| p.rank), Some(121));
    }

    #[test]
    fn explicit_season_and_empty_league() {
        let db = seeded();
        let past = leaderboard(
            &db,
            League::Mlb,
            &LeaderboardQuery {
                season: Some(2024),
                ..query()
            },
            day(2026, 1, 1),
        )
        .unwrap();
        assert_eq!(past.total, 1);
        assert_eq!(past.teams, ["LAD"]);

        let kbo = leaderboard(&db, League::Kbo, &query(), day(2026, 1, 1)).unwrap();
        assert_eq!(kbo.season, 2026);
        assert_eq!(kbo.total, 0);
        assert_eq!(kbo.num_pages, 1);
        assert!(kbo.players.is_empty());
    }
}
