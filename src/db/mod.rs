use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

use crate::codec::InningLine;
use crate::store::{
    DateFilter, DateOrder, PredictionFilter, PredictionStore, Replaced, ScheduleFilter,
    StatFilter, StatSort, StoreError, StoreResult, TeamFilter, Upserted,
};

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` inside one transaction; nothing is kept if it fails.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> StoreResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn query_classifications(
        &self,
        filter: &PredictionFilter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<ClassificationPrediction>> {
        let (clause, values) = prediction_where(filter, "c", "c.date");
        let sql = format!(
            "SELECT {CLASSIFICATION_COLUMNS} FROM classification_predictions c
             WHERE {clause} ORDER BY {}{}",
            prediction_order(filter.order, "c", "c.date"),
            limit_sql(limit),
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), map_classification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query_regressions(
        &self,
        filter: &PredictionFilter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<RegressionPrediction>> {
        let (mut clause, values) = prediction_where(filter, "r", "r.date");
        if filter.paired_only {
            clause.push_str(&format!(" AND {PAIRED_SQL}"));
        }
        let sql = format!(
            "SELECT {REGRESSION_COLUMNS} FROM regression_predictions r
             WHERE {clause} ORDER BY {}{}",
            prediction_order(filter.order, "r", "r.date"),
            limit_sql(limit),
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), map_regression)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query_schedule(
        &self,
        filter: &ScheduleFilter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<ScheduleEntry>> {
        let (clause, values) = schedule_where(filter);
        let dir = order_sql(filter.order);
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules s
             WHERE {clause}
             ORDER BY s.year {dir}, s.month {dir}, s.day {dir}, s.id {dir}{}",
            limit_sql(limit),
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), map_schedule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl PredictionStore for Database {
    // ── Schedule ──────────────────────────────────────────────────────────────

    fn find_schedule(&self, filter: &ScheduleFilter) -> StoreResult<Option<ScheduleEntry>> {
        Ok(self.query_schedule(filter, Some(1))?.into_iter().next())
    }

    fn list_schedule(&self, filter: &ScheduleFilter) -> StoreResult<Vec<ScheduleEntry>> {
        self.query_schedule(filter, None)
    }

    fn replace_schedule(
        &self,
        filter: &ScheduleFilter,
        entries: &[ScheduleEntry],
    ) -> StoreResult<Replaced> {
        self.write(|tx| {
            Ok(Replaced {
                removed: delete_schedule(tx, filter)?,
                written: insert_schedule(tx, entries)?,
            })
        })
    }

    fn set_main_event(&self, id: i64, is_main_event: bool) -> StoreResult<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE schedules SET is_main_event=?1 WHERE id=?2",
            params![is_main_event, id],
        )?;
        Ok(n > 0)
    }

    // ── Classification predictions ────────────────────────────────────────────

    fn find_classification(
        &self,
        filter: &PredictionFilter,
    ) -> StoreResult<Option<ClassificationPrediction>> {
        Ok(self.query_classifications(filter, Some(1))?.into_iter().next())
    }

    fn list_classifications(
        &self,
        filter: &PredictionFilter,
    ) -> StoreResult<Vec<ClassificationPrediction>> {
        self.query_classifications(filter, None)
    }

    fn replace_classifications(
        &self,
        filter: &PredictionFilter,
        records: &[ClassificationPrediction],
    ) -> StoreResult<Replaced> {
        self.write(|tx| {
            Ok(Replaced {
                removed: delete_classifications(tx, filter)?,
                written: insert_classifications(tx, records)?,
            })
        })
    }

    // ── Regression predictions ────────────────────────────────────────────────

    fn find_regression(
        &self,
        filter: &PredictionFilter,
    ) -> StoreResult<Option<RegressionPrediction>> {
        Ok(self.query_regressions(filter, Some(1))?.into_iter().next())
    }

    fn list_regressions(&self, filter: &PredictionFilter) -> StoreResult<Vec<RegressionPrediction>> {
        self.query_regressions(filter, None)
    }

    fn replace_regressions(
        &self,
        filter: &PredictionFilter,
        records: &[RegressionPrediction],
    ) -> StoreResult<Replaced> {
        self.write(|tx| {
            Ok(Replaced {
                removed: delete_regressions(tx, filter)?,
                written: insert_regressions(tx, records)?,
            })
        })
    }

    // ── Metric bundles ────────────────────────────────────────────────────────

    fn find_metric(&self, filter: &PredictionFilter) -> StoreResult<Option<MetricBundle>> {
        let (clause, values) = prediction_where(filter, "m", METRIC_DATE_SQL);
        let sql = format!(
            "SELECT {METRIC_COLUMNS} FROM metric_bundles m
             WHERE {clause} ORDER BY {} LIMIT 1",
            prediction_order(filter.order, "m", METRIC_DATE_SQL),
        );
        let conn = self.lock()?;
        let bundle = conn
            .query_row(&sql, params_from_iter(values), map_metric)
            .optional()?;
        Ok(bundle)
    }

    fn upsert_metric(&self, bundle: &MetricBundle) -> StoreResult<bool> {
        let conn = self.lock()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM metric_bundles WHERE date_code=?1 AND away=?2 AND home=?3",
                params![bundle.date_code, bundle.away, bundle.home],
                |row| row.get(0),
            )
            .optional()?;
        conn.execute(
            "INSERT INTO metric_bundles (
                date_code, away, home, away_norm, home_norm,
                valid_report, test_report, valid_confmat_path, test_confmat_path, updated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(date_code, away, home) DO UPDATE SET
                away_norm=excluded.away_norm,
                home_norm=excluded.home_norm,
                valid_report=excluded.valid_report,
                test_report=excluded.test_report,
                valid_confmat_path=excluded.valid_confmat_path,
                test_confmat_path=excluded.test_confmat_path,
                updated_at=excluded.updated_at",
            params![
                bundle.date_code,
                bundle.away,
                bundle.home,
                bundle.away_norm,
                bundle.home_norm,
                bundle.valid_report,
                bundle.test_report,
                bundle.valid_confmat_path,
                bundle.test_confmat_path,
                Utc::now(),
            ],
        )?;
        Ok(existing.is_none())
    }

    // ── Player stats ──────────────────────────────────────────────────────────

    fn list_player_stats(
        &self,
        filter: &StatFilter,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<PlayerStat>> {
        let (clause, mut values) = stat_where(filter);
        let sql = format!(
            "SELECT {PLAYER_STAT_COLUMNS} FROM player_stats p
             WHERE {clause} ORDER BY {}, p.rank ASC, p.id ASC LIMIT ? OFFSET ?",
            stat_order(filter.sort),
        );
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), map_player_stat)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn count_player_stats(&self, filter: &StatFilter) -> StoreResult<usize> {
        let (clause, values) = stat_where(filter);
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM player_stats p WHERE {clause}"),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn player_teams(&self, league: League, season: i32) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT team_norm FROM player_stats
             WHERE league=?1 AND season=?2 ORDER BY team_norm",
        )?;
        let teams = stmt
            .query_map(params![league.as_str(), season], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(teams)
    }

    fn latest_season(&self, league: League) -> StoreResult<Option<i32>> {
        let conn = self.lock()?;
        let season = conn.query_row(
            "SELECT MAX(season) FROM player_stats WHERE league=?1",
            params![league.as_str()],
            |row| row.get(0),
        )?;
        Ok(season)
    }

    fn upsert_player_stats(&self, stats: &[PlayerStat]) -> StoreResult<Upserted> {
        self.write(|tx| {
            let mut counts = Upserted::default();
            for p in stats {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM player_stats
                         WHERE season=?1 AND league=?2 AND player=?3 AND team_norm=?4",
                        params![p.season, p.league.as_str(), p.player, p.team_norm],
                        |row| row.get(0),
                    )
                    .optional()?;
                upsert_player_stat(tx, p)?;
                match existing {
                    Some(_) => counts.updated += 1,
                    None => counts.created += 1,
                }
            }
            Ok(counts)
        })
    }
}

// ── Batch writes (run inside a transaction) ────────────────────────────────────

fn delete_schedule(conn: &Connection, filter: &ScheduleFilter) -> rusqlite::Result<usize> {
    let (clause, values) = schedule_where(filter);
    conn.execute(
        &format!("DELETE FROM schedules WHERE id IN (SELECT s.id FROM schedules s WHERE {clause})"),
        params_from_iter(values),
    )
}

fn insert_schedule(conn: &Connection, entries: &[ScheduleEntry]) -> rusqlite::Result<usize> {
    let mut written = 0;
    for e in entries {
        written += conn.execute(
            "INSERT INTO schedules (
                league, year, month, day, weekday, time, stadium,
                team1, team2, score_team1, score_team2, is_main_event
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                e.league.as_str(),
                e.year,
                e.month,
                e.day,
                e.weekday,
                e.time,
                e.stadium,
                e.team1,
                e.team2,
                e.score_team1,
                e.score_team2,
                e.is_main_event,
            ],
        )?;
    }
    Ok(written)
}

fn delete_classifications(conn: &Connection, filter: &PredictionFilter) -> rusqlite::Result<usize> {
    let (clause, values) = prediction_where(filter, "c", "c.date");
    conn.execute(
        &format!(
            "DELETE FROM classification_predictions WHERE id IN
             (SELECT c.id FROM classification_predictions c WHERE {clause})"
        ),
        params_from_iter(values),
    )
}

fn insert_classifications(
    conn: &Connection,
    records: &[ClassificationPrediction],
) -> rusqlite::Result<usize> {
    let mut written = 0;
    for c in records {
        written += conn.execute(
            "INSERT OR IGNORE INTO classification_predictions (
                date_code, date, away, home, away_norm, home_norm,
                proba_sigmoid, proba_isotonic, label
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                c.date_code,
                c.date,
                c.away,
                c.home,
                c.away_norm,
                c.home_norm,
                c.proba_sigmoid,
                c.proba_isotonic,
                c.label,
            ],
        )?;
    }
    Ok(written)
}

fn delete_regressions(conn: &Connection, filter: &PredictionFilter) -> rusqlite::Result<usize> {
    let (mut clause, values) = prediction_where(filter, "r", "r.date");
    if filter.paired_only {
        clause.push_str(&format!(" AND {PAIRED_SQL}"));
    }
    conn.execute(
        &format!(
            "DELETE FROM regression_predictions WHERE id IN
             (SELECT r.id FROM regression_predictions r WHERE {clause})"
        ),
        params_from_iter(values),
    )
}

fn insert_regressions(conn: &Connection, records: &[RegressionPrediction]) -> rusqlite::Result<usize> {
    let mut written = 0;
    for r in records {
        written += conn.execute(
            "INSERT OR IGNORE INTO regression_predictions (
                date_code, date, away, home, away_norm, home_norm,
                pred_inn_away, pred_inn_home, act_inn_away, act_inn_home,
                pred_total_away, pred_total_home, act_total_away, act_total_home,
                actual_starters, predicted_starters, pitching_changes, game_pk
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            params![
                r.date_code,
                r.date,
                r.away,
                r.home,
                r.away_norm,
                r.home_norm,
                r.predicted_away.to_text(),
                r.predicted_home.to_text(),
                actual_text(&r.actual_away),
                actual_text(&r.actual_home),
                r.predicted_total_away,
                r.predicted_total_home,
                r.actual_total_away,
                r.actual_total_home,
                r.actual_starters,
                r.predicted_starters,
                r.pitching_changes,
                r.game_pk,
            ],
        )?;
    }
    Ok(written)
}

fn upsert_player_stat(conn: &Connection, p: &PlayerStat) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO player_stats (
            season, league, rank, player, age, team, team_norm, lg,
            war, games, pa, ab, runs, hits, doubles, triples, hr, rbi, sb, cs, bb, so,
            ba, obp, slg, ops, ops_plus, roba, rbat_plus, tb, gidp, hbp, sh, sf, ibb,
            pos, awards, updated_at
         ) VALUES (
            ?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,
            ?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33,?34,?35,?36,?37,?38
         )
         ON CONFLICT(season, league, player, team_norm) DO UPDATE SET
            rank=excluded.rank, age=excluded.age, team=excluded.team, lg=excluded.lg,
            war=excluded.war, games=excluded.games, pa=excluded.pa, ab=excluded.ab,
            runs=excluded.runs, hits=excluded.hits, doubles=excluded.doubles,
            triples=excluded.triples, hr=excluded.hr, rbi=excluded.rbi, sb=excluded.sb,
            cs=excluded.cs, bb=excluded.bb, so=excluded.so, ba=excluded.ba,
            obp=excluded.obp, slg=excluded.slg, ops=excluded.ops,
            ops_plus=excluded.ops_plus, roba=excluded.roba, rbat_plus=excluded.rbat_plus,
            tb=excluded.tb, gidp=excluded.gidp, hbp=excluded.hbp, sh=excluded.sh,
            sf=excluded.sf, ibb=excluded.ibb, pos=excluded.pos, awards=excluded.awards,
            updated_at=excluded.updated_at",
        params![
            p.season,
            p.league.as_str(),
            p.rank,
            p.player,
            p.age,
            p.team,
            p.team_norm,
            p.lg,
            p.war,
            p.games,
            p.pa,
            p.ab,
            p.runs,
            p.hits,
            p.doubles,
            p.triples,
            p.hr,
            p.rbi,
            p.sb,
            p.cs,
            p.bb,
            p.so,
            p.ba,
            p.obp,
            p.slg,
            p.ops,
            p.ops_plus,
            p.roba,
            p.rbat_plus,
            p.tb,
            p.gidp,
            p.hbp,
            p.sh,
            p.sf,
            p.ibb,
            p.pos,
            p.awards,
            Utc::now(),
        ],
    )
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const SCHEDULE_COLUMNS: &str = "s.id, s.league, s.year, s.month, s.day, s.weekday, s.time,
    s.stadium, s.team1, s.team2, s.score_team1, s.score_team2, s.is_main_event";

const CLASSIFICATION_COLUMNS: &str = "c.id, c.date_code, c.date, c.away, c.home,
    c.away_norm, c.home_norm, c.proba_sigmoid, c.proba_isotonic, c.label";

const REGRESSION_COLUMNS: &str = "r.id, r.date_code, r.date, r.away, r.home,
    r.away_norm, r.home_norm, r.pred_inn_away, r.pred_inn_home, r.act_inn_away, r.act_inn_home,
    r.pred_total_away, r.pred_total_home, r.act_total_away, r.act_total_home,
    r.actual_starters, r.predicted_starters, r.pitching_changes, r.game_pk";

const PLAYER_STAT_COLUMNS: &str = "p.id, p.season, p.league, p.rank, p.player, p.age,
    p.team, p.team_norm, p.lg, p.war, p.games, p.pa, p.ab, p.runs, p.hits, p.doubles,
    p.triples, p.hr, p.rbi, p.sb, p.cs, p.bb, p.so, p.ba, p.obp, p.slg, p.ops, p.ops_plus,
    p.roba, p.rbat_plus, p.tb, p.gidp, p.hbp, p.sh, p.sf, p.ibb, p.pos, p.awards, p.updated_at";

const METRIC_COLUMNS: &str = "m.id, m.date_code, m.away, m.home, m.away_norm, m.home_norm,
    m.valid_report, m.test_report, m.valid_confmat_path, m.test_confmat_path, m.updated_at";

/// Metric bundles only carry the YYMMDD code; this expands it to an ISO date.
const METRIC_DATE_SQL: &str = "('20' || substr(m.date_code, 1, 2) || '-' || \
    substr(m.date_code, 3, 2) || '-' || substr(m.date_code, 5, 2))";

/// Regression row `r` has a classification partner.
const PAIRED_SQL: &str = "EXISTS (SELECT 1 FROM classification_predictions pc
    WHERE pc.date = r.date AND pc.away_norm = r.away_norm AND pc.home_norm = r.home_norm)";

fn iso(date: NaiveDate) -> Value {
    Value::Text(date.format("%Y-%m-%d").to_string())
}

fn order_sql(order: DateOrder) -> &'static str {
    match order {
        DateOrder::Ascending => "ASC",
        DateOrder::Descending => "DESC",
    }
}

fn limit_sql(limit: Option<usize>) -> String {
    limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default()
}

/// Date in the requested direction; same-date rows by matchup, then insertion.
fn prediction_order(order: DateOrder, alias: &str, date_expr: &str) -> String {
    let dir = order_sql(order);
    format!("{date_expr} {dir}, {alias}.away_norm ASC, {alias}.home_norm ASC, {alias}.id {dir}")
}

fn prediction_where(filter: &PredictionFilter, alias: &str, date_expr: &str) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    match &filter.dates {
        DateFilter::Any => {}
        DateFilter::MonthDay { month, day } => {
            clauses.push(format!(
                "CAST(strftime('%m', {date_expr}) AS INTEGER) = ? \
                 AND CAST(strftime('%d', {date_expr}) AS INTEGER) = ?"
            ));
            values.push(Value::Integer(i64::from(*month)));
            values.push(Value::Integer(i64::from(*day)));
        }
        DateFilter::On(d) => {
            clauses.push(format!("{date_expr} = ?"));
            values.push(iso(*d));
        }
        DateFilter::OnOrAfter(d) => {
            clauses.push(format!("{date_expr} >= ?"));
            values.push(iso(*d));
        }
        DateFilter::Before(d) => {
            clauses.push(format!("{date_expr} < ?"));
            values.push(iso(*d));
        }
        DateFilter::Between(start, end) => {
            clauses.push(format!("{date_expr} BETWEEN ? AND ?"));
            values.push(iso(*start));
            values.push(iso(*end));
        }
        DateFilter::DateCodes(codes) => {
            if codes.is_empty() {
                clauses.push("0".to_string());
            } else {
                let marks = vec!["?"; codes.len()].join(",");
                clauses.push(format!("{alias}.date_code IN ({marks})"));
                values.extend(codes.iter().cloned().map(Value::Text));
            }
        }
    }

    let (matchup, away_col, home_col) = match &filter.teams {
        TeamFilter::Any => (None, "", ""),
        TeamFilter::Normalized(m) => (Some(m), "away_norm", "home_norm"),
        TeamFilter::Raw(m) => (Some(m), "away", "home"),
    };
    if let Some(m) = matchup {
        clauses.push(format!("{alias}.{away_col} = ? AND {alias}.{home_col} = ?"));
        values.push(Value::Text(m.away.clone()));
        values.push(Value::Text(m.home.clone()));
    }

    if clauses.is_empty() {
        clauses.push("1".to_string());
    }
    (clauses.join(" AND "), values)
}

fn schedule_where(filter: &ScheduleFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = vec!["1".to_string()];
    let mut values: Vec<Value> = Vec::new();
    if let Some(league) = filter.league {
        clauses.push("s.league = ?".to_string());
        values.push(Value::Text(league.as_str().to_string()));
    }
    if let Some(year) = filter.year {
        clauses.push("s.year = ?".to_string());
        values.push(Value::Integer(i64::from(year)));
    }
    if let Some(month) = filter.month {
        clauses.push("s.month = ?".to_string());
        values.push(Value::Integer(i64::from(month)));
    }
    if let Some((month, day)) = filter.month_day {
        clauses.push("s.month = ? AND s.day = ?".to_string());
        values.push(Value::Integer(i64::from(month)));
        values.push(Value::Integer(i64::from(day)));
    }
    if let Some((month, day)) = filter.after {
        clauses.push("(s.month > ? OR (s.month = ? AND s.day > ?))".to_string());
        values.push(Value::Integer(i64::from(month)));
        values.push(Value::Integer(i64::from(month)));
        values.push(Value::Integer(i64::from(day)));
    }
    if filter.main_event_only {
        clauses.push("s.is_main_event = 1".to_string());
    }
    (clauses.join(" AND "), values)
}

fn stat_where(filter: &StatFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["p.league = ?".to_string(), "p.season = ?".to_string()];
    let mut values = vec![
        Value::Text(filter.league.as_str().to_string()),
        Value::Integer(i64::from(filter.season)),
    ];
    if let Some(name) = filter.name.as_deref().filter(|n| !n.is_empty()) {
        clauses.push("instr(lower(p.player), lower(?)) > 0".to_string());
        values.push(Value::Text(name.to_string()));
    }
    if let Some(team) = filter.team.as_deref().filter(|t| !t.is_empty()) {
        clauses.push("p.team_norm = ?".to_string());
        values.push(Value::Text(team.to_string()));
    }
    (clauses.join(" AND "), values)
}

/// Sort column and direction; blanks go last either way.
fn stat_order(sort: StatSort) -> &'static str {
    match sort {
        StatSort::War => "p.war DESC NULLS LAST",
        StatSort::OpsPlus => "p.ops_plus DESC NULLS LAST",
        StatSort::Ops => "p.ops DESC NULLS LAST",
        StatSort::Hr => "p.hr DESC NULLS LAST",
        StatSort::Rbi => "p.rbi DESC NULLS LAST",
        StatSort::Sb => "p.sb DESC NULLS LAST",
        StatSort::Ba => "p.ba DESC NULLS LAST",
        StatSort::Obp => "p.obp DESC NULLS LAST",
        StatSort::Slg => "p.slg DESC NULLS LAST",
        StatSort::Tb => "p.tb DESC NULLS LAST",
        StatSort::So => "p.so ASC NULLS LAST",
        StatSort::Bb => "p.bb DESC NULLS LAST",
        StatSort::R => "p.runs DESC NULLS LAST",
        StatSort::H => "p.hits DESC NULLS LAST",
        StatSort::Pa => "p.pa DESC NULLS LAST",
        StatSort::Rank => "p.rank ASC",
    }
}

fn actual_text(line: &Option<InningLine>) -> Option<String> {
    line.as_ref().filter(|l| !l.is_empty()).map(InningLine::to_text)
}

fn map_schedule(row: &rusqlite::Row) -> rusqlite::Result<ScheduleEntry> {
    let league: String = row.get(1)?;
    let league = league
        .parse::<League>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(ScheduleEntry {
        id: row.get(0)?,
        league,
        year: row.get(2)?,
        month: row.get(3)?,
        day: row.get(4)?,
        weekday: row.get(5)?,
        time: row.get(6)?,
        stadium: row.get(7)?,
        team1: row.get(8)?,
        team2: row.get(9)?,
        score_team1: row.get(10)?,
        score_team2: row.get(11)?,
        is_main_event: row.get(12)?,
    })
}

fn map_classification(row: &rusqlite::Row) -> rusqlite::Result<ClassificationPrediction> {
    Ok(ClassificationPrediction {
        id: row.get(0)?,
        date_code: row.get(1)?,
        date: row.get(2)?,
        away: row.get(3)?,
        home: row.get(4)?,
        away_norm: row.get(5)?,
        home_norm: row.get(6)?,
        proba_sigmoid: row.get(7)?,
        proba_isotonic: row.get(8)?,
        label: row.get(9)?,
    })
}

fn map_regression(row: &rusqlite::Row) -> rusqlite::Result<RegressionPrediction> {
    let pred_away: String = row.get(7)?;
    let pred_home: String = row.get(8)?;
    let act_away: Option<String> = row.get(9)?;
    let act_home: Option<String> = row.get(10)?;
    Ok(RegressionPrediction {
        id: row.get(0)?,
        date_code: row.get(1)?,
        date: row.get(2)?,
        away: row.get(3)?,
        home: row.get(4)?,
        away_norm: row.get(5)?,
        home_norm: row.get(6)?,
        predicted_away: InningLine::from_text(&pred_away),
        predicted_home: InningLine::from_text(&pred_home),
        actual_away: act_away.as_deref().map(InningLine::from_text),
        actual_home: act_home.as_deref().map(InningLine::from_text),
        predicted_total_away: row.get(11)?,
        predicted_total_home: row.get(12)?,
        actual_total_away: row.get(13)?,
        actual_total_home: row.get(14)?,
        actual_starters: row.get(15)?,
        predicted_starters: row.get(16)?,
        pitching_changes: row.get(17)?,
        game_pk: row.get(18)?,
    })
}

fn map_metric(row: &rusqlite::Row) -> rusqlite::Result<MetricBundle> {
    Ok(MetricBundle {
        id: row.get(0)?,
        date_code: row.get(1)?,
        away: row.get(2)?,
        home: row.get(3)?,
        away_norm: row.get(4)?,
        home_norm: row.get(5)?,
        valid_report: row.get(6)?,
        test_report: row.get(7)?,
        valid_confmat_path: row.get(8)?,
        test_confmat_path: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_player_stat(row: &rusqlite::Row) -> rusqlite::Result<PlayerStat> {
    let league: String = row.get(2)?;
    let league = league
        .parse::<League>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(PlayerStat {
        id: row.get(0)?,
        season: row.get(1)?,
        league,
        rank: row.get(3)?,
        player: row.get(4)?,
        age: row.get(5)?,
        team: row.get(6)?,
        team_norm: row.get(7)?,
        lg: row.get(8)?,
        war: row.get(9)?,
        games: row.get(10)?,
        pa: row.get(11)?,
        ab: row.get(12)?,
        runs: row.get(13)?,
        hits: row.get(14)?,
        doubles: row.get(15)?,
        triples: row.get(16)?,
        hr: row.get(17)?,
        rbi: row.get(18)?,
        sb: row.get(19)?,
        cs: row.get(20)?,
        bb: row.get(21)?,
        so: row.get(22)?,
        ba: row.get(23)?,
        obp: row.get(24)?,
        slg: row.get(25)?,
        ops: row.get(26)?,
        ops_plus: row.get(27)?,
        roba: row.get(28)?,
        rbat_plus: row.get(29)?,
        tb: row.get(30)?,
        gidp: row.get(31)?,
        hbp: row.get(32)?,
        sh: row.get(33)?,
        sf: row.get(34)?,
        ibb: row.get(35)?,
        pos: row.get(36)?,
        awards: row.get(37)?,
        updated_at: row.get(38)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schedules (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    league        TEXT    NOT NULL,
    year          INTEGER NOT NULL,
    month         INTEGER NOT NULL,
    day           INTEGER NOT NULL,
    weekday       TEXT    NOT NULL DEFAULT '',
    time          TEXT    NOT NULL DEFAULT '',
    stadium       TEXT    NOT NULL DEFAULT '',
    team1         TEXT    NOT NULL,
    team2         TEXT    NOT NULL,
    score_team1   INTEGER,
    score_team2   INTEGER,
    is_main_event INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS classification_predictions (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    date_code      TEXT    NOT NULL,
    date           TEXT    NOT NULL,
    away           TEXT    NOT NULL,
    home           TEXT    NOT NULL,
    away_norm      TEXT    NOT NULL,
    home_norm      TEXT    NOT NULL,
    proba_sigmoid  REAL    NOT NULL,
    proba_isotonic REAL,
    label          INTEGER,
    UNIQUE(date_code, away, home)
);

CREATE TABLE IF NOT EXISTS regression_predictions (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    date_code          TEXT    NOT NULL,
    date               TEXT    NOT NULL,
    away               TEXT    NOT NULL,
    home               TEXT    NOT NULL,
    away_norm          TEXT    NOT NULL,
    home_norm          TEXT    NOT NULL,
    pred_inn_away      TEXT    NOT NULL DEFAULT '',
    pred_inn_home      TEXT    NOT NULL DEFAULT '',
    act_inn_away       TEXT,
    act_inn_home       TEXT,
    pred_total_away    INTEGER,
    pred_total_home    INTEGER,
    act_total_away     INTEGER,
    act_total_home     INTEGER,
    actual_starters    TEXT,
    predicted_starters TEXT,
    pitching_changes   TEXT,
    game_pk            TEXT,
    UNIQUE(date_code, away_norm, home_norm)
);

CREATE TABLE IF NOT EXISTS metric_bundles (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    date_code          TEXT    NOT NULL,
    away               TEXT    NOT NULL,
    home               TEXT    NOT NULL,
    away_norm          TEXT    NOT NULL,
    home_norm          TEXT    NOT NULL,
    valid_report       TEXT,
    test_report        TEXT,
    valid_confmat_path TEXT,
    test_confmat_path  TEXT,
    updated_at         TEXT    NOT NULL,
    UNIQUE(date_code, away, home)
);

CREATE TABLE IF NOT EXISTS player_stats (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    season     INTEGER NOT NULL,
    league     TEXT    NOT NULL,
    rank       INTEGER NOT NULL,
    player     TEXT    NOT NULL,
    age        INTEGER,
    team       TEXT    NOT NULL,
    team_norm  TEXT    NOT NULL,
    lg         TEXT    NOT NULL DEFAULT '',
    war        REAL,
    games      INTEGER,
    pa         INTEGER,
    ab         INTEGER,
    runs       INTEGER,
    hits       INTEGER,
    doubles    INTEGER,
    triples    INTEGER,
    hr         INTEGER,
    rbi        INTEGER,
    sb         INTEGER,
    cs         INTEGER,
    bb         INTEGER,
    so         INTEGER,
    ba         REAL,
    obp        REAL,
    slg        REAL,
    ops        REAL,
    ops_plus   INTEGER,
    roba       REAL,
    rbat_plus  INTEGER,
    tb         INTEGER,
    gidp       INTEGER,
    hbp        INTEGER,
    sh         INTEGER,
    sf         INTEGER,
    ibb        INTEGER,
    pos        TEXT,
    awards     TEXT,
    updated_at TEXT    NOT NULL,
    UNIQUE(season, league, player, team_norm)
);

CREATE INDEX IF NOT EXISTS idx_schedules_league ON schedules(league, is_main_event);
CREATE INDEX IF NOT EXISTS idx_class_date ON classification_predictions(date);
CREATE INDEX IF NOT EXISTS idx_class_norm ON classification_predictions(date, away_norm, home_norm);
CREATE INDEX IF NOT EXISTS idx_reg_date ON regression_predictions(date);
CREATE INDEX IF NOT EXISTS idx_metric_norm ON metric_bundles(date_code, away_norm, home_norm);
CREATE INDEX IF NOT EXISTS idx_stats_season ON player_stats(league, season, team_norm);
"#;


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::teams::Matchup;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn regression_round_trips_inning_lines() {
        let db = db();
        let mut reg = make_reg(day(2025, 3, 29), "SF", "CIN");
        reg.actual_away = Some(InningLine::from(vec![0, 0, 3]));
        reg.pitching_changes = Some("7th: Doval in".into());
        assert_eq!(db.insert_regressions(&[reg.clone()]).unwrap(), 1);

        let got = db
            .find_regression(&PredictionFilter::new().normalized(Matchup::new("SF", "CIN")))
            .unwrap()
            .unwrap();
        assert_eq!(got.predicted_away, reg.predicted_away);
        assert_eq!(got.actual_away, reg.actual_away);
        assert_eq!(got.actual_home, None);
        assert_eq!(got.pitching_changes, reg.pitching_changes);
    }

    #[test]
    fn duplicate_keys_are_ignored_on_insert() {
        let db = db();
        let d = day(2025, 4, 1);
        let written = db
            .insert_classifications(&[
                make_class(d, "ATH", "SEA", 0.6),
                make_class(d, "ATH", "SEA", 0.7),
                make_class(d, "OAK", "SEA", 0.4),
            ])
            .unwrap();
        assert_eq!(written, 2);

        // both raw spellings share one normalized key
        let rows = db
            .list_classifications(&PredictionFilter::new().normalized(Matchup::new("OAK", "SEA")))
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn paired_filter_requires_classification_partner() {
        let db = db();
        let d = day(2025, 4, 2);
        db.insert_regressions(&[make_reg(d, "SF", "CIN"), make_reg(d, "NYY", "BOS")])
            .unwrap();
        db.insert_classifications(&[make_class(d, "NYY", "BOS", 0.55)])
            .unwrap();

        let paired = db
            .list_regressions(&PredictionFilter::new().paired_only())
            .unwrap();
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].away_norm, "NYY");
    }

    #[test]
    fn month_day_filter_ignores_year() {
        let db = db();
        db.insert_regressions(&[
            make_reg(day(2024, 5, 10), "SF", "CIN"),
            make_reg(day(2025, 5, 10), "SF", "CIN"),
            make_reg(day(2025, 5, 11), "SF", "CIN"),
        ])
        .unwrap();
        let filter = PredictionFilter::new()
            .dates(DateFilter::MonthDay { month: 5, day: 10 })
            .order(DateOrder::Descending);
        let rows = db.list_regressions(&filter).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, day(2025, 5, 10));
    }

    #[test]
    fn replace_only_touches_matching_date_codes() {
        let db = db();
        db.insert_classifications(&[
            make_class(day(2025, 4, 1), "SF", "CIN", 0.5),
            make_class(day(2025, 4, 2), "SF", "CIN", 0.5),
        ])
        .unwrap();
        let replaced = db
            .replace_classifications(
                &PredictionFilter::new().dates(DateFilter::DateCodes(vec!["250401".into()])),
                &[make_class(day(2025, 4, 1), "NYY", "BOS", 0.7)],
            )
            .unwrap();
        assert_eq!(replaced, Replaced { removed: 1, written: 1 });
        assert_eq!(db.list_classifications(&PredictionFilter::new()).unwrap().len(), 2);

        let replaced = db
            .replace_classifications(
                &PredictionFilter::new().dates(DateFilter::DateCodes(vec![])),
                &[],
            )
            .unwrap();
        assert_eq!(replaced.removed, 0);
    }

    #[test]
    fn replace_rolls_back_when_insert_fails() {
        let db = db();
        let d = day(2025, 3, 29);
        db.insert_classifications(&[make_class(d, "SF", "CIN", 0.6)])
            .unwrap();
        db.insert_schedule(&[make_schedule(League::Mlb, d, "SF", "CIN", true)])
            .unwrap();
        fail_inserts(&db, "classification_predictions");
        fail_inserts(&db, "schedules");

        let by_code = PredictionFilter::new().dates(DateFilter::DateCodes(vec!["250329".into()]));
        assert!(db
            .replace_classifications(&by_code, &[make_class(d, "NYY", "BOS", 0.5)])
            .is_err());
        let kept = db.list_classifications(&PredictionFilter::new()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].away_norm, "SF");

        let season = ScheduleFilter::league(League::Mlb).year(2025);
        assert!(db
            .replace_schedule(&season, &[make_schedule(League::Mlb, d, "NYY", "BOS", false)])
            .is_err());
        let kept = db.list_schedule(&season).unwrap();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].is_main_event);
    }

    #[test]
    fn schedule_filter_by_month_and_later_days() {
        let db = db();
        db.insert_schedule(&[
            make_schedule(League::Mlb, day(2025, 4, 30), "SF", "CIN", false),
            make_schedule(League::Mlb, day(2025, 5, 2), "NYY", "BOS", false),
            make_schedule(League::Kbo, day(2025, 5, 1), "LG", "KT", false),
            make_schedule(League::Mlb, day(2025, 6, 1), "LAD", "SD", false),
        ])
        .unwrap();

        let may = db
            .list_schedule(&ScheduleFilter::league(League::Mlb).year(2025).in_month(5))
            .unwrap();
        assert_eq!(may.len(), 1);
        assert_eq!(may[0].team1, "NYY");

        let next = db
            .find_schedule(&ScheduleFilter::all().year(2025).after(4, 30))
            .unwrap()
            .unwrap();
        assert_eq!((next.month, next.day, next.league), (5, 1, League::Kbo));
    }

    #[test]
    fn player_stats_upsert_counts_and_sorts() {
        let db = db();
        let mut judge = make_player(2025, 1, "Aaron Judge", "NYY", 9.1);
        let mut raleigh = make_player(2025, 2, "Cal Raleigh", "SEA", 8.7);
        raleigh.so = Some(180);
        let mut rooker = make_player(2025, 3, "Brent Rooker", "ATH", 3.0);
        rooker.war = None;
        let counts = db
            .upsert_player_stats(&[judge.clone(), raleigh, rooker])
            .unwrap();
        assert_eq!(counts, Upserted { created: 3, updated: 0 });

        judge.war = Some(9.5);
        let counts = db.upsert_player_stats(&[judge]).unwrap();
        assert_eq!(counts, Upserted { created: 0, updated: 1 });

        let mut filter = StatFilter {
            league: League::Mlb,
            season: 2025,
            name: None,
            team: None,
            sort: StatSort::War,
        };
        let rows = db.list_player_stats(&filter, 50, 0).unwrap();
        let names: Vec<_> = rows.iter().map(|p| p.player.as_str()).collect();
        assert_eq!(names, ["Aaron Judge", "Cal Raleigh", "Brent Rooker"]);
        assert_eq!(rows[0].war, Some(9.5));

        filter.sort = StatSort::So;
        let rows = db.list_player_stats(&filter, 1, 0).unwrap();
        assert_ne!(rows[0].player, "Cal Raleigh");

        filter.name = Some("RALEIGH".into());
        assert_eq!(db.count_player_stats(&filter).unwrap(), 1);
        filter.name = None;
        filter.team = Some("OAK".into());
        assert_eq!(db.count_player_stats(&filter).unwrap(), 1);

        assert_eq!(db.player_teams(League::Mlb, 2025).unwrap(), ["NYY", "OAK", "SEA"]);
        assert_eq!(db.latest_season(League::Mlb).unwrap(), Some(2025));
        assert_eq!(db.latest_season(League::Kbo).unwrap(), None);
    }

    #[test]
    fn main_event_lookup_prefers_latest_entry() {
        let db = db();
        db.insert_schedule(&[
            make_schedule(League::Mlb, day(2025, 4, 1), "SF", "CIN", true),
            make_schedule(League::Mlb, day(2025, 4, 3), "SEA", "OAK", true),
            make_schedule(League::Mlb, day(2025, 4, 3), "NYY", "BOS", true),
            make_schedule(League::Mlb, day(2025, 4, 5), "LAD", "SD", false),
            make_schedule(League::Kbo, day(2025, 4, 9), "LG", "KT", true),
        ])
        .unwrap();
        let entry = db
            .find_schedule(&ScheduleFilter::league(League::Mlb).main_event().newest_first())
            .unwrap()
            .unwrap();
        assert_eq!(entry.team1, "NYY");
        assert_eq!(entry.league, League::Mlb);
    }

    #[test]
    fn set_main_event_reports_missing_ids() {
        let db = db();
        db.insert_schedule(&[make_schedule(League::Kbo, day(2025, 4, 1), "LG", "KT", false)])
            .unwrap();
        let entry = db
            .find_schedule(&ScheduleFilter::league(League::Kbo))
            .unwrap()
            .unwrap();
        assert!(db.set_main_event(entry.id.unwrap(), true).unwrap());
        assert!(!db.set_main_event(9999, true).unwrap());
        let featured = db
            .list_schedule(&ScheduleFilter::league(League::Kbo).main_event())
            .unwrap();
        assert_eq!(featured.len(), 1);
    }

    #[test]
    fn metric_upsert_creates_then_updates() {
        let db = db();
        let mut bundle = MetricBundle {
            id: None,
            date_code: "250329".into(),
            away: "ATH".into(),
            home: "SEA".into(),
            away_norm: "OAK".into(),
            home_norm: "SEA".into(),
            valid_report: Some("acc 0.61".into()),
            test_report: None,
            valid_confmat_path: None,
            test_confmat_path: None,
            updated_at: Utc::now(),
        };
        assert!(db.upsert_metric(&bundle).unwrap());
        bundle.test_report = Some("acc 0.58".into());
        assert!(!db.upsert_metric(&bundle).unwrap());

        let found = db
            .find_metric(
                &PredictionFilter::new()
                    .dates(DateFilter::On(day(2025, 3, 29)))
                    .normalized(Matchup::new("OAK", "SEA")),
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.test_report.as_deref(), Some("acc 0.58"));
        assert_eq!(found.valid_report.as_deref(), Some("acc 0.61"));
    }
}
