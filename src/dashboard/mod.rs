use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{Datelike, Local, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::db::models::{League, UnknownLeague};
use crate::db::Database;
use crate::leaderboard::{self, LeaderboardQuery};
use crate::resolve::ResolutionEngine;
use crate::store::StoreError;
use crate::views::{self, MetricSplit};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Build the Axum router for the read API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/home", get(home_handler))
        .route("/api/:league/main-event", get(main_event_handler))
        .route("/api/:league/schedule", get(schedule_handler))
        .route("/api/:league/leaderboard", get(leaderboard_handler))
        .route("/api/:league/predictions", get(board_handler))
        .route(
            "/api/:league/predictions/:date_code/:away/:home",
            get(detail_handler),
        )
        .route(
            "/api/:league/predictions/:date_code/:away/:home/regression",
            get(regression_handler),
        )
        .route(
            "/api/:league/predictions/:date_code/:away/:home/metrics",
            get(metrics_handler),
        )
        .route(
            "/api/:league/predictions/:date_code/:away/:home/metrics/:split/image",
            get(metrics_image_handler),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

#[derive(Debug, Deserialize)]
struct TodayQuery {
    today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    /// "MM/DD"
    date: Option<String>,
}

type GamePath = (String, String, String, String);

fn store_error(e: StoreError) -> (StatusCode, String) {
    error!("Store failure: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn not_found(what: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}

fn known_league(league: &str) -> ApiResult<League> {
    league
        .parse()
        .map_err(|e: UnknownLeague| (StatusCode::NOT_FOUND, e.to_string()))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// "MM/DD" in the given year.
fn parse_month_day(text: &str, year: i32) -> Option<NaiveDate> {
    let (mm, dd) = text.trim().split_once('/')?;
    NaiveDate::from_ymd_opt(year, mm.trim().parse().ok()?, dd.trim().parse().ok()?)
}

fn selected_date(query: &DateQuery, today: NaiveDate) -> ApiResult<Option<NaiveDate>> {
    match query.date.as_deref() {
        None => Ok(None),
        Some(text) => parse_month_day(text, today.year())
            .map(Some)
            .ok_or((StatusCode::BAD_REQUEST, format!("invalid date {text:?}, expected MM/DD"))),
    }
}

/// GET /api/home?today=YYYY-MM-DD
async fn home_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TodayQuery>,
) -> ApiResult<impl IntoResponse> {
    let today = query.today.unwrap_or_else(today);
    views::home(&state.db, today).map(Json).map_err(store_error)
}

/// GET /api/:league/main-event?today=YYYY-MM-DD
async fn main_event_handler(
    State(state): State<Arc<AppState>>,
    Path(league): Path<String>,
    Query(query): Query<TodayQuery>,
) -> ApiResult<impl IntoResponse> {
    let today = query.today.unwrap_or_else(today);
    ResolutionEngine::new(state.db.clone())
        .resolve(&league, today)
        .map(Json)
        .map_err(store_error)
}

/// GET /api/:league/schedule?date=MM/DD
async fn schedule_handler(
    State(state): State<Arc<AppState>>,
    Path(league): Path<String>,
    Query(query): Query<DateQuery>,
) -> ApiResult<impl IntoResponse> {
    let league = known_league(&league)?;
    let today = today();
    let day = selected_date(&query, today)?.unwrap_or(today);
    views::schedule_page(&state.db, league, day)
        .map(Json)
        .map_err(store_error)
}

/// GET /api/:league/leaderboard?season=&q=&team=&order=&page=
async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Path(league): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<impl IntoResponse> {
    let league = known_league(&league)?;
    leaderboard::leaderboard(&state.db, league, &query, today())
        .map(Json)
        .map_err(store_error)
}

/// GET /api/:league/predictions?date=MM/DD
async fn board_handler(
    State(state): State<Arc<AppState>>,
    Path(league): Path<String>,
    Query(query): Query<DateQuery>,
) -> ApiResult<impl IntoResponse> {
    let today = today();
    let selected = selected_date(&query, today)?;
    views::weekly_board(&state.db, &league, selected, today)
        .map(Json)
        .map_err(store_error)
}

/// GET /api/:league/predictions/:date_code/:away/:home
async fn detail_handler(
    State(state): State<Arc<AppState>>,
    Path((league, date_code, away, home)): Path<GamePath>,
) -> ApiResult<impl IntoResponse> {
    views::prediction_detail(&state.db, &league, &date_code, &away, &home)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("prediction"))
}

/// GET /api/:league/predictions/:date_code/:away/:home/regression
async fn regression_handler(
    State(state): State<Arc<AppState>>,
    Path((league, date_code, away, home)): Path<GamePath>,
) -> ApiResult<impl IntoResponse> {
    views::regression_report(&state.db, &league, &date_code, &away, &home)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("regression prediction"))
}

/// GET /api/:league/predictions/:date_code/:away/:home/metrics
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    Path((league, date_code, away, home)): Path<GamePath>,
) -> ApiResult<impl IntoResponse> {
    views::metric_report(&state.db, &league, &date_code, &away, &home)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("metrics"))
}

/// GET /api/:league/predictions/:date_code/:away/:home/metrics/:split/image
async fn metrics_image_handler(
    State(state): State<Arc<AppState>>,
    Path((league, date_code, away, home, split)): Path<(String, String, String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let split: MetricSplit = split
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;
    let report = views::metric_report(&state.db, &league, &date_code, &away, &home)
        .map_err(store_error)?
        .ok_or_else(|| not_found("metrics"))?;
    let path = report
        .confmat_path(split)
        .ok_or_else(|| not_found("confusion matrix"))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| not_found("confusion matrix file"))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}
