use anyhow::Result;
use chrono::Local;
use clap::Parser;
use serde::Serialize;
use std::net::SocketAddr;
use tracing::info;

mod codec;
mod config;
mod dashboard;
mod db;
mod ingest;
mod leaderboard;
mod resolve;
mod store;
mod teams;
mod views;

use config::{Command, Config};
use dashboard::AppState;
use db::Database;
use ingest::{
    collect_metric_bundles, import_classifications, import_metric_bundles, import_player_stats,
    import_regressions, import_schedule, read_rows, ClassificationRow, PlayerStatRow,
    RegressionRow, ScheduleRow,
};
use resolve::ResolutionEngine;
use store::PredictionStore;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    match config.command() {
        Command::Serve => {
            let app = dashboard::router(AppState { db });
            let addr: SocketAddr = config.dashboard_addr.parse()?;
            info!("Read API listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Command::Resolve { league, today } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            let resolved = ResolutionEngine::new(db).resolve(&league, today)?;
            print_json(&resolved)?;
        }
        Command::ImportClassification { path } => {
            let rows: Vec<ClassificationRow> = read_rows(&path)?;
            print_json(&import_classifications(&db, &rows)?)?;
        }
        Command::ImportRegression { path } => {
            let rows: Vec<RegressionRow> = read_rows(&path)?;
            print_json(&import_regressions(&db, &rows)?)?;
        }
        Command::ImportMetrics { dir } => {
            let bundles = collect_metric_bundles(&dir)?;
            print_json(&import_metric_bundles(&db, &bundles)?)?;
        }
        Command::ImportSchedule { league, year, path } => {
            let rows: Vec<ScheduleRow> = read_rows(&path)?;
            print_json(&import_schedule(&db, league, year, &rows)?)?;
        }
        Command::ImportPlayerStats {
            league,
            season,
            path,
        } => {
            let rows: Vec<PlayerStatRow> = read_rows(&path)?;
            print_json(&import_player_stats(&db, league, season, &rows)?)?;
        }
        Command::Feature { id, clear } => {
            if !db.set_main_event(id, !clear)? {
                anyhow::bail!("No schedule entry with id {}", id);
            }
            info!(
                "Schedule entry {} {} as main event",
                id,
                if clear { "unflagged" } else { "flagged" }
            );
        }
    }

    Ok(())
}
