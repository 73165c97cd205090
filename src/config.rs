use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::db::models::League;

/// Baseball schedule and prediction resolver
#[derive(Parser, Debug, Clone)]
#[command(name = "ballpark-predictions", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "predictions.db")]
    pub database_path: String,

    /// Read API listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the JSON read API (default)
    Serve,

    /// Print the resolved main event of a league as JSON
    Resolve {
        #[arg(long)]
        league: String,
        /// Reference date (YYYY-MM-DD), defaults to the local date
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Import classification predictions from a JSON array of rows
    ImportClassification {
        #[arg(long)]
        path: PathBuf,
    },

    /// Import regression predictions from a JSON array of rows
    ImportRegression {
        #[arg(long)]
        path: PathBuf,
    },

    /// Scan a directory of classifier reports and confusion matrices
    ImportMetrics {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Replace a league's schedule for one year from a JSON array of rows
    ImportSchedule {
        #[arg(long)]
        league: League,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        path: PathBuf,
    },

    /// Upsert one season of batting stats from a JSON array of sheet rows
    ImportPlayerStats {
        #[arg(long, default_value = "mlb")]
        league: League,
        #[arg(long)]
        season: i32,
        #[arg(long)]
        path: PathBuf,
    },

    /// Flag a schedule entry as its league's main event
    Feature {
        #[arg(long)]
        id: i64,
        /// Clear the flag instead of setting it
        #[arg(long, default_value = "false")]
        clear: bool,
    },
}

impl Config {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_path.trim().is_empty() {
            anyhow::bail!("database_path must not be empty");
        }
        if self.command() == Command::Serve && self.dashboard_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("dashboard_addr {:?} is not a socket address", self.dashboard_addr);
        }
        Ok(())
    }
}
