use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::codec::InningLine;
use crate::teams::Matchup;

/// Supported leagues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Kbo,
    Mlb,
}

impl League {
    pub fn as_str(&self) -> &'static str {
        match self {
            League::Kbo => "kbo",
            League::Mlb => "mlb",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown league: {0:?}")]
pub struct UnknownLeague(pub String);

impl FromStr for League {
    type Err = UnknownLeague;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kbo" => Ok(League::Kbo),
            "mlb" => Ok(League::Mlb),
            _ => Err(UnknownLeague(s.to_string())),
        }
    }
}

/// `YYMMDD` string for a calendar date (years 2000–2099).
pub fn date_code(date: NaiveDate) -> String {
    format!(
        "{:02}{:02}{:02}",
        date.year() % 100,
        date.month(),
        date.day()
    )
}

/// Parse a 6-digit `YYMMDD` code into a date in the 2000s.
pub fn parse_date_code(code: &str) -> Option<NaiveDate> {
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = code[0..2].parse().ok()?;
    let mm: u32 = code[2..4].parse().ok()?;
    let dd: u32 = code[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
}

/// One game on a league calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: Option<i64>,
    pub league: League,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Weekday label as published, e.g. "Sat"
    pub weekday: String,
    /// Start time as published, e.g. "18:30"
    pub time: String,
    pub stadium: String,
    /// Team codes as published (not normalized)
    pub team1: String,
    pub team2: String,
    pub score_team1: Option<i32>,
    pub score_team2: Option<i32>,
    /// Flagged by an administrator as the league's featured game
    pub is_main_event: bool,
}

/// Home-team win probability from the classification model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationPrediction {
    pub id: Option<i64>,
    /// YYMMDD
    pub date_code: String,
    pub date: NaiveDate,
    /// Codes as exported
    pub away: String,
    pub home: String,
    pub away_norm: String,
    pub home_norm: String,
    /// Home-team win probability (0.0–1.0)
    pub proba_sigmoid: f64,
    pub proba_isotonic: Option<f64>,
    pub label: Option<i32>,
}

impl ClassificationPrediction {
    /// Home win probability as a whole percentage (ties round to even).
    pub fn home_pct(&self) -> i32 {
        ((self.proba_sigmoid * 100.0).round_ties_even() as i32).clamp(0, 100)
    }

    pub fn away_pct(&self) -> i32 {
        100 - self.home_pct()
    }

    pub fn matchup(&self) -> Matchup {
        Matchup::new(self.away_norm.clone(), self.home_norm.clone())
    }
}

/// Predicted (and, once played, actual) inning-by-inning scores from the
/// regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionPrediction {
    pub id: Option<i64>,
    /// YYMMDD
    pub date_code: String,
    pub date: NaiveDate,
    pub away: String,
    pub home: String,
    pub away_norm: String,
    pub home_norm: String,
    pub predicted_away: InningLine,
    pub predicted_home: InningLine,
    pub actual_away: Option<InningLine>,
    pub actual_home: Option<InningLine>,
    pub predicted_total_away: Option<i32>,
    pub predicted_total_home: Option<i32>,
    pub actual_total_away: Option<i32>,
    pub actual_total_home: Option<i32>,
    pub actual_starters: Option<String>,
    pub predicted_starters: Option<String>,
    /// `|`-separated log of pitching changes
    pub pitching_changes: Option<String>,
    /// External game identifier
    pub game_pk: Option<String>,
}

impl RegressionPrediction {
    pub fn matchup(&self) -> Matchup {
        Matchup::new(self.away_norm.clone(), self.home_norm.clone())
    }

    pub fn pitching_change_list(&self) -> Vec<String> {
        self.pitching_changes
            .as_deref()
            .unwrap_or("")
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Classifier evaluation artifacts for one matchup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBundle {
    pub id: Option<i64>,
    /// YYMMDD
    pub date_code: String,
    /// Codes as they appear in the artifact file names
    pub away: String,
    pub home: String,
    pub away_norm: String,
    pub home_norm: String,
    pub valid_report: Option<String>,
    pub test_report: Option<String>,
    pub valid_confmat_path: Option<String>,
    pub test_confmat_path: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One batter's season line from the league stat sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStat {
    pub id: Option<i64>,
    pub season: i32,
    pub league: League,
    pub rank: i32,
    pub player: String,
    pub age: Option<i32>,
    /// Team code as published, e.g. "ATH"
    pub team: String,
    pub team_norm: String,
    /// AL / NL
    pub lg: String,
    pub war: Option<f64>,
    pub games: Option<i32>,
    pub pa: Option<i32>,
    pub ab: Option<i32>,
    pub runs: Option<i32>,
    pub hits: Option<i32>,
    pub doubles: Option<i32>,
    pub triples: Option<i32>,
    pub hr: Option<i32>,
    pub rbi: Option<i32>,
    pub sb: Option<i32>,
    pub cs: Option<i32>,
    pub bb: Option<i32>,
    pub so: Option<i32>,
    pub ba: Option<f64>,
    pub obp: Option<f64>,
    pub slg: Option<f64>,
    pub ops: Option<f64>,
    pub ops_plus: Option<i32>,
    pub roba: Option<f64>,
    pub rbat_plus: Option<i32>,
    pub tb: Option<i32>,
    pub gidp: Option<i32>,
    pub hbp: Option<i32>,
    pub sh: Option<i32>,
    pub sf: Option<i32>,
    pub ibb: Option<i32>,
    pub pos: Option<String>,
    pub awards: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_class(proba: f64) -> ClassificationPrediction {
        ClassificationPrediction {
            id: None,
            date_code: "250329".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 29).unwrap(),
            away: "ATH".into(),
            home: "SEA".into(),
            away_norm: "OAK".into(),
            home_norm: "SEA".into(),
            proba_sigmoid: proba,
            proba_isotonic: None,
            label: None,
        }
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let c = make_class(0.634);
        assert_eq!(c.home_pct(), 63);
        assert_eq!(c.away_pct(), 37);
    }

    #[test]
    fn half_percent_rounds_to_even() {
        assert_eq!(make_class(0.625).home_pct(), 62);
        assert_eq!(make_class(0.5).home_pct(), 50);
    }

    #[test]
    fn date_code_round_trips_through_dates() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(date_code(d), "250309");
        assert_eq!(parse_date_code("250309"), Some(d));
    }

    #[test]
    fn invalid_date_codes_are_rejected() {
        assert_eq!(parse_date_code("251340"), None);
        assert_eq!(parse_date_code("2503"), None);
        assert_eq!(parse_date_code("25a309"), None);
    }

    #[test]
    fn league_parses_case_insensitively() {
        assert_eq!("MLB".parse::<League>().unwrap(), League::Mlb);
        assert_eq!(" kbo ".parse::<League>().unwrap(), League::Kbo);
        assert!("nfl".parse::<League>().is_err());
    }

    #[test]
    fn pitching_changes_split_on_pipes() {
        let reg = RegressionPrediction {
            id: None,
            date_code: "250329".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 29).unwrap(),
            away: "SF".into(),
            home: "CIN".into(),
            away_norm: "SF".into(),
            home_norm: "CIN".into(),
            predicted_away: InningLine::default(),
            predicted_home: InningLine::default(),
            actual_away: None,
            actual_home: None,
            predicted_total_away: None,
            predicted_total_home: None,
            actual_total_away: None,
            actual_total_home: None,
            actual_starters: None,
            predicted_starters: None,
            pitching_changes: Some("6th: Doval in | | 8th: Rogers in |".into()),
            game_pk: None,
        };
        assert_eq!(
            reg.pitching_change_list(),
            vec!["6th: Doval in".to_string(), "8th: Rogers in".to_string()]
        );
    }
}
