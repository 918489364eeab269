use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A player's position on the persistent ladder. Created lazily on first
/// match, mutated only at match finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub user_id: String,
    pub username: String,
    pub elo: i32,
    pub wins: i64,
    pub losses: i64,
    pub matches: i64,
    pub last_match_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a persisted match row. Never reverts once terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Active,
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Active => "active",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<MatchStatus> {
        match s {
            "active" => Some(MatchStatus::Active),
            "completed" => Some(MatchStatus::Completed),
            "cancelled" => Some(MatchStatus::Cancelled),
            _ => None,
        }
    }
}

/// A persisted match. `wpm`/`accuracy` of 0 mean not yet reported;
/// `winner_id` of `None` means draw or cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub match_id: String,
    pub player1_id: String,
    pub player1_username: String,
    pub player2_id: String,
    pub player2_username: String,
    pub player1_wpm: f64,
    pub player1_accuracy: f64,
    pub player2_wpm: f64,
    pub player2_accuracy: f64,
    pub winner_id: Option<String>,
    pub winner_name: Option<String>,
    pub player1_elo_change: i32,
    pub player2_elo_change: i32,
    /// Seconds from creation to completion.
    pub match_duration: i64,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
