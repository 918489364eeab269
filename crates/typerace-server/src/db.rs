use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use typerace_core::models::{Match, MatchStatus, Ranking};
use typerace_core::DEFAULT_RATING;

/// Create tables and the indexes the read paths rely on.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rankings (
            user_id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            elo INTEGER NOT NULL DEFAULT 1000,
            wins INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            matches INTEGER NOT NULL DEFAULT 0,
            last_match_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS matches (
            match_id TEXT PRIMARY KEY,
            player1_id TEXT NOT NULL,
            player1_username TEXT NOT NULL,
            player2_id TEXT NOT NULL,
            player2_username TEXT NOT NULL,
            player1_wpm REAL NOT NULL DEFAULT 0,
            player1_accuracy REAL NOT NULL DEFAULT 0,
            player2_wpm REAL NOT NULL DEFAULT 0,
            player2_accuracy REAL NOT NULL DEFAULT 0,
            winner_id TEXT,
            winner_name TEXT,
            player1_elo_change INTEGER NOT NULL DEFAULT 0,
            player2_elo_change INTEGER NOT NULL DEFAULT 0,
            match_duration INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            completed_at INTEGER
        )",
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_rankings_elo ON rankings (elo DESC)",
        "CREATE INDEX IF NOT EXISTS idx_matches_player1 ON matches (player1_id)",
        "CREATE INDEX IF NOT EXISTS idx_matches_player2 ON matches (player2_id)",
        "CREATE INDEX IF NOT EXISTS idx_matches_status ON matches (status)",
        "CREATE INDEX IF NOT EXISTS idx_matches_created ON matches (created_at DESC)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

// ── Rankings ────────────────────────────────────────────────────────────

/// Partial update for a ranking row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RankingPatch {
    pub username: Option<String>,
    pub elo: Option<i32>,
    pub wins: Option<i64>,
    pub losses: Option<i64>,
    pub matches: Option<i64>,
    pub last_match_at: Option<DateTime<Utc>>,
}

pub async fn get_ranking(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Option<Ranking>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM rankings WHERE user_id = ?1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| ranking_from_row(&r)))
}

/// Insert a fresh ranking at the default rating. On a `user_id` collision the
/// existing row is returned instead, so two concurrent first-match creations
/// converge on one record.
pub async fn create_ranking(
    pool: &SqlitePool,
    user_id: &str,
    username: &str,
) -> Result<Ranking, sqlx::Error> {
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO rankings (user_id, username, elo, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(username)
    .bind(DEFAULT_RATING)
    .bind(now)
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM rankings WHERE user_id = ?1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(ranking_from_row(&row))
}

/// Apply a partial update, bump `updated_at`, and return the post-image.
/// Returns `None` if the user vanished.
pub async fn update_ranking(
    pool: &SqlitePool,
    user_id: &str,
    patch: &RankingPatch,
) -> Result<Option<Ranking>, sqlx::Error> {
    sqlx::query(
        "UPDATE rankings SET
            username = COALESCE(?1, username),
            elo = COALESCE(?2, elo),
            wins = COALESCE(?3, wins),
            losses = COALESCE(?4, losses),
            matches = COALESCE(?5, matches),
            last_match_at = COALESCE(?6, last_match_at),
            updated_at = ?7
         WHERE user_id = ?8",
    )
    .bind(&patch.username)
    .bind(patch.elo)
    .bind(patch.wins)
    .bind(patch.losses)
    .bind(patch.matches)
    .bind(patch.last_match_at.map(|t| t.timestamp_millis()))
    .bind(Utc::now().timestamp_millis())
    .bind(user_id)
    .execute(pool)
    .await?;

    get_ranking(pool, user_id).await
}

/// Ranked slice ordered by elo descending, ties broken by `updated_at`
/// ascending (the older account ranks higher), plus the total row count.
pub async fn get_leaderboard(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Ranking>, i64), sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM rankings ORDER BY elo DESC, updated_at ASC LIMIT ?1 OFFSET ?2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query("SELECT COUNT(*) AS n FROM rankings")
        .fetch_one(pool)
        .await?
        .get("n");

    Ok((rows.iter().map(ranking_from_row).collect(), total))
}

// ── Matches ─────────────────────────────────────────────────────────────

/// Partial update for a match row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MatchPatch {
    pub player1_wpm: Option<f64>,
    pub player1_accuracy: Option<f64>,
    pub player2_wpm: Option<f64>,
    pub player2_accuracy: Option<f64>,
    pub winner_id: Option<String>,
    pub winner_name: Option<String>,
    pub player1_elo_change: Option<i32>,
    pub player2_elo_change: Option<i32>,
    pub match_duration: Option<i64>,
    pub status: Option<MatchStatus>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub async fn create_match(pool: &SqlitePool, m: &Match) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO matches (
            match_id, player1_id, player1_username, player2_id, player2_username,
            player1_wpm, player1_accuracy, player2_wpm, player2_accuracy,
            winner_id, winner_name, player1_elo_change, player2_elo_change,
            match_duration, status, created_at, completed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )
    .bind(&m.match_id)
    .bind(&m.player1_id)
    .bind(&m.player1_username)
    .bind(&m.player2_id)
    .bind(&m.player2_username)
    .bind(m.player1_wpm)
    .bind(m.player1_accuracy)
    .bind(m.player2_wpm)
    .bind(m.player2_accuracy)
    .bind(&m.winner_id)
    .bind(&m.winner_name)
    .bind(m.player1_elo_change)
    .bind(m.player2_elo_change)
    .bind(m.match_duration)
    .bind(m.status.as_str())
    .bind(m.created_at.timestamp_millis())
    .bind(m.completed_at.map(|t| t.timestamp_millis()))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_match(
    pool: &SqlitePool,
    match_id: &str,
) -> Result<Option<Match>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM matches WHERE match_id = ?1")
        .bind(match_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| match_from_row(&r)))
}

pub async fn update_match(
    pool: &SqlitePool,
    match_id: &str,
    patch: &MatchPatch,
) -> Result<Option<Match>, sqlx::Error> {
    sqlx::query(
        "UPDATE matches SET
            player1_wpm = COALESCE(?1, player1_wpm),
            player1_accuracy = COALESCE(?2, player1_accuracy),
            player2_wpm = COALESCE(?3, player2_wpm),
            player2_accuracy = COALESCE(?4, player2_accuracy),
            winner_id = COALESCE(?5, winner_id),
            winner_name = COALESCE(?6, winner_name),
            player1_elo_change = COALESCE(?7, player1_elo_change),
            player2_elo_change = COALESCE(?8, player2_elo_change),
            match_duration = COALESCE(?9, match_duration),
            status = COALESCE(?10, status),
            completed_at = COALESCE(?11, completed_at)
         WHERE match_id = ?12",
    )
    .bind(patch.player1_wpm)
    .bind(patch.player1_accuracy)
    .bind(patch.player2_wpm)
    .bind(patch.player2_accuracy)
    .bind(&patch.winner_id)
    .bind(&patch.winner_name)
    .bind(patch.player1_elo_change)
    .bind(patch.player2_elo_change)
    .bind(patch.match_duration)
    .bind(patch.status.map(|s| s.as_str()))
    .bind(patch.completed_at.map(|t| t.timestamp_millis()))
    .bind(match_id)
    .execute(pool)
    .await?;

    get_match(pool, match_id).await
}

/// Completed matches the user took part in, newest first, plus the total.
pub async fn get_match_history(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Match>, i64), sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM matches
         WHERE (player1_id = ?1 OR player2_id = ?1) AND status = 'completed'
         ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM matches
         WHERE (player1_id = ?1 OR player2_id = ?1) AND status = 'completed'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?
    .get("n");

    Ok((rows.iter().map(match_from_row).collect(), total))
}

// ── Row mapping ─────────────────────────────────────────────────────────

fn datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

fn ranking_from_row(row: &SqliteRow) -> Ranking {
    Ranking {
        user_id: row.get("user_id"),
        username: row.get("username"),
        elo: row.get("elo"),
        wins: row.get("wins"),
        losses: row.get("losses"),
        matches: row.get("matches"),
        last_match_at: row.get::<Option<i64>, _>("last_match_at").map(datetime),
        created_at: datetime(row.get("created_at")),
        updated_at: datetime(row.get("updated_at")),
    }
}

fn match_from_row(row: &SqliteRow) -> Match {
    Match {
        match_id: row.get("match_id"),
        player1_id: row.get("player1_id"),
        player1_username: row.get("player1_username"),
        player2_id: row.get("player2_id"),
        player2_username: row.get("player2_username"),
        player1_wpm: row.get("player1_wpm"),
        player1_accuracy: row.get("player1_accuracy"),
        player2_wpm: row.get("player2_wpm"),
        player2_accuracy: row.get("player2_accuracy"),
        winner_id: row.get("winner_id"),
        winner_name: row.get("winner_name"),
        player1_elo_change: row.get("player1_elo_change"),
        player2_elo_change: row.get("player2_elo_change"),
        match_duration: row.get("match_duration"),
        status: MatchStatus::parse(row.get::<String, _>("status").as_str())
            .unwrap_or(MatchStatus::Cancelled),
        created_at: datetime(row.get("created_at")),
        completed_at: row.get::<Option<i64>, _>("completed_at").map(datetime),
    }
}
