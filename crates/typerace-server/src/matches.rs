use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use typerace_core::elo::{apply_delta, elo_delta, MatchOutcome};
use typerace_core::models::{Match, MatchStatus};
use typerace_core::protocol::{OpponentInfo, PlayerInfo, ServerEvent};
use typerace_core::score::{final_score, pick_winner, Side};

use crate::db::{self, MatchPatch, RankingPatch};
use crate::queue::QueueEntry;
use crate::registry::ConnId;
use crate::state::AppState;

/// Length of the typing test advertised in `game_start`.
pub const TEST_DURATION: Duration = Duration::from_secs(60);
/// Hard cap from `game_start` to forced termination.
pub const MATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-match lifecycle. Terminal phases never revert, with one exception:
/// a finalization whose storage writes keep failing parks the match back in
/// `Active` so the next inbound event retries the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Pending,
    Active,
    Completed,
    Cancelled,
}

/// Final stats one player reported with `pvp:complete`.
#[derive(Debug, Clone, Copy)]
pub struct FinalStats {
    pub wpm: f64,
    pub accuracy: f64,
}

/// Last live report per participant; cleared when the match leaves `Active`.
#[derive(Debug, Clone, Copy)]
pub struct LiveProgress {
    pub wpm: f64,
    pub accuracy: f64,
    pub reported_at: DateTime<Utc>,
}

/// One player's slot in a live match.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub user_id: String,
    pub username: String,
    pub accepted: bool,
    pub finals: Option<FinalStats>,
}

impl PlayerSlot {
    fn new(entry: &QueueEntry) -> Self {
        PlayerSlot {
            user_id: entry.user_id.clone(),
            username: entry.username.clone(),
            accepted: false,
            finals: None,
        }
    }
}

/// In-memory state for one match. Events for the same match serialize on the
/// map entry; the entry guard is never held across an await.
#[derive(Debug)]
pub struct LiveMatch {
    pub id: String,
    pub player1: PlayerSlot,
    pub player2: PlayerSlot,
    pub phase: MatchPhase,
    pub created_at: DateTime<Utc>,
    pub progress: HashMap<String, LiveProgress>,
    timeout: Option<JoinHandle<()>>,
}

impl LiveMatch {
    pub fn involves(&self, user_id: &str) -> bool {
        self.player1.user_id == user_id || self.player2.user_id == user_id
    }

    pub fn side_of(&self, user_id: &str) -> Option<Side> {
        if self.player1.user_id == user_id {
            Some(Side::Player1)
        } else if self.player2.user_id == user_id {
            Some(Side::Player2)
        } else {
            None
        }
    }

    pub fn slot_mut(&mut self, user_id: &str) -> Option<&mut PlayerSlot> {
        match self.side_of(user_id)? {
            Side::Player1 => Some(&mut self.player1),
            Side::Player2 => Some(&mut self.player2),
        }
    }

    pub fn opponent(&self, user_id: &str) -> Option<&PlayerSlot> {
        match self.side_of(user_id)? {
            Side::Player1 => Some(&self.player2),
            Side::Player2 => Some(&self.player1),
        }
    }

    pub fn take_timeout(&mut self) -> Option<JoinHandle<()>> {
        self.timeout.take()
    }
}

/// True when the user is party to a match that has not reached a terminal
/// phase. Used to keep queued players out of second matches.
pub fn user_in_live_match(state: &AppState, user_id: &str) -> bool {
    state.matches.iter().any(|entry| {
        entry.value().involves(user_id)
            && matches!(entry.value().phase, MatchPhase::Pending | MatchPhase::Active)
    })
}

// ── Pair-off ────────────────────────────────────────────────────────────

/// Drain the queue two entries at a time. A storage failure rolls the pair
/// back to the head of the queue and stops this round.
pub async fn pair_off(state: &Arc<AppState>) {
    let mut paired = false;
    while let Some((first, second)) = state.queue.take_pair() {
        match start_pairing(state, &first, &second).await {
            Ok(match_id) => {
                info!(
                    "match {} created: {} vs {}",
                    match_id, first.user_id, second.user_id
                );
                paired = true;
            }
            Err(err) => {
                error!(
                    "pair-off failed for {} vs {}: {}",
                    first.user_id, second.user_id, err
                );
                state.queue.restore_pair(first, second);
                break;
            }
        }
    }
    if paired {
        state.broadcast_queue_status();
    }
}

async fn start_pairing(
    state: &Arc<AppState>,
    first: &QueueEntry,
    second: &QueueEntry,
) -> Result<String, sqlx::Error> {
    // Both rankings must exist before the match row references them; the
    // create is idempotent so returning players keep their rating.
    let ranking1 = db::create_ranking(&state.db, &first.user_id, &first.username).await?;
    let ranking2 = db::create_ranking(&state.db, &second.user_id, &second.username).await?;

    let row = Match {
        match_id: Uuid::new_v4().to_string(),
        player1_id: first.user_id.clone(),
        player1_username: first.username.clone(),
        player2_id: second.user_id.clone(),
        player2_username: second.username.clone(),
        player1_wpm: 0.0,
        player1_accuracy: 0.0,
        player2_wpm: 0.0,
        player2_accuracy: 0.0,
        winner_id: None,
        winner_name: None,
        player1_elo_change: 0,
        player2_elo_change: 0,
        match_duration: 0,
        status: MatchStatus::Active,
        created_at: Utc::now(),
        completed_at: None,
    };
    db::create_match(&state.db, &row).await?;

    let match_id = row.match_id.clone();
    state.matches.insert(
        match_id.clone(),
        LiveMatch {
            id: match_id.clone(),
            player1: PlayerSlot::new(first),
            player2: PlayerSlot::new(second),
            phase: MatchPhase::Pending,
            created_at: row.created_at,
            progress: HashMap::new(),
            timeout: None,
        },
    );

    state.registry.emit_to_user(
        &first.user_id,
        &ServerEvent::MatchFound {
            match_id: match_id.clone(),
            opponent: OpponentInfo {
                id: second.user_id.clone(),
                username: second.username.clone(),
                elo: ranking2.elo,
            },
        },
    );
    state.registry.emit_to_user(
        &second.user_id,
        &ServerEvent::MatchFound {
            match_id: match_id.clone(),
            opponent: OpponentInfo {
                id: first.user_id.clone(),
                username: first.username.clone(),
                elo: ranking1.elo,
            },
        },
    );

    Ok(match_id)
}

// ── Start barrier ───────────────────────────────────────────────────────

/// A start request joins the match room; once both players have asked, the
/// game starts and the hard timeout is armed.
pub async fn handle_accept(
    state: &Arc<AppState>,
    conn_id: ConnId,
    user_id: &str,
    match_id: &str,
) {
    let started = {
        let mut entry = match state.matches.get_mut(match_id) {
            Some(entry) => entry,
            None => {
                state.registry.emit_to_user(
                    user_id,
                    &ServerEvent::Error {
                        message: "Match not found".into(),
                    },
                );
                return;
            }
        };
        let m = entry.value_mut();
        if !m.involves(user_id) {
            state.registry.emit_to_user(
                user_id,
                &ServerEvent::Error {
                    message: "Not a participant in this match".into(),
                },
            );
            return;
        }

        state.registry.join_room(&m.id, conn_id);
        if let Some(slot) = m.slot_mut(user_id) {
            slot.accepted = true;
        }

        if m.phase == MatchPhase::Pending && m.player1.accepted && m.player2.accepted {
            m.phase = MatchPhase::Active;
            // Emitting under the entry guard keeps game_start ahead of any
            // opponent_progress for this match.
            state.registry.emit_to_room(
                &m.id,
                &ServerEvent::GameStart {
                    match_id: m.id.clone(),
                    player1: PlayerInfo {
                        id: m.player1.user_id.clone(),
                        username: m.player1.username.clone(),
                    },
                    player2: PlayerInfo {
                        id: m.player2.user_id.clone(),
                        username: m.player2.username.clone(),
                    },
                    start_time: Utc::now().timestamp_millis(),
                    test_duration: TEST_DURATION.as_secs(),
                },
            );
            true
        } else {
            false
        }
    };

    if started {
        arm_timeout(state, match_id);
        info!("match {} started", match_id);
    }
}

fn arm_timeout(state: &Arc<AppState>, match_id: &str) {
    let task_state = Arc::clone(state);
    let task_match = match_id.to_string();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(MATCH_TIMEOUT).await;
        handle_timeout(&task_state, &task_match).await;
    });
    match state.matches.get_mut(match_id) {
        Some(mut entry) => entry.value_mut().timeout = Some(handle),
        // Finalized in the meantime; nothing left to time out.
        None => handle.abort(),
    }
}

// ── Live progress ───────────────────────────────────────────────────────

pub async fn handle_progress(
    state: &Arc<AppState>,
    user_id: &str,
    match_id: &str,
    wpm: f64,
    acc: f64,
) {
    let side = {
        let mut entry = match state.matches.get_mut(match_id) {
            Some(entry) => entry,
            None => {
                warn!("discarding progress for unknown match {}", match_id);
                return;
            }
        };
        let m = entry.value_mut();
        if m.phase != MatchPhase::Active || !m.involves(user_id) {
            warn!(
                "discarding progress from {} for match {} in phase {:?}",
                user_id, match_id, m.phase
            );
            return;
        }

        let now = Utc::now();
        m.progress.insert(
            user_id.to_string(),
            LiveProgress {
                wpm,
                accuracy: acc,
                reported_at: now,
            },
        );
        if let Some(opponent) = m.opponent(user_id) {
            state.registry.emit_to_user(
                &opponent.user_id,
                &ServerEvent::OpponentProgress {
                    match_id: m.id.clone(),
                    opponent_wpm: wpm,
                    opponent_accuracy: acc,
                    timestamp: now.timestamp_millis(),
                },
            );
        }
        m.side_of(user_id)
    };

    // Best-effort partial persistence, outside the entry guard.
    let patch = match side {
        Some(Side::Player1) => MatchPatch {
            player1_wpm: Some(wpm),
            player1_accuracy: Some(acc),
            ..Default::default()
        },
        Some(Side::Player2) => MatchPatch {
            player2_wpm: Some(wpm),
            player2_accuracy: Some(acc),
            ..Default::default()
        },
        None => return,
    };
    if let Err(err) = db::update_match(&state.db, match_id, &patch).await {
        warn!("failed to persist progress for match {}: {}", match_id, err);
    }
}

// ── Completion barrier ──────────────────────────────────────────────────

pub async fn handle_complete(
    state: &Arc<AppState>,
    user_id: &str,
    match_id: &str,
    wpm: f64,
    acc: f64,
) {
    let (side, both_done) = {
        let mut entry = match state.matches.get_mut(match_id) {
            Some(entry) => entry,
            None => {
                warn!("discarding completion for unknown match {}", match_id);
                return;
            }
        };
        let m = entry.value_mut();
        if m.phase != MatchPhase::Active || !m.involves(user_id) {
            warn!(
                "discarding completion from {} for match {} in phase {:?}",
                user_id, match_id, m.phase
            );
            return;
        }

        if let Some(slot) = m.slot_mut(user_id) {
            slot.finals = Some(FinalStats { wpm, accuracy: acc });
        }
        if let Some(opponent) = m.opponent(user_id) {
            state.registry.emit_to_user(
                &opponent.user_id,
                &ServerEvent::OpponentFinished {
                    match_id: m.id.clone(),
                    wpm,
                    acc,
                },
            );
        }
        (
            m.side_of(user_id),
            m.player1.finals.is_some() && m.player2.finals.is_some(),
        )
    };

    let patch = match side {
        Some(Side::Player1) => MatchPatch {
            player1_wpm: Some(wpm),
            player1_accuracy: Some(acc),
            ..Default::default()
        },
        Some(Side::Player2) => MatchPatch {
            player2_wpm: Some(wpm),
            player2_accuracy: Some(acc),
            ..Default::default()
        },
        None => return,
    };
    if let Err(err) = db::update_match(&state.db, match_id, &patch).await {
        warn!("failed to persist finals for match {}: {}", match_id, err);
    }

    if both_done {
        finalize(state, match_id).await;
    }
}

/// Barrier release: both finals are in, so compute the winner, apply Elo and
/// deliver the symmetric result.
async fn finalize(state: &Arc<AppState>, match_id: &str) {
    let ctx = {
        let mut entry = match state.matches.get_mut(match_id) {
            Some(entry) => entry,
            None => return,
        };
        let m = entry.value_mut();
        if m.phase != MatchPhase::Active {
            return;
        }
        let (finals1, finals2) = match (m.player1.finals, m.player2.finals) {
            (Some(a), Some(b)) => (a, b),
            _ => return,
        };
        m.phase = MatchPhase::Completed;
        ResultContext {
            match_id: m.id.clone(),
            player1_id: m.player1.user_id.clone(),
            player1_name: m.player1.username.clone(),
            player2_id: m.player2.user_id.clone(),
            player2_name: m.player2.username.clone(),
            stats1: finals1,
            stats2: finals2,
            winner: pick_winner(
                final_score(finals1.wpm, finals1.accuracy),
                final_score(finals2.wpm, finals2.accuracy),
            ),
            created_at: m.created_at,
        }
    };

    if let Err(err) = settle(state, &ctx).await {
        // Leave the match recoverable: the next inbound event re-releases
        // the barrier.
        if let Some(mut entry) = state.matches.get_mut(match_id) {
            entry.value_mut().phase = MatchPhase::Active;
        }
        error!("finalization failed for match {}: {}", match_id, err);
    }
}

// ── Forfeit ─────────────────────────────────────────────────────────────

pub async fn handle_forfeit(state: &Arc<AppState>, user_id: &str, match_id: &str) {
    let ctx = {
        let mut entry = match state.matches.get_mut(match_id) {
            Some(entry) => entry,
            None => {
                state.registry.emit_to_user(
                    user_id,
                    &ServerEvent::Error {
                        message: "Match not found".into(),
                    },
                );
                return;
            }
        };
        let m = entry.value_mut();
        if !m.involves(user_id) {
            state.registry.emit_to_user(
                user_id,
                &ServerEvent::Error {
                    message: "Not a participant in this match".into(),
                },
            );
            return;
        }
        if m.phase != MatchPhase::Active {
            state.registry.emit_to_user(
                user_id,
                &ServerEvent::Error {
                    message: "Match is not active".into(),
                },
            );
            return;
        }

        m.phase = MatchPhase::Completed;
        let forfeiter = m.side_of(user_id);
        if let Some(opponent) = m.opponent(user_id) {
            state.registry.emit_to_user(
                &opponent.user_id,
                &ServerEvent::OpponentForfeited {
                    match_id: m.id.clone(),
                },
            );
        }
        let stats1 = reported_stats(m, &m.player1.user_id);
        let stats2 = reported_stats(m, &m.player2.user_id);
        ResultContext {
            match_id: m.id.clone(),
            player1_id: m.player1.user_id.clone(),
            player1_name: m.player1.username.clone(),
            player2_id: m.player2.user_id.clone(),
            player2_name: m.player2.username.clone(),
            stats1,
            stats2,
            winner: match forfeiter {
                Some(Side::Player1) => Some(Side::Player2),
                Some(Side::Player2) => Some(Side::Player1),
                None => None,
            },
            created_at: m.created_at,
        }
    };

    info!("match {}: {} forfeited", match_id, user_id);
    if let Err(err) = settle(state, &ctx).await {
        if let Some(mut entry) = state.matches.get_mut(match_id) {
            entry.value_mut().phase = MatchPhase::Active;
        }
        error!("forfeit settlement failed for match {}: {}", match_id, err);
    }
}

/// Best stats known for a player: finals if reported, else last live
/// progress, else zeros.
fn reported_stats(m: &LiveMatch, user_id: &str) -> FinalStats {
    if let Some(side) = m.side_of(user_id) {
        let slot = match side {
            Side::Player1 => &m.player1,
            Side::Player2 => &m.player2,
        };
        if let Some(finals) = slot.finals {
            return finals;
        }
    }
    m.progress
        .get(user_id)
        .map(|p| FinalStats {
            wpm: p.wpm,
            accuracy: p.accuracy,
        })
        .unwrap_or(FinalStats {
            wpm: 0.0,
            accuracy: 0.0,
        })
}

// ── Timeout ─────────────────────────────────────────────────────────────

/// Hard-cap expiry: the match completes degenerately with no winner and no
/// rating change. Firing for an already-terminal match is a no-op.
pub async fn handle_timeout(state: &Arc<AppState>, match_id: &str) {
    let created_at = {
        let mut entry = match state.matches.get_mut(match_id) {
            Some(entry) => entry,
            None => return,
        };
        let m = entry.value_mut();
        if m.phase != MatchPhase::Active {
            return;
        }
        m.phase = MatchPhase::Completed;
        let event = ServerEvent::MatchTimeout {
            match_id: m.id.clone(),
            message: "Match timed out".into(),
        };
        state.registry.emit_to_user(&m.player1.user_id, &event);
        state.registry.emit_to_user(&m.player2.user_id, &event);
        m.progress.clear();
        m.created_at
    };

    let completed_at = Utc::now();
    let patch = MatchPatch {
        status: Some(MatchStatus::Completed),
        completed_at: Some(completed_at),
        match_duration: Some(duration_secs(created_at, completed_at)),
        ..Default::default()
    };
    if let Err(err) = db::update_match(&state.db, match_id, &patch).await {
        warn!(
            "timeout write failed for match {}, retrying once: {}",
            match_id, err
        );
        if let Err(err) = db::update_match(&state.db, match_id, &patch).await {
            error!("timeout write failed for match {}: {}", match_id, err);
        }
    }

    warn!("match {} timed out", match_id);
    state.registry.drop_room(match_id);
    state.matches.remove(match_id);
}

// ── Reconnect & disconnect ──────────────────────────────────────────────

pub async fn handle_reconnect(
    state: &Arc<AppState>,
    conn_id: ConnId,
    user_id: &str,
    match_id: &str,
) {
    let entry = match state.matches.get(match_id) {
        Some(entry) => entry,
        None => {
            state.registry.emit_to_user(
                user_id,
                &ServerEvent::Error {
                    message: "Match not found".into(),
                },
            );
            return;
        }
    };
    let m = entry.value();
    if !m.involves(user_id) {
        state.registry.emit_to_user(
            user_id,
            &ServerEvent::Error {
                message: "Not a participant in this match".into(),
            },
        );
        return;
    }

    state.registry.join_room(&m.id, conn_id);
    if let Some(opponent) = m.opponent(user_id) {
        state.registry.emit_to_user(
            &opponent.user_id,
            &ServerEvent::OpponentReconnected {
                match_id: m.id.clone(),
            },
        );
    }
}

/// Called when a user's last connection closes. If the opponent is offline
/// too and nobody has finished, the match is cancelled with no rating change;
/// otherwise the match rides out its timeout.
pub async fn handle_disconnect(state: &Arc<AppState>, user_id: &str) {
    if state.registry.is_online(user_id) {
        return;
    }

    let candidates: Vec<String> = state
        .matches
        .iter()
        .filter(|entry| {
            entry.value().involves(user_id)
                && matches!(entry.value().phase, MatchPhase::Pending | MatchPhase::Active)
        })
        .map(|entry| entry.key().clone())
        .collect();

    for match_id in candidates {
        let cancelled = {
            let mut entry = match state.matches.get_mut(&match_id) {
                Some(entry) => entry,
                None => continue,
            };
            let m = entry.value_mut();
            if !matches!(m.phase, MatchPhase::Pending | MatchPhase::Active) {
                continue;
            }
            let opponent_id = match m.opponent(user_id) {
                Some(opponent) => opponent.user_id.clone(),
                None => continue,
            };
            let nobody_done = m.player1.finals.is_none() && m.player2.finals.is_none();
            if !state.registry.is_online(&opponent_id) && nobody_done {
                m.phase = MatchPhase::Cancelled;
                if let Some(timer) = m.timeout.take() {
                    timer.abort();
                }
                m.progress.clear();
                true
            } else {
                false
            }
        };

        if cancelled {
            info!("match {} cancelled: both players disconnected", match_id);
            let patch = MatchPatch {
                status: Some(MatchStatus::Cancelled),
                ..Default::default()
            };
            if let Err(err) = db::update_match(&state.db, &match_id, &patch).await {
                error!("failed to persist cancellation of match {}: {}", match_id, err);
            }
            state.registry.drop_room(&match_id);
            state.matches.remove(&match_id);
        }
    }
}

// ── Settlement ──────────────────────────────────────────────────────────

struct ResultContext {
    match_id: String,
    player1_id: String,
    player1_name: String,
    player2_id: String,
    player2_name: String,
    stats1: FinalStats,
    stats2: FinalStats,
    winner: Option<Side>,
    created_at: DateTime<Utc>,
}

fn duration_secs(created_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i64 {
    ((completed_at - created_at).num_milliseconds() / 1000).max(0)
}

/// Persist the terminal result and ratings, then deliver `match_result` to
/// both players and drop the live state. Pre-match ratings are read once;
/// the write sequence is retried once with the same absolute values, so a
/// partially applied first attempt converges.
async fn settle(state: &Arc<AppState>, ctx: &ResultContext) -> Result<(), sqlx::Error> {
    let ranking1 = db::create_ranking(&state.db, &ctx.player1_id, &ctx.player1_name).await?;
    let ranking2 = db::create_ranking(&state.db, &ctx.player2_id, &ctx.player2_name).await?;

    let (outcome1, outcome2) = match ctx.winner {
        Some(Side::Player1) => (MatchOutcome::Win, MatchOutcome::Loss),
        Some(Side::Player2) => (MatchOutcome::Loss, MatchOutcome::Win),
        None => (MatchOutcome::Draw, MatchOutcome::Draw),
    };
    let delta1 = elo_delta(ranking1.elo, ranking2.elo, outcome1);
    let delta2 = elo_delta(ranking2.elo, ranking1.elo, outcome2);

    let completed_at = Utc::now();
    let match_duration = duration_secs(ctx.created_at, completed_at);
    let (winner_id, winner_name) = match ctx.winner {
        Some(Side::Player1) => (
            Some(ctx.player1_id.clone()),
            Some(ctx.player1_name.clone()),
        ),
        Some(Side::Player2) => (
            Some(ctx.player2_id.clone()),
            Some(ctx.player2_name.clone()),
        ),
        None => (None, None),
    };

    let match_patch = MatchPatch {
        player1_wpm: Some(ctx.stats1.wpm),
        player1_accuracy: Some(ctx.stats1.accuracy),
        player2_wpm: Some(ctx.stats2.wpm),
        player2_accuracy: Some(ctx.stats2.accuracy),
        winner_id: winner_id.clone(),
        winner_name: winner_name.clone(),
        player1_elo_change: Some(delta1),
        player2_elo_change: Some(delta2),
        match_duration: Some(match_duration),
        status: Some(MatchStatus::Completed),
        completed_at: Some(completed_at),
    };
    let patch1 = ranking_patch(&ranking1, delta1, outcome1, completed_at);
    let patch2 = ranking_patch(&ranking2, delta2, outcome2, completed_at);

    if let Err(err) = write_result(state, ctx, &match_patch, &patch1, &patch2).await {
        warn!(
            "settlement write failed for match {}, retrying once: {}",
            ctx.match_id, err
        );
        write_result(state, ctx, &match_patch, &patch1, &patch2).await?;
    }

    let result = ServerEvent::MatchResult {
        match_id: ctx.match_id.clone(),
        winner_id,
        winner_name,
        player1_id: ctx.player1_id.clone(),
        player1_name: ctx.player1_name.clone(),
        player1_wpm: ctx.stats1.wpm,
        player1_accuracy: ctx.stats1.accuracy,
        player1_elo_change: delta1,
        player2_id: ctx.player2_id.clone(),
        player2_name: ctx.player2_name.clone(),
        player2_wpm: ctx.stats2.wpm,
        player2_accuracy: ctx.stats2.accuracy,
        player2_elo_change: delta2,
        match_duration,
    };
    state.registry.emit_to_user(&ctx.player1_id, &result);
    state.registry.emit_to_user(&ctx.player2_id, &result);

    // Result is on the wire; now the live state can go.
    if let Some(mut entry) = state.matches.get_mut(&ctx.match_id) {
        let m = entry.value_mut();
        m.progress.clear();
        if let Some(timer) = m.timeout.take() {
            timer.abort();
        }
    }
    state.registry.drop_room(&ctx.match_id);
    state.matches.remove(&ctx.match_id);

    info!(
        "match {} completed: winner {}, elo {:+}/{:+}",
        ctx.match_id,
        result_winner_label(ctx),
        delta1,
        delta2
    );
    Ok(())
}

fn result_winner_label(ctx: &ResultContext) -> &str {
    match ctx.winner {
        Some(Side::Player1) => ctx.player1_name.as_str(),
        Some(Side::Player2) => ctx.player2_name.as_str(),
        None => "draw",
    }
}

fn ranking_patch(
    ranking: &typerace_core::Ranking,
    delta: i32,
    outcome: MatchOutcome,
    completed_at: DateTime<Utc>,
) -> RankingPatch {
    RankingPatch {
        elo: Some(apply_delta(ranking.elo, delta)),
        wins: Some(ranking.wins + i64::from(outcome == MatchOutcome::Win)),
        losses: Some(ranking.losses + i64::from(outcome == MatchOutcome::Loss)),
        matches: Some(ranking.matches + 1),
        last_match_at: Some(completed_at),
        ..Default::default()
    }
}

async fn write_result(
    state: &Arc<AppState>,
    ctx: &ResultContext,
    match_patch: &MatchPatch,
    patch1: &RankingPatch,
    patch2: &RankingPatch,
) -> Result<(), sqlx::Error> {
    db::update_match(&state.db, &ctx.match_id, match_patch).await?;
    db::update_ranking(&state.db, &ctx.player1_id, patch1).await?;
    db::update_ranking(&state.db, &ctx.player2_id, patch2).await?;
    Ok(())
}
