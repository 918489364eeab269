use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use typerace_server::state::AppState;

/// How long a test will wait for a single expected event.
const RECV_DEADLINE: Duration = Duration::from_secs(10);

/// A server instance on an ephemeral port over in-memory storage. Tests talk
/// to it like a client would (HTTP + WebSocket) and can inspect the shared
/// `state` directly for queue/match internals.
struct TestServer {
    base: String,
    state: Arc<AppState>,
    http: reqwest::Client,
}

impl TestServer {
    async fn spawn() -> Self {
        let (app, state) = typerace_server::build_app("sqlite::memory:").await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        // The port is live as soon as bind returns; early connections sit in
        // the accept backlog until the serve task picks them up.
        let base = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TestServer {
            base,
            state,
            http: reqwest::Client::new(),
        }
    }

    /// Open an authenticated WebSocket session for one player.
    async fn player(&self, user_id: &str, username: &str) -> Player {
        let url = format!(
            "{}/ws?userId={}&username={}",
            self.base.replace("http://", "ws://"),
            user_id,
            username
        );
        let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        Player { socket }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        self.get(path).await.json().await.unwrap()
    }

    /// Fire a queue mutation over REST, optionally as an authenticated user.
    async fn queue_request(
        &self,
        method: reqwest::Method,
        path: &str,
        identity: Option<(&str, &str)>,
    ) -> reqwest::Response {
        let mut request = self.http.request(method, format!("{}{}", self.base, path));
        if let Some((user_id, username)) = identity {
            request = request
                .header("x-user-id", user_id)
                .header("x-username", username);
        }
        request.send().await.unwrap()
    }
}

/// One player's live WebSocket session, with the wire protocol folded into
/// player-level calls.
struct Player {
    socket: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl Player {
    async fn send(&mut self, event: Value) {
        self.socket
            .send(Message::Text(event.to_string().into()))
            .await
            .unwrap();
    }

    async fn join_queue(&mut self) {
        self.send(json!({"type": "pvp:join_queue"})).await;
    }

    async fn leave_queue(&mut self) {
        self.send(json!({"type": "pvp:leave_queue"})).await;
    }

    async fn accept(&mut self, match_id: &str) {
        self.send(json!({"type": "pvp:accept_match", "matchId": match_id}))
            .await;
    }

    async fn progress(&mut self, match_id: &str, wpm: f64, acc: f64) {
        self.send(json!({"type": "pvp:progress", "matchId": match_id, "wpm": wpm, "acc": acc}))
            .await;
    }

    async fn complete(&mut self, match_id: &str, wpm: f64, acc: f64) {
        self.send(json!({"type": "pvp:complete", "matchId": match_id, "wpm": wpm, "acc": acc}))
            .await;
    }

    async fn forfeit(&mut self, match_id: &str) {
        self.send(json!({"type": "pvp:forfeit", "matchId": match_id}))
            .await;
    }

    /// Read frames until an event of the wanted type arrives, failing the
    /// test once the deadline passes. Interleaved events of other types
    /// (queue status broadcasts and the like) are skipped.
    async fn recv(&mut self, event_type: &str) -> Value {
        let scan = async {
            loop {
                match self.socket.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let event: Value = serde_json::from_str(&text).unwrap();
                        if event["type"] == event_type {
                            return event;
                        }
                    }
                    Some(Ok(_)) => continue,
                    closed => panic!("socket closed while waiting for {}: {:?}", event_type, closed),
                }
            }
        };
        match tokio::time::timeout(RECV_DEADLINE, scan).await {
            Ok(event) => event,
            Err(_) => panic!("no {} within {:?}", event_type, RECV_DEADLINE),
        }
    }
}

/// Queue both players and run the accept barrier; returns the match id.
async fn pair_and_start(a: &mut Player, b: &mut Player) -> String {
    a.join_queue().await;
    a.recv("pvp:queue_joined").await;
    b.join_queue().await;

    let found = a.recv("pvp:match_found").await;
    let match_id = found["matchId"].as_str().unwrap().to_string();
    b.recv("pvp:match_found").await;

    a.accept(&match_id).await;
    b.accept(&match_id).await;
    a.recv("pvp:game_start").await;
    b.recv("pvp:game_start").await;

    match_id
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let server = TestServer::spawn().await;
    let body = server.get("/health").await.text().await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_ws_requires_identity() {
    let server = TestServer::spawn().await;
    let ws_url = server.base.replace("http://", "ws://");
    let result = tokio_tungstenite::connect_async(format!("{}/ws", ws_url)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_queue_rest_flow() {
    let server = TestServer::spawn().await;
    let alice = Some(("user-a", "alice"));

    // Unauthenticated join is refused.
    let resp = server
        .queue_request(reqwest::Method::POST, "/pvp/queue/join", None)
        .await;
    assert_eq!(resp.status(), 409);

    let resp = server
        .queue_request(reqwest::Method::POST, "/pvp/queue/join", alice)
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["queueId"].as_str().unwrap(), "user-a");
    assert_eq!(body["data"]["queueSize"].as_u64().unwrap(), 1);

    // Second join while queued is a conflict.
    let resp = server
        .queue_request(reqwest::Method::POST, "/pvp/queue/join", alice)
        .await;
    assert_eq!(resp.status(), 409);

    let resp = server
        .queue_request(reqwest::Method::DELETE, "/pvp/queue/leave", alice)
        .await;
    assert_eq!(resp.status(), 200);

    // Leaving when absent is not found.
    let resp = server
        .queue_request(reqwest::Method::DELETE, "/pvp/queue/leave", alice)
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_ranking_missing_is_404() {
    let server = TestServer::spawn().await;
    let resp = server.get("/pvp/ranking/nobody").await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_full_match_happy_path() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;
    let mut b = server.player("user-b", "bob").await;

    a.join_queue().await;
    let joined = a.recv("pvp:queue_joined").await;
    assert_eq!(joined["queueSize"].as_u64().unwrap(), 1);
    b.join_queue().await;

    // Pair-off announces the opponent with their current rating.
    let found_a = a.recv("pvp:match_found").await;
    assert_eq!(found_a["opponent"]["username"].as_str().unwrap(), "bob");
    assert_eq!(found_a["opponent"]["elo"].as_i64().unwrap(), 1000);
    let found_b = b.recv("pvp:match_found").await;
    assert_eq!(found_b["opponent"]["username"].as_str().unwrap(), "alice");
    let match_id = found_a["matchId"].as_str().unwrap().to_string();

    a.accept(&match_id).await;
    b.accept(&match_id).await;
    let start_a = a.recv("pvp:game_start").await;
    assert_eq!(start_a["player1"]["id"].as_str().unwrap(), "user-a");
    assert_eq!(start_a["player2"]["id"].as_str().unwrap(), "user-b");
    assert_eq!(start_a["testDuration"].as_u64().unwrap(), 60);
    b.recv("pvp:game_start").await;

    // Live progress fans out to the opponent only.
    a.progress(&match_id, 80.0, 95.0).await;
    let progress_b = b.recv("pvp:opponent_progress").await;
    assert_eq!(progress_b["opponentWpm"].as_f64().unwrap(), 80.0);
    assert_eq!(progress_b["opponentAccuracy"].as_f64().unwrap(), 95.0);

    b.progress(&match_id, 70.0, 97.0).await;
    let progress_a = a.recv("pvp:opponent_progress").await;
    assert_eq!(progress_a["opponentWpm"].as_f64().unwrap(), 70.0);

    // Completion barrier: first final alone does not end the match.
    a.complete(&match_id, 80.0, 95.0).await;
    let finished_b = b.recv("pvp:opponent_finished").await;
    assert_eq!(finished_b["wpm"].as_f64().unwrap(), 80.0);

    b.complete(&match_id, 70.0, 97.0).await;

    let result_a = a.recv("pvp:match_result").await;
    let result_b = b.recv("pvp:match_result").await;
    for result in [&result_a, &result_b] {
        assert_eq!(result["winnerId"].as_str().unwrap(), "user-a");
        assert_eq!(result["winnerName"].as_str().unwrap(), "alice");
        assert_eq!(result["player1EloChange"].as_i64().unwrap(), 16);
        assert_eq!(result["player2EloChange"].as_i64().unwrap(), -16);
        assert_eq!(result["player1Wpm"].as_f64().unwrap(), 80.0);
        assert_eq!(result["player2Wpm"].as_f64().unwrap(), 70.0);
        assert!(result["matchDuration"].as_i64().unwrap() >= 0);
    }

    assert!(server.state.matches.is_empty());

    // Ladder reflects the result.
    let body = server.get_json("/pvp/ranking/user-a").await;
    assert_eq!(body["data"]["elo"].as_i64().unwrap(), 1016);
    assert_eq!(body["data"]["wins"].as_i64().unwrap(), 1);
    assert_eq!(body["data"]["matches"].as_i64().unwrap(), 1);

    let body = server.get_json("/pvp/leaderboard").await;
    let leaderboard = body["data"]["leaderboard"].as_array().unwrap();
    assert_eq!(body["data"]["total"].as_i64().unwrap(), 2);
    assert_eq!(leaderboard[0]["userId"].as_str().unwrap(), "user-a");
    assert_eq!(leaderboard[1]["userId"].as_str().unwrap(), "user-b");

    let body = server.get_json("/pvp/history/user-b").await;
    assert_eq!(body["data"]["total"].as_i64().unwrap(), 1);
    let matches = body["data"]["matches"].as_array().unwrap();
    assert_eq!(matches[0]["matchId"].as_str().unwrap(), match_id);
    assert_eq!(matches[0]["status"].as_str().unwrap(), "completed");
}

#[tokio::test]
async fn test_equal_scores_draw() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;
    let mut b = server.player("user-b", "bob").await;
    let match_id = pair_and_start(&mut a, &mut b).await;

    a.complete(&match_id, 50.0, 90.0).await;
    b.complete(&match_id, 50.0, 90.0).await;

    let result = a.recv("pvp:match_result").await;
    assert!(result["winnerId"].is_null());
    assert_eq!(result["player1EloChange"].as_i64().unwrap(), 0);
    assert_eq!(result["player2EloChange"].as_i64().unwrap(), 0);
    b.recv("pvp:match_result").await;

    let body = server.get_json("/pvp/ranking/user-a").await;
    assert_eq!(body["data"]["elo"].as_i64().unwrap(), 1000);
    assert_eq!(body["data"]["wins"].as_i64().unwrap(), 0);
    assert_eq!(body["data"]["losses"].as_i64().unwrap(), 0);
    assert_eq!(body["data"]["matches"].as_i64().unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_join_pairs_once() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;
    let mut b = server.player("user-b", "bob").await;

    a.join_queue().await;
    a.recv("pvp:queue_joined").await;

    // Second join is rejected and leaves the queue untouched.
    a.join_queue().await;
    let err = a.recv("error").await;
    assert_eq!(err["message"].as_str().unwrap(), "Already in queue");
    assert_eq!(server.state.queue.len(), 1);

    b.join_queue().await;
    a.recv("pvp:match_found").await;
    b.recv("pvp:match_found").await;

    // One match, not two, and the queue drained.
    assert_eq!(server.state.matches.len(), 1);
    assert_eq!(server.state.queue.len(), 0);
}

#[tokio::test]
async fn test_leave_queue_over_ws() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;

    a.leave_queue().await;
    let err = a.recv("error").await;
    assert_eq!(err["message"].as_str().unwrap(), "Not in queue");

    a.join_queue().await;
    a.recv("pvp:queue_joined").await;
    a.leave_queue().await;
    a.recv("pvp:queue_left").await;
    assert!(server.state.queue.is_empty());
}

#[tokio::test]
async fn test_forfeit_awards_opponent() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;
    let mut b = server.player("user-b", "bob").await;
    let match_id = pair_and_start(&mut a, &mut b).await;

    a.forfeit(&match_id).await;

    b.recv("pvp:opponent_forfeited").await;
    let result_a = a.recv("pvp:match_result").await;
    let result_b = b.recv("pvp:match_result").await;
    assert_eq!(result_a["winnerId"].as_str().unwrap(), "user-b");
    assert_eq!(result_b["winnerId"].as_str().unwrap(), "user-b");
    assert_eq!(result_b["player2EloChange"].as_i64().unwrap(), 16);

    let body = server.get_json("/pvp/ranking/user-a").await;
    assert_eq!(body["data"]["elo"].as_i64().unwrap(), 984);
    assert_eq!(body["data"]["losses"].as_i64().unwrap(), 1);
}

#[tokio::test]
async fn test_legacy_event_names_accepted() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;
    let mut b = server.player("user-b", "bob").await;

    a.join_queue().await;
    a.recv("pvp:queue_joined").await;
    b.join_queue().await;
    let found = a.recv("pvp:match_found").await;
    let match_id = found["matchId"].as_str().unwrap().to_string();
    b.recv("pvp:match_found").await;

    // The uppercase vocabulary still drives the same machine.
    a.send(json!({"type": "ACCEPT_MATCH", "matchId": match_id}))
        .await;
    b.send(json!({"type": "ACCEPT_MATCH", "matchId": match_id}))
        .await;
    a.recv("pvp:game_start").await;
    b.recv("pvp:game_start").await;

    a.send(json!({"type": "MATCH_PROGRESS", "matchId": match_id, "wpm": 42.0, "acc": 90.0}))
        .await;
    let progress = b.recv("pvp:opponent_progress").await;
    assert_eq!(progress["opponentWpm"].as_f64().unwrap(), 42.0);
}

#[tokio::test]
async fn test_accept_unknown_match_errors() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;

    a.accept("no-such-match").await;
    let err = a.recv("error").await;
    assert_eq!(err["message"].as_str().unwrap(), "Match not found");
}

#[tokio::test]
async fn test_malformed_message_keeps_connection() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;

    a.send(json!({"type": "no_such_event"})).await;
    let err = a.recv("error").await;
    assert!(err["message"].as_str().unwrap().starts_with("Invalid message"));

    // Connection survives and keeps working.
    a.join_queue().await;
    a.recv("pvp:queue_joined").await;
}

#[tokio::test]
async fn test_match_timeout_applies_no_elo() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;
    let mut b = server.player("user-b", "bob").await;
    let match_id = pair_and_start(&mut a, &mut b).await;

    // Fire the hard cap directly instead of waiting two minutes.
    typerace_server::matches::handle_timeout(&server.state, &match_id).await;

    let timeout_a = a.recv("pvp:match_timeout").await;
    assert_eq!(timeout_a["matchId"].as_str().unwrap(), match_id);
    b.recv("pvp:match_timeout").await;

    let body = server.get_json("/pvp/ranking/user-a").await;
    assert_eq!(body["data"]["elo"].as_i64().unwrap(), 1000);
    assert_eq!(body["data"]["matches"].as_i64().unwrap(), 0);
    assert!(server.state.matches.is_empty());
}

#[tokio::test]
async fn test_pair_off_rolls_back_when_storage_fails() {
    let server = TestServer::spawn().await;
    let mut a = server.player("user-a", "alice").await;
    let mut b = server.player("user-b", "bob").await;

    a.join_queue().await;
    a.recv("pvp:queue_joined").await;

    server.state.db.close().await;

    b.join_queue().await;
    b.recv("pvp:queue_joined").await;

    // Pair-off failed: both entries back at the head in original order,
    // nothing was matched. Give the failed round a moment to unwind.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state.queue.len(), 2);
    assert_eq!(server.state.queue.user_ids(), vec!["user-a", "user-b"]);
    assert!(server.state.matches.is_empty());
}
