use serde::{Deserialize, Serialize};

/// Opponent summary sent with `pvp:match_found`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentInfo {
    pub id: String,
    pub username: String,
    pub elo: i32,
}

/// Player summary sent with `pvp:game_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub username: String,
}

/// Messages sent from client to server. Event names are normalized to the
/// `pvp:` namespace; the legacy uppercase names are accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "pvp:join_queue")]
    JoinQueue,
    #[serde(rename = "pvp:leave_queue")]
    LeaveQueue,
    #[serde(rename = "pvp:accept_match", alias = "ACCEPT_MATCH", rename_all = "camelCase")]
    AcceptMatch { match_id: String },
    #[serde(rename = "pvp:progress", alias = "MATCH_PROGRESS", rename_all = "camelCase")]
    Progress { match_id: String, wpm: f64, acc: f64 },
    #[serde(rename = "pvp:complete", alias = "MATCH_COMPLETE", rename_all = "camelCase")]
    Complete { match_id: String, wpm: f64, acc: f64 },
    #[serde(rename = "pvp:forfeit", alias = "FORFEIT", rename_all = "camelCase")]
    Forfeit { match_id: String },
    #[serde(rename = "pvp:reconnect", alias = "RECONNECT", rename_all = "camelCase")]
    Reconnect { match_id: String },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "pvp:queue_joined", rename_all = "camelCase")]
    QueueJoined { queue_size: usize, message: String },
    #[serde(rename = "pvp:queue_left")]
    QueueLeft { message: String },
    #[serde(rename = "pvp:queue_status", rename_all = "camelCase")]
    QueueStatus { queue_size: usize },
    #[serde(rename = "pvp:queue_timeout")]
    QueueTimeout { message: String },
    #[serde(rename = "pvp:match_found", rename_all = "camelCase")]
    MatchFound {
        match_id: String,
        opponent: OpponentInfo,
    },
    #[serde(rename = "pvp:game_start", rename_all = "camelCase")]
    GameStart {
        match_id: String,
        player1: PlayerInfo,
        player2: PlayerInfo,
        /// Epoch milliseconds.
        start_time: i64,
        /// Seconds.
        test_duration: u64,
    },
    #[serde(rename = "pvp:opponent_progress", rename_all = "camelCase")]
    OpponentProgress {
        match_id: String,
        opponent_wpm: f64,
        opponent_accuracy: f64,
        /// Epoch milliseconds of the opponent's report.
        timestamp: i64,
    },
    #[serde(rename = "pvp:match_result", rename_all = "camelCase")]
    MatchResult {
        match_id: String,
        winner_id: Option<String>,
        winner_name: Option<String>,
        player1_id: String,
        player1_name: String,
        player1_wpm: f64,
        player1_accuracy: f64,
        player1_elo_change: i32,
        player2_id: String,
        player2_name: String,
        player2_wpm: f64,
        player2_accuracy: f64,
        player2_elo_change: i32,
        match_duration: i64,
    },
    #[serde(rename = "pvp:match_timeout", rename_all = "camelCase")]
    MatchTimeout { match_id: String, message: String },
    #[serde(rename = "pvp:opponent_finished", rename_all = "camelCase")]
    OpponentFinished { match_id: String, wpm: f64, acc: f64 },
    #[serde(rename = "pvp:opponent_forfeited", rename_all = "camelCase")]
    OpponentForfeited { match_id: String },
    #[serde(rename = "pvp:opponent_reconnected", rename_all = "camelCase")]
    OpponentReconnected { match_id: String },
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_pvp_namespace() {
        let event = ClientEvent::Progress {
            match_id: "m1".into(),
            wpm: 80.0,
            acc: 95.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pvp:progress");
        assert_eq!(json["matchId"], "m1");
    }

    #[test]
    fn legacy_uppercase_names_still_parse() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"MATCH_COMPLETE","matchId":"m1","wpm":70,"acc":97}"#)
                .unwrap();
        match event {
            ClientEvent::Complete { match_id, wpm, acc } => {
                assert_eq!(match_id, "m1");
                assert_eq!(wpm, 70.0);
                assert_eq!(acc, 97.0);
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn join_queue_parses_without_payload() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"pvp:join_queue"}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinQueue));
    }

    #[test]
    fn server_events_are_camel_case() {
        let event = ServerEvent::OpponentProgress {
            match_id: "m1".into(),
            opponent_wpm: 72.5,
            opponent_accuracy: 96.0,
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pvp:opponent_progress");
        assert_eq!(json["opponentWpm"], 72.5);
        assert!(json.get("opponent_wpm").is_none());
    }

    #[test]
    fn match_result_is_symmetric_payload() {
        let event = ServerEvent::MatchResult {
            match_id: "m1".into(),
            winner_id: None,
            winner_name: None,
            player1_id: "a".into(),
            player1_name: "alice".into(),
            player1_wpm: 50.0,
            player1_accuracy: 90.0,
            player1_elo_change: 0,
            player2_id: "b".into(),
            player2_name: "bob".into(),
            player2_wpm: 50.0,
            player2_accuracy: 90.0,
            player2_elo_change: 0,
            match_duration: 60,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["winnerId"], serde_json::Value::Null);
        assert_eq!(json["player1EloChange"], 0);
        assert_eq!(json["matchDuration"], 60);
    }
}
