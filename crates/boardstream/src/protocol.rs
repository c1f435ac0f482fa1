//! Wire event shapes and NDJSON line framing.
//!
//! Events arrive as newline-delimited JSON on a streaming response body.
//! Unknown event types and unreadable lines are skipped by consumers; they
//! are not errors.

use serde::Deserialize;

use crate::types::{Color, GameStatus, PlayerInfo, UciMove};

/// Accumulates body chunks and yields complete lines.
///
/// The trailing partial line stays buffered until its newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

/// Per-game stream events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEvent {
    /// Complete game description, sent once when the stream opens.
    GameFull(GameFull),
    /// Incremental state snapshot.
    GameState(StateUpdate),
}

/// The opening event of a game stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFull {
    #[serde(default)]
    pub initial_fen: Option<String>,
    #[serde(default)]
    pub white: PlayerInfo,
    #[serde(default)]
    pub black: PlayerInfo,
    #[serde(default)]
    pub rated: Option<bool>,
    #[serde(default)]
    pub perf: Option<PerfRef>,
    #[serde(default)]
    pub speed: Option<String>,
    /// Which side this account plays, when the server states it.
    #[serde(default)]
    pub orientation: Option<Color>,
    pub state: StateUpdate,
}

impl GameFull {
    /// Starting position, with the synthetic "startpos" marker normalized
    /// away.
    #[must_use]
    pub fn initial_position(&self) -> Option<&str> {
        match self.initial_fen.as_deref() {
            None | Some("startpos") => None,
            Some(fen) => Some(fen),
        }
    }

    /// Rating category key, preferring the perf key over the speed label.
    #[must_use]
    pub fn perf_key(&self) -> Option<&str> {
        self.perf
            .as_ref()
            .and_then(|p| p.key.as_deref())
            .or(self.speed.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerfRef {
    #[serde(default)]
    pub key: Option<String>,
}

/// Latest full snapshot of an ongoing game's state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    /// Space-separated move tokens from the start of the game.
    #[serde(default)]
    pub moves: String,
    #[serde(default)]
    pub wtime: Option<u64>,
    #[serde(default)]
    pub btime: Option<u64>,
    #[serde(default)]
    pub turn: Option<Color>,
    #[serde(default)]
    pub draw_offer: Option<bool>,
    #[serde(default)]
    pub status: Option<GameStatus>,
    #[serde(default)]
    pub winner: Option<Color>,
}

impl StateUpdate {
    /// Parse the move-token list, skipping malformed tokens.
    #[must_use]
    pub fn move_list(&self) -> Vec<UciMove> {
        parse_move_tokens(&self.moves)
    }
}

/// Account-wide stream events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AccountEvent {
    Challenge {
        challenge: ChallengeEvent,
    },
    GameStart {
        #[serde(default)]
        game: Option<GameRef>,
    },
    GameFinish {
        #[serde(default)]
        game: Option<GameRef>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameRef {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeEvent {
    pub id: String,
    #[serde(default)]
    pub challenger: Option<PlayerInfo>,
    #[serde(default)]
    pub rated: Option<bool>,
    #[serde(default)]
    pub time_control: Option<TimeControlRef>,
    #[serde(default)]
    pub variant: Option<VariantRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeControlRef {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Initial time in seconds.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Increment in seconds.
    #[serde(default)]
    pub increment: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantRef {
    #[serde(default)]
    pub name: Option<String>,
}

impl ChallengeEvent {
    /// Human label for the challenge's time control.
    #[must_use]
    pub fn time_label(&self) -> String {
        match &self.time_control {
            Some(tc) if tc.kind.as_deref() == Some("clock") => {
                let minutes = tc.limit.unwrap_or(0).div_ceil(60);
                format!("{minutes} + {}", tc.increment.unwrap_or(0))
            }
            Some(tc) => tc.kind.clone().unwrap_or_else(|| "Custom".into()),
            None => "Custom".into(),
        }
    }
}

/// Puzzle payload from the puzzle endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleResponse {
    pub puzzle: PuzzleDetail,
    #[serde(default)]
    pub game: Option<PuzzleGame>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleDetail {
    pub id: String,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub solution: Vec<UciMove>,
    #[serde(default)]
    pub initial_ply: Option<usize>,
}

/// Source game the puzzle position comes from: either its notation or a
/// ready-made position string.
#[derive(Debug, Clone, Deserialize)]
pub struct PuzzleGame {
    #[serde(default)]
    pub pgn: Option<String>,
    #[serde(default)]
    pub fen: Option<String>,
}

/// Split a space-separated token list, dropping malformed entries.
#[must_use]
pub fn parse_move_tokens(moves: &str) -> Vec<UciMove> {
    moves
        .split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"a\":").is_empty());
        let lines = buf.push(b"1}\n{\"b\":2}\n{\"c\"");
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        let lines = buf.push(b":3}\r\n");
        assert_eq!(lines, vec!["{\"c\":3}"]);
    }

    #[test]
    fn parses_game_full() {
        let line = r#"{
            "type": "gameFull",
            "initialFen": "startpos",
            "white": {"id": "anna", "name": "Anna", "rating": 1900},
            "black": {"id": "ben", "rating": 1850},
            "rated": true,
            "perf": {"key": "blitz"},
            "state": {"type": "gameState", "moves": "e2e4 e7e5", "wtime": 300000, "btime": 300000}
        }"#;
        let event: GameEvent = serde_json::from_str(line).unwrap();
        let GameEvent::GameFull(full) = event else {
            panic!("expected gameFull");
        };
        assert!(full.initial_position().is_none());
        assert_eq!(full.perf_key(), Some("blitz"));
        assert_eq!(full.white.label("White"), "Anna 1900");
        assert_eq!(full.state.move_list().len(), 2);
    }

    #[test]
    fn parses_game_state_with_status() {
        let line = r#"{"type":"gameState","moves":"e2e4 e7e5 g1f3","wtime":100,"btime":200,"status":"resign","winner":"white","drawOffer":false}"#;
        let event: GameEvent = serde_json::from_str(line).unwrap();
        let GameEvent::GameState(state) = event else {
            panic!("expected gameState");
        };
        assert_eq!(state.status, Some(GameStatus::Resign));
        assert_eq!(state.winner, Some(Color::White));
        assert_eq!(state.move_list().len(), 3);
    }

    #[test]
    fn unknown_event_type_is_an_error() {
        let line = r#"{"type":"chatLine","username":"anna","text":"hi"}"#;
        assert!(serde_json::from_str::<GameEvent>(line).is_err());
    }

    #[test]
    fn malformed_tokens_are_dropped() {
        let tokens = parse_move_tokens("e2e4  x e7e5 e7 e7e8q");
        let rendered: Vec<String> = tokens.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["e2e4", "e7e5", "e7e8q"]);
    }

    #[test]
    fn challenge_time_label() {
        let line = r#"{
            "type": "challenge",
            "challenge": {
                "id": "ch1",
                "challenger": {"name": "maria"},
                "rated": false,
                "timeControl": {"type": "clock", "limit": 300, "increment": 2},
                "variant": {"name": "Standard"}
            }
        }"#;
        let event: AccountEvent = serde_json::from_str(line).unwrap();
        let AccountEvent::Challenge { challenge } = event else {
            panic!("expected challenge");
        };
        assert_eq!(challenge.time_label(), "5 + 2");
    }

    #[test]
    fn puzzle_payload_parses() {
        let body = r#"{
            "puzzle": {"id": "abcde", "rating": 1650, "solution": ["e2e4", "e7e5"], "initialPly": 12},
            "game": {"pgn": "1. e4 e5"}
        }"#;
        let response: PuzzleResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.puzzle.id, "abcde");
        assert_eq!(response.puzzle.solution.len(), 2);
        assert_eq!(response.puzzle.initial_ply, Some(12));
    }
}
