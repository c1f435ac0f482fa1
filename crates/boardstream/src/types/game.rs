//! Game-level types: identifiers, server statuses, session summaries.

use serde::{Deserialize, Serialize};

use super::chess::Color;

/// Server-assigned opaque game identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(String);

impl GameId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Game status as reported by the server.
///
/// Only four of these end a game from this client's point of view; everything
/// else is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    Created,
    Started,
    Aborted,
    Mate,
    Resign,
    Stalemate,
    Timeout,
    Outoftime,
    Draw,
    NoStart,
    UnknownFinish,
    VariantEnd,
    Cheat,
    #[serde(other)]
    Unknown,
}

impl GameStatus {
    /// True for the statuses that resolve a game result.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Mate | Self::Resign | Self::Draw | Self::Outoftime)
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Aborted => "aborted",
            Self::Mate => "mate",
            Self::Resign => "resign",
            Self::Stalemate => "stalemate",
            Self::Timeout => "timeout",
            Self::Outoftime => "outoftime",
            Self::Draw => "draw",
            Self::NoStart => "noStart",
            Self::UnknownFinish => "unknownFinish",
            Self::VariantEnd => "variantEnd",
            Self::Cheat => "cheat",
            Self::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// One side's identity as carried by the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub rating_diff: Option<i32>,
}

impl PlayerInfo {
    /// Display label: name (falling back to id), with the rating appended
    /// when known.
    #[must_use]
    pub fn label(&self, fallback: &str) -> String {
        let name = self
            .name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or(fallback);
        match self.rating {
            Some(rating) => format!("{name} {rating}"),
            None => name.to_string(),
        }
    }
}

/// Final summary of one finished game, enriched with rating changes when the
/// server has settled them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSummary {
    pub game_id: Option<GameId>,
    pub white: String,
    pub black: String,
    pub white_id: Option<String>,
    pub black_id: Option<String>,
    pub rated: Option<bool>,
    pub perf: Option<String>,
    pub player_color: Option<Color>,
    pub white_rating_diff: Option<i32>,
    pub black_rating_diff: Option<i32>,
    pub result_text: Option<String>,
    pub status: Option<GameStatus>,
    pub winner: Option<Color>,
}

/// Rating deltas from the game summary endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RatingDiffs {
    pub white: Option<i32>,
    pub black: Option<i32>,
}

impl RatingDiffs {
    /// True once the server has attributed a change to either side.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.white.is_some() || self.black.is_some()
    }
}

/// An incoming challenge, reduced to what the surrounding application shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeInfo {
    pub id: String,
    pub from: String,
    pub rated: bool,
    pub time_label: String,
    pub variant: String,
}

/// Connection lifecycle of a game stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Streaming,
    Stale,
    RetryScheduled,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Stale => "stale",
            Self::RetryScheduled => "retry scheduled",
            Self::Closed => "closed",
        };
        write!(f, "{label}")
    }
}

/// Puzzle attempt lifecycle as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzleStatus {
    Inactive,
    Loading,
    Loaded,
    Solved,
    Failed,
}

impl std::fmt::Display for PuzzleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Inactive => "inactive",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Solved => "solved",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// One puzzle attempt result to report back to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PuzzleOutcome {
    pub id: String,
    pub win: bool,
    pub rated: bool,
}
