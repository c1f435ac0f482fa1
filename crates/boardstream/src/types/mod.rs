//! Shared domain types.

pub mod chess;
pub mod game;

pub use chess::{Color, MoveIntent, PieceType, Square, UciMove};
pub use game::{
    ChallengeInfo, ConnectionState, GameId, GameStatus, GameSummary, PlayerInfo, PuzzleOutcome,
    PuzzleStatus, RatingDiffs,
};
