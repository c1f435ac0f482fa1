//! Collaborator interface to the remote game service.
//!
//! The transport itself (HTTP, auth, token storage) lives outside this crate;
//! the core only consumes this capability set. Streams deliver raw NDJSON
//! bytes exactly as read from the response body.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::protocol::PuzzleResponse;
use crate::types::{GameId, PuzzleOutcome, RatingDiffs, UciMove};

/// Raw bytes from one streaming response body.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ApiError>> + Send>>;

/// Errors from the remote service collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing access token")]
    MissingToken,

    #[error("request failed with status {status}")]
    Status { status: u16 },

    #[error("rate limited")]
    RateLimited {
        /// Server-supplied wait hint, when present.
        retry_after: Option<Duration>,
    },

    #[error("transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Remote game service capability set.
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Submit a move for a live game.
    async fn send_move(&self, game_id: &GameId, mv: &UciMove) -> Result<(), ApiError>;

    /// Open the per-game event stream.
    async fn stream_game(&self, game_id: &GameId) -> Result<EventStream, ApiError>;

    /// Open the account-wide event stream (challenges, game starts).
    async fn stream_events(&self) -> Result<EventStream, ApiError>;

    /// Fetch the next puzzle.
    async fn fetch_puzzle(&self) -> Result<PuzzleResponse, ApiError>;

    /// Report puzzle attempt results.
    async fn submit_puzzle_result(&self, outcomes: &[PuzzleOutcome]) -> Result<(), ApiError>;

    /// Fetch the post-game summary with rating changes.
    async fn fetch_game_summary(&self, game_id: &GameId) -> Result<RatingDiffs, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ApiError>();
    }

    #[test]
    fn rate_limited_display() {
        let err = ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.to_string(), "rate limited");
    }
}
