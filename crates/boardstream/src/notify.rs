//! Outbound notification port.
//!
//! Everything the surrounding application needs to render flows through one
//! tagged channel rather than a bundle of injected callbacks.

use tokio::sync::mpsc;

use crate::types::{
    ChallengeInfo, Color, ConnectionState, GameSummary, PuzzleStatus, UciMove,
};

/// One outbound update to the surrounding application.
#[derive(Debug, Clone)]
pub enum Notification {
    /// The engine position changed; `fen` is the new authoritative position.
    Position { fen: String, turn: Color },
    /// Move history display changed.
    MoveHistory(Vec<String>),
    /// Formatted clock readouts for both sides.
    Clocks { white: String, black: String },
    /// Game stream connection lifecycle.
    Connection(ConnectionState),
    /// A draw offer is (or is no longer) on the table.
    DrawOffer(bool),
    /// Player display labels for the current game.
    Players {
        white: String,
        black: String,
        player_color: Option<Color>,
    },
    /// Immediate result line for a finished game.
    ResultText(String),
    /// Final summary, enriched with rating changes when available.
    GameEnded(GameSummary),
    /// Incoming challenge from another player.
    Challenge(ChallengeInfo),
    /// Puzzle attempt lifecycle.
    PuzzleStatus(PuzzleStatus),
    /// Puzzle rating display, `--` when unknown.
    PuzzleRating(String),
    /// Solution tokens of the loaded puzzle, for reveal-style display.
    PuzzleSolution(Vec<UciMove>),
    /// Transient status line ("Live", "Move failed", ...).
    Status(String),
}

/// Sending half of the notification channel. Cheap to clone; sending never
/// blocks and silently drops updates once the receiver is gone.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSender {
    /// Create a channel pair.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("notification receiver dropped, update discarded");
        }
    }
}
