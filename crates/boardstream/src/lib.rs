//! Stream-synchronized chess board client core.
//!
//! Keeps a locally rule-validated position in lockstep with an authoritative
//! remote game state delivered over an event stream, presents every move
//! through a serialized animation queue, and runs a scripted-solution puzzle
//! mode. Rendering, input mapping, transport and auth are collaborators
//! behind the [`queue::BoardView`] and [`api::BoardApi`] traits.

pub mod api;
pub mod clock;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod health;
pub mod history;
pub mod notify;
pub mod protocol;
pub mod puzzle;
pub mod puzzle_fetch;
pub mod queue;
pub mod selection;
pub mod testing;
pub mod types;

mod dispatch;
mod reconcile;

/// Prelude module for convenient glob imports.
pub mod prelude {
    pub use crate::api::{ApiError, BoardApi};
    pub use crate::config::ClientConfig;
    pub use crate::controller::GameController;
    pub use crate::engine::{AppliedMove, BoardEngine, EngineError};
    pub use crate::error::ClientError;
    pub use crate::notify::Notification;
    pub use crate::queue::BoardView;
    pub use crate::selection::SelectionOutcome;
    pub use crate::types::{Color, GameId, MoveIntent, Square, UciMove};
}
