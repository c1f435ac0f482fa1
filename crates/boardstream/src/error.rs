use crate::api::ApiError;
use crate::engine::EngineError;

/// Errors surfaced by the client core.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("puzzle {id} could not be loaded")]
    PuzzleUnusable { id: String },
}
