//! In-memory collaborators for tests.
//!
//! [`ScriptedApi`] stands in for the remote service: streams are backed by
//! channels the test pushes into, request-style calls pop scripted responses.
//! [`RecordingView`] stands in for the renderer and records every call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::api::{ApiError, BoardApi, EventStream};
use crate::protocol::PuzzleResponse;
use crate::queue::BoardView;
use crate::types::{Color, GameId, PieceType, PuzzleOutcome, RatingDiffs, Square, UciMove};

type ChunkSender = mpsc::UnboundedSender<Result<Vec<u8>, ApiError>>;

/// Scripted in-memory implementation of the remote service.
#[derive(Default)]
pub struct ScriptedApi {
    game_stream: Mutex<Option<ChunkSender>>,
    game_stream_count: AtomicUsize,
    event_stream: Mutex<Option<ChunkSender>>,
    sent_moves: Mutex<Vec<(GameId, UciMove)>>,
    fail_moves: Mutex<bool>,
    puzzles: Mutex<VecDeque<Result<PuzzleResponse, ApiError>>>,
    puzzle_fetches: AtomicUsize,
    puzzle_reports: Mutex<Vec<PuzzleOutcome>>,
    summaries: Mutex<VecDeque<Result<RatingDiffs, ApiError>>>,
    summary_fetches: AtomicUsize,
}

impl ScriptedApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one event line into the current game stream. Returns `false`
    /// when no stream is open.
    pub fn push_game_line(&self, line: &str) -> bool {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.game_stream
            .lock()
            .expect("stream lock")
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(bytes)).is_ok())
    }

    /// Push a transport error into the current game stream.
    pub fn fail_game_stream(&self, reason: &str) {
        if let Some(tx) = self.game_stream.lock().expect("stream lock").as_ref() {
            let _ = tx.send(Err(ApiError::Transport {
                reason: reason.to_string(),
                source: None,
            }));
        }
    }

    /// Close the current game stream as the server would.
    pub fn end_game_stream(&self) {
        self.game_stream.lock().expect("stream lock").take();
    }

    /// Number of times a game stream was opened.
    #[must_use]
    pub fn game_stream_count(&self) -> usize {
        self.game_stream_count.load(Ordering::SeqCst)
    }

    /// Push one event line into the account stream. Returns `false` when no
    /// stream is open.
    pub fn push_account_line(&self, line: &str) -> bool {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.event_stream
            .lock()
            .expect("stream lock")
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(bytes)).is_ok())
    }

    /// Make subsequent move submissions fail.
    pub fn set_fail_moves(&self, fail: bool) {
        *self.fail_moves.lock().expect("flag lock") = fail;
    }

    /// Moves submitted so far.
    #[must_use]
    pub fn sent_moves(&self) -> Vec<(GameId, UciMove)> {
        self.sent_moves.lock().expect("moves lock").clone()
    }

    /// Script the next puzzle fetch result.
    pub fn queue_puzzle(&self, response: Result<PuzzleResponse, ApiError>) {
        self.puzzles
            .lock()
            .expect("puzzles lock")
            .push_back(response);
    }

    #[must_use]
    pub fn puzzle_fetch_count(&self) -> usize {
        self.puzzle_fetches.load(Ordering::SeqCst)
    }

    /// Puzzle results reported so far.
    #[must_use]
    pub fn puzzle_reports(&self) -> Vec<PuzzleOutcome> {
        self.puzzle_reports.lock().expect("reports lock").clone()
    }

    /// Script the next game-summary fetch result.
    pub fn queue_summary(&self, diffs: Result<RatingDiffs, ApiError>) {
        self.summaries.lock().expect("summaries lock").push_back(diffs);
    }

    #[must_use]
    pub fn summary_fetch_count(&self) -> usize {
        self.summary_fetches.load(Ordering::SeqCst)
    }

    fn open_stream(slot: &Mutex<Option<ChunkSender>>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        *slot.lock().expect("stream lock") = Some(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

#[async_trait]
impl BoardApi for ScriptedApi {
    async fn send_move(&self, game_id: &GameId, mv: &UciMove) -> Result<(), ApiError> {
        if *self.fail_moves.lock().expect("flag lock") {
            return Err(ApiError::Status { status: 400 });
        }
        self.sent_moves
            .lock()
            .expect("moves lock")
            .push((game_id.clone(), mv.clone()));
        Ok(())
    }

    async fn stream_game(&self, _game_id: &GameId) -> Result<EventStream, ApiError> {
        self.game_stream_count.fetch_add(1, Ordering::SeqCst);
        Ok(Self::open_stream(&self.game_stream))
    }

    async fn stream_events(&self) -> Result<EventStream, ApiError> {
        Ok(Self::open_stream(&self.event_stream))
    }

    async fn fetch_puzzle(&self) -> Result<PuzzleResponse, ApiError> {
        self.puzzle_fetches.fetch_add(1, Ordering::SeqCst);
        self.puzzles
            .lock()
            .expect("puzzles lock")
            .pop_front()
            .unwrap_or(Err(ApiError::Status { status: 404 }))
    }

    async fn submit_puzzle_result(&self, outcomes: &[PuzzleOutcome]) -> Result<(), ApiError> {
        self.puzzle_reports
            .lock()
            .expect("reports lock")
            .extend_from_slice(outcomes);
        Ok(())
    }

    async fn fetch_game_summary(&self, _game_id: &GameId) -> Result<RatingDiffs, ApiError> {
        self.summary_fetches.fetch_add(1, Ordering::SeqCst);
        self.summaries
            .lock()
            .expect("summaries lock")
            .pop_front()
            .unwrap_or(Ok(RatingDiffs::default()))
    }
}

/// One recorded renderer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCall {
    Animate {
        from: Square,
        to: Square,
    },
    Capture {
        square: Square,
    },
    Relocate {
        from: Square,
        to: Square,
    },
    Promote {
        square: Square,
        color: Color,
        piece: PieceType,
    },
    Resync {
        fen: String,
    },
}

/// Renderer stand-in that records calls, optionally simulating a timed
/// transition.
#[derive(Default)]
pub struct RecordingView {
    calls: Mutex<Vec<ViewCall>>,
    animation_delay: Option<Duration>,
}

impl RecordingView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A view whose animations take the given time to complete.
    #[must_use]
    pub fn with_animation_delay(delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            animation_delay: Some(delay),
        }
    }

    /// Snapshot of every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ViewCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    fn record(&self, call: ViewCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl BoardView for RecordingView {
    async fn animate_move(&self, from: Square, to: Square) {
        self.record(ViewCall::Animate { from, to });
        if let Some(delay) = self.animation_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn capture_piece(&self, square: Square) {
        self.record(ViewCall::Capture { square });
    }

    fn relocate_piece(&self, from: Square, to: Square) {
        self.record(ViewCall::Relocate { from, to });
    }

    fn promote_piece(&self, square: Square, color: Color, piece: PieceType) {
        self.record(ViewCall::Promote {
            square,
            color,
            piece,
        });
    }

    fn resync(&self, fen: &str) {
        self.record(ViewCall::Resync {
            fen: fen.to_string(),
        });
    }
}

/// Arc-wrapped [`ScriptedApi`] plus the matching view, for terse test setup.
#[must_use]
pub fn scripted_pair() -> (Arc<ScriptedApi>, Arc<RecordingView>) {
    (Arc::new(ScriptedApi::new()), Arc::new(RecordingView::new()))
}
