//! Top-level controller.
//!
//! Owns the shared context every core routine works against: the rules
//! engine, the animation pipeline, the live-session slot, the puzzle flow and
//! the outbound notification channel. User input enters here; stream
//! reconciliation and the account event loop run as tasks holding the same
//! context.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::api::BoardApi;
use crate::config::ClientConfig;
use crate::engine::{AppliedMove, BoardEngine};
use crate::error::ClientError;
use crate::history::HistoryTracker;
use crate::notify::{Notification, NotificationSender};
use crate::puzzle::{PuzzleFlow, PuzzleMove};
use crate::puzzle_fetch::PuzzleFetcher;
use crate::queue::{AnimationPipeline, BoardView};
use crate::reconcile::LiveGame;
use crate::selection::{InteractionMode, SelectionGate, SelectionOutcome};
use crate::types::{Color, GameId, GameSummary, MoveIntent, PuzzleStatus, Square, UciMove};
use crate::{dispatch, reconcile};

/// State shared between the controller and its background tasks.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) api: Arc<dyn BoardApi>,
    pub(crate) engine: Mutex<BoardEngine>,
    pub(crate) pipeline: AnimationPipeline,
    pub(crate) history: Mutex<HistoryTracker>,
    pub(crate) notify: NotificationSender,
    pub(crate) live: Mutex<Option<LiveGame>>,
    pub(crate) puzzle: Mutex<PuzzleFlow>,
    /// Guard against resolving the same game's result twice.
    pub(crate) last_result_game: Mutex<Option<GameId>>,
    /// Summary of the most recent game, kept past session teardown.
    pub(crate) last_summary: Mutex<Option<GameSummary>>,
    /// This account's id, for orientation fallback.
    pub(crate) account_id: Mutex<Option<String>>,
}

/// Apply a move to the engine and hand it to the animation queue.
///
/// The resync that the engine change would otherwise trigger is suppressed,
/// since the queued animation already covers it.
pub(crate) fn make_animated_move(shared: &Shared, intent: &MoveIntent) -> Option<AppliedMove> {
    shared.pipeline.suppress_next_resync();
    let applied = shared
        .engine
        .lock()
        .expect("engine lock")
        .apply_intent(intent);
    match applied {
        Some(applied) => {
            shared.pipeline.submit(applied.clone());
            Some(applied)
        }
        None => {
            shared.pipeline.clear_suppression();
            None
        }
    }
}

/// Start (or retarget) the live session for a game. Any previous session is
/// cancelled first, timers included.
pub(crate) fn start_game(shared: &Arc<Shared>, game_id: GameId) {
    {
        let mut puzzle = shared.puzzle.lock().expect("puzzle lock");
        if puzzle.is_active() {
            puzzle.abandon();
        }
    }
    shared
        .notify
        .send(Notification::PuzzleStatus(PuzzleStatus::Inactive));
    shared.notify.send(Notification::PuzzleRating("--".into()));

    let token = CancellationToken::new();
    {
        let mut live = shared.live.lock().expect("live lock");
        if let Some(previous) = live.take() {
            tracing::info!(game = %previous.game_id, "cancelling previous live session");
            previous.token.cancel();
        }
        *live = Some(LiveGame::new(game_id.clone(), token.clone()));
    }
    shared.notify.send(Notification::ResultText("--".into()));

    tracing::info!(game = %game_id, "starting live session");
    tokio::spawn(reconcile::run_game_stream(
        Arc::clone(shared),
        game_id,
        token.clone(),
    ));
    tokio::spawn(reconcile::run_clock_ticker(Arc::clone(shared), token));
}

/// Tear down the live session, if any.
pub(crate) fn stop_session(shared: &Shared) {
    if let Some(previous) = shared.live.lock().expect("live lock").take() {
        tracing::info!(game = %previous.game_id, "stopping live session");
        previous.token.cancel();
    }
}

/// The synchronization core, bound to one rules engine, one view and one
/// remote service client.
///
/// Must be created inside a tokio runtime; the animation worker and every
/// session task are spawned on it.
pub struct GameController {
    shared: Arc<Shared>,
    selection: Mutex<SelectionGate>,
    fetcher: tokio::sync::Mutex<PuzzleFetcher>,
    events_token: Mutex<Option<CancellationToken>>,
}

impl GameController {
    /// Build the controller and the notification stream the surrounding
    /// application renders from.
    pub fn new(
        api: Arc<dyn BoardApi>,
        view: Arc<dyn BoardView>,
        config: ClientConfig,
    ) -> Result<(Self, UnboundedReceiver<Notification>), ClientError> {
        config.validate()?;
        let (notify, receiver) = NotificationSender::channel();
        let fetcher = PuzzleFetcher::new(Arc::clone(&api), &config);
        let shared = Arc::new(Shared {
            config,
            api,
            engine: Mutex::new(BoardEngine::new()),
            pipeline: AnimationPipeline::new(view),
            history: Mutex::new(HistoryTracker::new()),
            notify,
            live: Mutex::new(None),
            puzzle: Mutex::new(PuzzleFlow::new()),
            last_result_game: Mutex::new(None),
            last_summary: Mutex::new(None),
            account_id: Mutex::new(None),
        });
        wire_engine_listener(&shared);
        Ok((
            Self {
                shared,
                selection: Mutex::new(SelectionGate::new()),
                fetcher: tokio::sync::Mutex::new(fetcher),
                events_token: Mutex::new(None),
            },
            receiver,
        ))
    }

    /// Record this account's id, used to orient the board when the server
    /// does not state a side.
    pub fn set_account_id(&self, id: Option<String>) {
        *self.shared.account_id.lock().expect("account lock") = id;
    }

    /// Start consuming the account-wide event stream (challenges, game
    /// starts). A previous consumer is cancelled first.
    pub fn connect(&self) {
        let token = CancellationToken::new();
        {
            let mut slot = self.events_token.lock().expect("events lock");
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            *slot = Some(token.clone());
        }
        tokio::spawn(dispatch::run_account_stream(
            Arc::clone(&self.shared),
            token,
        ));
    }

    /// Join a live game by id, replacing any current session or puzzle.
    pub fn start_game(&self, game_id: GameId) {
        self.selection.lock().expect("selection lock").clear();
        start_game(&self.shared, game_id);
    }

    /// Fetch and load the next puzzle, replacing any live session.
    pub async fn start_puzzle(&self) -> Result<(), ClientError> {
        let shared = &self.shared;
        stop_session(shared);
        self.selection.lock().expect("selection lock").clear();
        shared
            .notify
            .send(Notification::PuzzleStatus(PuzzleStatus::Loading));
        shared.notify.send(Notification::PuzzleRating("--".into()));
        shared.notify.send(Notification::PuzzleSolution(Vec::new()));
        shared.notify.send(Notification::DrawOffer(false));
        shared.history.lock().expect("history lock").reset();
        shared.pipeline.clear();

        let fetched = {
            let mut fetcher = self.fetcher.lock().await;
            fetcher.fetch_next().await
        };
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(error) => {
                tracing::warn!(%error, "puzzle fetch failed");
                self.fail_puzzle_load();
                return Err(error.into());
            }
        };

        let puzzle = fetched.response.puzzle;
        let game = fetched.response.game;
        if !self.load_puzzle_position(game.as_ref(), puzzle.initial_ply, &puzzle.solution) {
            tracing::warn!(puzzle = %puzzle.id, "puzzle position could not be loaded");
            self.fail_puzzle_load();
            return Err(ClientError::PuzzleUnusable { id: puzzle.id });
        }

        shared
            .puzzle
            .lock()
            .expect("puzzle lock")
            .begin(&puzzle.id, puzzle.solution.clone());
        shared
            .notify
            .send(Notification::PuzzleStatus(PuzzleStatus::Loaded));
        shared.notify.send(Notification::PuzzleRating(
            puzzle
                .rating
                .map_or_else(|| "--".into(), |r| r.to_string()),
        ));
        shared
            .notify
            .send(Notification::PuzzleSolution(puzzle.solution));
        tracing::info!(puzzle = %puzzle.id, repeated = fetched.repeated, "puzzle loaded");
        Ok(())
    }

    /// Feed one square pick from the input collaborator. Complete move
    /// intents are executed immediately; a promotion choice is handed back
    /// for the application to resolve via [`GameController::submit_move`].
    pub fn square_clicked(&self, square: Square) -> SelectionOutcome {
        let mode = self.interaction_mode();
        let outcome = {
            let engine = self.shared.engine.lock().expect("engine lock");
            self.selection
                .lock()
                .expect("selection lock")
                .on_square(&engine, mode, square)
        };
        if let SelectionOutcome::Intent(intent) = &outcome {
            self.submit_move(intent);
        }
        outcome
    }

    /// Execute a complete move intent: through the puzzle flow when a puzzle
    /// is active, otherwise directly onto the board (and out to the server
    /// in a live game). Returns whether the board changed.
    pub fn submit_move(&self, intent: &MoveIntent) -> bool {
        let shared = &self.shared;
        let puzzle_outcome = {
            let mut flow = shared.puzzle.lock().expect("puzzle lock");
            if flow.is_active() {
                let outcome =
                    flow.handle_user_move(intent, &mut |i| make_animated_move(shared, i));
                let report = flow.take_report();
                let status = flow.status();
                Some((outcome, report, status))
            } else {
                None
            }
        };

        if let Some((outcome, report, status)) = puzzle_outcome {
            match outcome {
                PuzzleMove::Solved | PuzzleMove::Failed => {
                    if let Some(status) = status {
                        shared.notify.send(Notification::PuzzleStatus(status));
                    }
                    if let Some(report) = report {
                        let api = Arc::clone(&shared.api);
                        tokio::spawn(async move {
                            if let Err(error) = api.submit_puzzle_result(&[report]).await {
                                tracing::warn!(%error, "puzzle result submission failed");
                            }
                        });
                    }
                    return true;
                }
                PuzzleMove::Advanced => return true,
                PuzzleMove::RejectedByEngine => return false,
                PuzzleMove::NotHandled => {}
            }
        }

        let Some(applied) = make_animated_move(shared, intent) else {
            return false;
        };
        let live_game = shared
            .live
            .lock()
            .expect("live lock")
            .as_ref()
            .map(|l| l.game_id.clone());
        if let Some(game_id) = live_game {
            let api = Arc::clone(&shared.api);
            let notify = shared.notify.clone();
            let token = applied.uci();
            tokio::spawn(async move {
                if let Err(error) = api.send_move(&game_id, &token).await {
                    tracing::warn!(game = %game_id, %error, "move submission failed");
                    notify.send(Notification::Status("Move failed".into()));
                }
            });
        }
        true
    }

    /// Current position string.
    #[must_use]
    pub fn fen(&self) -> String {
        self.shared.engine.lock().expect("engine lock").fen()
    }

    /// Side to move.
    #[must_use]
    pub fn turn(&self) -> Color {
        self.shared.engine.lock().expect("engine lock").turn()
    }

    /// Notation history of the current position.
    #[must_use]
    pub fn san_history(&self) -> Vec<String> {
        self.shared
            .engine
            .lock()
            .expect("engine lock")
            .san_history()
    }

    /// Id of the live game, when one is active.
    #[must_use]
    pub fn live_game_id(&self) -> Option<GameId> {
        self.shared
            .live
            .lock()
            .expect("live lock")
            .as_ref()
            .map(|l| l.game_id.clone())
    }

    /// Whether a queued or in-flight animation exists.
    #[must_use]
    pub fn is_presenting(&self) -> bool {
        self.shared.pipeline.is_animating() || self.shared.pipeline.queued() > 0
    }

    /// Tear everything down: account stream, live session, animation worker.
    pub fn shutdown(&self) {
        if let Some(token) = self.events_token.lock().expect("events lock").take() {
            token.cancel();
        }
        stop_session(&self.shared);
        self.shared.pipeline.close();
    }

    #[cfg(test)]
    pub(crate) fn shared_for_tests(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    fn interaction_mode(&self) -> InteractionMode {
        let live = self.shared.live.lock().expect("live lock");
        if let Some(live) = live.as_ref() {
            return InteractionMode::Live {
                assigned: live.color,
            };
        }
        drop(live);
        if self.shared.puzzle.lock().expect("puzzle lock").is_active() {
            InteractionMode::Puzzle
        } else {
            InteractionMode::Disabled
        }
    }

    fn fail_puzzle_load(&self) {
        self.shared
            .notify
            .send(Notification::PuzzleStatus(PuzzleStatus::Inactive));
        self.shared
            .notify
            .send(Notification::PuzzleRating("--".into()));
        self.shared
            .notify
            .send(Notification::Status("Puzzle load failed".into()));
    }

    /// Set up the board for a puzzle: from the source game's notation
    /// replayed to the puzzle ply, or from a ready-made position string.
    ///
    /// Reported plies are occasionally off by a little; nearby offsets are
    /// probed until the first solution move is legal.
    fn load_puzzle_position(
        &self,
        game: Option<&crate::protocol::PuzzleGame>,
        initial_ply: Option<usize>,
        solution: &[UciMove],
    ) -> bool {
        let mut engine = self.shared.engine.lock().expect("engine lock");
        let first = solution.first();
        if let Some(fen) = game.and_then(|g| g.fen.as_deref()) {
            return engine.load_fen(fen).is_ok()
                && first.is_none_or(|token| engine.is_legal(token));
        }
        let (Some(pgn), Some(ply)) = (game.and_then(|g| g.pgn.as_deref()), initial_ply) else {
            return false;
        };
        for offset in [0isize, 1, -1, 2, -2] {
            let Some(target) = ply.checked_add_signed(offset) else {
                continue;
            };
            if engine.load_pgn_to_ply(pgn, target).is_ok()
                && first.is_none_or(|token| engine.is_legal(token))
            {
                return true;
            }
        }
        false
    }
}

impl Drop for GameController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Register the engine listener that fans mutations out to the history
/// tracker, the animation pipeline and the notification channel.
fn wire_engine_listener(shared: &Arc<Shared>) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    shared
        .engine
        .lock()
        .expect("engine lock")
        .subscribe(move |engine| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let update = shared
                .history
                .lock()
                .expect("history lock")
                .update(engine.san_history());
            if let Some(history) = update {
                shared.notify.send(Notification::MoveHistory(history));
            }
            let fen = engine.fen();
            shared.pipeline.on_position_changed(&fen);
            shared.notify.send(Notification::Position {
                fen,
                turn: engine.turn(),
            });
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingView, ScriptedApi, ViewCall};

    fn controller() -> (GameController, UnboundedReceiver<Notification>) {
        let api = Arc::new(ScriptedApi::new());
        let view = Arc::new(RecordingView::new());
        GameController::new(api, view, ClientConfig::default()).unwrap()
    }

    fn intent(token: &str) -> MoveIntent {
        token.parse::<UciMove>().unwrap().intent()
    }

    #[tokio::test(start_paused = true)]
    async fn plain_moves_without_a_session_are_rejected_gracefully() {
        let (controller, _rx) = controller();
        // No live game and no puzzle: selection is gated off...
        assert_eq!(
            controller.square_clicked("e2".parse().unwrap()),
            SelectionOutcome::Ignored
        );
        // ...but a direct intent still validates against the rules.
        assert!(controller.submit_move(&intent("e2e4")));
        assert!(!controller.submit_move(&intent("e2e4")));
        assert_eq!(controller.san_history(), vec!["e4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_changes_reach_the_notification_channel() {
        let (controller, mut rx) = controller();
        controller.submit_move(&intent("e2e4"));

        let mut saw_history = false;
        let mut saw_position = false;
        while let Ok(n) = rx.try_recv() {
            match n {
                Notification::MoveHistory(moves) => {
                    saw_history = true;
                    assert_eq!(moves, vec!["e4"]);
                }
                Notification::Position { turn, .. } => {
                    saw_position = true;
                    assert_eq!(turn, Color::Black);
                }
                _ => {}
            }
        }
        assert!(saw_history);
        assert!(saw_position);
    }

    #[tokio::test(start_paused = true)]
    async fn animated_move_suppresses_the_redundant_resync() {
        let api = Arc::new(ScriptedApi::new());
        let view = Arc::new(RecordingView::new());
        let (controller, _rx) =
            GameController::new(api, view.clone(), ClientConfig::default()).unwrap();

        controller.submit_move(&intent("e2e4"));
        controller.shared.pipeline.idle().await;

        let calls = view.calls();
        assert!(calls.iter().any(|c| matches!(c, ViewCall::Animate { .. })));
        assert!(
            !calls.iter().any(|c| matches!(c, ViewCall::Resync { .. })),
            "the queued animation already covers the change"
        );
    }
}
