//! Live-game stream reconciliation.
//!
//! One loop per live session: connect, read NDJSON events, fold them into
//! the rules engine and the animation queue, reconnect on failure or
//! staleness. The incoming move-token list is authoritative; when the local
//! list is a strict prefix of it only the suffix is replayed (keeping the
//! animation), anything else forces a full reload with animation dropped.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, EventStream};
use crate::clock::ClockState;
use crate::controller::{Shared, stop_session};
use crate::health::StreamHealth;
use crate::notify::Notification;
use crate::protocol::{GameEvent, GameFull, LineBuffer, StateUpdate};
use crate::types::{Color, ConnectionState, GameId, GameStatus, GameSummary, UciMove};

/// Per-session live game state.
#[derive(Debug)]
pub(crate) struct LiveGame {
    pub(crate) game_id: GameId,
    /// Side this account plays, once known.
    pub(crate) color: Option<Color>,
    /// Starting position for non-standard games.
    pub(crate) initial_fen: Option<String>,
    /// Move tokens known to have been applied, oldest first.
    pub(crate) known_moves: Vec<UciMove>,
    pub(crate) clock: ClockState,
    pub(crate) token: CancellationToken,
}

impl LiveGame {
    pub(crate) fn new(game_id: GameId, token: CancellationToken) -> Self {
        Self {
            game_id,
            color: None,
            initial_fen: None,
            known_moves: Vec::new(),
            clock: ClockState::new(),
            token,
        }
    }
}

enum AttemptEnd {
    /// Server closed the stream.
    Ended,
    /// The attempt token was cancelled (staleness or teardown).
    Aborted,
    Transport(ApiError),
}

/// Connection loop for one live session. Runs until the session token is
/// cancelled; every failed or stalled attempt schedules exactly one retry.
pub(crate) async fn run_game_stream(
    shared: Arc<Shared>,
    game_id: GameId,
    session: CancellationToken,
) {
    let health = Arc::new(StreamHealth::new(session.clone()));
    loop {
        if session.is_cancelled() {
            break;
        }
        shared
            .notify
            .send(Notification::Connection(ConnectionState::Connecting));
        let attempt = health.begin_attempt();
        match shared.api.stream_game(&game_id).await {
            Ok(stream) => {
                shared
                    .notify
                    .send(Notification::Connection(ConnectionState::Streaming));
                let watchdog = health.spawn_watchdog(
                    shared.config.stream_health_poll_interval,
                    shared.config.stream_stale_timeout,
                );
                let end = read_attempt(&shared, &game_id, stream, &attempt, &health).await;
                health.abort_attempt();
                watchdog.abort();
                match end {
                    AttemptEnd::Ended => {
                        tracing::debug!(game = %game_id, "game stream ended");
                    }
                    AttemptEnd::Aborted if !session.is_cancelled() => {
                        shared
                            .notify
                            .send(Notification::Connection(ConnectionState::Stale));
                    }
                    AttemptEnd::Aborted => {}
                    AttemptEnd::Transport(error) => {
                        tracing::warn!(game = %game_id, %error, "game stream failed");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(game = %game_id, %error, "game stream connect failed");
            }
        }
        if session.is_cancelled() {
            break;
        }
        if health.schedule_retry() {
            shared
                .notify
                .send(Notification::Connection(ConnectionState::RetryScheduled));
            tokio::select! {
                () = session.cancelled() => {
                    health.clear_retry();
                    break;
                }
                () = tokio::time::sleep(shared.config.stream_retry_delay) => {}
            }
            health.clear_retry();
        }
    }
    shared
        .notify
        .send(Notification::Connection(ConnectionState::Closed));
}

async fn read_attempt(
    shared: &Arc<Shared>,
    game_id: &GameId,
    mut stream: EventStream,
    attempt: &CancellationToken,
    health: &StreamHealth,
) -> AttemptEnd {
    let mut lines = LineBuffer::new();
    loop {
        tokio::select! {
            () = attempt.cancelled() => return AttemptEnd::Aborted,
            chunk = stream.next() => match chunk {
                None => return AttemptEnd::Ended,
                Some(Err(error)) => return AttemptEnd::Transport(error),
                Some(Ok(bytes)) => {
                    health.touch();
                    for line in lines.push(&bytes) {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<GameEvent>(&line) {
                            Ok(GameEvent::GameFull(full)) => apply_full(shared, game_id, &full),
                            Ok(GameEvent::GameState(state)) => apply_delta(shared, game_id, &state),
                            Err(error) => {
                                tracing::debug!(%error, "skipping unreadable stream line");
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Fold the opening full-state event into the session: the whole position is
/// reloaded, the queue dropped, identities and clocks refreshed.
pub(crate) fn apply_full(shared: &Arc<Shared>, game_id: &GameId, full: &GameFull) {
    let moves = full.state.move_list();
    let initial = full.initial_position().map(str::to_owned);

    shared.pipeline.clear();
    {
        let mut engine = shared.engine.lock().expect("engine lock");
        if let Err(error) = engine.load_from_moves(initial.as_deref(), &moves) {
            tracing::warn!(game = %game_id, %error, "full state replay failed");
        }
    }

    let color = full.orientation.or_else(|| {
        let account = shared.account_id.lock().expect("account lock").clone()?;
        if full.white.id.as_deref() == Some(account.as_str()) {
            Some(Color::White)
        } else if full.black.id.as_deref() == Some(account.as_str()) {
            Some(Color::Black)
        } else {
            None
        }
    });

    let white_label = full.white.label("White");
    let black_label = full.black.label("Black");
    *shared.last_summary.lock().expect("summary lock") = Some(GameSummary {
        game_id: Some(game_id.clone()),
        white: white_label.clone(),
        black: black_label.clone(),
        white_id: full.white.id.clone(),
        black_id: full.black.id.clone(),
        rated: full.rated,
        perf: full.perf_key().map(str::to_owned),
        player_color: color,
        white_rating_diff: full.white.rating_diff,
        black_rating_diff: full.black.rating_diff,
        ..GameSummary::default()
    });

    let engine_turn = shared.engine.lock().expect("engine lock").turn();
    let clock_display = {
        let mut live = shared.live.lock().expect("live lock");
        let Some(live) = live.as_mut().filter(|l| &l.game_id == game_id) else {
            tracing::debug!(game = %game_id, "full state for a session no longer active");
            return;
        };
        live.initial_fen = initial;
        live.known_moves = moves;
        live.color = color;
        live.clock.apply_server(
            full.state.wtime,
            full.state.btime,
            full.state.turn.unwrap_or(engine_turn),
        );
        live.clock.display()
    };

    shared.notify.send(Notification::Players {
        white: white_label,
        black: black_label,
        player_color: color,
    });
    shared.notify.send(Notification::Clocks {
        white: clock_display.0,
        black: clock_display.1,
    });
    shared.notify.send(Notification::Status("Live".into()));
    shared
        .notify
        .send(Notification::DrawOffer(full.state.draw_offer.unwrap_or(false)));

    if let Some(status) = full.state.status {
        resolve_result(shared, status, full.state.winner);
    }
}

/// Reconcile one incremental state event against the known move list.
pub(crate) fn apply_delta(shared: &Arc<Shared>, game_id: &GameId, state: &StateUpdate) {
    let incoming = state.move_list();
    let Some((known, initial)) = ({
        let live = shared.live.lock().expect("live lock");
        live.as_ref()
            .filter(|l| &l.game_id == game_id)
            .map(|l| (l.known_moves.clone(), l.initial_fen.clone()))
    }) else {
        tracing::debug!(game = %game_id, "state for a session no longer active");
        return;
    };

    let is_prefix =
        known.len() <= incoming.len() && known.iter().zip(&incoming).all(|(a, b)| a == b);
    if is_prefix {
        let mut replay_failed = false;
        {
            let mut engine = shared.engine.lock().expect("engine lock");
            for token in &incoming[known.len()..] {
                shared.pipeline.suppress_next_resync();
                match engine.apply_intent(&token.intent()) {
                    Some(applied) => shared.pipeline.submit(applied),
                    None => {
                        shared.pipeline.clear_suppression();
                        tracing::warn!(game = %game_id, token = %token, "suffix replay rejected");
                        replay_failed = true;
                        break;
                    }
                }
            }
        }
        if replay_failed {
            reload(shared, game_id, initial.as_deref(), &incoming);
        }
    } else {
        tracing::debug!(
            game = %game_id,
            known = known.len(),
            incoming = incoming.len(),
            "move list diverged, reloading"
        );
        reload(shared, game_id, initial.as_deref(), &incoming);
    }

    let engine_turn = shared.engine.lock().expect("engine lock").turn();
    let clock_display = {
        let mut live = shared.live.lock().expect("live lock");
        match live.as_mut().filter(|l| &l.game_id == game_id) {
            Some(live) => {
                live.known_moves = incoming;
                live.clock.apply_server(
                    state.wtime,
                    state.btime,
                    state.turn.unwrap_or(engine_turn),
                );
                Some(live.clock.display())
            }
            None => None,
        }
    };
    if let Some((white, black)) = clock_display {
        shared.notify.send(Notification::Clocks { white, black });
    }
    shared
        .notify
        .send(Notification::DrawOffer(state.draw_offer.unwrap_or(false)));

    if let Some(status) = state.status {
        resolve_result(shared, status, state.winner);
    }
}

/// Resync path: queued animation is dropped, the position is rebuilt from
/// scratch. Consistency over smoothness.
fn reload(shared: &Arc<Shared>, game_id: &GameId, initial: Option<&str>, moves: &[UciMove]) {
    shared.pipeline.clear();
    let mut engine = shared.engine.lock().expect("engine lock");
    if let Err(error) = engine.load_from_moves(initial, moves) {
        tracing::warn!(game = %game_id, %error, "full reload failed");
    }
}

/// Resolve a terminal status exactly once per game: emit the immediate
/// result line, tear the session down, then enrich the summary with rating
/// changes off-task.
pub(crate) fn resolve_result(shared: &Arc<Shared>, status: GameStatus, winner: Option<Color>) {
    if !status.is_terminal() {
        return;
    }
    let summary_base = shared
        .last_summary
        .lock()
        .expect("summary lock")
        .clone()
        .unwrap_or_default();
    let resolved_id = shared
        .live
        .lock()
        .expect("live lock")
        .as_ref()
        .map(|l| l.game_id.clone())
        .or_else(|| summary_base.game_id.clone());
    {
        let mut last = shared.last_result_game.lock().expect("result lock");
        if resolved_id.is_some() && *last == resolved_id {
            return;
        }
        last.clone_from(&resolved_id);
    }

    let result_text = if status == GameStatus::Draw {
        "Draw".to_string()
    } else {
        let winner_label = match winner {
            Some(Color::White) => "White",
            Some(Color::Black) => "Black",
            None => "Unknown",
        };
        format!("{winner_label} wins ({status})")
    };
    tracing::info!(game = ?resolved_id, %status, "game resolved: {result_text}");
    shared
        .notify
        .send(Notification::ResultText(result_text.clone()));

    let mut summary = summary_base;
    summary.game_id = summary.game_id.or(resolved_id);
    summary.result_text = Some(result_text);
    summary.status = Some(status);
    summary.winner = winner;
    *shared.last_summary.lock().expect("summary lock") = Some(summary.clone());

    stop_session(shared);

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let summary = enrich_summary(&shared, summary).await;
        *shared.last_summary.lock().expect("summary lock") = Some(summary.clone());
        shared.notify.send(Notification::GameEnded(summary));
    });
}

/// Rating changes may not be settled when the result arrives; poll the
/// summary endpoint a bounded number of times with a growing delay.
async fn enrich_summary(shared: &Arc<Shared>, mut summary: GameSummary) -> GameSummary {
    let Some(game_id) = summary.game_id.clone() else {
        return summary;
    };
    if summary.white_rating_diff.is_some() || summary.black_rating_diff.is_some() {
        return summary;
    }
    let attempts = shared.config.summary_poll_attempts;
    let mut delay = shared.config.summary_poll_initial_delay;
    for attempt in 0..attempts {
        match shared.api.fetch_game_summary(&game_id).await {
            Ok(diffs) if diffs.is_settled() => {
                summary.white_rating_diff = diffs.white;
                summary.black_rating_diff = diffs.black;
                return summary;
            }
            Ok(_) => {}
            Err(error) => {
                if attempt + 1 == attempts {
                    tracing::warn!(game = %game_id, %error, "game summary fetch failed");
                }
            }
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(delay).await;
            delay = delay.mul_f64(shared.config.summary_poll_backoff_factor);
        }
    }
    summary
}

/// Local clock correction between server updates: the side to move loses
/// elapsed wall-clock time, the other side is untouched.
pub(crate) async fn run_clock_ticker(shared: Arc<Shared>, session: CancellationToken) {
    let mut interval = tokio::time::interval(shared.config.clock_tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = session.cancelled() => return,
            _ = interval.tick() => {}
        }
        let display = {
            let mut live = shared.live.lock().expect("live lock");
            match live.as_mut() {
                Some(live) => live.clock.tick(Instant::now()).then(|| live.clock.display()),
                None => return,
            }
        };
        if let Some((white, black)) = display {
            shared.notify.send(Notification::Clocks { white, black });
        }
    }
}
