use std::sync::Arc;
use std::time::Duration;

use boardstream::config::ClientConfig;
use boardstream::controller::GameController;
use boardstream::notify::Notification;
use boardstream::testing::{RecordingView, ScriptedApi};
use boardstream::types::{ConnectionState, GameId};
use tokio::sync::mpsc::UnboundedReceiver;

fn setup() -> (
    Arc<ScriptedApi>,
    GameController,
    UnboundedReceiver<Notification>,
) {
    let api = Arc::new(ScriptedApi::new());
    let view = Arc::new(RecordingView::new());
    let (controller, rx) =
        GameController::new(api.clone(), view, ClientConfig::default()).unwrap();
    (api, controller, rx)
}

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn connection_states(rx: &mut UnboundedReceiver<Notification>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        if let Notification::Connection(state) = notification {
            states.push(state);
        }
    }
    states
}

#[tokio::test(start_paused = true)]
async fn silent_stream_is_aborted_and_retried_once() {
    let (api, controller, mut rx) = setup();
    controller.start_game(GameId::new("g1"));
    wait_for("first connection", || api.game_stream_count() == 1).await;

    // No messages at all: the watchdog must cut the connection and the loop
    // must come back for a second attempt.
    wait_for("reconnection after staleness", || {
        api.game_stream_count() >= 2
    })
    .await;

    let states = connection_states(&mut rx);
    assert_eq!(
        states
            .iter()
            .filter(|s| matches!(s, ConnectionState::Stale))
            .count(),
        1
    );
    assert_eq!(
        states
            .iter()
            .filter(|s| matches!(s, ConnectionState::RetryScheduled))
            .count(),
        1,
        "only one retry may be scheduled per failed attempt"
    );
    assert!(controller.live_game_id().is_some());
}

#[tokio::test(start_paused = true)]
async fn transport_error_schedules_a_reconnect() {
    let (api, controller, mut rx) = setup();
    controller.start_game(GameId::new("g1"));
    wait_for("first connection", || api.game_stream_count() == 1).await;

    api.fail_game_stream("connection reset");
    wait_for("reconnection after failure", || {
        api.game_stream_count() >= 2
    })
    .await;

    let states = connection_states(&mut rx);
    assert!(
        states
            .iter()
            .any(|s| matches!(s, ConnectionState::RetryScheduled)),
        "a transport error must lead to a scheduled retry, got {states:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn new_session_replaces_the_previous_one() {
    let (api, controller, mut rx) = setup();
    controller.start_game(GameId::new("first"));
    wait_for("first connection", || api.game_stream_count() == 1).await;

    controller.start_game(GameId::new("second"));
    wait_for("second connection", || api.game_stream_count() >= 2).await;

    assert_eq!(controller.live_game_id(), Some(GameId::new("second")));

    // The replaced session announces its closure.
    wait_for("old session teardown", || {
        connection_states(&mut rx)
            .iter()
            .any(|s| matches!(s, ConnectionState::Closed))
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn account_game_start_event_opens_the_game_stream() {
    let (api, controller, _rx) = setup();
    controller.connect();

    // The push succeeds once the account stream is open.
    wait_for("account stream to accept events", || {
        api.push_account_line(r#"{"type":"gameStart","game":{"id":"evt-game"}}"#)
    })
    .await;

    wait_for("live session from the event", || {
        controller.live_game_id() == Some(GameId::new("evt-game"))
    })
    .await;
    wait_for("game stream spawned by the event", || {
        api.game_stream_count() >= 1
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_stream_and_session() {
    let (api, controller, mut rx) = setup();
    controller.start_game(GameId::new("g1"));
    wait_for("first connection", || api.game_stream_count() == 1).await;

    controller.shutdown();
    assert!(controller.live_game_id().is_none());
    wait_for("closed notification", || {
        connection_states(&mut rx)
            .iter()
            .any(|s| matches!(s, ConnectionState::Closed))
    })
    .await;

    // The cancelled loop must not reconnect.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.game_stream_count(), 1);
}
