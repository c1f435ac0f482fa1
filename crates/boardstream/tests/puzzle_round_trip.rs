use std::sync::Arc;
use std::time::Duration;

use boardstream::config::ClientConfig;
use boardstream::controller::GameController;
use boardstream::error::ClientError;
use boardstream::notify::Notification;
use boardstream::testing::{RecordingView, ScriptedApi};
use boardstream::types::{MoveIntent, PuzzleStatus, UciMove};
use tokio::sync::mpsc::UnboundedReceiver;

const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

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
    for _ in 0..5_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn intent(token: &str) -> MoveIntent {
    token.parse::<UciMove>().unwrap().intent()
}

fn statuses(rx: &mut UnboundedReceiver<Notification>) -> Vec<PuzzleStatus> {
    let mut seen = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        if let Notification::PuzzleStatus(status) = notification {
            seen.push(status);
        }
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn solving_a_puzzle_reports_a_win() {
    let (api, controller, mut rx) = setup();
    api.queue_puzzle(Ok(serde_json::from_str(
        r#"{
            "puzzle": {"id": "pz-win", "rating": 1600, "solution": ["g1f3", "b8c6", "f1b5"], "initialPly": 2},
            "game": {"pgn": "1. e4 e5"}
        }"#,
    )
    .unwrap()));

    controller.start_puzzle().await.unwrap();
    assert_eq!(controller.san_history(), vec!["e4", "e5"]);
    let loaded = statuses(&mut rx);
    assert_eq!(loaded.last(), Some(&PuzzleStatus::Loaded));

    // The correct first move triggers the scripted reply.
    assert!(controller.submit_move(&intent("g1f3")));
    assert_eq!(controller.san_history(), vec!["e4", "e5", "Nf3", "Nc6"]);
    assert!(statuses(&mut rx).is_empty(), "the attempt is still running");

    assert!(controller.submit_move(&intent("f1b5")));
    assert_eq!(statuses(&mut rx), vec![PuzzleStatus::Solved]);

    wait_for("win report", || api.puzzle_reports().len() == 1).await;
    let report = &api.puzzle_reports()[0];
    assert_eq!(report.id, "pz-win");
    assert!(report.win);
}

#[tokio::test(start_paused = true)]
async fn wrong_move_reports_a_single_loss() {
    let (api, controller, mut rx) = setup();
    api.queue_puzzle(Ok(serde_json::from_str(&format!(
        r#"{{
            "puzzle": {{"id": "pz-fail", "solution": ["d2d4"]}},
            "game": {{"fen": "{STARTPOS}"}}
        }}"#,
    ))
    .unwrap()));

    controller.start_puzzle().await.unwrap();
    let _ = statuses(&mut rx);

    // Legal but wrong.
    assert!(controller.submit_move(&intent("e2e4")));
    assert_eq!(statuses(&mut rx), vec![PuzzleStatus::Failed]);
    wait_for("loss report", || api.puzzle_reports().len() == 1).await;
    assert!(!api.puzzle_reports()[0].win);

    // Further moves are ordinary play; no second report appears.
    assert!(controller.submit_move(&intent("e7e5")));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.puzzle_reports().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unusable_puzzle_position_is_rejected() {
    let (api, controller, mut rx) = setup();
    api.queue_puzzle(Ok(serde_json::from_str(&format!(
        r#"{{
            "puzzle": {{"id": "pz-bad", "solution": ["e2e5"]}},
            "game": {{"fen": "{STARTPOS}"}}
        }}"#,
    ))
    .unwrap()));

    let err = controller.start_puzzle().await.unwrap_err();
    assert!(matches!(err, ClientError::PuzzleUnusable { ref id } if id == "pz-bad"));
    assert_eq!(statuses(&mut rx).last(), Some(&PuzzleStatus::Inactive));

    // Nothing was reported for an attempt that never started.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(api.puzzle_reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn consecutive_puzzles_wait_out_the_fetch_gap() {
    let (api, controller, _rx) = setup();
    api.queue_puzzle(Ok(serde_json::from_str(&format!(
        r#"{{"puzzle": {{"id": "one", "solution": ["e2e4"]}}, "game": {{"fen": "{STARTPOS}"}}}}"#,
    ))
    .unwrap()));
    api.queue_puzzle(Ok(serde_json::from_str(&format!(
        r#"{{"puzzle": {{"id": "two", "solution": ["e2e4"]}}, "game": {{"fen": "{STARTPOS}"}}}}"#,
    ))
    .unwrap()));

    let start = tokio::time::Instant::now();
    controller.start_puzzle().await.unwrap();
    controller.start_puzzle().await.unwrap();
    assert!(
        start.elapsed() >= Duration::from_millis(1200),
        "the second fetch must respect the minimum gap"
    );
    assert_eq!(api.puzzle_fetch_count(), 2);
}
