//! Board console - scripted walkthrough of the boardstream core.
//!
//! Stands a console renderer and an in-memory service behind the controller,
//! then replays a short live game followed by a puzzle attempt.
//!
//! Run with: `cargo run --package board-console`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use boardstream::config::ClientConfig;
use boardstream::controller::GameController;
use boardstream::notify::Notification;
use boardstream::queue::BoardView;
use boardstream::testing::ScriptedApi;
use boardstream::types::{Color, GameId, PieceType, Square, UciMove};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Renderer stand-in that narrates what a scene graph would do.
struct ConsoleView;

#[async_trait]
impl BoardView for ConsoleView {
    async fn animate_move(&self, from: Square, to: Square) {
        println!("  [view] animating {from} -> {to}");
        tokio::time::sleep(Duration::from_millis(260)).await;
    }

    fn capture_piece(&self, square: Square) {
        println!("  [view] capture on {square}, piece moved to the tray");
    }

    fn relocate_piece(&self, from: Square, to: Square) {
        println!("  [view] rook {from} -> {to}");
    }

    fn promote_piece(&self, square: Square, color: Color, piece: PieceType) {
        println!("  [view] {color} piece on {square} becomes a {piece:?}");
    }

    fn resync(&self, fen: &str) {
        println!("  [view] full rebuild from {fen}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("boardstream=info".parse()?))
        .init();

    tracing::info!("board console starting");
    let api = Arc::new(ScriptedApi::new());
    let (controller, mut notifications) =
        GameController::new(api.clone(), Arc::new(ConsoleView), ClientConfig::default())?;

    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification {
                Notification::MoveHistory(moves) => println!("history: {}", moves.join(" ")),
                Notification::Clocks { white, black } => println!("clocks: {white} | {black}"),
                Notification::Connection(state) => println!("connection: {state}"),
                Notification::Players { white, black, .. } => {
                    println!("players: {white} vs {black}");
                }
                Notification::ResultText(text) if text != "--" => println!("result: {text}"),
                Notification::GameEnded(summary) => {
                    println!(
                        "summary: {} vs {} ({:+} / {:+})",
                        summary.white,
                        summary.black,
                        summary.white_rating_diff.unwrap_or(0),
                        summary.black_rating_diff.unwrap_or(0),
                    );
                }
                Notification::PuzzleStatus(status) => println!("puzzle: {status}"),
                _ => {}
            }
        }
    });

    println!("== live game ==");
    controller.start_game(GameId::new("demo"));
    while api.game_stream_count() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    api.push_game_line(
        r#"{"type":"gameFull","white":{"id":"me","name":"Me","rating":1500},"black":{"id":"carlos","name":"Carlos","rating":1540},"rated":true,"state":{"type":"gameState","moves":"","wtime":180000,"btime":180000}}"#,
    );
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The server reports the game move by move; each new suffix animates.
    for moves in ["e2e4", "e2e4 e7e5", "e2e4 e7e5 g1f3", "e2e4 e7e5 g1f3 b8c6"] {
        api.push_game_line(&format!(
            r#"{{"type":"gameState","moves":"{moves}","wtime":175000,"btime":176000}}"#
        ));
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    api.push_game_line(
        r#"{"type":"gameState","moves":"e2e4 e7e5 g1f3 b8c6","status":"resign","winner":"white"}"#,
    );
    tokio::time::sleep(Duration::from_secs(4)).await;

    println!("== puzzle ==");
    api.queue_puzzle(Ok(serde_json_puzzle()?));
    controller.start_puzzle().await?;
    for token in ["g1f3", "f1b5"] {
        let intent = token
            .parse::<UciMove>()
            .map_err(|e| anyhow::anyhow!(e))?
            .intent();
        controller.submit_move(&intent);
        tokio::time::sleep(Duration::from_millis(600)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    controller.shutdown();
    Ok(())
}

fn serde_json_puzzle() -> Result<boardstream::protocol::PuzzleResponse> {
    // Italian-opening warmup: play the two white moves, the reply is scripted.
    let raw = r#"{
        "puzzle": {"id": "demo-puzzle", "rating": 1500, "solution": ["g1f3", "b8c6", "f1b5"], "initialPly": 2},
        "game": {"pgn": "1. e4 e5"}
    }"#;
    Ok(serde_json::from_str(raw)?)
}
