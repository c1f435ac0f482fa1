//! Account-wide event dispatch.
//!
//! Consumes the account event stream: challenges are surfaced to the
//! application, a game start spawns (or retargets) the live session.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::controller::{Shared, start_game};
use crate::notify::Notification;
use crate::protocol::{AccountEvent, ChallengeEvent, LineBuffer};
use crate::types::{ChallengeInfo, GameId};

pub(crate) async fn run_account_stream(shared: Arc<Shared>, token: CancellationToken) {
    let mut stream = match shared.api.stream_events().await {
        Ok(stream) => stream,
        Err(error) => {
            tracing::warn!(%error, "account event stream failed to open");
            shared
                .notify
                .send(Notification::Status("Event stream failed".into()));
            return;
        }
    };
    let mut lines = LineBuffer::new();
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            chunk = stream.next() => match chunk {
                None => {
                    tracing::debug!("account event stream ended");
                    return;
                }
                Some(Err(error)) => {
                    tracing::warn!(%error, "account event stream failed");
                    return;
                }
                Some(Ok(bytes)) => {
                    for line in lines.push(&bytes) {
                        if line.trim().is_empty() {
                            continue;
                        }
                        handle_line(&shared, &line);
                    }
                }
            }
        }
    }
}

fn handle_line(shared: &Arc<Shared>, line: &str) {
    match serde_json::from_str::<AccountEvent>(line) {
        Ok(AccountEvent::Challenge { challenge }) => {
            tracing::info!(challenge = %challenge.id, "incoming challenge");
            shared
                .notify
                .send(Notification::Challenge(challenge_info(&challenge)));
        }
        Ok(AccountEvent::GameStart { game }) => {
            let Some(id) = game.and_then(|g| g.id) else {
                return;
            };
            shared
                .notify
                .send(Notification::Status("Connecting...".into()));
            start_game(shared, GameId::new(id));
        }
        Ok(AccountEvent::GameFinish { .. }) => {}
        Err(error) => {
            tracing::debug!(%error, "skipping unreadable account event");
        }
    }
}

fn challenge_info(challenge: &ChallengeEvent) -> ChallengeInfo {
    ChallengeInfo {
        id: challenge.id.clone(),
        from: challenge
            .challenger
            .as_ref()
            .map_or_else(|| "Anonymous".to_string(), |c| c.label("Anonymous")),
        rated: challenge.rated.unwrap_or(false),
        time_label: challenge.time_label(),
        variant: challenge
            .variant
            .as_ref()
            .and_then(|v| v.name.clone())
            .unwrap_or_else(|| "Standard".into()),
    }
}
