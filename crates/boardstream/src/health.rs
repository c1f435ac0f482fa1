//! Connection health for one game stream.
//!
//! Tracks silence on the stream, aborts a stalled connection attempt, and
//! guards retry scheduling so at most one retry is ever pending. The session
//! token covers the whole logical connection slot; each attempt gets a child
//! token so a staleness abort never tears down the session itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Health and retry state owned by one game stream loop.
pub struct StreamHealth {
    /// Milliseconds since `epoch` of the last received message.
    last_message_ms: AtomicU64,
    epoch: Instant,
    retry_pending: AtomicBool,
    session: CancellationToken,
    attempt: Mutex<CancellationToken>,
}

impl StreamHealth {
    #[must_use]
    pub fn new(session: CancellationToken) -> Self {
        let attempt = session.child_token();
        Self {
            last_message_ms: AtomicU64::new(0),
            epoch: Instant::now(),
            retry_pending: AtomicBool::new(false),
            session,
            attempt: Mutex::new(attempt),
        }
    }

    /// Start a fresh connection attempt: returns its cancellation token and
    /// resets the silence measurement. Any previous attempt is cancelled.
    pub fn begin_attempt(&self) -> CancellationToken {
        let token = self.session.child_token();
        {
            let mut current = self.attempt.lock().expect("attempt lock");
            current.cancel();
            *current = token.clone();
        }
        self.touch();
        token
    }

    /// Record that a message arrived.
    pub fn touch(&self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.last_message_ms.store(now_ms, Ordering::Release);
    }

    /// Time since the last recorded message.
    #[must_use]
    pub fn silence(&self) -> Duration {
        let last = self.last_message_ms.load(Ordering::Acquire);
        self.epoch
            .elapsed()
            .saturating_sub(Duration::from_millis(last))
    }

    /// Cancel the current connection attempt (not the session).
    pub fn abort_attempt(&self) {
        self.attempt.lock().expect("attempt lock").cancel();
    }

    /// Try to claim the single pending retry slot. Returns `false` when a
    /// retry is already scheduled, making scheduling idempotent.
    pub fn schedule_retry(&self) -> bool {
        self.retry_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the retry slot once the retry has fired (or been abandoned).
    pub fn clear_retry(&self) {
        self.retry_pending.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.retry_pending.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn session_token(&self) -> &CancellationToken {
        &self.session
    }

    /// Spawn the staleness watchdog for the current attempt. Checks every
    /// `poll_interval`; silence beyond `stale_after` aborts the attempt and
    /// ends the watchdog.
    pub fn spawn_watchdog(
        self: &Arc<Self>,
        poll_interval: Duration,
        stale_after: Duration,
    ) -> JoinHandle<()> {
        let health = Arc::clone(self);
        let attempt = health.attempt.lock().expect("attempt lock").clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = attempt.cancelled() => return,
                    () = tokio::time::sleep(poll_interval) => {}
                }
                let silence = health.silence();
                if silence > stale_after {
                    tracing::warn!(
                        silence_ms = silence.as_millis() as u64,
                        "game stream went silent, aborting connection"
                    );
                    attempt.cancel();
                    return;
                }
            }
        })
    }
}

impl std::fmt::Debug for StreamHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHealth")
            .field("silence", &self.silence())
            .field("retry_pending", &self.retry_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_scheduling_is_idempotent() {
        let health = StreamHealth::new(CancellationToken::new());
        assert!(health.schedule_retry());
        assert!(!health.schedule_retry(), "second schedule must be a no-op");
        health.clear_retry();
        assert!(health.schedule_retry());
    }

    #[test]
    fn begin_attempt_cancels_the_previous_one() {
        let health = StreamHealth::new(CancellationToken::new());
        let first = health.begin_attempt();
        let second = health.begin_attempt();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn session_cancel_reaches_attempts() {
        let session = CancellationToken::new();
        let health = StreamHealth::new(session.clone());
        let attempt = health.begin_attempt();
        session.cancel();
        assert!(attempt.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_aborts_a_silent_stream() {
        let health = Arc::new(StreamHealth::new(CancellationToken::new()));
        let attempt = health.begin_attempt();
        let watchdog =
            health.spawn_watchdog(Duration::from_secs(4), Duration::from_secs(12));

        tokio::time::sleep(Duration::from_secs(13)).await;
        watchdog.await.unwrap();
        assert!(attempt.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_spares_an_active_stream() {
        let health = Arc::new(StreamHealth::new(CancellationToken::new()));
        let attempt = health.begin_attempt();
        let _watchdog =
            health.spawn_watchdog(Duration::from_secs(4), Duration::from_secs(12));

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            health.touch();
        }
        assert!(!attempt.is_cancelled());
        attempt.cancel();
    }
}
