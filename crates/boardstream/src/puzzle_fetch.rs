//! Puzzle acquisition.
//!
//! The puzzle endpoint throttles aggressively, so fetches are spaced by a
//! minimum gap, throttled responses honor the server's wait hint (with a
//! fixed fallback window), and a short ring of recently served puzzle ids is
//! used to re-request when the server repeats itself.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::{ApiError, BoardApi};
use crate::config::ClientConfig;
use crate::protocol::PuzzleResponse;

/// A fetched puzzle, with a marker for when the server insisted on serving
/// the same puzzle again.
#[derive(Debug, Clone)]
pub struct FetchedPuzzle {
    pub response: PuzzleResponse,
    pub repeated: bool,
}

/// Stateful puzzle fetcher with throttling and duplicate avoidance.
pub struct PuzzleFetcher {
    api: Arc<dyn BoardApi>,
    min_gap: Duration,
    backoff_initial: Duration,
    attempts: u32,
    throttle_fallback: Duration,
    dedup_attempts: u32,
    dedup_pause: Duration,
    recent_capacity: usize,
    last_fetch: Option<Instant>,
    throttled_until: Option<Instant>,
    recent: VecDeque<String>,
    last_id: Option<String>,
}

impl PuzzleFetcher {
    #[must_use]
    pub fn new(api: Arc<dyn BoardApi>, config: &ClientConfig) -> Self {
        Self {
            api,
            min_gap: config.puzzle_min_fetch_gap,
            backoff_initial: config.puzzle_backoff_initial,
            attempts: config.puzzle_fetch_attempts,
            throttle_fallback: config.puzzle_rate_limit_fallback,
            dedup_attempts: config.puzzle_dedup_attempts,
            dedup_pause: config.puzzle_dedup_pause,
            recent_capacity: config.puzzle_recent_capacity,
            last_fetch: None,
            throttled_until: None,
            recent: VecDeque::new(),
            last_id: None,
        }
    }

    /// Fetch the next puzzle, waiting out the fetch gap and any active
    /// throttle window first.
    pub async fn fetch_next(&mut self) -> Result<FetchedPuzzle, ApiError> {
        if let Some(last) = self.last_fetch {
            let next_allowed = last + self.min_gap;
            let now = Instant::now();
            if next_allowed > now {
                tokio::time::sleep(next_allowed - now).await;
            }
        }
        if let Some(until) = self.throttled_until {
            let now = Instant::now();
            if until > now {
                tokio::time::sleep(until - now).await;
            }
        }

        let mut response = self.request_with_backoff().await?;

        // The server occasionally replays a recent puzzle; ask again a few
        // times before accepting it.
        for _ in 0..self.dedup_attempts {
            if !self.recent.contains(&response.puzzle.id) {
                break;
            }
            tracing::debug!(puzzle = %response.puzzle.id, "recently seen puzzle, re-requesting");
            tokio::time::sleep(self.dedup_pause).await;
            response = self.request_with_backoff().await?;
        }

        let id = response.puzzle.id.clone();
        let repeated = self.last_id.as_deref() == Some(id.as_str());
        self.recent.push_back(id.clone());
        while self.recent.len() > self.recent_capacity {
            self.recent.pop_front();
        }
        self.last_id = Some(id);
        tracing::debug!(
            puzzle = self.last_id.as_deref().unwrap_or(""),
            repeated,
            "puzzle fetched"
        );
        Ok(FetchedPuzzle { response, repeated })
    }

    async fn request_with_backoff(&mut self) -> Result<PuzzleResponse, ApiError> {
        let mut delay = self.backoff_initial;
        let mut last_error = None;
        for attempt in 0..self.attempts {
            match self.api.fetch_puzzle().await {
                Ok(response) => {
                    self.last_fetch = Some(Instant::now());
                    return Ok(response);
                }
                Err(ApiError::RateLimited { retry_after }) => {
                    let window = retry_after.unwrap_or(self.throttle_fallback);
                    let until = Instant::now() + window;
                    self.throttled_until = Some(
                        self.throttled_until
                            .map_or(until, |current| current.max(until)),
                    );
                    tracing::warn!(
                        attempt,
                        window_ms = window.as_millis() as u64,
                        "puzzle fetch throttled"
                    );
                    last_error = Some(ApiError::RateLimited { retry_after });
                    if attempt + 1 < self.attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_error.unwrap_or(ApiError::RateLimited { retry_after: None }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedApi;

    fn puzzle(id: &str) -> PuzzleResponse {
        serde_json::from_str(&format!(
            r#"{{"puzzle": {{"id": "{id}", "solution": ["e2e4"]}}}}"#
        ))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_fetches_are_spaced() {
        let api = Arc::new(ScriptedApi::new());
        api.queue_puzzle(Ok(puzzle("one")));
        api.queue_puzzle(Ok(puzzle("two")));
        let mut fetcher = PuzzleFetcher::new(api.clone(), &ClientConfig::default());

        let start = Instant::now();
        fetcher.fetch_next().await.unwrap();
        fetcher.fetch_next().await.unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(1200),
            "second fetch must wait out the minimum gap"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_fetch_backs_off_and_retries() {
        let api = Arc::new(ScriptedApi::new());
        api.queue_puzzle(Err(ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        }));
        api.queue_puzzle(Ok(puzzle("fresh")));
        let mut fetcher = PuzzleFetcher::new(api.clone(), &ClientConfig::default());

        let fetched = fetcher.fetch_next().await.unwrap();
        assert_eq!(fetched.response.puzzle.id, "fresh");
        assert_eq!(api.puzzle_fetch_count(), 2);

        // The throttle window from the hint still applies to the next fetch.
        api.queue_puzzle(Ok(puzzle("later")));
        let start = Instant::now();
        fetcher.fetch_next().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_throttling_gives_up() {
        let api = Arc::new(ScriptedApi::new());
        for _ in 0..3 {
            api.queue_puzzle(Err(ApiError::RateLimited { retry_after: None }));
        }
        let mut fetcher = PuzzleFetcher::new(api.clone(), &ClientConfig::default());
        let err = fetcher.fetch_next().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { .. }));
        assert_eq!(api.puzzle_fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn recently_seen_puzzle_triggers_a_replacement_request() {
        let api = Arc::new(ScriptedApi::new());
        api.queue_puzzle(Ok(puzzle("dup")));
        api.queue_puzzle(Ok(puzzle("dup")));
        api.queue_puzzle(Ok(puzzle("new")));
        let mut fetcher = PuzzleFetcher::new(api.clone(), &ClientConfig::default());

        let first = fetcher.fetch_next().await.unwrap();
        assert_eq!(first.response.puzzle.id, "dup");

        let second = fetcher.fetch_next().await.unwrap();
        assert_eq!(second.response.puzzle.id, "new");
        assert!(!second.repeated);
        assert_eq!(api.puzzle_fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_dedup_marks_the_puzzle_repeated() {
        let api = Arc::new(ScriptedApi::new());
        for _ in 0..7 {
            api.queue_puzzle(Ok(puzzle("stuck")));
        }
        let mut fetcher = PuzzleFetcher::new(api.clone(), &ClientConfig::default());

        let first = fetcher.fetch_next().await.unwrap();
        assert!(!first.repeated);
        let second = fetcher.fetch_next().await.unwrap();
        assert_eq!(second.response.puzzle.id, "stuck");
        assert!(second.repeated, "same id twice in a row is a repeat");
    }

    #[tokio::test(start_paused = true)]
    async fn non_throttle_errors_surface_immediately() {
        let api = Arc::new(ScriptedApi::new());
        api.queue_puzzle(Err(ApiError::Status { status: 500 }));
        let mut fetcher = PuzzleFetcher::new(api.clone(), &ClientConfig::default());
        let err = fetcher.fetch_next().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500 }));
        assert_eq!(api.puzzle_fetch_count(), 1);
    }
}
