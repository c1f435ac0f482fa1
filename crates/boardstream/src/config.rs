use std::time::Duration;

use crate::error::ClientError;

/// Timing and retry knobs for the client core.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Abort a game stream after this much silence. Default: 12s.
    pub stream_stale_timeout: Duration,
    /// How often the staleness watchdog checks. Default: 4s.
    pub stream_health_poll_interval: Duration,
    /// Delay before reconnecting a dropped game stream. Default: 1.2s.
    pub stream_retry_delay: Duration,
    /// Local clock correction interval. Default: 250ms.
    pub clock_tick_interval: Duration,
    /// Visual move transition length, for views that honor it. Default: 260ms.
    pub animation_duration: Duration,
    /// Minimum gap between consecutive puzzle fetches. Default: 1.2s.
    pub puzzle_min_fetch_gap: Duration,
    /// Initial backoff after a throttled puzzle fetch, doubled per attempt.
    /// Default: 600ms.
    pub puzzle_backoff_initial: Duration,
    /// Attempts per puzzle request before giving up on throttling. Default: 3.
    pub puzzle_fetch_attempts: u32,
    /// Throttle window applied when the server gives no retry hint.
    /// Default: 4s.
    pub puzzle_rate_limit_fallback: Duration,
    /// How many times to re-request when a recently seen puzzle comes back.
    /// Default: 5.
    pub puzzle_dedup_attempts: u32,
    /// Pause between duplicate-puzzle re-requests. Default: 200ms.
    pub puzzle_dedup_pause: Duration,
    /// Ring size for recently served puzzle ids. Default: 5.
    pub puzzle_recent_capacity: usize,
    /// Attempts when polling for settled rating diffs after a game ends.
    /// Default: 4.
    pub summary_poll_attempts: u32,
    /// First delay between summary polls, grown by the factor below.
    /// Default: 700ms.
    pub summary_poll_initial_delay: Duration,
    /// Multiplier applied to the summary poll delay per attempt. Default: 1.6.
    pub summary_poll_backoff_factor: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stream_stale_timeout: Duration::from_secs(12),
            stream_health_poll_interval: Duration::from_secs(4),
            stream_retry_delay: Duration::from_millis(1200),
            clock_tick_interval: Duration::from_millis(250),
            animation_duration: Duration::from_millis(260),
            puzzle_min_fetch_gap: Duration::from_millis(1200),
            puzzle_backoff_initial: Duration::from_millis(600),
            puzzle_fetch_attempts: 3,
            puzzle_rate_limit_fallback: Duration::from_secs(4),
            puzzle_dedup_attempts: 5,
            puzzle_dedup_pause: Duration::from_millis(200),
            puzzle_recent_capacity: 5,
            summary_poll_attempts: 4,
            summary_poll_initial_delay: Duration::from_millis(700),
            summary_poll_backoff_factor: 1.6,
        }
    }
}

impl ClientConfig {
    /// Validate configuration values.
    ///
    /// Checks that every interval driving a polling loop is non-zero (a zero
    /// interval would spin) and that attempt caps are at least one.
    pub fn validate(&self) -> Result<(), ClientError> {
        for (name, value) in [
            ("stream_stale_timeout", self.stream_stale_timeout),
            (
                "stream_health_poll_interval",
                self.stream_health_poll_interval,
            ),
            ("stream_retry_delay", self.stream_retry_delay),
            ("clock_tick_interval", self.clock_tick_interval),
        ] {
            if value.is_zero() {
                return Err(ClientError::InvalidConfig {
                    reason: format!("{name} must be non-zero"),
                });
            }
        }
        if self.puzzle_fetch_attempts == 0 {
            return Err(ClientError::InvalidConfig {
                reason: "puzzle_fetch_attempts must be >= 1".into(),
            });
        }
        if self.summary_poll_attempts == 0 {
            return Err(ClientError::InvalidConfig {
                reason: "summary_poll_attempts must be >= 1".into(),
            });
        }
        if self.puzzle_recent_capacity == 0 {
            return Err(ClientError::InvalidConfig {
                reason: "puzzle_recent_capacity must be >= 1".into(),
            });
        }
        if self.summary_poll_backoff_factor < 1.0 {
            return Err(ClientError::InvalidConfig {
                reason: format!(
                    "summary_poll_backoff_factor must be >= 1.0, got {}",
                    self.summary_poll_backoff_factor
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ClientConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_interval_rejected() {
        let config = ClientConfig {
            clock_tick_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("clock_tick_interval"));
    }

    #[test]
    fn zero_attempt_cap_rejected() {
        let config = ClientConfig {
            summary_poll_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
