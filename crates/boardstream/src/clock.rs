//! Clock state and local correction between server ticks.

use std::time::Instant;

use crate::types::Color;

/// Remaining-time snapshot for both sides, corrected locally between server
/// updates.
#[derive(Debug, Clone)]
pub struct ClockState {
    pub white_ms: Option<u64>,
    pub black_ms: Option<u64>,
    pub turn: Color,
    pub last_update: Instant,
}

impl ClockState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            white_ms: None,
            black_ms: None,
            turn: Color::White,
            last_update: Instant::now(),
        }
    }

    /// Overwrite from a server snapshot. `None` fields keep their previous
    /// value.
    pub fn apply_server(&mut self, white_ms: Option<u64>, black_ms: Option<u64>, turn: Color) {
        if white_ms.is_some() {
            self.white_ms = white_ms;
        }
        if black_ms.is_some() {
            self.black_ms = black_ms;
        }
        self.turn = turn;
        self.last_update = Instant::now();
    }

    /// Deduct locally elapsed time from the side to move, clamped at zero.
    /// Returns whether anything changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let (Some(_), Some(_)) = (self.white_ms, self.black_ms) else {
            return false;
        };
        let elapsed = now.saturating_duration_since(self.last_update).as_millis() as u64;
        if elapsed == 0 {
            return false;
        }
        self.last_update = now;
        let running = match self.turn {
            Color::White => &mut self.white_ms,
            Color::Black => &mut self.black_ms,
        };
        if let Some(ms) = running {
            *ms = ms.saturating_sub(elapsed);
        }
        true
    }

    /// Formatted readouts for both sides.
    #[must_use]
    pub fn display(&self) -> (String, String) {
        (format_clock(self.white_ms), format_clock(self.black_ms))
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new()
    }
}

/// `m:ss` readout, `--:--` when the value is unknown.
#[must_use]
pub fn format_clock(ms: Option<u64>) -> String {
    let Some(ms) = ms else {
        return "--:--".to_string();
    };
    let total_seconds = ms / 1000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes}:{seconds:02}")
}
