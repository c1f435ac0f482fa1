//! Move history display tracking.
//!
//! Derives a stable move list for the surrounding application: updates are
//! suppressed when nothing changed, and a transiently empty engine history is
//! ignored while a non-empty one is on display, since it indicates a reload
//! in progress rather than a genuine new game.

/// Tracks the last notified move list.
#[derive(Debug, Default)]
pub struct HistoryTracker {
    displayed: Vec<String>,
}

impl HistoryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the engine's current notation history. Returns the new display
    /// list when it should be re-rendered, `None` otherwise.
    pub fn update(&mut self, current: Vec<String>) -> Option<Vec<String>> {
        if current.is_empty() && !self.displayed.is_empty() {
            return None;
        }
        if current == self.displayed {
            return None;
        }
        self.displayed = current.clone();
        Some(current)
    }

    /// Forget the displayed list (a deliberate new game).
    pub fn reset(&mut self) {
        self.displayed.clear();
    }

    /// Currently displayed list.
    #[must_use]
    pub fn displayed(&self) -> &[String] {
        &self.displayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn notifies_on_content_change_only() {
        let mut tracker = HistoryTracker::new();
        assert_eq!(tracker.update(moves(&["e4"])), Some(moves(&["e4"])));
        assert_eq!(tracker.update(moves(&["e4"])), None);
        assert_eq!(
            tracker.update(moves(&["e4", "e5"])),
            Some(moves(&["e4", "e5"]))
        );
    }

    #[test]
    fn transient_empty_read_is_ignored() {
        let mut tracker = HistoryTracker::new();
        tracker.update(moves(&["e4", "e5"]));
        assert_eq!(tracker.update(Vec::new()), None);
        assert_eq!(tracker.displayed(), moves(&["e4", "e5"]).as_slice());
    }

    #[test]
    fn reset_allows_a_genuinely_new_game() {
        let mut tracker = HistoryTracker::new();
        tracker.update(moves(&["e4"]));
        tracker.reset();
        assert!(tracker.displayed().is_empty());
        assert_eq!(tracker.update(moves(&["d4"])), Some(moves(&["d4"])));
    }

    #[test]
    fn empty_to_empty_stays_silent() {
        let mut tracker = HistoryTracker::new();
        assert_eq!(tracker.update(Vec::new()), None);
    }
}
