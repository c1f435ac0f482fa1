//! Puzzle attempt state machine.
//!
//! A loaded puzzle carries an ordered solution. User moves are checked
//! against the solution cursor; matching moves advance it and auto-play the
//! scripted reply, a mismatch fails the attempt. The win/loss report is
//! produced at most once per attempt and submission is best-effort.

use crate::engine::AppliedMove;
use crate::types::{MoveIntent, PuzzleOutcome, PuzzleStatus, UciMove};

/// How the flow handled one user move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzleMove {
    /// No puzzle is awaiting a move; the caller should treat the move as
    /// ordinary play.
    NotHandled,
    /// The move matched and the attempt continues.
    Advanced,
    /// The move matched and completed the solution.
    Solved,
    /// The move was legal but wrong; the attempt is failed.
    Failed,
    /// The rules engine rejected the move; the attempt is unaffected.
    RejectedByEngine,
}

/// One puzzle attempt: scripted solution, progress cursor, submission guard.
#[derive(Debug, Default)]
pub struct PuzzleFlow {
    puzzle_id: Option<String>,
    solution: Vec<UciMove>,
    cursor: usize,
    active: bool,
    submitted: bool,
    status: Option<PuzzleStatus>,
}

impl PuzzleFlow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a fresh attempt. An empty solution leaves the flow inactive.
    pub fn begin(&mut self, puzzle_id: impl Into<String>, solution: Vec<UciMove>) {
        self.active = !solution.is_empty();
        self.puzzle_id = Some(puzzle_id.into());
        self.solution = solution;
        self.cursor = 0;
        self.submitted = false;
        self.status = Some(if self.active {
            PuzzleStatus::Loaded
        } else {
            PuzzleStatus::Inactive
        });
    }

    /// Drop the attempt without reporting a result (e.g. a live game starts).
    pub fn abandon(&mut self) {
        self.active = false;
        self.puzzle_id = None;
        self.solution.clear();
        self.cursor = 0;
        self.submitted = false;
        self.status = Some(PuzzleStatus::Inactive);
    }

    /// Whether a puzzle is currently awaiting user moves.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn status(&self) -> Option<PuzzleStatus> {
        self.status
    }

    /// Solution tokens, retained after failure for display.
    #[must_use]
    pub fn solution(&self) -> &[UciMove] {
        &self.solution
    }

    /// The solution move the user is expected to play next.
    #[must_use]
    pub fn expected(&self) -> Option<&UciMove> {
        if self.active {
            self.solution.get(self.cursor)
        } else {
            None
        }
    }

    /// Feed a user move. `apply` commits a move to the engine and queue and
    /// returns `None` when illegal; it is also used for the scripted reply.
    pub fn handle_user_move(
        &mut self,
        intent: &MoveIntent,
        apply: &mut dyn FnMut(&MoveIntent) -> Option<AppliedMove>,
    ) -> PuzzleMove {
        let Some(expected) = self.expected().cloned() else {
            return PuzzleMove::NotHandled;
        };

        let promotion_matches = match expected.promotion() {
            Some(required) => intent.promotion == Some(required),
            None => true,
        };
        let correct = expected.from_square() == intent.from
            && expected.to_square() == intent.to
            && promotion_matches;

        if apply(intent).is_none() {
            return PuzzleMove::RejectedByEngine;
        }

        if !correct {
            tracing::info!(
                puzzle = self.puzzle_id.as_deref().unwrap_or(""),
                played = %intent.uci(),
                expected = %expected,
                "puzzle attempt failed"
            );
            self.active = false;
            self.status = Some(PuzzleStatus::Failed);
            return PuzzleMove::Failed;
        }

        self.cursor += 1;
        if let Some(reply) = self.solution.get(self.cursor).cloned() {
            if apply(&reply.intent()).is_some() {
                self.cursor += 1;
            } else {
                tracing::warn!(reply = %reply, "scripted puzzle reply was rejected");
            }
        }

        if self.cursor >= self.solution.len() {
            tracing::info!(
                puzzle = self.puzzle_id.as_deref().unwrap_or(""),
                "puzzle solved"
            );
            self.active = false;
            self.status = Some(PuzzleStatus::Solved);
            PuzzleMove::Solved
        } else {
            PuzzleMove::Advanced
        }
    }

    /// The result to report for a finished attempt, produced at most once.
    pub fn take_report(&mut self) -> Option<PuzzleOutcome> {
        if self.submitted {
            return None;
        }
        let win = match self.status {
            Some(PuzzleStatus::Solved) => true,
            Some(PuzzleStatus::Failed) => false,
            _ => return None,
        };
        let id = self.puzzle_id.clone()?;
        self.submitted = true;
        Some(PuzzleOutcome {
            id,
            win,
            rated: true,
        })
    }
}
