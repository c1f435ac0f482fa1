//! Square-selection gating.
//!
//! Turns raw square picks into validated move intents before they reach the
//! rules engine. The gate enforces whose pieces may be picked up and resolves
//! the promotion ambiguity of a pawn reaching the last rank.

use crate::engine::BoardEngine;
use crate::types::{Color, MoveIntent, PieceType, Square};

/// What kind of play is currently accepting input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    /// No live game and no puzzle: input is ignored.
    Disabled,
    /// Puzzle attempt in progress.
    Puzzle,
    /// Live game; `assigned` is this account's color when known.
    Live { assigned: Option<Color> },
}

/// Result of feeding one square pick through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Nothing to do (interaction disabled, empty square, wrong color...).
    Ignored,
    /// A piece was picked up; highlight its legal destinations.
    Selected { square: Square, targets: Vec<Square> },
    /// The active selection was dropped.
    Cleared,
    /// A complete move intent, ready for the engine.
    Intent(MoveIntent),
    /// The move needs a promotion piece; ask the user to choose.
    PromotionChoice {
        from: Square,
        to: Square,
        options: Vec<PieceType>,
    },
    /// The pick was not a legal destination; show an invalid-move flash.
    Rejected { from: Square, to: Square },
}

/// Tracks the currently selected origin square.
#[derive(Debug, Default)]
pub struct SelectionGate {
    selected: Option<Square>,
}

impl SelectionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn selected(&self) -> Option<Square> {
        self.selected
    }

    /// Drop any active selection.
    pub fn clear(&mut self) {
        self.selected = None;
    }

    /// Feed one square pick.
    pub fn on_square(
        &mut self,
        engine: &BoardEngine,
        mode: InteractionMode,
        square: Square,
    ) -> SelectionOutcome {
        match mode {
            InteractionMode::Disabled => SelectionOutcome::Ignored,
            InteractionMode::Puzzle => self.advance(engine, square, None),
            InteractionMode::Live { assigned } => self.advance(engine, square, assigned),
        }
    }

    fn advance(
        &mut self,
        engine: &BoardEngine,
        square: Square,
        assigned: Option<Color>,
    ) -> SelectionOutcome {
        let Some(from) = self.selected else {
            return self.pick_origin(engine, square, assigned);
        };

        if square == from {
            self.selected = None;
            return SelectionOutcome::Cleared;
        }

        // Clicking another own piece re-selects instead of moving.
        if engine
            .piece_at(square)
            .is_some_and(|(color, _)| color == engine.turn())
        {
            return self.pick_origin(engine, square, assigned);
        }

        self.selected = None;
        let options: Vec<PieceType> = engine
            .legal_moves_from(from)
            .into_iter()
            .filter(|m| m.to == square)
            .filter_map(|m| m.promotion)
            .collect();
        match options.len() {
            0 => {
                if engine
                    .legal_moves_from(from)
                    .iter()
                    .any(|m| m.to == square)
                {
                    SelectionOutcome::Intent(MoveIntent::new(from, square, None))
                } else {
                    SelectionOutcome::Rejected { from, to: square }
                }
            }
            1 => SelectionOutcome::Intent(MoveIntent::new(from, square, Some(options[0]))),
            _ => SelectionOutcome::PromotionChoice {
                from,
                to: square,
                options,
            },
        }
    }

    fn pick_origin(
        &mut self,
        engine: &BoardEngine,
        square: Square,
        assigned: Option<Color>,
    ) -> SelectionOutcome {
        // In a live game, only act when it is the assigned color's turn.
        if let Some(color) = assigned {
            if engine.turn() != color {
                return SelectionOutcome::Ignored;
            }
        }
        let Some((piece_color, _)) = engine.piece_at(square) else {
            self.selected = None;
            return SelectionOutcome::Ignored;
        };
        if piece_color != engine.turn() {
            self.selected = None;
            return SelectionOutcome::Ignored;
        }
        let mut targets: Vec<Square> = engine
            .legal_moves_from(square)
            .into_iter()
            .map(|m| m.to)
            .collect();
        targets.dedup();
        self.selected = Some(square);
        SelectionOutcome::Selected { square, targets }
    }
}
