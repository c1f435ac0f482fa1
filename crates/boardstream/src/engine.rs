//! Rules engine wrapper around shakmaty.
//!
//! Owns the one authoritative local position. Every mutation goes through
//! move validation or an explicit full reload, so the position is always a
//! legal, reachable one. Listeners registered with [`BoardEngine::subscribe`]
//! run synchronously after each successful mutation.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position};

use crate::types::{Color, MoveIntent, PieceType, Square, UciMove};

/// Errors from position loading and move replay.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Position string could not be parsed or describes an illegal setup.
    #[error("invalid position string: {0}")]
    InvalidFen(String),

    /// A token in a replayed move list was not legal; the previous position
    /// is left untouched.
    #[error("illegal move {token} at ply {ply} of replay")]
    ReplayRejected { ply: usize, token: UciMove },

    /// Movetext token that is not a readable move.
    #[error("unreadable movetext token: {0}")]
    BadSan(String),

    /// Movetext move that is not legal where it appears.
    #[error("illegal movetext move {token} at ply {ply}")]
    PgnRejected { ply: usize, token: String },

    /// Movetext has fewer plies than requested.
    #[error("movetext ends before ply {0}")]
    PgnTooShort(usize),
}

/// Which side the king castled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastleSide {
    King,
    Queen,
}

impl CastleSide {
    /// Rook origin square for a standard castle of the given color.
    #[must_use]
    pub const fn rook_from(self, color: Color) -> Square {
        let file = match self {
            Self::King => 7,
            Self::Queen => 0,
        };
        Self::rook_square(file, color)
    }

    /// Rook destination square for a standard castle of the given color.
    #[must_use]
    pub const fn rook_to(self, color: Color) -> Square {
        let file = match self {
            Self::King => 5,
            Self::Queen => 3,
        };
        Self::rook_square(file, color)
    }

    const fn rook_square(file: u8, color: Color) -> Square {
        let rank = match color {
            Color::White => 0,
            Color::Black => 7,
        };
        match Square::at(file, rank) {
            Some(sq) => sq,
            None => unreachable!(),
        }
    }
}

/// A move that has been validated and applied to the engine position.
///
/// Carries everything the presentation layer needs to show it without asking
/// the rules engine again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub from: Square,
    pub to: Square,
    pub color: Color,
    pub role: PieceType,
    /// Human-readable notation, computed against the pre-move position.
    pub san: String,
    pub capture: Option<PieceType>,
    pub promotion: Option<PieceType>,
    pub is_en_passant: bool,
    pub castle: Option<CastleSide>,
}

impl AppliedMove {
    /// Coordinate token for this move.
    #[must_use]
    pub fn uci(&self) -> UciMove {
        MoveIntent::new(self.from, self.to, self.promotion).uci()
    }
}

/// A legal destination from a given square, for selection highlighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOption {
    pub to: Square,
    pub promotion: Option<PieceType>,
    pub san: String,
}

/// Handle returned by [`BoardEngine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn Fn(&BoardEngine) + Send + Sync>;

/// The single validated board position plus its applied-move history.
pub struct BoardEngine {
    position: Chess,
    history: Vec<AppliedMove>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

impl BoardEngine {
    /// Standard starting position.
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Chess::default(),
            history: Vec::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Load a full position from a FEN string, clearing the move history.
    pub fn load_fen(&mut self, fen: &str) -> Result<(), EngineError> {
        self.position = parse_fen(fen)?;
        self.history.clear();
        self.emit();
        Ok(())
    }

    /// Reset, optionally load a starting position, then replay every move
    /// token in order.
    ///
    /// Atomic: the replay runs on a scratch position and is committed only
    /// when every token applies; a rejected token leaves the engine exactly
    /// as it was before the call.
    pub fn load_from_moves(
        &mut self,
        initial_fen: Option<&str>,
        moves: &[UciMove],
    ) -> Result<(), EngineError> {
        let start = match initial_fen {
            Some(fen) => parse_fen(fen)?,
            None => Chess::default(),
        };
        let mut position = start;
        let mut history = Vec::with_capacity(moves.len());
        for (ply, token) in moves.iter().enumerate() {
            match apply_to(&position, &token.intent()) {
                Some((next, applied)) => {
                    position = next;
                    history.push(applied);
                }
                None => {
                    return Err(EngineError::ReplayRejected {
                        ply,
                        token: token.clone(),
                    });
                }
            }
        }
        self.position = position;
        self.history = history;
        self.emit();
        Ok(())
    }

    /// Replay a PGN's movetext up to exactly `ply` half-moves.
    ///
    /// Tag pairs, comments, variations, numeric annotations, move numbers
    /// and result markers are skipped; what remains is applied as notation
    /// tokens from the standard starting position.
    pub fn load_pgn_to_ply(&mut self, pgn: &str, ply: usize) -> Result<(), EngineError> {
        let tokens = movetext_tokens(pgn);
        if tokens.len() < ply {
            return Err(EngineError::PgnTooShort(ply));
        }
        let mut position = Chess::default();
        let mut history = Vec::with_capacity(ply);
        for (index, token) in tokens.iter().take(ply).enumerate() {
            let san: SanPlus = token
                .parse()
                .map_err(|_| EngineError::BadSan(token.clone()))?;
            let m = san
                .san
                .to_move(&position)
                .map_err(|_| EngineError::PgnRejected {
                    ply: index,
                    token: token.clone(),
                })?;
            let applied = describe(&position, &m);
            position = position
                .clone()
                .play(&m)
                .map_err(|_| EngineError::PgnRejected {
                    ply: index,
                    token: token.clone(),
                })?;
            history.push(applied);
        }
        self.position = position;
        self.history = history;
        self.emit();
        Ok(())
    }

    /// Validate and apply one move. `None` means the move is illegal and
    /// nothing changed.
    pub fn apply_intent(&mut self, intent: &MoveIntent) -> Option<AppliedMove> {
        let (next, applied) = apply_to(&self.position, intent)?;
        self.position = next;
        self.history.push(applied.clone());
        self.emit();
        Some(applied)
    }

    /// Whether a move token would be legal right now, without applying it.
    #[must_use]
    pub fn is_legal(&self, token: &UciMove) -> bool {
        apply_to(&self.position, &token.intent()).is_some()
    }

    /// All legal moves leaving the given square.
    #[must_use]
    pub fn legal_moves_from(&self, square: Square) -> Vec<MoveOption> {
        let from: shakmaty::Square = square.into();
        self.position
            .legal_moves()
            .iter()
            .filter(|m| m.from() == Some(from))
            .map(|m| MoveOption {
                to: m.to().into(),
                promotion: m.promotion().map(PieceType::from),
                san: San::from_move(&self.position, m).to_string(),
            })
            .collect()
    }

    /// Piece occupying a square, if any.
    #[must_use]
    pub fn piece_at(&self, square: Square) -> Option<(Color, PieceType)> {
        let piece = self.position.board().piece_at(square.into())?;
        Some((piece.color.into(), piece.role.into()))
    }

    /// Side to move.
    #[must_use]
    pub fn turn(&self) -> Color {
        self.position.turn().into()
    }

    /// Current position string.
    #[must_use]
    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// Notation history of every applied move, oldest first.
    #[must_use]
    pub fn san_history(&self) -> Vec<String> {
        self.history.iter().map(|m| m.san.clone()).collect()
    }

    /// Applied moves since the last full load.
    #[must_use]
    pub fn moves(&self) -> &[AppliedMove] {
        &self.history
    }

    /// Register a listener invoked synchronously after every successful
    /// mutation.
    pub fn subscribe(
        &mut self,
        listener: impl Fn(&BoardEngine) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        SubscriptionId(id)
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(lid, _)| *lid != id.0);
    }

    fn emit(&self) {
        for (_, listener) in &self.listeners {
            listener(self);
        }
    }
}

impl Default for BoardEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BoardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardEngine")
            .field("fen", &self.fen())
            .field("plies", &self.history.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn parse_fen(fen: &str) -> Result<Chess, EngineError> {
    let parsed: Fen = fen
        .parse()
        .map_err(|e| EngineError::InvalidFen(format!("{e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| EngineError::InvalidFen(format!("{e}")))
}

/// Find the legal move matching an intent and return the successor position
/// together with its description.
fn apply_to(position: &Chess, intent: &MoveIntent) -> Option<(Chess, AppliedMove)> {
    let from: shakmaty::Square = intent.from.into();
    let to: shakmaty::Square = intent.to.into();
    let wanted_promotion = intent.promotion.map(shakmaty::Role::from);

    let m = position.legal_moves().into_iter().find(|m| {
        if m.from() != Some(from) || m.promotion() != wanted_promotion {
            return false;
        }
        // Castling accepts both the king-destination token and the
        // king-onto-rook form.
        m.to() == to || matches!(m, Move::Castle { rook, .. } if *rook == to)
    })?;

    let applied = describe(position, &m);
    let next = position.clone().play(&m).ok()?;
    Some((next, applied))
}

/// Describe a legal move against the position it is about to be played on.
fn describe(position: &Chess, m: &Move) -> AppliedMove {
    let color: Color = position.turn().into();
    let san = San::from_move(position, m).to_string();
    let (capture, is_en_passant) = match m {
        Move::Normal { capture, .. } => (capture.map(PieceType::from), false),
        Move::EnPassant { .. } => (Some(PieceType::Pawn), true),
        _ => (None, false),
    };
    let castle = match m {
        Move::Castle { king, rook } => Some(if rook > king {
            CastleSide::King
        } else {
            CastleSide::Queen
        }),
        _ => None,
    };
    let from = m
        .from()
        .map(Square::from)
        .unwrap_or_else(|| m.to().into());
    AppliedMove {
        from,
        to: m.to().into(),
        color,
        role: m.role().into(),
        san,
        capture,
        promotion: m.promotion().map(PieceType::from),
        is_en_passant,
        castle,
    }
}

/// Extract bare notation tokens from PGN movetext.
fn movetext_tokens(pgn: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut in_comment = false;
    let mut variation_depth = 0usize;
    for line in pgn.lines() {
        if !in_comment && variation_depth == 0 && line.trim_start().starts_with('[') {
            continue;
        }
        for raw in line.split_whitespace() {
            let mut word = raw;
            loop {
                if in_comment {
                    match word.find('}') {
                        Some(end) => {
                            in_comment = false;
                            word = &word[end + 1..];
                        }
                        None => {
                            word = "";
                            break;
                        }
                    }
                } else if let Some(start) = word.find(['{', '(', ')']) {
                    let (head, rest) = word.split_at(start);
                    if variation_depth == 0 {
                        push_token(&mut tokens, head);
                    }
                    match rest.as_bytes()[0] {
                        b'{' => in_comment = true,
                        b'(' => variation_depth += 1,
                        _ => variation_depth = variation_depth.saturating_sub(1),
                    }
                    word = &rest[1..];
                } else {
                    if variation_depth == 0 {
                        push_token(&mut tokens, word);
                    }
                    break;
                }
            }
        }
    }
    tokens
}

fn push_token(tokens: &mut Vec<String>, raw: &str) {
    // Strip a glued move number ("12.e4", "3...") and annotation suffixes.
    let stripped = raw
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches('.');
    let stripped = stripped.trim_end_matches(['!', '?']);
    if stripped.is_empty()
        || stripped.starts_with('$')
        || matches!(stripped, "1-0" | "0-1" | "1/2-1/2" | "*")
    {
        return;
    }
    tokens.push(stripped.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn uci(token: &str) -> UciMove {
        token.parse().unwrap()
    }

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    #[test]
    fn starting_position() {
        let engine = BoardEngine::new();
        assert_eq!(engine.turn(), Color::White);
        assert!(engine.san_history().is_empty());
        assert_eq!(
            engine.piece_at(sq("e1")),
            Some((Color::White, PieceType::King))
        );
    }

    #[test]
    fn apply_intent_tracks_notation() {
        let mut engine = BoardEngine::new();
        let applied = engine.apply_intent(&uci("g1f3").intent()).unwrap();
        assert_eq!(applied.san, "Nf3");
        assert_eq!(applied.role, PieceType::Knight);
        assert_eq!(engine.turn(), Color::Black);
        assert_eq!(engine.san_history(), vec!["Nf3"]);
    }

    #[test]
    fn illegal_intent_leaves_state_untouched() {
        let mut engine = BoardEngine::new();
        let before = engine.fen();
        assert!(engine.apply_intent(&uci("e2e5").intent()).is_none());
        assert_eq!(engine.fen(), before);
        assert!(engine.san_history().is_empty());
    }

    #[test]
    fn load_matches_incremental_application() {
        let tokens = ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5"].map(uci);
        let mut loaded = BoardEngine::new();
        loaded.load_from_moves(None, &tokens).unwrap();

        let mut stepped = BoardEngine::new();
        for token in &tokens {
            assert!(stepped.apply_intent(&token.intent()).is_some());
        }
        assert_eq!(loaded.fen(), stepped.fen());
        assert_eq!(loaded.san_history(), stepped.san_history());
    }

    #[test]
    fn load_is_atomic_on_rejected_token() {
        let mut engine = BoardEngine::new();
        engine
            .load_from_moves(None, &[uci("e2e4"), uci("e7e5")])
            .unwrap();
        let before = engine.fen();
        let history = engine.san_history();

        let err = engine
            .load_from_moves(None, &[uci("e2e4"), uci("e2e4")])
            .unwrap_err();
        assert!(matches!(err, EngineError::ReplayRejected { ply: 1, .. }));
        assert_eq!(engine.fen(), before);
        assert_eq!(engine.san_history(), history);
    }

    #[test]
    fn en_passant_is_flagged() {
        let mut engine = BoardEngine::new();
        let tokens = ["e2e4", "a7a6", "e4e5", "d7d5"].map(uci);
        engine.load_from_moves(None, &tokens).unwrap();
        let applied = engine.apply_intent(&uci("e5d6").intent()).unwrap();
        assert!(applied.is_en_passant);
        assert_eq!(applied.capture, Some(PieceType::Pawn));
        // Destination square is empty; the captured pawn sat beside it.
        assert_eq!(applied.to, sq("d6"));
    }

    #[test]
    fn castling_describes_both_token_forms() {
        let setup = ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "f8c5"].map(uci);

        let mut engine = BoardEngine::new();
        engine.load_from_moves(None, &setup).unwrap();
        let applied = engine.apply_intent(&uci("e1g1").intent()).unwrap();
        assert_eq!(applied.castle, Some(CastleSide::King));
        assert_eq!(applied.san, "O-O");
        assert_eq!(applied.to, sq("g1"));

        // King-onto-rook form of the same move.
        let mut engine = BoardEngine::new();
        engine.load_from_moves(None, &setup).unwrap();
        let applied = engine.apply_intent(&uci("e1h1").intent()).unwrap();
        assert_eq!(applied.castle, Some(CastleSide::King));
    }

    #[test]
    fn rook_squares_for_castles() {
        assert_eq!(CastleSide::King.rook_from(Color::White), sq("h1"));
        assert_eq!(CastleSide::King.rook_to(Color::White), sq("f1"));
        assert_eq!(CastleSide::Queen.rook_from(Color::Black), sq("a8"));
        assert_eq!(CastleSide::Queen.rook_to(Color::Black), sq("d8"));
    }

    #[test]
    fn promotion_requires_matching_piece() {
        let tokens = ["h2h4", "g7g5", "h4g5", "g8f6", "g5g6", "f6e4", "g6g7", "e4c3"].map(uci);
        let mut engine = BoardEngine::new();
        engine.load_from_moves(None, &tokens).unwrap();

        // Bare push to the last rank without a promotion letter is not a move.
        assert!(engine.apply_intent(&uci("g7g8").intent()).is_none());
        let applied = engine.apply_intent(&uci("g7g8q").intent()).unwrap();
        assert_eq!(applied.promotion, Some(PieceType::Queen));
    }

    #[test]
    fn load_fen_resets_history() {
        let mut engine = BoardEngine::new();
        engine.apply_intent(&uci("e2e4").intent()).unwrap();
        engine
            .load_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
            .unwrap();
        assert!(engine.san_history().is_empty());
        assert!(engine.load_fen("not a position").is_err());
    }

    #[test]
    fn pgn_replay_stops_at_ply() {
        let pgn = "[Event \"Casual\"]\n\n1. e4 e5 2. Nf3 { main line } Nc6 (2... d6) 3. Bb5 a6 1/2-1/2";
        let mut engine = BoardEngine::new();
        engine.load_pgn_to_ply(pgn, 3).unwrap();
        assert_eq!(engine.san_history(), vec!["e4", "e5", "Nf3"]);
        assert_eq!(engine.turn(), Color::Black);

        assert!(matches!(
            engine.load_pgn_to_ply(pgn, 40),
            Err(EngineError::PgnTooShort(40))
        ));
    }

    #[test]
    fn listeners_fire_after_each_mutation() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut engine = BoardEngine::new();
        let seen = Arc::clone(&count);
        let id = engine.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        engine.apply_intent(&uci("e2e4").intent()).unwrap();
        engine.load_from_moves(None, &[uci("d2d4")]).unwrap();
        // Rejected mutation does not notify.
        assert!(engine.apply_intent(&uci("e2e4").intent()).is_none());
        assert_eq!(count.load(Ordering::SeqCst), 2);

        engine.unsubscribe(id);
        engine.apply_intent(&uci("d7d5").intent()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
