//! Chess primitives shared across the crate.
//!
//! Serializable wrapper types around shakmaty's board vocabulary, plus the
//! coordinate move token format used on the wire.

use serde::{Deserialize, Serialize};

/// Piece color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// White pieces.
    White,
    /// Black pieces.
    Black,
}

impl Color {
    /// Get the opposite color.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl From<shakmaty::Color> for Color {
    fn from(c: shakmaty::Color) -> Self {
        match c {
            shakmaty::Color::White => Self::White,
            shakmaty::Color::Black => Self::Black,
        }
    }
}

impl From<Color> for shakmaty::Color {
    fn from(c: Color) -> Self {
        match c {
            Color::White => Self::White,
            Color::Black => Self::Black,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

/// Piece kind, promotion targets included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceType {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceType {
    /// Lowercase letter used in move tokens (promotion suffix).
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Pawn => 'p',
            Self::Knight => 'n',
            Self::Bishop => 'b',
            Self::Rook => 'r',
            Self::Queen => 'q',
            Self::King => 'k',
        }
    }

    /// Parse a promotion letter (`q`, `r`, `b`, `n`).
    #[must_use]
    pub const fn from_promotion_letter(c: char) -> Option<Self> {
        match c {
            'q' => Some(Self::Queen),
            'r' => Some(Self::Rook),
            'b' => Some(Self::Bishop),
            'n' => Some(Self::Knight),
            _ => None,
        }
    }
}

impl From<shakmaty::Role> for PieceType {
    fn from(r: shakmaty::Role) -> Self {
        match r {
            shakmaty::Role::Pawn => Self::Pawn,
            shakmaty::Role::Knight => Self::Knight,
            shakmaty::Role::Bishop => Self::Bishop,
            shakmaty::Role::Rook => Self::Rook,
            shakmaty::Role::Queen => Self::Queen,
            shakmaty::Role::King => Self::King,
        }
    }
}

impl From<PieceType> for shakmaty::Role {
    fn from(p: PieceType) -> Self {
        match p {
            PieceType::Pawn => Self::Pawn,
            PieceType::Knight => Self::Knight,
            PieceType::Bishop => Self::Bishop,
            PieceType::Rook => Self::Rook,
            PieceType::Queen => Self::Queen,
            PieceType::King => Self::King,
        }
    }
}

/// A board square (a1-h8), stored as a 0-63 index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square(u8);

impl Square {
    /// Build a square from file (0-7, a-h) and rank (0-7, 1-8).
    #[must_use]
    pub const fn at(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self(rank * 8 + file))
        } else {
            None
        }
    }

    /// File index, 0-7.
    #[must_use]
    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    /// Rank index, 0-7.
    #[must_use]
    pub const fn rank(self) -> u8 {
        self.0 / 8
    }
}

impl From<shakmaty::Square> for Square {
    fn from(s: shakmaty::Square) -> Self {
        Self(s as u8)
    }
}

impl From<Square> for shakmaty::Square {
    fn from(s: Square) -> Self {
        Self::new(s.0 as u32)
    }
}

impl std::fmt::Display for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        write!(f, "{file}{rank}")
    }
}

impl std::str::FromStr for Square {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err("square must be 2 characters");
        }
        if !bytes[0].is_ascii_lowercase() || !(b'a'..=b'h').contains(&bytes[0]) {
            return Err("file must be a-h");
        }
        if !(b'1'..=b'8').contains(&bytes[1]) {
            return Err("rank must be 1-8");
        }
        Self::at(bytes[0] - b'a', bytes[1] - b'1').ok_or("invalid square")
    }
}

/// A coordinate move token: origin square, destination square, optional
/// promotion letter (e.g. `e2e4`, `e7e8q`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UciMove(String);

impl UciMove {
    /// Validate and wrap a token. Checks the format only, not legality.
    pub fn new(s: impl Into<String>) -> Result<Self, &'static str> {
        let s = s.into();
        if s.len() < 4 || s.len() > 5 {
            return Err("move token must be 4-5 characters");
        }
        let _from: Square = s[0..2].parse()?;
        let _to: Square = s[2..4].parse()?;
        if let Some(promo) = s.chars().nth(4) {
            if PieceType::from_promotion_letter(promo).is_none() {
                return Err("promotion must be q, r, b, or n");
            }
        }
        Ok(Self(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Origin square.
    #[must_use]
    pub fn from_square(&self) -> Square {
        self.0[0..2].parse().expect("validated in constructor")
    }

    /// Destination square.
    #[must_use]
    pub fn to_square(&self) -> Square {
        self.0[2..4].parse().expect("validated in constructor")
    }

    /// Promotion piece, if the token carries a fifth letter.
    #[must_use]
    pub fn promotion(&self) -> Option<PieceType> {
        self.0
            .chars()
            .nth(4)
            .and_then(PieceType::from_promotion_letter)
    }

    /// Decompose into a move intent.
    #[must_use]
    pub fn intent(&self) -> MoveIntent {
        MoveIntent {
            from: self.from_square(),
            to: self.to_square(),
            promotion: self.promotion(),
        }
    }
}

impl std::fmt::Display for UciMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UciMove {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A user's (or a scripted line's) request to move a piece, before legality
/// has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveIntent {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceType>,
}

impl MoveIntent {
    #[must_use]
    pub fn new(from: Square, to: Square, promotion: Option<PieceType>) -> Self {
        Self {
            from,
            to,
            promotion,
        }
    }

    /// Render back to a coordinate token.
    #[must_use]
    pub fn uci(&self) -> UciMove {
        let mut s = format!("{}{}", self.from, self.to);
        if let Some(p) = self.promotion {
            s.push(p.letter());
        }
        UciMove(s)
    }
}
